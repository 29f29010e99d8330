//! The chat envelope.

use serde::{Deserialize, Serialize};

/// Sender label used for server-authored announcements.
pub const SYSTEM_SENDER: &str = "system";

/// A chat message as it travels on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Display name of the author, or [`SYSTEM_SENDER`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender: String,

    /// Reserved for direct-message routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Message text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
}

impl Envelope {
    /// Create an envelope authored by a participant.
    #[must_use]
    pub fn chat(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipient: None,
            content: content.into(),
        }
    }

    /// Create a server-authored envelope.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::chat(SYSTEM_SENDER, content)
    }

    /// Announcement broadcast when a participant joins.
    #[must_use]
    pub fn joined(name: &str) -> Self {
        Self::system(format!("Welcome {name} to the chatroom"))
    }

    /// Announcement broadcast when a participant leaves.
    #[must_use]
    pub fn left(name: &str) -> Self {
        Self::system(format!("{name} has left the chatroom"))
    }
}
