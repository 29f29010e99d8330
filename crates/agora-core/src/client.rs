//! Registered client handles.

use agora_transport::ConnectionId;

use crate::queue::{self, OutboundQueue, OutboundReceiver};

/// Display name used when a client does not pick one.
pub const DEFAULT_USERNAME: &str = "visitor";

/// A client as seen by the manager.
///
/// The stream halves live in the pumps; the manager only needs the identity
/// and the producer side of the outbound queue.
#[derive(Debug)]
pub struct ClientHandle {
    id: ConnectionId,
    name: String,
    pub(crate) queue: OutboundQueue,
}

impl ClientHandle {
    /// Create a handle around an existing queue.
    #[must_use]
    pub fn new(id: ConnectionId, name: impl Into<String>, queue: OutboundQueue) -> Self {
        Self {
            id,
            name: name.into(),
            queue,
        }
    }

    /// Create a handle together with a fresh queue of `capacity` frames.
    ///
    /// The returned receiver belongs to the client's write pump.
    #[must_use]
    pub fn open(
        id: ConnectionId,
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, OutboundReceiver) {
        let (queue, receiver) = queue::channel(capacity);
        (Self::new(id, name, queue), receiver)
    }

    /// The client's unique identifier.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// The client's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The client's outbound queue.
    #[must_use]
    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }
}

/// Resolve a requested display name, falling back to `default` when missing
/// or blank.
#[must_use]
pub fn display_name(requested: Option<&str>, default: &str) -> String {
    match requested.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => default.to_string(),
    }
}
