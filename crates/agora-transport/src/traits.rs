//! Transport abstraction traits for Agora.
//!
//! These traits define the two halves of a framed text connection, allowing
//! the pumps to be transport-agnostic.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Frame could not be represented on this transport.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// The inbound half of a connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Receive the next text frame.
    ///
    /// Returns `Ok(None)` if the peer closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Mark the connection closed from the reading side.
    ///
    /// Calling this more than once is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// The outbound half of a connection.
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one pre-encoded UTF-8 frame.
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Send a protocol-level close frame and shut the stream down.
    ///
    /// Calling this more than once, or after the reader already closed the
    /// connection, is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}
