//! In-process transport backed by tokio channels.
//!
//! [`pair`] returns the two connection halves plus a [`MemoryPeer`] playing
//! the remote client. The peer's outbound buffer is bounded, so a peer that
//! stops reading stalls the writer exactly like a slow network client.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::traits::{FrameReader, FrameWriter, TransportError};

/// A frame observed by the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryFrame {
    /// A data frame.
    Text(String),
    /// The protocol-level close frame.
    Close,
}

/// Create an in-memory connection.
///
/// `buffer` bounds how many frames the writer can push before the peer has
/// to read some.
#[must_use]
pub fn pair(buffer: usize) -> (MemoryReader, MemoryWriter, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::channel(buffer);
    let is_open = Arc::new(AtomicBool::new(true));

    let reader = MemoryReader {
        inbound: inbound_rx,
        is_open: Arc::clone(&is_open),
    };
    let writer = MemoryWriter {
        outbound: Some(outbound_tx),
        is_open: Arc::clone(&is_open),
    };
    let peer = MemoryPeer {
        inbound: Some(inbound_tx),
        outbound: outbound_rx,
        is_open,
    };

    (reader, writer, peer)
}

/// Inbound half of an in-memory connection.
pub struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
    is_open: Arc<AtomicBool>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Ok(None);
        }

        match self.inbound.recv().await {
            Some(Ok(text)) => Ok(Some(text)),
            Some(Err(e)) => {
                self.is_open.store(false, Ordering::SeqCst);
                Err(e)
            }
            None => {
                self.is_open.store(false, Ordering::SeqCst);
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.is_open.store(false, Ordering::SeqCst);
        self.inbound.close();
        Ok(())
    }
}

/// Outbound half of an in-memory connection.
pub struct MemoryWriter {
    outbound: Option<mpsc::Sender<MemoryFrame>>,
    is_open: Arc<AtomicBool>,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let outbound = match &self.outbound {
            Some(tx) if self.is_open.load(Ordering::SeqCst) => tx,
            _ => return Err(TransportError::ConnectionClosed),
        };

        let text = String::from_utf8(frame.to_vec())
            .map_err(|e| TransportError::Protocol(format!("Frame is not UTF-8: {}", e)))?;

        outbound
            .send(MemoryFrame::Text(text))
            .await
            .map_err(|_| TransportError::SendFailed("peer dropped".into()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let Some(outbound) = self.outbound.take() else {
            return Ok(()); // Already closed
        };

        if self.is_open.swap(false, Ordering::SeqCst) {
            // A dropped peer cannot observe the close frame anyway
            let _ = outbound.send(MemoryFrame::Close).await;
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.outbound.is_some() && self.is_open.load(Ordering::SeqCst)
    }
}

/// The remote end of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
    outbound: mpsc::Receiver<MemoryFrame>,
    is_open: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Send a text frame to the reader.
    ///
    /// Returns `false` if the reader is gone or the peer already hung up.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(text.into())).is_ok())
    }

    /// Inject a transport error into the reader.
    pub fn fail(&self, error: TransportError) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Err(error)).is_ok())
    }

    /// Close the connection cleanly from the peer side.
    ///
    /// The reader observes end-of-stream once it has drained pending frames.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Receive the next frame the writer produced.
    ///
    /// Returns `None` once the writer is closed and drained.
    pub async fn recv(&mut self) -> Option<MemoryFrame> {
        self.outbound.recv().await
    }

    /// Check if the connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}
