//! Bounded outbound queue between the manager and a write pump.
//!
//! The manager holds the only [`OutboundQueue`] for a client and enqueues
//! without ever blocking. Closing the queue is final: the write pump's
//! [`OutboundReceiver`] yields `None` from then on, even if frames were still
//! buffered.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Reasons a frame could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue is at capacity; the consumer is not keeping up.
    #[error("Outbound queue full")]
    Full,

    /// The queue was closed, or its consumer is gone.
    #[error("Outbound queue closed")]
    Closed,
}

/// Create a queue holding at most `capacity` frames.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn channel(capacity: usize) -> (OutboundQueue, OutboundReceiver) {
    let (sender, receiver) = mpsc::channel(capacity);
    let closed = Arc::new(AtomicBool::new(false));

    let queue = OutboundQueue {
        sender: Some(sender),
        closed: Arc::clone(&closed),
    };
    let receiver = OutboundReceiver { receiver, closed };

    (queue, receiver)
}

/// Producer side of an outbound queue.
#[derive(Debug)]
pub struct OutboundQueue {
    sender: Option<mpsc::Sender<Bytes>>,
    closed: Arc<AtomicBool>,
}

impl OutboundQueue {
    /// Enqueue a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] if the queue is at capacity and
    /// [`QueueError::Closed`] if it was closed or the receiver was dropped.
    pub fn try_enqueue(&self, frame: Bytes) -> Result<(), QueueError> {
        let sender = self.sender.as_ref().ok_or(QueueError::Closed)?;

        sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Close the queue.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&mut self) -> bool {
        match self.sender.take() {
            Some(sender) => {
                self.closed.store(true, Ordering::SeqCst);
                drop(sender);
                true
            }
            None => false,
        }
    }

    /// Check if the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }
}

/// Consumer side of an outbound queue, owned by the write pump.
#[derive(Debug)]
pub struct OutboundReceiver {
    receiver: mpsc::Receiver<Bytes>,
    closed: Arc<AtomicBool>,
}

impl OutboundReceiver {
    /// Wait for the next frame.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        if self.is_closed() {
            return None;
        }

        let frame = self.receiver.recv().await?;
        if self.is_closed() {
            return None;
        }

        Some(frame)
    }

    /// Take a frame if one is immediately available.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        if self.is_closed() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Check if the producer closed the queue.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
