//! WebSocket transport implementation.
//!
//! Splits an upgraded axum [`WebSocket`] into a reader and a writer half that
//! can be driven by separate tasks. The underlying socket is released once
//! both halves are dropped.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::traits::{FrameReader, FrameWriter, TransportError};

/// Split an upgraded WebSocket into its two halves.
#[must_use]
pub fn split(socket: WebSocket) -> (WebSocketReader, WebSocketWriter) {
    let (sink, stream) = socket.split();
    let is_open = Arc::new(AtomicBool::new(true));

    let reader = WebSocketReader {
        stream,
        is_open: Arc::clone(&is_open),
    };
    let writer = WebSocketWriter {
        sink,
        is_open,
        closed: false,
    };

    (reader, writer)
}

/// Inbound half of a WebSocket connection.
pub struct WebSocketReader {
    stream: SplitStream<WebSocket>,
    is_open: Arc<AtomicBool>,
}

#[async_trait]
impl FrameReader for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(String::from_utf8_lossy(&data).into_owned()));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Pings are answered by the protocol layer
                    trace!("Control frame");
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    self.is_open.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.is_open.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    self.is_open.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.is_open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Outbound half of a WebSocket connection.
pub struct WebSocketWriter {
    sink: SplitSink<WebSocket, Message>,
    is_open: Arc<AtomicBool>,
    closed: bool,
}

#[async_trait]
impl FrameWriter for WebSocketWriter {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        if self.closed || !self.is_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let text = std::str::from_utf8(&frame)
            .map_err(|e| TransportError::Protocol(format!("Frame is not UTF-8: {}", e)))?;

        self.sink
            .send(Message::Text(text.to_owned()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(()); // Already closed
        }

        if self.is_open.swap(false, Ordering::SeqCst) {
            self.sink
                .send(Message::Close(None))
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }

        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }

    fn is_open(&self) -> bool {
        !self.closed && self.is_open.load(Ordering::SeqCst)
    }
}
