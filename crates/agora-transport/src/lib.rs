//! # agora-transport
//!
//! Transport layer for the Agora chatroom.
//!
//! A connection is split into two halves so that two independent tasks can
//! own them:
//!
//! - [`FrameReader`] - pulls inbound text frames, owned by the read pump
//! - [`FrameWriter`] - pushes outbound frames, owned by the write pump
//!
//! Both halves share the connection's open/closed state, and closing either
//! half is idempotent.
//!
//! ```rust,ignore
//! use agora_transport::{FrameReader, FrameWriter};
//!
//! async fn echo(mut reader: impl FrameReader, mut writer: impl FrameWriter) {
//!     while let Ok(Some(text)) = reader.recv().await {
//!         if writer.send(text.into()).await.is_err() {
//!             break;
//!         }
//!     }
//!     let _ = writer.close().await;
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{ConnectionId, FrameReader, FrameWriter, TransportError};
