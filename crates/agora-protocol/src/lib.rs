//! # agora-protocol
//!
//! Wire format for the Agora chatroom.
//!
//! Every frame a client receives is a JSON object built from an [`Envelope`]:
//!
//! ```json
//! {"sender":"alice","content":"hi"}
//! ```
//!
//! Empty fields are omitted. System announcements use the sender
//! [`SYSTEM_SENDER`]. The `recipient` field is reserved for direct messages
//! and is never populated by the broadcast core.
//!
//! ## Example
//!
//! ```rust
//! use agora_protocol::{codec, Envelope};
//!
//! let frame = codec::encode(&Envelope::chat("alice", "hi")).unwrap();
//! assert_eq!(&frame[..], br#"{"sender":"alice","content":"hi"}"#);
//! ```

pub mod codec;
pub mod envelope;

pub use codec::{decode, encode, ProtocolError};
pub use envelope::{Envelope, SYSTEM_SENDER};
