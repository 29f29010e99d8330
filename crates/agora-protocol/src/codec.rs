//! JSON codec for envelopes.
//!
//! Frames are encoded once by the manager and shared between every outbound
//! queue, so [`encode`] returns reference-counted [`Bytes`].

use bytes::Bytes;
use thiserror::Error;

use crate::envelope::Envelope;

/// Maximum encoded envelope size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors raised while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Encoded frame exceeds [`MAX_FRAME_SIZE`].
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode an envelope to a JSON frame.
///
/// # Errors
///
/// Returns an error if serialization fails or the frame is too large.
pub fn encode(envelope: &Envelope) -> Result<Bytes, ProtocolError> {
    let payload = serde_json::to_vec(envelope)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode a JSON frame into an envelope.
///
/// # Errors
///
/// Returns an error if the frame is too large or not a valid envelope.
pub fn decode(data: &[u8]) -> Result<Envelope, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let envelope = Envelope::chat("A", "hi");
        let frame = encode(&envelope).unwrap();
        assert_eq!(&frame[..], br#"{"sender":"A","content":"hi"}"#);
        assert_eq!(decode(&frame).unwrap(), envelope);
    }

    #[test]
    fn test_frame_too_large() {
        let envelope = Envelope::chat("A", "x".repeat(MAX_FRAME_SIZE));

        match encode(&envelope) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_invalid() {
        match decode(b"not json") {
            Err(ProtocolError::Json(_)) => {}
            other => panic!("Expected Json error, got {:?}", other),
        }
    }

    #[test]
    fn test_content_escaped() {
        let frame = encode(&Envelope::chat("A", "say \"hi\"\n")).unwrap();
        assert_eq!(decode(&frame).unwrap().content, "say \"hi\"\n");
    }
}
