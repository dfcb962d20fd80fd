//! Codec for encoding and decoding chat envelopes.
//!
//! Envelopes travel as JSON text frames. There is no length prefix or binary
//! framing; the transport (WebSocket) already delimits messages.

use thiserror::Error;

use crate::envelope::Envelope;

/// Maximum encoded envelope size (64 KiB).
pub const MAX_ENVELOPE_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Envelope exceeds maximum size.
    #[error("Envelope size {0} exceeds maximum {MAX_ENVELOPE_SIZE}")]
    TooLarge(usize),

    /// The payload is not a valid envelope.
    #[error("Malformed envelope: {0}")]
    Malformed(serde_json::Error),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(serde_json::Error),
}

/// Encode an envelope to a JSON string.
///
/// # Errors
///
/// Returns an error if the envelope is too large or serialization fails.
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(envelope).map_err(ProtocolError::Encode)?;

    if text.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::TooLarge(text.len()));
    }

    Ok(text)
}

/// Decode an envelope from a JSON string.
///
/// # Errors
///
/// Returns an error if the payload is oversized or not a valid envelope.
pub fn decode(text: &str) -> Result<Envelope, ProtocolError> {
    if text.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::TooLarge(text.len()));
    }

    serde_json::from_str(text).map_err(ProtocolError::Malformed)
}
