//! Codec for encoding and decoding Bayeux frame batches.
//!
//! Bayeux transmits every frame inside a JSON array. The client always
//! produces single-element batches; decoding returns whatever the server
//! sent and leaves batch policy to the caller.

use thiserror::Error;

use crate::message::Message;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON (de)serialization failure.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server sent an empty batch.
    #[error("Received an empty frame batch")]
    EmptyBatch,
}

/// Encode a batch of frames as a JSON array.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_batch(batch: &[Message]) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(batch)?)
}

/// Decode a JSON array of frames.
///
/// # Errors
///
/// Returns an error if the payload is not a JSON message array or the
/// array is empty.
pub fn decode_batch(payload: &str) -> Result<Vec<Message>, ProtocolError> {
    let batch: Vec<Message> = serde_json::from_str(payload)?;
    if batch.is_empty() {
        return Err(ProtocolError::EmptyBatch);
    }
    Ok(batch)
}
