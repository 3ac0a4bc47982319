//! JSON encoding for WebSocket frames.
//!
//! Frames travel as WebSocket text messages. Incoming frames larger than
//! [`MAX_FRAME_LEN`] are rejected before parsing.

use crate::event::{ClientMessage, ServerFrame};

/// Largest accepted incoming frame, in bytes.
pub const MAX_FRAME_LEN: usize = 256 * 1024;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Frame exceeds the size limit.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Encodes a server frame as JSON text.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame cannot be serialized.
pub fn encode_server(frame: &ServerFrame) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decodes a server frame from JSON text.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the text is not a valid frame.
pub fn decode_server(text: &str) -> Result<ServerFrame, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Encodes a client message as JSON text.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the message cannot be serialized.
pub fn encode_client(msg: &ClientMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decodes a client message from JSON text.
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` if the text exceeds [`MAX_FRAME_LEN`],
/// or `CodecError::Serialization` if it is not a valid message.
pub fn decode_client(text: &str) -> Result<ClientMessage, CodecError> {
    if text.len() > MAX_FRAME_LEN {
        return Err(CodecError::InvalidFrame(format!(
            "frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
            text.len()
        )));
    }
    Ok(serde_json::from_str(text)?)
}
