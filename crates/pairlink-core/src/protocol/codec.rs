//! Text-frame codec for the JSON message catalog.
//!
//! One WebSocket text frame carries exactly one message.  Frames larger than
//! [`MAX_FRAME_BYTES`] are refused before parsing; an SDP offer with a full
//! candidate list is a few kilobytes, so the limit leaves generous headroom.

use thiserror::Error;

use crate::protocol::messages::{ClientMessage, ServerMessage};

/// Largest inbound text frame the relay will parse.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Errors that can occur while decoding or encoding a frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame exceeds [`MAX_FRAME_BYTES`].
    #[error("frame too large: {len} bytes (limit {MAX_FRAME_BYTES})")]
    FrameTooLarge { len: usize },

    /// The frame is not a valid message (bad JSON, unknown `type`, missing field).
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decodes one inbound text frame.
///
/// # Errors
///
/// [`ProtocolError::FrameTooLarge`] or [`ProtocolError::Malformed`].
///
/// # Examples
///
/// ```rust
/// use pairlink_core::protocol::{decode_client_message, ClientMessage};
///
/// let msg = decode_client_message(r#"{"type":"generate-code","identity":"cam"}"#).unwrap();
/// assert_eq!(msg.kind(), "generate-code");
/// ```
pub fn decode_client_message(frame: &str) -> Result<ClientMessage, ProtocolError> {
    if frame.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge { len: frame.len() });
    }
    Ok(serde_json::from_str(frame)?)
}

/// Encodes one outbound message as a text frame.
///
/// # Errors
///
/// [`ProtocolError::Malformed`] if serialization fails, which only happens
/// for a payload `Value` that cannot be represented (never for parsed input).
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}
