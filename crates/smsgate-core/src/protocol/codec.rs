//! Line-delimited JSON framing.
//!
//! Wire format: one UTF-8 JSON object followed by `\n`.  Frames longer than
//! [`MAX_FRAME_LEN`] bytes (terminator excluded) are rejected on both sides.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Largest accepted frame body in bytes.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Errors that can occur while framing or parsing protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame exceeds [`MAX_FRAME_LEN`].
    #[error("frame too large: {len} bytes, limit is {}", MAX_FRAME_LEN)]
    FrameTooLarge { len: usize },

    /// The frame is empty after trimming the line terminator.
    #[error("empty frame")]
    EmptyFrame,

    /// The frame bytes are not UTF-8.
    #[error("frame is not valid UTF-8")]
    NotUtf8,

    /// The frame is not a valid message.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serialises `msg` into a newline-terminated frame.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the JSON body exceeds the
/// frame limit, or [`ProtocolError::Malformed`] if serialisation fails.
///
/// # Examples
///
/// ```rust
/// use smsgate_core::protocol::{decode_frame, encode_frame, ClientRequest};
///
/// let msg = ClientRequest::Goodbye;
/// let bytes = encode_frame(&msg).unwrap();
/// assert_eq!(bytes.last(), Some(&b'\n'));
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert_eq!(decode_frame::<ClientRequest>(text).unwrap(), msg);
/// ```
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(msg)?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge { len: bytes.len() });
    }
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parses one frame.  Surrounding whitespace, including the terminator, is
/// ignored.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the line is empty, too large or malformed.
pub fn decode_frame<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    let body = line.trim();
    if body.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge { len: body.len() });
    }
    Ok(serde_json::from_str(body)?)
}
