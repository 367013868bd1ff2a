//! Stack decoding error types.

use thiserror::Error;

/// A payload could not be decoded as literal Lua data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode error at byte {offset}: {message}")]
pub struct DecodeError {
    /// Byte offset into the payload where decoding stopped.
    pub offset: usize,
    /// What was wrong at that offset.
    pub message: String,
}

impl DecodeError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}
