//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The encoded blob is not valid base64.
    #[error("invalid base64: {message}")]
    InvalidBase64 {
        /// Description of the base64 error.
        message: String,
    },

    /// The decoded bytes are not a valid JSON document.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        /// Description of the parse error.
        message: String,
    },

    /// The value has a structure the codec cannot represent.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural problem.
        message: String,
    },
}

impl CodecError {
    /// Creates an invalid-base64 error.
    pub fn invalid_base64(message: impl Into<String>) -> Self {
        Self::InvalidBase64 {
            message: message.into(),
        }
    }

    /// Creates an invalid-payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Creates an invalid-structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
