//! Error types for the sync engine.

use driftq_codec::CodecError;
use driftq_core::{DeviceKey, ModelError, OperationStatus};
use thiserror::Error;
use uuid::Uuid;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Conflicts are not errors: a conflicted operation is reported in the
/// pass result and waits for an explicit resolution call.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed enqueue input or illegal status transition.
    #[error(transparent)]
    InvalidOperation(#[from] ModelError),

    /// Network or transport error for a single attempt.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the attempt can be retried.
        retryable: bool,
    },

    /// The referenced operation does not exist.
    #[error("unknown operation {0}")]
    UnknownOperation(Uuid),

    /// The operation is not in a state that permits the request.
    #[error("operation {id} is {status}, expected {expected}")]
    InvalidState {
        /// The operation.
        id: Uuid,
        /// Its current status.
        status: OperationStatus,
        /// The status the request requires.
        expected: OperationStatus,
    },

    /// Payload encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A sync pass for this device pair is already in flight.
    #[error("sync pass already in flight for {device}")]
    PassInFlight {
        /// The busy device pair.
        device: DeviceKey,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried on a later pass.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::PassInFlight { .. } => true,
            _ => false,
        }
    }
}
