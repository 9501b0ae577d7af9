//! Error types for the core data model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by the data model itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Enqueue input was malformed (missing type or resource).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A status transition not permitted by the state machine.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },
}

impl ModelError {
    /// Creates an invalid-operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }
}
