//! Error types for caplog-store
//!
//! This module defines the error types returned by log store adapters.

use thiserror::Error;

/// Errors that can occur in log store operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store connection is not ready (or was abandoned before it became ready)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A log with this name already exists
    #[error("log already exists: {0}")]
    AlreadyExists(String),

    /// Requested log was not found
    #[error("log not found: {0}")]
    LogNotFound(String),

    /// Creating the log failed for a reason other than it already existing
    #[error("failed to create log {name}: {reason}")]
    CreateFailed { name: String, reason: String },

    /// Appending an entry failed
    #[error("append failed: {0}")]
    AppendFailed(String),

}

impl StoreError {
    /// Create a new Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create a new CreateFailed error
    pub fn create_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreateFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new AppendFailed error
    pub fn append_failed(message: impl Into<String>) -> Self {
        Self::AppendFailed(message.into())
    }

    /// Whether this error reports an existing log (idempotent create)
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
