//! Error types for logging setup

use thiserror::Error;

/// Errors that can occur while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Invalid filter directives
    #[error("Invalid log filter '{directives}': {reason}")]
    Filter { directives: String, reason: String },

    /// Log file or directory could not be created
    #[error("Log file error: {0}")]
    File(#[from] std::io::Error),

    /// Rolling appender could not be initialised
    #[error("Log appender error: {0}")]
    Appender(String),

    /// A global subscriber was already installed
    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

/// Result type for logging setup
pub type LoggingResult<T> = Result<T, LoggingError>;
