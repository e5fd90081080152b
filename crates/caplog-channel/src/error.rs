//! Error types for caplog-channel

use caplog_store::StoreError;
use thiserror::Error;

/// Errors that can occur on a channel
///
/// Errors are `Clone` so they can be broadcast to every observer of
/// [`ChannelEvent::Error`](crate::ChannelEvent::Error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The store connection was abandoned before becoming ready
    #[error("store unavailable: {0}")]
    StoreUnavailable(StoreError),

    /// Creating the bounded log failed
    #[error("failed to create log for channel {channel}: {source}")]
    CreateFailed { channel: String, source: StoreError },

    /// Appending a published entry failed
    #[error("failed to publish on channel {channel}: {source}")]
    AppendFailed { channel: String, source: StoreError },

    /// Resolving the tail starting point failed
    #[error("failed to bootstrap tail for channel {channel}: {source}")]
    Bootstrap { channel: String, source: StoreError },

    /// The tail cursor terminated unexpectedly
    #[error("tail cursor on channel {channel} terminated unexpectedly")]
    BrokenCursor { channel: String },

    /// The store returned an error while tailing
    #[error("store error on channel {channel}: {source}")]
    Store { channel: String, source: StoreError },

    /// A published message could not be converted to a payload
    #[error("failed to serialize message: {0}")]
    Serialization(String),

    /// The channel is not listening
    #[error("channel {0} is not listening")]
    NotListening(String),
}

impl ChannelError {
    /// Check if this error reports a broken tail cursor
    pub fn is_broken_cursor(&self) -> bool {
        matches!(self, ChannelError::BrokenCursor { .. })
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(e: serde_json::Error) -> Self {
        ChannelError::Serialization(e.to_string())
    }
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;
