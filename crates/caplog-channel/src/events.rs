//! Channel notifications and tail states

use std::fmt;

use caplog_store::EntryId;

use crate::error::ChannelError;

/// Event name listeners are registered under when none is given
pub const MESSAGE_EVENT: &str = "message";

/// Event name that receives every delivered entry, sentinels included
pub const DOCUMENT_EVENT: &str = "document";

/// State of a channel's tail loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TailState {
    /// Never listened
    Idle,
    /// Resolving the anchor and opening the cursor
    Starting,
    /// Fetching and dispatching entries
    Active,
    /// The cursor terminated unexpectedly
    BrokenDetected,
    /// Waiting out the retry interval before restarting
    Recovering,
    /// Not listening, either closed by the host or stopped after a break
    Closed,
}

impl TailState {
    /// Whether a tail loop exists in this state
    pub fn is_listening(self) -> bool {
        !matches!(self, TailState::Idle | TailState::Closed)
    }
}

impl fmt::Display for TailState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TailState::Idle => "idle",
            TailState::Starting => "starting",
            TailState::Active => "active",
            TailState::BrokenDetected => "broken",
            TailState::Recovering => "recovering",
            TailState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Notifications observable through [`Channel::events`](crate::Channel::events)
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The tail cursor is open and entries after `anchor` will be delivered
    Ready {
        /// Entry the tail resumed from
        anchor: EntryId,
    },

    /// An error occurred with no caller waiting for it
    Error(ChannelError),
}

impl ChannelEvent {
    /// Get the error, if this is an error notification
    pub fn error(&self) -> Option<&ChannelError> {
        match self {
            ChannelEvent::Error(e) => Some(e),
            ChannelEvent::Ready { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listening_states() {
        assert!(!TailState::Idle.is_listening());
        assert!(!TailState::Closed.is_listening());
        assert!(TailState::Starting.is_listening());
        assert!(TailState::Active.is_listening());
        assert!(TailState::Recovering.is_listening());
        assert_eq!(TailState::BrokenDetected.to_string(), "broken");
    }

    #[test]
    fn test_event_error_accessor() {
        let ready = ChannelEvent::Ready { anchor: EntryId(3) };
        assert!(ready.error().is_none());

        let broken = ChannelEvent::Error(ChannelError::BrokenCursor {
            channel: "default".into(),
        });
        assert!(broken.error().unwrap().is_broken_cursor());
    }
}
