//! Log entries
//!
//! An [`Entry`] is an immutable record in a bounded log. Its [`EntryId`] is
//! assigned by the store at insertion time and is the only meaningful ordering.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Store-assigned, monotonically increasing entry identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    /// The identifier that precedes every assigned id
    pub const ZERO: EntryId = EntryId(0);

    /// The id following this one
    pub fn next(self) -> EntryId {
        EntryId(self.0 + 1)
    }

    /// Raw value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A stored log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Identifier assigned by the store
    pub id: EntryId,
    /// Event tag; `None` for sentinel entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Opaque payload
    #[serde(default)]
    pub message: Value,
}

impl Entry {
    /// Whether this entry carries no event tag
    pub fn is_sentinel(&self) -> bool {
        self.event.is_none()
    }

    /// Serialized size in bytes, used for capped size accounting
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// An entry waiting to be appended (no id yet)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    /// Event tag
    pub event: Option<String>,
    /// Payload
    pub message: Value,
}

impl NewEntry {
    /// Create a tagged entry
    pub fn new(event: impl Into<String>, message: Value) -> Self {
        Self {
            event: Some(event.into()),
            message,
        }
    }

    /// Create an untagged entry used to anchor a tail on an empty log
    pub fn sentinel() -> Self {
        Self {
            event: None,
            message: Value::Null,
        }
    }

    /// Attach the store-assigned id
    pub fn with_id(self, id: EntryId) -> Entry {
        Entry {
            id,
            event: self.event,
            message: self.message,
        }
    }
}

/// Single-entry lookup against a log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The entry with exactly this id
    Id(EntryId),
    /// The most recent entry by insertion order
    Latest,
}
