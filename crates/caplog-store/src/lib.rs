//! # Caplog Store
//!
//! Log store adapter for caplog.
//!
//! This crate describes the capabilities caplog needs from a storage engine
//! that offers capped, append-only logs with tailable cursors, and ships an
//! in-memory implementation of them.
//!
//! ## Features
//!
//! - **LogStore / LogHandle / TailCursor traits**: create-if-absent, append,
//!   point lookup and awaiting tail cursors
//! - **Connection**: readiness notification for a store that becomes available later
//! - **MemoryLogStore**: capped in-memory backend for tests and single-process hosts
//! - **LogQuota**: byte/count eviction accounting
//!
//! ## Example
//!
//! ```rust,ignore
//! use caplog_store::{BoundedLogOptions, LogStore, MemoryLogStore, NewEntry, TailOptions};
//!
//! let store = MemoryLogStore::new();
//! let log = store.create_bounded_log("events", &BoundedLogOptions::default()).await?;
//!
//! let anchor = log.append(NewEntry::sentinel()).await?;
//! let cursor = log.open_tail_cursor(anchor.id, &TailOptions::default()).await?;
//!
//! log.append(NewEntry::new("greet", serde_json::json!({"who": "world"}))).await?;
//! let entry = cursor.next().await?;
//! ```

pub mod connection;
pub mod entry;
pub mod error;
pub mod memory;
pub mod options;
pub mod quota;

// Re-exports
pub use connection::{Connection, Connector};
pub use entry::{Entry, EntryId, Lookup, NewEntry};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryLog, MemoryLogStore, MemoryTailCursor};
pub use options::{BoundedLogOptions, DEFAULT_RETRY_INTERVAL, DEFAULT_SIZE_BYTES, TailOptions};
pub use quota::LogQuota;

use std::sync::Arc;

use async_trait::async_trait;

/// A storage engine that hosts capped logs
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Create a capped log
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if a log with this name exists;
    /// callers that only need the log to exist treat this as success and
    /// follow up with [`LogStore::open_log`].
    async fn create_bounded_log(
        &self,
        name: &str,
        options: &BoundedLogOptions,
    ) -> StoreResult<Arc<dyn LogHandle>>;

    /// Open an existing log
    async fn open_log(&self, name: &str) -> StoreResult<Arc<dyn LogHandle>>;
}

/// Handle to one capped log
#[async_trait]
pub trait LogHandle: Send + Sync {
    /// Name of the log
    fn name(&self) -> &str;

    /// Append an entry; the store assigns its id
    async fn append(&self, entry: NewEntry) -> StoreResult<Entry>;

    /// Look up at most one entry
    async fn find_one(&self, lookup: Lookup) -> StoreResult<Option<Entry>>;

    /// Open a cursor over entries with id strictly greater than `after`
    async fn open_tail_cursor(
        &self,
        after: EntryId,
        options: &TailOptions,
    ) -> StoreResult<Arc<dyn TailCursor>>;
}

/// A tailing cursor over a capped log
///
/// Only one `next` call should be in flight at a time.
#[async_trait]
pub trait TailCursor: Send + Sync {
    /// Fetch the next entry
    ///
    /// Waiting for new data is absorbed internally. `Ok(None)` means the
    /// cursor has terminated and will never yield again.
    async fn next(&self) -> StoreResult<Option<Entry>>;

    /// Close the cursor, waking any pending `next` call
    fn close(&self);

    /// Check if the cursor was closed
    fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The store traits must stay object-safe
    fn _assert_object_safe(_: &dyn LogStore, _: &dyn LogHandle, _: &dyn TailCursor) {}

    #[tokio::test]
    async fn test_create_then_open_through_trait_object() {
        let store: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());
        let created = store
            .create_bounded_log("events", &BoundedLogOptions::default())
            .await
            .unwrap();
        created
            .append(NewEntry::new("a", serde_json::json!(1)))
            .await
            .unwrap();

        let opened = store.open_log("events").await.unwrap();
        let latest = opened.find_one(Lookup::Latest).await.unwrap().unwrap();
        assert_eq!(latest.event.as_deref(), Some("a"));
    }
}
