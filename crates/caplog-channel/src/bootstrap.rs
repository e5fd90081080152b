//! Tail starting point resolution
//!
//! A tailing cursor needs a concrete id to read after. The anchor is the
//! previously delivered entry when it is still in the log, otherwise the
//! newest entry, otherwise a freshly inserted sentinel.
//!
//! The previous entry is looked up by its exact id. If eviction removed it,
//! the tail resumes from the newest entry and anything appended in between
//! is skipped. This recovery gap is a known limitation of best-effort delivery.

use std::sync::Arc;

use caplog_store::{Entry, LogHandle, Lookup, NewEntry, StoreError};
use tracing::{debug, warn};

use crate::collection::CollectionManager;
use crate::error::{ChannelError, ChannelResult};

/// Resolve the anchor entry to tail from, together with the log handle
pub async fn resolve_starting_point(
    collection: &CollectionManager,
    previous: Option<&Entry>,
) -> ChannelResult<(Entry, Arc<dyn LogHandle>)> {
    let log = collection.ensure().await?;
    let bootstrap_error = |source: StoreError| ChannelError::Bootstrap {
        channel: log.name().to_string(),
        source,
    };

    let mut anchor = None;
    if let Some(previous) = previous {
        anchor = log
            .find_one(Lookup::Id(previous.id))
            .await
            .map_err(bootstrap_error)?;
        if anchor.is_none() {
            warn!(
                channel = log.name(),
                previous = %previous.id,
                "Previous anchor was evicted; entries appended since may be skipped"
            );
        }
    }

    if anchor.is_none() {
        anchor = log
            .find_one(Lookup::Latest)
            .await
            .map_err(bootstrap_error)?;
    }

    let anchor = match anchor {
        Some(anchor) => anchor,
        None => {
            let sentinel = log
                .append(NewEntry::sentinel())
                .await
                .map_err(bootstrap_error)?;
            debug!(channel = log.name(), id = %sentinel.id, "Inserted sentinel entry into empty log");
            sentinel
        }
    };

    Ok((anchor, log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use caplog_store::{BoundedLogOptions, Connection, MemoryLogStore};
    use serde_json::json;
    use tokio::sync::broadcast;

    fn collection(store: Arc<MemoryLogStore>, options: BoundedLogOptions) -> CollectionManager {
        let (tx, _rx) = broadcast::channel(16);
        CollectionManager::new("events", Connection::ready(store), options, tx)
    }

    #[tokio::test]
    async fn test_empty_log_gets_sentinel() {
        let store = Arc::new(MemoryLogStore::new());
        let collection = collection(store.clone(), BoundedLogOptions::default());

        let (anchor, _log) = resolve_starting_point(&collection, None).await.unwrap();
        assert!(anchor.is_sentinel());
        assert_eq!(store.log("events").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_latest_entry_is_anchor() {
        let store = Arc::new(MemoryLogStore::new());
        let collection = collection(store, BoundedLogOptions::default());
        let log = collection.ensure().await.unwrap();

        log.append(NewEntry::new("a", json!(1))).await.unwrap();
        let latest = log.append(NewEntry::new("b", json!(2))).await.unwrap();

        let (anchor, _) = resolve_starting_point(&collection, None).await.unwrap();
        assert_eq!(anchor, latest);
    }

    #[tokio::test]
    async fn test_previous_entry_is_reused() {
        let store = Arc::new(MemoryLogStore::new());
        let collection = collection(store, BoundedLogOptions::default());
        let log = collection.ensure().await.unwrap();

        let previous = log.append(NewEntry::new("a", json!(1))).await.unwrap();
        log.append(NewEntry::new("b", json!(2))).await.unwrap();

        let (anchor, _) = resolve_starting_point(&collection, Some(&previous))
            .await
            .unwrap();
        assert_eq!(anchor, previous);
    }

    #[tokio::test]
    async fn test_evicted_previous_falls_back_to_latest() {
        let store = Arc::new(MemoryLogStore::new());
        let collection = collection(store, BoundedLogOptions::default().max_count(Some(2)));
        let log = collection.ensure().await.unwrap();

        let previous = log.append(NewEntry::new("a", json!(1))).await.unwrap();
        log.append(NewEntry::new("b", json!(2))).await.unwrap();
        let latest = log.append(NewEntry::new("c", json!(3))).await.unwrap();

        let (anchor, _) = resolve_starting_point(&collection, Some(&previous))
            .await
            .unwrap();
        assert_eq!(anchor, latest);
    }
}
