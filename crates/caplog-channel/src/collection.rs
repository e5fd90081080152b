//! Lazy provisioning of a channel's bounded log
//!
//! The log is created at most once per channel. Concurrent first callers
//! wait on the same in-flight creation; a failed creation leaves nothing
//! cached so the next caller tries again.

use std::sync::Arc;

use caplog_store::{BoundedLogOptions, Connection, LogHandle};
use tokio::sync::{OnceCell, broadcast};
use tracing::{debug, error, info, instrument};

use crate::error::{ChannelError, ChannelResult};
use crate::events::ChannelEvent;

/// Creates and caches the log backing a channel
pub struct CollectionManager {
    name: String,
    connection: Connection,
    options: BoundedLogOptions,
    handle: OnceCell<Arc<dyn LogHandle>>,
    events: broadcast::Sender<ChannelEvent>,
}

impl CollectionManager {
    /// Create a manager; no I/O happens until [`CollectionManager::ensure`]
    pub fn new(
        name: impl Into<String>,
        connection: Connection,
        options: BoundedLogOptions,
        events: broadcast::Sender<ChannelEvent>,
    ) -> Self {
        Self {
            name: name.into(),
            connection,
            options,
            handle: OnceCell::new(),
            events,
        }
    }

    /// Check whether the log has been provisioned
    pub fn is_provisioned(&self) -> bool {
        self.handle.initialized()
    }

    /// Get the log, creating it on first use
    ///
    /// Waits for the connection to become ready. An already existing log is
    /// opened instead of created. Other failures are emitted as
    /// [`ChannelEvent::Error`] and returned.
    pub async fn ensure(&self) -> ChannelResult<Arc<dyn LogHandle>> {
        self.handle
            .get_or_try_init(|| self.provision())
            .await
            .cloned()
    }

    #[instrument(skip_all, fields(channel = %self.name))]
    async fn provision(&self) -> ChannelResult<Arc<dyn LogHandle>> {
        let store = match self.connection.store() {
            Some(store) => store,
            None => {
                debug!("Store not ready, waiting for connection");
                self.connection
                    .wait_ready()
                    .await
                    .map_err(|e| self.fail(ChannelError::StoreUnavailable(e)))?
            }
        };

        match store.create_bounded_log(&self.name, &self.options).await {
            Ok(handle) => {
                info!(
                    size_bytes = self.options.size_bytes,
                    max_count = ?self.options.max_count,
                    "Provisioned channel log"
                );
                Ok(handle)
            }
            Err(e) if e.is_already_exists() => {
                debug!("Channel log already exists, opening it");
                store.open_log(&self.name).await.map_err(|source| {
                    self.fail(ChannelError::CreateFailed {
                        channel: self.name.clone(),
                        source,
                    })
                })
            }
            Err(source) => Err(self.fail(ChannelError::CreateFailed {
                channel: self.name.clone(),
                source,
            })),
        }
    }

    fn fail(&self, err: ChannelError) -> ChannelError {
        error!(channel = %self.name, error = %err, "Failed to provision channel log");
        let _ = self.events.send(ChannelEvent::Error(err.clone()));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caplog_store::{LogStore, MemoryLogStore, StoreError};

    fn manager(connection: Connection, options: BoundedLogOptions) -> CollectionManager {
        let (tx, _rx) = broadcast::channel(16);
        CollectionManager::new("events", connection, options, tx)
    }

    #[tokio::test]
    async fn test_ensure_creates_once() {
        let store = Arc::new(MemoryLogStore::new());
        let mgr = manager(Connection::ready(store.clone()), BoundedLogOptions::default());
        assert!(!mgr.is_provisioned());

        let first = mgr.ensure().await.unwrap();
        let second = mgr.ensure().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(mgr.is_provisioned());
        assert_eq!(store.log_names(), vec!["events".to_string()]);
    }

    #[tokio::test]
    async fn test_existing_log_is_opened() {
        let store = Arc::new(MemoryLogStore::new());
        store
            .create_bounded_log("events", &BoundedLogOptions::default())
            .await
            .unwrap();

        let mgr = manager(Connection::ready(store), BoundedLogOptions::default());
        let handle = mgr.ensure().await.unwrap();
        assert_eq!(handle.name(), "events");
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_share_creation() {
        let store = Arc::new(MemoryLogStore::new());
        let mgr = Arc::new(manager(Connection::ready(store), BoundedLogOptions::default()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = mgr.clone();
            handles.push(tokio::spawn(async move { mgr.ensure().await.map(|_| ()) }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_create_failure_is_reported_and_not_cached() {
        let store = Arc::new(MemoryLogStore::new());
        let (tx, mut rx) = broadcast::channel(16);
        let mgr = CollectionManager::new(
            "events",
            Connection::ready(store),
            BoundedLogOptions::with_size_bytes(0),
            tx,
        );

        let err = mgr.ensure().await.err().unwrap();
        assert!(matches!(err, ChannelError::CreateFailed { .. }));
        assert!(!mgr.is_provisioned());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.error(), Some(&err));
    }

    #[tokio::test]
    async fn test_waits_for_connection() {
        let (connection, connector) = Connection::pending();
        let mgr = Arc::new(manager(connection, BoundedLogOptions::default()));

        let pending = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.ensure().await.map(|h| h.name().to_string()) })
        };
        tokio::task::yield_now().await;
        assert!(!mgr.is_provisioned());

        connector.connect(Arc::new(MemoryLogStore::new()));
        assert_eq!(pending.await.unwrap().unwrap(), "events");
    }

    #[tokio::test]
    async fn test_abandoned_connection_is_unavailable() {
        let (connection, connector) = Connection::pending();
        let mgr = manager(connection, BoundedLogOptions::default());
        drop(connector);

        let err = mgr.ensure().await.err().unwrap();
        assert!(matches!(
            err,
            ChannelError::StoreUnavailable(StoreError::Unavailable(_))
        ));
    }
}
