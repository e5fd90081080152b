//! Store connection readiness
//!
//! A [`Connection`] hands out the [`LogStore`] once the session to the
//! underlying storage is established. Until then callers can wait on
//! [`Connection::wait_ready`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::LogStore;
use crate::error::{StoreError, StoreResult};

type StoreSlot = Option<Arc<dyn LogStore>>;

/// Shared handle to a (possibly not yet available) log store
#[derive(Clone)]
pub struct Connection {
    rx: watch::Receiver<StoreSlot>,
}

/// Completes a pending [`Connection`] once the store is available
pub struct Connector {
    tx: watch::Sender<StoreSlot>,
}

impl Connection {
    /// Create a connection that is ready immediately
    pub fn ready(store: Arc<dyn LogStore>) -> Self {
        let (_tx, rx) = watch::channel(Some(store));
        Self { rx }
    }

    /// Create a connection that becomes ready when the returned [`Connector`] is completed
    pub fn pending() -> (Self, Connector) {
        let (tx, rx) = watch::channel(None);
        (Self { rx }, Connector { tx })
    }

    /// Get the store if it is already available
    pub fn store(&self) -> Option<Arc<dyn LogStore>> {
        self.rx.borrow().clone()
    }

    /// Check if the store is available
    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the store to become available
    ///
    /// Fails with [`StoreError::Unavailable`] if the [`Connector`] is dropped
    /// without ever completing the connection.
    pub async fn wait_ready(&self) -> StoreResult<Arc<dyn LogStore>> {
        if let Some(store) = self.store() {
            return Ok(store);
        }

        debug!("Waiting for store connection");
        let mut rx = self.rx.clone();
        let slot = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| StoreError::unavailable("connection closed before becoming ready"))?;

        slot.clone()
            .ok_or_else(|| StoreError::unavailable("connection not ready"))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Connector {
    /// Publish the store to every clone of the connection
    pub fn connect(self, store: Arc<dyn LogStore>) {
        self.tx.send_replace(Some(store));
    }
}
