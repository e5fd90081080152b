//! The pub/sub channel
//!
//! A [`Channel`] publishes entries to a capped log and tails that log to
//! deliver new entries to local subscribers. Construction does no I/O: the
//! log is provisioned on the first publish or listen, and the tail loop is
//! started by the first subscribe (or an explicit [`Channel::listen`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use caplog_store::{Connection, Entry, LogHandle, NewEntry, TailCursor};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, instrument, trace};

use crate::collection::CollectionManager;
use crate::error::{ChannelError, ChannelResult};
use crate::events::{ChannelEvent, DOCUMENT_EVENT, MESSAGE_EVENT, TailState};
use crate::options::{ChannelOptions, DEFAULT_CHANNEL_NAME};
use crate::registry::{Listener, SubscriberRegistry, Subscription};
use crate::tail;

/// Marks an active tail loop; its presence is the listening signal
struct ListenSlot {
    generation: u64,
    cursor: Option<Arc<dyn TailCursor>>,
}

pub(crate) struct ChannelInner {
    pub(crate) name: String,
    pub(crate) options: ChannelOptions,
    pub(crate) collection: CollectionManager,
    pub(crate) registry: Arc<SubscriberRegistry>,
    events: broadcast::Sender<ChannelEvent>,
    listening: Mutex<Option<ListenSlot>>,
    state: watch::Sender<TailState>,
    generations: AtomicU64,
}

impl ChannelInner {
    /// Check if `generation` is still the active tail loop
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.listening
            .lock()
            .as_ref()
            .is_some_and(|slot| slot.generation == generation)
    }

    /// Record a state transition of the active tail loop
    pub(crate) fn set_state(&self, generation: u64, state: TailState) -> bool {
        let slot = self.listening.lock();
        if slot.as_ref().is_some_and(|s| s.generation == generation) {
            self.state.send_replace(state);
            true
        } else {
            false
        }
    }

    /// Install a freshly opened cursor and mark the loop active
    pub(crate) fn activate(&self, generation: u64, cursor: Arc<dyn TailCursor>) -> bool {
        let mut slot = self.listening.lock();
        match slot.as_mut() {
            Some(s) if s.generation == generation => {
                s.cursor = Some(cursor);
                self.state.send_replace(TailState::Active);
                true
            }
            _ => false,
        }
    }

    /// Forget the cursor of the active loop (before restarting it)
    pub(crate) fn detach_cursor(&self, generation: u64) -> Option<Arc<dyn TailCursor>> {
        let mut slot = self.listening.lock();
        match slot.as_mut() {
            Some(s) if s.generation == generation => s.cursor.take(),
            _ => None,
        }
    }

    /// End the loop `generation` from inside; no-op if it is no longer current
    pub(crate) fn stop(&self, generation: u64) {
        let taken = {
            let mut slot = self.listening.lock();
            if slot.as_ref().is_some_and(|s| s.generation == generation) {
                self.state.send_replace(TailState::Closed);
                slot.take()
            } else {
                None
            }
        };
        if let Some(cursor) = taken.and_then(|s| s.cursor) {
            cursor.close();
        }
    }

    /// Clear the listening signal, then close the cursor
    fn close(&self) -> bool {
        let taken = {
            let mut slot = self.listening.lock();
            let taken = slot.take();
            if taken.is_some() {
                self.state.send_replace(TailState::Closed);
            }
            taken
        };

        match taken {
            Some(slot) => {
                if let Some(cursor) = slot.cursor {
                    cursor.close();
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn notify(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn notify_error(&self, err: ChannelError) {
        self.notify(ChannelEvent::Error(err));
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if self.close() {
            debug!(channel = %self.name, "Channel dropped while listening; tail closed");
        }
    }
}

/// Publish/subscribe handle over one capped log
///
/// Cloning is cheap; clones share the log, the tail loop and the subscribers.
///
/// # Example
///
/// ```rust,ignore
/// let channel = Channel::new(connection, "jobs", ChannelOptions::default());
///
/// let sub = channel.subscribe(Some("greet"), |message| {
///     println!("hello {}", message["who"]);
/// });
/// channel.wait_until_listening().await?;
///
/// channel.publish("greet", &json!({"who": "world"})).await?;
/// sub.unsubscribe();
/// channel.close();
/// ```
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Create an inert channel; no I/O happens until publish or listen
    pub fn new(connection: Connection, name: impl Into<String>, options: ChannelOptions) -> Self {
        let name = name.into();
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let (state, _) = watch::channel(TailState::Idle);
        let collection =
            CollectionManager::new(name.clone(), connection, options.log_options(), events.clone());

        Self {
            inner: Arc::new(ChannelInner {
                name,
                options,
                collection,
                registry: SubscriberRegistry::new(),
                events,
                listening: Mutex::new(None),
                state,
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Create a channel named `"default"` with default options
    pub fn with_defaults(connection: Connection) -> Self {
        Self::new(connection, DEFAULT_CHANNEL_NAME, ChannelOptions::default())
    }

    /// Get the channel (and log) name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the channel options
    pub fn options(&self) -> &ChannelOptions {
        &self.inner.options
    }

    /// Get the log, provisioning it on first use
    pub async fn ensure_collection(&self) -> ChannelResult<Arc<dyn LogHandle>> {
        self.inner.collection.ensure().await
    }

    /// Append one entry and return it with its store-assigned id
    ///
    /// No retry is attempted on failure.
    #[instrument(skip_all, fields(channel = %self.inner.name, event = %event))]
    pub async fn publish(&self, event: &str, message: impl Serialize) -> ChannelResult<Entry> {
        let message = serde_json::to_value(message)?;
        let log = self.inner.collection.ensure().await?;

        let entry = log
            .append(NewEntry::new(event, message))
            .await
            .map_err(|source| ChannelError::AppendFailed {
                channel: self.inner.name.clone(),
                source,
            })?;

        trace!(id = %entry.id, "Published entry");
        Ok(entry)
    }

    /// Register a listener for an event's payloads and start listening
    ///
    /// `None` subscribes to the generic `"message"` event, which receives the
    /// payload of every tagged entry.
    pub fn subscribe<F>(&self, event: Option<&str>, listener: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let event = event.unwrap_or(MESSAGE_EVENT);
        let listener: Listener = Arc::new(move |entry: &Entry| listener(&entry.message));
        let subscription = self.inner.registry.register(event, listener);
        self.listen();
        subscription
    }

    /// Register a listener for every delivered entry and start listening
    ///
    /// Document listeners also see sentinel entries.
    pub fn subscribe_documents<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Entry) + Send + Sync + 'static,
    {
        let subscription = self
            .inner
            .registry
            .register(DOCUMENT_EVENT, Arc::new(listener));
        self.listen();
        subscription
    }

    /// Start the tail loop; no-op if one is already running
    ///
    /// Must be called from within a Tokio runtime. Without one, the failure
    /// is logged and reported on [`Channel::events`] and the channel stays
    /// not listening.
    pub fn listen(&self) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(channel = %self.inner.name, error = %e, "Cannot listen outside a Tokio runtime");
                self.inner
                    .notify_error(ChannelError::NotListening(self.inner.name.clone()));
                return;
            }
        };

        let generation = {
            let mut slot = self.inner.listening.lock();
            if slot.is_some() {
                trace!(channel = %self.inner.name, "Already listening");
                return;
            }
            let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
            *slot = Some(ListenSlot {
                generation,
                cursor: None,
            });
            self.inner.state.send_replace(TailState::Starting);
            generation
        };

        debug!(channel = %self.inner.name, generation, "Starting tail loop");
        runtime.spawn(tail::run(Arc::downgrade(&self.inner), generation));
    }

    /// Stop listening
    ///
    /// Subscriptions and the log handle are kept; calling [`Channel::listen`]
    /// (or subscribing again) resumes from the newest entry. Idempotent.
    pub fn close(&self) {
        if self.inner.close() {
            debug!(channel = %self.inner.name, "Channel closed");
        }
    }

    /// Current state of the tail loop
    pub fn state(&self) -> TailState {
        *self.inner.state.borrow()
    }

    /// Check if a tail loop is running
    pub fn is_listening(&self) -> bool {
        self.inner.listening.lock().is_some()
    }

    /// Wait until the tail loop is active
    ///
    /// Entries published after this returns are delivered to subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotListening`] if the channel is not listening
    /// or stops listening before it becomes active.
    pub async fn wait_until_listening(&self) -> ChannelResult<()> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, TailState::Active | TailState::Idle | TailState::Closed))
            .await
            .map(|s| *s)
            .map_err(|_| ChannelError::NotListening(self.inner.name.clone()))?;

        match state {
            TailState::Active => Ok(()),
            _ => Err(ChannelError::NotListening(self.inner.name.clone())),
        }
    }

    /// Receive notifications (ready, errors) emitted from now on
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events.subscribe()
    }

    /// Number of listeners registered for an event
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.registry.listener_count(event)
    }

    /// Number of listener invocations that panicked
    pub fn listener_failures(&self) -> u64 {
        self.inner.registry.failure_count()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("provisioned", &self.inner.collection.is_provisioned())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caplog_store::MemoryLogStore;

    fn channel() -> (Arc<MemoryLogStore>, Channel) {
        let store = Arc::new(MemoryLogStore::new());
        let channel = Channel::new(
            Connection::ready(store.clone()),
            "test",
            ChannelOptions::default(),
        );
        (store, channel)
    }

    #[test]
    fn test_new_channel_is_inert() {
        let (store, channel) = channel();
        assert_eq!(channel.state(), TailState::Idle);
        assert!(!channel.is_listening());
        assert!(store.log_names().is_empty());
    }

    #[test]
    fn test_listen_outside_runtime_does_not_panic() {
        let (_store, channel) = channel();
        let mut events = channel.events();

        channel.listen();
        assert!(!channel.is_listening());
        assert!(matches!(
            events.try_recv().unwrap(),
            ChannelEvent::Error(ChannelError::NotListening(_))
        ));
    }

    #[tokio::test]
    async fn test_listen_is_idempotent() {
        let (_store, channel) = channel();
        channel.listen();
        channel.listen();
        channel.wait_until_listening().await.unwrap();
        assert_eq!(channel.state(), TailState::Active);
        assert_eq!(channel.inner.generations.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_relistenable() {
        let (_store, channel) = channel();
        channel.listen();
        channel.wait_until_listening().await.unwrap();

        channel.close();
        channel.close();
        assert_eq!(channel.state(), TailState::Closed);
        assert!(!channel.is_listening());

        channel.listen();
        channel.wait_until_listening().await.unwrap();
        assert!(channel.is_listening());
    }

    #[tokio::test]
    async fn test_wait_until_listening_when_idle() {
        let (_store, channel) = channel();
        let err = channel.wait_until_listening().await.err().unwrap();
        assert!(matches!(err, ChannelError::NotListening(_)));
    }

    #[tokio::test]
    async fn test_publish_provisions_log() {
        let (store, channel) = channel();
        let entry = channel
            .publish("greet", serde_json::json!({"who": "world"}))
            .await
            .unwrap();
        assert_eq!(entry.event.as_deref(), Some("greet"));
        assert_eq!(store.log("test").unwrap().len(), 1);
        // Publishing alone does not start a tail
        assert_eq!(channel.state(), TailState::Idle);
    }

    #[tokio::test]
    async fn test_subscribe_defaults_to_message_event() {
        let (_store, channel) = channel();
        let sub = channel.subscribe(None, |_| {});
        assert_eq!(sub.event(), MESSAGE_EVENT);
        assert_eq!(channel.listener_count(MESSAGE_EVENT), 1);
        assert!(channel.is_listening());
    }
}
