//! Subscriber registry
//!
//! Maps event names to ordered listener lists. Dispatch works on a snapshot
//! of the list, so listeners added or removed while an entry is being
//! delivered never disturb that delivery. A panicking listener is isolated
//! and does not stop the listeners after it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use caplog_store::Entry;
use dashmap::DashMap;
use tracing::{trace, warn};

use crate::events::{DOCUMENT_EVENT, MESSAGE_EVENT};

/// Callback invoked with each delivered entry
pub type Listener = Arc<dyn Fn(&Entry) + Send + Sync>;

#[derive(Clone)]
struct Registration {
    id: u64,
    listener: Listener,
}

/// Event name to ordered listeners
#[derive(Default)]
pub struct SubscriberRegistry {
    listeners: DashMap<String, Vec<Registration>>,
    next_id: AtomicU64,
    failures: AtomicU64,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a listener for an event name
    ///
    /// Listeners of the same event are called in registration order.
    pub fn register(self: &Arc<Self>, event: &str, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push(Registration { id, listener });

        trace!(event, id, "Registered listener");
        Subscription {
            registry: Arc::downgrade(self),
            event: event.to_string(),
            id,
            active: AtomicBool::new(true),
        }
    }

    fn remove(&self, event: &str, id: u64) -> bool {
        let removed = match self.listeners.get_mut(event) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|r| r.id != id);
                list.len() != before
            }
            None => false,
        };
        self.listeners.remove_if(event, |_, list| list.is_empty());

        if removed {
            trace!(event, id, "Removed listener");
        }
        removed
    }

    /// Number of listeners registered for an event
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map(|l| l.len()).unwrap_or(0)
    }

    /// Number of listener invocations that panicked
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Deliver an entry
    ///
    /// Tagged entries go to their event's listeners and to the generic
    /// `"message"` listeners. Every entry, sentinels included, goes to the
    /// `"document"` listeners.
    pub fn dispatch(&self, entry: &Entry) {
        if let Some(event) = entry.event.as_deref() {
            self.fire(event, entry);
            self.fire(MESSAGE_EVENT, entry);
        }
        self.fire(DOCUMENT_EVENT, entry);
    }

    fn fire(&self, event: &str, entry: &Entry) {
        // Snapshot, then release the shard lock before calling out
        let snapshot: Vec<Registration> = match self.listeners.get(event) {
            Some(list) => list.clone(),
            None => return,
        };

        for registration in snapshot {
            let listener = &registration.listener;
            if catch_unwind(AssertUnwindSafe(|| listener(entry))).is_err() {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event,
                    listener = registration.id,
                    entry = %entry.id,
                    "Listener panicked; continuing delivery"
                );
            }
        }
    }
}

/// Handle returned by a subscribe call
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    registry: Weak<SubscriberRegistry>,
    event: String,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Remove this listener; later calls are no-ops
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event, self.id);
        }
    }

    /// Event name this listener is registered under
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Whether `unsubscribe` has not been called yet
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caplog_store::{EntryId, NewEntry};
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Listener) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |tag: &str| -> Listener {
                let log = log.clone();
                let tag = tag.to_string();
                Arc::new(move |entry: &Entry| {
                    log.lock().push(format!("{}:{}", tag, entry.id.as_u64()));
                })
            }
        };
        (log, make)
    }

    fn tagged(id: u64, event: &str) -> Entry {
        NewEntry::new(event, json!(id)).with_id(EntryId(id))
    }

    #[test]
    fn test_dispatch_routes_by_event() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        registry.register("a", make("a"));
        registry.register("b", make("b"));
        registry.register(MESSAGE_EVENT, make("msg"));
        registry.register(DOCUMENT_EVENT, make("doc"));

        registry.dispatch(&tagged(1, "a"));
        registry.dispatch(&tagged(2, "b"));

        assert_eq!(
            *log.lock(),
            vec!["a:1", "msg:1", "doc:1", "b:2", "msg:2", "doc:2"]
        );
    }

    #[test]
    fn test_sentinel_only_reaches_documents() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        registry.register(MESSAGE_EVENT, make("msg"));
        registry.register(DOCUMENT_EVENT, make("doc"));

        registry.dispatch(&NewEntry::sentinel().with_id(EntryId(9)));
        assert_eq!(*log.lock(), vec!["doc:9"]);
    }

    #[test]
    fn test_registration_order_is_dispatch_order() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        registry.register("e", make("first"));
        registry.register("e", make("second"));
        registry.register("e", make("third"));

        registry.dispatch(&tagged(1, "e"));
        assert_eq!(*log.lock(), vec!["first:1", "second:1", "third:1"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        let first = registry.register("e", make("first"));
        let _second = registry.register("e", make("second"));

        first.unsubscribe();
        assert!(!first.is_active());
        first.unsubscribe();

        registry.dispatch(&tagged(1, "e"));
        assert_eq!(*log.lock(), vec!["second:1"]);
        assert_eq!(registry.listener_count("e"), 1);
    }

    #[test]
    fn test_empty_event_is_dropped() {
        let registry = SubscriberRegistry::new();
        let (_log, make) = recorder();

        let sub = registry.register("e", make("x"));
        assert!(registry.listeners.contains_key("e"));
        sub.unsubscribe();
        assert!(registry.listeners.is_empty());
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        registry.register("e", Arc::new(|_: &Entry| panic!("listener bug")));
        registry.register("e", make("after"));

        registry.dispatch(&tagged(1, "e"));
        registry.dispatch(&tagged(2, "e"));

        assert_eq!(*log.lock(), vec!["after:1", "after:2"]);
        assert_eq!(registry.failure_count(), 2);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_uses_snapshot() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        {
            let victim = victim.clone();
            registry.register(
                "e",
                Arc::new(move |_: &Entry| {
                    if let Some(sub) = victim.lock().as_ref() {
                        sub.unsubscribe();
                    }
                }),
            );
        }
        *victim.lock() = Some(registry.register("e", make("victim")));

        // Still delivered: the snapshot was taken before the removal
        registry.dispatch(&tagged(1, "e"));
        // Gone for the next entry
        registry.dispatch(&tagged(2, "e"));

        assert_eq!(*log.lock(), vec!["victim:1"]);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = SubscriberRegistry::new();
        let (_log, make) = recorder();
        let sub = registry.register("e", make("x"));
        drop(registry);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }
}
