//! Tail loop and recovery
//!
//! One task per listen. The task resolves an anchor, opens an awaiting
//! cursor after it, then fetches one entry at a time and dispatches it,
//! yielding to the scheduler between entries. Before every fetch it checks
//! that its generation is still the channel's active one; `close()` clears
//! that signal, so a stale task ends without touching the channel again.
//!
//! ```text
//! Idle -> Starting -> Active -> BrokenDetected -> Recovering -> Starting
//!                         \                   \
//!                          -> Closed (close)   -> Closed (no recreate)
//! ```
//!
//! The task only holds a weak reference to the channel while it waits on
//! the store, so dropping every `Channel` handle ends the loop.

use std::sync::{Arc, Weak};

use caplog_store::{Entry, TailCursor};
use tracing::{debug, info, trace, warn};

use crate::bootstrap;
use crate::channel::ChannelInner;
use crate::error::ChannelError;
use crate::events::{ChannelEvent, TailState};

/// Outcome of the Starting state
enum Start {
    Active(Arc<dyn TailCursor>, Entry),
    Failed,
    Stopped,
}

pub(crate) async fn run(channel: Weak<ChannelInner>, generation: u64) {
    let mut previous: Option<Entry> = None;

    loop {
        let cursor = match start(&channel, generation, previous.as_ref()).await {
            Start::Active(cursor, anchor) => {
                previous = Some(anchor);
                cursor
            }
            Start::Stopped => return,
            Start::Failed => {
                if recover(&channel, generation).await {
                    continue;
                }
                return;
            }
        };

        // Active: a single fetch in flight at a time
        loop {
            let fetched = cursor.next().await;

            let Some(inner) = live(&channel, generation) else {
                cursor.close();
                trace!(generation, "Tail loop no longer current, exiting");
                return;
            };

            match fetched {
                Ok(Some(entry)) => {
                    inner.registry.dispatch(&entry);
                    previous = Some(entry);
                }
                Ok(None) => break,
                Err(source) => {
                    inner.notify_error(ChannelError::Store {
                        channel: inner.name.clone(),
                        source,
                    });
                    break;
                }
            }

            drop(inner);
            tokio::task::yield_now().await;
        }

        let Some(inner) = live(&channel, generation) else {
            return;
        };

        inner.set_state(generation, TailState::BrokenDetected);
        warn!(
            channel = %inner.name,
            anchor = ?previous.as_ref().map(|e| e.id),
            recreate = inner.options.recreate_on_break,
            "Tail cursor terminated unexpectedly"
        );
        inner.notify_error(ChannelError::BrokenCursor {
            channel: inner.name.clone(),
        });
        drop(inner);

        if !recover(&channel, generation).await {
            return;
        }
    }
}

/// Upgrade the channel if `generation` is still its active loop
fn live(channel: &Weak<ChannelInner>, generation: u64) -> Option<Arc<ChannelInner>> {
    channel
        .upgrade()
        .filter(|inner| inner.is_current(generation))
}

async fn start(channel: &Weak<ChannelInner>, generation: u64, previous: Option<&Entry>) -> Start {
    let Some(inner) = live(channel, generation) else {
        return Start::Stopped;
    };
    inner.set_state(generation, TailState::Starting);

    let resolved = bootstrap::resolve_starting_point(&inner.collection, previous).await;
    let (anchor, log) = match resolved {
        Ok(resolved) => resolved,
        Err(err) => {
            // Provisioning failures were already reported by the collection manager
            let reported = matches!(
                err,
                ChannelError::CreateFailed { .. } | ChannelError::StoreUnavailable(_)
            );
            if !reported && inner.is_current(generation) {
                inner.notify_error(err);
            }
            return Start::Failed;
        }
    };

    let cursor = match log
        .open_tail_cursor(anchor.id, &inner.options.tail_options())
        .await
    {
        Ok(cursor) => cursor,
        Err(source) => {
            if inner.is_current(generation) {
                inner.notify_error(ChannelError::Bootstrap {
                    channel: inner.name.clone(),
                    source,
                });
            }
            return Start::Failed;
        }
    };

    if !inner.activate(generation, cursor.clone()) {
        cursor.close();
        return Start::Stopped;
    }

    info!(channel = %inner.name, anchor = %anchor.id, generation, "Channel listening");
    inner.notify(ChannelEvent::Ready { anchor: anchor.id });
    Start::Active(cursor, anchor)
}

/// Decide what happens after a failure; `true` restarts the tail
async fn recover(channel: &Weak<ChannelInner>, generation: u64) -> bool {
    let retry_interval = {
        let Some(inner) = live(channel, generation) else {
            return false;
        };
        if !inner.options.recreate_on_break {
            info!(channel = %inner.name, "Tail recovery disabled; channel stopped listening");
            inner.stop(generation);
            return false;
        }
        inner.set_state(generation, TailState::Recovering);
        inner.options.retry_interval
    };

    tokio::time::sleep(retry_interval).await;

    let Some(inner) = live(channel, generation) else {
        debug!(generation, "Channel closed during recovery");
        return false;
    };
    if let Some(broken) = inner.detach_cursor(generation) {
        broken.close();
    }
    debug!(channel = %inner.name, generation, "Recreating tail");
    true
}
