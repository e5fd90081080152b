//! In-memory bounded log store
//!
//! [`MemoryLogStore`] keeps every log in process memory. Logs are capped by
//! byte size and optional entry count; the oldest entries are evicted on
//! append. Tail cursors wait for new entries through a [`Notify`] and fall
//! back to polling at their retry interval.
//!
//! Suitable for tests, simulations and single-process hosts.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, trace};

use crate::entry::{Entry, EntryId, Lookup, NewEntry};
use crate::error::{StoreError, StoreResult};
use crate::options::{BoundedLogOptions, TailOptions};
use crate::quota::LogQuota;
use crate::{LogHandle, LogStore, TailCursor};

/// Floor for the cursor poll interval
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// In-memory implementation of [`LogStore`]
#[derive(Default)]
pub struct MemoryLogStore {
    logs: DashMap<String, MemoryLog>,
}

impl MemoryLogStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all logs in the store
    pub fn log_names(&self) -> Vec<String> {
        self.logs.iter().map(|r| r.key().clone()).collect()
    }

    /// Get a log by name
    pub fn log(&self, name: &str) -> Option<MemoryLog> {
        self.logs.get(name).map(|r| r.value().clone())
    }

    /// Terminate every open cursor on a log
    ///
    /// Simulates the storage engine killing cursors (for example after a
    /// failover). Returns `false` if the log does not exist.
    pub fn terminate_cursors(&self, name: &str) -> bool {
        match self.log(name) {
            Some(log) => {
                log.terminate_cursors();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for MemoryLogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLogStore")
            .field("logs", &self.log_names())
            .finish()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn create_bounded_log(
        &self,
        name: &str,
        options: &BoundedLogOptions,
    ) -> StoreResult<Arc<dyn LogHandle>> {
        if name.is_empty() {
            return Err(StoreError::create_failed(name, "log name must not be empty"));
        }
        if options.size_bytes == 0 {
            return Err(StoreError::create_failed(name, "size_bytes must be positive"));
        }
        if options.max_count == Some(0) {
            return Err(StoreError::create_failed(name, "max_count must be positive"));
        }

        match self.logs.entry(name.to_string()) {
            MapEntry::Occupied(_) => Err(StoreError::AlreadyExists(name.to_string())),
            MapEntry::Vacant(slot) => {
                let log = MemoryLog::new(name, LogQuota::from_options(options));
                slot.insert(log.clone());
                info!(
                    log = name,
                    size_bytes = options.size_bytes,
                    max_count = ?options.max_count,
                    "Created bounded log"
                );
                Ok(Arc::new(log))
            }
        }
    }

    async fn open_log(&self, name: &str) -> StoreResult<Arc<dyn LogHandle>> {
        match self.log(name) {
            Some(log) => Ok(Arc::new(log)),
            None => Err(StoreError::LogNotFound(name.to_string())),
        }
    }
}

struct LogState {
    /// Retained entries with their encoded size, oldest first
    entries: VecDeque<(Entry, usize)>,
    total_bytes: u64,
    last_id: EntryId,
    /// Highest id removed by eviction
    evicted_through: EntryId,
    /// Bumped to terminate every cursor opened before
    cursor_epoch: u64,
}

struct LogInner {
    name: String,
    quota: LogQuota,
    state: Mutex<LogState>,
    appended: Notify,
}

/// A single capped log held in memory
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<LogInner>,
}

impl MemoryLog {
    fn new(name: &str, quota: LogQuota) -> Self {
        Self {
            inner: Arc::new(LogInner {
                name: name.to_string(),
                quota,
                state: Mutex::new(LogState {
                    entries: VecDeque::new(),
                    total_bytes: 0,
                    last_id: EntryId::ZERO,
                    evicted_through: EntryId::ZERO,
                    cursor_epoch: 0,
                }),
                appended: Notify::new(),
            }),
        }
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Check if the log holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total encoded size of retained entries
    pub fn total_bytes(&self) -> u64 {
        self.inner.state.lock().total_bytes
    }

    /// Snapshot of retained entries, oldest first
    pub fn entries(&self) -> Vec<Entry> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .map(|(entry, _)| entry.clone())
            .collect()
    }

    /// Quota applied to this log
    pub fn quota(&self) -> LogQuota {
        self.inner.quota
    }

    /// Terminate every cursor currently open on this log
    pub fn terminate_cursors(&self) {
        let epoch = {
            let mut state = self.inner.state.lock();
            state.cursor_epoch += 1;
            state.cursor_epoch
        };
        debug!(log = %self.inner.name, epoch, "Terminating open cursors");
        self.inner.appended.notify_waiters();
    }
}

impl fmt::Debug for MemoryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLog")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .finish()
    }
}

#[async_trait]
impl LogHandle for MemoryLog {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn append(&self, entry: NewEntry) -> StoreResult<Entry> {
        let quota = self.inner.quota;
        let stored = {
            let mut state = self.inner.state.lock();
            let stored = entry.with_id(state.last_id.next());
            let size = stored.encoded_len();

            state.last_id = stored.id;
            state.total_bytes += size as u64;
            state.entries.push_back((stored.clone(), size));

            let evict = quota.entries_to_evict(
                state.entries.iter().map(|(_, size)| *size),
                state.total_bytes,
                state.entries.len() as u64,
            );
            for _ in 0..evict {
                if let Some((old, size)) = state.entries.pop_front() {
                    state.total_bytes -= size as u64;
                    state.evicted_through = old.id;
                    trace!(log = %self.inner.name, id = %old.id, "Evicted entry");
                }
            }

            stored
        };

        trace!(log = %self.inner.name, id = %stored.id, event = ?stored.event, "Appended entry");
        self.inner.appended.notify_waiters();
        Ok(stored)
    }

    async fn find_one(&self, lookup: Lookup) -> StoreResult<Option<Entry>> {
        let state = self.inner.state.lock();
        let found = match lookup {
            Lookup::Latest => state.entries.back().map(|(entry, _)| entry.clone()),
            Lookup::Id(id) => state
                .entries
                .binary_search_by_key(&id, |(entry, _)| entry.id)
                .ok()
                .map(|idx| state.entries[idx].0.clone()),
        };
        Ok(found)
    }

    async fn open_tail_cursor(
        &self,
        after: EntryId,
        options: &TailOptions,
    ) -> StoreResult<Arc<dyn TailCursor>> {
        let (epoch, position) = {
            let state = self.inner.state.lock();
            // A fresh query starts at the oldest retained match
            (state.cursor_epoch, after.max(state.evicted_through))
        };

        debug!(log = %self.inner.name, after = %after, "Opened tail cursor");
        Ok(Arc::new(MemoryTailCursor {
            log: self.inner.clone(),
            options: options.clone(),
            epoch,
            position: Mutex::new(position),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        }))
    }
}

enum Poll {
    Ready(Entry),
    Empty,
    Terminated(&'static str),
}

/// Tailing cursor over a [`MemoryLog`]
pub struct MemoryTailCursor {
    log: Arc<LogInner>,
    options: TailOptions,
    epoch: u64,
    /// Id of the last entry returned
    position: Mutex<EntryId>,
    closed: AtomicBool,
    close_signal: Notify,
}

impl MemoryTailCursor {
    fn poll(&self) -> Poll {
        if self.closed.load(Ordering::SeqCst) {
            return Poll::Terminated("closed");
        }

        let state = self.log.state.lock();
        if state.cursor_epoch != self.epoch {
            return Poll::Terminated("killed by store");
        }

        let mut position = self.position.lock();
        if state.evicted_through > *position {
            return Poll::Terminated("capped position lost");
        }

        let idx = state.entries.partition_point(|(entry, _)| entry.id <= *position);
        match state.entries.get(idx) {
            Some((entry, _)) => {
                *position = entry.id;
                Poll::Ready(entry.clone())
            }
            None => Poll::Empty,
        }
    }
}

#[async_trait]
impl TailCursor for MemoryTailCursor {
    async fn next(&self) -> StoreResult<Option<Entry>> {
        let poll_interval = self.options.retry_interval.max(MIN_POLL_INTERVAL);
        let mut empty_polls = 0u32;

        loop {
            let appended = self.log.appended.notified();
            let closed = self.close_signal.notified();
            tokio::pin!(appended, closed);
            appended.as_mut().enable();
            closed.as_mut().enable();

            match self.poll() {
                Poll::Ready(entry) => return Ok(Some(entry)),
                Poll::Terminated(reason) => {
                    debug!(log = %self.log.name, reason, "Tail cursor terminated");
                    return Ok(None);
                }
                Poll::Empty => {}
            }

            if !self.options.await_data
                || self
                    .options
                    .max_retries
                    .is_some_and(|max| empty_polls >= max)
            {
                return Ok(None);
            }

            tokio::select! {
                _ = &mut appended => {}
                _ = &mut closed => {}
                _ = tokio::time::sleep(poll_interval) => {
                    if self.options.max_retries.is_some() {
                        empty_polls = empty_polls.saturating_add(1);
                    }
                }
            }
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            trace!(log = %self.log.name, "Closing tail cursor");
            self.close_signal.notify_waiters();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
