//! Per-channel configuration

use std::time::Duration;

use caplog_store::options::millis;
use caplog_store::{BoundedLogOptions, DEFAULT_RETRY_INTERVAL, DEFAULT_SIZE_BYTES, TailOptions};
use serde::{Deserialize, Serialize};

/// Channel name used when none is given
pub const DEFAULT_CHANNEL_NAME: &str = "default";

/// Configuration for a [`Channel`](crate::Channel)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelOptions {
    /// Byte cap of the underlying log
    pub size_bytes: u64,
    /// Entry count cap of the underlying log
    pub max_count: Option<u64>,
    /// Cursor poll interval and delay before recovering a broken tail
    #[serde(with = "millis", rename = "retry_interval_ms")]
    pub retry_interval: Duration,
    /// Recreate the tail after the cursor breaks
    pub recreate_on_break: bool,
    /// Capacity of the notification broadcast channel
    pub event_capacity: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            size_bytes: DEFAULT_SIZE_BYTES,
            max_count: None,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            recreate_on_break: true,
            event_capacity: 1024,
        }
    }
}

impl ChannelOptions {
    /// Set the byte cap
    pub fn with_size_bytes(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Set the entry count cap
    pub fn with_max_count(mut self, max_count: u64) -> Self {
        self.max_count = Some(max_count);
        self
    }

    /// Set the retry interval
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Enable or disable tail recovery after a broken cursor
    pub fn with_recreate_on_break(mut self, recreate: bool) -> Self {
        self.recreate_on_break = recreate;
        self
    }

    /// Set the notification channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Options for creating the bounded log (never strict)
    pub fn log_options(&self) -> BoundedLogOptions {
        BoundedLogOptions {
            size_bytes: self.size_bytes,
            max_count: self.max_count,
            strict: false,
        }
    }

    /// Options for the tail cursor: await data, retry forever
    pub fn tail_options(&self) -> TailOptions {
        TailOptions::awaiting(self.retry_interval)
    }
}
