//! Options for bounded logs and tail cursors

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default byte cap for a bounded log (5 MiB)
pub const DEFAULT_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Default interval between cursor retries
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Options passed when creating a bounded log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundedLogOptions {
    /// Maximum total size of retained entries in bytes
    pub size_bytes: u64,
    /// Maximum number of retained entries
    pub max_count: Option<u64>,
    /// Reject entries that do not match a validator (unused by caplog; always false)
    pub strict: bool,
}

impl Default for BoundedLogOptions {
    fn default() -> Self {
        Self {
            size_bytes: DEFAULT_SIZE_BYTES,
            max_count: None,
            strict: false,
        }
    }
}

impl BoundedLogOptions {
    /// Create options with the given byte cap
    pub fn with_size_bytes(size_bytes: u64) -> Self {
        Self {
            size_bytes,
            ..Default::default()
        }
    }

    /// Set the entry count cap
    pub fn max_count(mut self, max_count: Option<u64>) -> Self {
        self.max_count = max_count;
        self
    }
}

/// Options for opening a tailing cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailOptions {
    /// Block until data arrives instead of returning an exhausted cursor
    pub await_data: bool,
    /// Delay between polls while waiting for data
    #[serde(with = "millis", rename = "retry_interval_ms")]
    pub retry_interval: Duration,
    /// Give up after this many empty polls; `None` retries forever
    pub max_retries: Option<u32>,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            await_data: true,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_retries: None,
        }
    }
}

impl TailOptions {
    /// Awaiting cursor with unlimited retries at the given interval
    pub fn awaiting(retry_interval: Duration) -> Self {
        Self {
            await_data: true,
            retry_interval,
            max_retries: None,
        }
    }
}

/// Serde helper storing a [`Duration`] as integer milliseconds
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
