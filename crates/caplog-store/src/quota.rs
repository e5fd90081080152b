//! Capacity accounting for bounded logs
//!
//! A [`LogQuota`] decides how many of the oldest entries must be evicted so
//! that a log stays within its byte and count caps.

use crate::options::BoundedLogOptions;

/// Byte and count caps for a single log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuota {
    /// Maximum retained bytes
    max_bytes: u64,
    /// Maximum retained entries
    max_count: Option<u64>,
}

impl LogQuota {
    /// Create a quota with the given caps
    pub fn new(max_bytes: u64, max_count: Option<u64>) -> Self {
        Self {
            max_bytes,
            max_count,
        }
    }

    /// Build a quota from log creation options
    pub fn from_options(options: &BoundedLogOptions) -> Self {
        Self::new(options.size_bytes, options.max_count)
    }

    /// Get the byte cap
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Get the count cap
    pub fn max_count(&self) -> Option<u64> {
        self.max_count
    }

    /// Check whether the given totals are over either cap
    pub fn is_exceeded(&self, bytes: u64, count: u64) -> bool {
        bytes > self.max_bytes || self.max_count.is_some_and(|max| count > max)
    }

    /// Count how many of the oldest entries to evict
    ///
    /// `sizes` yields the encoded size of each retained entry, oldest first.
    /// The newest entry is never evicted, even if it alone exceeds the cap.
    pub fn entries_to_evict(
        &self,
        sizes: impl IntoIterator<Item = usize>,
        total_bytes: u64,
        total_count: u64,
    ) -> usize {
        let mut bytes = total_bytes;
        let mut count = total_count;
        let mut evict = 0;

        for size in sizes {
            if count <= 1 || !self.is_exceeded(bytes, count) {
                break;
            }
            bytes = bytes.saturating_sub(size as u64);
            count -= 1;
            evict += 1;
        }

        evict
    }
}
