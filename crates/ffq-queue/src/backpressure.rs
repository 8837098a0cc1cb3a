// SPDX-License-Identifier: Apache-2.0

//! Backpressure thresholds.
//!
//! Either dimension set to zero is unbounded. The queue caches the computed
//! fullness in an atomic flag refreshed on every put, acknowledge, threshold
//! change and expiration sweep, so `is_full` never takes a lock.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::accounting::QueueSize;

/// The two backpressure thresholds of a queue.
#[derive(Debug)]
pub struct BackpressureThresholds {
    max_object_count: AtomicU64,
    max_byte_count: AtomicU64,
}

impl BackpressureThresholds {
    /// Creates thresholds; zero disables a dimension.
    #[must_use]
    pub fn new(max_object_count: u64, max_byte_count: u64) -> Self {
        Self {
            max_object_count: AtomicU64::new(max_object_count),
            max_byte_count: AtomicU64::new(max_byte_count),
        }
    }

    /// The object-count threshold (0 = unbounded).
    #[must_use]
    pub fn max_object_count(&self) -> u64 {
        self.max_object_count.load(Ordering::Acquire)
    }

    /// The data-size threshold in bytes (0 = unbounded).
    #[must_use]
    pub fn max_byte_count(&self) -> u64 {
        self.max_byte_count.load(Ordering::Acquire)
    }

    /// Replaces the object-count threshold.
    pub fn set_max_object_count(&self, count: u64) {
        self.max_object_count.store(count, Ordering::Release);
    }

    /// Replaces the data-size threshold.
    pub fn set_max_byte_count(&self, bytes: u64) {
        self.max_byte_count.store(bytes, Ordering::Release);
    }

    /// Whether the given size reaches either threshold.
    #[must_use]
    pub fn is_exceeded(&self, size: &QueueSize) -> bool {
        let max_count = self.max_object_count();
        let max_bytes = self.max_byte_count();
        (max_count > 0 && size.object_count() >= max_count)
            || (max_bytes > 0 && size.byte_count() >= max_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size_of(count: u64, bytes: u64) -> QueueSize {
        QueueSize {
            active_count: count,
            active_bytes: bytes,
            ..QueueSize::default()
        }
    }

    #[test]
    fn zero_thresholds_never_fill() {
        let thresholds = BackpressureThresholds::new(0, 0);
        assert!(!thresholds.is_exceeded(&size_of(u64::MAX / 2, u64::MAX / 2)));
    }

    #[test]
    fn count_threshold_is_inclusive() {
        let thresholds = BackpressureThresholds::new(2, 0);
        assert!(!thresholds.is_exceeded(&size_of(1, 10)));
        assert!(thresholds.is_exceeded(&size_of(2, 20)));
        assert!(thresholds.is_exceeded(&size_of(3, 30)));
    }

    #[test]
    fn byte_threshold_counts_all_buckets() {
        let thresholds = BackpressureThresholds::new(0, 100);
        let size = QueueSize {
            active_count: 1,
            active_bytes: 40,
            swapped_count: 1,
            swapped_bytes: 40,
            unacknowledged_count: 1,
            unacknowledged_bytes: 20,
        };
        assert!(thresholds.is_exceeded(&size));
    }

    #[test]
    fn thresholds_can_change_at_runtime() {
        let thresholds = BackpressureThresholds::new(2, 0);
        assert!(thresholds.is_exceeded(&size_of(2, 0)));
        thresholds.set_max_object_count(10);
        assert!(!thresholds.is_exceeded(&size_of(2, 0)));
    }
}
