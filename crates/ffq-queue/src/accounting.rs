// SPDX-License-Identifier: Apache-2.0

//! Lock-free size accounting.
//!
//! All six queue counters live in one immutable [`QueueSize`] tuple published
//! through an [`ArcSwap`]. Every mutation reads the current tuple, builds a new
//! one with the deltas applied and commits it with compare-and-swap, retrying
//! on contention. Readers never lock and always observe the six fields moving
//! together, so `total = active + swapped + unacknowledged` holds at every
//! observable instant.

use std::sync::Arc;

use arc_swap::ArcSwap;

/// A plain (records, bytes) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeSnapshot {
    /// Number of records.
    pub count: u64,
    /// Total content bytes.
    pub bytes: u64,
}

/// An immutable snapshot of the six queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSize {
    /// Records in the in-memory active heap.
    pub active_count: u64,
    /// Content bytes of records in the active heap.
    pub active_bytes: u64,
    /// Records staged in the swap buffer plus records persisted to swap files.
    pub swapped_count: u64,
    /// Content bytes of staged plus persisted records.
    pub swapped_bytes: u64,
    /// Records handed to a consumer and not yet acknowledged.
    pub unacknowledged_count: u64,
    /// Content bytes of unacknowledged records.
    pub unacknowledged_bytes: u64,
}

impl QueueSize {
    /// Total records visible to backpressure: active + swapped + unacknowledged.
    #[must_use]
    pub fn object_count(&self) -> u64 {
        self.active_count + self.swapped_count + self.unacknowledged_count
    }

    /// Total visible content bytes.
    #[must_use]
    pub fn byte_count(&self) -> u64 {
        self.active_bytes + self.swapped_bytes + self.unacknowledged_bytes
    }

    /// Whether the queue holds no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.object_count() == 0
    }

    /// The visible totals as a plain pair.
    #[must_use]
    pub fn totals(&self) -> SizeSnapshot {
        SizeSnapshot {
            count: self.object_count(),
            bytes: self.byte_count(),
        }
    }
}

/// Atomic holder for the current [`QueueSize`].
#[derive(Debug, Default)]
pub struct AtomicQueueSize {
    current: ArcSwap<QueueSize>,
}

impl AtomicQueueSize {
    /// Creates a holder with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot. Wait-free.
    #[must_use]
    pub fn load(&self) -> QueueSize {
        **self.current.load()
    }

    /// Applies `f` to the current snapshot and publishes the result, retrying
    /// the compare-and-swap until it wins. Returns the snapshot it published.
    pub fn update<F>(&self, mut f: F) -> QueueSize
    where
        F: FnMut(QueueSize) -> QueueSize,
    {
        let previous = self.current.rcu(|current| Arc::new(f(**current)));
        f(*previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn totals_sum_all_three_buckets() {
        let size = QueueSize {
            active_count: 1,
            active_bytes: 10,
            swapped_count: 2,
            swapped_bytes: 20,
            unacknowledged_count: 3,
            unacknowledged_bytes: 30,
        };
        assert_eq!(size.object_count(), 6);
        assert_eq!(size.byte_count(), 60);
        assert!(!size.is_empty());
    }

    #[test]
    fn update_returns_published_snapshot() {
        let holder = AtomicQueueSize::new();
        let published = holder.update(|s| QueueSize {
            active_count: s.active_count + 5,
            active_bytes: s.active_bytes + 50,
            ..s
        });
        assert_eq!(published.active_count, 5);
        assert_eq!(holder.load(), published);
    }

    #[test]
    fn concurrent_updates_never_lose_increments() {
        let holder = Arc::new(AtomicQueueSize::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let holder = Arc::clone(&holder);
            handles.push(thread::spawn(move || {
                for _ in 0..1_000 {
                    let _ = holder.update(|s| QueueSize {
                        active_count: s.active_count + 1,
                        active_bytes: s.active_bytes + 2,
                        ..s
                    });
                }
            }));
        }
        for handle in handles {
            handle.join().expect("updater thread should not panic");
        }

        let size = holder.load();
        assert_eq!(size.active_count, 8_000);
        assert_eq!(size.active_bytes, 16_000);
    }
}
