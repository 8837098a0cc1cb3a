// SPDX-License-Identifier: Apache-2.0

//! Contract between the queue and its swap manager.
//!
//! A swap manager persists batches of records when the queue overflows memory
//! and restores them later. The queue calls every method below while holding
//! its write lock, so implementations must never call back into the queue.

use std::fmt;

use crate::error::SwapError;

/// Opaque handle to one persisted batch of records.
///
/// Locations are FIFO-ordered across a queue's lifetime:
/// [`SwapManager::recover_swap_locations`] returns them in the order the
/// batches were produced by [`SwapManager::swap_out`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SwapLocation(String);

impl SwapLocation {
    /// Creates a location from its manager-specific identifier.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    /// The manager-specific identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwapLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregate description of one persisted batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapSummary {
    /// Number of records in the batch.
    pub record_count: u64,
    /// Total content bytes across the batch.
    pub record_bytes: u64,
    /// Greatest record id in the batch, if the batch is non-empty. Used by the
    /// host to seed its id generator after a restart.
    pub max_record_id: Option<u64>,
}

/// Persists and restores batches of records on behalf of a queue.
pub trait SwapManager<R>: Send + Sync {
    /// Persists a batch, returning the location it can be restored from.
    ///
    /// On failure the queue keeps the records in memory and retries at the
    /// next swap-needing event, so implementations must not partially consume
    /// the batch: either the whole batch is durable or none of it is.
    fn swap_out(&self, records: &[R], queue_identifier: &str) -> Result<SwapLocation, SwapError>;

    /// Restores the batch at `location`.
    ///
    /// After a successful return the location is consumed: the queue removes
    /// it from its replay list and will never ask for it again.
    fn swap_in(&self, location: &SwapLocation, queue_identifier: &str)
    -> Result<Vec<R>, SwapError>;

    /// Describes the batch at `location` without restoring it.
    fn swap_summary(&self, location: &SwapLocation) -> Result<SwapSummary, SwapError>;

    /// Enumerates the queue's recoverable batches, oldest first.
    fn recover_swap_locations(&self, queue_identifier: &str)
    -> Result<Vec<SwapLocation>, SwapError>;

    /// Discards all persisted state, for every queue this manager serves.
    fn purge(&self);
}
