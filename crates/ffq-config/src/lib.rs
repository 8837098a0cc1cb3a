// SPDX-License-Identifier: Apache-2.0

//! Configuration model for flow file queues.
//!
//! A [`QueueSettings`] value describes one queue: its identity, backpressure
//! thresholds, expiration period, swap threshold and swap-corruption policy.
//! Settings deserialize from the usual configuration formats; data sizes accept
//! expressions like `"1 GB"` and durations accept expressions like `"5 mins"`.

use std::time::Duration;

use serde::Deserialize;

pub mod byte_units;
pub mod duration_units;
mod error;

pub use error::Error;

/// Number of records kept in memory before new arrivals are staged for swap.
pub const DEFAULT_SWAP_THRESHOLD: u32 = 20_000;

/// What to do when a persisted swap batch fails format or integrity checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapCorruptionPolicy {
    /// Report the failure, drop the batch from the replay list and keep the
    /// queue live. Matches the historical behavior; accepts partial data loss.
    #[default]
    DropLocation,
    /// Report the failure and keep the batch in the replay list; every poll
    /// attempt will surface the error again until an operator intervenes.
    Fail,
}

/// Settings for a single flow file queue.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueSettings {
    /// Stable identifier of the queue. Immutable after construction.
    pub identifier: String,

    /// Maximum number of queued records before the queue reports full.
    /// Zero disables the count dimension.
    #[serde(default)]
    pub max_object_count: u64,

    /// Maximum queued bytes before the queue reports full, as a number or a
    /// data-size expression ("1 GB"). Zero disables the size dimension.
    #[serde(default, deserialize_with = "byte_units::deserialize")]
    pub max_byte_count: u64,

    /// Age at which records expire, as a duration expression ("5 mins").
    /// Zero disables expiration.
    #[serde(default, deserialize_with = "duration_units::deserialize")]
    pub expiration: Duration,

    /// Number of records kept in memory before staging into the swap buffer.
    #[serde(default = "default_swap_threshold")]
    pub swap_threshold: u32,

    /// Policy applied when a persisted swap batch cannot be parsed.
    #[serde(default)]
    pub swap_corruption_policy: SwapCorruptionPolicy,
}

fn default_swap_threshold() -> u32 {
    DEFAULT_SWAP_THRESHOLD
}

impl QueueSettings {
    /// Creates settings with the given identifier and every other field at its
    /// default: unbounded, non-expiring, default swap threshold.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            max_object_count: 0,
            max_byte_count: 0,
            expiration: Duration::ZERO,
            swap_threshold: DEFAULT_SWAP_THRESHOLD,
            swap_corruption_policy: SwapCorruptionPolicy::default(),
        }
    }

    /// Sets the backpressure object-count threshold (0 disables).
    #[must_use]
    pub fn with_max_object_count(mut self, count: u64) -> Self {
        self.max_object_count = count;
        self
    }

    /// Sets the backpressure data-size threshold from a byte count (0 disables).
    #[must_use]
    pub fn with_max_byte_count(mut self, bytes: u64) -> Self {
        self.max_byte_count = bytes;
        self
    }

    /// Sets the backpressure data-size threshold from an expression like "1 GB".
    pub fn with_max_byte_count_expr(mut self, expression: &str) -> Result<Self, Error> {
        self.max_byte_count = byte_units::parse(expression)?;
        Ok(self)
    }

    /// Sets the expiration period (zero disables expiration).
    #[must_use]
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Sets the expiration period from an expression like "5 mins".
    pub fn with_expiration_expr(mut self, expression: &str) -> Result<Self, Error> {
        self.expiration = duration_units::parse(expression)?;
        Ok(self)
    }

    /// Sets the swap threshold. Zero is rejected: a queue must be able to hold
    /// at least one record in memory.
    pub fn with_swap_threshold(mut self, threshold: u32) -> Result<Self, Error> {
        if threshold == 0 {
            return Err(Error::InvalidSetting {
                setting: "swap_threshold".to_string(),
                details: "must be at least 1".to_string(),
            });
        }
        self.swap_threshold = threshold;
        Ok(self)
    }

    /// Sets the swap-corruption policy.
    #[must_use]
    pub fn with_swap_corruption_policy(mut self, policy: SwapCorruptionPolicy) -> Self {
        self.swap_corruption_policy = policy;
        self
    }
}
