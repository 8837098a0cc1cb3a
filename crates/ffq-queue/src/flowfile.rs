// SPDX-License-Identifier: Apache-2.0

//! The record model the queue buffers.
//!
//! Records are opaque to the queue: it only requires the read-only accessors of
//! [`FlowFileRecord`]. Mutation happens in the host engine's repositories; a
//! record handed to the queue is immutable for as long as the queue holds it.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Milliseconds since the UNIX epoch.
#[must_use]
pub fn now_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        // Clock before the epoch; treat as epoch so deadlines stay sane.
        Err(_) => 0,
    }
}

/// Identity of a shared content resource.
///
/// Resources are ordered by container, then section, then id; the queue uses
/// this order as a locality key so records backed by the same resource are
/// polled together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResourceClaim {
    /// Storage container holding the resource.
    pub container: String,
    /// Section within the container.
    pub section: String,
    /// Unique id of the resource within its section.
    pub id: String,
}

/// A record's reference into shared content storage.
///
/// The resource behind a claim is reference counted by the host's claim
/// manager; the queue decrements that count exactly once for every record it
/// drops.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContentClaim {
    /// The shared, reference-counted resource.
    pub resource_claim: ResourceClaim,
    /// Offset of the claimed region within the resource.
    pub offset: u64,
    /// Length of the claimed region in bytes.
    pub length: u64,
}

/// Read-only view of a work item buffered by the queue.
pub trait FlowFileRecord: Send + Sync + 'static {
    /// Stable identifier, unique within the host engine.
    fn id(&self) -> u64;

    /// Content size in bytes.
    fn size(&self) -> u64;

    /// When the record entered the flow, in epoch milliseconds.
    fn entry_date_ms(&self) -> i64;

    /// When the record's lineage began, in epoch milliseconds.
    fn lineage_start_ms(&self) -> i64;

    /// Absolute time at which the current penalty lapses, in epoch
    /// milliseconds. Zero or a past time means the record is not penalized.
    fn penalty_expiration_ms(&self) -> i64;

    /// Whether the record is currently penalized.
    fn is_penalized(&self) -> bool {
        self.penalty_expiration_ms() > now_millis()
    }

    /// The record's claim into shared content storage, if it has content.
    fn content_claim(&self) -> Option<&ContentClaim>;

    /// Offset of the record's content within its claim.
    fn content_claim_offset(&self) -> u64;

    /// The record's attribute map.
    fn attributes(&self) -> &HashMap<String, String>;
}
