// SPDX-License-Identifier: Apache-2.0

//! Interfaces to the host engine's record metadata stores.

use crate::flowfile::ContentClaim;

/// Kind of change conveyed by a [`RepositoryRecord`].
///
/// The queue only ever emits deletions; other kinds belong to the host engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryRecordType {
    /// The record was removed from the flow.
    Delete,
}

/// One durable change to the record repository.
#[derive(Debug, Clone)]
pub struct RepositoryRecord {
    /// Identifier of the queue the record belonged to.
    pub queue_identifier: String,
    /// The kind of change.
    pub record_type: RepositoryRecordType,
    /// Id of the affected record.
    pub record_id: u64,
    /// Content claim to release when the change is a deletion.
    pub content_claim: Option<ContentClaim>,
}

/// Durable store of record metadata.
pub trait FlowFileRepository: Send + Sync {
    /// Persists the given changes. The changes must be durable when this
    /// returns: the queue reports a drop request `Complete` only after this
    /// call succeeds for every dropped record.
    fn update_repository(&self, records: Vec<RepositoryRecord>) -> Result<(), std::io::Error>;
}

/// Reference counting over shared content resources.
pub trait ContentClaimManager: Send + Sync {
    /// Decrements the claimant count of the given claim. The queue invokes
    /// this exactly once per record it drops.
    fn decrement_claimant_count(&self, claim: &ContentClaim);
}
