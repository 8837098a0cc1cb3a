// SPDX-License-Identifier: Apache-2.0

//! In-memory collaborators for tests and embedding hosts.
//!
//! Everything here is deterministic and synchronous: a swap manager backed by
//! a map, repositories that collect what they are given, and recorders for
//! scheduler events and operator reports. The queue's behavior tests are
//! written against these doubles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::SwapError;
use crate::flowfile::{ContentClaim, FlowFileRecord, ResourceClaim, now_millis};
use crate::provenance::{ProvenanceEventRecord, ProvenanceEventRepository};
use crate::queue::QueueServices;
use crate::reporting::{EventReporter, Severity};
use crate::repository::{ContentClaimManager, FlowFileRepository, RepositoryRecord};
use crate::scheduler::FlowScheduler;
use crate::swap::{SwapLocation, SwapManager, SwapSummary};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A simple, fully owned record for exercising the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TestRecord {
    id: u64,
    size: u64,
    entry_date_ms: i64,
    lineage_start_ms: i64,
    penalty_expiration_ms: i64,
    content_claim: Option<ContentClaim>,
    attributes: HashMap<String, String>,
}

impl TestRecord {
    /// Creates a record entering the flow now.
    #[must_use]
    pub fn new(id: u64, size: u64) -> Self {
        let now = now_millis();
        Self {
            id,
            size,
            entry_date_ms: now,
            lineage_start_ms: now,
            penalty_expiration_ms: 0,
            content_claim: None,
            attributes: HashMap::new(),
        }
    }

    /// Overrides the entry date.
    #[must_use]
    pub fn entered_at(mut self, entry_date_ms: i64) -> Self {
        self.entry_date_ms = entry_date_ms;
        self
    }

    /// Penalizes the record until the given instant.
    #[must_use]
    pub fn penalized_until(mut self, penalty_expiration_ms: i64) -> Self {
        self.penalty_expiration_ms = penalty_expiration_ms;
        self
    }

    /// Attaches a content claim at the given offset; the claimed length is the
    /// record's size.
    #[must_use]
    pub fn with_claim(
        mut self,
        container: impl Into<String>,
        section: impl Into<String>,
        claim_id: impl Into<String>,
        offset: u64,
    ) -> Self {
        self.content_claim = Some(ContentClaim {
            resource_claim: ResourceClaim {
                container: container.into(),
                section: section.into(),
                id: claim_id.into(),
            },
            offset,
            length: self.size,
        });
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attributes.insert(key.into(), value.into());
        self
    }
}

impl FlowFileRecord for TestRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn entry_date_ms(&self) -> i64 {
        self.entry_date_ms
    }

    fn lineage_start_ms(&self) -> i64 {
        self.lineage_start_ms
    }

    fn penalty_expiration_ms(&self) -> i64 {
        self.penalty_expiration_ms
    }

    fn content_claim(&self) -> Option<&ContentClaim> {
        self.content_claim.as_ref()
    }

    fn content_claim_offset(&self) -> u64 {
        self.content_claim.as_ref().map_or(0, |claim| claim.offset)
    }

    fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }
}

struct SwapStore<R> {
    sequence: u64,
    batches: HashMap<String, Vec<R>>,
    corrupt: HashSet<String>,
    // (queue identifier, location) pairs in persistence order.
    order: Vec<(String, String)>,
    swap_in_order: Vec<String>,
}

type SwapInHook = Box<dyn Fn(u64) + Send + Sync>;

/// Map-backed swap manager with failure injection.
pub struct InMemorySwapManager<R> {
    store: Mutex<SwapStore<R>>,
    fail_swap_out: AtomicBool,
    swap_out_calls: AtomicU64,
    swap_in_calls: AtomicU64,
    swap_in_hook: Mutex<Option<SwapInHook>>,
}

impl<R> Default for InMemorySwapManager<R> {
    fn default() -> Self {
        Self {
            store: Mutex::new(SwapStore {
                sequence: 0,
                batches: HashMap::new(),
                corrupt: HashSet::new(),
                order: Vec::new(),
                swap_in_order: Vec::new(),
            }),
            fail_swap_out: AtomicBool::new(false),
            swap_out_calls: AtomicU64::new(0),
            swap_in_calls: AtomicU64::new(0),
            swap_in_hook: Mutex::new(None),
        }
    }
}

impl<R> InMemorySwapManager<R> {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `swap_out` was invoked (including failed attempts).
    #[must_use]
    pub fn swap_out_calls(&self) -> u64 {
        self.swap_out_calls.load(Ordering::Acquire)
    }

    /// How many times `swap_in` was invoked.
    #[must_use]
    pub fn swap_in_calls(&self) -> u64 {
        self.swap_in_calls.load(Ordering::Acquire)
    }

    /// The locations passed to `swap_in`, in call order.
    #[must_use]
    pub fn swap_in_order(&self) -> Vec<String> {
        self.store.lock().swap_in_order.clone()
    }

    /// Number of batches currently persisted.
    #[must_use]
    pub fn stored_batch_count(&self) -> usize {
        self.store.lock().batches.len()
    }

    /// Makes every subsequent `swap_out` fail with an I/O error.
    pub fn set_fail_swap_out(&self, fail: bool) {
        self.fail_swap_out.store(fail, Ordering::Release);
    }

    /// Installs a hook invoked with the 1-based call index at the start of
    /// every `swap_in`.
    pub fn set_swap_in_hook(&self, hook: impl Fn(u64) + Send + Sync + 'static) {
        *self.swap_in_hook.lock() = Some(Box::new(hook));
    }

    /// Deletes a persisted batch behind the queue's back, so the next
    /// `swap_in` reports it missing.
    pub fn vanish(&self, location: &SwapLocation) {
        let _ = self.store.lock().batches.remove(location.as_str());
    }

    /// Marks a persisted batch as unparseable.
    pub fn mark_corrupt(&self, location: &SwapLocation) {
        let _ = self
            .store
            .lock()
            .corrupt
            .insert(location.as_str().to_string());
    }
}

impl<R> SwapManager<R> for InMemorySwapManager<R>
where
    R: FlowFileRecord + Clone,
{
    fn swap_out(&self, records: &[R], queue_identifier: &str) -> Result<SwapLocation, SwapError> {
        let _ = self.swap_out_calls.fetch_add(1, Ordering::AcqRel);
        if self.fail_swap_out.load(Ordering::Acquire) {
            return Err(SwapError::Io {
                source: std::io::Error::other("injected swap-out failure"),
            });
        }
        let mut store = self.store.lock();
        store.sequence += 1;
        let location = format!("mem-swap-{queue_identifier}-{:08}", store.sequence);
        let _ = store.batches.insert(location.clone(), records.to_vec());
        store
            .order
            .push((queue_identifier.to_string(), location.clone()));
        Ok(SwapLocation::new(location))
    }

    fn swap_in(
        &self,
        location: &SwapLocation,
        _queue_identifier: &str,
    ) -> Result<Vec<R>, SwapError> {
        let call = self.swap_in_calls.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(hook) = self.swap_in_hook.lock().as_ref() {
            hook(call);
        }

        let mut store = self.store.lock();
        store.swap_in_order.push(location.as_str().to_string());
        if store.corrupt.contains(location.as_str()) {
            return Err(SwapError::Corrupt {
                location: location.as_str().to_string(),
                details: "injected corruption".to_string(),
            });
        }
        let records = store
            .batches
            .remove(location.as_str())
            .ok_or_else(|| SwapError::NotFound {
                location: location.as_str().to_string(),
            })?;
        store
            .order
            .retain(|(_, stored)| stored.as_str() != location.as_str());
        Ok(records)
    }

    fn swap_summary(&self, location: &SwapLocation) -> Result<SwapSummary, SwapError> {
        let store = self.store.lock();
        if store.corrupt.contains(location.as_str()) {
            return Err(SwapError::Corrupt {
                location: location.as_str().to_string(),
                details: "injected corruption".to_string(),
            });
        }
        let records = store
            .batches
            .get(location.as_str())
            .ok_or_else(|| SwapError::NotFound {
                location: location.as_str().to_string(),
            })?;
        Ok(SwapSummary {
            record_count: records.len() as u64,
            record_bytes: records.iter().map(FlowFileRecord::size).sum(),
            max_record_id: records.iter().map(FlowFileRecord::id).max(),
        })
    }

    fn recover_swap_locations(
        &self,
        queue_identifier: &str,
    ) -> Result<Vec<SwapLocation>, SwapError> {
        let store = self.store.lock();
        Ok(store
            .order
            .iter()
            .filter(|(queue, _)| queue == queue_identifier)
            .map(|(_, location)| SwapLocation::new(location.clone()))
            .collect())
    }

    fn purge(&self) {
        let mut store = self.store.lock();
        store.batches.clear();
        store.corrupt.clear();
        store.order.clear();
    }
}

/// Repository double that collects every change it is handed.
#[derive(Default)]
pub struct CollectingRepository {
    records: Mutex<Vec<RepositoryRecord>>,
    fail: AtomicBool,
}

impl CollectingRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything persisted so far.
    #[must_use]
    pub fn records(&self) -> Vec<RepositoryRecord> {
        self.records.lock().clone()
    }

    /// Makes every subsequent update fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Release);
    }
}

impl FlowFileRepository for CollectingRepository {
    fn update_repository(&self, records: Vec<RepositoryRecord>) -> Result<(), std::io::Error> {
        if self.fail.load(Ordering::Acquire) {
            return Err(std::io::Error::other("injected repository failure"));
        }
        self.records.lock().extend(records);
        Ok(())
    }
}

/// Provenance double that collects every event.
#[derive(Default)]
pub struct CollectingProvenance {
    events: Mutex<Vec<ProvenanceEventRecord>>,
}

impl CollectingProvenance {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event registered so far.
    #[must_use]
    pub fn events(&self) -> Vec<ProvenanceEventRecord> {
        self.events.lock().clone()
    }
}

impl ProvenanceEventRepository for CollectingProvenance {
    fn register_events(&self, events: Vec<ProvenanceEventRecord>) -> Result<(), std::io::Error> {
        self.events.lock().extend(events);
        Ok(())
    }
}

/// Claim manager double that records every decrement.
#[derive(Default)]
pub struct CountingClaimManager {
    decrements: Mutex<Vec<ContentClaim>>,
}

impl CountingClaimManager {
    /// Creates a manager with no recorded decrements.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The claims decremented so far, in call order.
    #[must_use]
    pub fn decrements(&self) -> Vec<ContentClaim> {
        self.decrements.lock().clone()
    }
}

impl ContentClaimManager for CountingClaimManager {
    fn decrement_claimant_count(&self, claim: &ContentClaim) {
        self.decrements.lock().push(claim.clone());
    }
}

/// Scheduler double recording every wakeup.
#[derive(Default)]
pub struct RecordingScheduler {
    events: Mutex<Vec<String>>,
}

impl RecordingScheduler {
    /// Creates a scheduler with no recorded events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every component id woken so far, in call order.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// How many wakeups the given component received.
    #[must_use]
    pub fn events_for(&self, component_id: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|id| *id == component_id)
            .count()
    }
}

impl FlowScheduler for RecordingScheduler {
    fn register_event(&self, component_id: &str) {
        self.events.lock().push(component_id.to_string());
    }
}

/// Event reporter double recording every report.
#[derive(Default)]
pub struct RecordingEventReporter {
    reports: Mutex<Vec<(Severity, String, String)>>,
}

impl RecordingEventReporter {
    /// Creates a reporter with no recorded events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every report so far as (severity, category, message).
    #[must_use]
    pub fn reports(&self) -> Vec<(Severity, String, String)> {
        self.reports.lock().clone()
    }

    /// How many reports were made at the given severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|(reported, _, _)| *reported == severity)
            .count()
    }
}

impl EventReporter for RecordingEventReporter {
    fn report(&self, severity: Severity, category: &str, message: &str) {
        self.reports
            .lock()
            .push((severity, category.to_string(), message.to_string()));
    }
}

/// The full set of doubles a queue test needs, pre-wired.
pub struct TestServices {
    /// The swap manager double.
    pub swap_manager: Arc<InMemorySwapManager<TestRecord>>,
    /// The record repository double.
    pub flow_file_repository: Arc<CollectingRepository>,
    /// The provenance repository double.
    pub provenance_repository: Arc<CollectingProvenance>,
    /// The claim manager double.
    pub claim_manager: Arc<CountingClaimManager>,
    /// The scheduler double.
    pub scheduler: Arc<RecordingScheduler>,
    /// The event reporter double.
    pub event_reporter: Arc<RecordingEventReporter>,
}

impl Default for TestServices {
    fn default() -> Self {
        Self {
            swap_manager: Arc::new(InMemorySwapManager::new()),
            flow_file_repository: Arc::new(CollectingRepository::new()),
            provenance_repository: Arc::new(CollectingProvenance::new()),
            claim_manager: Arc::new(CountingClaimManager::new()),
            scheduler: Arc::new(RecordingScheduler::new()),
            event_reporter: Arc::new(RecordingEventReporter::new()),
        }
    }
}

impl TestServices {
    /// Creates a fresh set of doubles.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires the doubles into the queue's service bundle.
    #[must_use]
    pub fn services(&self) -> QueueServices<TestRecord> {
        QueueServices {
            swap_manager: Arc::clone(&self.swap_manager) as Arc<dyn SwapManager<TestRecord>>,
            flow_file_repository: Arc::clone(&self.flow_file_repository)
                as Arc<dyn FlowFileRepository>,
            provenance_repository: Arc::clone(&self.provenance_repository)
                as Arc<dyn ProvenanceEventRepository>,
            claim_manager: Arc::clone(&self.claim_manager) as Arc<dyn ContentClaimManager>,
            scheduler: Arc::clone(&self.scheduler) as Arc<dyn FlowScheduler>,
            event_reporter: Arc::clone(&self.event_reporter) as Arc<dyn EventReporter>,
        }
    }
}
