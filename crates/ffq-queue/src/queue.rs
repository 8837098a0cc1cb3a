// SPDX-License-Identifier: Apache-2.0

//! The flow file queue.
//!
//! A [`FlowFileQueue`] buffers records between two processing stages. Records
//! are served in priority order from an in-memory heap; under memory pressure
//! the overflow is staged into a swap buffer and flushed in batches to a
//! [`SwapManager`]. Expired records are diverted to the caller, penalized
//! records wait at the head, and a cached backpressure flag tells the upstream
//! stage when to pause.
//!
//! # Locking
//!
//! One task-fair reader-writer lock guards the active heap, the swap buffer,
//! the persisted-batch ledger and the swap-mode flag. Every mutating operation
//! takes the write lock; `size`, `is_full`, `is_empty` and the configuration
//! getters read atomics only. Scheduler callbacks are invoked strictly after
//! the lock is released.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};

use ffq_config::{QueueSettings, SwapCorruptionPolicy};

use crate::accounting::{AtomicQueueSize, QueueSize, SizeSnapshot};
use crate::backpressure::BackpressureThresholds;
use crate::drop_request::{DropRequest, DropRequestState};
use crate::flowfile::{FlowFileRecord, now_millis};
use crate::heap::RecordHeap;
use crate::prioritizer::{FlowFilePrioritizer, QueuePrioritizer, ReverseComparator};
use crate::provenance::{
    ProvenanceClaim, ProvenanceEventRecord, ProvenanceEventRepository, ProvenanceEventType,
};
use crate::reporting::{EventReporter, Severity};
use crate::repository::{
    ContentClaimManager, FlowFileRepository, RepositoryRecord, RepositoryRecordType,
};
use crate::scheduler::FlowScheduler;
use crate::swap::{SwapLocation, SwapManager};

/// Number of records persisted per swap file.
pub const SWAP_RECORD_BATCH: usize = 10_000;

/// Maximum expired records drained into the caller's collection per poll call.
pub const MAX_EXPIRED_PER_ITER: usize = 100_000;

/// Write-lock waits longer than this are reported for diagnostics.
const LOCK_STALL_WARN: Duration = Duration::from_millis(100);

/// Terminal drop requests are evicted once the map grows past this many
/// entries and the request has been idle for [`DROP_REQUEST_MAX_AGE_MS`].
const DROP_REQUEST_RETENTION: usize = 10;
const DROP_REQUEST_MAX_AGE_MS: i64 = 5 * 60 * 1_000;

const EVENT_CATEGORY_SWAP: &str = "FlowFile Swapping";
const EVENT_CATEGORY_ACCOUNTING: &str = "Queue Accounting";
const EVENT_CATEGORY_PROVENANCE: &str = "Provenance Repository";

/// Caller verdict for each record visited by [`FlowFileQueue::poll_filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Take the record and keep scanning.
    AcceptContinue,
    /// Take the record and stop scanning.
    AcceptTerminate,
    /// Leave the record queued and keep scanning.
    RejectContinue,
    /// Leave the record queued and stop scanning.
    RejectTerminate,
}

impl FilterDecision {
    /// Whether the visited record is taken.
    #[must_use]
    pub fn accepts(self) -> bool {
        matches!(
            self,
            FilterDecision::AcceptContinue | FilterDecision::AcceptTerminate
        )
    }

    /// Whether the scan proceeds to the next record.
    #[must_use]
    pub fn continues(self) -> bool {
        matches!(
            self,
            FilterDecision::AcceptContinue | FilterDecision::RejectContinue
        )
    }
}

/// External services a queue calls out to.
///
/// All of them are injected; the queue holds no global state. The swap manager
/// is invoked while the queue's write lock is held and must never call back.
pub struct QueueServices<R> {
    /// Persists and restores overflow batches.
    pub swap_manager: Arc<dyn SwapManager<R>>,
    /// Durable record metadata store.
    pub flow_file_repository: Arc<dyn FlowFileRepository>,
    /// Provenance event sink.
    pub provenance_repository: Arc<dyn ProvenanceEventRepository>,
    /// Reference counting over shared content resources.
    pub claim_manager: Arc<dyn ContentClaimManager>,
    /// Host scheduler receiving event-driven wakeups.
    pub scheduler: Arc<dyn FlowScheduler>,
    /// Operator-visible event sink.
    pub event_reporter: Arc<dyn EventReporter>,
}

impl<R> Clone for QueueServices<R> {
    fn clone(&self) -> Self {
        Self {
            swap_manager: Arc::clone(&self.swap_manager),
            flow_file_repository: Arc::clone(&self.flow_file_repository),
            provenance_repository: Arc::clone(&self.provenance_repository),
            claim_manager: Arc::clone(&self.claim_manager),
            scheduler: Arc::clone(&self.scheduler),
            event_reporter: Arc::clone(&self.event_reporter),
        }
    }
}

/// One persisted batch and the size it was persisted with.
///
/// Carrying the size in the ledger lets the queue keep its counters exact even
/// when a batch later turns out to be unreadable.
struct SwappedBatch {
    location: SwapLocation,
    record_count: u64,
    record_bytes: u64,
}

impl SwappedBatch {
    fn snapshot(&self) -> SizeSnapshot {
        SizeSnapshot {
            count: self.record_count,
            bytes: self.record_bytes,
        }
    }
}

/// Mutable state guarded by the queue's write lock.
struct Inner<R> {
    active: RecordHeap<R, Arc<QueuePrioritizer<R>>>,
    swap_buffer: VecDeque<R>,
    swap_batches: VecDeque<SwappedBatch>,
    swap_mode: bool,
}

/// A concurrent, prioritized, expirable FIFO with swap-to-disk and
/// backpressure.
pub struct FlowFileQueue<R: FlowFileRecord> {
    identifier: String,
    source_id: String,
    destination_id: String,
    destination_event_driven: AtomicBool,

    inner: RwLock<Inner<R>>,
    prioritizer: ArcSwap<QueuePrioritizer<R>>,
    size: AtomicQueueSize,
    queue_full: AtomicBool,
    thresholds: BackpressureThresholds,
    expiration_ms: AtomicU64,
    swap_threshold: usize,
    corruption_policy: SwapCorruptionPolicy,

    services: QueueServices<R>,
    drop_requests: Mutex<HashMap<String, Arc<DropRequest>>>,
}

impl<R: FlowFileRecord> FlowFileQueue<R> {
    /// Creates a queue connecting `source_id` to `destination_id`.
    ///
    /// The queue starts with no prioritizers; call
    /// [`set_priorities`](Self::set_priorities) to install them.
    pub fn new(
        settings: QueueSettings,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        services: QueueServices<R>,
    ) -> Self {
        let comparator = Arc::new(QueuePrioritizer::default());
        Self {
            identifier: settings.identifier,
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            destination_event_driven: AtomicBool::new(false),
            inner: RwLock::new(Inner {
                active: RecordHeap::new(Arc::clone(&comparator)),
                swap_buffer: VecDeque::new(),
                swap_batches: VecDeque::new(),
                swap_mode: false,
            }),
            prioritizer: ArcSwap::new(comparator),
            size: AtomicQueueSize::new(),
            queue_full: AtomicBool::new(false),
            thresholds: BackpressureThresholds::new(
                settings.max_object_count,
                settings.max_byte_count,
            ),
            expiration_ms: AtomicU64::new(duration_to_millis(settings.expiration)),
            swap_threshold: settings.swap_threshold.max(1) as usize,
            corruption_policy: settings.swap_corruption_policy,
            services,
            drop_requests: Mutex::new(HashMap::new()),
        }
    }

    /// The queue's stable identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Current size across active, swapped and unacknowledged records.
    /// Lock-free.
    #[must_use]
    pub fn size(&self) -> QueueSize {
        self.size.load()
    }

    /// Whether the queue holds no records at all. Lock-free.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size.load().is_empty()
    }

    /// Whether the in-memory active heap is empty. Lock-free.
    #[must_use]
    pub fn is_active_queue_empty(&self) -> bool {
        self.size.load().active_count == 0
    }

    /// Whether either backpressure threshold is reached. Reads the cached
    /// flag; lock-free.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue_full.load(Ordering::Acquire)
    }

    /// Enqueues one record. Never fails; may trigger a swap-out.
    pub fn put(&self, record: R) {
        {
            let mut inner = self.write_lock();
            let bytes = record.size();
            if inner.swap_mode || inner.active.len() >= self.swap_threshold {
                inner.swap_buffer.push_back(record);
                inner.swap_mode = true;
                let _ = self.size.update(|s| QueueSize {
                    swapped_count: s.swapped_count + 1,
                    swapped_bytes: s.swapped_bytes + bytes,
                    ..s
                });
                self.write_swap_files_if_needed(&mut inner);
            } else {
                let _ = self.size.update(|s| QueueSize {
                    active_count: s.active_count + 1,
                    active_bytes: s.active_bytes + bytes,
                    ..s
                });
                inner.active.push(record);
            }
            self.refresh_full_flag();
        }
        self.notify_destination();
    }

    /// Enqueues a batch. The size counters reflect the whole batch atomically.
    pub fn put_all(&self, records: Vec<R>) {
        if records.is_empty() {
            return;
        }
        {
            let mut inner = self.write_lock();
            let added = tally(records.iter());
            if inner.swap_mode || inner.active.len() >= self.swap_threshold {
                inner.swap_buffer.extend(records);
                inner.swap_mode = true;
                let _ = self.size.update(|s| QueueSize {
                    swapped_count: s.swapped_count + added.count,
                    swapped_bytes: s.swapped_bytes + added.bytes,
                    ..s
                });
                self.write_swap_files_if_needed(&mut inner);
            } else {
                let _ = self.size.update(|s| QueueSize {
                    active_count: s.active_count + added.count,
                    active_bytes: s.active_bytes + added.bytes,
                    ..s
                });
                for record in records {
                    inner.active.push(record);
                }
            }
            self.refresh_full_flag();
        }
        self.notify_destination();
    }

    /// Takes the highest-priority deliverable record.
    ///
    /// Expired records encountered on the way are drained into `expired_out`
    /// (up to [`MAX_EXPIRED_PER_ITER`]) so the caller can emit EXPIRE events
    /// and release their content. A penalized record at the head stops the
    /// poll: nothing below it can be due sooner.
    pub fn poll(&self, expired_out: &mut Vec<R>) -> Option<R> {
        let expired_before = expired_out.len();
        let polled = {
            let mut inner = self.write_lock();
            self.migrate_swap_to_active(&mut inner);
            self.poll_one(&mut inner, expired_out)
        };
        if expired_out.len() > expired_before {
            self.refresh_full_flag();
        }
        polled
    }

    /// Takes up to `max_records` deliverable records.
    pub fn poll_batch(&self, max_records: usize, expired_out: &mut Vec<R>) -> Vec<R> {
        let expired_before = expired_out.len();
        let selected = {
            let mut inner = self.write_lock();
            self.migrate_swap_to_active(&mut inner);

            let expiration_ms = self.expiration_ms.load(Ordering::Acquire);
            let now = now_millis();
            let mut selected = Vec::new();
            let mut taken = SizeSnapshot::default();
            let mut expired = SizeSnapshot::default();

            while selected.len() < max_records {
                let Some(record) = inner.active.pop() else {
                    break;
                };
                if is_expired(&record, expiration_ms, now) {
                    expired.count += 1;
                    expired.bytes += record.size();
                    expired_out.push(record);
                    if expired_out.len() >= MAX_EXPIRED_PER_ITER {
                        break;
                    }
                    continue;
                }
                if record.is_penalized() {
                    inner.active.push(record);
                    break;
                }
                taken.count += 1;
                taken.bytes += record.size();
                selected.push(record);
            }

            if taken.count > 0 || expired.count > 0 {
                let _ = self.size.update(|s| QueueSize {
                    active_count: s.active_count.saturating_sub(taken.count + expired.count),
                    active_bytes: s.active_bytes.saturating_sub(taken.bytes + expired.bytes),
                    unacknowledged_count: s.unacknowledged_count + taken.count,
                    unacknowledged_bytes: s.unacknowledged_bytes + taken.bytes,
                    ..s
                });
            }
            selected
        };
        if expired_out.len() > expired_before {
            self.refresh_full_flag();
        }
        selected
    }

    /// Scans from the head, letting `filter` pick records.
    ///
    /// Rejected records are held aside and re-inserted with their priorities
    /// intact once the scan ends. The scan stops at the first penalized head,
    /// when the filter says to stop, or when the heap is exhausted.
    pub fn poll_filter<F>(&self, mut filter: F, expired_out: &mut Vec<R>) -> Vec<R>
    where
        F: FnMut(&R) -> FilterDecision,
    {
        let expired_before = expired_out.len();
        let selected = {
            let mut inner = self.write_lock();
            self.migrate_swap_to_active(&mut inner);

            let expiration_ms = self.expiration_ms.load(Ordering::Acquire);
            let now = now_millis();
            let mut selected = Vec::new();
            let mut rejected = Vec::new();
            let mut taken = SizeSnapshot::default();
            let mut expired = SizeSnapshot::default();

            loop {
                let Some(record) = inner.active.pop() else {
                    break;
                };
                if is_expired(&record, expiration_ms, now) {
                    expired.count += 1;
                    expired.bytes += record.size();
                    expired_out.push(record);
                    if expired_out.len() >= MAX_EXPIRED_PER_ITER {
                        break;
                    }
                    continue;
                }
                if record.is_penalized() {
                    inner.active.push(record);
                    break;
                }
                let decision = filter(&record);
                if decision.accepts() {
                    taken.count += 1;
                    taken.bytes += record.size();
                    selected.push(record);
                } else {
                    rejected.push(record);
                }
                if !decision.continues() {
                    break;
                }
            }

            for record in rejected {
                inner.active.push(record);
            }

            if taken.count > 0 || expired.count > 0 {
                let _ = self.size.update(|s| QueueSize {
                    active_count: s.active_count.saturating_sub(taken.count + expired.count),
                    active_bytes: s.active_bytes.saturating_sub(taken.bytes + expired.bytes),
                    unacknowledged_count: s.unacknowledged_count + taken.count,
                    unacknowledged_bytes: s.unacknowledged_bytes + taken.bytes,
                    ..s
                });
            }
            selected
        };
        if expired_out.len() > expired_before {
            self.refresh_full_flag();
        }
        selected
    }

    /// Finalizes one previously polled record.
    ///
    /// Decrements the unacknowledged counters; if the queue was full and this
    /// acknowledgement unblocked it, the upstream component is woken.
    pub fn acknowledge(&self, record: &R) {
        self.release_unacknowledged(SizeSnapshot {
            count: 1,
            bytes: record.size(),
        });
    }

    /// Finalizes a batch of previously polled records.
    pub fn acknowledge_batch(&self, records: &[R]) {
        if records.is_empty() {
            return;
        }
        self.release_unacknowledged(tally(records.iter()));
    }

    /// Rebuilds the active heap under the given prioritizers.
    pub fn set_priorities(&self, prioritizers: Vec<Arc<dyn FlowFilePrioritizer<R>>>) {
        let comparator = Arc::new(QueuePrioritizer::new(prioritizers));
        let mut inner = self.write_lock();
        inner.active.reorder(Arc::clone(&comparator));
        self.prioritizer.store(comparator);
    }

    /// The configured prioritizers, in evaluation order. Lock-free.
    #[must_use]
    pub fn get_priorities(&self) -> Vec<Arc<dyn FlowFilePrioritizer<R>>> {
        self.prioritizer.load().prioritizers().to_vec()
    }

    /// Replaces the backpressure object-count threshold (0 disables).
    pub fn set_backpressure_object_count_threshold(&self, max_object_count: u64) {
        self.thresholds.set_max_object_count(max_object_count);
        self.refresh_full_flag();
    }

    /// Replaces the backpressure data-size threshold in bytes (0 disables).
    pub fn set_backpressure_data_size_threshold(&self, max_byte_count: u64) {
        self.thresholds.set_max_byte_count(max_byte_count);
        self.refresh_full_flag();
    }

    /// The backpressure object-count threshold (0 = unbounded).
    #[must_use]
    pub fn backpressure_object_count_threshold(&self) -> u64 {
        self.thresholds.max_object_count()
    }

    /// The backpressure data-size threshold in bytes (0 = unbounded).
    #[must_use]
    pub fn backpressure_data_size_threshold(&self) -> u64 {
        self.thresholds.max_byte_count()
    }

    /// Replaces the expiration period. Zero disables expiration.
    pub fn set_expiration_period(&self, period: Duration) {
        self.expiration_ms
            .store(duration_to_millis(period), Ordering::Release);
    }

    /// The current expiration period. Zero means expiration is disabled.
    #[must_use]
    pub fn expiration_period(&self) -> Duration {
        Duration::from_millis(self.expiration_ms.load(Ordering::Acquire))
    }

    /// Controls whether `put` wakes the destination component.
    pub fn set_destination_event_driven(&self, event_driven: bool) {
        self.destination_event_driven
            .store(event_driven, Ordering::Release);
    }

    /// Re-registers persisted swap batches after a restart.
    ///
    /// Returns the greatest record id seen across the recovered batches, for
    /// seeding the host's id generator. Must be invoked before the queue
    /// serves traffic; unreadable batches are reported and skipped.
    pub fn recover_swapped_files(&self) -> Option<u64> {
        let mut inner = self.write_lock();
        let locations = match self
            .services
            .swap_manager
            .recover_swap_locations(&self.identifier)
        {
            Ok(locations) => locations,
            Err(error) => {
                self.report_swap_error(&format!(
                    "failed to enumerate swap files for queue `{}`: {error}",
                    self.identifier
                ));
                return None;
            }
        };

        let mut recovered = SizeSnapshot::default();
        let mut max_record_id = None;
        for location in locations {
            match self.services.swap_manager.swap_summary(&location) {
                Ok(summary) => {
                    recovered.count += summary.record_count;
                    recovered.bytes += summary.record_bytes;
                    max_record_id = max_record_id.max(summary.max_record_id);
                    inner.swap_batches.push_back(SwappedBatch {
                        location,
                        record_count: summary.record_count,
                        record_bytes: summary.record_bytes,
                    });
                }
                Err(error) => {
                    self.report_swap_error(&format!(
                        "cannot recover swap file `{location}` for queue `{}`: {error}",
                        self.identifier
                    ));
                }
            }
        }

        if !inner.swap_batches.is_empty() {
            inner.swap_mode = true;
        }
        if recovered.count > 0 {
            let _ = self.size.update(|s| QueueSize {
                swapped_count: s.swapped_count + recovered.count,
                swapped_bytes: s.swapped_bytes + recovered.bytes,
                ..s
            });
        }
        drop(inner);
        self.refresh_full_flag();
        max_record_id
    }

    /// Discards all persisted swap state. Administrative; records staged in
    /// the in-memory swap buffer are unaffected.
    pub fn purge_swap_files(&self) {
        {
            let mut inner = self.write_lock();
            let purged: SizeSnapshot = inner
                .swap_batches
                .iter()
                .fold(SizeSnapshot::default(), |acc, batch| SizeSnapshot {
                    count: acc.count + batch.record_count,
                    bytes: acc.bytes + batch.record_bytes,
                });
            inner.swap_batches.clear();
            self.services.swap_manager.purge();
            if purged.count > 0 {
                let _ = self.size.update(|s| QueueSize {
                    swapped_count: s.swapped_count.saturating_sub(purged.count),
                    swapped_bytes: s.swapped_bytes.saturating_sub(purged.bytes),
                    ..s
                });
            }
            if inner.swap_buffer.is_empty() && inner.swap_batches.is_empty() {
                inner.swap_mode = false;
            }
        }
        self.refresh_full_flag();
    }

    /// Starts a background worker that empties the queue.
    ///
    /// Returns immediately with the request handle. The worker holds the write
    /// lock for the whole drop, so no record can enter or leave the queue
    /// while it runs.
    pub fn drop_flow_files(
        self: &Arc<Self>,
        request_identifier: &str,
        requestor: &str,
    ) -> Arc<DropRequest> {
        let request = Arc::new(DropRequest::new(request_identifier, requestor));
        {
            let mut requests = self.drop_requests.lock();
            if requests.len() > DROP_REQUEST_RETENTION {
                let horizon = now_millis() - DROP_REQUEST_MAX_AGE_MS;
                requests.retain(|_, entry| {
                    !(entry.state().is_terminal() && entry.last_updated_ms() < horizon)
                });
            }
            let _ = requests.insert(request_identifier.to_string(), Arc::clone(&request));
        }

        let queue = Arc::clone(self);
        let worker_request = Arc::clone(&request);
        let spawned = thread::Builder::new()
            .name(format!("drop-flow-files-{}", self.identifier))
            .spawn(move || queue.execute_drop(&worker_request));
        if let Err(error) = spawned {
            request.fail(format!("failed to spawn drop worker: {error}"));
        }
        request
    }

    /// Requests cancellation of a drop, returning its handle if it exists.
    ///
    /// The worker honors the flag between phases and before each persisted
    /// batch; the batch in flight is not rolled back.
    pub fn cancel_drop(&self, request_identifier: &str) -> Option<Arc<DropRequest>> {
        let requests = self.drop_requests.lock();
        requests.get(request_identifier).map(|request| {
            request.cancel();
            Arc::clone(request)
        })
    }

    /// Looks up a drop request by identifier.
    #[must_use]
    pub fn get_drop_request(&self, request_identifier: &str) -> Option<Arc<DropRequest>> {
        self.drop_requests.lock().get(request_identifier).cloned()
    }

    // ─── internals ──────────────────────────────────────────────────────────

    /// Acquires the write lock, reporting acquisitions that stall.
    fn write_lock(&self) -> RwLockWriteGuard<'_, Inner<R>> {
        let started = Instant::now();
        match self.inner.try_write_for(LOCK_STALL_WARN) {
            Some(guard) => guard,
            None => {
                let guard = self.inner.write();
                tracing::warn!(
                    queue = %self.identifier,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "queue write lock contended"
                );
                guard
            }
        }
    }

    fn refresh_full_flag(&self) {
        let full = self.thresholds.is_exceeded(&self.size.load());
        self.queue_full.store(full, Ordering::Release);
    }

    fn notify_destination(&self) {
        if self.destination_event_driven.load(Ordering::Acquire) {
            self.services.scheduler.register_event(&self.destination_id);
        }
    }

    fn poll_one(&self, inner: &mut Inner<R>, expired_out: &mut Vec<R>) -> Option<R> {
        let expiration_ms = self.expiration_ms.load(Ordering::Acquire);
        let now = now_millis();
        loop {
            let record = inner.active.pop()?;
            if is_expired(&record, expiration_ms, now) {
                let bytes = record.size();
                let _ = self.size.update(|s| QueueSize {
                    active_count: s.active_count.saturating_sub(1),
                    active_bytes: s.active_bytes.saturating_sub(bytes),
                    ..s
                });
                expired_out.push(record);
                if expired_out.len() >= MAX_EXPIRED_PER_ITER {
                    return None;
                }
                continue;
            }
            if record.is_penalized() {
                // The head is the earliest to un-penalize; everything below it
                // is due no sooner.
                inner.active.push(record);
                return None;
            }
            let bytes = record.size();
            let _ = self.size.update(|s| QueueSize {
                active_count: s.active_count.saturating_sub(1),
                active_bytes: s.active_bytes.saturating_sub(bytes),
                unacknowledged_count: s.unacknowledged_count + 1,
                unacknowledged_bytes: s.unacknowledged_bytes + bytes,
                ..s
            });
            return Some(record);
        }
    }

    fn release_unacknowledged(&self, released: SizeSnapshot) {
        let mut clamped = false;
        let _ = self.size.update(|s| {
            clamped = s.unacknowledged_count < released.count
                || s.unacknowledged_bytes < released.bytes;
            QueueSize {
                unacknowledged_count: s.unacknowledged_count.saturating_sub(released.count),
                unacknowledged_bytes: s.unacknowledged_bytes.saturating_sub(released.bytes),
                ..s
            }
        });
        if clamped {
            let message = format!(
                "queue `{}` was acknowledged for records it never handed out; counters clamped",
                self.identifier
            );
            tracing::warn!(queue = %self.identifier, "{message}");
            self.services
                .event_reporter
                .report(Severity::Warning, EVENT_CATEGORY_ACCOUNTING, &message);
        }

        if self.queue_full.load(Ordering::Acquire) {
            let still_full = self.thresholds.is_exceeded(&self.size.load());
            self.queue_full.store(still_full, Ordering::Release);
            if !still_full {
                self.services.scheduler.register_event(&self.source_id);
            }
        }
    }

    /// Refills the active heap from swap. Write lock held.
    ///
    /// Persisted batches replay strictly before the in-memory buffer and in
    /// the order they were persisted; one batch is restored per call.
    fn migrate_swap_to_active(&self, inner: &mut Inner<R>) {
        if inner.active.len() > self.swap_threshold.saturating_sub(SWAP_RECORD_BATCH) {
            return;
        }

        if let Some(batch) = inner.swap_batches.front() {
            let location = batch.location.clone();
            let recorded = batch.snapshot();
            match self.services.swap_manager.swap_in(&location, &self.identifier) {
                Ok(records) => {
                    let _ = inner.swap_batches.pop_front();
                    let restored = tally(records.iter());
                    for record in records {
                        inner.active.push(record);
                    }
                    let _ = self.size.update(|s| QueueSize {
                        active_count: s.active_count + restored.count,
                        active_bytes: s.active_bytes + restored.bytes,
                        swapped_count: s.swapped_count.saturating_sub(recorded.count),
                        swapped_bytes: s.swapped_bytes.saturating_sub(recorded.bytes),
                        ..s
                    });
                }
                Err(error) => {
                    let drop_location = error.is_not_found()
                        || self.corruption_policy == SwapCorruptionPolicy::DropLocation;
                    self.report_swap_error(&format!(
                        "failed to swap in {} records from `{location}` for queue `{}`: {error}{}",
                        recorded.count,
                        self.identifier,
                        if drop_location {
                            "; the batch is dropped from the replay list and its records are lost"
                        } else {
                            ""
                        }
                    ));
                    if drop_location {
                        let _ = inner.swap_batches.pop_front();
                        let _ = self.size.update(|s| QueueSize {
                            swapped_count: s.swapped_count.saturating_sub(recorded.count),
                            swapped_bytes: s.swapped_bytes.saturating_sub(recorded.bytes),
                            ..s
                        });
                    }
                }
            }
        } else {
            // No persisted batches remain, so the buffer can migrate without
            // breaking FIFO order with respect to disk.
            let mut moved = SizeSnapshot::default();
            while inner.active.len() < self.swap_threshold {
                match inner.swap_buffer.pop_front() {
                    Some(record) => {
                        moved.count += 1;
                        moved.bytes += record.size();
                        inner.active.push(record);
                    }
                    None => break,
                }
            }
            if moved.count > 0 {
                let _ = self.size.update(|s| QueueSize {
                    active_count: s.active_count + moved.count,
                    active_bytes: s.active_bytes + moved.bytes,
                    swapped_count: s.swapped_count.saturating_sub(moved.count),
                    swapped_bytes: s.swapped_bytes.saturating_sub(moved.bytes),
                    ..s
                });
            }
        }

        if inner.swap_buffer.is_empty() && inner.swap_batches.is_empty() {
            inner.swap_mode = false;
        }
    }

    /// Flushes full batches of low-priority records to the swap manager.
    /// Write lock held; runs when the swap buffer holds at least one batch.
    fn write_swap_files_if_needed(&self, inner: &mut Inner<R>) {
        if inner.swap_buffer.len() < SWAP_RECORD_BATCH {
            return;
        }
        let batches_to_write = inner.swap_buffer.len() / SWAP_RECORD_BATCH;

        // Merge the heap and the buffer under the reversed comparator so the
        // lowest-priority records surface first; those are the victims.
        let prioritizer = self.prioritizer.load_full();
        let mut merged = inner.active.take_all();
        merged.extend(inner.swap_buffer.drain(..));
        let mut victims = RecordHeap::from_vec(
            ReverseComparator::new(Arc::clone(&prioritizer)),
            merged,
        );

        for _ in 0..batches_to_write {
            let mut batch = Vec::with_capacity(SWAP_RECORD_BATCH.min(victims.len()));
            for _ in 0..SWAP_RECORD_BATCH {
                match victims.pop() {
                    Some(record) => batch.push(record),
                    None => break,
                }
            }
            // Restore priority order within the batch before persisting.
            batch.reverse();
            match self
                .services
                .swap_manager
                .swap_out(&batch, &self.identifier)
            {
                Ok(location) => {
                    let persisted = tally(batch.iter());
                    inner.swap_batches.push_back(SwappedBatch {
                        location,
                        record_count: persisted.count,
                        record_bytes: persisted.bytes,
                    });
                }
                Err(error) => {
                    // The records stay in memory; the next swap-needing event
                    // retries.
                    self.report_swap_error(&format!(
                        "failed to swap out {} records for queue `{}`: {error}",
                        batch.len(),
                        self.identifier
                    ));
                    for record in batch {
                        victims.push(record);
                    }
                    break;
                }
            }
        }

        // Whatever exceeds the swap threshold goes back to the buffer with the
        // highest-priority records nearest the front; the rest refills the
        // active heap.
        let mut buffered = Vec::new();
        while victims.len() > self.swap_threshold {
            if let Some(record) = victims.pop() {
                buffered.push(record);
            }
        }
        buffered.reverse();
        inner.swap_buffer = buffered.into();
        inner.active = RecordHeap::from_vec(prioritizer, victims.into_vec());

        // The write lock owns the active and swapped counters; recompute them
        // outright, folding in the persisted ledger.
        let active_now = tally(inner.active.iter());
        let buffered_now = tally(inner.swap_buffer.iter());
        let persisted_now = inner
            .swap_batches
            .iter()
            .fold(SizeSnapshot::default(), |acc, batch| SizeSnapshot {
                count: acc.count + batch.record_count,
                bytes: acc.bytes + batch.record_bytes,
            });
        let _ = self.size.update(|s| QueueSize {
            active_count: active_now.count,
            active_bytes: active_now.bytes,
            swapped_count: buffered_now.count + persisted_now.count,
            swapped_bytes: buffered_now.bytes + persisted_now.bytes,
            ..s
        });
    }

    fn execute_drop(&self, request: &DropRequest) {
        self.run_drop_phases(request);
        self.refresh_full_flag();
    }

    /// The drop worker body. Holds the write lock from the first record to the
    /// last so no put or poll can interleave with the drop.
    fn run_drop_phases(&self, request: &DropRequest) {
        let mut inner = self.write_lock();
        request.set_state(DropRequestState::Dropping);
        request.set_original_size(self.size.load().totals());

        // Phase 1: the active heap.
        let records = inner.active.take_all();
        if !records.is_empty() {
            let dropped = tally(records.iter());
            if let Err(reason) = self.drop_records(&records, request.requestor()) {
                for record in records {
                    inner.active.push(record);
                }
                request.fail(reason);
                return;
            }
            let _ = self.size.update(|s| QueueSize {
                active_count: s.active_count.saturating_sub(dropped.count),
                active_bytes: s.active_bytes.saturating_sub(dropped.bytes),
                ..s
            });
            request.add_dropped(dropped);
            request.set_current_size(self.size.load().totals());
        }
        if request.is_canceled() {
            request.set_state(DropRequestState::Canceled);
            return;
        }

        // Phase 2: the in-memory swap buffer.
        let records: Vec<R> = inner.swap_buffer.drain(..).collect();
        if !records.is_empty() {
            let dropped = tally(records.iter());
            if let Err(reason) = self.drop_records(&records, request.requestor()) {
                // Keep the records; they move to the active heap so the queue
                // stays serviceable.
                let _ = self.size.update(|s| QueueSize {
                    active_count: s.active_count + dropped.count,
                    active_bytes: s.active_bytes + dropped.bytes,
                    swapped_count: s.swapped_count.saturating_sub(dropped.count),
                    swapped_bytes: s.swapped_bytes.saturating_sub(dropped.bytes),
                    ..s
                });
                for record in records {
                    inner.active.push(record);
                }
                request.fail(reason);
                return;
            }
            let _ = self.size.update(|s| QueueSize {
                swapped_count: s.swapped_count.saturating_sub(dropped.count),
                swapped_bytes: s.swapped_bytes.saturating_sub(dropped.bytes),
                ..s
            });
            request.add_dropped(dropped);
            request.set_current_size(self.size.load().totals());
        }

        // Phase 3: persisted batches, oldest first.
        while let Some(batch) = inner.swap_batches.front() {
            if request.is_canceled() {
                request.set_state(DropRequestState::Canceled);
                return;
            }
            let location = batch.location.clone();
            let recorded = batch.snapshot();
            let records = match self.services.swap_manager.swap_in(&location, &self.identifier) {
                Ok(records) => records,
                Err(error) => {
                    self.report_swap_error(&format!(
                        "drop of queue `{}` failed to swap in `{location}`: {error}",
                        self.identifier
                    ));
                    request.fail(format!("failed to swap in `{location}`: {error}"));
                    return;
                }
            };
            let restored = tally(records.iter());
            match self.drop_records(&records, request.requestor()) {
                Ok(()) => {
                    let _ = inner.swap_batches.pop_front();
                    let _ = self.size.update(|s| QueueSize {
                        swapped_count: s.swapped_count.saturating_sub(recorded.count),
                        swapped_bytes: s.swapped_bytes.saturating_sub(recorded.bytes),
                        ..s
                    });
                    request.add_dropped(restored);
                    request.set_current_size(self.size.load().totals());
                }
                Err(reason) => {
                    // The batch is already off disk; keep its records in the
                    // active heap rather than losing them.
                    let _ = inner.swap_batches.pop_front();
                    let _ = self.size.update(|s| QueueSize {
                        active_count: s.active_count + restored.count,
                        active_bytes: s.active_bytes + restored.bytes,
                        swapped_count: s.swapped_count.saturating_sub(recorded.count),
                        swapped_bytes: s.swapped_bytes.saturating_sub(recorded.bytes),
                        ..s
                    });
                    for record in records {
                        inner.active.push(record);
                    }
                    request.fail(reason);
                    return;
                }
            }
        }

        if inner.swap_buffer.is_empty() && inner.swap_batches.is_empty() {
            inner.swap_mode = false;
        }
        request.set_current_size(self.size.load().totals());
        request.set_state(DropRequestState::Complete);
    }

    /// Durably deletes `records`, releases their claims and emits DROP events.
    fn drop_records(&self, records: &[R], requestor: &str) -> Result<(), String> {
        let mut repository_records = Vec::with_capacity(records.len());
        let mut events = Vec::with_capacity(records.len());
        for record in records {
            repository_records.push(RepositoryRecord {
                queue_identifier: self.identifier.clone(),
                record_type: RepositoryRecordType::Delete,
                record_id: record.id(),
                content_claim: record.content_claim().cloned(),
            });
            events.push(
                ProvenanceEventRecord::builder(ProvenanceEventType::Drop)
                    .flow_file_id(record.id())
                    .source_queue_identifier(self.identifier.clone())
                    .lineage_start_ms(record.lineage_start_ms())
                    .attributes(record.attributes().clone())
                    .details(format!("FlowFile Queue emptied by {requestor}"))
                    .content_claim(record.content_claim().map(|claim| ProvenanceClaim {
                        container: claim.resource_claim.container.clone(),
                        section: claim.resource_claim.section.clone(),
                        claim_id: claim.resource_claim.id.clone(),
                        offset: claim.offset,
                        size: record.size(),
                    }))
                    .build(),
            );
        }

        self.services
            .flow_file_repository
            .update_repository(repository_records)
            .map_err(|error| format!("failed to persist record deletions: {error}"))?;

        // Deletions are durable; release each record's claim exactly once.
        for record in records {
            if let Some(claim) = record.content_claim() {
                self.services.claim_manager.decrement_claimant_count(claim);
            }
        }

        if let Err(error) = self.services.provenance_repository.register_events(events) {
            // Best-effort once the deletions are durable.
            let message = format!(
                "failed to register DROP events for queue `{}`: {error}",
                self.identifier
            );
            tracing::warn!(queue = %self.identifier, "{message}");
            self.services
                .event_reporter
                .report(Severity::Warning, EVENT_CATEGORY_PROVENANCE, &message);
        }
        Ok(())
    }

    fn report_swap_error(&self, message: &str) {
        tracing::error!(queue = %self.identifier, "{message}");
        self.services
            .event_reporter
            .report(Severity::Error, EVENT_CATEGORY_SWAP, message);
    }
}

fn duration_to_millis(period: Duration) -> u64 {
    u64::try_from(period.as_millis()).unwrap_or(u64::MAX)
}

fn is_expired<R: FlowFileRecord>(record: &R, expiration_ms: u64, now: i64) -> bool {
    if expiration_ms == 0 {
        return false;
    }
    let deadline = record
        .entry_date_ms()
        .saturating_add(i64::try_from(expiration_ms).unwrap_or(i64::MAX));
    now >= deadline
}

fn tally<'a, R, I>(records: I) -> SizeSnapshot
where
    R: FlowFileRecord + 'a,
    I: Iterator<Item = &'a R>,
{
    let mut snapshot = SizeSnapshot::default();
    for record in records {
        snapshot.count += 1;
        snapshot.bytes += record.size();
    }
    snapshot
}
