// SPDX-License-Identifier: Apache-2.0

//! Cancellable bulk-drop requests.
//!
//! A [`DropRequest`] is the handle returned by `drop_flow_files`: the worker
//! thread updates its progress fields while the caller polls them. Each field
//! has a single writer (the worker), except the cancel flag which only the
//! cancelling caller sets, so plain atomics are enough.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::accounting::SizeSnapshot;
use crate::flowfile::now_millis;

/// Lifecycle states of a drop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropRequestState {
    /// Created; the worker has not started yet.
    Waiting,
    /// The worker is removing records.
    Dropping,
    /// Every record was removed.
    Complete,
    /// The request was cancelled; `dropped_size` reflects partial progress.
    Canceled,
    /// The worker hit an unrecoverable failure; see
    /// [`DropRequest::failure_reason`].
    Failure,
}

impl DropRequestState {
    /// Whether the request will make no further progress.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DropRequestState::Complete | DropRequestState::Canceled | DropRequestState::Failure
        )
    }

    fn as_u8(self) -> u8 {
        match self {
            DropRequestState::Waiting => 0,
            DropRequestState::Dropping => 1,
            DropRequestState::Complete => 2,
            DropRequestState::Canceled => 3,
            DropRequestState::Failure => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => DropRequestState::Waiting,
            1 => DropRequestState::Dropping,
            2 => DropRequestState::Complete,
            3 => DropRequestState::Canceled,
            _ => DropRequestState::Failure,
        }
    }
}

/// Progress of one queue-emptying request.
#[derive(Debug)]
pub struct DropRequest {
    identifier: String,
    requestor: String,
    state: AtomicU8,
    cancel: AtomicBool,
    original_count: AtomicU64,
    original_bytes: AtomicU64,
    current_count: AtomicU64,
    current_bytes: AtomicU64,
    dropped_count: AtomicU64,
    dropped_bytes: AtomicU64,
    last_updated_ms: AtomicI64,
    failure_reason: Mutex<Option<String>>,
}

impl DropRequest {
    /// Creates a request in the `Waiting` state.
    #[must_use]
    pub fn new(identifier: impl Into<String>, requestor: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            requestor: requestor.into(),
            state: AtomicU8::new(DropRequestState::Waiting.as_u8()),
            cancel: AtomicBool::new(false),
            original_count: AtomicU64::new(0),
            original_bytes: AtomicU64::new(0),
            current_count: AtomicU64::new(0),
            current_bytes: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            dropped_bytes: AtomicU64::new(0),
            last_updated_ms: AtomicI64::new(now_millis()),
            failure_reason: Mutex::new(None),
        }
    }

    /// The request's identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Who asked for the drop.
    #[must_use]
    pub fn requestor(&self) -> &str {
        &self.requestor
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DropRequestState {
        DropRequestState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether cancellation was requested. The worker honors this between
    /// phases; an in-flight batch is never rolled back.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Queue size when the drop began.
    #[must_use]
    pub fn original_size(&self) -> SizeSnapshot {
        SizeSnapshot {
            count: self.original_count.load(Ordering::Acquire),
            bytes: self.original_bytes.load(Ordering::Acquire),
        }
    }

    /// Queue size as of the last progress update.
    #[must_use]
    pub fn current_size(&self) -> SizeSnapshot {
        SizeSnapshot {
            count: self.current_count.load(Ordering::Acquire),
            bytes: self.current_bytes.load(Ordering::Acquire),
        }
    }

    /// Records removed so far.
    #[must_use]
    pub fn dropped_size(&self) -> SizeSnapshot {
        SizeSnapshot {
            count: self.dropped_count.load(Ordering::Acquire),
            bytes: self.dropped_bytes.load(Ordering::Acquire),
        }
    }

    /// When any field last changed, in epoch milliseconds.
    #[must_use]
    pub fn last_updated_ms(&self) -> i64 {
        self.last_updated_ms.load(Ordering::Acquire)
    }

    /// Why the request failed, if it did.
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        self.failure_reason.lock().clone()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
        self.touch();
    }

    pub(crate) fn set_state(&self, state: DropRequestState) {
        self.state.store(state.as_u8(), Ordering::Release);
        self.touch();
    }

    pub(crate) fn set_original_size(&self, size: SizeSnapshot) {
        self.original_count.store(size.count, Ordering::Release);
        self.original_bytes.store(size.bytes, Ordering::Release);
        self.set_current_size(size);
    }

    pub(crate) fn set_current_size(&self, size: SizeSnapshot) {
        self.current_count.store(size.count, Ordering::Release);
        self.current_bytes.store(size.bytes, Ordering::Release);
        self.touch();
    }

    pub(crate) fn add_dropped(&self, size: SizeSnapshot) {
        let _ = self.dropped_count.fetch_add(size.count, Ordering::AcqRel);
        let _ = self.dropped_bytes.fetch_add(size.bytes, Ordering::AcqRel);
        self.touch();
    }

    pub(crate) fn fail(&self, reason: impl Into<String>) {
        *self.failure_reason.lock() = Some(reason.into());
        self.set_state(DropRequestState::Failure);
    }

    fn touch(&self) {
        self.last_updated_ms.store(now_millis(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_is_waiting() {
        let request = DropRequest::new("req-1", "operator");
        assert_eq!(request.state(), DropRequestState::Waiting);
        assert!(!request.is_canceled());
        assert_eq!(request.dropped_size(), SizeSnapshot::default());
    }

    #[test]
    fn progress_accumulates() {
        let request = DropRequest::new("req-2", "operator");
        request.set_original_size(SizeSnapshot {
            count: 10,
            bytes: 100,
        });
        request.add_dropped(SizeSnapshot { count: 4, bytes: 40 });
        request.add_dropped(SizeSnapshot { count: 6, bytes: 60 });

        assert_eq!(request.original_size().count, 10);
        assert_eq!(request.dropped_size().count, 10);
        assert_eq!(request.dropped_size().bytes, 100);
    }

    #[test]
    fn failure_carries_a_reason() {
        let request = DropRequest::new("req-3", "operator");
        request.fail("disk on fire");
        assert_eq!(request.state(), DropRequestState::Failure);
        assert!(request.state().is_terminal());
        assert_eq!(request.failure_reason().as_deref(), Some("disk on fire"));
    }

    #[test]
    fn cancel_only_sets_the_flag() {
        let request = DropRequest::new("req-4", "operator");
        request.cancel();
        assert!(request.is_canceled());
        // The worker, not the caller, moves the state to Canceled.
        assert_eq!(request.state(), DropRequestState::Waiting);
    }
}
