// SPDX-License-Identifier: Apache-2.0

//! Record ordering.
//!
//! [`QueuePrioritizer`] defines the total order the active heap serves in:
//! penalty precedence first, then the user-configured prioritizers, then
//! content locality, then record id as the FIFO fallback. The swap-out path
//! reuses the same order through [`ReverseComparator`] to pick its victims.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::flowfile::FlowFileRecord;

/// A total order over records.
pub trait RecordComparator<R>: Send + Sync {
    /// Compares two records; `Less` means `a` is served before `b`.
    fn compare(&self, a: &R, b: &R) -> Ordering;
}

impl<R, C> RecordComparator<R> for Arc<C>
where
    C: RecordComparator<R> + ?Sized,
{
    fn compare(&self, a: &R, b: &R) -> Ordering {
        (**self).compare(a, b)
    }
}

/// User-supplied ordering applied between penalty handling and locality.
pub trait FlowFilePrioritizer<R>: Send + Sync {
    /// Compares two records; `Less` means `a` is served before `b`.
    fn compare(&self, a: &R, b: &R) -> Ordering;
}

/// The queue's composite comparator.
///
/// Evaluated strictly in sequence until a comparison is decisive:
///
/// 1. non-penalized records before penalized ones;
/// 2. among penalized records, the earlier penalty expiry first;
/// 3. the configured [`FlowFilePrioritizer`]s, first non-equal verdict wins;
/// 4. records without a content claim first, then claim order, then claim
///    offset, so records sharing a resource read sequentially;
/// 5. ascending record id.
pub struct QueuePrioritizer<R> {
    prioritizers: Vec<Arc<dyn FlowFilePrioritizer<R>>>,
}

impl<R> std::fmt::Debug for QueuePrioritizer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuePrioritizer")
            .field("prioritizers", &self.prioritizers.len())
            .finish()
    }
}

impl<R> Default for QueuePrioritizer<R> {
    fn default() -> Self {
        Self {
            prioritizers: Vec::new(),
        }
    }
}

impl<R> QueuePrioritizer<R> {
    /// Creates a comparator running the given prioritizers in order.
    #[must_use]
    pub fn new(prioritizers: Vec<Arc<dyn FlowFilePrioritizer<R>>>) -> Self {
        Self { prioritizers }
    }

    /// The configured prioritizers, in evaluation order.
    #[must_use]
    pub fn prioritizers(&self) -> &[Arc<dyn FlowFilePrioritizer<R>>] {
        &self.prioritizers
    }
}

impl<R: FlowFileRecord> RecordComparator<R> for QueuePrioritizer<R> {
    fn compare(&self, a: &R, b: &R) -> Ordering {
        match (a.is_penalized(), b.is_penalized()) {
            (false, true) => return Ordering::Less,
            (true, false) => return Ordering::Greater,
            (true, true) => {
                let by_expiry = a.penalty_expiration_ms().cmp(&b.penalty_expiration_ms());
                if by_expiry != Ordering::Equal {
                    return by_expiry;
                }
            }
            (false, false) => {}
        }

        for prioritizer in &self.prioritizers {
            let verdict = prioritizer.compare(a, b);
            if verdict != Ordering::Equal {
                return verdict;
            }
        }

        match (a.content_claim(), b.content_claim()) {
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(claim_a), Some(claim_b)) => {
                let by_resource = claim_a.resource_claim.cmp(&claim_b.resource_claim);
                if by_resource != Ordering::Equal {
                    return by_resource;
                }
                let by_offset = a.content_claim_offset().cmp(&b.content_claim_offset());
                if by_offset != Ordering::Equal {
                    return by_offset;
                }
            }
            (None, None) => {}
        }

        a.id().cmp(&b.id())
    }
}

/// Adapter that inverts another comparator.
///
/// Used by the swap-out path: popping from a heap ordered by the reversed
/// comparator yields the lowest-priority records first, which are exactly the
/// ones to persist.
#[derive(Debug)]
pub struct ReverseComparator<C> {
    inner: C,
}

impl<C> ReverseComparator<C> {
    /// Wraps `inner`, inverting its order.
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<R, C: RecordComparator<R>> RecordComparator<R> for ReverseComparator<C> {
    fn compare(&self, a: &R, b: &R) -> Ordering {
        self.inner.compare(b, a)
    }
}
