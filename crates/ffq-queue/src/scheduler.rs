// SPDX-License-Identifier: Apache-2.0

//! Interface to the host scheduler.

/// Receives wakeup events for event-driven components.
pub trait FlowScheduler: Send + Sync {
    /// Signals that the identified component has work available.
    ///
    /// Must be non-blocking and must not call back into the queue. The queue
    /// only invokes this after releasing its write lock; a scheduler that
    /// re-enters the queue from here would deadlock against a concurrent
    /// writer.
    fn register_event(&self, component_id: &str);
}
