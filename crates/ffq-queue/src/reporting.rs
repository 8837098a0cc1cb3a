// SPDX-License-Identifier: Apache-2.0

//! Operator-visible event reporting.
//!
//! Swap I/O failures and accounting corrections must reach a human, not just a
//! log file. The host engine supplies an [`EventReporter`] that surfaces these
//! in its UI or alerting pipeline.

/// Severity of a reported event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Something unexpected happened but the queue corrected for it.
    Warning,
    /// Data was lost or an operation failed.
    Error,
}

/// Sink for operator-visible events.
pub trait EventReporter: Send + Sync {
    /// Reports one event under the given category.
    fn report(&self, severity: Severity, category: &str, message: &str);
}
