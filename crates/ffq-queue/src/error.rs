// SPDX-License-Identifier: Apache-2.0

//! Errors for the queue crate.
//!
//! Swap errors never escape the queue's public API: the queue reports them and
//! degrades (dropping the affected batch or failing the affected drop request)
//! rather than propagating. They exist so swap manager implementations can tell
//! the queue *what kind* of failure occurred.

/// Errors surfaced by a swap manager implementation.
#[derive(thiserror::Error, Debug)]
pub enum SwapError {
    /// The persisted batch no longer exists.
    #[error("swap location `{location}` was not found")]
    NotFound {
        /// The missing location.
        location: String,
    },

    /// The persisted batch failed format or integrity checks.
    #[error("swap location `{location}` is corrupt: {details}")]
    Corrupt {
        /// The corrupt location.
        location: String,
        /// What failed to parse or verify.
        details: String,
    },

    /// An I/O failure while reading or writing swap content.
    #[error("swap I/O failure: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl SwapError {
    /// Whether this error means the batch is gone rather than unreadable.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, SwapError::NotFound { .. })
    }
}
