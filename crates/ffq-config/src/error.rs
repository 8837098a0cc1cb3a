// SPDX-License-Identifier: Apache-2.0

//! Errors for the config crate.

/// Errors raised while parsing or validating queue configuration.
///
/// Configuration errors are always raised synchronously from the parser or
/// setter that detected them; no queue state is mutated.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A data-size expression could not be parsed.
    #[error("invalid data size expression `{expression}`: {details}")]
    InvalidByteSize {
        /// The expression as provided by the user.
        expression: String,
        /// Why parsing failed.
        details: String,
    },

    /// A duration expression could not be parsed.
    #[error("invalid duration expression `{expression}`: {details}")]
    InvalidDuration {
        /// The expression as provided by the user.
        expression: String,
        /// Why parsing failed.
        details: String,
    },

    /// A setting was structurally valid but semantically unacceptable.
    #[error("invalid setting `{setting}`: {details}")]
    InvalidSetting {
        /// Name of the offending setting.
        setting: String,
        /// Why the value was rejected.
        details: String,
    },
}
