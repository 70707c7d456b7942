//! Error taxonomy shared across the weather fusion crates.
//!
//! None of these errors is fatal to the process: a failed decode drops one
//! snapshot or report, and a failed interpolation falls back to the last
//! accepted state.

use thiserror::Error;

/// Failure to turn raw grid bytes or report text into a typed record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Unsupported variable: {0}")]
    UnsupportedVariable(String),

    #[error("Truncated data: {0}")]
    TruncatedData(String),

    #[error("Unparsable token '{token}': {reason}")]
    UnparsableToken { token: String, reason: String },

    #[error("Value out of range for {field}: {value}")]
    OutOfRangeValue { field: String, value: String },
}

impl DecodeError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn truncated(msg: impl Into<String>) -> Self {
        Self::TruncatedData(msg.into())
    }

    pub fn unparsable(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnparsableToken {
            token: token.into(),
            reason: reason.into(),
        }
    }

    pub fn out_of_range(field: impl Into<String>, value: impl ToString) -> Self {
        Self::OutOfRangeValue {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

/// Failure to resolve an atmospheric value from the published snapshots.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpolationError {
    #[error("No coverage: {0}")]
    NoCoverage(String),

    #[error("Stale data: {0}")]
    StaleData(String),
}

impl InterpolationError {
    pub fn no_coverage(msg: impl Into<String>) -> Self {
        Self::NoCoverage(msg.into())
    }

    pub fn stale(msg: impl Into<String>) -> Self {
        Self::StaleData(msg.into())
    }
}

/// Failure of a spatial index query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("Spatial index is empty")]
    Empty,
}

impl From<IndexError> for InterpolationError {
    fn from(err: IndexError) -> Self {
        InterpolationError::NoCoverage(err.to_string())
    }
}
