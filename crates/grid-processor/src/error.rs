//! Error types for the snapshot store and interpolation engine.
//!
//! Query failures are the shared [`InterpolationError`]; this module covers
//! everything around it.

use thiserror::Error;
use wx_common::InterpolationError;

/// Errors that can occur while publishing snapshots or building an engine.
#[derive(Error, Debug)]
pub enum GridProcessorError {
    /// The snapshot cannot be used for interpolation.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Interpolation error.
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
}

impl GridProcessorError {
    /// Create an InvalidSnapshot error.
    pub fn invalid_snapshot(msg: impl Into<String>) -> Self {
        Self::InvalidSnapshot(msg.into())
    }

    /// Create a ConfigError.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// Result type for grid processor operations.
pub type Result<T> = std::result::Result<T, GridProcessorError>;
