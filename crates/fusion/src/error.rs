//! Error types for the fusion engine.

use metar_parser::FeedError;
use thiserror::Error;
use wx_common::InterpolationError;

#[derive(Error, Debug)]
pub enum FusionError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The grid could not be resolved and no earlier state exists to fall
    /// back to.
    #[error("no weather state available: {0}")]
    NoState(#[from] InterpolationError),

    /// Reading a feed or writing the legacy file failed.
    #[error(transparent)]
    Feed(#[from] FeedError),
}

impl FusionError {
    /// Create a ConfigError.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// Result type for fusion operations.
pub type Result<T> = std::result::Result<T, FusionError>;
