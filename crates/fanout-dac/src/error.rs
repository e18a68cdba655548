//! Error types for the content record service

use fanout_storage::StorageError;
use thiserror::Error;

/// Errors raised by [`ContentRecordService`](crate::ContentRecordService)
#[derive(Debug, Error)]
pub enum DacError {
    /// Error from the log storage layer
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The referrer did not name an owner domain
    #[error("Invalid referrer: {0}")]
    InvalidReferrer(String),

    /// Configuration could not be read or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error outside the store, e.g. reading a config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DacError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error is a payload rejected before any store call
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_validation())
    }
}

impl From<toml::de::Error> for DacError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
