//! Error types for fanout-storage
//!
//! This module defines the error type shared by the gateways, the index and
//! page stores, and the log engine.

use thiserror::Error;

/// Errors that can occur while reading or writing a fanout log
#[derive(Debug, Error)]
pub enum StorageError {
    /// Entry exceeds the serialized size ceiling
    #[error("Entry exceeds max size, {size}>{max}")]
    EntryTooLarge { size: usize, max: usize },

    /// Caller-supplied entry cannot be stored (not a JSON object, or not
    /// serializable)
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// Error while encoding a document for the store
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored document could not be decoded
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The key/value gateway failed a get or set
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// I/O error in a file-backed gateway
    #[error("I/O error: {0}")]
    Io(String),

    /// A conditional write lost against a concurrent writer
    #[error("Version conflict at {path}")]
    Conflict { path: String },

    /// Conditional writes kept conflicting until the attempt budget ran out
    #[error("Gave up on {path} after {attempts} conflicting attempts")]
    RetriesExhausted { path: String, attempts: u32 },

    /// Page path template is missing its page-number placeholder
    #[error("Invalid page template: {0}")]
    InvalidTemplate(String),

    /// Engine configuration is unusable (e.g. a zero page size)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Background work was requested outside a tokio runtime
    #[error("No async runtime: {0}")]
    NoRuntime(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl StorageError {
    /// Create a new Gateway error
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway(message.into())
    }

    /// Create a new InvalidEntry error
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        Self::InvalidEntry(message.into())
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new Deserialization error
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    /// Create a new Conflict error
    pub fn conflict(path: impl Into<String>) -> Self {
        Self::Conflict { path: path.into() }
    }

    /// Whether the error was raised while validating an entry, before any
    /// store call was made
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StorageError::EntryTooLarge { .. } | StorageError::InvalidEntry(_)
        )
    }

    /// Whether the error is a lost conditional write that may be retried
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}
