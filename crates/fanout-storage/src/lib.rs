//! # Fanout Storage
//!
//! A paginated, append-mostly log persisted through a remote key/value JSON
//! store that only offers get and set by key.
//!
//! Each log kind owns an index document naming the page that currently
//! accepts writes, and a chain of page documents holding bounded batches of
//! entries. Appends rotate to a fresh page as soon as the current one reaches
//! its page size.
//!
//! ## Features
//!
//! - **KvGateway trait**: get/set of JSON documents by key
//! - **VersionedGateway trait**: versioned get + conditional set, for stores that support it
//! - **LegacyBackend / OptimisticBackend**: unconditional vs. read-version/write-if-unchanged writes
//! - **LogEngine**: fetch index, fetch page, append, persist, rotate
//! - **HierarchyPrecreator**: warms index and current page of every log kind
//! - **NameRegistry**: shared dictionary of log owners
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fanout_storage::{EngineConfig, InMemoryGateway, LegacyBackend, LogEngine, LogKind, PathScheme};
//!
//! #[tokio::main]
//! async fn main() {
//!     let gateway = Arc::new(InMemoryGateway::new());
//!     let backend = Arc::new(LegacyBackend::new(gateway));
//!     let paths = PathScheme::new("crqa.hns", "myapp.hns").unwrap();
//!     let engine = LogEngine::new(backend, paths, EngineConfig::default()).unwrap();
//!
//!     let entry = serde_json::json!({ "content": "sia://abc", "metadata": {} });
//!     let entry_ref = engine.append(LogKind::NewContent, &entry).await.unwrap();
//!     assert_eq!(entry_ref.position, 0);
//! }
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod model;
pub mod observer;
pub mod paths;
pub mod precreate;
pub mod registry;
pub mod store;

// Re-exports
pub use backend::{LegacyBackend, Loaded, LogBackend, OptimisticBackend, Revision};
pub use codec::{EntryCodec, PersistedEntry};
pub use config::{EngineConfig, LogKindConfig};
pub use engine::LogEngine;
pub use error::StorageError;
pub use gateway::{FileGateway, InMemoryGateway, InMemoryVersionedGateway};
pub use model::{
    DEFAULT_PAGE_SIZE, ENTRY_MAX_SIZE, Entry, EntryRef, INDEX_VERSION, Index, LogKind, Page,
};
pub use observer::{AppendObserver, TracingObserver};
pub use paths::{PAGE_REF, PathScheme};
pub use precreate::{HierarchyPrecreator, PrecreateMode, PrecreateReport};
pub use registry::NameRegistry;
pub use store::{IndexStore, PageStore, Tracked};

use async_trait::async_trait;
use serde_json::Value;

/// Access to a remote key/value store holding JSON documents
///
/// Every call is an independent network round trip. The store offers no
/// listing, no transactions and no concurrency token, so a `set` always
/// overwrites whatever is stored under the key.
#[async_trait]
pub trait KvGateway: Send + Sync {
    /// Fetch the document stored under `path`
    ///
    /// # Returns
    ///
    /// `Ok(None)` when nothing has been stored under the key yet. Absence is
    /// a normal state for an unused log, not an error.
    async fn get(&self, path: &str) -> Result<Option<Value>, StorageError>;

    /// Store `value` under `path`, replacing any previous document
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write or cannot be reached.
    async fn set(&self, path: &str, value: Value) -> Result<(), StorageError>;
}

/// A document together with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    /// The stored document
    pub value: Value,
    /// Version counter, bumped by every successful write
    pub version: u64,
}

/// Access to a key/value store that supports conditional writes
///
/// Used for optimistic concurrency control: read a document with its
/// version, then write it back only if nobody else wrote in between.
#[async_trait]
pub trait VersionedGateway: Send + Sync {
    /// Fetch the document stored under `path` together with its version
    async fn get_versioned(&self, path: &str) -> Result<Option<Versioned>, StorageError>;

    /// Store `value` under `path` if the stored version still matches
    ///
    /// `expected` is `None` when the caller saw no document at all.
    ///
    /// # Returns
    ///
    /// `Ok(Some(version))` with the new version if the write happened,
    /// `Ok(None)` if another writer got there first.
    async fn set_if_version(
        &self,
        path: &str,
        value: Value,
        expected: Option<u64>,
    ) -> Result<Option<u64>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Test that the gateway traits are object-safe
    fn _assert_object_safe(_: &dyn KvGateway, _: &dyn VersionedGateway, _: &dyn LogBackend) {}

    #[tokio::test]
    async fn test_append_through_public_api() {
        let gateway = Arc::new(InMemoryGateway::new());
        let backend = Arc::new(LegacyBackend::new(gateway.clone()));
        let paths = PathScheme::new("crqa.hns", "myapp.hns").unwrap();
        let engine = LogEngine::new(backend, paths, EngineConfig::default()).unwrap();

        let entry = serde_json::json!({ "content": "sia://abc", "metadata": {} });
        let entry_ref = engine.append(LogKind::NewContent, &entry).await.unwrap();

        assert_eq!(entry_ref.page_number, 0);
        assert_eq!(entry_ref.position, 0);
        assert_eq!(entry_ref.page_path, "crqa.hns/myapp.hns/newcontent/page_0.json");

        let index = engine.fetch_index(LogKind::NewContent).await.unwrap();
        assert_eq!(index.curr_page_num_entries, 1);
    }
}
