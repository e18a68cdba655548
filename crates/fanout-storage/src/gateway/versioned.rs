//! In-memory store with conditional writes

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tracing::trace;

use crate::error::StorageError;
use crate::{KvGateway, Versioned, VersionedGateway};

/// In-memory implementation of VersionedGateway
///
/// Versions start at 1 for the first write of a key and are bumped by one on
/// every successful write. The plain [`KvGateway`] methods ignore versions on
/// read and write unconditionally, so the same store can back either
/// backend.
#[derive(Debug, Default)]
pub struct InMemoryVersionedGateway {
    documents: DashMap<String, Versioned>,
    set_count: AtomicUsize,
    conflict_count: AtomicUsize,
}

impl InMemoryVersionedGateway {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Peek at a stored document
    pub fn document(&self, path: &str) -> Option<Value> {
        self.documents.get(path).map(|v| v.value.clone())
    }

    /// Current version of `path`, if stored
    pub fn version(&self, path: &str) -> Option<u64> {
        self.documents.get(path).map(|v| v.version)
    }

    /// Number of write attempts so far, rejected ones included
    pub fn set_count(&self) -> usize {
        self.set_count.load(Ordering::SeqCst)
    }

    /// Number of conditional writes rejected so far
    pub fn conflict_count(&self) -> usize {
        self.conflict_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionedGateway for InMemoryVersionedGateway {
    async fn get_versioned(&self, path: &str) -> Result<Option<Versioned>, StorageError> {
        Ok(self.documents.get(path).map(|v| v.clone()))
    }

    async fn set_if_version(
        &self,
        path: &str,
        value: Value,
        expected: Option<u64>,
    ) -> Result<Option<u64>, StorageError> {
        self.set_count.fetch_add(1, Ordering::SeqCst);

        // The entry guard holds the shard lock, so compare and write are atomic
        let written = match self.documents.entry(path.to_string()) {
            Entry::Occupied(mut occupied) => {
                if Some(occupied.get().version) == expected {
                    let version = occupied.get().version + 1;
                    occupied.insert(Versioned { value, version });
                    Some(version)
                } else {
                    None
                }
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(Versioned { value, version: 1 });
                    Some(1)
                } else {
                    None
                }
            }
        };

        if written.is_none() {
            self.conflict_count.fetch_add(1, Ordering::SeqCst);
            trace!(path, ?expected, "Rejected conditional write");
        }
        Ok(written)
    }
}

#[async_trait]
impl KvGateway for InMemoryVersionedGateway {
    async fn get(&self, path: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.document(path))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StorageError> {
        self.set_count.fetch_add(1, Ordering::SeqCst);
        let mut slot = self
            .documents
            .entry(path.to_string())
            .or_insert_with(|| Versioned {
                value: Value::Null,
                version: 0,
            });
        slot.version += 1;
        slot.value = value;
        Ok(())
    }
}
