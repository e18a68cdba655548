//! In-memory key/value gateway
//!
//! Suitable for testing and simulation. Counts every call and can be told to
//! fail reads or writes on chosen keys, which is how partial failures of an
//! append are reproduced in tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tracing::trace;

use crate::KvGateway;
use crate::error::StorageError;

/// In-memory implementation of KvGateway
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    /// Documents by key
    documents: DashMap<String, Value>,
    /// Keys whose reads fail
    failing_reads: DashSet<String>,
    /// Keys whose writes fail
    failing_writes: DashSet<String>,
    /// Number of `get` calls issued
    get_count: AtomicUsize,
    /// Number of `set` calls issued
    set_count: AtomicUsize,
}

impl InMemoryGateway {
    /// Create an empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without counting it as a `set`
    pub fn insert(&self, path: impl Into<String>, value: Value) {
        self.documents.insert(path.into(), value);
    }

    /// Peek at a stored document without counting it as a `get`
    pub fn document(&self, path: &str) -> Option<Value> {
        self.documents.get(path).map(|v| v.clone())
    }

    /// Whether anything is stored under `path`
    pub fn contains(&self, path: &str) -> bool {
        self.documents.contains_key(path)
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of `get` calls so far
    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    /// Number of `set` calls so far, failed ones included
    pub fn set_count(&self) -> usize {
        self.set_count.load(Ordering::SeqCst)
    }

    /// Make every read of `path` fail
    pub fn fail_reads_from(&self, path: impl Into<String>) {
        self.failing_reads.insert(path.into());
    }

    /// Make every write to `path` fail
    pub fn fail_writes_to(&self, path: impl Into<String>) {
        self.failing_writes.insert(path.into());
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.failing_reads.clear();
        self.failing_writes.clear();
    }
}

#[async_trait]
impl KvGateway for InMemoryGateway {
    async fn get(&self, path: &str) -> Result<Option<Value>, StorageError> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        trace!(path, "Getting document");

        if self.failing_reads.contains(path) {
            return Err(StorageError::gateway(format!("injected read failure at {}", path)));
        }
        Ok(self.documents.get(path).map(|v| v.clone()))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StorageError> {
        self.set_count.fetch_add(1, Ordering::SeqCst);
        trace!(path, "Setting document");

        if self.failing_writes.contains(path) {
            return Err(StorageError::gateway(format!("injected write failure at {}", path)));
        }
        self.documents.insert(path.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_absent_is_none() {
        let gateway = InMemoryGateway::new();
        assert!(gateway.get("missing").await.unwrap().is_none());
        assert_eq!(gateway.get_count(), 1);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let gateway = InMemoryGateway::new();
        gateway.set("k", json!({ "a": 1 })).await.unwrap();
        gateway.set("k", json!({ "a": 2 })).await.unwrap();

        assert_eq!(gateway.get("k").await.unwrap(), Some(json!({ "a": 2 })));
        assert_eq!(gateway.set_count(), 2);
        assert_eq!(gateway.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let gateway = InMemoryGateway::new();
        gateway.fail_writes_to("k");
        gateway.fail_reads_from("r");

        assert!(gateway.set("k", json!({})).await.is_err());
        assert!(gateway.get("r").await.is_err());
        assert!(!gateway.contains("k"));

        gateway.clear_failures();
        gateway.set("k", json!({})).await.unwrap();
        assert!(gateway.contains("k"));
    }
}
