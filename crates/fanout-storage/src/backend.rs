//! Write strategies the log engine runs on
//!
//! The engine never talks to a gateway directly. It loads a document
//! together with a [`Revision`] and hands that revision back when storing,
//! and the backend decides what the revision means:
//!
//! - [`LegacyBackend`] ignores it and overwrites unconditionally. Two
//!   concurrent appends to the same log can lose an entry.
//! - [`OptimisticBackend`] turns it into a conditional write and reports a
//!   [`StorageError::Conflict`] when another writer got there first. The
//!   engine re-reads and retries, bounded by [`LogBackend::max_attempts`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::error::StorageError;
use crate::{KvGateway, VersionedGateway};

/// Default attempt budget for conditional writes
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// What the backend knew about a document when it was loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    /// The backend does not track versions
    Untracked,
    /// The document did not exist
    Missing,
    /// The document was at this version
    At(u64),
}

/// A raw document and the revision it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    /// The document, if one was stored
    pub value: Option<Value>,
    /// Revision to pass back to [`LogBackend::store`]
    pub revision: Revision,
}

/// Capability interface between the log engine and a gateway
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Load the document stored under `path`
    async fn load(&self, path: &str) -> Result<Loaded, StorageError>;

    /// Store `value` under `path`
    ///
    /// `revision` is the one returned by the matching [`load`](Self::load).
    ///
    /// # Returns
    ///
    /// The revision the document is now at.
    ///
    /// # Errors
    ///
    /// `Conflict` if the backend enforces revisions and the stored document
    /// moved on since it was loaded.
    async fn store(
        &self,
        path: &str,
        value: Value,
        revision: Revision,
    ) -> Result<Revision, StorageError>;

    /// How many times a conflicting read-modify-write may be attempted
    fn max_attempts(&self) -> u32;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Unconditional writes over a plain [`KvGateway`]
#[derive(Debug)]
pub struct LegacyBackend<G> {
    gateway: Arc<G>,
}

impl<G> Clone for LegacyBackend<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
        }
    }
}

impl<G: KvGateway> LegacyBackend<G> {
    /// Wrap `gateway`
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl<G: KvGateway> LogBackend for LegacyBackend<G> {
    async fn load(&self, path: &str) -> Result<Loaded, StorageError> {
        let value = self.gateway.get(path).await?;
        Ok(Loaded {
            value,
            revision: Revision::Untracked,
        })
    }

    async fn store(
        &self,
        path: &str,
        value: Value,
        _revision: Revision,
    ) -> Result<Revision, StorageError> {
        self.gateway.set(path, value).await?;
        Ok(Revision::Untracked)
    }

    fn max_attempts(&self) -> u32 {
        1
    }

    fn name(&self) -> &'static str {
        "legacy"
    }
}

/// Read-version + conditional write over a [`VersionedGateway`]
#[derive(Debug)]
pub struct OptimisticBackend<G> {
    gateway: Arc<G>,
    max_attempts: u32,
}

impl<G> Clone for OptimisticBackend<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            max_attempts: self.max_attempts,
        }
    }
}

impl<G: VersionedGateway> OptimisticBackend<G> {
    /// Wrap `gateway` with the default attempt budget
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set the attempt budget (at least one)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

#[async_trait]
impl<G: VersionedGateway> LogBackend for OptimisticBackend<G> {
    async fn load(&self, path: &str) -> Result<Loaded, StorageError> {
        Ok(match self.gateway.get_versioned(path).await? {
            Some(versioned) => Loaded {
                value: Some(versioned.value),
                revision: Revision::At(versioned.version),
            },
            None => Loaded {
                value: None,
                revision: Revision::Missing,
            },
        })
    }

    async fn store(
        &self,
        path: &str,
        value: Value,
        revision: Revision,
    ) -> Result<Revision, StorageError> {
        let expected = match revision {
            Revision::At(version) => Some(version),
            Revision::Missing => None,
            Revision::Untracked => {
                return Err(StorageError::gateway(format!(
                    "untracked revision passed to conditional write at {}",
                    path
                )));
            }
        };

        match self.gateway.set_if_version(path, value, expected).await? {
            Some(version) => Ok(Revision::At(version)),
            None => {
                trace!(path, ?expected, "Conditional write lost");
                Err(StorageError::conflict(path))
            }
        }
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn name(&self) -> &'static str {
        "optimistic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemoryGateway, InMemoryVersionedGateway};
    use serde_json::json;

    #[tokio::test]
    async fn test_legacy_overwrites_regardless_of_revision() {
        let gateway = Arc::new(InMemoryGateway::new());
        let backend = LegacyBackend::new(gateway.clone());

        let loaded = backend.load("k").await.unwrap();
        assert_eq!(loaded.revision, Revision::Untracked);
        assert!(loaded.value.is_none());

        backend.store("k", json!(1), loaded.revision).await.unwrap();
        backend.store("k", json!(2), loaded.revision).await.unwrap();
        assert_eq!(gateway.document("k"), Some(json!(2)));
        assert_eq!(backend.max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_optimistic_detects_conflict() {
        let gateway = Arc::new(InMemoryVersionedGateway::new());
        let backend = OptimisticBackend::new(gateway.clone());

        let first = backend.load("k").await.unwrap();
        let second = backend.load("k").await.unwrap();
        assert_eq!(first.revision, Revision::Missing);

        let revision = backend.store("k", json!("a"), first.revision).await.unwrap();
        assert_eq!(revision, Revision::At(1));

        let err = backend
            .store("k", json!("b"), second.revision)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(gateway.document("k"), Some(json!("a")));
    }

    #[tokio::test]
    async fn test_optimistic_rejects_untracked_revision() {
        let backend = OptimisticBackend::new(Arc::new(InMemoryVersionedGateway::new()));
        let err = backend
            .store("k", json!(1), Revision::Untracked)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Gateway(_)));
    }

    #[test]
    fn test_attempt_budget_floor() {
        let backend = OptimisticBackend::new(Arc::new(InMemoryVersionedGateway::new()))
            .with_max_attempts(0);
        assert_eq!(backend.max_attempts(), 1);
    }
}
