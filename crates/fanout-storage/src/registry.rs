//! Owner name registry
//!
//! A single dictionary shared by every owner, recording which owners have
//! logs under the data domain: `{ "app.hns": true, ... }`.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::backend::{LogBackend, Revision};
use crate::error::StorageError;

/// Read-modify-write access to the owner dictionary
pub struct NameRegistry<B> {
    backend: Arc<B>,
    path: String,
}

impl<B: LogBackend> NameRegistry<B> {
    /// Create a registry stored under `path`
    pub fn new(backend: Arc<B>, path: impl Into<String>) -> Self {
        Self {
            backend,
            path: path.into(),
        }
    }

    /// Key of the dictionary
    pub fn path(&self) -> &str {
        &self.path
    }

    async fn load(&self) -> Result<(Map<String, Value>, Revision), StorageError> {
        let loaded = self.backend.load(&self.path).await?;
        let owners = match loaded.value {
            Some(Value::Object(owners)) => owners,
            Some(other) => {
                return Err(StorageError::deserialization(format!(
                    "{}: expected an object, got {}",
                    self.path, other
                )));
            }
            None => Map::new(),
        };
        Ok((owners, loaded.revision))
    }

    /// Register `owner`
    ///
    /// # Returns
    ///
    /// `true` if the owner was added, `false` if it was already present.
    #[instrument(skip(self))]
    pub async fn register(&self, owner: &str) -> Result<bool, StorageError> {
        let max_attempts = self.backend.max_attempts();
        let mut attempt = 1;

        loop {
            let (mut owners, revision) = self.load().await?;
            if owners.get(owner) == Some(&Value::Bool(true)) {
                debug!(owner, "Owner already registered");
                return Ok(false);
            }

            owners.insert(owner.to_string(), Value::Bool(true));
            match self
                .backend
                .store(&self.path, Value::Object(owners), revision)
                .await
            {
                Ok(_) => {
                    debug!(owner, "Registered owner");
                    return Ok(true);
                }
                Err(e) if e.is_conflict() && attempt < max_attempts => attempt += 1,
                Err(StorageError::Conflict { path }) => {
                    return Err(StorageError::RetriesExhausted {
                        path,
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Whether `owner` is registered
    pub async fn is_registered(&self, owner: &str) -> Result<bool, StorageError> {
        let (owners, _) = self.load().await?;
        Ok(owners.get(owner) == Some(&Value::Bool(true)))
    }

    /// Every registered owner, sorted
    pub async fn owners(&self) -> Result<Vec<String>, StorageError> {
        let (owners, _) = self.load().await?;
        let mut names: Vec<String> = owners
            .into_iter()
            .filter(|(_, v)| *v == Value::Bool(true))
            .map(|(k, _)| k)
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LegacyBackend, OptimisticBackend};
    use crate::gateway::{InMemoryGateway, InMemoryVersionedGateway};
    use serde_json::json;

    const PATH: &str = "crqa.hns/skapps.json";

    #[tokio::test]
    async fn test_register_and_list() {
        let gateway = Arc::new(InMemoryGateway::new());
        let registry = NameRegistry::new(Arc::new(LegacyBackend::new(gateway.clone())), PATH);

        assert!(registry.register("b.hns").await.unwrap());
        assert!(registry.register("a.hns").await.unwrap());
        assert!(!registry.register("a.hns").await.unwrap());

        assert_eq!(registry.owners().await.unwrap(), vec!["a.hns", "b.hns"]);
        assert!(registry.is_registered("b.hns").await.unwrap());
        assert!(!registry.is_registered("c.hns").await.unwrap());
        assert_eq!(gateway.document(PATH), Some(json!({ "a.hns": true, "b.hns": true })));
    }

    #[tokio::test]
    async fn test_existing_entries_are_preserved() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.insert(PATH, json!({ "other.hns": true }));
        let registry = NameRegistry::new(Arc::new(LegacyBackend::new(gateway.clone())), PATH);

        registry.register("mine.hns").await.unwrap();
        assert_eq!(registry.owners().await.unwrap(), vec!["mine.hns", "other.hns"]);
    }

    #[tokio::test]
    async fn test_non_object_dictionary_is_error() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.insert(PATH, json!([1, 2, 3]));
        let registry = NameRegistry::new(Arc::new(LegacyBackend::new(gateway)), PATH);

        let err = registry.register("a.hns").await.unwrap_err();
        assert!(matches!(err, StorageError::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_concurrent_registrations_survive_with_versions() {
        let gateway = Arc::new(InMemoryVersionedGateway::new());
        let backend = Arc::new(OptimisticBackend::new(gateway));
        let first = NameRegistry::new(backend.clone(), PATH);
        let second = NameRegistry::new(backend, PATH);

        let (a, b) = tokio::join!(first.register("a.hns"), second.register("b.hns"));
        assert!(a.unwrap());
        assert!(b.unwrap());
        assert_eq!(first.owners().await.unwrap(), vec!["a.hns", "b.hns"]);
    }
}
