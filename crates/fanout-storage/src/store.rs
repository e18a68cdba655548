//! Index and page stores
//!
//! Fetch-or-default and persist logic for the two document types of a log.
//! A missing document is never an error: the store hands back the default
//! document the log would have had, so an unused log reads like an empty
//! one.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::backend::{LogBackend, Revision};
use crate::config::EngineConfig;
use crate::error::StorageError;
use crate::model::{INDEX_VERSION, Index, LogKind, Page};
use crate::paths::PathScheme;

/// A document together with what the backend knew about it when loaded
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    /// The document, or its default when nothing was stored
    pub value: T,
    /// Revision to hand back on persist
    pub revision: Revision,
    /// Whether the document was actually stored
    pub found: bool,
}

impl<T> Tracked<T> {
    /// Drop the tracking information
    pub fn into_inner(self) -> T {
        self.value
    }
}

async fn load_document<B, T>(backend: &B, path: &str) -> Result<(Option<T>, Revision), StorageError>
where
    B: LogBackend + ?Sized,
    T: DeserializeOwned,
{
    let loaded = backend.load(path).await?;
    let value = match loaded.value {
        Some(raw) => Some(
            serde_json::from_value(raw)
                .map_err(|e| StorageError::deserialization(format!("{}: {}", path, e)))?,
        ),
        None => {
            debug!(path, "No document found, using default");
            None
        }
    };
    Ok((value, loaded.revision))
}

fn encode<T: Serialize>(document: &T) -> Result<Value, StorageError> {
    serde_json::to_value(document).map_err(|e| StorageError::serialization(e.to_string()))
}

/// Fetch-or-default and persist for index documents
pub struct IndexStore<B: ?Sized> {
    backend: Arc<B>,
    paths: Arc<PathScheme>,
    config: Arc<EngineConfig>,
}

impl<B: ?Sized> Clone for IndexStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            paths: self.paths.clone(),
            config: self.config.clone(),
        }
    }
}

impl<B: LogBackend + ?Sized> IndexStore<B> {
    /// Create a store over `backend`
    pub fn new(backend: Arc<B>, paths: Arc<PathScheme>, config: Arc<EngineConfig>) -> Self {
        Self {
            backend,
            paths,
            config,
        }
    }

    /// The index an unused log of `kind` starts from
    pub fn default_index(&self, kind: LogKind) -> Index {
        Index {
            version: INDEX_VERSION,
            curr_page_number: 0,
            curr_page_num_entries: 0,
            pages: vec![self.paths.page_path(kind, 0)],
            page_size: self.config.kind(kind).page_size,
            latest_item_timestamp: None,
        }
    }

    /// Fetch the index of `kind`, or its default if none is stored
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn fetch_index(&self, kind: LogKind) -> Result<Tracked<Index>, StorageError> {
        let path = self.paths.index_path(kind);
        let (stored, revision) = load_document::<B, Index>(&self.backend, path).await?;
        let found = stored.is_some();
        let mut value = stored.unwrap_or_else(|| self.default_index(kind));

        if value.page_size == 0 {
            warn!(path, "Stored index has a zero page size, using configured size");
            value.page_size = self.config.kind(kind).page_size;
        }

        Ok(Tracked {
            value,
            revision,
            found,
        })
    }

    /// Persist the index of `kind`
    ///
    /// Overwrites unconditionally on a legacy backend; fails with `Conflict`
    /// on an optimistic backend if the index moved since it was fetched.
    pub async fn persist_index(
        &self,
        kind: LogKind,
        index: &Tracked<Index>,
    ) -> Result<Revision, StorageError> {
        let path = self.paths.index_path(kind);
        let value = encode(&index.value)?;
        let revision = self.backend.store(path, value, index.revision).await?;
        debug!(
            %kind,
            page = index.value.curr_page_number,
            entries = index.value.curr_page_num_entries,
            "Persisted index"
        );
        Ok(revision)
    }
}

/// Fetch-or-default and persist for page documents
pub struct PageStore<B: ?Sized> {
    backend: Arc<B>,
    paths: Arc<PathScheme>,
}

impl<B: ?Sized> Clone for PageStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            paths: self.paths.clone(),
        }
    }
}

impl<B: LogBackend + ?Sized> PageStore<B> {
    /// Create a store over `backend`
    pub fn new(backend: Arc<B>, paths: Arc<PathScheme>) -> Self {
        Self { backend, paths }
    }

    /// The empty page `page_number` of `kind` starts as
    pub fn default_page(&self, kind: LogKind, page_number: u64) -> Page {
        Page {
            version: INDEX_VERSION,
            index_path: self.paths.index_path(kind).to_string(),
            page_path: self.paths.page_path(kind, page_number),
            entries: Vec::new(),
        }
    }

    /// Fetch page `page_number` of `kind`, or an empty page if none is stored
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn fetch_page(
        &self,
        kind: LogKind,
        page_number: u64,
    ) -> Result<Tracked<Page>, StorageError> {
        let path = self.paths.page_path(kind, page_number);
        let (stored, revision) = load_document::<B, Page>(&self.backend, &path).await?;
        let found = stored.is_some();

        let value = match stored {
            Some(mut page) => {
                // Persist goes to the page's own path, so it has to be right
                if page.page_path != path {
                    warn!(stored = %page.page_path, expected = %path, "Repairing page self-reference");
                    page.page_path = path;
                }
                let index_path = self.paths.index_path(kind);
                if page.index_path != index_path {
                    page.index_path = index_path.to_string();
                }
                page
            }
            None => self.default_page(kind, page_number),
        };

        Ok(Tracked {
            value,
            revision,
            found,
        })
    }

    /// Persist a page under its own path
    pub async fn persist_page(&self, page: &Tracked<Page>) -> Result<Revision, StorageError> {
        let value = encode(&page.value)?;
        let revision = self
            .backend
            .store(&page.value.page_path, value, page.revision)
            .await?;
        debug!(path = %page.value.page_path, entries = page.value.len(), "Persisted page");
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LegacyBackend;
    use crate::gateway::InMemoryGateway;
    use serde_json::json;

    fn stores(
        page_size: u64,
    ) -> (
        IndexStore<LegacyBackend<InMemoryGateway>>,
        PageStore<LegacyBackend<InMemoryGateway>>,
        Arc<InMemoryGateway>,
    ) {
        let gateway = Arc::new(InMemoryGateway::new());
        let backend = Arc::new(LegacyBackend::new(gateway.clone()));
        let paths = Arc::new(PathScheme::new("crqa.hns", "app.hns").unwrap());
        let config = Arc::new(EngineConfig::default().with_uniform_page_size(page_size));
        (
            IndexStore::new(backend.clone(), paths.clone(), config),
            PageStore::new(backend, paths),
            gateway,
        )
    }

    #[tokio::test]
    async fn test_default_index_is_deterministic() {
        let (indexes, _, gateway) = stores(7);

        let first = indexes.fetch_index(LogKind::NewContent).await.unwrap();
        let second = indexes.fetch_index(LogKind::NewContent).await.unwrap();

        assert!(!first.found);
        assert_eq!(first.value, second.value);
        assert_eq!(first.value.version, INDEX_VERSION);
        assert_eq!(first.value.curr_page_number, 0);
        assert_eq!(first.value.curr_page_num_entries, 0);
        assert_eq!(first.value.page_size, 7);
        assert_eq!(
            first.value.pages,
            vec!["crqa.hns/app.hns/newcontent/page_0.json".to_string()]
        );
        assert_eq!(gateway.set_count(), 0);
    }

    #[tokio::test]
    async fn test_persisted_index_is_fetched_back() {
        let (indexes, _, _) = stores(7);
        let mut index = indexes.fetch_index(LogKind::Interactions).await.unwrap();
        index.value.curr_page_num_entries = 3;
        indexes
            .persist_index(LogKind::Interactions, &index)
            .await
            .unwrap();

        let fetched = indexes.fetch_index(LogKind::Interactions).await.unwrap();
        assert!(fetched.found);
        assert_eq!(fetched.value.curr_page_num_entries, 3);

        // Other kinds are untouched
        let other = indexes.fetch_index(LogKind::NewContent).await.unwrap();
        assert!(!other.found);
    }

    #[tokio::test]
    async fn test_default_page_has_back_references() {
        let (_, pages, _) = stores(7);
        let page = pages.fetch_page(LogKind::NewContent, 4).await.unwrap();

        assert!(!page.found);
        assert!(page.value.is_empty());
        assert_eq!(page.value.index_path, "crqa.hns/app.hns/newcontent/index.json");
        assert_eq!(page.value.page_path, "crqa.hns/app.hns/newcontent/page_4.json");
    }

    #[tokio::test]
    async fn test_page_self_reference_repaired() {
        let (_, pages, gateway) = stores(7);
        gateway.insert(
            "crqa.hns/app.hns/newcontent/page_0.json",
            json!({
                "version": 1,
                "indexPath": "elsewhere/index.json",
                "pagePath": "elsewhere/page_9.json",
                "entries": [{ "content": "a", "timestamp": 1 }]
            }),
        );

        let page = pages.fetch_page(LogKind::NewContent, 0).await.unwrap();
        assert_eq!(page.value.page_path, "crqa.hns/app.hns/newcontent/page_0.json");
        assert_eq!(page.value.index_path, "crqa.hns/app.hns/newcontent/index.json");
        assert_eq!(page.value.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_index_is_error() {
        let (indexes, _, gateway) = stores(7);
        gateway.insert("crqa.hns/app.hns/newcontent/index.json", json!("garbage"));

        let err = indexes.fetch_index(LogKind::NewContent).await.unwrap_err();
        assert!(matches!(err, StorageError::Deserialization(_)));
    }
}
