//! Log engine
//!
//! Orchestrates an append across the index and page documents of a log:
//!
//! ```text
//! append(kind, raw)
//!   ├─ encode + size check       (rejects before any I/O)
//!   ├─ fetch index               (default when absent)
//!   ├─ fetch current page        (default when absent)
//!   ├─ push entry, persist page
//!   ├─ count := page length, rotate when count == page size
//!   └─ persist index
//! ```
//!
//! Rotation happens inside the append that fills a page: the entry that
//! reaches the page size is the last one of the old page, and the index
//! already points at the next page when the call returns. The next page is
//! only reserved in the index; it is created by the first append that lands
//! on it.
//!
//! Nothing is rolled back. If the page write succeeds and the index write
//! fails, the index under-reports the page until the next successful append
//! recomputes the count from the page itself. A page that is already full
//! when fetched (stale index) is rotated past before appending.

use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::backend::LogBackend;
use crate::codec::{EntryCodec, PersistedEntry};
use crate::config::EngineConfig;
use crate::error::StorageError;
use crate::model::{EntryRef, Index, LogKind, Page};
use crate::observer::{AppendObserver, TracingObserver};
use crate::paths::PathScheme;
use crate::store::{IndexStore, PageStore, Tracked};

struct EngineInner<B> {
    backend: Arc<B>,
    indexes: IndexStore<B>,
    pages: PageStore<B>,
    codec: EntryCodec,
    paths: Arc<PathScheme>,
    config: Arc<EngineConfig>,
}

/// Appends entries to the fanout logs of one owner
///
/// Cheap to clone; clones share the backend and configuration.
///
/// # Concurrency
///
/// An append is a read-modify-write of two documents. On a
/// [`LegacyBackend`](crate::LegacyBackend) nothing guards that sequence, and
/// two appends to the same kind that interleave lose one entry. On an
/// [`OptimisticBackend`](crate::OptimisticBackend) conflicting writes are
/// detected and retried, so both entries survive.
pub struct LogEngine<B> {
    inner: Arc<EngineInner<B>>,
    observer: Arc<dyn AppendObserver>,
}

impl<B> Clone for LogEngine<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            observer: self.observer.clone(),
        }
    }
}

impl<B: LogBackend> LogEngine<B> {
    /// Create an engine writing through `backend`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `config` has a zero page size or entry
    /// size ceiling.
    pub fn new(
        backend: Arc<B>,
        paths: PathScheme,
        config: EngineConfig,
    ) -> Result<Self, StorageError> {
        config.validate()?;

        let paths = Arc::new(paths);
        let config = Arc::new(config);
        let inner = EngineInner {
            indexes: IndexStore::new(backend.clone(), paths.clone(), config.clone()),
            pages: PageStore::new(backend.clone(), paths.clone()),
            codec: EntryCodec::new(config.max_entry_size),
            backend,
            paths,
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
            observer: Arc::new(TracingObserver),
        })
    }

    /// Route the outcome of detached appends to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn AppendObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Key layout used by this engine
    pub fn paths(&self) -> &PathScheme {
        &self.inner.paths
    }

    /// Configuration used by this engine
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Index store shared with the engine
    pub fn index_store(&self) -> &IndexStore<B> {
        &self.inner.indexes
    }

    /// Page store shared with the engine
    pub fn page_store(&self) -> &PageStore<B> {
        &self.inner.pages
    }

    /// Fetch the index of `kind`, or its default if the log is unused
    pub async fn fetch_index(&self, kind: LogKind) -> Result<Index, StorageError> {
        Ok(self.inner.indexes.fetch_index(kind).await?.into_inner())
    }

    /// Fetch page `page_number` of `kind`, or an empty page
    pub async fn page(&self, kind: LogKind, page_number: u64) -> Result<Page, StorageError> {
        Ok(self
            .inner
            .pages
            .fetch_page(kind, page_number)
            .await?
            .into_inner())
    }

    /// Fetch the page of `kind` currently accepting writes
    pub async fn current_page(&self, kind: LogKind) -> Result<Page, StorageError> {
        let index = self.fetch_index(kind).await?;
        self.page(kind, index.curr_page_number).await
    }

    /// Append `raw` to the log of `kind` and wait for both writes
    ///
    /// # Returns
    ///
    /// The location of the written entry.
    ///
    /// # Errors
    ///
    /// - `EntryTooLarge` / `InvalidEntry` if `raw` is rejected by the codec;
    ///   no store call is made in that case
    /// - any gateway error from the reads and writes, unrolled
    /// - `RetriesExhausted` if an optimistic backend kept losing races
    #[instrument(skip(self, raw), fields(backend = self.inner.backend.name()))]
    pub async fn append<T>(&self, kind: LogKind, raw: &T) -> Result<EntryRef, StorageError>
    where
        T: Serialize + ?Sized,
    {
        let entry = self.inner.codec.to_persistence(raw)?;
        self.append_encoded(kind, &entry).await
    }

    /// Append an entry that already went through the codec
    pub async fn append_encoded(
        &self,
        kind: LogKind,
        entry: &PersistedEntry,
    ) -> Result<EntryRef, StorageError> {
        let max_attempts = self.inner.backend.max_attempts();
        let mut attempt = 1;

        loop {
            match self.try_append(kind, entry).await {
                Err(StorageError::Conflict { path }) if attempt < max_attempts => {
                    debug!(%kind, attempt, %path, "Append lost a race, retrying");
                    attempt += 1;
                }
                Err(StorageError::Conflict { path }) => {
                    warn!(%kind, attempts = attempt, %path, "Append kept losing races");
                    return Err(StorageError::RetriesExhausted {
                        path,
                        attempts: attempt,
                    });
                }
                result => return result,
            }
        }
    }

    /// One pass of the append; `Conflict` means nothing was written yet
    async fn try_append(
        &self,
        kind: LogKind,
        entry: &PersistedEntry,
    ) -> Result<EntryRef, StorageError> {
        let inner = &self.inner;

        let mut index = inner.indexes.fetch_index(kind).await?;
        let mut page = inner
            .pages
            .fetch_page(kind, index.value.curr_page_number)
            .await?;

        while page.value.len() as u64 >= index.value.page_size {
            warn!(
                %kind,
                page = index.value.curr_page_number,
                entries = page.value.len(),
                page_size = index.value.page_size,
                "Current page is already full, rotating before append"
            );
            self.rotate(kind, &mut index.value);
            index.revision = inner.indexes.persist_index(kind, &index).await?;
            page = inner
                .pages
                .fetch_page(kind, index.value.curr_page_number)
                .await?;
        }

        let page_number = index.value.curr_page_number;
        let position = page.value.len();
        page.value.entries.push(entry.value.clone());
        inner.pages.persist_page(&page).await?;

        let page_len = page.value.len() as u64;
        self.commit_index(kind, index, page_number, page_len, entry.timestamp)
            .await?;
        debug!(%kind, page_number, position, bytes = entry.size, "Entry appended");

        Ok(EntryRef {
            kind,
            page_number,
            page_path: page.value.page_path,
            position,
            timestamp: entry.timestamp,
        })
    }

    /// Record a page write in the index, rotating when the page is full
    ///
    /// The page write already happened, so a conflict here must not restart
    /// the append. The index is re-read instead and the fill level merged.
    async fn commit_index(
        &self,
        kind: LogKind,
        mut index: Tracked<Index>,
        page_number: u64,
        page_len: u64,
        timestamp: i64,
    ) -> Result<(), StorageError> {
        let max_attempts = self.inner.backend.max_attempts();
        let mut attempt = 1;
        let mut reread = false;

        loop {
            if index.value.curr_page_number != page_number {
                debug!(%kind, page_number, "Index already moved past the page");
                return Ok(());
            }

            index.value.curr_page_num_entries = if reread {
                index.value.curr_page_num_entries.max(page_len)
            } else {
                page_len
            };
            index.value.latest_item_timestamp = Some(
                index
                    .value
                    .latest_item_timestamp
                    .map_or(timestamp, |latest| latest.max(timestamp)),
            );

            if index.value.curr_page_num_entries == index.value.page_size {
                self.rotate(kind, &mut index.value);
            }

            match self.inner.indexes.persist_index(kind, &index).await {
                Ok(_) => return Ok(()),
                Err(StorageError::Conflict { path }) if attempt < max_attempts => {
                    debug!(%kind, attempt, %path, "Index moved during append, merging");
                    attempt += 1;
                    index = self.inner.indexes.fetch_index(kind).await?;
                    reread = true;
                }
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

    /// Advance the index to the next page and reserve its key
    fn rotate(&self, kind: LogKind, index: &mut Index) {
        index.curr_page_number += 1;
        index.curr_page_num_entries = 0;

        let next = self.inner.paths.page_path(kind, index.curr_page_number);
        if index.pages.last() != Some(&next) {
            index.pages.push(next);
        }
        info!(%kind, page = index.curr_page_number, "Rotated to next page");
    }
}

impl<B: LogBackend + 'static> LogEngine<B> {
    /// Validate `raw` now and append it on a spawned task
    ///
    /// The returned handle completes once the append finished; its outcome
    /// goes to the engine's [`AppendObserver`], never to the caller.
    ///
    /// # Errors
    ///
    /// - the codec error if `raw` is rejected
    /// - `NoRuntime` if called outside a tokio runtime
    ///
    /// Nothing is spawned in either case.
    pub fn append_detached<T>(&self, kind: LogKind, raw: &T) -> Result<JoinHandle<()>, StorageError>
    where
        T: Serialize + ?Sized,
    {
        let entry = self.inner.codec.to_persistence(raw)?;
        let runtime = Handle::try_current()
            .map_err(|e| StorageError::NoRuntime(format!("detached append to {}: {}", kind, e)))?;
        let engine = self.clone();

        Ok(runtime.spawn(async move {
            match engine.append_encoded(kind, &entry).await {
                Ok(entry_ref) => engine.observer.on_appended(kind, &entry_ref),
                Err(e) => engine.observer.on_failed(kind, &e),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LegacyBackend;
    use crate::gateway::InMemoryGateway;
    use serde_json::json;
    use tokio::sync::mpsc;

    type TestEngine = LogEngine<LegacyBackend<InMemoryGateway>>;

    fn create_test_engine(page_size: u64) -> (TestEngine, Arc<InMemoryGateway>) {
        let gateway = Arc::new(InMemoryGateway::new());
        let backend = Arc::new(LegacyBackend::new(gateway.clone()));
        let paths = PathScheme::new("crqa.hns", "app.hns").unwrap();
        let config = EngineConfig::default().with_uniform_page_size(page_size);
        (LogEngine::new(backend, paths, config).unwrap(), gateway)
    }

    fn item(name: &str) -> serde_json::Value {
        json!({ "content": name, "metadata": {} })
    }

    #[tokio::test]
    async fn test_first_append_creates_page_and_index() {
        let (engine, gateway) = create_test_engine(10);

        let entry_ref = engine.append(LogKind::NewContent, &item("A")).await.unwrap();

        assert_eq!(entry_ref.page_number, 0);
        assert_eq!(entry_ref.position, 0);
        assert!(gateway.contains("crqa.hns/app.hns/newcontent/page_0.json"));
        assert!(gateway.contains("crqa.hns/app.hns/newcontent/index.json"));
        assert_eq!(gateway.set_count(), 2);

        let index = engine.fetch_index(LogKind::NewContent).await.unwrap();
        assert_eq!(index.curr_page_num_entries, 1);
        assert_eq!(index.latest_item_timestamp, Some(entry_ref.timestamp));
    }

    #[tokio::test]
    async fn test_page_size_two_scenario() {
        let (engine, _) = create_test_engine(2);
        let kind = LogKind::NewContent;

        engine.append(kind, &item("A")).await.unwrap();
        let page0 = engine.page(kind, 0).await.unwrap();
        assert_eq!(page0.len(), 1);
        assert_eq!(engine.fetch_index(kind).await.unwrap().curr_page_num_entries, 1);

        let b = engine.append(kind, &item("B")).await.unwrap();
        assert_eq!((b.page_number, b.position), (0, 1));
        let page0 = engine.page(kind, 0).await.unwrap();
        assert_eq!(page0.entries[0]["content"], "A");
        assert_eq!(page0.entries[1]["content"], "B");

        let index = engine.fetch_index(kind).await.unwrap();
        assert_eq!(index.curr_page_number, 1);
        assert_eq!(index.curr_page_num_entries, 0);
        assert_eq!(
            index.pages,
            vec![
                "crqa.hns/app.hns/newcontent/page_0.json".to_string(),
                "crqa.hns/app.hns/newcontent/page_1.json".to_string(),
            ]
        );

        let c = engine.append(kind, &item("C")).await.unwrap();
        assert_eq!((c.page_number, c.position), (1, 0));
        assert_eq!(c.page_path, "crqa.hns/app.hns/newcontent/page_1.json");

        let page1 = engine.current_page(kind).await.unwrap();
        assert_eq!(page1.len(), 1);
        assert_eq!(page1.entries[0]["content"], "C");

        let index = engine.fetch_index(kind).await.unwrap();
        assert_eq!(index.curr_page_number, 1);
        assert_eq!(index.curr_page_num_entries, 1);

        // The filled page was left alone
        assert_eq!(engine.page(kind, 0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rotation_after_exactly_page_size_appends() {
        let (engine, gateway) = create_test_engine(5);
        let kind = LogKind::Interactions;

        for i in 0..5 {
            let entry_ref = engine.append(kind, &item(&i.to_string())).await.unwrap();
            assert_eq!(entry_ref.page_number, 0);
        }

        let index = engine.fetch_index(kind).await.unwrap();
        assert_eq!(index.curr_page_number, 1);
        // Next page is reserved, not created
        assert!(!gateway.contains("crqa.hns/app.hns/interactions/page_1.json"));
        assert!(engine.current_page(kind).await.unwrap().is_empty());

        let sixth = engine.append(kind, &item("5")).await.unwrap();
        assert_eq!((sixth.page_number, sixth.position), (1, 0));
    }

    #[tokio::test]
    async fn test_oversized_entry_never_touches_store() {
        let (engine, gateway) = create_test_engine(2);
        let huge = json!({ "content": "x".repeat(5000), "metadata": {} });

        let err = engine.append(LogKind::NewContent, &huge).await.unwrap_err();

        assert!(matches!(err, StorageError::EntryTooLarge { .. }));
        assert_eq!(gateway.get_count(), 0);
        assert_eq!(gateway.set_count(), 0);

        let index = engine.fetch_index(LogKind::NewContent).await.unwrap();
        assert_eq!(index.curr_page_number, 0);
        assert_eq!(index.curr_page_num_entries, 0);
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let (engine, _) = create_test_engine(10);
        let kind = LogKind::NewContent;
        engine.append(kind, &item("same")).await.unwrap();
        engine.append(kind, &item("same")).await.unwrap();
        assert_eq!(engine.current_page(kind).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let (engine, _) = create_test_engine(2);
        engine.append(LogKind::NewContent, &item("a")).await.unwrap();
        engine.append(LogKind::NewContent, &item("b")).await.unwrap();
        engine.append(LogKind::Interactions, &item("c")).await.unwrap();

        assert_eq!(
            engine.fetch_index(LogKind::NewContent).await.unwrap().curr_page_number,
            1
        );
        let interactions = engine.fetch_index(LogKind::Interactions).await.unwrap();
        assert_eq!(interactions.curr_page_number, 0);
        assert_eq!(interactions.curr_page_num_entries, 1);
    }

    #[tokio::test]
    async fn test_failed_index_write_heals_on_next_append() {
        let (engine, gateway) = create_test_engine(10);
        let kind = LogKind::NewContent;
        let index_path = engine.paths().index_path(kind).to_string();

        engine.append(kind, &item("A")).await.unwrap();

        gateway.fail_writes_to(index_path.clone());
        let err = engine.append(kind, &item("B")).await.unwrap_err();
        assert!(matches!(err, StorageError::Gateway(_)));

        // Page got the entry, index did not
        assert_eq!(engine.current_page(kind).await.unwrap().len(), 2);
        assert_eq!(engine.fetch_index(kind).await.unwrap().curr_page_num_entries, 1);

        gateway.clear_failures();
        let c = engine.append(kind, &item("C")).await.unwrap();
        assert_eq!(c.position, 2);
        assert_eq!(engine.fetch_index(kind).await.unwrap().curr_page_num_entries, 3);
    }

    #[tokio::test]
    async fn test_full_page_behind_stale_index_is_skipped() {
        let (engine, gateway) = create_test_engine(2);
        let kind = LogKind::NewContent;
        let index_path = engine.paths().index_path(kind).to_string();

        engine.append(kind, &item("A")).await.unwrap();

        // The write that fills page 0 loses its index update, so the
        // rotation never lands
        gateway.fail_writes_to(index_path);
        engine.append(kind, &item("B")).await.unwrap_err();
        gateway.clear_failures();

        let stale = engine.fetch_index(kind).await.unwrap();
        assert_eq!((stale.curr_page_number, stale.curr_page_num_entries), (0, 1));

        let c = engine.append(kind, &item("C")).await.unwrap();
        assert_eq!((c.page_number, c.position), (1, 0));
        assert_eq!(engine.page(kind, 0).await.unwrap().len(), 2);

        let index = engine.fetch_index(kind).await.unwrap();
        assert_eq!(index.curr_page_number, 1);
        assert_eq!(index.curr_page_num_entries, 1);
        assert_eq!(index.pages.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_page_read_aborts_without_writes() {
        let (engine, gateway) = create_test_engine(2);
        let kind = LogKind::Interactions;
        gateway.fail_reads_from(engine.paths().page_path(kind, 0));

        let err = engine.append(kind, &item("A")).await.unwrap_err();
        assert!(matches!(err, StorageError::Gateway(_)));
        assert_eq!(gateway.set_count(), 0);
    }

    struct ChannelObserver {
        tx: mpsc::UnboundedSender<Result<EntryRef, String>>,
    }

    impl AppendObserver for ChannelObserver {
        fn on_appended(&self, _kind: LogKind, entry: &EntryRef) {
            let _ = self.tx.send(Ok(entry.clone()));
        }

        fn on_failed(&self, _kind: LogKind, error: &StorageError) {
            let _ = self.tx.send(Err(error.to_string()));
        }
    }

    #[tokio::test]
    async fn test_detached_append_reports_to_observer() {
        let (engine, gateway) = create_test_engine(10);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = engine.with_observer(Arc::new(ChannelObserver { tx }));

        let handle = engine
            .append_detached(LogKind::NewContent, &item("A"))
            .unwrap();
        handle.await.unwrap();
        let outcome = rx.recv().await.unwrap().unwrap();
        assert_eq!(outcome.position, 0);

        gateway.fail_writes_to(engine.paths().page_path(LogKind::NewContent, 0));
        engine
            .append_detached(LogKind::NewContent, &item("B"))
            .unwrap()
            .await
            .unwrap();
        let failure = rx.recv().await.unwrap().unwrap_err();
        assert!(failure.contains("injected write failure"));
    }

    #[tokio::test]
    async fn test_detached_append_rejects_oversized_synchronously() {
        let (engine, gateway) = create_test_engine(10);
        let huge = json!({ "content": "x".repeat(5000) });

        let result = engine.append_detached(LogKind::NewContent, &huge);
        assert!(matches!(result, Err(StorageError::EntryTooLarge { .. })));
        assert_eq!(gateway.set_count(), 0);
    }

    #[test]
    fn test_detached_append_outside_runtime_is_error() {
        let (engine, gateway) = create_test_engine(10);

        let result = engine.append_detached(LogKind::NewContent, &item("A"));

        assert!(matches!(result, Err(StorageError::NoRuntime(_))));
        assert_eq!(gateway.get_count(), 0);
        assert_eq!(gateway.set_count(), 0);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let backend = Arc::new(LegacyBackend::new(Arc::new(InMemoryGateway::new())));
        let paths = PathScheme::new("d", "o").unwrap();
        let config = EngineConfig::default().with_page_size(LogKind::NewContent, 0);
        assert!(LogEngine::new(backend, paths, config).is_err());
    }
}
