//! The content record service
//!
//! Records two kinds of user activity for the app that embeds it: content the
//! user created and interactions with content. Each lands in its own fanout
//! log under `{data_domain}/{app domain}/`.

use std::sync::Arc;

use fanout_storage::{
    AppendObserver, HierarchyPrecreator, LogBackend, LogEngine, LogKind, NameRegistry, PathScheme,
    PrecreateReport,
};
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, instrument, warn};

use crate::config::DacConfig;
use crate::domain::extract_domain;
use crate::error::DacError;
use crate::types::{ContentInfo, DacResponse, RecordResult};

/// Handles of the background work started by a login
pub struct LoginTasks {
    /// Precreation of the log hierarchy
    pub precreate: JoinHandle<PrecreateReport>,
    /// Registration of the app domain; yields whether it succeeded
    pub registration: JoinHandle<bool>,
}

/// What a login achieved, once both tasks finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub precreate: PrecreateReport,
    pub registered: bool,
}

impl LoginTasks {
    /// Wait for both tasks
    pub async fn join(self) -> Result<LoginOutcome, JoinError> {
        let (precreate, registered) = tokio::join!(self.precreate, self.registration);
        Ok(LoginOutcome {
            precreate: precreate?,
            registered: registered?,
        })
    }
}

/// Records content and interactions for one app
pub struct ContentRecordService<B> {
    engine: LogEngine<B>,
    registry: Arc<NameRegistry<B>>,
    precreator: Arc<HierarchyPrecreator<B>>,
}

impl<B: LogBackend + 'static> ContentRecordService<B> {
    /// Build the service for the app identified by `referrer`
    ///
    /// # Errors
    ///
    /// - `InvalidReferrer` if no domain can be derived from `referrer`
    /// - `Config` / `Storage(InvalidConfig)` if `config` is unusable
    #[instrument(skip(config, backend), fields(backend = backend.name()))]
    pub fn init(config: &DacConfig, referrer: &str, backend: Arc<B>) -> Result<Self, DacError> {
        config.validate()?;
        let domain = extract_domain(referrer, config.portal())?;

        let paths = PathScheme::new(config.data_domain.as_str(), domain.as_str())?;
        let registry = NameRegistry::new(backend.clone(), paths.registry_path());
        let engine = LogEngine::new(backend, paths, config.engine.clone())?;
        let precreator = HierarchyPrecreator::new(engine.clone()).with_mode(config.precreate);

        info!(%domain, data_domain = %engine.paths().data_domain(), "Content record service ready");
        Ok(Self {
            engine,
            registry: Arc::new(registry),
            precreator: Arc::new(precreator),
        })
    }

    /// Route the outcome of detached records to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn AppendObserver>) -> Self {
        self.engine = self.engine.with_observer(observer);
        self
    }

    /// Domain of the app the records belong to
    pub fn domain(&self) -> &str {
        self.engine.paths().owner()
    }

    pub fn engine(&self) -> &LogEngine<B> {
        &self.engine
    }

    pub fn registry(&self) -> &NameRegistry<B> {
        &self.registry
    }

    /// Start the work that makes later records fast
    ///
    /// Warms the index and current page of both logs and registers the app
    /// domain in the shared dictionary. Both run in the background and only
    /// log their failures; the returned handles may be awaited or dropped.
    pub fn on_user_login(&self) -> LoginTasks {
        let precreator = self.precreator.clone();
        let precreate = tokio::spawn(async move {
            let report = precreator.ensure_hierarchy().await;
            if report.is_complete() {
                info!("Successfully ensured file hierarchy");
            } else {
                warn!(failed = report.failed.len(), "Failed to ensure file hierarchy");
            }
            report
        });

        let registry = self.registry.clone();
        let domain = self.domain().to_string();
        let registration = tokio::spawn(async move {
            match registry.register(&domain).await {
                Ok(added) => {
                    info!(%domain, added, "Successfully registered app name");
                    true
                }
                Err(e) => {
                    warn!(%domain, error = %e, "Failed to register app name");
                    false
                }
            }
        });

        LoginTasks {
            precreate,
            registration,
        }
    }

    /// Record new content without waiting for the store
    pub fn record_new_content(&self, info: &ContentInfo) -> DacResponse {
        self.submit(LogKind::NewContent, info)
    }

    /// Record an interaction without waiting for the store
    pub fn record_interaction(&self, info: &ContentInfo) -> DacResponse {
        self.submit(LogKind::Interactions, info)
    }

    /// Record new content and wait until it is stored
    pub async fn record_new_content_sync(&self, info: &ContentInfo) -> RecordResult {
        self.record(LogKind::NewContent, info).await
    }

    /// Record an interaction and wait until it is stored
    pub async fn record_interaction_sync(&self, info: &ContentInfo) -> RecordResult {
        self.record(LogKind::Interactions, info).await
    }

    fn submit(&self, kind: LogKind, info: &ContentInfo) -> DacResponse {
        // The handle is dropped; the outcome goes to the engine's observer
        match self.engine.append_detached(kind, info) {
            Ok(_) => DacResponse::submitted(),
            Err(e) => {
                warn!(%kind, error = %e, "Error occurred trying to record entry");
                DacResponse::rejected(e)
            }
        }
    }

    async fn record(&self, kind: LogKind, info: &ContentInfo) -> RecordResult {
        match self.engine.append(kind, info).await {
            Ok(entry_ref) => RecordResult::stored(entry_ref),
            Err(e) => {
                warn!(%kind, error = %e, "Error occurred trying to record entry");
                RecordResult::failed(e)
            }
        }
    }
}
