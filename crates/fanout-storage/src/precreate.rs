//! Hierarchy precreation
//!
//! A get against a key that does not exist yet is much slower on the remote
//! store than a get against an existing one, since the miss is only reported
//! after a timeout. Warming the index and current page of every log kind at
//! session start moves that cost out of the first user-triggered append.
//!
//! Precreation is an optimization only. Failures are logged and swallowed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::LogBackend;
use crate::engine::LogEngine;
use crate::error::StorageError;
use crate::model::LogKind;

/// How far precreation goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecreateMode {
    /// Fetch index and current page, discard the results
    #[default]
    Warm,
    /// Also write the default documents of kinds that had none stored
    Materialize,
}

/// Outcome of [`HierarchyPrecreator::ensure_hierarchy`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecreateReport {
    /// Kinds whose index and current page were reached
    pub warmed: Vec<LogKind>,
    /// Documents written because they were missing
    pub materialized: Vec<String>,
    /// Kinds that failed, with the error message
    pub failed: Vec<(LogKind, String)>,
}

impl PrecreateReport {
    /// Whether every kind was warmed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Warms the index and current page of every log kind
pub struct HierarchyPrecreator<B> {
    engine: LogEngine<B>,
    mode: PrecreateMode,
}

impl<B: LogBackend> HierarchyPrecreator<B> {
    /// Create a precreator in [`PrecreateMode::Warm`]
    pub fn new(engine: LogEngine<B>) -> Self {
        Self {
            engine,
            mode: PrecreateMode::default(),
        }
    }

    /// Set the precreation mode
    pub fn with_mode(mut self, mode: PrecreateMode) -> Self {
        self.mode = mode;
        self
    }

    /// Warm every log kind, never failing
    pub async fn ensure_hierarchy(&self) -> PrecreateReport {
        let mut report = PrecreateReport::default();

        for kind in LogKind::ALL {
            match self.ensure_kind(kind, &mut report.materialized).await {
                Ok(()) => {
                    debug!(%kind, "Ensured file hierarchy");
                    report.warmed.push(kind);
                }
                Err(e) => {
                    warn!(%kind, error = %e, "Failed to ensure file hierarchy");
                    report.failed.push((kind, e.to_string()));
                }
            }
        }

        info!(
            warmed = report.warmed.len(),
            materialized = report.materialized.len(),
            failed = report.failed.len(),
            "Precreation finished"
        );
        report
    }

    async fn ensure_kind(
        &self,
        kind: LogKind,
        materialized: &mut Vec<String>,
    ) -> Result<(), StorageError> {
        let indexes = self.engine.index_store();
        let pages = self.engine.page_store();

        let index = indexes.fetch_index(kind).await?;
        let page = pages.fetch_page(kind, index.value.curr_page_number).await?;

        if self.mode == PrecreateMode::Materialize {
            if !index.found {
                match indexes.persist_index(kind, &index).await {
                    Ok(_) => materialized.push(self.engine.paths().index_path(kind).to_string()),
                    // Someone else created it in the meantime
                    Err(e) if e.is_conflict() => {}
                    Err(e) => return Err(e),
                }
            }
            if !page.found {
                match pages.persist_page(&page).await {
                    Ok(_) => materialized.push(page.value.page_path.clone()),
                    Err(e) if e.is_conflict() => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }
}
