//! Completion callbacks for detached appends

use tracing::{debug, warn};

use crate::error::StorageError;
use crate::model::{EntryRef, LogKind};

/// Receives the outcome of appends nobody awaits
///
/// A detached append returns as soon as the entry is validated; the store
/// round trips run on a spawned task and report here.
pub trait AppendObserver: Send + Sync {
    /// The entry was written and the index updated
    fn on_appended(&self, _kind: LogKind, _entry: &EntryRef) {}

    /// The append failed after validation
    fn on_failed(&self, kind: LogKind, error: &StorageError);
}

/// Observer that reports outcomes through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AppendObserver for TracingObserver {
    fn on_appended(&self, kind: LogKind, entry: &EntryRef) {
        debug!(
            %kind,
            page = entry.page_number,
            position = entry.position,
            "Detached append completed"
        );
    }

    fn on_failed(&self, kind: LogKind, error: &StorageError) {
        warn!(%kind, error = %error, "Detached append failed");
    }
}
