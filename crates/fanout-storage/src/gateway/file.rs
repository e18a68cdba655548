//! File-backed key/value gateway
//!
//! Stores each key as a JSON file below a root directory. Keys are split on
//! `/` into nested directories, so `crqa.hns/app/newcontent/index.json` lands
//! at `<root>/crqa.hns/app/newcontent/index.json`.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::KvGateway;
use crate::error::StorageError;

/// Distinguishes the temp files of writes in flight within this process
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// File-based implementation of KvGateway
#[derive(Debug, Clone)]
pub struct FileGateway {
    /// Directory all documents live under
    root: PathBuf,
    /// Whether to fsync before the rename that publishes a write
    sync_writes: bool,
}

impl FileGateway {
    /// Open a gateway rooted at `root`, creating the directory if needed
    pub async fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::with_options(root, true).await
    }

    /// Open a gateway with explicit sync behavior
    pub async fn with_options(
        root: impl AsRef<Path>,
        sync_writes: bool,
    ) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened file gateway");
        Ok(Self { root, sync_writes })
    }

    /// Map a key onto a file below the root
    fn file_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StorageError::gateway(format!("invalid key: {:?}", key)));
        }
        Ok(self.root.join(relative))
    }

    async fn publish(
        &self,
        temp_path: &Path,
        file_path: &Path,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let mut file = tokio::fs::File::create(temp_path).await?;
        file.write_all(bytes).await?;
        if self.sync_writes {
            file.sync_all().await?;
        }
        drop(file);
        tokio::fs::rename(temp_path, file_path).await?;
        Ok(())
    }
}

/// `<dir>/<name>.<pid>.<seq>.tmp`, unique across processes and writes
fn temp_path_for(file_path: &Path) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = file_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.{}.tmp", std::process::id(), seq));
    file_path.with_file_name(name)
}

#[async_trait]
impl KvGateway for FileGateway {
    async fn get(&self, path: &str) -> Result<Option<Value>, StorageError> {
        let file_path = self.file_path(path)?;
        trace!(path = %file_path.display(), "Reading document");

        let bytes = match tokio::fs::read(&file_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::deserialization(format!("{}: {}", path, e)))?;
        Ok(Some(value))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StorageError> {
        let file_path = self.file_path(path)?;
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes =
            serde_json::to_vec(&value).map_err(|e| StorageError::serialization(e.to_string()))?;

        // Every write gets its own sibling temp file, then renames over the
        // target. Concurrent writers to one key each publish a whole document.
        let temp_path = temp_path_for(&file_path);
        if let Err(e) = self.publish(&temp_path, &file_path, &bytes).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }

        trace!(path = %file_path.display(), bytes = bytes.len(), "Wrote document");
        Ok(())
    }
}
