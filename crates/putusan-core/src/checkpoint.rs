//! JSON-file checkpoint store.
//!
//! Each commit writes the full record to a sibling temp file and renames it
//! over the real one, so a crash leaves either the old or the new record on
//! disk, never a torn one. The temp file is fsynced on the first commit and
//! then every `sync_interval` commits.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;

use crate::error::AppError;
use crate::models::{Checkpoint, RunMetadata};
use crate::traits::CheckpointStore;

/// Checkpoint record stored as a single overwritten JSON file.
#[derive(Debug)]
pub struct JsonFileCheckpointStore {
    path: PathBuf,
    sync_interval: u64,
    commits: AtomicU64,
}

impl JsonFileCheckpointStore {
    /// Open a store at `path`, creating the parent directory if needed.
    ///
    /// Fails with a configuration error when the location is unusable.
    pub fn open(path: impl Into<PathBuf>, sync_interval: u32) -> Result<Self, AppError> {
        let path = path.into();
        if path.file_name().is_none() {
            return Err(AppError::ConfigError(format!(
                "checkpoint path '{}' does not name a file",
                path.display()
            )));
        }
        if path.is_dir() {
            return Err(AppError::ConfigError(format!(
                "checkpoint path '{}' is a directory",
                path.display()
            )));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::ConfigError(format!(
                    "checkpoint directory '{}' is not usable: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(Self {
            path,
            sync_interval: u64::from(sync_interval.max(1)),
            commits: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Remove the record. Missing records are not an error.
    pub async fn clear(&self) -> Result<(), AppError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::CheckpointError(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write_atomically(&self, bytes: &[u8], sync: bool) -> std::io::Result<()> {
        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        if sync {
            file.sync_all().await?;
        }
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await
    }
}

impl CheckpointStore for JsonFileCheckpointStore {
    async fn load(&self) -> Option<Checkpoint> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Checkpoint unreadable, starting fresh");
                return None;
            }
        };
        match serde_json::from_slice::<Checkpoint>(&raw) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Checkpoint corrupt, starting fresh");
                None
            }
        }
    }

    async fn commit(&self, unit_id: u64, metadata: RunMetadata) -> Result<Checkpoint, AppError> {
        let checkpoint = Checkpoint::new(unit_id, metadata);
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;

        let n = self.commits.fetch_add(1, Ordering::SeqCst);
        let sync = n % self.sync_interval == 0;

        self.write_atomically(&bytes, sync).await.map_err(|e| {
            AppError::CheckpointError(format!(
                "failed to write {}: {e}",
                self.path.display()
            ))
        })?;

        tracing::debug!(unit_id, synced = sync, path = %self.path.display(), "Checkpoint committed");
        Ok(checkpoint)
    }
}
