//! Local filesystem storage implementation.
//!
//! The snapshot is written to a temporary sibling first and renamed over the
//! target, so a crash mid-write never leaves a truncated file behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::StockSnapshot;
use crate::storage::{SnapshotData, SnapshotStore};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage backed by the given snapshot file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read the stored envelope without recovery.
    pub async fn read_data(&self) -> Result<Option<SnapshotData>> {
        match self.read_bytes().await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SnapshotStore for LocalStorage {
    async fn load(&self) -> Result<StockSnapshot> {
        match self.read_data().await {
            Ok(Some(data)) => {
                log::info!(
                    "Loaded snapshot of {} items from {} (saved {})",
                    data.items.len(),
                    self.path.display(),
                    data.updated_at
                );
                Ok(data.items)
            }
            Ok(None) => {
                log::info!("No snapshot at {}, starting empty", self.path.display());
                Ok(StockSnapshot::new())
            }
            Err(e) => {
                log::warn!(
                    "Snapshot at {} is unreadable ({}), starting empty",
                    self.path.display(),
                    e
                );
                Ok(StockSnapshot::new())
            }
        }
    }

    async fn save(&self, snapshot: &StockSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&SnapshotData::new(snapshot.clone()))?;
        self.write_bytes(&bytes).await?;
        log::debug!(
            "Snapshot of {} items written to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }
}
