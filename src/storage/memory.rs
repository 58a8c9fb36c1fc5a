//! In-process snapshot storage.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::StockSnapshot;
use crate::storage::SnapshotStore;

/// Keeps the snapshot for the lifetime of the process only.
///
/// A restart begins with an empty snapshot, so the first round after a
/// restart never notifies.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<StockSnapshot>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStorage {
    async fn load(&self) -> Result<StockSnapshot> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.clone())
    }

    async fn save(&self, snapshot: &StockSnapshot) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *inner = snapshot.clone();
        Ok(())
    }
}
