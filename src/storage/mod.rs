//! Storage abstractions for snapshot persistence.
//!
//! The last observed [`StockSnapshot`] has to survive process restarts so a
//! restarted checker does not miss the transition that happened while it was
//! down. `LocalStorage` keeps it in a JSON file; `MemoryStorage` keeps it
//! only for the lifetime of the process.
//!
//! ```text
//! data/
//! ├── stock_cache.json      # Last snapshot (atomic overwrite)
//! └── log/
//!     └── history.csv       # Transition rows (append-only)
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{StockSnapshot, StorageConfig};

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// On-disk envelope for a stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
    /// ISO 8601 timestamp of the write
    pub updated_at: DateTime<Utc>,
    /// Item name to in-stock state
    pub items: StockSnapshot,
}

impl SnapshotData {
    pub fn new(items: StockSnapshot) -> Self {
        Self {
            updated_at: Utc::now(),
            items,
        }
    }
}

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot.
    ///
    /// A missing or unreadable snapshot yields an empty one.
    async fn load(&self) -> Result<StockSnapshot>;

    /// Replace the saved snapshot.
    async fn save(&self, snapshot: &StockSnapshot) -> Result<()>;
}

/// Build the backend selected by the storage settings.
pub fn open(config: &StorageConfig) -> Box<dyn SnapshotStore> {
    if config.persist {
        Box::new(LocalStorage::new(&config.snapshot_file))
    } else {
        Box::new(MemoryStorage::new())
    }
}
