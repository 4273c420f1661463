//! Snapshot persistence for the host repository
//!
//! The persistence actor writes full snapshots of all hosts through the
//! [`SnapshotStore`] trait. Implementations:
//!
//! - **JSON file** (default): atomic write-temp-then-rename, see [`json::JsonFileStore`]
//! - **In-memory**: nothing survives a restart, used for tests and `backend = "none"`
//!
//! ## Usage
//!
//! ```no_run
//! use hostwatch::storage::{SnapshotStore, json::JsonFileStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = JsonFileStore::new("./hosts.json");
//!     let hosts = store.load().await?;
//!     store.save(&hosts).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod json;
pub mod memory;
pub mod schema;

use std::sync::Arc;

pub use backend::SnapshotStore;
pub use error::{PersistenceError, PersistenceResult};
pub use schema::{SNAPSHOT_VERSION, SnapshotFile};

use crate::config::StorageConfig;

/// Build the snapshot store selected in the configuration
pub fn open_store(config: &StorageConfig) -> Arc<dyn SnapshotStore> {
    match config {
        StorageConfig::None => Arc::new(memory::MemoryStore::new()),
        StorageConfig::Json { path } => Arc::new(json::JsonFileStore::new(path)),
    }
}
