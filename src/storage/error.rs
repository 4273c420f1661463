//! Error types for snapshot persistence

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors that can occur while saving or loading snapshots
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Writing the snapshot file failed
    #[error("failed to write snapshot to {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading an existing snapshot file failed
    #[error("failed to read snapshot from {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    /// A forced flush did not finish in time
    #[error("flush did not complete within {0:?}")]
    Timeout(Duration),

    /// The persistence actor is not running anymore
    #[error("persistence actor is gone")]
    ActorGone,

    /// Backend-specific error
    #[error("snapshot backend error: {0}")]
    Backend(String),
}
