//! Snapshot store trait definition

use async_trait::async_trait;

use super::error::PersistenceResult;
use crate::host::Host;

/// Trait for snapshot persistence backends
///
/// A store only ever sees whole snapshots: `save` replaces everything that
/// was stored before, `load` returns the last complete snapshot.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; the persistence actor holds the
/// store behind an `Arc` and the composition root loads through the same one.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot with `hosts`
    ///
    /// Must be atomic: after a crash either the previous or the new snapshot
    /// is readable, never a partial one.
    async fn save(&self, hosts: &[Host]) -> PersistenceResult<()>;

    /// Read the last saved snapshot; empty if nothing was saved yet
    async fn load(&self) -> PersistenceResult<Vec<Host>>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}
