//! In-memory snapshot store (no persistence)
//!
//! Keeps the last saved snapshot in memory. Useful for:
//! - Running without a state file (`backend = "none"`)
//! - Tests that need to observe flushes or inject write failures
//!
//! The store is a cheap cloneable handle; clones share state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::backend::SnapshotStore;
use super::error::{PersistenceError, PersistenceResult};
use crate::host::Host;

#[derive(Default)]
struct Inner {
    snapshot: Mutex<Option<Vec<Host>>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing snapshot, as if it had been saved before
    pub fn with_snapshot(hosts: Vec<Host>) -> Self {
        let store = Self::new();
        *store.inner.snapshot.lock() = Some(hosts);
        store
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// Last successfully saved snapshot
    pub fn last_snapshot(&self) -> Option<Vec<Host>> {
        self.inner.snapshot.lock().clone()
    }

    /// Make every following `save` fail until switched off again
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save(&self, hosts: &[Host]) -> PersistenceResult<()> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend(
                "in-memory store is set to fail".to_string(),
            ));
        }

        *self.inner.snapshot.lock() = Some(hosts.to_vec());
        let saves = self.inner.saves.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("in-memory store: saved {} hosts (save #{saves})", hosts.len());
        Ok(())
    }

    async fn load(&self) -> PersistenceResult<Vec<Host>> {
        Ok(self.inner.snapshot.lock().clone().unwrap_or_default())
    }

    fn describe(&self) -> String {
        "in-memory store".to_string()
    }
}
