//! Integration tests for snapshot persistence
//!
//! These tests verify that:
//! - Bursts of changes collapse into one flush per timer tick
//! - Deleted hosts never reach the snapshot
//! - Forced flushes are idempotent
//! - Snapshots written to a JSON file survive a restart

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use hostwatch::actors::messages::FlushOutcome;
use hostwatch::actors::persistence::PersistenceHandle;
use hostwatch::actors::view_sync::TracingViewSink;
use hostwatch::app::{App, AppParts};
use hostwatch::config::Config;
use hostwatch::host::{HostStatus, StatusUpdate};
use hostwatch::storage::SnapshotStore;
use hostwatch::storage::json::JsonFileStore;
use hostwatch::storage::memory::MemoryStore;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::*;

const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

fn spawn_persistence(
    repository: &Arc<hostwatch::repository::HostRepository>,
    store: &MemoryStore,
) -> PersistenceHandle {
    PersistenceHandle::spawn(
        repository.clone(),
        Arc::new(store.clone()),
        FLUSH_INTERVAL,
        Duration::from_secs(5),
    )
}

#[tokio::test(start_paused = true)]
async fn test_status_burst_flushes_once_per_tick() {
    let repository = create_repository();
    let store = MemoryStore::new();
    let persistence = spawn_persistence(&repository, &store);

    repository.add_many(create_hosts(5, "lab"));
    persistence.force_flush().await.unwrap();
    assert_eq!(store.save_count(), 1);

    for round in 0..10 {
        for i in 0..5 {
            let update = if round % 2 == 0 {
                StatusUpdate::online()
            } else {
                StatusUpdate::new(HostStatus::Offline)
            };
            repository.update_status(&format!("h{i}"), update).unwrap();
        }
    }

    let stats = persistence.stats().await.unwrap();
    assert_eq!(stats.dirty_count, 5, "bounded by distinct ids, not by 50 events");
    assert_eq!(store.save_count(), 1, "nothing written before the tick");

    tokio::time::sleep(FLUSH_INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(store.save_count(), 2);

    // clean ticks do not write
    tokio::time::sleep(FLUSH_INTERVAL * 3).await;
    assert_eq!(store.save_count(), 2);

    let saved = store.last_snapshot().unwrap();
    assert!(saved.iter().all(|host| host.status == HostStatus::Offline));

    persistence.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_deleted_host_is_not_flushed() {
    let repository = create_repository();
    let store = MemoryStore::new();
    let persistence = spawn_persistence(&repository, &store);

    repository.add(create_host("h1", "10.0.0.1")).unwrap();
    repository.add(create_host("h2", "10.0.0.2")).unwrap();
    persistence.force_flush().await.unwrap();

    repository
        .update_status("h2", StatusUpdate::online())
        .unwrap();
    repository.delete("h2").unwrap();
    persistence.force_flush().await.unwrap();

    let saved = store.last_snapshot().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id.as_str(), "h1");

    persistence.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_force_flush_twice_writes_once() {
    let repository = create_repository();
    let store = MemoryStore::new();
    let persistence = spawn_persistence(&repository, &store);

    repository.add(create_host("h1", "10.0.0.1")).unwrap();

    let first = persistence.force_flush().await.unwrap();
    let second = persistence.force_flush().await.unwrap();

    assert_matches!(first, FlushOutcome::Written { hosts: 1, dirty: 1 });
    assert_eq!(second, FlushOutcome::Clean);
    assert_eq!(store.save_count(), 1);

    persistence.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_json_snapshot_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state").join("hosts.json");

    let parts = |path: &std::path::Path| AppParts {
        store: Arc::new(JsonFileStore::new(path)),
        probe: StaticProbe::reachable(&[]),
        view_sink: Box::new(TracingViewSink),
    };

    let app = App::start(&Config::default(), parts(path.as_path())).await.unwrap();
    let repository = app.repository().clone();
    repository
        .add(create_host("h1", "10.0.0.1").with_group("lab"))
        .unwrap();
    repository
        .add(create_host("h2", "printer.local").with_notifications(false))
        .unwrap();
    app.shutdown().await.unwrap();

    let stored = JsonFileStore::new(&path).load().await.unwrap();
    assert_eq!(stored.len(), 2);

    let app = App::start(&Config::default(), parts(path.as_path())).await.unwrap();
    let restored = app.repository().get("h2").unwrap();
    assert_eq!(restored.address, "printer.local");
    assert!(!restored.notifications_enabled);
    assert_eq!(app.repository().get("h1").unwrap().group, "lab");
    app.shutdown().await.unwrap();
}
