//! Failure tests for persistence and startup
//!
//! These tests verify that the system handles failures gracefully:
//! - Failed writes keep dirty ids and are retried
//! - Broken snapshot files abort startup instead of being overwritten
//! - Forced flushes against a stopped actor fail instead of hanging

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use hostwatch::actors::messages::FlushOutcome;
use hostwatch::actors::persistence::PersistenceHandle;
use hostwatch::actors::view_sync::TracingViewSink;
use hostwatch::app::{App, AppParts};
use hostwatch::config::Config;
use hostwatch::host::StatusUpdate;
use hostwatch::storage::PersistenceError;
use hostwatch::storage::json::JsonFileStore;
use hostwatch::storage::memory::MemoryStore;
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_failed_flush_keeps_dirty_ids_for_retry() {
    let repository = create_repository();
    let store = MemoryStore::new();
    let persistence = PersistenceHandle::spawn(
        repository.clone(),
        Arc::new(store.clone()),
        Duration::from_secs(30),
        Duration::from_secs(5),
    );

    repository.add(create_host("h1", "10.0.0.1")).unwrap();
    store.set_failing(true);

    let result = persistence.force_flush().await;
    assert_matches!(result, Err(PersistenceError::Backend(_)));

    let stats = persistence.stats().await.unwrap();
    assert_eq!(stats.dirty_count, 1);
    assert_eq!(stats.failed_flushes, 1);
    assert_eq!(stats.flush_count, 0);

    // the failure never reaches the repository
    repository
        .update_status("h1", StatusUpdate::online())
        .unwrap();

    store.set_failing(false);
    let outcome = persistence.force_flush().await.unwrap();
    assert_matches!(outcome, FlushOutcome::Written { hosts: 1, .. });
    assert_eq!(store.last_snapshot().unwrap().len(), 1);

    persistence.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_flush_after_shutdown_reports_actor_gone() {
    let repository = create_repository();
    let persistence = PersistenceHandle::spawn(
        repository,
        Arc::new(MemoryStore::new()),
        Duration::from_secs(30),
        Duration::from_secs(5),
    );

    persistence.shutdown().await.unwrap();

    let result = persistence.force_flush().await;
    assert_matches!(result, Err(PersistenceError::ActorGone));
}

#[tokio::test]
async fn test_corrupt_snapshot_aborts_startup() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hosts.json");
    std::fs::write(&path, "{ not json").unwrap();

    let parts = AppParts {
        store: Arc::new(JsonFileStore::new(&path)),
        probe: StaticProbe::reachable(&[]),
        view_sink: Box::new(TracingViewSink),
    };

    let result = App::start(&Config::default(), parts).await;
    assert!(result.is_err());

    // left untouched for manual recovery
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}

#[tokio::test]
async fn test_invalid_hosts_in_snapshot_are_skipped() {
    let store = MemoryStore::with_snapshot(vec![
        create_host("good", "10.0.0.1"),
        create_host("bad", "definitely not valid"),
    ]);

    let parts = AppParts {
        store: Arc::new(store),
        probe: StaticProbe::reachable(&[]),
        view_sink: Box::new(TracingViewSink),
    };

    let app = App::start(&Config::default(), parts).await.unwrap();
    assert!(app.repository().contains("good"));
    assert!(!app.repository().contains("bad"));
    app.shutdown().await.unwrap();
}
