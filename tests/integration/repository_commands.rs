//! Repository commands and the events they publish
//!
//! These tests verify that:
//! - Every successful command publishes exactly one event
//! - Failed commands publish nothing
//! - Bulk status updates apply valid entries and report the rest

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use hostwatch::events::ChangeEvent;
use hostwatch::host::{HostId, HostStatus, StatusUpdate};
use hostwatch::repository::{RepositoryError, StatusReport};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[test]
fn test_add_then_status_change_publishes_before_and_after() {
    let repository = create_repository();
    let mut events = repository.channel().subscribe("test");

    repository.add(create_host("h1", "10.0.0.1")).unwrap();
    assert_matches!(
        drain_events(&mut events).as_slice(),
        [ChangeEvent::Added { host }] if host.id.as_str() == "h1" && host.status == HostStatus::Unknown
    );

    let since = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    repository
        .update_status("h1", StatusUpdate::offline_since(since))
        .unwrap();

    let published = drain_events(&mut events);
    assert_eq!(published.len(), 1);
    let ChangeEvent::StatusChanged(change) = &published[0] else {
        panic!("expected a status change, got {:?}", published[0]);
    };
    assert_eq!(change.id.as_str(), "h1");
    assert_eq!(change.before.status, HostStatus::Unknown);
    assert_eq!(change.after.status, HostStatus::Offline);

    let host = repository.get("h1").unwrap();
    assert_eq!(host.offline_since, Some(since));
}

#[test]
fn test_bulk_update_skips_unknown_ids_in_one_event() {
    let repository = create_repository();
    repository.add(create_host("h1", "10.0.0.1")).unwrap();
    repository.add(create_host("h2", "10.0.0.2")).unwrap();
    let mut events = repository.channel().subscribe("test");

    let report = repository.bulk_update_status(vec![
        StatusReport::new("h1", StatusUpdate::online()),
        StatusReport::new("h2", StatusUpdate::new(HostStatus::Offline)),
        StatusReport::new("hX", StatusUpdate::online()),
    ]);

    assert_eq!(report.skipped, vec![HostId::from("hX")]);
    assert_eq!(report.applied.len(), 2);

    let published = drain_events(&mut events);
    assert_eq!(published.len(), 1, "exactly one batch event");
    let ChangeEvent::BatchStatusChanged { changes } = &published[0] else {
        panic!("expected a batch event, got {:?}", published[0]);
    };
    let mut ids: Vec<_> = changes.iter().map(|change| change.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["h1", "h2"]);

    assert_eq!(repository.get("h1").unwrap().status, HostStatus::Online);
    assert_eq!(repository.get("h2").unwrap().status, HostStatus::Offline);
}

#[test]
fn test_bulk_update_with_only_unknown_ids_publishes_nothing() {
    let repository = create_repository();
    let mut events = repository.channel().subscribe("test");

    let report = repository.bulk_update_status(vec![StatusReport::new(
        "missing",
        StatusUpdate::online(),
    )]);

    assert!(report.applied.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert!(drain_events(&mut events).is_empty());
}

#[test]
fn test_failed_commands_publish_nothing() {
    let repository = create_repository();
    repository.add(create_host("h1", "10.0.0.1")).unwrap();
    let mut events = repository.channel().subscribe("test");

    assert_eq!(
        repository.add(create_host("h1", "10.0.0.9")),
        Err(RepositoryError::DuplicateId("h1".into()))
    );
    assert_matches!(
        repository.update(create_host("h2", "10.0.0.2")),
        Err(RepositoryError::NotFound(_))
    );
    assert_matches!(repository.delete("h2"), Err(RepositoryError::NotFound(_)));
    assert_matches!(
        repository.update_status("h2", StatusUpdate::online()),
        Err(RepositoryError::NotFound(_))
    );
    assert_matches!(
        repository.add(create_host("h3", "not a host!")),
        Err(RepositoryError::Invalid(_))
    );

    assert!(drain_events(&mut events).is_empty());
    assert_eq!(repository.get("h1").unwrap().address, "10.0.0.1");
}

#[test]
fn test_update_with_new_status_reports_transition() {
    let repository = create_repository();
    repository.add(create_host("h1", "10.0.0.1")).unwrap();
    let mut events = repository.channel().subscribe("test");

    let changed = create_host("h1", "10.0.0.1")
        .with_group("lab")
        .with_status(HostStatus::Offline);
    repository.update(changed).unwrap();

    let published = drain_events(&mut events);
    assert_eq!(published.len(), 1);
    let transitions = published[0].status_transitions();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].before, HostStatus::Unknown);
    assert_eq!(transitions[0].after, HostStatus::Offline);

    // status invariant restored by the repository
    assert!(repository.get("h1").unwrap().offline_since.is_some());
}

#[test]
fn test_delete_returns_last_state() {
    let repository = create_repository();
    repository.add(create_host("h1", "10.0.0.1")).unwrap();
    repository
        .update_status("h1", StatusUpdate::online())
        .unwrap();

    let removed = repository.delete("h1").unwrap();
    assert_eq!(removed.status, HostStatus::Online);
    assert!(repository.get("h1").is_none());
    assert_eq!(repository.count(), 0);
}

#[test]
fn test_load_replaces_store_with_one_event() {
    let repository = create_repository();
    repository.add(create_host("old", "10.0.0.1")).unwrap();
    let mut events = repository.channel().subscribe("test");

    let hosts = create_hosts(20, "lab");
    let loaded = repository.load(hosts.clone());

    assert_eq!(loaded, 20);
    assert!(repository.get("old").is_none());

    let mut stored = repository.get_all();
    stored.sort_by(|a, b| a.id.cmp(&b.id));
    let mut expected = hosts;
    expected.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(stored, expected);

    let published = drain_events(&mut events);
    assert_matches!(published.as_slice(), [ChangeEvent::BatchLoaded { hosts }] if hosts.len() == 20);
}

#[test]
fn test_queries_by_group_and_status() {
    let repository = create_repository();
    repository.add_many(create_hosts(3, "lab"));
    repository
        .add(create_host("core", "10.1.0.1").with_group("core"))
        .unwrap();
    repository
        .update_status("h0", StatusUpdate::online())
        .unwrap();

    assert_eq!(repository.find_by_group("lab").len(), 3);
    assert_eq!(repository.find_by_status(HostStatus::Online).len(), 1);
    assert_eq!(repository.find_by_status(HostStatus::Unknown).len(), 3);
    assert_eq!(repository.groups(), vec!["core".to_string(), "lab".to_string()]);

    let stats = repository.stats();
    assert_eq!(stats.total(), 4);
    assert_eq!(stats.get(HostStatus::Online), 1);
    assert_eq!(repository.group_counts().get("lab"), Some(&3));
}
