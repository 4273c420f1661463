//! Integration tests for the probe cycle
//!
//! These tests verify that:
//! - The probe list feeds the monitor with the repository's hosts
//! - Scan results flow back into the repository as one batch
//! - Offline notifications only name hosts that want them

use std::sync::Arc;
use std::time::Duration;

use hostwatch::actors::messages::{MonitorEvent, ProbeTarget};
use hostwatch::actors::monitor::{MonitorHandle, MonitorSettings};
use hostwatch::actors::probe_list::ProbeListHandle;
use hostwatch::events::ChangeEvent;
use hostwatch::host::HostStatus;
use pretty_assertions::assert_eq;

use crate::helpers::*;

fn settings(offline_grace: Duration) -> MonitorSettings {
    MonitorSettings {
        poll_interval: Duration::from_secs(3600),
        max_workers: 4,
        offline_grace,
    }
}

#[tokio::test]
async fn test_probe_results_reach_repository() {
    let repository = create_repository();
    repository.add(create_host("up", "10.0.0.1")).unwrap();
    repository.add(create_host("down", "10.0.0.2")).unwrap();
    repository
        .add(create_host("quiet", "10.0.0.3").with_notifications(false))
        .unwrap();

    let probe = StaticProbe::reachable(&["10.0.0.1"]);
    let monitor = MonitorHandle::spawn(settings(Duration::ZERO), repository.clone(), probe.clone());
    let mut notifications = monitor.subscribe();
    let probe_list =
        ProbeListHandle::spawn(&repository, Arc::new(monitor.clone()), Duration::from_millis(10));

    probe_list.flush_now().await.unwrap();
    let report = monitor.poll_now().await.unwrap();
    assert_eq!(report.probed, 3);
    assert_eq!(report.reachable, 1);

    assert_eq!(repository.get("up").unwrap().status, HostStatus::Online);
    assert!(repository.get("up").unwrap().last_seen.is_some());
    assert_eq!(repository.get("down").unwrap().status, HostStatus::Offline);
    assert_eq!(repository.get("quiet").unwrap().status, HostStatus::Offline);

    let offline = loop {
        let event = tokio::time::timeout(Duration::from_secs(1), notifications.recv())
            .await
            .unwrap()
            .unwrap();
        if let MonitorEvent::HostsOffline { names } = event {
            break names;
        }
    };
    assert_eq!(offline, vec!["Host down".to_string()]);

    monitor.shutdown().await.unwrap();
    probe_list.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unchanged_hosts_are_not_reported_again() {
    let repository = create_repository();
    repository.add(create_host("down", "10.0.0.2")).unwrap();

    let probe = StaticProbe::reachable(&[]);
    let monitor = MonitorHandle::spawn(settings(Duration::ZERO), repository.clone(), probe);
    monitor
        .set_targets(vec![ProbeTarget {
            id: "down".into(),
            address: "10.0.0.2".into(),
        }])
        .await
        .unwrap();

    monitor.poll_now().await.unwrap();
    assert_eq!(repository.get("down").unwrap().status, HostStatus::Offline);

    let mut events = repository.channel().subscribe("test");
    let report = monitor.poll_now().await.unwrap();

    assert_eq!(report.applied, 0);
    assert!(drain_events(&mut events).is_empty());

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failures_inside_grace_keep_status() {
    let repository = create_repository();
    repository.add(create_host("flaky", "10.0.0.5")).unwrap();

    let probe = StaticProbe::reachable(&[]);
    let monitor = MonitorHandle::spawn(
        settings(Duration::from_secs(3600)),
        repository.clone(),
        probe,
    );
    let probe_list =
        ProbeListHandle::spawn(&repository, Arc::new(monitor.clone()), Duration::from_millis(10));
    probe_list.flush_now().await.unwrap();

    let report = monitor.poll_now().await.unwrap();
    assert_eq!(report.unreachable, 1);
    assert_eq!(report.applied, 0);
    assert_eq!(repository.get("flaky").unwrap().status, HostStatus::Unknown);

    monitor.shutdown().await.unwrap();
    probe_list.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_scan_results_arrive_as_one_batch() {
    let repository = create_repository();
    repository.add_many(create_hosts(30, "lab"));

    let probe = StaticProbe::reachable(&[]);
    let monitor = MonitorHandle::spawn(settings(Duration::ZERO), repository.clone(), probe.clone());
    let mut events = repository.channel().subscribe("test");
    let probe_list =
        ProbeListHandle::spawn(&repository, Arc::new(monitor.clone()), Duration::from_millis(10));

    probe_list.flush_now().await.unwrap();
    monitor.poll_now().await.unwrap();

    let batches: Vec<usize> = drain_events(&mut events)
        .iter()
        .map(|event| match event {
            ChangeEvent::BatchStatusChanged { changes } => changes.len(),
            other => panic!("unexpected event {}", other.kind()),
        })
        .collect();

    assert_eq!(batches, vec![30], "one event for the whole scan");
    assert_eq!(repository.stats().get(HostStatus::Offline), 30);
    assert!(probe.probe_count() >= 30);

    monitor.shutdown().await.unwrap();
    probe_list.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_deleted_host_is_no_longer_probed() {
    let repository = create_repository();
    repository.add_many(create_hosts(2, "lab"));

    let probe = StaticProbe::reachable(&[]);
    let monitor = MonitorHandle::spawn(settings(Duration::ZERO), repository.clone(), probe);
    let probe_list =
        ProbeListHandle::spawn(&repository, Arc::new(monitor.clone()), Duration::from_millis(10));
    probe_list.flush_now().await.unwrap();

    repository.delete("h1").unwrap();
    probe_list.flush_now().await.unwrap();

    let report = monitor.poll_now().await.unwrap();
    assert_eq!(report.probed, 1);
    assert_eq!(probe_list.targets().await.unwrap().len(), 1);

    monitor.shutdown().await.unwrap();
    probe_list.shutdown().await.unwrap();
}
