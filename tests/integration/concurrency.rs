//! Concurrency and ordering tests
//!
//! These tests verify thread-safety of the repository:
//! - Concurrent writers never lose commands
//! - Every subscriber sees every event in commit order
//! - Consumers seeded during a write storm end up consistent

use std::time::Duration;

use hostwatch::actors::aggregate::AggregateHandle;
use hostwatch::events::ChangeEvent;
use hostwatch::host::{HostStatus, StatusUpdate};
use hostwatch::repository::StatusReport;
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_lose_nothing() {
    let repository = create_repository();
    let mut events = repository.channel().subscribe("test");

    let mut tasks = Vec::new();
    for writer in 0..8 {
        let repository = repository.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..25 {
                let id = format!("w{writer}-{i}");
                repository
                    .add(create_host(&id, &format!("10.{writer}.0.{}", i + 1)))
                    .unwrap();
                repository
                    .update_status(&id, StatusUpdate::online())
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(repository.count(), 200);
    assert_eq!(repository.stats().get(HostStatus::Online), 200);

    let published = drain_events(&mut events);
    assert_eq!(published.len(), 400);

    // per host, Added always precedes its StatusChanged
    let mut seen = std::collections::HashSet::new();
    for event in &published {
        match event {
            ChangeEvent::Added { host } => assert!(seen.insert(host.id.clone())),
            ChangeEvent::StatusChanged(change) => assert!(seen.contains(&change.id)),
            other => panic!("unexpected event {}", other.kind()),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribers_agree_on_order() {
    let repository = create_repository();
    repository.add_many(create_hosts(10, "lab"));

    let mut first = repository.channel().subscribe("first");
    let mut second = repository.channel().subscribe("second");

    let mut tasks = Vec::new();
    for writer in 0..4 {
        let repository = repository.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..20 {
                let status = if (writer + round) % 2 == 0 {
                    HostStatus::Online
                } else {
                    HostStatus::Offline
                };
                repository.bulk_update_status(
                    (0..10)
                        .map(|i| StatusReport::new(format!("h{i}"), StatusUpdate::new(status)))
                        .collect(),
                );
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let first = drain_events(&mut first);
    let second = drain_events(&mut second);
    assert_eq!(first.len(), 80);
    assert_eq!(first, second);

    // the last event describes the final state
    let Some(ChangeEvent::BatchStatusChanged { changes }) = first.last() else {
        panic!("expected a batch event");
    };
    for change in changes {
        assert_eq!(
            repository.get(change.id.as_str()).unwrap().status,
            change.after.status
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aggregate_seeded_during_writes_stays_consistent() {
    let repository = create_repository();

    let writer = {
        let repository = repository.clone();
        tokio::spawn(async move {
            for i in 0..300 {
                let id = format!("h{i}");
                repository
                    .add(create_host(&id, &format!("10.0.{}.{}", i / 250, i % 250 + 1)))
                    .unwrap();
                if i % 3 == 0 {
                    repository
                        .update_status(&id, StatusUpdate::new(HostStatus::Offline))
                        .unwrap();
                }
                if i % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(1)).await;
    let aggregate = AggregateHandle::spawn(&repository, Duration::from_millis(20));

    writer.await.unwrap();

    let snapshot = aggregate.counters().await.unwrap();
    assert_eq!(snapshot.by_status, repository.stats());
    assert_eq!(snapshot.by_group, repository.group_counts());
    assert_eq!(snapshot.total(), 300);

    aggregate.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dropped_subscriber_is_removed() {
    let repository = create_repository();
    let kept = repository.channel().subscribe("kept");
    let dropped = repository.channel().subscribe("dropped");
    drop(dropped);

    repository.add(create_host("h1", "10.0.0.1")).unwrap();

    assert_eq!(repository.channel().subscriber_count(), 1);
    drop(kept);
}
