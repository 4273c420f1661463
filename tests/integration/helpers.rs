//! Helper functions for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use hostwatch::actors::view_sync::{StatusCell, ViewSink};
use hostwatch::channel::{EventChannel, EventReceiver};
use hostwatch::events::ChangeEvent;
use hostwatch::host::Host;
use hostwatch::monitors::{Probe, ProbeOutcome};
use hostwatch::repository::HostRepository;
use parking_lot::Mutex;
use std::time::Duration;

pub fn create_repository() -> Arc<HostRepository> {
    Arc::new(HostRepository::new(Arc::new(EventChannel::new())))
}

pub fn create_host(id: &str, address: &str) -> Host {
    Host::new(address, format!("Host {id}")).with_id(id)
}

/// `count` hosts `h0..`, all in `group`, with addresses `10.0.<n>.<m>`
pub fn create_hosts(count: usize, group: &str) -> Vec<Host> {
    (0..count)
        .map(|i| {
            create_host(&format!("h{i}"), &format!("10.0.{}.{}", i / 250, i % 250 + 1))
                .with_group(group)
        })
        .collect()
}

/// Everything queued on a subscription right now
pub fn drain_events(events: &mut EventReceiver) -> Vec<ChangeEvent> {
    events
        .drain()
        .into_iter()
        .map(|event| event.as_ref().clone())
        .collect()
}

/// Probe answering from a set of reachable addresses that tests can change
#[derive(Default)]
pub struct StaticProbe {
    reachable: Mutex<HashSet<String>>,
    probes: Mutex<usize>,
}

impl StaticProbe {
    pub fn reachable(addresses: &[&str]) -> Arc<Self> {
        let probe = Self::default();
        probe.set_reachable(addresses);
        Arc::new(probe)
    }

    pub fn set_reachable(&self, addresses: &[&str]) {
        *self.reachable.lock() = addresses.iter().map(|a| a.to_string()).collect();
    }

    pub fn probe_count(&self) -> usize {
        *self.probes.lock()
    }
}

#[async_trait]
impl Probe for StaticProbe {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        *self.probes.lock() += 1;
        if self.reachable.lock().contains(address) {
            ProbeOutcome::Reachable {
                latency: Duration::from_millis(1),
            }
        } else {
            ProbeOutcome::Unreachable {
                reason: "connection timed out".into(),
            }
        }
    }
}

/// What a view sink was asked to draw
#[derive(Debug, Default, Clone)]
pub struct ViewLog {
    pub reloads: Vec<usize>,
    pub rows: Vec<Host>,
    pub cells: Vec<StatusCell>,
}

/// View sink recording every call into a shared log
#[derive(Clone, Default)]
pub struct RecordingView {
    pub log: Arc<Mutex<ViewLog>>,
}

impl ViewSink for RecordingView {
    fn reload(&mut self, hosts: &[Host]) {
        self.log.lock().reloads.push(hosts.len());
    }

    fn redraw_rows(&mut self, rows: &[Host]) {
        self.log.lock().rows.extend_from_slice(rows);
    }

    fn redraw_status_cells(&mut self, cells: &[StatusCell]) {
        self.log.lock().cells.extend_from_slice(cells);
    }
}
