//! AggregateActor - Incrementally maintained dashboard counters
//!
//! Counters are updated per event in O(1) per touched host instead of
//! rescanning the repository. Only `BatchLoaded` triggers a full recompute,
//! from the host list carried by the event itself.
//!
//! Snapshots are published on a `watch` channel once the coalescing window
//! expires, so a burst of status changes produces a single dashboard update.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, instrument, trace, warn};

use super::messages::{AggregateCommand, AggregateSnapshot};
use crate::channel::{EventReceiver, dispatch};
use crate::coalesce::CoalescingWindow;
use crate::events::ChangeEvent;
use crate::host::{Host, HostStatus};
use crate::repository::HostRepository;
use crate::stats::StatusCounts;

/// Per-status and per-group host counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateCounters {
    by_status: StatusCounts,
    by_group: BTreeMap<String, usize>,
}

impl AggregateCounters {
    pub fn from_hosts<'a>(hosts: impl IntoIterator<Item = &'a Host>) -> Self {
        let mut counters = Self::default();
        for host in hosts {
            counters.add(host.status, &host.group);
        }
        counters
    }

    pub fn by_status(&self) -> &StatusCounts {
        &self.by_status
    }

    pub fn by_group(&self) -> &BTreeMap<String, usize> {
        &self.by_group
    }

    pub fn snapshot(&self) -> AggregateSnapshot {
        AggregateSnapshot {
            by_status: self.by_status.clone(),
            by_group: self.by_group.clone(),
        }
    }

    /// Fold one event into the counters; returns whether anything changed
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match event {
            ChangeEvent::Added { host } => {
                self.add(host.status, &host.group);
                true
            }

            ChangeEvent::Deleted { before, .. } => {
                self.remove(before.status, &before.group);
                true
            }

            ChangeEvent::Updated { before, after, .. } => {
                if before.status == after.status && before.group == after.group {
                    return false;
                }
                self.remove(before.status, &before.group);
                self.add(after.status, &after.group);
                true
            }

            ChangeEvent::StatusChanged(_) | ChangeEvent::BatchStatusChanged { .. } => {
                let mut changed = false;
                for transition in event.status_transitions() {
                    self.move_status(transition.before, transition.after);
                    changed = true;
                }
                changed
            }

            ChangeEvent::BatchLoaded { hosts } => {
                *self = Self::from_hosts(hosts);
                true
            }
        }
    }

    fn add(&mut self, status: HostStatus, group: &str) {
        self.by_status.increment(status);
        *self.by_group.entry(group.to_string()).or_insert(0) += 1;
    }

    fn remove(&mut self, status: HostStatus, group: &str) {
        if !self.by_status.decrement(status) {
            warn!("status counter for {status} would underflow, keeping it at zero");
        }

        match self.by_group.get_mut(group) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.by_group.remove(group);
            }
            None => warn!("group counter for '{group}' would underflow, keeping it at zero"),
        }
    }

    fn move_status(&mut self, from: HostStatus, to: HostStatus) {
        if !self.by_status.decrement(from) {
            warn!("status counter for {from} would underflow, keeping it at zero");
        }
        self.by_status.increment(to);
    }
}

/// Actor owning the counters
pub struct AggregateActor {
    events: EventReceiver,
    command_rx: mpsc::Receiver<AggregateCommand>,
    counters: AggregateCounters,
    snapshot_tx: watch::Sender<AggregateSnapshot>,
    window: CoalescingWindow,
}

impl AggregateActor {
    pub fn new(
        events: EventReceiver,
        command_rx: mpsc::Receiver<AggregateCommand>,
        counters: AggregateCounters,
        snapshot_tx: watch::Sender<AggregateSnapshot>,
        window: Duration,
    ) -> Self {
        Self {
            events,
            command_rx,
            counters,
            snapshot_tx,
            window: CoalescingWindow::new(window),
        }
    }

    #[instrument(skip(self), name = "aggregate")]
    pub async fn run(mut self) {
        debug!("starting aggregate actor");

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle_event(&event),
                        None => {
                            warn!("event channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = self.window.expired(), if self.window.is_armed() => {
                    self.publish();
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        AggregateCommand::GetCounters { respond_to } => {
                            for event in self.events.drain() {
                                self.handle_event(&event);
                            }
                            let _ = respond_to.send(self.counters.snapshot());
                        }
                        AggregateCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("aggregate actor stopped");
    }

    fn handle_event(&mut self, event: &ChangeEvent) {
        let counters = &mut self.counters;
        let mut changed = false;

        dispatch(self.events.name(), event, |event| {
            changed = counters.apply(event);
            Ok(())
        });

        if changed {
            self.window.touch();
        }
    }

    fn publish(&mut self) {
        self.window.clear();
        let snapshot = self.counters.snapshot();
        trace!("publishing aggregate snapshot ({} hosts)", snapshot.total());
        self.snapshot_tx.send_replace(snapshot);
    }
}

/// Handle for querying the AggregateActor
#[derive(Clone)]
pub struct AggregateHandle {
    sender: mpsc::Sender<AggregateCommand>,
    snapshot_rx: watch::Receiver<AggregateSnapshot>,
}

impl AggregateHandle {
    /// Spawn the actor, seeded with the repository's current hosts
    pub fn spawn(repository: &HostRepository, window: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (hosts, events) = repository.subscribe_with_snapshot("aggregate");

        let counters = AggregateCounters::from_hosts(&hosts);
        let (snapshot_tx, snapshot_rx) = watch::channel(counters.snapshot());

        let actor = AggregateActor::new(events, cmd_rx, counters, snapshot_tx, window);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            snapshot_rx,
        }
    }

    /// Watch the coalesced snapshots
    pub fn subscribe(&self) -> watch::Receiver<AggregateSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Current counters with every already-published event applied
    pub async fn counters(&self) -> Result<AggregateSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AggregateCommand::GetCounters { respond_to: tx })
            .await
            .context("failed to send GetCounters command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(AggregateCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
