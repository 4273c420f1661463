//! MonitorActor - Probes all targets and reports status changes
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → Probe targets (bounded concurrency) → Evaluate → bulk_update_status
//!     ↑                                                              │
//!     └─── Commands (SetTargets, PollNow, Shutdown)                  └──► MonitorEvent broadcast
//! ```
//!
//! Only real changes reach the repository: a status transition, or a
//! heartbeat refreshing `last_seen` of an online host at most once a minute.
//! All changes of one cycle go through a single batch command.
//!
//! Commands are handled while a cycle runs, so a re-addressed host is never
//! judged by the result of its old address and shutdown does not wait for
//! outstanding probes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::{StreamExt, stream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, interval};
use tracing::{debug, instrument, trace, warn};

use super::messages::{MonitorCommand, MonitorEvent, ProbeTarget, ScanReport};
use super::probe_list::TargetSink;
use crate::config::MonitorConfig;
use crate::host::{Host, HostId, HostStatus, StatusUpdate};
use crate::monitors::{Probe, ProbeOutcome, ReachabilityEvaluation};
use crate::repository::{HostRepository, StatusReport};

/// How often an online host's `last_seen` is refreshed
const HEARTBEAT_INTERVAL: TimeDelta = TimeDelta::seconds(60);

/// Capacity of the monitor event broadcast
const EVENT_CAPACITY: usize = 64;

/// Monitor settings derived from the configuration
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub max_workers: usize,
    pub offline_grace: Duration,
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_workers: config.max_workers,
            offline_grace: config.offline_grace(),
        }
    }
}

pub struct MonitorActor {
    settings: MonitorSettings,
    repository: Arc<HostRepository>,
    probe: Arc<dyn Probe>,
    targets: Vec<ProbeTarget>,

    /// Start of the current failure streak per host
    failures: HashMap<HostId, DateTime<Utc>>,
    /// PollNow callers waiting for the running cycle
    waiting: Vec<oneshot::Sender<ScanReport>>,

    command_rx: mpsc::Receiver<MonitorCommand>,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl MonitorActor {
    pub fn new(
        settings: MonitorSettings,
        repository: Arc<HostRepository>,
        probe: Arc<dyn Probe>,
        command_rx: mpsc::Receiver<MonitorCommand>,
        event_tx: broadcast::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            settings,
            repository,
            probe,
            targets: Vec::new(),
            failures: HashMap::new(),
            waiting: Vec::new(),
            command_rx,
            event_tx,
        }
    }

    #[instrument(skip(self), name = "monitor")]
    pub async fn run(mut self) {
        debug!(
            "starting monitor actor (interval {:?}, {} workers)",
            self.settings.poll_interval, self.settings.max_workers
        );

        let mut ticker = interval(self.settings.poll_interval);
        let mut shutdown_ack = None;

        loop {
            let stop = tokio::select! {
                _ = ticker.tick() => {
                    if self.targets.is_empty() {
                        trace!("no targets, skipping scan");
                        continue;
                    }
                    self.scan().await
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MonitorCommand::SetTargets { targets } => {
                            if self.replace_targets(targets) {
                                ticker = interval(self.settings.poll_interval);
                            }
                            None
                        }

                        MonitorCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            self.waiting.push(respond_to);
                            self.scan().await
                        }

                        MonitorCommand::Shutdown { respond_to } => Some(respond_to),
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            };

            if let Some(respond_to) = stop {
                debug!("received shutdown command");
                shutdown_ack = Some(respond_to);
                break;
            }
        }

        debug!("monitor actor stopped");
        if let Some(respond_to) = shutdown_ack {
            let _ = respond_to.send(());
        }
    }

    /// Install a new target list, returning whether it differs from the current one
    fn replace_targets(&mut self, mut targets: Vec<ProbeTarget>) -> bool {
        targets.sort();
        if targets == self.targets {
            return false;
        }

        debug!(
            "targets changed ({} -> {}), restarting cycle",
            self.targets.len(),
            targets.len()
        );
        self.failures.retain(|id, _| targets.iter().any(|t| &t.id == id));
        self.targets = targets;
        true
    }

    /// Probe every target once and report the changes
    ///
    /// Commands are served while the probes run. A changed target list drops
    /// the results gathered so far and starts over, `PollNow` waits for the
    /// running cycle. Returns the responder of a `Shutdown` received meanwhile.
    async fn scan(&mut self) -> Option<oneshot::Sender<()>> {
        let (outcomes, started) = 'cycle: loop {
            let started = Instant::now();
            let _ = self.event_tx.send(MonitorEvent::ScanStarted {
                targets: self.targets.len(),
            });

            let probe = self.probe.clone();
            let probing = stream::iter(self.targets.clone())
                .map(move |target| {
                    let probe = probe.clone();
                    async move {
                        let outcome = probe.probe(&target.address).await;
                        (target, outcome)
                    }
                })
                .buffer_unordered(self.settings.max_workers.max(1))
                .collect::<Vec<(ProbeTarget, ProbeOutcome)>>();
            tokio::pin!(probing);

            loop {
                tokio::select! {
                    outcomes = &mut probing => break 'cycle (outcomes, started),

                    Some(cmd) = self.command_rx.recv() => match cmd {
                        MonitorCommand::SetTargets { targets } => {
                            if self.replace_targets(targets) {
                                continue 'cycle;
                            }
                        }

                        MonitorCommand::PollNow { respond_to } => {
                            trace!("PollNow joins the running scan");
                            self.waiting.push(respond_to);
                        }

                        MonitorCommand::Shutdown { respond_to } => {
                            debug!("abandoning scan of {} targets", self.targets.len());
                            return Some(respond_to);
                        }
                    },
                }
            }
        };

        let report = self.apply_outcomes(outcomes, started);
        for respond_to in self.waiting.drain(..) {
            let _ = respond_to.send(report.clone());
        }
        None
    }

    /// Evaluate the probe results of one cycle and commit them as one batch
    fn apply_outcomes(
        &mut self,
        outcomes: Vec<(ProbeTarget, ProbeOutcome)>,
        started: Instant,
    ) -> ScanReport {
        let now = Utc::now();
        let current: HashMap<HostId, Host> = self
            .repository
            .get_many(outcomes.iter().map(|(target, _)| target.id.as_str()))
            .into_iter()
            .map(|host| (host.id.clone(), host))
            .collect();

        let mut report = ScanReport {
            probed: outcomes.len(),
            ..ScanReport::default()
        };
        let mut updates = Vec::new();
        let mut newly_offline = Vec::new();

        for (target, outcome) in outcomes {
            let reachable = outcome.is_reachable();
            if reachable {
                report.reachable += 1;
            } else {
                report.unreachable += 1;
            }

            let Some(host) = current.get(target.id.as_str()) else {
                trace!("{} was removed during the scan", target.id);
                self.failures.remove(target.id.as_str());
                continue;
            };

            // the host was re-addressed while its old address was probed
            if host.address != target.address {
                trace!(
                    "{} moved from {} to {} during the scan",
                    target.id, target.address, host.address
                );
                continue;
            }

            if let Some(update) = self.evaluate(host, reachable, now) {
                if update.status == HostStatus::Offline && host.notifications_enabled {
                    newly_offline.push(host.display_name.clone());
                }
                updates.push(StatusReport::new(target.id, update));
            }
        }

        if !updates.is_empty() {
            let result = self.repository.bulk_update_status(updates);
            report.applied = result.applied.len();
            report.skipped = result.skipped.len();
        }
        report.duration = started.elapsed();

        debug!(
            "scan finished: {}/{} reachable, {} changes in {:?}",
            report.reachable, report.probed, report.applied, report.duration
        );

        if !newly_offline.is_empty() {
            let _ = self.event_tx.send(MonitorEvent::HostsOffline {
                names: newly_offline,
            });
        }
        let _ = self.event_tx.send(MonitorEvent::ScanFinished {
            report: report.clone(),
        });

        report
    }

    /// Decide which status update, if any, one probe result causes
    fn evaluate(&mut self, host: &Host, reachable: bool, now: DateTime<Utc>) -> Option<StatusUpdate> {
        let first_failure = if reachable {
            self.failures.remove(host.id.as_str());
            now
        } else {
            *self.failures.entry(host.id.clone()).or_insert(now)
        };

        let failing_for = (now - first_failure).to_std().unwrap_or_default();
        let evaluation = ReachabilityEvaluation::evaluate(
            host.status,
            reachable,
            failing_for,
            self.settings.offline_grace,
        );

        trace!(
            "{} ({}): {evaluation:?}, failing for {failing_for:?}",
            host.display_name, host.address
        );

        if evaluation == ReachabilityEvaluation::StillOnline {
            let stale = host
                .last_seen
                .is_none_or(|last_seen| now - last_seen > HEARTBEAT_INTERVAL);
            return stale.then(StatusUpdate::online);
        }

        match evaluation.transition()? {
            HostStatus::Offline => {
                debug!("{} went offline", host.display_name);
                Some(StatusUpdate::offline_since(first_failure))
            }
            status => Some(StatusUpdate::new(status)),
        }
    }
}

/// Handle for controlling a MonitorActor
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl MonitorHandle {
    /// Spawn a new monitor actor with no targets
    pub fn spawn(
        settings: MonitorSettings,
        repository: Arc<HostRepository>,
        probe: Arc<dyn Probe>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = MonitorActor::new(settings, repository, probe, cmd_rx, event_tx.clone());
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            event_tx,
        }
    }

    /// Listen to scan notifications
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    pub async fn set_targets(&self, targets: Vec<ProbeTarget>) -> Result<()> {
        self.sender
            .send(MonitorCommand::SetTargets { targets })
            .await
            .context("failed to send SetTargets command")?;
        Ok(())
    }

    /// Run a scan now, bypassing the interval timer
    pub async fn poll_now(&self) -> Result<ScanReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")
    }

    /// Stop the monitor, abandoning a scan in progress
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("monitor stopped without acknowledging shutdown")
    }
}

#[async_trait]
impl TargetSink for MonitorHandle {
    async fn set_targets(&self, targets: Vec<ProbeTarget>) -> Result<()> {
        MonitorHandle::set_targets(self, targets).await
    }
}
