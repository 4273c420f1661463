//! PersistenceActor - Writes repository snapshots to a SnapshotStore
//!
//! ## Write Strategy
//!
//! Events only mark host ids as dirty; nothing is written per event. A
//! periodic timer flushes a full snapshot of the repository if anything is
//! dirty. Because the snapshot is taken at flush time, a host deleted while a
//! flush is pending is simply absent from the written file.
//!
//! - **Success**: the dirty set is cleared
//! - **Failure**: the error is logged and counted, the dirty set is retained,
//!   and the next tick retries
//!
//! `force_flush()` drains already-published events first, so a caller that
//! just committed a change is guaranteed to see it persisted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::{FlushOutcome, PersistenceCommand, PersistenceStats};
use crate::channel::{EventReceiver, dispatch};
use crate::events::ChangeEvent;
use crate::host::HostId;
use crate::repository::HostRepository;
use crate::storage::{PersistenceError, PersistenceResult, SnapshotStore};

/// Host ids changed since the last successful flush
#[derive(Debug, Default)]
pub struct DirtySet {
    ids: HashSet<HostId>,

    /// The whole store was replaced; the next snapshot rewrites everything
    full_rewrite: bool,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every host touched by `event`; marking twice is a no-op
    pub fn mark(&mut self, event: &ChangeEvent) {
        if let ChangeEvent::BatchLoaded { .. } = event {
            self.full_rewrite = true;
        }
        self.ids.extend(event.touched_ids().into_iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && !self.full_rewrite
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn full_rewrite(&self) -> bool {
        self.full_rewrite
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.full_rewrite = false;
    }
}

pub struct PersistenceActor {
    repository: Arc<HostRepository>,
    store: Arc<dyn SnapshotStore>,
    events: EventReceiver,
    command_rx: mpsc::Receiver<PersistenceCommand>,
    dirty: DirtySet,
    flush_interval: Duration,
    stats: PersistenceStats,
}

impl PersistenceActor {
    pub fn new(
        repository: Arc<HostRepository>,
        store: Arc<dyn SnapshotStore>,
        events: EventReceiver,
        command_rx: mpsc::Receiver<PersistenceCommand>,
        flush_interval: Duration,
    ) -> Self {
        debug!("creating persistence actor for {}", store.describe());

        Self {
            repository,
            store,
            events,
            command_rx,
            dirty: DirtySet::new(),
            flush_interval,
            stats: PersistenceStats::default(),
        }
    }

    #[instrument(skip(self), name = "persistence")]
    pub async fn run(mut self) {
        debug!(
            "starting persistence actor (flush every {:?})",
            self.flush_interval
        );

        let mut ticker = time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shutdown_reply = None;

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

                _ = ticker.tick() => {
                    self.drain_events();
                    if !self.dirty.is_empty() {
                        trace!("time-based flush triggered ({} dirty)", self.dirty.len());
                        // failures are logged inside and retried on the next tick
                        let _ = self.flush().await;
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PersistenceCommand::ForceFlush { respond_to } => {
                            debug!("forced flush requested");
                            self.drain_events();
                            let result = self.flush().await;
                            let _ = respond_to.send(result);
                        }

                        PersistenceCommand::GetStats { respond_to } => {
                            self.drain_events();
                            let mut stats = self.stats.clone();
                            stats.dirty_count = self.dirty.len();
                            let _ = respond_to.send(stats);
                        }

                        PersistenceCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            shutdown_reply = Some(respond_to);
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

        // Final flush before shutdown
        self.drain_events();
        let result = self.flush().await;
        if let Some(respond_to) = shutdown_reply {
            let _ = respond_to.send(result);
        }

        debug!("persistence actor stopped");
    }

    fn handle_event(&mut self, event: &ChangeEvent) {
        let dirty = &mut self.dirty;
        dispatch(self.events.name(), event, |event| {
            dirty.mark(event);
            Ok(())
        });
    }

    fn drain_events(&mut self) {
        for event in self.events.drain() {
            self.handle_event(&event);
        }
    }

    /// Write a snapshot if anything is dirty
    async fn flush(&mut self) -> PersistenceResult<FlushOutcome> {
        if self.dirty.is_empty() {
            trace!("nothing dirty, skipping flush");
            return Ok(FlushOutcome::Clean);
        }

        let dirty = self.dirty.len();
        let hosts = self.repository.get_all();

        match self.store.save(&hosts).await {
            Ok(()) => {
                self.dirty.clear();
                self.stats.flush_count += 1;
                self.stats.last_flush = Some(Utc::now());
                info!(
                    "flush #{} complete ({} hosts, {} dirty)",
                    self.stats.flush_count,
                    hosts.len(),
                    dirty
                );
                Ok(FlushOutcome::Written {
                    hosts: hosts.len(),
                    dirty,
                })
            }
            Err(e) => {
                self.stats.failed_flushes += 1;
                error!(
                    "failed to flush snapshot to {}: {} ({} dirty ids kept for retry)",
                    self.store.describe(),
                    e,
                    dirty
                );
                Err(e)
            }
        }
    }
}

/// Handle for controlling a PersistenceActor
#[derive(Clone)]
pub struct PersistenceHandle {
    sender: mpsc::Sender<PersistenceCommand>,
    force_flush_timeout: Duration,
}

impl PersistenceHandle {
    /// Subscribe to the repository and spawn the actor
    pub fn spawn(
        repository: Arc<HostRepository>,
        store: Arc<dyn SnapshotStore>,
        flush_interval: Duration,
        force_flush_timeout: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let events = repository.channel().subscribe("persistence");

        let actor = PersistenceActor::new(repository, store, events, cmd_rx, flush_interval);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            force_flush_timeout,
        }
    }

    /// Persist everything committed so far
    ///
    /// Fails with [`PersistenceError::Timeout`] if the write does not finish in
    /// time; the actor keeps running and retries on its next tick.
    pub async fn force_flush(&self) -> PersistenceResult<FlushOutcome> {
        let (tx, rx) = oneshot::channel();
        self.request(PersistenceCommand::ForceFlush { respond_to: tx }, rx)
            .await
    }

    pub async fn stats(&self) -> PersistenceResult<PersistenceStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PersistenceCommand::GetStats { respond_to: tx })
            .await
            .map_err(|_| PersistenceError::ActorGone)?;

        rx.await.map_err(|_| PersistenceError::ActorGone)
    }

    /// Flush a final time and stop the actor
    pub async fn shutdown(&self) -> PersistenceResult<FlushOutcome> {
        let (tx, rx) = oneshot::channel();
        self.request(PersistenceCommand::Shutdown { respond_to: tx }, rx)
            .await
    }

    async fn request(
        &self,
        command: PersistenceCommand,
        rx: oneshot::Receiver<PersistenceResult<FlushOutcome>>,
    ) -> PersistenceResult<FlushOutcome> {
        // a busy actor can leave the command queue full, so the send counts
        // against the deadline as well
        let exchange = async {
            self.sender
                .send(command)
                .await
                .map_err(|_| PersistenceError::ActorGone)?;
            rx.await.map_err(|_| PersistenceError::ActorGone)?
        };

        time::timeout(self.force_flush_timeout, exchange)
            .await
            .unwrap_or(Err(PersistenceError::Timeout(self.force_flush_timeout)))
    }
}
