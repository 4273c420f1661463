//! ProbeListActor - Keeps the monitor's target list in sync
//!
//! The actor maintains its own id to address map from events, so it never
//! queries the repository. Only membership and address changes matter;
//! status events are ignored. Bursts of changes (a bulk import adds hundreds
//! of hosts one event at a time) are collapsed into one push by a short
//! coalescing window.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument, trace, warn};

use super::messages::{ProbeListCommand, ProbeTarget};
use crate::channel::{EventReceiver, dispatch};
use crate::coalesce::CoalescingWindow;
use crate::events::ChangeEvent;
use crate::host::{Host, HostId};
use crate::repository::HostRepository;

/// Receiver of the full probe target list
#[async_trait]
pub trait TargetSink: Send + Sync {
    async fn set_targets(&self, targets: Vec<ProbeTarget>) -> Result<()>;
}

/// Current probe targets, keyed by host id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList {
    targets: BTreeMap<HostId, String>,
}

impl TargetList {
    pub fn from_hosts<'a>(hosts: impl IntoIterator<Item = &'a Host>) -> Self {
        Self {
            targets: hosts
                .into_iter()
                .map(|host| (host.id.clone(), host.address.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Fold one event into the list; returns whether the list changed
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match event {
            ChangeEvent::Added { host } => {
                self.targets.insert(host.id.clone(), host.address.clone());
                true
            }

            ChangeEvent::Deleted { id, .. } => self.targets.remove(id.as_str()).is_some(),

            ChangeEvent::Updated { id, before, after } => {
                if before.address == after.address {
                    return false;
                }
                self.targets.insert(id.clone(), after.address.clone());
                true
            }

            ChangeEvent::BatchLoaded { hosts } => {
                *self = Self::from_hosts(hosts);
                true
            }

            ChangeEvent::StatusChanged(_) | ChangeEvent::BatchStatusChanged { .. } => false,
        }
    }

    pub fn targets(&self) -> Vec<ProbeTarget> {
        self.targets
            .iter()
            .map(|(id, address)| ProbeTarget {
                id: id.clone(),
                address: address.clone(),
            })
            .collect()
    }
}

pub struct ProbeListActor {
    events: EventReceiver,
    command_rx: mpsc::Receiver<ProbeListCommand>,
    list: TargetList,
    sink: Arc<dyn TargetSink>,
    window: CoalescingWindow,
}

impl ProbeListActor {
    pub fn new(
        events: EventReceiver,
        command_rx: mpsc::Receiver<ProbeListCommand>,
        list: TargetList,
        sink: Arc<dyn TargetSink>,
        window: Duration,
    ) -> Self {
        Self {
            events,
            command_rx,
            list,
            sink,
            window: CoalescingWindow::new(window),
        }
    }

    #[instrument(skip(self), name = "probe_list")]
    pub async fn run(mut self) {
        debug!("starting probe list actor ({} targets)", self.list.len());

        if !self.list.is_empty() {
            self.window.touch();
        }

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
                    self.push().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ProbeListCommand::FlushNow { respond_to } => {
                            for event in self.events.drain() {
                                self.handle_event(&event);
                            }
                            if self.window.is_armed() {
                                self.push().await;
                            }
                            let _ = respond_to.send(());
                        }
                        ProbeListCommand::GetTargets { respond_to } => {
                            let _ = respond_to.send(self.list.targets());
                        }
                        ProbeListCommand::Shutdown => {
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

        debug!("probe list actor stopped");
    }

    fn handle_event(&mut self, event: &ChangeEvent) {
        let list = &mut self.list;
        let mut changed = false;

        dispatch(self.events.name(), event, |event| {
            changed = list.apply(event);
            Ok(())
        });

        if changed {
            trace!("target list changed by {} event", event.kind());
            self.window.touch();
        }
    }

    async fn push(&mut self) {
        self.window.clear();
        let targets = self.list.targets();
        let count = targets.len();

        match self.sink.set_targets(targets).await {
            Ok(()) => debug!("pushed {count} probe targets"),
            Err(e) => {
                error!("failed to push probe targets, retrying: {:#}", e);
                self.window.touch();
            }
        }
    }
}

/// Handle for controlling a ProbeListActor
#[derive(Clone)]
pub struct ProbeListHandle {
    sender: mpsc::Sender<ProbeListCommand>,
}

impl ProbeListHandle {
    /// Spawn the actor, seeded with the repository's current hosts
    pub fn spawn(repository: &HostRepository, sink: Arc<dyn TargetSink>, window: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (hosts, events) = repository.subscribe_with_snapshot("probe_list");

        let actor = ProbeListActor::new(events, cmd_rx, TargetList::from_hosts(&hosts), sink, window);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Apply queued events and push the list now if it changed
    pub async fn flush_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProbeListCommand::FlushNow { respond_to: tx })
            .await
            .context("failed to send FlushNow command")?;

        rx.await.context("failed to receive response")?;
        Ok(())
    }

    pub async fn targets(&self) -> Result<Vec<ProbeTarget>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProbeListCommand::GetTargets { respond_to: tx })
            .await
            .context("failed to send GetTargets command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ProbeListCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
