//! ViewSyncActor - Keeps a host table view in sync with the repository
//!
//! ## Reaction Table
//!
//! | Event                | Pending work                       |
//! |----------------------|------------------------------------|
//! | Added                | full reload (row count changed)    |
//! | Updated              | redraw that row                    |
//! | StatusChanged        | redraw the status cell of that row |
//! | BatchStatusChanged   | redraw the status cells, one pass  |
//! | Deleted              | full reload                        |
//! | BatchLoaded          | full reload                        |
//!
//! Pending work accumulates in a [`RedrawBuffer`] and is flushed to the
//! [`ViewSink`] once the coalescing window expires. A reload supersedes every
//! row and cell redraw; a row redraw supersedes a cell redraw for that row.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, trace, warn};

use super::messages::ViewCommand;
use crate::channel::{EventReceiver, dispatch};
use crate::coalesce::CoalescingWindow;
use crate::events::{ChangeEvent, StatusChange};
use crate::host::{Host, HostId, HostStatus, StatusSnapshot};
use crate::repository::HostRepository;
use crate::util::format_offline_duration;

/// Redrawn status column of one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCell {
    pub id: HostId,
    pub status: HostStatus,
    pub offline_since: Option<DateTime<Utc>>,

    /// Human readable outage length, only while offline
    pub offline_for: Option<String>,
}

impl StatusCell {
    fn new(id: HostId, snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: snapshot.status,
            offline_since: snapshot.offline_since,
            offline_for: snapshot
                .offline_since
                .map(|since| format_offline_duration(now - since)),
        }
    }
}

/// Rendering side of the host table
///
/// Knows nothing about events; only receives finished redraw batches.
pub trait ViewSink: Send + 'static {
    /// Replace every row
    fn reload(&mut self, hosts: &[Host]);

    /// Redraw whole rows
    fn redraw_rows(&mut self, rows: &[Host]);

    /// Redraw only the status column of some rows
    fn redraw_status_cells(&mut self, cells: &[StatusCell]);
}

impl<S: ViewSink + ?Sized> ViewSink for Box<S> {
    fn reload(&mut self, hosts: &[Host]) {
        (**self).reload(hosts)
    }

    fn redraw_rows(&mut self, rows: &[Host]) {
        (**self).redraw_rows(rows)
    }

    fn redraw_status_cells(&mut self, cells: &[StatusCell]) {
        (**self).redraw_status_cells(cells)
    }
}

/// Work produced by flushing a [`RedrawBuffer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redraw {
    Nothing,
    Reload,
    Partial {
        rows: Vec<Host>,
        cells: Vec<(HostId, StatusSnapshot)>,
    },
}

/// Redraw work accumulated between flushes, keyed by row id
#[derive(Debug, Default)]
pub struct RedrawBuffer {
    reload: bool,
    rows: BTreeMap<HostId, Host>,
    cells: BTreeMap<HostId, StatusSnapshot>,
}

impl RedrawBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !self.reload && self.rows.is_empty() && self.cells.is_empty()
    }

    pub fn reload_pending(&self) -> bool {
        self.reload
    }

    pub fn pending_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn pending_cells(&self) -> usize {
        self.cells.len()
    }

    /// Queue the work for one event
    pub fn apply(&mut self, event: &ChangeEvent) {
        match event {
            ChangeEvent::Added { .. }
            | ChangeEvent::Deleted { .. }
            | ChangeEvent::BatchLoaded { .. } => self.request_reload(),

            ChangeEvent::Updated { id, after, .. } => self.queue_row(id, after),

            ChangeEvent::StatusChanged(change) => self.queue_cell(change),

            ChangeEvent::BatchStatusChanged { changes } => {
                for change in changes {
                    self.queue_cell(change);
                }
            }
        }
    }

    fn request_reload(&mut self) {
        self.reload = true;
        self.rows.clear();
        self.cells.clear();
    }

    fn queue_row(&mut self, id: &HostId, host: &Host) {
        if self.reload {
            return;
        }
        self.cells.remove(id.as_str());
        self.rows.insert(id.clone(), host.clone());
    }

    fn queue_cell(&mut self, change: &StatusChange) {
        if self.reload {
            return;
        }
        if let Some(row) = self.rows.get_mut(change.id.as_str()) {
            // the pending row redraw shows the newest status as well
            row.set_status_snapshot(&change.after);
            return;
        }
        self.cells.insert(change.id.clone(), change.after);
    }

    /// Take all pending work, leaving the buffer empty
    pub fn take(&mut self) -> Redraw {
        if std::mem::take(&mut self.reload) {
            return Redraw::Reload;
        }
        if self.rows.is_empty() && self.cells.is_empty() {
            return Redraw::Nothing;
        }

        Redraw::Partial {
            rows: std::mem::take(&mut self.rows).into_values().collect(),
            cells: std::mem::take(&mut self.cells).into_iter().collect(),
        }
    }
}

/// Actor that turns change events into coalesced view redraws
pub struct ViewSyncActor<S: ViewSink> {
    repository: Arc<HostRepository>,
    events: EventReceiver,
    command_rx: mpsc::Receiver<ViewCommand>,
    sink: S,
    buffer: RedrawBuffer,
    window: CoalescingWindow,
}

impl<S: ViewSink> ViewSyncActor<S> {
    pub fn new(
        repository: Arc<HostRepository>,
        events: EventReceiver,
        command_rx: mpsc::Receiver<ViewCommand>,
        sink: S,
        window: Duration,
    ) -> Self {
        Self {
            repository,
            events,
            command_rx,
            sink,
            buffer: RedrawBuffer::new(),
            window: CoalescingWindow::new(window),
        }
    }

    #[instrument(skip(self), name = "view_sync")]
    pub async fn run(mut self) {
        debug!("starting view sync actor");

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
                    self.flush();
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ViewCommand::FlushNow { respond_to } => {
                            self.drain_events();
                            self.flush();
                            let _ = respond_to.send(());
                        }
                        ViewCommand::Shutdown => {
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

        debug!("view sync actor stopped");
    }

    fn handle_event(&mut self, event: &ChangeEvent) {
        let buffer = &mut self.buffer;
        let queued = dispatch(self.events.name(), event, |event| {
            buffer.apply(event);
            Ok(())
        });

        if queued && !self.buffer.is_empty() {
            self.window.touch();
        }
    }

    fn drain_events(&mut self) {
        for event in self.events.drain() {
            self.handle_event(&event);
        }
    }

    fn flush(&mut self) {
        self.window.clear();

        match self.buffer.take() {
            Redraw::Nothing => {}
            Redraw::Reload => {
                let mut hosts = self.repository.get_all();
                hosts.sort_by(|a, b| {
                    (a.group.as_str(), a.display_name.as_str())
                        .cmp(&(b.group.as_str(), b.display_name.as_str()))
                });
                trace!("reloading view with {} rows", hosts.len());
                self.sink.reload(&hosts);
            }
            Redraw::Partial { rows, cells } => {
                if !rows.is_empty() {
                    trace!("redrawing {} rows", rows.len());
                    self.sink.redraw_rows(&rows);
                }
                if !cells.is_empty() {
                    let now = Utc::now();
                    let cells: Vec<StatusCell> = cells
                        .into_iter()
                        .map(|(id, snapshot)| StatusCell::new(id, &snapshot, now))
                        .collect();
                    trace!("redrawing {} status cells", cells.len());
                    self.sink.redraw_status_cells(&cells);
                }
            }
        }
    }
}

/// Handle for controlling a ViewSyncActor
#[derive(Clone)]
pub struct ViewSyncHandle {
    sender: mpsc::Sender<ViewCommand>,
}

impl ViewSyncHandle {
    /// Subscribe to the repository and spawn the actor
    pub fn spawn<S: ViewSink>(repository: Arc<HostRepository>, sink: S, window: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let events = repository.channel().subscribe("view_sync");

        let actor = ViewSyncActor::new(repository, events, cmd_rx, sink, window);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Apply queued events and redraw right away
    pub async fn flush_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ViewCommand::FlushNow { respond_to: tx })
            .await
            .context("failed to send FlushNow command")?;

        rx.await.context("failed to receive response")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ViewCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

/// View sink that only logs what would be redrawn
#[derive(Debug, Default)]
pub struct TracingViewSink;

impl ViewSink for TracingViewSink {
    fn reload(&mut self, hosts: &[Host]) {
        info!("host table reloaded ({} hosts)", hosts.len());
    }

    fn redraw_rows(&mut self, rows: &[Host]) {
        for host in rows {
            debug!(
                "row {} ({}) {} [{}]",
                host.display_name, host.address, host.status, host.group
            );
        }
    }

    fn redraw_status_cells(&mut self, cells: &[StatusCell]) {
        for cell in cells {
            match &cell.offline_for {
                Some(offline_for) => debug!("{} is {} for {offline_for}", cell.id, cell.status),
                None => debug!("{} is {}", cell.id, cell.status),
            }
        }
    }
}
