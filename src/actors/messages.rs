//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Events**: `MonitorEvent`s are broadcast to any number of listeners
//! 3. **Snapshots**: derived state is published through `watch` channels

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::host::HostId;
use crate::stats::StatusCounts;
use crate::storage::PersistenceResult;

/// Commands that can be sent to the ViewSyncActor
#[derive(Debug)]
pub enum ViewCommand {
    /// Apply all queued events and flush pending redraws right away
    FlushNow { respond_to: oneshot::Sender<()> },

    Shutdown,
}

/// Commands that can be sent to the AggregateActor
#[derive(Debug)]
pub enum AggregateCommand {
    /// Apply all queued events and return the resulting counters
    GetCounters {
        respond_to: oneshot::Sender<AggregateSnapshot>,
    },

    Shutdown,
}

/// Dashboard counters maintained by the aggregate consumer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateSnapshot {
    pub by_status: StatusCounts,

    /// Hosts per group; groups without hosts are absent
    pub by_group: BTreeMap<String, usize>,
}

impl AggregateSnapshot {
    pub fn total(&self) -> usize {
        self.by_status.total()
    }
}

/// Commands that can be sent to the PersistenceActor
#[derive(Debug)]
pub enum PersistenceCommand {
    /// Apply all queued events, then flush if anything is dirty
    ForceFlush {
        respond_to: oneshot::Sender<PersistenceResult<FlushOutcome>>,
    },

    GetStats {
        respond_to: oneshot::Sender<PersistenceStats>,
    },

    /// Flush a final time, reply, and stop
    Shutdown {
        respond_to: oneshot::Sender<PersistenceResult<FlushOutcome>>,
    },
}

/// What a flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was dirty, no write happened
    Clean,

    /// A snapshot was written
    Written {
        /// Hosts in the written snapshot
        hosts: usize,

        /// Dirty ids that triggered the write
        dirty: usize,
    },
}

/// Persistence statistics
#[derive(Debug, Clone, Default)]
pub struct PersistenceStats {
    /// Ids changed since the last successful flush
    pub dirty_count: usize,

    /// Successful writes
    pub flush_count: u64,

    /// Failed writes
    pub failed_flushes: u64,

    pub last_flush: Option<DateTime<Utc>>,
}

/// Commands that can be sent to the ProbeListActor
#[derive(Debug)]
pub enum ProbeListCommand {
    /// Apply all queued events and push the target list if it changed
    FlushNow { respond_to: oneshot::Sender<()> },

    GetTargets {
        respond_to: oneshot::Sender<Vec<ProbeTarget>>,
    },

    Shutdown,
}

/// One address the monitor should probe
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProbeTarget {
    pub id: HostId,
    pub address: String,
}

/// Commands that can be sent to the MonitorActor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Replace the probe targets
    ///
    /// A changed list restarts the probe cycle immediately, dropping the
    /// results of a scan in progress.
    SetTargets { targets: Vec<ProbeTarget> },

    /// Run a scan now, bypassing the interval timer
    ///
    /// Joins the running scan if there is one.
    PollNow {
        respond_to: oneshot::Sender<ScanReport>,
    },

    /// Stop at once, abandoning a scan in progress; acknowledged once the actor is done
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Summary of one probe cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub probed: usize,
    pub reachable: usize,
    pub unreachable: usize,

    /// Status updates the repository applied
    pub applied: usize,

    /// Targets that no longer existed in the repository
    pub skipped: usize,

    pub duration: Duration,
}

/// Notifications published by the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    ScanStarted { targets: usize },

    ScanFinished { report: ScanReport },

    /// Display names of hosts that just went offline and want notifications
    HostsOffline { names: Vec<String> },
}
