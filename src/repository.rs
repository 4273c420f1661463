//! HostRepository - single source of truth for host state
//!
//! ## Locking
//!
//! The host map sits behind one `RwLock`. Queries take the read lock and copy
//! out snapshots; commands take the write lock for the in-memory mutation only.
//!
//! Events are published after the write lock is released. To keep publication
//! order equal to commit order, a command grabs the emission lock *before*
//! releasing the write lock:
//!
//! ```text
//! write lock ──mutate──► emission lock ──release write──► publish ──release emission
//! ```
//!
//! Publishing only enqueues into subscriber queues, so holding the emission lock
//! never runs consumer code, and queries are never blocked by event delivery.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, trace, warn};

use crate::channel::{EventChannel, EventReceiver};
use crate::events::{ChangeEvent, StatusChange};
use crate::host::{Host, HostId, HostStatus, StatusUpdate, ValidationError};
use crate::stats::StatusCounts;

/// Errors returned synchronously by repository commands
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("a host with id '{0}' already exists")]
    DuplicateId(HostId),

    #[error("no host with id '{0}'")]
    NotFound(HostId),

    #[error("invalid host: {0}")]
    Invalid(#[from] ValidationError),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// One entry of a bulk status command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub id: HostId,
    pub update: StatusUpdate,
}

impl StatusReport {
    pub fn new(id: impl Into<HostId>, update: StatusUpdate) -> Self {
        Self {
            id: id.into(),
            update,
        }
    }
}

/// Outcome of `bulk_update_status`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkStatusReport {
    /// Changes that were applied (and published in one batch event)
    pub applied: Vec<StatusChange>,

    /// Ids that were not present in the repository
    pub skipped: Vec<HostId>,
}

/// Outcome of `add_many`
#[derive(Debug, Clone, Default)]
pub struct BatchAddReport {
    pub added: Vec<HostId>,
    pub failed: Vec<(Host, RepositoryError)>,
}

type HostMap = HashMap<HostId, Host>;

/// Authoritative in-memory store of hosts
pub struct HostRepository {
    hosts: RwLock<HostMap>,
    emission: Mutex<()>,
    channel: Arc<EventChannel>,
}

impl HostRepository {
    /// Create an empty repository publishing into `channel`
    pub fn new(channel: Arc<EventChannel>) -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            emission: Mutex::new(()),
            channel,
        }
    }

    pub fn channel(&self) -> &Arc<EventChannel> {
        &self.channel
    }

    /// Subscribe and take a snapshot of all hosts as one atomic step
    ///
    /// Every change is either contained in the snapshot or delivered on the
    /// returned receiver, never both and never neither.
    pub fn subscribe_with_snapshot(&self, name: impl Into<String>) -> (Vec<Host>, EventReceiver) {
        // read lock first: a committer holding the emission lock has already
        // released the write lock, so this order cannot deadlock
        let hosts = self.hosts.read();
        let _emission = self.emission.lock();

        let events = self.channel.subscribe(name);
        (hosts.values().cloned().collect(), events)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get(&self, id: &str) -> Option<Host> {
        self.hosts.read().get(id).cloned()
    }

    /// Snapshot of every host
    pub fn get_all(&self) -> Vec<Host> {
        self.hosts.read().values().cloned().collect()
    }

    /// Snapshot of the requested hosts that exist
    pub fn get_many<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<Host> {
        let hosts = self.hosts.read();
        ids.into_iter()
            .filter_map(|id| hosts.get(id).cloned())
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.hosts.read().contains_key(id)
    }

    pub fn find_by_group(&self, group: &str) -> Vec<Host> {
        self.find(|host| host.group == group)
    }

    pub fn find_by_status(&self, status: HostStatus) -> Vec<Host> {
        self.find(|host| host.status == status)
    }

    fn find(&self, predicate: impl Fn(&Host) -> bool) -> Vec<Host> {
        self.hosts
            .read()
            .values()
            .filter(|host| predicate(host))
            .cloned()
            .collect()
    }

    /// Sorted distinct group labels
    pub fn groups(&self) -> Vec<String> {
        let hosts = self.hosts.read();
        let groups: BTreeSet<&str> = hosts.values().map(|host| host.group.as_str()).collect();
        groups.into_iter().map(String::from).collect()
    }

    /// Host count per status, computed by a full scan
    pub fn stats(&self) -> StatusCounts {
        self.hosts.read().values().map(|host| host.status).collect()
    }

    /// Host count per group, computed by a full scan
    pub fn group_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for host in self.hosts.read().values() {
            *counts.entry(host.group.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn count(&self) -> usize {
        self.hosts.read().len()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Insert a new host, assigning an id if it has none
    #[instrument(skip(self, host), fields(address = %host.address))]
    pub fn add(&self, mut host: Host) -> RepositoryResult<HostId> {
        host.validate()?;
        if host.id.is_unassigned() {
            host.id = HostId::generate();
        }
        host.normalize_status(Utc::now());

        self.commit(|hosts| {
            let id = insert_new(hosts, host.clone())?;
            debug!("added host {id}");
            Ok((id, vec![ChangeEvent::Added { host }]))
        })
    }

    /// Insert many hosts in one critical section
    ///
    /// Invalid and duplicate hosts are reported, the rest are inserted. Each
    /// inserted host produces its own `Added` event.
    pub fn add_many(&self, hosts: Vec<Host>) -> BatchAddReport {
        let now = Utc::now();
        let mut report = BatchAddReport::default();
        let mut candidates = Vec::with_capacity(hosts.len());

        for mut host in hosts {
            if let Err(e) = host.validate() {
                report.failed.push((host, e.into()));
                continue;
            }
            if host.id.is_unassigned() {
                host.id = HostId::generate();
            }
            host.normalize_status(now);
            candidates.push(host);
        }

        let result: RepositoryResult<()> = self.commit(|map| {
            let mut events = Vec::with_capacity(candidates.len());
            for host in candidates {
                match insert_new(map, host.clone()) {
                    Ok(id) => {
                        report.added.push(id);
                        events.push(ChangeEvent::Added { host });
                    }
                    Err(e) => report.failed.push((host, e)),
                }
            }
            Ok(((), events))
        });
        debug_assert!(result.is_ok());

        info!(
            "bulk add: {} added, {} rejected",
            report.added.len(),
            report.failed.len()
        );
        report
    }

    /// Replace an existing host as a whole
    #[instrument(skip(self, host), fields(id = %host.id))]
    pub fn update(&self, mut host: Host) -> RepositoryResult<()> {
        host.validate()?;
        host.normalize_status(Utc::now());

        self.commit(|hosts| {
            let slot = hosts
                .get_mut(host.id.as_str())
                .ok_or_else(|| RepositoryError::NotFound(host.id.clone()))?;

            let before = std::mem::replace(slot, host.clone());
            trace!("updated host {}", host.id);

            Ok((
                (),
                vec![ChangeEvent::Updated {
                    id: host.id.clone(),
                    before,
                    after: host,
                }],
            ))
        })
    }

    /// Remove a host, returning its last state
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> RepositoryResult<Host> {
        self.commit(|hosts| {
            let (id, before) = hosts
                .remove_entry(id)
                .ok_or_else(|| RepositoryError::NotFound(HostId::from(id)))?;
            debug!("deleted host {id}");

            Ok((
                before.clone(),
                vec![ChangeEvent::Deleted { id, before }],
            ))
        })
    }

    /// Change only the status fields of one host
    ///
    /// The record is mutated in place; only the small status snapshots are
    /// copied into the event.
    pub fn update_status(&self, id: &str, update: StatusUpdate) -> RepositoryResult<StatusChange> {
        let now = Utc::now();

        self.commit(|hosts| {
            let change = apply_status(hosts, id, &update, now)
                .ok_or_else(|| RepositoryError::NotFound(HostId::from(id)))?;
            trace!(
                "status of {id}: {} -> {}",
                change.before.status, change.after.status
            );

            Ok((change.clone(), vec![ChangeEvent::StatusChanged(change)]))
        })
    }

    /// Apply many status updates in one critical section
    ///
    /// Unknown ids are skipped and reported. All applied changes are published
    /// as a single `BatchStatusChanged` event; nothing is published if nothing
    /// was applied.
    pub fn bulk_update_status(&self, reports: Vec<StatusReport>) -> BulkStatusReport {
        let now = Utc::now();
        let mut skipped = Vec::new();

        let result: RepositoryResult<Vec<StatusChange>> = self.commit(|hosts| {
            let mut changes = Vec::with_capacity(reports.len());

            for report in reports {
                match apply_status(hosts, &report.id, &report.update, now) {
                    Some(change) => changes.push(change),
                    None => skipped.push(report.id),
                }
            }

            let events = if changes.is_empty() {
                Vec::new()
            } else {
                vec![ChangeEvent::BatchStatusChanged {
                    changes: changes.clone(),
                }]
            };

            Ok((changes, events))
        });

        let applied = result.unwrap_or_default();

        if !skipped.is_empty() {
            warn!(
                "bulk status update skipped {} unknown ids: {:?}",
                skipped.len(),
                skipped
            );
        }
        debug!("bulk status update applied {} changes", applied.len());

        BulkStatusReport { applied, skipped }
    }

    /// Replace the entire store
    ///
    /// Invalid hosts are skipped with a warning; a later duplicate id replaces
    /// an earlier one. Returns the number of hosts stored.
    #[instrument(skip_all, fields(count = hosts.len()))]
    pub fn load(&self, hosts: Vec<Host>) -> usize {
        let now = Utc::now();
        let mut map = HashMap::with_capacity(hosts.len());

        for mut host in hosts {
            if let Err(e) = host.validate() {
                warn!("skipping invalid host '{}' on load: {e}", host.display_name);
                continue;
            }
            if host.id.is_unassigned() {
                host.id = HostId::generate();
            }
            host.normalize_status(now);

            if let Some(previous) = map.insert(host.id.clone(), host) {
                warn!("duplicate host id '{}' on load, keeping the later record", previous.id);
            }
        }

        let loaded: Vec<Host> = map.values().cloned().collect();
        let count = loaded.len();

        let result: RepositoryResult<()> = self.commit(|hosts| {
            *hosts = map;
            Ok(((), vec![ChangeEvent::BatchLoaded { hosts: loaded }]))
        });
        debug_assert!(result.is_ok());

        info!("loaded {count} hosts");
        count
    }

    /// Run a mutation under the write lock and publish its events in commit order
    fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut HostMap) -> RepositoryResult<(T, Vec<ChangeEvent>)>,
    ) -> RepositoryResult<T> {
        let mut hosts = self.hosts.write();
        let (value, events) = mutate(&mut hosts)?;

        let _emission = self.emission.lock();
        drop(hosts);

        for event in events {
            self.channel.publish(event);
        }

        Ok(value)
    }
}

fn insert_new(hosts: &mut HostMap, host: Host) -> RepositoryResult<HostId> {
    if hosts.contains_key(host.id.as_str()) {
        return Err(RepositoryError::DuplicateId(host.id));
    }
    let id = host.id.clone();
    hosts.insert(id.clone(), host);
    Ok(id)
}

fn apply_status(
    hosts: &mut HostMap,
    id: &str,
    update: &StatusUpdate,
    now: chrono::DateTime<Utc>,
) -> Option<StatusChange> {
    let host = hosts.get_mut(id)?;
    let before = host.status_snapshot();
    host.apply_status(update, now);

    Some(StatusChange {
        id: host.id.clone(),
        before,
        after: host.status_snapshot(),
    })
}
