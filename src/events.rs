//! Change events emitted by the host repository
//!
//! Every event carries before/after snapshots, so consumers can compute what
//! changed without querying the repository again.

use crate::host::{Host, HostId, HostStatus, StatusSnapshot};

/// Status fields of one host before and after a status command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: HostId,
    pub before: StatusSnapshot,
    pub after: StatusSnapshot,
}

impl StatusChange {
    /// Whether the status value itself changed (not just timestamps)
    pub fn is_transition(&self) -> bool {
        self.before.status != self.after.status
    }

    pub fn transition(&self) -> StatusTransition<'_> {
        StatusTransition {
            id: &self.id,
            before: self.before.status,
            after: self.after.status,
        }
    }
}

/// A status transition derived from any event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition<'a> {
    pub id: &'a HostId,
    pub before: HostStatus,
    pub after: HostStatus,
}

/// What happened inside the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A host was inserted
    Added { host: Host },

    /// A host was replaced as a whole
    ///
    /// If the status differs between `before` and `after`, the same event also
    /// describes a status transition (see [`ChangeEvent::status_transitions`]).
    Updated { id: HostId, before: Host, after: Host },

    /// A host was removed; `before` is its last known state
    Deleted { id: HostId, before: Host },

    /// Status fields of a single host were changed
    StatusChanged(StatusChange),

    /// The whole store was replaced
    BatchLoaded { hosts: Vec<Host> },

    /// Status fields of many hosts were changed in one critical section
    BatchStatusChanged { changes: Vec<StatusChange> },
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Added { .. } => "added",
            ChangeEvent::Updated { .. } => "updated",
            ChangeEvent::Deleted { .. } => "deleted",
            ChangeEvent::StatusChanged(_) => "status_changed",
            ChangeEvent::BatchLoaded { .. } => "batch_loaded",
            ChangeEvent::BatchStatusChanged { .. } => "batch_status_changed",
        }
    }

    /// Ids of every host this event touches
    pub fn touched_ids(&self) -> Vec<&HostId> {
        match self {
            ChangeEvent::Added { host } => vec![&host.id],
            ChangeEvent::Updated { id, .. } | ChangeEvent::Deleted { id, .. } => vec![id],
            ChangeEvent::StatusChanged(change) => vec![&change.id],
            ChangeEvent::BatchLoaded { hosts } => hosts.iter().map(|host| &host.id).collect(),
            ChangeEvent::BatchStatusChanged { changes } => {
                changes.iter().map(|change| &change.id).collect()
            }
        }
    }

    /// Status transitions contained in this event
    ///
    /// Covers status events as well as full updates whose status differs.
    /// Entries whose status value did not change are left out.
    pub fn status_transitions(&self) -> Vec<StatusTransition<'_>> {
        match self {
            ChangeEvent::Updated { id, before, after } if before.status != after.status => {
                vec![StatusTransition {
                    id,
                    before: before.status,
                    after: after.status,
                }]
            }
            ChangeEvent::StatusChanged(change) if change.is_transition() => {
                vec![change.transition()]
            }
            ChangeEvent::BatchStatusChanged { changes } => changes
                .iter()
                .filter(|change| change.is_transition())
                .map(StatusChange::transition)
                .collect(),
            _ => Vec::new(),
        }
    }
}
