//! Host entity and validation
//!
//! A [`Host`] is a plain value record. The repository owns the canonical copy;
//! everything handed out to consumers is a snapshot.
//!
//! ## Status invariant
//!
//! `offline_since` is set if and only if `status == Offline`. Commands run
//! [`Host::normalize_status`] or [`Host::apply_status`] so records stored in
//! the repository always satisfy it.

use std::fmt;
use std::net::IpAddr;
use std::ops::Deref;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a hostname (RFC 1035)
const MAX_ADDRESS_LEN: usize = 253;

/// Maximum length of a single hostname label
const MAX_LABEL_LEN: usize = 63;

const MAX_DISPLAY_NAME_LEN: usize = 100;

const MAX_GROUP_LEN: usize = 50;

/// Group assigned to hosts that were created without one
pub const DEFAULT_GROUP: &str = "Ungrouped";

static LABEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?$")
        .expect("valid hostname label pattern")
});

/// Stable unique key of a host
///
/// Assigned once at creation (UUID v4 when generated) and never changed.
/// An empty id means "not assigned yet"; the repository fills it in on `add`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unassigned(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Deref for HostId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for HostId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for HostId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Last known reachability of a host
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostStatus {
    /// Never probed (or probed but still inside the offline grace period)
    #[default]
    Unknown,
    Online,
    Offline,
}

impl HostStatus {
    pub const ALL: [HostStatus; 3] = [HostStatus::Unknown, HostStatus::Online, HostStatus::Offline];

    pub fn title(&self) -> &'static str {
        match self {
            HostStatus::Unknown => "Unknown",
            HostStatus::Online => "Online",
            HostStatus::Offline => "Offline",
        }
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Reasons a host record is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("address must not be empty")]
    EmptyAddress,

    #[error("'{0}' is neither an IP address nor a valid hostname")]
    InvalidAddress(String),

    #[error("display name must not be empty")]
    EmptyDisplayName,

    #[error("display name is too long ({len} > {MAX_DISPLAY_NAME_LEN} characters)")]
    DisplayNameTooLong { len: usize },

    #[error("group name is too long ({len} > {MAX_GROUP_LEN} characters)")]
    GroupTooLong { len: usize },
}

/// One monitored network endpoint and its last known state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    #[serde(default)]
    pub id: HostId,

    /// IP address or hostname that gets probed
    pub address: String,

    pub display_name: String,

    #[serde(default = "default_group")]
    pub group: String,

    #[serde(default)]
    pub status: HostStatus,

    /// When the current outage started (only while `status == Offline`)
    #[serde(default)]
    pub offline_since: Option<DateTime<Utc>>,

    /// Total seconds spent offline across finished outages
    #[serde(default)]
    pub cumulative_offline_secs: u64,

    /// Last successful probe
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,

    /// Raise a notification when this host goes offline
    #[serde(default = "default_notifications")]
    pub notifications_enabled: bool,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_notifications() -> bool {
    true
}

/// Status-only part of a host record, as carried by status events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: HostStatus,
    pub offline_since: Option<DateTime<Utc>>,
    pub cumulative_offline_secs: u64,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Narrow status mutation requested by `update_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: HostStatus,

    /// Explicit outage start; defaults to the existing one or "now"
    pub offline_since: Option<DateTime<Utc>>,

    /// Explicit cumulative offline total; defaults to accumulating finished outages
    pub cumulative_offline_secs: Option<u64>,
}

impl StatusUpdate {
    pub fn new(status: HostStatus) -> Self {
        Self {
            status,
            offline_since: None,
            cumulative_offline_secs: None,
        }
    }

    pub fn online() -> Self {
        Self::new(HostStatus::Online)
    }

    pub fn offline_since(since: DateTime<Utc>) -> Self {
        Self {
            status: HostStatus::Offline,
            offline_since: Some(since),
            cumulative_offline_secs: None,
        }
    }

    pub fn with_cumulative_offline(mut self, secs: u64) -> Self {
        self.cumulative_offline_secs = Some(secs);
        self
    }
}

impl Host {
    /// Create a host with a freshly generated id
    pub fn new(address: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: HostId::generate(),
            address: address.into(),
            display_name: display_name.into(),
            group: default_group(),
            status: HostStatus::Unknown,
            offline_since: None,
            cumulative_offline_secs: 0,
            last_seen: None,
            notifications_enabled: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<HostId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_status(mut self, status: HostStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_address(&self.address)?;

        let name = self.display_name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyDisplayName);
        }
        let len = name.chars().count();
        if len > MAX_DISPLAY_NAME_LEN {
            return Err(ValidationError::DisplayNameTooLong { len });
        }

        let len = self.group.chars().count();
        if len > MAX_GROUP_LEN {
            return Err(ValidationError::GroupTooLong { len });
        }

        Ok(())
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status,
            offline_since: self.offline_since,
            cumulative_offline_secs: self.cumulative_offline_secs,
            last_seen: self.last_seen,
        }
    }

    /// Overwrite the status fields from a snapshot
    pub fn set_status_snapshot(&mut self, snapshot: &StatusSnapshot) {
        self.status = snapshot.status;
        self.offline_since = snapshot.offline_since;
        self.cumulative_offline_secs = snapshot.cumulative_offline_secs;
        self.last_seen = snapshot.last_seen;
    }

    /// Bring `offline_since` in line with `status`
    pub fn normalize_status(&mut self, now: DateTime<Utc>) {
        match self.status {
            HostStatus::Offline => {
                self.offline_since.get_or_insert(now);
            }
            _ => self.offline_since = None,
        }
    }

    /// Apply a status-only mutation in place
    pub fn apply_status(&mut self, update: &StatusUpdate, now: DateTime<Utc>) {
        match update.status {
            HostStatus::Offline => {
                self.offline_since = update.offline_since.or(self.offline_since).or(Some(now));
            }
            _ => {
                if let Some(since) = self.offline_since.take() {
                    let outage = (now - since).num_seconds().max(0) as u64;
                    self.cumulative_offline_secs =
                        self.cumulative_offline_secs.saturating_add(outage);
                }
            }
        }

        if let Some(total) = update.cumulative_offline_secs {
            self.cumulative_offline_secs = total;
        }

        if update.status == HostStatus::Online {
            self.last_seen = Some(now);
        }

        self.status = update.status;
    }
}

/// Check that `address` is an IP literal or an RFC 1035 hostname
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    let address = address.trim();

    if address.is_empty() {
        return Err(ValidationError::EmptyAddress);
    }

    if address.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let invalid = || ValidationError::InvalidAddress(address.to_string());

    if address.len() > MAX_ADDRESS_LEN {
        return Err(invalid());
    }

    let labels: Vec<&str> = address.split('.').collect();

    // all-numeric dotted names are malformed IPv4 addresses, not hostnames
    if labels.iter().all(|label| label.chars().all(|c| c.is_ascii_digit())) {
        return Err(invalid());
    }

    let labels_ok = labels
        .iter()
        .all(|label| label.len() <= MAX_LABEL_LEN && LABEL_PATTERN.is_match(label));

    if labels_ok { Ok(()) } else { Err(invalid()) }
}
