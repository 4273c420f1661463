//! Per-status host counts

use std::collections::BTreeMap;

use serde::Serialize;

use crate::host::HostStatus;

/// Host count per status
///
/// Every status is always present (zero-filled), so two counts compare equal
/// exactly when they agree for every status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCounts(BTreeMap<HostStatus, usize>);

impl Default for StatusCounts {
    fn default() -> Self {
        Self(HostStatus::ALL.iter().map(|status| (*status, 0)).collect())
    }
}

impl StatusCounts {
    pub fn get(&self, status: HostStatus) -> usize {
        self.0.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn increment(&mut self, status: HostStatus) {
        *self.0.entry(status).or_insert(0) += 1;
    }

    /// Decrement without underflow; returns `false` if the counter was already zero
    pub fn decrement(&mut self, status: HostStatus) -> bool {
        let count = self.0.entry(status).or_insert(0);
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (HostStatus, usize)> + '_ {
        self.0.iter().map(|(status, count)| (*status, *count))
    }
}

impl FromIterator<HostStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = HostStatus>>(iter: I) -> Self {
        let mut counts = StatusCounts::default();
        for status in iter {
            counts.increment(status);
        }
        counts
    }
}
