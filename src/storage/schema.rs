//! On-disk snapshot format
//!
//! ```json
//! { "version": 1, "saved_at": "2024-05-01T12:00:00Z", "hosts": [ ... ] }
//! ```
//!
//! Older files stored a bare JSON array of hosts. Those are still accepted on
//! load and rewritten in the versioned format on the next flush.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{PersistenceError, PersistenceResult};
use crate::host::Host;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// A full snapshot of all hosts as written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub hosts: Vec<Host>,
}

/// Every format a snapshot file may be in
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotDocument {
    Versioned(SnapshotFile),
    Legacy(Vec<Host>),
}

/// Serialize a snapshot of `hosts`
pub fn encode(hosts: &[Host]) -> PersistenceResult<Vec<u8>> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        version: u32,
        saved_at: DateTime<Utc>,
        hosts: &'a [Host],
    }

    let document = Borrowed {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now(),
        hosts,
    };
    Ok(serde_json::to_vec_pretty(&document)?)
}

/// Parse a snapshot file in any supported format
pub fn decode(bytes: &[u8]) -> PersistenceResult<Vec<Host>> {
    match serde_json::from_slice(bytes)? {
        SnapshotDocument::Versioned(file) if file.version > SNAPSHOT_VERSION => {
            Err(PersistenceError::UnsupportedVersion(file.version))
        }
        SnapshotDocument::Versioned(file) => Ok(file.hosts),
        SnapshotDocument::Legacy(hosts) => Ok(hosts),
    }
}
