//! Serialized store snapshot.
//!
//! # Invariants
//! - Only confirmed entities are written; client-local ids never persist.
//! - Transient fields (cache, error, in-flight counters, draining flag) are
//!   never part of a snapshot.
//! - Dates round-trip as RFC 3339 UTC strings.

use crate::model::record::Record;
use crate::store::mutation::PendingOperation;
use crate::store::state::StoreState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "R: Record")]
pub struct Snapshot<R: Record> {
    pub version: u32,
    #[serde(default)]
    pub entities: Vec<R>,
    #[serde(default)]
    pub queue: Vec<PendingOperation<R>>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_generated: BTreeMap<String, DateTime<Utc>>,
}

#[derive(Debug)]
pub enum SnapshotError {
    Malformed(serde_json::Error),
    UnsupportedVersion { found: u32, supported: u32 },
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed snapshot: {err}"),
            Self::UnsupportedVersion { found, supported } => write!(
                f,
                "snapshot version {found} is not supported (expected {supported})"
            ),
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            Self::UnsupportedVersion { .. } => None,
        }
    }
}

impl<R: Record> Snapshot<R> {
    /// Selects the durable fields of `state`.
    pub fn capture(state: &StoreState<R>) -> Self {
        let mut entities = state
            .entities
            .values()
            .filter(|record| !record.id().is_local())
            .cloned()
            .collect::<Vec<_>>();
        entities.sort_by(|a, b| a.id().cmp(b.id()));

        Self {
            version: SNAPSHOT_VERSION,
            entities,
            queue: state.queue.snapshot(),
            last_sync: state.last_sync,
            last_generated: state.last_generated.clone(),
        }
    }

    pub fn encode(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(SnapshotError::Malformed)
    }

    pub fn decode(text: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(text).map_err(SnapshotError::Malformed)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }
}
