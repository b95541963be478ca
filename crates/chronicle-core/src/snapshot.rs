//! Snapshots: materialized aggregate state checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stream::StreamId;

/// Aggregate state as of `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Stream this snapshot belongs to.
    pub stream: StreamId,
    /// Last event version folded into `state`.
    pub version: i64,
    /// Serialized aggregate fields.
    pub state: serde_json::Value,
    /// When the snapshot was written.
    pub taken_at: DateTime<Utc>,
}

/// When a repository takes a snapshot after a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPolicy {
    /// Never snapshot automatically.
    #[default]
    Never,
    /// Snapshot whenever a commit crosses a multiple of this many events.
    Every(u32),
}

impl SnapshotPolicy {
    /// Whether a commit moving the stream from `from` to `to` should
    /// snapshot.
    #[must_use]
    pub fn should_snapshot(self, from: i64, to: i64) -> bool {
        match self {
            Self::Never | Self::Every(0) => false,
            Self::Every(n) => {
                let n = i64::from(n);
                to > from && to / n > from / n
            }
        }
    }
}
