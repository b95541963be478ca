//! Storage abstractions: the event log, snapshots and projection cursors.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::envelope::{EventEnvelope, NewEvent};
use crate::error::DomainError;
use crate::snapshot::Snapshot;
use crate::stream::StreamId;

/// Append-only, per-stream ordered event log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends `events` atomically after `expected_version`, assigning
    /// versions `expected_version + 1, expected_version + 2, ...`.
    ///
    /// An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the stream head is not
    /// `expected_version`, or `DomainError::StorageUnavailable` if the
    /// substrate fails. Nothing is persisted on error.
    async fn append(
        &self,
        stream: &StreamId,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> Result<Vec<EventEnvelope>, DomainError>;

    /// Loads envelopes with `version > from_version` in ascending order. An
    /// unknown stream yields an empty vec.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the substrate fails.
    async fn load(
        &self,
        stream: &StreamId,
        from_version: i64,
    ) -> Result<Vec<EventEnvelope>, DomainError>;

    /// Current head version of `stream`, 0 if it has no events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the substrate fails.
    async fn stream_version(&self, stream: &StreamId) -> Result<i64, DomainError>;

    /// Head version of every non-empty stream of the given aggregate types.
    /// An empty slice means every type.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the substrate fails.
    async fn stream_heads(
        &self,
        aggregate_types: &[&str],
    ) -> Result<Vec<(StreamId, i64)>, DomainError>;

    /// Subscribes to best-effort notifications of committed appends. Missed
    /// notifications must be recovered by polling `stream_heads`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the listener cannot be set
    /// up.
    async fn subscribe(&self) -> Result<mpsc::Receiver<StreamId>, DomainError>;
}

/// Latest-snapshot-per-stream cache.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Upserts the snapshot for its stream. A snapshot never replaces one at
    /// a higher version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the substrate fails.
    async fn save(&self, snapshot: Snapshot) -> Result<(), DomainError>;

    /// Returns the highest-version snapshot for `stream`, if any.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the substrate fails.
    async fn load_latest(&self, stream: &StreamId) -> Result<Option<Snapshot>, DomainError>;

    /// Drops the snapshot for `stream`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the substrate fails.
    async fn delete(&self, stream: &StreamId) -> Result<(), DomainError>;
}

/// Durable per-projector, per-stream progress pointers.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last processed version of `stream` for `projector`, 0 if none.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the substrate fails.
    async fn load(&self, projector: &str, stream: &StreamId) -> Result<i64, DomainError>;

    /// Advances the cursor. Never moves it backwards.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the substrate fails.
    async fn save(&self, projector: &str, stream: &StreamId, version: i64)
    -> Result<(), DomainError>;

    /// Every cursor recorded for `projector`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the substrate fails.
    async fn load_all(&self, projector: &str) -> Result<HashMap<StreamId, i64>, DomainError>;

    /// Removes every cursor for `projector`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the substrate fails.
    async fn reset(&self, projector: &str) -> Result<(), DomainError>;
}
