//! In-memory store implementations.
//!
//! Used by tests and single-process deployments. The per-store `RwLock` is
//! held only for the in-memory mutation itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, instrument};

use chronicle_core::clock::{Clock, SystemClock};
use chronicle_core::envelope::{EventEnvelope, NewEvent};
use chronicle_core::error::DomainError;
use chronicle_core::snapshot::Snapshot;
use chronicle_core::store::{CursorStore, EventStore, SnapshotStore};
use chronicle_core::stream::StreamId;

const NOTIFICATION_CAPACITY: usize = 1024;

/// Event store backed by a map of streams.
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamId, Vec<EventEnvelope>>>,
    clock: Arc<dyn Clock>,
    notifications: broadcast::Sender<StreamId>,
}

impl InMemoryEventStore {
    /// Creates an empty store stamping events with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store stamping events with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            streams: RwLock::new(HashMap::new()),
            clock,
            notifications,
        }
    }

    /// Total number of events across all streams.
    pub async fn len(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }

    /// True if no events were ever appended.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[instrument(skip(self, events), fields(%stream, count = events.len()))]
    async fn append(
        &self,
        stream: &StreamId,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let appended = {
            let mut streams = self.streams.write().await;
            let head = streams.get(stream).and_then(|log| log.last());
            let actual = head.map_or(0, |e| e.version);
            if actual != expected_version {
                return Err(DomainError::ConcurrencyConflict {
                    stream: stream.clone(),
                    expected: expected_version,
                    actual,
                });
            }

            let mut recorded_at = head.map(|e| e.recorded_at);
            let mut version = expected_version;
            let mut appended = Vec::with_capacity(events.len());
            for event in events {
                version += 1;
                let stamp = self.clock.recorded_after(recorded_at);
                recorded_at = Some(stamp);
                appended.push(EventEnvelope::from_new(stream, version, event, stamp));
            }
            streams
                .entry(stream.clone())
                .or_default()
                .extend(appended.iter().cloned());
            appended
        };

        // No receivers is fine; pollers pick the stream up from its head.
        let _ = self.notifications.send(stream.clone());
        debug!(
            version = appended.last().map_or(expected_version, |e| e.version),
            "events appended"
        );
        Ok(appended)
    }

    async fn load(
        &self,
        stream: &StreamId,
        from_version: i64,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream)
            .map(|log| {
                log.iter()
                    .filter(|e| e.version > from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn stream_version(&self, stream: &StreamId) -> Result<i64, DomainError> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream)
            .and_then(|log| log.last())
            .map_or(0, |e| e.version))
    }

    async fn stream_heads(
        &self,
        aggregate_types: &[&str],
    ) -> Result<Vec<(StreamId, i64)>, DomainError> {
        let streams = self.streams.read().await;
        let mut heads: Vec<(StreamId, i64)> = streams
            .iter()
            .filter(|(stream, _)| {
                aggregate_types.is_empty()
                    || aggregate_types.contains(&stream.aggregate_type.as_str())
            })
            .filter_map(|(stream, log)| log.last().map(|e| (stream.clone(), e.version)))
            .collect();
        heads.sort();
        Ok(heads)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<StreamId>, DomainError> {
        let mut source = self.notifications.subscribe();
        let (tx, rx) = mpsc::channel(NOTIFICATION_CAPACITY);
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(stream) => {
                        if tx.send(stream).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "append notifications lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }
}

/// Snapshot store backed by a map.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<StreamId, Snapshot>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty snapshot store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every snapshot.
    pub async fn clear(&self) {
        self.snapshots.write().await.clear();
    }

    /// Number of streams with a snapshot.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// True if no snapshot is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: Snapshot) -> Result<(), DomainError> {
        let mut snapshots = self.snapshots.write().await;
        let newer = snapshots
            .get(&snapshot.stream)
            .is_none_or(|current| current.version <= snapshot.version);
        if newer {
            snapshots.insert(snapshot.stream.clone(), snapshot);
        }
        Ok(())
    }

    async fn load_latest(&self, stream: &StreamId) -> Result<Option<Snapshot>, DomainError> {
        Ok(self.snapshots.read().await.get(stream).cloned())
    }

    async fn delete(&self, stream: &StreamId) -> Result<(), DomainError> {
        self.snapshots.write().await.remove(stream);
        Ok(())
    }
}

/// Cursor store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<String, HashMap<StreamId, i64>>>,
}

impl InMemoryCursorStore {
    /// Creates an empty cursor store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn load(&self, projector: &str, stream: &StreamId) -> Result<i64, DomainError> {
        Ok(self
            .cursors
            .read()
            .await
            .get(projector)
            .and_then(|streams| streams.get(stream))
            .copied()
            .unwrap_or(0))
    }

    async fn save(
        &self,
        projector: &str,
        stream: &StreamId,
        version: i64,
    ) -> Result<(), DomainError> {
        let mut cursors = self.cursors.write().await;
        let cursor = cursors
            .entry(projector.to_owned())
            .or_default()
            .entry(stream.clone())
            .or_insert(0);
        *cursor = (*cursor).max(version);
        Ok(())
    }

    async fn load_all(&self, projector: &str) -> Result<HashMap<StreamId, i64>, DomainError> {
        Ok(self
            .cursors
            .read()
            .await
            .get(projector)
            .cloned()
            .unwrap_or_default())
    }

    async fn reset(&self, projector: &str) -> Result<(), DomainError> {
        self.cursors.write().await.remove(projector);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;

    fn new_event(event_type: &str) -> NewEvent {
        NewEvent::new(event_type, serde_json::json!({ "key": "value" }), Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_load_unknown_stream_is_empty() {
        let store = InMemoryEventStore::new();

        let events = store.load(&StreamId::new("order", "1"), 0).await.unwrap();

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_append_assigns_consecutive_versions() {
        // Arrange
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("order", "1");

        // Act
        let first = store
            .append(&stream, 0, vec![new_event("a"), new_event("b")])
            .await
            .unwrap();
        let second = store.append(&stream, 2, vec![new_event("c")]).await.unwrap();

        // Assert
        let versions: Vec<i64> = first.iter().chain(&second).map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(store.stream_version(&stream).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_conflicting_append_to_unknown_stream_leaves_no_entry() {
        // Arrange
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("order", "ghost");

        // Act
        let result = store.append(&stream, 3, vec![new_event("a")]).await;

        // Assert
        match result {
            Err(DomainError::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 0);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert!(store.streams.read().await.is_empty());
        assert!(store.stream_heads(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_expected_version_conflicts_and_persists_nothing() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("order", "1");
        store.append(&stream, 0, vec![new_event("a")]).await.unwrap();

        let result = store.append(&stream, 0, vec![new_event("b")]).await;

        match result {
            Err(DomainError::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_load_from_version_skips_earlier_events() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("order", "1");
        store
            .append(&stream, 0, vec![new_event("a"), new_event("b"), new_event("c")])
            .await
            .unwrap();

        let tail = store.load(&stream, 1).await.unwrap();

        assert_eq!(tail.iter().map(|e| e.version).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_recorded_at_never_decreases_within_stream() {
        struct Backwards(std::sync::Mutex<Vec<chrono::DateTime<Utc>>>);

        impl Clock for Backwards {
            fn now(&self) -> chrono::DateTime<Utc> {
                self.0.lock().unwrap().pop().unwrap()
            }
        }

        let late = Utc.with_ymd_and_hms(2026, 1, 15, 11, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        // Popped from the back: `late` first, then `early`.
        let store = InMemoryEventStore::with_clock(Arc::new(Backwards(std::sync::Mutex::new(
            vec![early, late],
        ))));
        let stream = StreamId::new("order", "1");

        let events = store
            .append(&stream, 0, vec![new_event("a"), new_event("b")])
            .await
            .unwrap();

        assert_eq!(events[0].recorded_at, late);
        assert_eq!(events[1].recorded_at, late);
    }

    #[tokio::test]
    async fn test_stream_heads_filters_by_aggregate_type() {
        let store = InMemoryEventStore::new();
        store
            .append(&StreamId::new("order", "1"), 0, vec![new_event("a")])
            .await
            .unwrap();
        store
            .append(&StreamId::new("invoice", "1"), 0, vec![new_event("a")])
            .await
            .unwrap();

        let heads = store.stream_heads(&["order"]).await.unwrap();
        let all = store.stream_heads(&[]).await.unwrap();

        assert_eq!(heads, vec![(StreamId::new("order", "1"), 1)]);
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_receives_appended_stream() {
        let store = InMemoryEventStore::new();
        let mut notifications = store.subscribe().await.unwrap();
        let stream = StreamId::new("order", "1");

        store.append(&stream, 0, vec![new_event("a")]).await.unwrap();

        assert_eq!(notifications.recv().await, Some(stream));
    }

    #[tokio::test]
    async fn test_snapshot_save_never_regresses() {
        let store = InMemorySnapshotStore::new();
        let stream = StreamId::new("order", "1");
        let at = |version| Snapshot {
            stream: stream.clone(),
            version,
            state: serde_json::json!({ "version": version }),
            taken_at: Utc::now(),
        };

        store.save(at(5)).await.unwrap();
        store.save(at(3)).await.unwrap();

        let latest = store.load_latest(&stream).await.unwrap().unwrap();
        assert_eq!(latest.version, 5);
    }

    #[tokio::test]
    async fn test_cursor_save_never_regresses_and_reset_clears() {
        let cursors = InMemoryCursorStore::new();
        let stream = StreamId::new("order", "1");

        cursors.save("summary", &stream, 4).await.unwrap();
        cursors.save("summary", &stream, 2).await.unwrap();
        assert_eq!(cursors.load("summary", &stream).await.unwrap(), 4);

        cursors.reset("summary").await.unwrap();
        assert_eq!(cursors.load("summary", &stream).await.unwrap(), 0);
    }
}
