//! `PostgreSQL` implementation of the `EventStore` trait.
//!
//! An append locks the stream's `event_streams` row for the length of its
//! transaction, checks the expected version against it, inserts the batch
//! and publishes the stream on [`NOTIFY_CHANNEL`]. The notification is only
//! delivered if the transaction commits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use chronicle_core::clock::{Clock, SystemClock};
use chronicle_core::envelope::{EventEnvelope, NewEvent};
use chronicle_core::error::DomainError;
use chronicle_core::store::EventStore;
use chronicle_core::stream::StreamId;

use crate::schema::NOTIFY_CHANNEL;
use crate::storage_error;

const NOTIFICATION_CAPACITY: usize = 1024;
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    aggregate_type: String,
    aggregate_id: String,
    event_type: String,
    version: i64,
    payload: serde_json::Value,
    correlation_id: Uuid,
    causation_id: Uuid,
    recorded_at: DateTime<Utc>,
}

impl From<EventRow> for EventEnvelope {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            stream: StreamId::new(row.aggregate_type, row.aggregate_id),
            event_type: row.event_type,
            version: row.version,
            payload: row.payload,
            correlation_id: row.correlation_id,
            causation_id: row.causation_id,
            recorded_at: row.recorded_at,
        }
    }
}

/// PostgreSQL-backed event store.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgEventStore {
    /// Creates a new `PgEventStore` stamping events with the system clock.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Creates a new `PgEventStore` stamping events with `clock`.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn conflict(&self, stream: &StreamId, expected: i64) -> DomainError {
        conflict_error(stream, expected, self.stream_version(stream).await)
    }
}

/// The error for an append that lost a race, given the re-read head.
/// A failed re-read is reported as itself rather than as a conflict.
fn conflict_error(stream: &StreamId, expected: i64, head: Result<i64, DomainError>) -> DomainError {
    match head {
        Ok(actual) => DomainError::ConcurrencyConflict {
            stream: stream.clone(),
            expected,
            actual,
        },
        Err(e) => {
            warn!(%stream, expected, error = %e, "cannot read head after conflicting append");
            e
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
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

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            "INSERT INTO event_streams (aggregate_type, aggregate_id, version) \
             VALUES ($1, $2, 0) \
             ON CONFLICT (aggregate_type, aggregate_id) DO NOTHING",
        )
        .bind(&stream.aggregate_type)
        .bind(&stream.aggregate_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        let (actual, last_recorded_at): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            "SELECT version, last_recorded_at FROM event_streams \
             WHERE aggregate_type = $1 AND aggregate_id = $2 \
             FOR UPDATE",
        )
        .bind(&stream.aggregate_type)
        .bind(&stream.aggregate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_error)?;

        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                stream: stream.clone(),
                expected: expected_version,
                actual,
            });
        }

        let mut recorded_at = last_recorded_at;
        let mut version = expected_version;
        let mut appended = Vec::with_capacity(events.len());
        for event in events {
            version += 1;
            // TIMESTAMPTZ keeps microseconds.
            let stamp = self.clock.recorded_after(recorded_at).trunc_subsecs(6);
            recorded_at = Some(stamp);
            let envelope = EventEnvelope::from_new(stream, version, event, stamp);

            let inserted = sqlx::query(
                "INSERT INTO events \
                 (event_id, aggregate_type, aggregate_id, version, event_type, payload, \
                  correlation_id, causation_id, recorded_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(envelope.event_id)
            .bind(&stream.aggregate_type)
            .bind(&stream.aggregate_id)
            .bind(envelope.version)
            .bind(&envelope.event_type)
            .bind(&envelope.payload)
            .bind(envelope.correlation_id)
            .bind(envelope.causation_id)
            .bind(envelope.recorded_at)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => appended.push(envelope),
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    drop(tx);
                    return Err(self.conflict(stream, expected_version).await);
                }
                Err(e) => return Err(storage_error(e)),
            }
        }

        sqlx::query(
            "UPDATE event_streams SET version = $3, last_recorded_at = $4 \
             WHERE aggregate_type = $1 AND aggregate_id = $2",
        )
        .bind(&stream.aggregate_type)
        .bind(&stream.aggregate_id)
        .bind(version)
        .bind(recorded_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        let notification = serde_json::to_string(stream)?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(NOTIFY_CHANNEL)
            .bind(notification)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;

        debug!(version, "events appended");
        Ok(appended)
    }

    async fn load(
        &self,
        stream: &StreamId,
        from_version: i64,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT event_id, aggregate_type, aggregate_id, event_type, version, payload, \
                    correlation_id, causation_id, recorded_at \
             FROM events \
             WHERE aggregate_type = $1 AND aggregate_id = $2 AND version > $3 \
             ORDER BY version ASC",
        )
        .bind(&stream.aggregate_type)
        .bind(&stream.aggregate_id)
        .bind(from_version)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(EventEnvelope::from).collect())
    }

    async fn stream_version(&self, stream: &StreamId) -> Result<i64, DomainError> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM event_streams \
             WHERE aggregate_type = $1 AND aggregate_id = $2",
        )
        .bind(&stream.aggregate_type)
        .bind(&stream.aggregate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(version.unwrap_or(0))
    }

    async fn stream_heads(
        &self,
        aggregate_types: &[&str],
    ) -> Result<Vec<(StreamId, i64)>, DomainError> {
        let types: Vec<String> = aggregate_types.iter().map(|t| (*t).to_owned()).collect();
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT aggregate_type, aggregate_id, version FROM event_streams \
             WHERE version > 0 \
               AND (cardinality($1::text[]) = 0 OR aggregate_type = ANY($1)) \
             ORDER BY aggregate_type, aggregate_id",
        )
        .bind(types)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows
            .into_iter()
            .map(|(aggregate_type, aggregate_id, version)| {
                (StreamId::new(aggregate_type, aggregate_id), version)
            })
            .collect())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<StreamId>, DomainError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(storage_error)?;
        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .map_err(storage_error)?;

        let (tx, rx) = mpsc::channel(NOTIFICATION_CAPACITY);
        tokio::spawn(async move {
            while !tx.is_closed() {
                match listener.recv().await {
                    Ok(notification) => {
                        match serde_json::from_str::<StreamId>(notification.payload()) {
                            Ok(stream) => {
                                if tx.send(stream).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(payload = notification.payload(), error = %e, "unreadable append notification");
                            }
                        }
                    }
                    Err(e) => {
                        // The listener reconnects on the next recv; polling
                        // covers whatever was missed meanwhile.
                        warn!(error = %e, "append listener lost its connection");
                        tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                    }
                }
            }
        });
        Ok(rx)
    }
}
