//! `PostgreSQL` implementation of the `SnapshotStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use chronicle_core::error::DomainError;
use chronicle_core::snapshot::Snapshot;
use chronicle_core::store::SnapshotStore;
use chronicle_core::stream::StreamId;

use crate::storage_error;

/// PostgreSQL-backed snapshot store keeping the latest snapshot per stream.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Creates a new `PgSnapshotStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn save(&self, snapshot: Snapshot) -> Result<(), DomainError> {
        let result = sqlx::query(
            "INSERT INTO snapshots (aggregate_type, aggregate_id, version, state, taken_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (aggregate_type, aggregate_id) DO UPDATE \
             SET version = EXCLUDED.version, state = EXCLUDED.state, taken_at = EXCLUDED.taken_at \
             WHERE snapshots.version <= EXCLUDED.version",
        )
        .bind(&snapshot.stream.aggregate_type)
        .bind(&snapshot.stream.aggregate_id)
        .bind(snapshot.version)
        .bind(&snapshot.state)
        .bind(snapshot.taken_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            debug!(stream = %snapshot.stream, version = snapshot.version, "newer snapshot kept");
        }
        Ok(())
    }

    async fn load_latest(&self, stream: &StreamId) -> Result<Option<Snapshot>, DomainError> {
        let row: Option<(i64, serde_json::Value, DateTime<Utc>)> = sqlx::query_as(
            "SELECT version, state, taken_at FROM snapshots \
             WHERE aggregate_type = $1 AND aggregate_id = $2",
        )
        .bind(&stream.aggregate_type)
        .bind(&stream.aggregate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(|(version, state, taken_at)| Snapshot {
            stream: stream.clone(),
            version,
            state,
            taken_at,
        }))
    }

    async fn delete(&self, stream: &StreamId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM snapshots WHERE aggregate_type = $1 AND aggregate_id = $2")
            .bind(&stream.aggregate_type)
            .bind(&stream.aggregate_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
