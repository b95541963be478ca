//! `PostgreSQL` implementation of the `CursorStore` trait.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use chronicle_core::error::DomainError;
use chronicle_core::store::CursorStore;
use chronicle_core::stream::StreamId;

use crate::storage_error;

/// PostgreSQL-backed projection cursors, one row per projector and stream.
#[derive(Debug, Clone)]
pub struct PgCursorStore {
    pool: PgPool,
}

impl PgCursorStore {
    /// Creates a new `PgCursorStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CursorStore for PgCursorStore {
    async fn load(&self, projector: &str, stream: &StreamId) -> Result<i64, DomainError> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT last_processed_version FROM projection_cursors \
             WHERE projector = $1 AND aggregate_type = $2 AND aggregate_id = $3",
        )
        .bind(projector)
        .bind(&stream.aggregate_type)
        .bind(&stream.aggregate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(version.unwrap_or(0))
    }

    async fn save(
        &self,
        projector: &str,
        stream: &StreamId,
        version: i64,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO projection_cursors \
             (projector, aggregate_type, aggregate_id, last_processed_version, updated_at) \
             VALUES ($1, $2, $3, $4, NOW()) \
             ON CONFLICT (projector, aggregate_type, aggregate_id) DO UPDATE \
             SET last_processed_version = GREATEST(projection_cursors.last_processed_version, EXCLUDED.last_processed_version), \
                 updated_at = NOW()",
        )
        .bind(projector)
        .bind(&stream.aggregate_type)
        .bind(&stream.aggregate_id)
        .bind(version)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn load_all(&self, projector: &str) -> Result<HashMap<StreamId, i64>, DomainError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT aggregate_type, aggregate_id, last_processed_version \
             FROM projection_cursors WHERE projector = $1",
        )
        .bind(projector)
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

    async fn reset(&self, projector: &str) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM projection_cursors WHERE projector = $1")
            .bind(projector)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
