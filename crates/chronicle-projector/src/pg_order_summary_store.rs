//! `PostgreSQL` implementation of the `OrderSummaryStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use chronicle_core::error::DomainError;
use chronicle_event_store::storage_error;
use chronicle_orders::domain::aggregates::OrderStatus;
use chronicle_orders::read_model::{OrderSummary, OrderSummaryStore};

#[derive(sqlx::FromRow)]
struct SummaryRow {
    order_id: String,
    customer_id: String,
    status: String,
    line_count: i32,
    total_cents: i64,
    currency: String,
    tracking_number: Option<String>,
    last_applied_version: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SummaryRow> for OrderSummary {
    type Error = DomainError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            order_id: row.order_id,
            customer_id: row.customer_id,
            status: row.status.parse::<OrderStatus>()?,
            line_count: u32::try_from(row.line_count).map_err(|_| {
                DomainError::Serialization(format!("negative line count {}", row.line_count))
            })?,
            total_cents: row.total_cents,
            currency: row.currency,
            tracking_number: row.tracking_number,
            last_applied_version: row.last_applied_version,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_SUMMARY: &str = "SELECT order_id, customer_id, status, line_count, total_cents, \
                                     currency, tracking_number, last_applied_version, updated_at \
                              FROM order_summaries";

/// PostgreSQL-backed order summaries.
#[derive(Debug, Clone)]
pub struct PgOrderSummaryStore {
    pool: PgPool,
}

impl PgOrderSummaryStore {
    /// Creates a new `PgOrderSummaryStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderSummaryStore for PgOrderSummaryStore {
    async fn get(&self, order_id: &str) -> Result<Option<OrderSummary>, DomainError> {
        let row: Option<SummaryRow> =
            sqlx::query_as(&format!("{SELECT_SUMMARY} WHERE order_id = $1"))
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        row.map(OrderSummary::try_from).transpose()
    }

    async fn upsert(&self, summary: OrderSummary) -> Result<bool, DomainError> {
        let line_count = i32::try_from(summary.line_count).map_err(|_| {
            DomainError::Validation(format!("line count {} is too large", summary.line_count))
        })?;

        // The WHERE clause turns a stale or redelivered write into a no-op.
        let result = sqlx::query(
            "INSERT INTO order_summaries \
             (order_id, customer_id, status, line_count, total_cents, currency, \
              tracking_number, last_applied_version, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (order_id) DO UPDATE \
             SET customer_id = EXCLUDED.customer_id, \
                 status = EXCLUDED.status, \
                 line_count = EXCLUDED.line_count, \
                 total_cents = EXCLUDED.total_cents, \
                 currency = EXCLUDED.currency, \
                 tracking_number = EXCLUDED.tracking_number, \
                 last_applied_version = EXCLUDED.last_applied_version, \
                 updated_at = EXCLUDED.updated_at \
             WHERE order_summaries.last_applied_version < EXCLUDED.last_applied_version",
        )
        .bind(&summary.order_id)
        .bind(&summary.customer_id)
        .bind(summary.status.as_str())
        .bind(line_count)
        .bind(summary.total_cents)
        .bind(&summary.currency)
        .bind(&summary.tracking_number)
        .bind(summary.last_applied_version)
        .bind(summary.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<OrderSummary>, DomainError> {
        let rows: Vec<SummaryRow> = sqlx::query_as(&format!(
            "{SELECT_SUMMARY} WHERE customer_id = $1 ORDER BY order_id"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(OrderSummary::try_from).collect()
    }

    async fn count(&self) -> Result<usize, DomainError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_summaries")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn clear(&self) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM order_summaries")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
