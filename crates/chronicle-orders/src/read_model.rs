//! Order-summary read model.
//!
//! One row per order, denormalized for queries. Each row remembers the last
//! stream version folded into it so redelivered envelopes are skipped.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronicle_core::error::DomainError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::aggregates::OrderStatus;

/// Query-side view of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    /// The order identifier.
    pub order_id: String,
    /// The customer who placed it.
    pub customer_id: String,
    /// Current lifecycle state.
    pub status: OrderStatus,
    /// Number of lines.
    pub line_count: u32,
    /// Order total in minor currency units.
    pub total_cents: i64,
    /// Currency of the total.
    pub currency: String,
    /// Carrier tracking number once shipped.
    pub tracking_number: Option<String>,
    /// Highest stream version folded into this row.
    pub last_applied_version: i64,
    /// `recorded_at` of that version.
    pub updated_at: DateTime<Utc>,
}

impl OrderSummary {
    /// Whether `OrderPlaced` has been folded in.
    #[must_use]
    pub fn placed(&self) -> bool {
        self.status != OrderStatus::Draft
    }
}

/// Storage for order summaries.
#[async_trait]
pub trait OrderSummaryStore: Send + Sync {
    /// The summary for `order_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the store cannot be
    /// reached, or `DomainError::Serialization` if the stored row is
    /// unreadable.
    async fn get(&self, order_id: &str) -> Result<Option<OrderSummary>, DomainError>;

    /// Writes `summary` unless the stored row already reflects the same or
    /// a later version. Returns whether the row was written.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the store cannot be
    /// reached, or `DomainError::Validation` if the summary cannot be
    /// represented in the store.
    async fn upsert(&self, summary: OrderSummary) -> Result<bool, DomainError>;

    /// Every summary of `customer_id`, ordered by order ID.
    ///
    /// # Errors
    ///
    /// Same as [`OrderSummaryStore::get`].
    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<OrderSummary>, DomainError>;

    /// Number of rows.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the store cannot be
    /// reached.
    async fn count(&self) -> Result<usize, DomainError>;

    /// Removes every row.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if the store cannot be
    /// reached.
    async fn clear(&self) -> Result<(), DomainError>;
}

/// Order summaries held in memory.
#[derive(Debug, Default)]
pub struct InMemoryOrderSummaryStore {
    rows: RwLock<BTreeMap<String, OrderSummary>>,
}

impl InMemoryOrderSummaryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderSummaryStore for InMemoryOrderSummaryStore {
    async fn get(&self, order_id: &str) -> Result<Option<OrderSummary>, DomainError> {
        Ok(self.rows.read().await.get(order_id).cloned())
    }

    async fn upsert(&self, summary: OrderSummary) -> Result<bool, DomainError> {
        let mut rows = self.rows.write().await;
        let stale = rows
            .get(&summary.order_id)
            .is_some_and(|row| row.last_applied_version >= summary.last_applied_version);
        if stale {
            return Ok(false);
        }
        rows.insert(summary.order_id.clone(), summary);
        Ok(true)
    }

    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<OrderSummary>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|row| row.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.rows.read().await.len())
    }

    async fn clear(&self) -> Result<(), DomainError> {
        self.rows.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn summary(order_id: &str, customer_id: &str, version: i64) -> OrderSummary {
        OrderSummary {
            order_id: order_id.to_owned(),
            customer_id: customer_id.to_owned(),
            status: OrderStatus::Placed,
            line_count: 1,
            total_cents: 500,
            currency: "USD".to_owned(),
            tracking_number: None,
            last_applied_version: version,
            updated_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_skips_same_or_older_version() {
        // Arrange
        let store = InMemoryOrderSummaryStore::new();
        store.upsert(summary("1", "c-1", 2)).await.unwrap();

        // Act
        let same = store.upsert(summary("1", "c-2", 2)).await.unwrap();
        let older = store.upsert(summary("1", "c-2", 1)).await.unwrap();
        let newer = store.upsert(summary("1", "c-3", 3)).await.unwrap();

        // Assert
        assert!(!same);
        assert!(!older);
        assert!(newer);
        assert_eq!(store.get("1").await.unwrap().unwrap().customer_id, "c-3");
    }

    #[tokio::test]
    async fn test_list_by_customer_is_ordered_by_order_id() {
        let store = InMemoryOrderSummaryStore::new();
        for (order_id, customer_id) in [("3", "c-1"), ("1", "c-1"), ("2", "c-2")] {
            store.upsert(summary(order_id, customer_id, 1)).await.unwrap();
        }

        let listed = store.list_by_customer("c-1").await.unwrap();

        assert_eq!(
            listed.iter().map(|s| s.order_id.as_str()).collect::<Vec<_>>(),
            vec!["1", "3"]
        );
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
