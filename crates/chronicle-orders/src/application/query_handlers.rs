//! Query handlers for the orders context.
//!
//! Queries read the order-summary read model only; they never replay the
//! event store.

use chronicle_core::aggregate::Aggregate;
use chronicle_core::error::DomainError;
use chronicle_core::stream::StreamId;

use crate::domain::aggregates::Order;
use crate::read_model::{OrderSummary, OrderSummaryStore};

/// Retrieves the summary of one order.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the read model has no row for
/// the order (it may not have been projected yet), or a storage error.
pub async fn get_order_summary(
    order_id: &str,
    store: &dyn OrderSummaryStore,
) -> Result<OrderSummary, DomainError> {
    store
        .get(order_id)
        .await?
        .ok_or_else(|| DomainError::AggregateNotFound(StreamId::new(Order::AGGREGATE_TYPE, order_id)))
}

/// Lists the orders of a customer, ordered by order ID.
///
/// # Errors
///
/// Returns a storage error if the read model cannot be queried.
pub async fn list_customer_orders(
    customer_id: &str,
    store: &dyn OrderSummaryStore,
) -> Result<Vec<OrderSummary>, DomainError> {
    store.list_by_customer(customer_id).await
}
