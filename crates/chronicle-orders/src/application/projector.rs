//! Projector maintaining the order-summary read model.

use std::sync::Arc;

use async_trait::async_trait;
use chronicle_core::aggregate::Aggregate;
use chronicle_core::envelope::EventEnvelope;
use chronicle_core::error::DomainError;
use chronicle_core::event::DomainEvent;
use chronicle_core::projection::Projector;
use tracing::debug;

use crate::domain::aggregates::{Order, OrderStatus};
use crate::domain::events::{OrderEvent, total_cents};
use crate::read_model::{OrderSummary, OrderSummaryStore};

/// Cursor key of the order-summary projector.
pub const ORDER_SUMMARY_PROJECTOR: &str = "order_summary";

const AGGREGATE_TYPES: &[&str] = &[Order::AGGREGATE_TYPE];

/// Folds order events into [`OrderSummary`] rows.
pub struct OrderSummaryProjector {
    store: Arc<dyn OrderSummaryStore>,
}

impl OrderSummaryProjector {
    /// Creates a projector writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn OrderSummaryStore>) -> Self {
        Self { store }
    }

    fn summarize(
        existing: Option<OrderSummary>,
        envelope: &EventEnvelope,
        event: &OrderEvent,
    ) -> Result<OrderSummary, DomainError> {
        if let OrderEvent::Placed(placed) = event {
            let total_cents = total_cents(&placed.lines).ok_or_else(|| {
                DomainError::Validation(format!(
                    "order total of {} version {} overflows",
                    envelope.stream, envelope.version
                ))
            })?;
            return Ok(OrderSummary {
                order_id: envelope.stream.aggregate_id.clone(),
                customer_id: placed.customer_id.clone(),
                status: OrderStatus::Placed,
                line_count: u32::try_from(placed.lines.len()).unwrap_or(u32::MAX),
                total_cents,
                currency: placed.currency.clone(),
                tracking_number: None,
                last_applied_version: envelope.version,
                updated_at: envelope.recorded_at,
            });
        }

        let Some(mut summary) = existing else {
            return Err(DomainError::Validation(format!(
                "no summary for {} before version {}",
                envelope.stream, envelope.version
            )));
        };
        match event {
            OrderEvent::Shipped(shipped) => {
                summary.status = OrderStatus::Shipped;
                summary.tracking_number = Some(shipped.tracking_number.clone());
            }
            OrderEvent::Cancelled(_) => summary.status = OrderStatus::Cancelled,
            OrderEvent::Placed(_) => {}
        }
        summary.last_applied_version = envelope.version;
        summary.updated_at = envelope.recorded_at;
        Ok(summary)
    }
}

#[async_trait]
impl Projector for OrderSummaryProjector {
    fn name(&self) -> &'static str {
        ORDER_SUMMARY_PROJECTOR
    }

    fn aggregate_types(&self) -> &[&'static str] {
        AGGREGATE_TYPES
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), DomainError> {
        let existing = self.store.get(&envelope.stream.aggregate_id).await?;
        if existing
            .as_ref()
            .is_some_and(|row| row.last_applied_version >= envelope.version)
        {
            debug!(stream = %envelope.stream, version = envelope.version, "already applied");
            return Ok(());
        }

        let event = OrderEvent::from_payload(&envelope.event_type, &envelope.payload)?;
        let summary = Self::summarize(existing, envelope, &event)?;
        self.store.upsert(summary).await?;
        Ok(())
    }

    async fn reset(&self) -> Result<(), DomainError> {
        self.store.clear().await
    }
}
