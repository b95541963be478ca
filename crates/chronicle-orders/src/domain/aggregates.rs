//! Aggregate roots for the orders context.

use chronicle_core::aggregate::Aggregate;
use chronicle_core::error::DomainError;
use serde::{Deserialize, Serialize};

use super::events::{
    OrderCancelled, OrderEvent, OrderLine, OrderPlaced, OrderShipped, total_cents,
};

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Nothing recorded yet.
    #[default]
    Draft,
    /// Placed and awaiting shipment.
    Placed,
    /// Handed to the carrier.
    Shipped,
    /// Cancelled before shipping.
    Cancelled,
}

impl OrderStatus {
    /// Stable lowercase name, as stored in read models.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Placed => "placed",
            Self::Shipped => "shipped",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "placed" => Ok(Self::Placed),
            "shipped" => Ok(Self::Shipped),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::Serialization(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

/// The order aggregate: plain data folded from `OrderEvent`s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Whether `OrderPlaced` has been applied.
    pub placed: bool,
    /// The customer who placed the order.
    pub customer_id: String,
    /// Ordered lines, in the order they were placed.
    pub lines: Vec<OrderLine>,
    /// Currency of all prices.
    pub currency: String,
    /// Current lifecycle state.
    pub status: OrderStatus,
    /// Carrier tracking number once shipped.
    pub tracking_number: Option<String>,
    /// Reason given when cancelled.
    pub cancellation_reason: Option<String>,
}

impl Order {
    /// Sum of all line subtotals, or `None` if it does not fit in `i64`.
    #[must_use]
    pub fn total_cents(&self) -> Option<i64> {
        total_cents(&self.lines)
    }

    /// Decides whether the order can be placed with these lines.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order was already placed,
    /// has no lines, has a line with zero quantity or a negative price, or
    /// its total does not fit in `i64` cents.
    pub fn place(
        &self,
        order_id: &str,
        customer_id: &str,
        lines: &[OrderLine],
        currency: &str,
    ) -> Result<OrderEvent, DomainError> {
        if self.placed {
            return Err(DomainError::Validation(format!(
                "order {order_id} has already been placed"
            )));
        }
        if lines.is_empty() {
            return Err(DomainError::Validation(format!(
                "order {order_id} must have at least one line"
            )));
        }
        if let Some(line) = lines
            .iter()
            .find(|l| l.quantity == 0 || l.unit_price_cents < 0)
        {
            return Err(DomainError::Validation(format!(
                "order {order_id} line {} must have a positive quantity and a non-negative price",
                line.sku
            )));
        }
        if total_cents(lines).is_none() {
            return Err(DomainError::Validation(format!(
                "order {order_id} total exceeds the representable amount"
            )));
        }
        if currency.len() != 3 {
            return Err(DomainError::Validation(format!(
                "currency {currency} is not an ISO 4217 code"
            )));
        }
        Ok(OrderEvent::Placed(OrderPlaced {
            order_id: order_id.to_owned(),
            customer_id: customer_id.to_owned(),
            lines: lines.to_vec(),
            currency: currency.to_owned(),
        }))
    }

    /// Decides whether the order can ship.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless the order is placed and not
    /// yet shipped or cancelled.
    pub fn ship(&self, order_id: &str, tracking_number: &str) -> Result<OrderEvent, DomainError> {
        if self.status != OrderStatus::Placed {
            return Err(DomainError::Validation(format!(
                "order {order_id} cannot ship while {}",
                self.status.as_str()
            )));
        }
        if tracking_number.trim().is_empty() {
            return Err(DomainError::Validation(
                "tracking number must not be empty".to_owned(),
            ));
        }
        Ok(OrderEvent::Shipped(OrderShipped {
            order_id: order_id.to_owned(),
            tracking_number: tracking_number.to_owned(),
        }))
    }

    /// Decides whether the order can be cancelled.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order has shipped or was
    /// already cancelled.
    pub fn cancel(&self, order_id: &str, reason: &str) -> Result<OrderEvent, DomainError> {
        match self.status {
            OrderStatus::Placed => Ok(OrderEvent::Cancelled(OrderCancelled {
                order_id: order_id.to_owned(),
                reason: reason.to_owned(),
            })),
            status => Err(DomainError::Validation(format!(
                "order {order_id} cannot be cancelled while {}",
                status.as_str()
            ))),
        }
    }
}

impl Aggregate for Order {
    const AGGREGATE_TYPE: &'static str = "order";
    type Event = OrderEvent;

    fn apply(mut self, event: &OrderEvent) -> Self {
        match event {
            OrderEvent::Placed(placed) => {
                self.placed = true;
                self.customer_id.clone_from(&placed.customer_id);
                self.lines.clone_from(&placed.lines);
                self.currency.clone_from(&placed.currency);
                self.status = OrderStatus::Placed;
            }
            OrderEvent::Shipped(shipped) => {
                self.status = OrderStatus::Shipped;
                self.tracking_number = Some(shipped.tracking_number.clone());
            }
            OrderEvent::Cancelled(cancelled) => {
                self.status = OrderStatus::Cancelled;
                self.cancellation_reason = Some(cancelled.reason.clone());
            }
        }
        self
    }
}
