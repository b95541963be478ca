//! Domain events for the orders context.
//!
//! Every event type carries a versioned discriminator. A payload written
//! under an older discriminator is upcast to the current schema on decode;
//! new events are always written at the current version.

use chronicle_core::error::DomainError;
use chronicle_core::event::{DomainEvent, decode_payload, encode_payload, unknown_event_type};
use serde::{Deserialize, Serialize};

/// Discriminator for the first `OrderPlaced` schema, which had no currency.
pub const ORDER_PLACED_V1_EVENT_TYPE: &str = "order.placed.v1";
/// Discriminator for the current `OrderPlaced` schema.
pub const ORDER_PLACED_EVENT_TYPE: &str = "order.placed.v2";
/// Discriminator for `OrderShipped`.
pub const ORDER_SHIPPED_EVENT_TYPE: &str = "order.shipped.v1";
/// Discriminator for `OrderCancelled`.
pub const ORDER_CANCELLED_EVENT_TYPE: &str = "order.cancelled.v1";

/// Currency assumed for orders placed before currencies were recorded.
pub const LEGACY_CURRENCY: &str = "USD";

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Stock keeping unit.
    pub sku: String,
    /// Units ordered.
    pub quantity: u32,
    /// Price per unit in minor currency units.
    pub unit_price_cents: i64,
}

impl OrderLine {
    /// Quantity times unit price, or `None` if it overflows.
    #[must_use]
    pub fn subtotal_cents(&self) -> Option<i64> {
        i64::from(self.quantity).checked_mul(self.unit_price_cents)
    }
}

/// Sum of the line subtotals, or `None` if any step overflows.
#[must_use]
pub fn total_cents(lines: &[OrderLine]) -> Option<i64> {
    lines
        .iter()
        .try_fold(0_i64, |total, line| total.checked_add(line.subtotal_cents()?))
}

/// Emitted when an order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    /// The order identifier.
    pub order_id: String,
    /// The customer placing the order.
    pub customer_id: String,
    /// Ordered lines.
    pub lines: Vec<OrderLine>,
    /// ISO 4217 currency code of all prices.
    pub currency: String,
}

/// `order.placed.v1` payload.
#[derive(Debug, Deserialize)]
struct OrderPlacedV1 {
    order_id: String,
    customer_id: String,
    lines: Vec<OrderLine>,
}

impl From<OrderPlacedV1> for OrderPlaced {
    fn from(v1: OrderPlacedV1) -> Self {
        Self {
            order_id: v1.order_id,
            customer_id: v1.customer_id,
            lines: v1.lines,
            currency: LEGACY_CURRENCY.to_owned(),
        }
    }
}

/// Emitted when an order leaves the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    /// The order identifier.
    pub order_id: String,
    /// Carrier tracking number.
    pub tracking_number: String,
}

/// Emitted when an order is cancelled before shipping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    /// The order identifier.
    pub order_id: String,
    /// Why the order was cancelled.
    pub reason: String,
}

/// Events of the `Order` aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    /// The order has been placed.
    Placed(OrderPlaced),
    /// The order has shipped.
    Shipped(OrderShipped),
    /// The order has been cancelled.
    Cancelled(OrderCancelled),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Placed(_) => ORDER_PLACED_EVENT_TYPE,
            Self::Shipped(_) => ORDER_SHIPPED_EVENT_TYPE,
            Self::Cancelled(_) => ORDER_CANCELLED_EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        match self {
            Self::Placed(payload) => encode_payload(payload),
            Self::Shipped(payload) => encode_payload(payload),
            Self::Cancelled(payload) => encode_payload(payload),
        }
    }

    fn from_payload(event_type: &str, payload: &serde_json::Value) -> Result<Self, DomainError> {
        match event_type {
            ORDER_PLACED_EVENT_TYPE => Ok(Self::Placed(decode_payload(event_type, payload)?)),
            ORDER_PLACED_V1_EVENT_TYPE => Ok(Self::Placed(
                decode_payload::<OrderPlacedV1>(event_type, payload)?.into(),
            )),
            ORDER_SHIPPED_EVENT_TYPE => Ok(Self::Shipped(decode_payload(event_type, payload)?)),
            ORDER_CANCELLED_EVENT_TYPE => {
                Ok(Self::Cancelled(decode_payload(event_type, payload)?))
            }
            other => Err(unknown_event_type(other)),
        }
    }
}
