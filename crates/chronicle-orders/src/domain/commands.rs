//! Commands for the orders context.

use chronicle_core::command::Command;
use uuid::Uuid;

use super::events::OrderLine;

/// Command to place a new order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier.
    pub order_id: String,
    /// The customer placing the order.
    pub customer_id: String,
    /// Ordered lines.
    pub lines: Vec<OrderLine>,
    /// ISO 4217 currency code.
    pub currency: String,
}

/// Command to ship a placed order.
#[derive(Debug, Clone)]
pub struct ShipOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier.
    pub order_id: String,
    /// Carrier tracking number.
    pub tracking_number: String,
}

/// Command to cancel a placed order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier.
    pub order_id: String,
    /// Why the order is cancelled.
    pub reason: String,
}

impl Command for PlaceOrder {
    fn command_type(&self) -> &'static str {
        "orders.place_order"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> String {
        self.order_id.clone()
    }
}

impl Command for ShipOrder {
    fn command_type(&self) -> &'static str {
        "orders.ship_order"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> String {
        self.order_id.clone()
    }
}

impl Command for CancelOrder {
    fn command_type(&self) -> &'static str {
        "orders.cancel_order"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> String {
        self.order_id.clone()
    }
}
