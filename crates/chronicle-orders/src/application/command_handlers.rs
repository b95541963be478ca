//! Command handlers for the orders context.
//!
//! Each handler loads the `Order` through the repository, decides the
//! event against the current state and appends it. Conflicting appends are
//! retried by `Repository::execute` on freshly loaded state.

use chronicle_core::envelope::EventEnvelope;
use chronicle_core::error::DomainError;
use chronicle_core::repository::Repository;

use crate::domain::aggregates::Order;
use crate::domain::commands::{CancelOrder, PlaceOrder, ShipOrder};

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct OrderCommandResult {
    /// The order affected by the command.
    pub order_id: String,
    /// Stream version after the append.
    pub version: i64,
    /// The envelopes appended.
    pub envelopes: Vec<EventEnvelope>,
}

impl OrderCommandResult {
    fn new(order_id: &str, envelopes: Vec<EventEnvelope>) -> Self {
        Self {
            order_id: order_id.to_owned(),
            version: envelopes.last().map_or(0, |e| e.version),
            envelopes,
        }
    }
}

/// Handles the `PlaceOrder` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the order exists already or the
/// lines are invalid, `DomainError::ConcurrencyConflict` if every attempt
/// lost a race, or a storage error.
pub async fn place_order(
    command: &PlaceOrder,
    repository: &Repository,
) -> Result<OrderCommandResult, DomainError> {
    let envelopes = repository
        .execute::<Order, _, _>(command, |root| {
            let event = root.state().place(
                &command.order_id,
                &command.customer_id,
                &command.lines,
                &command.currency,
            )?;
            root.record(event);
            Ok(())
        })
        .await?;
    Ok(OrderCommandResult::new(&command.order_id, envelopes))
}

/// Handles the `ShipOrder` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the order does not exist,
/// `DomainError::Validation` if it cannot ship in its current state,
/// `DomainError::ConcurrencyConflict` if every attempt lost a race, or a
/// storage error.
pub async fn ship_order(
    command: &ShipOrder,
    repository: &Repository,
) -> Result<OrderCommandResult, DomainError> {
    let envelopes = repository
        .execute::<Order, _, _>(command, |root| {
            root.ensure_exists()?;
            let event = root
                .state()
                .ship(&command.order_id, &command.tracking_number)?;
            root.record(event);
            Ok(())
        })
        .await?;
    Ok(OrderCommandResult::new(&command.order_id, envelopes))
}

/// Handles the `CancelOrder` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the order does not exist,
/// `DomainError::Validation` if it has shipped or was already cancelled,
/// `DomainError::ConcurrencyConflict` if every attempt lost a race, or a
/// storage error.
pub async fn cancel_order(
    command: &CancelOrder,
    repository: &Repository,
) -> Result<OrderCommandResult, DomainError> {
    let envelopes = repository
        .execute::<Order, _, _>(command, |root| {
            root.ensure_exists()?;
            let event = root.state().cancel(&command.order_id, &command.reason)?;
            root.record(event);
            Ok(())
        })
        .await?;
    Ok(OrderCommandResult::new(&command.order_id, envelopes))
}
