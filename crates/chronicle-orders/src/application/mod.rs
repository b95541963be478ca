//! Command handlers, query handlers and the order-summary projector.

pub mod command_handlers;
pub mod projector;
pub mod query_handlers;
