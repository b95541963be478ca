//! Chronicle projector daemon.
//!
//! Connects to `PostgreSQL`, applies the schema migrations and keeps the
//! order-summary read model current by following the event store through
//! `LISTEN/NOTIFY` wakeups and periodic polling sweeps.

pub mod config;
pub mod error;
pub mod pg_order_summary_store;
pub mod services;
