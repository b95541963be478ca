//! Orders — an event-sourced example context built on Chronicle.
//!
//! Commands go through [`application::command_handlers`], which load the
//! `Order` aggregate by replay and append its events. The
//! [`application::projector::OrderSummaryProjector`] keeps the
//! [`read_model`] current, and [`application::query_handlers`] read only
//! from it.

pub mod application;
pub mod domain;
pub mod read_model;
