//! Chronicle Core — event-sourced aggregate persistence.
//!
//! This crate defines the stream and envelope model, the storage traits
//! (event log, snapshots, projection cursors), the aggregate replay engine,
//! the repository that turns commands into appends, and the projection
//! runner. Storage backends live in `chronicle-event-store`.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod envelope;
pub mod error;
pub mod event;
pub mod projection;
pub mod replay;
pub mod repository;
pub mod retry;
pub mod rng;
pub mod snapshot;
pub mod store;
pub mod stream;
