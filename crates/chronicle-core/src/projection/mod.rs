//! Projectors: durable-cursor consumers that build read models.
//!
//! A [`Projector`] owns a read model and a handler per event. The
//! [`ProjectionRunner`] feeds it envelopes in stream order, persists a cursor
//! per stream after each handled envelope, retries failing handlers with
//! backoff and halts a stream whose handler keeps failing rather than skip
//! an event.
//!
//! Delivery is at-least-once: a crash between a read-model write and the
//! cursor save redelivers the envelope, so handlers must be idempotent
//! (typically by comparing the envelope version against a per-row
//! last-applied version).

mod runner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::EventEnvelope;
use crate::error::DomainError;
use crate::stream::StreamId;

pub use runner::{CatchUpReport, HaltedStream, ProjectionRunner};

/// Builds one read model from events.
#[async_trait]
pub trait Projector: Send + Sync {
    /// Stable name, used as the cursor key.
    fn name(&self) -> &'static str;

    /// Aggregate types whose streams this projector consumes.
    fn aggregate_types(&self) -> &[&'static str];

    /// Applies one envelope to the read model. Must tolerate redelivery.
    ///
    /// # Errors
    ///
    /// Returns a `DomainError` if the read model could not be updated; the
    /// runner retries it.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), DomainError>;

    /// Clears the read model ahead of a rebuild.
    ///
    /// # Errors
    ///
    /// Returns a `DomainError` if the read model could not be cleared.
    async fn reset(&self) -> Result<(), DomainError>;
}

/// Whether a runner is currently working through envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectorState {
    /// Waiting for a notification or the next poll.
    Idle,
    /// Applying envelopes.
    Processing,
}

/// When projections are advanced relative to the command that appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    /// Inline after the append, before the command returns.
    Synchronous,
    /// Only by a runner loop woken by notifications or polling.
    #[default]
    Asynchronous,
}

/// Errors raised while advancing a projection.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// A handler kept failing after every retry; the stream is now halted.
    #[error(
        "projector {projector} failed on {stream} version {version} after {attempts} attempts: {source}"
    )]
    Handler {
        /// The projector whose handler failed.
        projector: String,
        /// The stream being processed.
        stream: StreamId,
        /// The envelope version that could not be applied.
        version: i64,
        /// How many times the handler ran.
        attempts: u32,
        /// The last handler error.
        #[source]
        source: DomainError,
    },

    /// The stream was halted by an earlier permanent failure.
    #[error("projector {projector} is halted on {stream} at version {version}")]
    Halted {
        /// The halted projector.
        projector: String,
        /// The halted stream.
        stream: StreamId,
        /// The version that could not be applied.
        version: i64,
    },

    /// The store returned an envelope that is not the next one.
    #[error("projector {projector} expected {stream} version {expected}, found {found}")]
    Gap {
        /// The projector reading the stream.
        projector: String,
        /// The stream being read.
        stream: StreamId,
        /// The version after the cursor.
        expected: i64,
        /// The version that was returned.
        found: i64,
    },

    /// Reading events or cursors failed.
    #[error(transparent)]
    Store(#[from] DomainError),
}
