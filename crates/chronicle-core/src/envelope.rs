//! Persisted event representations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stream::StreamId;

/// An event handed to `EventStore::append`. The store assigns its version
/// and `recorded_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Discriminator for payload interpretation.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
}

impl NewEvent {
    /// Creates a new event whose causation is its own correlation.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        payload: serde_json::Value,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: event_type.into(),
            payload,
            correlation_id,
            causation_id: correlation_id,
        }
    }
}

/// Immutable, persisted domain fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Stream this event belongs to.
    pub stream: StreamId,
    /// Discriminator for payload interpretation.
    pub event_type: String,
    /// Position within the stream, starting at 1.
    pub version: i64,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Store-assigned timestamp, non-decreasing within a stream.
    pub recorded_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Builds the envelope for `event` at `version`.
    #[must_use]
    pub fn from_new(
        stream: &StreamId,
        version: i64,
        event: NewEvent,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event.event_id,
            stream: stream.clone(),
            event_type: event.event_type,
            version,
            payload: event.payload,
            correlation_id: event.correlation_id,
            causation_id: event.causation_id,
            recorded_at,
        }
    }
}
