//! Domain event abstractions.
//!
//! Every event type owns an explicit payload schema keyed by a stable
//! discriminator (`event_type`). Discriminators carry a schema version suffix
//! (`order.placed.v2`) so older payloads can be upcast on decode instead of
//! relying on generic object serialization.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Trait that all domain events implement.
pub trait DomainEvent: Sized + Clone + Send + Sync + std::fmt::Debug {
    /// Returns the event type name (used for serialization routing).
    fn event_type(&self) -> &'static str;

    /// Serializes the event payload to JSON.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    fn to_payload(&self) -> Result<serde_json::Value, DomainError>;

    /// Reconstructs an event from its discriminator and payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` for unknown discriminators or
    /// payloads that do not match the discriminator's schema.
    fn from_payload(event_type: &str, payload: &serde_json::Value) -> Result<Self, DomainError>;
}

/// Encodes a payload struct.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if encoding fails.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<serde_json::Value, DomainError> {
    Ok(serde_json::to_value(payload)?)
}

/// Decodes a payload struct, naming the discriminator in the error.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if the payload does not match `T`.
pub fn decode_payload<T: DeserializeOwned>(
    event_type: &str,
    payload: &serde_json::Value,
) -> Result<T, DomainError> {
    T::deserialize(payload)
        .map_err(|e| DomainError::Serialization(format!("invalid {event_type} payload: {e}")))
}

/// Error for a discriminator the event type does not know.
#[must_use]
pub fn unknown_event_type(event_type: &str) -> DomainError {
    DomainError::Serialization(format!("unknown event type: {event_type}"))
}
