//! Failing stores — storage doubles for error-path tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chronicle_core::envelope::{EventEnvelope, NewEvent};
use chronicle_core::error::DomainError;
use chronicle_core::store::{CursorStore, EventStore};
use chronicle_core::stream::StreamId;
use tokio::sync::mpsc;

fn unavailable() -> DomainError {
    DomainError::StorageUnavailable("connection refused".into())
}

/// An event store whose every operation fails with
/// `DomainError::StorageUnavailable`.
#[derive(Debug)]
pub struct FailingEventStore;

#[async_trait]
impl EventStore for FailingEventStore {
    async fn append(
        &self,
        _stream: &StreamId,
        _expected_version: i64,
        _events: Vec<NewEvent>,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        Err(unavailable())
    }

    async fn load(
        &self,
        _stream: &StreamId,
        _from_version: i64,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        Err(unavailable())
    }

    async fn stream_version(&self, _stream: &StreamId) -> Result<i64, DomainError> {
        Err(unavailable())
    }

    async fn stream_heads(
        &self,
        _aggregate_types: &[&str],
    ) -> Result<Vec<(StreamId, i64)>, DomainError> {
        Err(unavailable())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<StreamId>, DomainError> {
        Err(unavailable())
    }
}

/// A cursor store whose every operation fails with
/// `DomainError::StorageUnavailable`.
#[derive(Debug)]
pub struct FailingCursorStore;

#[async_trait]
impl CursorStore for FailingCursorStore {
    async fn load(&self, _projector: &str, _stream: &StreamId) -> Result<i64, DomainError> {
        Err(unavailable())
    }

    async fn save(
        &self,
        _projector: &str,
        _stream: &StreamId,
        _version: i64,
    ) -> Result<(), DomainError> {
        Err(unavailable())
    }

    async fn load_all(&self, _projector: &str) -> Result<HashMap<StreamId, i64>, DomainError> {
        Err(unavailable())
    }

    async fn reset(&self, _projector: &str) -> Result<(), DomainError> {
        Err(unavailable())
    }
}
