//! Aggregate abstraction.
//!
//! An aggregate is plain data plus a pure state-transition function. The
//! shared bookkeeping (identity, committed version, pending events) lives in
//! [`Root`], which wraps any [`Aggregate`] instead of requiring one to
//! inherit it.

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::envelope::NewEvent;
use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::stream::StreamId;

/// State of one aggregate type, rebuilt by folding its events.
pub trait Aggregate:
    Default + Clone + Send + Sync + std::fmt::Debug + Serialize + DeserializeOwned + 'static
{
    /// Stream family for this aggregate, e.g. `order`.
    const AGGREGATE_TYPE: &'static str;

    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the state after `event`. Must be deterministic and free of
    /// side effects; replay relies on it.
    #[must_use]
    fn apply(self, event: &Self::Event) -> Self;
}

/// Folds `events` into `state` in order.
pub fn fold<'a, A, I>(state: A, events: I) -> A
where
    A: Aggregate,
    A::Event: 'a,
    I: IntoIterator<Item = &'a A::Event>,
{
    events.into_iter().fold(state, A::apply)
}

/// An event recorded during the current unit of work.
#[derive(Debug, Clone)]
struct PendingEvent<E> {
    event_id: Uuid,
    event: E,
}

/// In-memory aggregate instance: identity, state, committed version and the
/// events recorded since it was loaded.
#[derive(Debug, Clone)]
pub struct Root<A: Aggregate> {
    stream: StreamId,
    state: A,
    version: i64,
    correlation_id: Uuid,
    pending: Vec<PendingEvent<A::Event>>,
}

impl<A: Aggregate> Root<A> {
    /// A fresh aggregate at version 0.
    #[must_use]
    pub fn new(aggregate_id: impl Into<String>) -> Self {
        Self::hydrated(
            StreamId::new(A::AGGREGATE_TYPE, aggregate_id),
            A::default(),
            0,
        )
    }

    /// An aggregate whose state already reflects events up to `version`.
    #[must_use]
    pub fn hydrated(stream: StreamId, state: A, version: i64) -> Self {
        Self {
            stream,
            state,
            version,
            correlation_id: Uuid::nil(),
            pending: Vec::new(),
        }
    }

    /// Returns the aggregate identifier.
    #[must_use]
    pub fn aggregate_id(&self) -> &str {
        &self.stream.aggregate_id
    }

    /// Returns the stream this aggregate is persisted in.
    #[must_use]
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Current state, including pending events.
    #[must_use]
    pub fn state(&self) -> &A {
        &self.state
    }

    /// Highest committed event version applied to this instance.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// True when nothing has ever been committed for this stream.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.version == 0
    }

    /// Fails with `AggregateNotFound` if the stream has no committed events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for a fresh aggregate.
    pub fn ensure_exists(&self) -> Result<(), DomainError> {
        if self.is_new() {
            return Err(DomainError::AggregateNotFound(self.stream.clone()));
        }
        Ok(())
    }

    /// Sets the correlation ID stamped on events recorded from now on.
    pub fn set_correlation_id(&mut self, correlation_id: Uuid) {
        self.correlation_id = correlation_id;
    }

    /// Records `event` and applies it to the state immediately.
    pub fn record(&mut self, event: A::Event) {
        let state = std::mem::take(&mut self.state);
        self.state = state.apply(&event);
        self.pending.push(PendingEvent {
            event_id: Uuid::now_v7(),
            event,
        });
    }

    /// Events recorded but not yet committed.
    pub fn pending_events(&self) -> impl ExactSizeIterator<Item = &A::Event> {
        self.pending.iter().map(|p| &p.event)
    }

    /// True if there is anything to append.
    #[must_use]
    pub fn has_pending_events(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Encodes the pending events for `EventStore::append`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if a payload cannot be encoded.
    pub fn to_new_events(&self) -> Result<Vec<NewEvent>, DomainError> {
        self.pending
            .iter()
            .map(|p| {
                Ok(NewEvent {
                    event_id: p.event_id,
                    event_type: p.event.event_type().to_owned(),
                    payload: p.event.to_payload()?,
                    correlation_id: self.correlation_id,
                    causation_id: self.correlation_id,
                })
            })
            .collect()
    }

    /// Clears pending events once the store confirmed they were appended up
    /// to `committed_version`.
    pub fn mark_committed(&mut self, committed_version: i64) {
        self.version = committed_version;
        self.pending.clear();
    }

    /// Consumes the root, returning its state.
    #[must_use]
    pub fn into_state(self) -> A {
        self.state
    }
}
