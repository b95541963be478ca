//! Test projectors — `Projector` implementations that record or fail.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chronicle_core::envelope::EventEnvelope;
use chronicle_core::error::DomainError;
use chronicle_core::projection::Projector;
use chronicle_core::stream::StreamId;

/// A projector that records every envelope it is handed, in order, and
/// counts how many it applied per stream. Redelivered envelopes are
/// recorded but not counted twice.
#[derive(Debug)]
pub struct RecordingProjector {
    name: &'static str,
    aggregate_types: Vec<&'static str>,
    handled: Mutex<Vec<(StreamId, i64)>>,
    applied: Mutex<HashMap<StreamId, i64>>,
}

impl RecordingProjector {
    /// Create a projector named `name` consuming `aggregate_types`.
    #[must_use]
    pub fn new(name: &'static str, aggregate_types: Vec<&'static str>) -> Self {
        Self {
            name,
            aggregate_types,
            handled: Mutex::new(Vec::new()),
            applied: Mutex::new(HashMap::new()),
        }
    }

    /// Every `(stream, version)` handed to `handle`, redeliveries included.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn handled(&self) -> Vec<(StreamId, i64)> {
        self.handled.lock().unwrap().clone()
    }

    /// The last version applied for `stream`, or 0.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn applied_version(&self, stream: &StreamId) -> i64 {
        self.applied.lock().unwrap().get(stream).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Projector for RecordingProjector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn aggregate_types(&self) -> &[&'static str] {
        &self.aggregate_types
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), DomainError> {
        self.handled
            .lock()
            .unwrap()
            .push((envelope.stream.clone(), envelope.version));
        let mut applied = self.applied.lock().unwrap();
        let last = applied.entry(envelope.stream.clone()).or_insert(0);
        if envelope.version > *last {
            *last = envelope.version;
        }
        Ok(())
    }

    async fn reset(&self) -> Result<(), DomainError> {
        self.handled.lock().unwrap().clear();
        self.applied.lock().unwrap().clear();
        Ok(())
    }
}

/// A projector wrapping a [`RecordingProjector`] that fails a given
/// `(stream, version)` a set number of times before letting it through.
/// `u32::MAX` failures make the envelope fail forever.
#[derive(Debug)]
pub struct FlakyProjector {
    inner: RecordingProjector,
    poison: Mutex<HashMap<(StreamId, i64), u32>>,
    attempts: Mutex<HashMap<(StreamId, i64), u32>>,
}

impl FlakyProjector {
    /// Create a flaky projector named `name` consuming `aggregate_types`.
    #[must_use]
    pub fn new(name: &'static str, aggregate_types: Vec<&'static str>) -> Self {
        Self {
            inner: RecordingProjector::new(name, aggregate_types),
            poison: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Make `version` of `stream` fail its next `failures` handler calls.
    #[must_use]
    pub fn failing(self, stream: &StreamId, version: i64, failures: u32) -> Self {
        self.poison
            .lock()
            .unwrap()
            .insert((stream.clone(), version), failures);
        self
    }

    /// Stop failing every envelope.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn heal(&self) {
        self.poison.lock().unwrap().clear();
    }

    /// How many times `handle` ran for `version` of `stream`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn attempts(&self, stream: &StreamId, version: i64) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(&(stream.clone(), version))
            .copied()
            .unwrap_or(0)
    }

    /// The recording projector behind the failures.
    #[must_use]
    pub fn recorded(&self) -> &RecordingProjector {
        &self.inner
    }
}

#[async_trait]
impl Projector for FlakyProjector {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn aggregate_types(&self) -> &[&'static str] {
        self.inner.aggregate_types()
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), DomainError> {
        let key = (envelope.stream.clone(), envelope.version);
        *self.attempts.lock().unwrap().entry(key.clone()).or_insert(0) += 1;

        let should_fail = {
            let mut poison = self.poison.lock().unwrap();
            match poison.get_mut(&key) {
                Some(remaining) if *remaining > 0 => {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    true
                }
                _ => false,
            }
        };
        if should_fail {
            return Err(DomainError::StorageUnavailable(format!(
                "read model rejected {} version {}",
                envelope.stream, envelope.version
            )));
        }
        self.inner.handle(envelope).await
    }

    async fn reset(&self) -> Result<(), DomainError> {
        self.inner.reset().await
    }
}
