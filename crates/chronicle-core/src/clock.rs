//! Clock abstraction for determinism.

use chrono::{DateTime, Utc};

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Timestamp for an event recorded after one stamped `previous`.
    ///
    /// Never earlier than `previous`, so `recorded_at` stays monotonic within
    /// a stream even if the wall clock steps backwards.
    fn recorded_after(&self, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = self.now();
        previous.map_or(now, |prev| now.max(prev))
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
