//! Shared test doubles for Chronicle.

mod clock;
mod projector;
mod rng;
mod store;

pub use clock::{FixedClock, SteppingClock};
pub use projector::{FlakyProjector, RecordingProjector};
pub use rng::{MockRng, SequenceRng};
pub use store::{FailingCursorStore, FailingEventStore};
