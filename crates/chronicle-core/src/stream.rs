//! Stream identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies the ordered history of one aggregate instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId {
    /// The aggregate's schema family, e.g. `order`.
    pub aggregate_type: String,
    /// Unique within `aggregate_type`.
    pub aggregate_id: String,
}

impl StreamId {
    /// Creates a stream identifier.
    #[must_use]
    pub fn new(aggregate_type: impl Into<String>, aggregate_id: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.aggregate_id)
    }
}
