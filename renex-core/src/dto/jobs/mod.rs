//! Inspection DTOs for queued and running batches

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::batch::{Batch, WorkClass};

/// A batch waiting in a class queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedBatch {
    #[serde(flatten)]
    pub batch: Batch,
    pub queued_at: DateTime<Utc>,
}

/// A batch whose backend job has been launched and not yet observed finished
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InFlightBatch {
    #[serde(flatten)]
    pub batch: Batch,
    pub started_at: DateTime<Utc>,
}

/// One list per work class
///
/// Serialized as `{ "scheduled": [...], "event": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByClass<T> {
    pub scheduled: Vec<T>,
    pub event: Vec<T>,
}

impl<T> ByClass<T> {
    /// Returns the list for `class`
    pub fn get(&self, class: WorkClass) -> &[T] {
        match class {
            WorkClass::Scheduled => &self.scheduled,
            WorkClass::Event => &self.event,
        }
    }

    /// Total number of entries across both classes
    pub fn len(&self) -> usize {
        self.scheduled.len() + self.event.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ByClass<T> {
    fn default() -> Self {
        Self {
            scheduled: Vec::new(),
            event: Vec::new(),
        }
    }
}

/// Response of `GET /jobs`
pub type JobsResponse = ByClass<InFlightBatch>;

/// Response of `GET /queue`
pub type QueueResponse = ByClass<QueuedBatch>;
