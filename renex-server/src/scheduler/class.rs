//! Per-class scheduling state
//!
//! Every batch of a class is in at most one of three places:
//! - the pending queue, in enqueue order
//! - the launching set, reserved by the running tick while `run_job` is out
//! - the in-flight set, launched and not yet observed finished
//!
//! Launching and in-flight batches both count toward the class ceiling, and
//! all three places take part in deduplication.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use renex_core::dto::jobs::{InFlightBatch, QueuedBatch};
use renex_core::{Batch, BatchId};

/// Result of offering a batch to a class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Appended to the pending queue
    Queued,
    /// A batch with the same identity is already queued, launching or running
    Duplicate,
}

#[derive(Debug)]
pub(super) struct ClassState {
    max_concurrency: usize,
    queue: VecDeque<QueuedBatch>,
    queued_ids: HashSet<BatchId>,
    launching: HashSet<BatchId>,
    in_flight: HashMap<BatchId, InFlightBatch>,
}

impl ClassState {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            queue: VecDeque::new(),
            queued_ids: HashSet::new(),
            launching: HashSet::new(),
            in_flight: HashMap::new(),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn contains(&self, id: &BatchId) -> bool {
        self.queued_ids.contains(id)
            || self.launching.contains(id)
            || self.in_flight.contains_key(id)
    }

    /// Appends `batch` unless its identity is already known to this class
    pub fn admit(&mut self, batch: Batch) -> Admission {
        if self.contains(&batch.id) {
            return Admission::Duplicate;
        }

        self.queued_ids.insert(batch.id.clone());
        self.queue.push_back(QueuedBatch {
            batch,
            queued_at: Utc::now(),
        });
        Admission::Queued
    }

    /// Slots neither in flight nor reserved for launch
    pub fn free_slots(&self) -> usize {
        self.max_concurrency
            .saturating_sub(self.in_flight.len() + self.launching.len())
    }

    /// Moves up to [`ClassState::free_slots`] batches from the queue head
    /// into the launching set and returns them in enqueue order
    pub fn reserve(&mut self) -> Vec<Batch> {
        let count = self.free_slots().min(self.queue.len());
        let mut reserved = Vec::with_capacity(count);

        for entry in self.queue.drain(..count) {
            self.queued_ids.remove(&entry.batch.id);
            self.launching.insert(entry.batch.id.clone());
            reserved.push(entry.batch);
        }

        reserved
    }

    /// Records a successful launch of a reserved batch
    pub fn launched(&mut self, batch: Batch) {
        self.launching.remove(&batch.id);
        self.in_flight.insert(
            batch.id.clone(),
            InFlightBatch {
                batch,
                started_at: Utc::now(),
            },
        );
    }

    /// Drops a reserved batch whose launch failed
    pub fn abandon(&mut self, id: &BatchId) {
        self.launching.remove(id);
    }

    /// Frees the slot of an in-flight batch, returns false if it was unknown
    pub fn release(&mut self, id: &BatchId) -> bool {
        self.in_flight.remove(id).is_some()
    }

    /// In-flight batches to probe
    pub fn running_batches(&self) -> Vec<Batch> {
        self.in_flight.values().map(|entry| entry.batch.clone()).collect()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn launching_len(&self) -> usize {
        self.launching.len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot of the pending queue in enqueue order
    pub fn queued(&self) -> Vec<QueuedBatch> {
        self.queue.iter().cloned().collect()
    }

    /// Snapshot of in-flight batches, oldest launch first
    pub fn in_flight(&self) -> Vec<InFlightBatch> {
        let mut entries: Vec<InFlightBatch> = self.in_flight.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.batch.id.cmp(&b.batch.id))
        });
        entries
    }
}
