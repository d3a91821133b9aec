//! Change detection: compares current geometry against the last-delivered
//! snapshot for every registered observation and groups the resulting
//! records per observer instance.
//!
//! This pass has no side effects on the registry. Snapshot replacement is
//! deferred to delivery, so a failed delivery leaves the stored snapshot
//! stale and the change is re-detected on the next cycle instead of being
//! dropped.

use geometry::GeometryQuery;
use log::trace;
use smallvec::SmallVec;

use crate::registry::{ObservationEntry, ObservationRegistry};
use crate::{ChangeRecord, ObserverId};

/// Records grouped for one observer's callback, in element registration order.
pub type RecordBatch = SmallVec<[ChangeRecord; 4]>;

/// One observer's non-empty group of records for a single delivery step.
#[derive(Debug)]
pub struct ObserverBatch {
    pub observer: ObserverId,
    pub records: RecordBatch,
}

/// The change set of one detection pass: observer batches in observer
/// registration order.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub batches: Vec<ObserverBatch>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Total number of records across all batches.
    pub fn record_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.records.len()).sum()
    }

    /// Flatten into a single sequence, preserving batch order. Used for the
    /// error-broadcast payload.
    pub fn flatten(&self) -> Vec<ChangeRecord> {
        self.batches.iter().flat_map(|batch| batch.records.iter().copied()).collect()
    }
}

/// Whether an observation should produce a record for `current` geometry.
///
/// A never-delivered entry fires on its first non-zero measurement; an entry
/// that has delivered before fires on any component-wise size difference.
/// Inline elements report all-zero metrics and therefore stay silent unless
/// they transition from a prior non-zero state.
fn is_changed(entry: &ObservationEntry, current: &geometry::BoxMetrics) -> bool {
    match entry.last_delivered() {
        Some(previous) => !previous.same_size(current),
        None => !current.is_zero_size(),
    }
}

/// Run one detection pass over the whole registry.
///
/// O(number of observations); expected to run once per frame per loop
/// iteration.
pub fn detect_changes<Q: GeometryQuery + ?Sized>(
    registry: &ObservationRegistry,
    host: &Q,
) -> ChangeSet {
    let mut batches = Vec::new();
    for slot in registry.slots() {
        let mut records = RecordBatch::new();
        for entry in slot.entries() {
            let current = host.current_metrics(entry.element());
            if is_changed(entry, &current) {
                trace!(
                    "detected change for observer {:?} element {:?}: {current:?}",
                    slot.id(),
                    entry.element()
                );
                records.push(ChangeRecord { element: entry.element(), metrics: current });
            }
        }
        if !records.is_empty() {
            batches.push(ObserverBatch { observer: slot.id(), records });
        }
    }
    ChangeSet { batches }
}
