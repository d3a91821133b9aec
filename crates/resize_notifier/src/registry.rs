//! Per-observer observation bookkeeping.
//!
//! The registry is the engine's sole shared mutable resource. All
//! application-facing mutations (`observe`/`unobserve`/`disconnect`) go
//! through a queue drained at the start of each detection pass, so a pass in
//! flight is never corrupted — including calls made from inside a delivery
//! callback, which reach the queue through a cloned [`ResizeObserver`]
//! handle.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use geometry::{BoxMetrics, ElementKey};
use log::{debug, trace, warn};

use crate::{BatchCallback, ChangeRecord, ErrorHandler, ObserverId, ObserverOptions};

/// One (observer, element) association with its last-delivered snapshot.
/// `None` means never delivered.
#[derive(Debug)]
pub struct ObservationEntry {
    element: ElementKey,
    last_delivered: Option<BoxMetrics>,
}

impl ObservationEntry {
    pub fn element(&self) -> ElementKey {
        self.element
    }

    pub fn last_delivered(&self) -> Option<BoxMetrics> {
        self.last_delivered
    }
}

/// One observer instance: its watched elements in `observe` registration
/// order, its batch callback, and its optional error handler.
pub(crate) struct ObserverSlot {
    id: ObserverId,
    entries: Vec<ObservationEntry>,
    callback: BatchCallback,
    error_handler: Option<ErrorHandler>,
}

impl ObserverSlot {
    pub(crate) fn id(&self) -> ObserverId {
        self.id
    }

    pub(crate) fn entries(&self) -> &[ObservationEntry] {
        &self.entries
    }

    pub(crate) fn error_handler_mut(&mut self) -> Option<&mut ErrorHandler> {
        self.error_handler.as_mut()
    }
}

/// A queued application-facing mutation, applied between passes.
#[derive(Debug)]
enum RegistryOp {
    Observe {
        observer: ObserverId,
        element: ElementKey,
    },
    Unobserve {
        observer: ObserverId,
        element: ElementKey,
    },
    Disconnect {
        observer: ObserverId,
    },
}

/// Shared FIFO of pending registry mutations. Cloned into every
/// [`ResizeObserver`] handle so callbacks can re-enter safely.
#[derive(Clone, Default)]
struct MutationQueue(Rc<RefCell<VecDeque<RegistryOp>>>);

impl MutationQueue {
    fn push(&self, op: RegistryOp) {
        self.0.borrow_mut().push_back(op);
    }

    fn drain(&self) -> Vec<RegistryOp> {
        self.0.borrow_mut().drain(..).collect()
    }
}

/// Application-facing observer handle.
///
/// Dropping the handle does not tear the observer down: the engine keeps
/// delivering to its callback until `disconnect` removes the observations.
pub struct ResizeObserver {
    id: ObserverId,
    queue: MutationQueue,
}

impl ResizeObserver {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Register `element` for this observer. Idempotent: re-observing an
    /// already-watched element overwrites the entry in place and resets its
    /// last-delivered snapshot, never duplicates it.
    pub fn observe(&self, element: ElementKey) {
        self.queue.push(RegistryOp::Observe { observer: self.id, element });
    }

    /// Deregister `element`. No-op if not registered.
    pub fn unobserve(&self, element: ElementKey) {
        self.queue.push(RegistryOp::Unobserve { observer: self.id, element });
    }

    /// Deregister every element watched by this observer.
    pub fn disconnect(&self) {
        self.queue.push(RegistryOp::Disconnect { observer: self.id });
    }
}

/// Registry of observer instances and their watched elements.
///
/// Observers iterate in registration order; within an observer, entries keep
/// the element's original `observe` order. Snapshot commits happen here but
/// only when the scheduler reports a successful delivery.
#[derive(Default)]
pub struct ObservationRegistry {
    observers: Vec<ObserverSlot>,
    queue: MutationQueue,
    next_observer_id: u64,
}

impl ObservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a new observer instance and hand back its handle.
    pub fn register_observer(
        &mut self,
        callback: BatchCallback,
        options: ObserverOptions,
    ) -> ResizeObserver {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id = self.next_observer_id.wrapping_add(1);
        self.observers.push(ObserverSlot {
            id,
            entries: Vec::new(),
            callback,
            error_handler: options.error_handler,
        });
        debug!("registered resize observer {id:?}");
        ResizeObserver { id, queue: self.queue.clone() }
    }

    /// Drain and apply queued mutations. Called by the scheduler at the
    /// start of every detection pass; tests may call it directly.
    pub fn apply_pending(&mut self) {
        for op in self.queue.drain() {
            self.apply_op(op);
        }
    }

    fn apply_op(&mut self, op: RegistryOp) {
        trace!("applying registry op {op:?}");
        match op {
            RegistryOp::Observe { observer, element } => {
                let Some(slot) = self.slot_mut(observer) else {
                    warn!("observe for unknown observer {observer:?}; dropping");
                    return;
                };
                if let Some(entry) =
                    slot.entries.iter_mut().find(|entry| entry.element == element)
                {
                    // Overwrite in place: keeps the original registration
                    // order, resets the snapshot so the next pass redelivers.
                    entry.last_delivered = None;
                } else {
                    slot.entries.push(ObservationEntry { element, last_delivered: None });
                }
            }
            RegistryOp::Unobserve { observer, element } => {
                let Some(slot) = self.slot_mut(observer) else {
                    warn!("unobserve for unknown observer {observer:?}; dropping");
                    return;
                };
                slot.entries.retain(|entry| entry.element != element);
            }
            RegistryOp::Disconnect { observer } => {
                let Some(slot) = self.slot_mut(observer) else {
                    warn!("disconnect for unknown observer {observer:?}; dropping");
                    return;
                };
                slot.entries.clear();
            }
        }
    }

    pub(crate) fn slots(&self) -> &[ObserverSlot] {
        &self.observers
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [ObserverSlot] {
        &mut self.observers
    }

    fn slot_mut(&mut self, observer: ObserverId) -> Option<&mut ObserverSlot> {
        self.observers.iter_mut().find(|slot| slot.id == observer)
    }

    fn slot(&self, observer: ObserverId) -> Option<&ObserverSlot> {
        self.observers.iter().find(|slot| slot.id == observer)
    }

    /// Invoke an observer's batch callback with its grouped records.
    pub(crate) fn invoke_callback(
        &mut self,
        observer: ObserverId,
        records: &[ChangeRecord],
    ) -> anyhow::Result<()> {
        let Some(slot) = self.slot_mut(observer) else {
            warn!("delivery for unknown observer {observer:?}; skipping");
            return Ok(());
        };
        (slot.callback)(records)
    }

    /// Commit delivered snapshots for `observer`. Called only after its
    /// callback returned without error, so a failed delivery leaves the
    /// stored snapshots stale and the change is re-detected next cycle.
    pub(crate) fn commit_delivered(&mut self, observer: ObserverId, records: &[ChangeRecord]) {
        let Some(slot) = self.slot_mut(observer) else {
            return;
        };
        for record in records {
            if let Some(entry) =
                slot.entries.iter_mut().find(|entry| entry.element == record.element)
            {
                entry.last_delivered = Some(record.metrics);
            }
        }
    }

    /// True if `observer` currently watches `element`.
    pub fn is_observing(&self, observer: ObserverId, element: ElementKey) -> bool {
        self.slot(observer)
            .is_some_and(|slot| slot.entries.iter().any(|entry| entry.element == element))
    }

    /// Last-delivered snapshot for an observation, `None` if never delivered
    /// or not observed.
    pub fn last_delivered(&self, observer: ObserverId, element: ElementKey) -> Option<BoxMetrics> {
        self.slot(observer).and_then(|slot| {
            slot.entries
                .iter()
                .find(|entry| entry.element == element)
                .and_then(ObservationEntry::last_delivered)
        })
    }

    /// Number of registered observer instances.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Total number of (observer, element) observations.
    pub fn observation_count(&self) -> usize {
        self.observers.iter().map(|slot| slot.entries.len()).sum()
    }
}
