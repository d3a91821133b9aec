//! The frame-integrated delivery loop.
//!
//! Driven once per frame by the host pipeline's post-layout, pre-paint hook:
//! `Idle → Detecting → Delivering → (StableExit | LoopAgain)`, with
//! `Delivering → ErrorCap` as the fourth per-frame terminal. The loop is an
//! explicit state machine rather than recursion so stack usage stays bounded
//! and the iteration cap is enforceable.

use std::collections::HashMap;

use geometry::ElementKey;
use log::{debug, error, trace};

use crate::broadcast::broadcast_cap_exceeded;
use crate::config::NotifierConfig;
use crate::detect::{ChangeSet, ObserverBatch, RecordBatch, detect_changes};
use crate::registry::ObservationRegistry;
use crate::{
    BatchCallback, ChangeRecord, LayoutHost, NotifyLoopError, ObserverId, ObserverOptions,
    ResizeObserver,
};

/// Delivery-loop state, advanced by [`NotifyScheduler::run_frame`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the host pipeline's post-layout hook.
    Idle,
    /// Running change detection over the registry.
    Detecting,
    /// Invoking observer callbacks with their grouped records.
    Delivering,
    /// Callbacks dirtied layout; a fresh layout pass was requested.
    LoopAgain,
    /// Normal per-frame termination; no further layout passes requested.
    StableExit,
    /// Iteration cap overflow; outstanding records broadcast and deferred.
    ErrorCap,
}

/// How a frame's delivery loop terminated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The loop stabilized; no further layout passes were requested this
    /// frame. A record whose callback failed is still pending and will be
    /// re-detected next frame.
    Stable {
        /// Delivery iterations run this frame (zero if nothing changed).
        iterations: usize,
    },
    /// The cap was hit with changes still pending. They were broadcast to
    /// all error handlers and deferred to the next frame.
    CapExceeded {
        /// Delivery iterations run before overflow.
        iterations: usize,
        /// Undelivered records carried over to the next frame.
        outstanding: usize,
    },
}

/// The notification engine: registry, detection, delivery, and deferral.
///
/// Single-threaded and frame-synchronous; the entire detect/deliver loop for
/// a frame runs to completion (modulo the cap) before the host paints.
pub struct NotifyScheduler {
    registry: ObservationRegistry,
    config: NotifierConfig,
    phase: Phase,
    /// Records detected but undelivered when a previous frame hit the cap.
    /// Merged into the next frame's first detection pass, never discarded.
    deferred: Vec<(ObserverId, ChangeRecord)>,
    /// Telemetry: detection passes run across all frames.
    perf_detect_passes: u64,
    /// Telemetry: records successfully delivered and committed.
    perf_records_delivered: u64,
    /// Telemetry: iteration-cap overflows.
    perf_cap_overflows: u64,
    /// Telemetry: frames completed (stable or capped).
    perf_frames_completed: u64,
}

impl NotifyScheduler {
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            registry: ObservationRegistry::new(),
            config,
            phase: Phase::Idle,
            deferred: Vec::new(),
            perf_detect_passes: 0,
            perf_records_delivered: 0,
            perf_cap_overflows: 0,
            perf_frames_completed: 0,
        }
    }

    /// Construct a new observer instance bound to this engine.
    pub fn observer(
        &mut self,
        callback: BatchCallback,
        options: ObserverOptions,
    ) -> ResizeObserver {
        self.registry.register_observer(callback, options)
    }

    /// Read-only access to the registry (for hosts and tests).
    pub fn registry(&self) -> &ObservationRegistry {
        &self.registry
    }

    /// Current loop phase. `Idle` between frames.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Records currently deferred from a capped frame.
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Telemetry: detection passes run across all frames.
    pub fn perf_detect_passes(&self) -> u64 {
        self.perf_detect_passes
    }
    /// Telemetry: records successfully delivered and committed.
    pub fn perf_records_delivered(&self) -> u64 {
        self.perf_records_delivered
    }
    /// Telemetry: iteration-cap overflows across all frames.
    pub fn perf_cap_overflows(&self) -> u64 {
        self.perf_cap_overflows
    }
    /// Telemetry: frames completed, stable or capped.
    pub fn perf_frames_completed(&self) -> u64 {
        self.perf_frames_completed
    }

    /// Run one frame's delivery loop. The host invokes this from its
    /// post-layout, pre-paint hook, once per frame.
    ///
    /// The iteration counter resets here; deferral is the only state carried
    /// across frames.
    pub fn run_frame<H: LayoutHost>(&mut self, host: &mut H) -> FrameOutcome {
        let mut iterations = 0usize;
        let outcome = loop {
            // Detecting: queued observe/unobserve/disconnect calls take
            // effect now, never mid-pass.
            self.phase = Phase::Detecting;
            self.registry.apply_pending();
            self.perf_detect_passes = self.perf_detect_passes.saturating_add(1);
            let changes = self.detect_with_deferred(host);

            if changes.is_empty() {
                self.phase = Phase::StableExit;
                break FrameOutcome::Stable { iterations };
            }

            if iterations >= self.config.max_notify_iterations {
                self.phase = Phase::ErrorCap;
                break self.handle_cap_overflow(iterations, changes);
            }

            self.phase = Phase::Delivering;
            self.deliver(changes);
            iterations += 1;

            if host.layout_dirty() {
                // LoopAgain: yield to the host for one more layout pass,
                // then re-detect.
                self.phase = Phase::LoopAgain;
                trace!("callbacks dirtied layout; requesting another pass (iteration {iterations})");
                host.run_layout();
            } else {
                self.phase = Phase::StableExit;
                break FrameOutcome::Stable { iterations };
            }
        };
        debug!("frame complete after {iterations} iteration(s): {outcome:?}");
        self.perf_frames_completed = self.perf_frames_completed.saturating_add(1);
        self.phase = Phase::Idle;
        outcome
    }

    /// Detect current changes and merge in any records deferred by a capped
    /// previous frame, de-duplicated by (observer, element) with the fresh
    /// snapshot winning. Deferred records whose observation was removed in
    /// the meantime are dropped; unobserve and disconnect are the
    /// cancellation primitives.
    fn detect_with_deferred<H: LayoutHost>(&mut self, host: &H) -> ChangeSet {
        let fresh = detect_changes(&self.registry, host);
        if self.deferred.is_empty() {
            return fresh;
        }
        let carried = std::mem::take(&mut self.deferred);
        trace!("merging {} deferred record(s) into detection", carried.len());

        let mut fresh_map: HashMap<(ObserverId, ElementKey), ChangeRecord> = HashMap::new();
        for batch in &fresh.batches {
            for record in &batch.records {
                fresh_map.insert((batch.observer, record.element), *record);
            }
        }
        let mut carried_map: HashMap<(ObserverId, ElementKey), ChangeRecord> = HashMap::new();
        for (observer, record) in carried {
            carried_map.insert((observer, record.element), record);
        }

        let mut batches = Vec::new();
        for slot in self.registry.slots() {
            let mut records = RecordBatch::new();
            for entry in slot.entries() {
                let key = (slot.id(), entry.element());
                if let Some(record) = fresh_map.remove(&key) {
                    records.push(record);
                } else if let Some(record) = carried_map.remove(&key) {
                    records.push(record);
                }
            }
            if !records.is_empty() {
                batches.push(ObserverBatch { observer: slot.id(), records });
            }
        }
        ChangeSet { batches }
    }

    /// Delivering: invoke each observer's callback once with its grouped
    /// records, committing snapshots only on success. A failing callback is
    /// isolated: it is logged, siblings still run, and its stale snapshots
    /// get the change re-detected next cycle.
    fn deliver(&mut self, changes: ChangeSet) {
        for batch in changes.batches {
            match self.registry.invoke_callback(batch.observer, &batch.records) {
                Ok(()) => {
                    self.registry.commit_delivered(batch.observer, &batch.records);
                    self.perf_records_delivered =
                        self.perf_records_delivered.saturating_add(batch.records.len() as u64);
                }
                Err(callback_error) => {
                    error!(
                        "resize callback for observer {:?} failed; snapshots left stale for retry: {callback_error:#}",
                        batch.observer
                    );
                }
            }
        }
    }

    /// ErrorCap: broadcast to every registered error handler engine-wide and
    /// retain the outstanding records for the next frame's detection.
    fn handle_cap_overflow(&mut self, iterations: usize, changes: ChangeSet) -> FrameOutcome {
        let outstanding = changes.flatten();
        let loop_error = NotifyLoopError { iterations, outstanding: outstanding.len() };
        broadcast_cap_exceeded(&mut self.registry, &loop_error, &outstanding);
        self.perf_cap_overflows = self.perf_cap_overflows.saturating_add(1);
        self.deferred = changes
            .batches
            .into_iter()
            .flat_map(|batch| {
                let observer = batch.observer;
                batch.records.into_iter().map(move |record| (observer, record))
            })
            .collect();
        FrameOutcome::CapExceeded { iterations, outstanding: self.deferred.len() }
    }
}

impl Default for NotifyScheduler {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}
