//! Frame-synchronous resize notification engine.
//!
//! Tracks observed elements across observer instances, detects box-size
//! deltas once per rendering frame, delivers batched change records per
//! observer between layout and paint, and loops while callbacks keep
//! dirtying layout, up to a configurable iteration cap. On cap overflow the
//! undelivered records are broadcast to every registered error handler and
//! retained for the next frame; no notification is ever silently dropped.
//!
//! The engine is single-threaded and cooperative: the host pipeline calls
//! [`scheduler::NotifyScheduler::run_frame`] once per frame from its
//! post-layout, pre-paint hook.

use std::error::Error;
use std::fmt;

use geometry::{BoxMetrics, ElementKey, GeometryQuery};

pub mod broadcast;
pub mod config;
pub mod detect;
pub mod registry;
pub mod scheduler;

pub use config::NotifierConfig;
pub use registry::{ObservationRegistry, ResizeObserver};
pub use scheduler::{FrameOutcome, NotifyScheduler, Phase};

// ============================
// Stable observer keys
// ============================

/// A 64-bit stable key identifying one observer instance, minted by the
/// registry at construction.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ObserverId(pub u64);

/// One element's geometry delta, delivered to a callback as part of a batch.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChangeRecord {
    /// The element whose box size changed.
    pub element: ElementKey,
    /// The metrics measured by the detection pass that produced this record.
    pub metrics: BoxMetrics,
}

/// Batch callback owned by an observer instance. Invoked at most once per
/// delivery step with this observer's records in element registration order.
///
/// A returned `Err` is an application-level failure: the engine logs it,
/// leaves the last-delivered snapshots stale so the change is re-detected
/// next cycle, and still delivers to sibling observers in the same pass.
pub type BatchCallback = Box<dyn FnMut(&[ChangeRecord]) -> anyhow::Result<()>>;

/// Error handler invoked on iteration-cap overflow with the error descriptor
/// and all outstanding, undelivered records across the whole engine.
pub type ErrorHandler = Box<dyn FnMut(&NotifyLoopError, &[ChangeRecord])>;

/// Options recognized when constructing an observer.
#[derive(Default)]
pub struct ObserverOptions {
    /// Opt-in visibility into iteration-cap overflows. Handlers see every
    /// overflow engine-wide, not only those implicating their own elements.
    pub error_handler: Option<ErrorHandler>,
}

/// The notify/layout loop did not stabilize within the configured number of
/// iterations for the frame. Outstanding records are deferred to the next
/// frame, never discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyLoopError {
    /// Delivery iterations completed before the cap was hit.
    pub iterations: usize,
    /// Number of detected but undelivered records at overflow time.
    pub outstanding: usize,
}

impl fmt::Display for NotifyLoopError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "resize notify loop did not stabilize within {} iterations ({} records deferred)",
            self.iterations, self.outstanding
        )
    }
}

impl Error for NotifyLoopError {}

/// Host rendering pipeline capabilities consumed by the engine each frame.
///
/// The geometry query must reflect the latest layout state; `run_layout` is
/// the engine's way of requesting one more layout pass before the next paint
/// when delivered callbacks dirtied style or layout.
pub trait LayoutHost: GeometryQuery {
    /// True if style or layout state is dirty (e.g. a callback mutated it).
    fn layout_dirty(&self) -> bool;
    /// Re-run layout so the next detection pass sees fresh geometry.
    fn run_layout(&mut self);
}
