//! Shared test host: an in-memory geometry store standing in for the host
//! layout pipeline.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use geometry::{BoxMetrics, ElementKey, GeometryQuery};
use resize_notifier::{BatchCallback, ChangeRecord, LayoutHost};

#[derive(Default)]
struct HostState {
    metrics: HashMap<ElementKey, BoxMetrics>,
    /// Geometry applied on the next layout pass (script-caused resizes).
    staged: Vec<(ElementKey, BoxMetrics)>,
    dirty: bool,
    layout_passes: usize,
}

/// Mock layout pipeline. Cloneable so callbacks can dirty it mid-delivery.
#[derive(Clone, Default)]
pub struct MockHost(Rc<RefCell<HostState>>);

#[allow(dead_code)]
impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set geometry immediately: a resize that happened before the
    /// post-layout hook ran.
    pub fn set_metrics(&self, element: ElementKey, metrics: BoxMetrics) {
        self.0.borrow_mut().metrics.insert(element, metrics);
    }

    /// Stage geometry and mark layout dirty: a resize caused from inside a
    /// callback, visible only after the engine requests another layout pass.
    pub fn stage_metrics(&self, element: ElementKey, metrics: BoxMetrics) {
        let mut state = self.0.borrow_mut();
        state.staged.push((element, metrics));
        state.dirty = true;
    }

    pub fn layout_passes(&self) -> usize {
        self.0.borrow().layout_passes
    }
}

impl GeometryQuery for MockHost {
    fn current_metrics(&self, element: ElementKey) -> BoxMetrics {
        self.0.borrow().metrics.get(&element).copied().unwrap_or(BoxMetrics::ZERO)
    }
}

impl LayoutHost for MockHost {
    fn layout_dirty(&self) -> bool {
        self.0.borrow().dirty
    }

    fn run_layout(&mut self) {
        let mut state = self.0.borrow_mut();
        let staged = std::mem::take(&mut state.staged);
        for (element, metrics) in staged {
            state.metrics.insert(element, metrics);
        }
        state.dirty = false;
        state.layout_passes += 1;
    }
}

/// Square-ish metrics where every box layer tracks the offset size.
#[allow(dead_code)]
pub fn size(width: f64, height: f64) -> BoxMetrics {
    BoxMetrics::new(width, height, width, height, width, height, false)
}

/// Every batch a callback received, in delivery order.
pub type DeliveryLog = Rc<RefCell<Vec<Vec<ChangeRecord>>>>;

#[allow(dead_code)]
pub fn new_log() -> DeliveryLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Callback that records each batch and succeeds.
#[allow(dead_code)]
pub fn recording_callback(log: &DeliveryLog) -> BatchCallback {
    let log = Rc::clone(log);
    Box::new(move |records| {
        log.borrow_mut().push(records.to_vec());
        Ok(())
    })
}

#[allow(dead_code)]
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}
