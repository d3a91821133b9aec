//! Box geometry primitives shared across the resize notification engine.
//!
//! The engine never computes geometry itself; the host layout pipeline owns
//! that. This crate defines the measured snapshot exchanged at the boundary
//! and the query capability the host must provide.

// ============================
// Stable element keys (shared across subsystems)
// ============================

/// A 64-bit stable key identifying one observable element in the host tree.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ElementKey(pub u64);

/// Measured box dimensions of one element at one point in time.
///
/// Immutable once captured; the engine replaces a stored snapshot wholesale
/// at delivery time, never field by field. All-zero sizes are a valid state
/// (the element became invisible, or is inline and reports no box).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoxMetrics {
    /// Content size plus border, padding, and scrollbar (width).
    pub offset_width: f64,
    /// Content size plus border, padding, and scrollbar (height).
    pub offset_height: f64,
    /// Border-box width.
    pub border_width: f64,
    /// Border-box height.
    pub border_height: f64,
    /// Padding-box width.
    pub padding_width: f64,
    /// Padding-box height.
    pub padding_height: f64,
    /// Whether the measurement was taken while an animation was running on a
    /// watched property. Not part of size equality.
    pub is_animation: bool,
}

impl BoxMetrics {
    /// Snapshot with all six sizes at zero and no animation.
    pub const ZERO: BoxMetrics = BoxMetrics {
        offset_width: 0.0,
        offset_height: 0.0,
        border_width: 0.0,
        border_height: 0.0,
        padding_width: 0.0,
        padding_height: 0.0,
        is_animation: false,
    };

    /// Construct a snapshot, clamping negative inputs to zero.
    /// Sizes are non-negative by contract; hosts reporting transient negative
    /// values (e.g. mid-layout) are normalized rather than rejected.
    #[must_use]
    pub fn new(
        offset_width: f64,
        offset_height: f64,
        border_width: f64,
        border_height: f64,
        padding_width: f64,
        padding_height: f64,
        is_animation: bool,
    ) -> Self {
        Self {
            offset_width: offset_width.max(0.0),
            offset_height: offset_height.max(0.0),
            border_width: border_width.max(0.0),
            border_height: border_height.max(0.0),
            padding_width: padding_width.max(0.0),
            padding_height: padding_height.max(0.0),
            is_animation,
        }
    }

    /// Compare the six numeric fields only. `is_animation` is metadata and
    /// must not, on its own, make two snapshots unequal for change detection.
    #[must_use]
    pub fn same_size(&self, other: &BoxMetrics) -> bool {
        self.offset_width == other.offset_width
            && self.offset_height == other.offset_height
            && self.border_width == other.border_width
            && self.border_height == other.border_height
            && self.padding_width == other.padding_width
            && self.padding_height == other.padding_height
    }

    /// True if all six sizes are zero (invisible or inline element).
    #[must_use]
    pub fn is_zero_size(&self) -> bool {
        self.same_size(&Self::ZERO)
    }
}

/// Capability to read the current box metrics of an element.
///
/// Implemented by the host layout pipeline; must reflect the latest
/// style/layout state at call time.
pub trait GeometryQuery {
    /// Current metrics for `element`. Elements without a laid-out box
    /// (including inline elements) report [`BoxMetrics::ZERO`].
    fn current_metrics(&self, element: ElementKey) -> BoxMetrics;
}
