//! Error broadcasting on iteration-cap overflow.
//!
//! Every registered error handler across every observer instance is invoked
//! with the same descriptor and outstanding-record payload, whether or not
//! that observer's own elements are implicated. Most applications register
//! no handler; the ones that do are typically framework authors hunting
//! misbehaving child components, so global visibility is the point.

use log::warn;

use crate::registry::ObservationRegistry;
use crate::{ChangeRecord, NotifyLoopError};

/// Notify all registered error handlers of a cap overflow. Returns how many
/// handlers were invoked.
pub(crate) fn broadcast_cap_exceeded(
    registry: &mut ObservationRegistry,
    error: &NotifyLoopError,
    outstanding: &[ChangeRecord],
) -> usize {
    let mut notified = 0usize;
    for slot in registry.slots_mut() {
        if let Some(handler) = slot.error_handler_mut() {
            handler(error, outstanding);
            notified += 1;
        }
    }
    warn!(
        "{error}; notified {notified} error handler(s), {} record(s) deferred to next frame",
        outstanding.len()
    );
    notified
}
