mod common;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::anyhow;
use common::{MockHost, init_logs, new_log, recording_callback, size};
use geometry::ElementKey;
use resize_notifier::{BatchCallback, NotifyScheduler, ObserverOptions};

/// Callback that records batches but fails its first `failures` invocations.
fn flaky_callback(log: &common::DeliveryLog, failures: usize) -> BatchCallback {
    let log = Rc::clone(log);
    let invocations = Rc::new(RefCell::new(0usize));
    Box::new(move |records| {
        let mut count = invocations.borrow_mut();
        *count += 1;
        log.borrow_mut().push(records.to_vec());
        if *count <= failures {
            Err(anyhow!("simulated application failure #{count}"))
        } else {
            Ok(())
        }
    })
}

#[test]
fn failing_callback_does_not_block_sibling_observers() {
    init_logs();
    let mut host = MockHost::new();
    let element = ElementKey(1);
    host.set_metrics(element, size(100.0, 100.0));

    let mut engine = NotifyScheduler::default();
    let flaky_log = new_log();
    let healthy_log = new_log();
    let flaky = engine.observer(flaky_callback(&flaky_log, usize::MAX), ObserverOptions::default());
    let healthy = engine.observer(recording_callback(&healthy_log), ObserverOptions::default());
    flaky.observe(element);
    healthy.observe(element);

    engine.run_frame(&mut host);
    // Both ran in the same pass; the failure never reached the sibling.
    assert_eq!(flaky_log.borrow().len(), 1);
    assert_eq!(healthy_log.borrow().len(), 1);

    // The failed delivery left the snapshot stale, so the change is
    // re-detected and re-attempted; the healthy observer stays settled.
    engine.run_frame(&mut host);
    assert_eq!(flaky_log.borrow().len(), 2);
    assert_eq!(healthy_log.borrow().len(), 1);
    assert!(engine.registry().last_delivered(flaky.id(), element).is_none());
    assert!(engine.registry().last_delivered(healthy.id(), element).is_some());
}

#[test]
fn snapshot_commits_only_after_callback_succeeds() {
    init_logs();
    let mut host = MockHost::new();
    let element = ElementKey(1);
    host.set_metrics(element, size(100.0, 100.0));

    let mut engine = NotifyScheduler::default();
    let log = new_log();
    let observer = engine.observer(flaky_callback(&log, 1), ObserverOptions::default());
    observer.observe(element);

    // Frame 1 fails: no commit.
    engine.run_frame(&mut host);
    assert!(engine.registry().last_delivered(observer.id(), element).is_none());

    // Frame 2 succeeds with the same record: committed, then settled.
    engine.run_frame(&mut host);
    assert_eq!(engine.registry().last_delivered(observer.id(), element), Some(size(100.0, 100.0)));
    engine.run_frame(&mut host);

    let batches = log.borrow();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0], batches[1]);
}

#[test]
fn callback_failures_are_not_reported_to_error_handlers() {
    init_logs();
    let mut host = MockHost::new();
    let element = ElementKey(1);
    host.set_metrics(element, size(100.0, 100.0));

    let mut engine = NotifyScheduler::default();
    let log = new_log();
    let errors = Rc::new(RefCell::new(0usize));
    let errors_for_handler = Rc::clone(&errors);
    let observer = engine.observer(
        flaky_callback(&log, 1),
        ObserverOptions {
            error_handler: Some(Box::new(move |_error, _outstanding| {
                *errors_for_handler.borrow_mut() += 1;
            })),
        },
    );
    observer.observe(element);

    engine.run_frame(&mut host);
    engine.run_frame(&mut host);
    // Error handlers are reserved for iteration-cap overflows.
    assert_eq!(*errors.borrow(), 0);
    assert_eq!(log.borrow().len(), 2);
}
