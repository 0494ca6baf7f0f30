//! Controller-level tests driving raw operation threads, without the
//! machine harness.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use tangle_engine::controller::{Controller, IterationOutcome};
use tangle_engine::strategy::RandomStrategy;
use tangle_engine::{Config, OperationStatus, Strategy};

fn random_strategy(seed: u64) -> Box<dyn Strategy> {
    let mut strategy = RandomStrategy::new(seed);
    assert!(strategy.prepare_for_next_iteration());
    Box::new(strategy)
}

#[test]
fn turn_handoff_serializes_two_raw_operations() {
    let controller = Arc::new(Controller::new(Config::default(), random_strategy(5)));
    let a = controller
        .create_operation("a", OperationStatus::Enabled, None)
        .unwrap();
    let b = controller
        .create_operation("b", OperationStatus::Enabled, None)
        .unwrap();

    let mut handles = Vec::new();
    for op in [a, b] {
        let ctrl = Arc::clone(&controller);
        handles.push(thread::spawn(move || {
            if ctrl.wait_for_turn(op).is_err() {
                return;
            }
            for _ in 0..10 {
                if ctrl.schedule(op).is_err() {
                    return;
                }
            }
            ctrl.operation_completed(op);
        }));
    }

    controller.start();
    let outcome = controller.wait_for_completion();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(outcome, IterationOutcome::Clean);
    // One initial grant, twenty explicit decision points, and one
    // hand-off when the first operation completes.
    let artifacts = controller.take_artifacts();
    assert_eq!(artifacts.steps, 22);
    assert_eq!(artifacts.schedule.len(), 22);
}

#[test]
fn at_most_one_operation_holds_the_turn() {
    let controller = Arc::new(Controller::new(Config::default(), random_strategy(11)));
    let running = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let ops: Vec<_> = (0..3)
        .map(|idx| {
            controller
                .create_operation(format!("op{idx}"), OperationStatus::Enabled, None)
                .unwrap()
        })
        .collect();

    let mut handles = Vec::new();
    for op in ops {
        let ctrl = Arc::clone(&controller);
        let running = Arc::clone(&running);
        let violations = Arc::clone(&violations);
        handles.push(thread::spawn(move || {
            if ctrl.wait_for_turn(op).is_err() {
                return;
            }
            for _ in 0..20 {
                // Critical section: between a grant and the next
                // hand-back, no other operation's code may run.
                if running.fetch_add(1, Ordering::SeqCst) != 0 {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                running.fetch_sub(1, Ordering::SeqCst);
                if ctrl.schedule(op).is_err() {
                    return;
                }
            }
            ctrl.operation_completed(op);
        }));
    }

    controller.start();
    let outcome = controller.wait_for_completion();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(outcome, IterationOutcome::Clean);
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn depth_bound_ends_the_iteration() {
    let config = Config {
        max_steps: 8,
        ..Config::default()
    };
    let controller = Arc::new(Controller::new(config, random_strategy(2)));
    let op = controller
        .create_operation("spinner", OperationStatus::Enabled, None)
        .unwrap();

    let ctrl = Arc::clone(&controller);
    let handle = thread::spawn(move || {
        if ctrl.wait_for_turn(op).is_err() {
            return;
        }
        while ctrl.schedule(op).is_ok() {}
    });

    controller.start();
    let outcome = controller.wait_for_completion();
    handle.join().unwrap();

    assert_eq!(outcome, IterationOutcome::DepthBound);
    assert_eq!(controller.take_artifacts().steps, 8);
}

#[test]
fn depth_bound_promotes_to_bug_when_configured() {
    let config = Config {
        max_steps: 4,
        depth_bound_is_bug: true,
        ..Config::default()
    };
    let controller = Arc::new(Controller::new(config, random_strategy(2)));
    let op = controller
        .create_operation("spinner", OperationStatus::Enabled, None)
        .unwrap();

    let ctrl = Arc::clone(&controller);
    let handle = thread::spawn(move || {
        if ctrl.wait_for_turn(op).is_err() {
            return;
        }
        while ctrl.schedule(op).is_ok() {}
    });

    controller.start();
    let outcome = controller.wait_for_completion();
    handle.join().unwrap();

    assert!(matches!(outcome, IterationOutcome::Safety { .. }));
}
