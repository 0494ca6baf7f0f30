//! End-to-end exploration of the ping-pong program.
//!
//! Sends are mandatory hand-backs, so ping-pong has two branch points
//! (after each send: the sender keeps the turn or the receiver runs):
//! four distinct interleavings, all clean.

use std::sync::Arc;

use tangle_engine::controller::{Controller, IterationOutcome};
use tangle_engine::strategy::{DfsStrategy, Strategy};
use tangle_engine::trace::TraceStepKind;
use tangle_engine::{Config, StrategyKind};
use tangle_tester::{programs, IterationDriver, MachineHarness, RunResult};

fn dfs_config() -> Config {
    Config {
        strategy: StrategyKind::Dfs,
        iterations: 64,
        max_steps: 100,
        ..Config::default()
    }
}

#[test]
fn dfs_explores_ping_pong_completely() {
    let mut driver = IterationDriver::new(dfs_config());
    let report = driver.run(&programs::ping_pong()).unwrap();

    assert_eq!(report.result, RunResult::NoBugFound);
    assert_eq!(report.bugs_found, 0);
    assert_eq!(report.iterations, 4);
    assert!(report.search_exhausted);
    assert_eq!(report.depth_bound_hits, 0);
}

#[test]
fn dfs_never_explores_an_interleaving_twice() {
    let program = programs::ping_pong();
    let mut strategy: Box<dyn Strategy> = Box::new(DfsStrategy::new());
    let mut schedules = Vec::new();

    loop {
        if !strategy.prepare_for_next_iteration() {
            break;
        }
        let controller = Arc::new(Controller::new(dfs_config(), strategy));
        MachineHarness::execute(Arc::clone(&controller), &program).unwrap();
        strategy = controller.take_strategy().expect("strategy returned");

        let artifacts = controller.take_artifacts();
        assert_eq!(artifacts.outcome, IterationOutcome::Clean);
        schedules.push(artifacts.schedule);
        assert!(schedules.len() <= 16, "dfs failed to exhaust");
    }

    assert_eq!(schedules.len(), 4);
    for (i, left) in schedules.iter().enumerate() {
        for right in schedules.iter().skip(i + 1) {
            assert_ne!(left, right, "an interleaving was explored twice");
        }
    }
}

#[test]
fn first_dfs_interleaving_has_the_canonical_trace() {
    let program = programs::ping_pong();
    let mut strategy = DfsStrategy::new();
    assert!(strategy.prepare_for_next_iteration());

    let controller = Arc::new(Controller::new(dfs_config(), Box::new(strategy)));
    MachineHarness::execute(Arc::clone(&controller), &program).unwrap();
    let artifacts = controller.take_artifacts();

    assert_eq!(artifacts.outcome, IterationOutcome::Clean);
    let trace = artifacts.trace;
    assert!(trace.is_consistent());

    let shape: Vec<(String, &TraceStepKind)> = trace
        .iter()
        .map(|step| (step.op_name.clone(), &step.kind))
        .collect();
    assert_eq!(trace.len(), 7);

    assert_eq!(shape[0].0, "A");
    assert!(matches!(
        shape[0].1,
        TraceStepKind::SendEvent { event, .. } if event == "Ping"
    ));
    assert_eq!(shape[1].0, "A");
    assert!(matches!(
        shape[1].1,
        TraceStepKind::WaitToReceive { event } if event == "Pong"
    ));
    assert_eq!(shape[2].0, "B");
    assert!(matches!(
        shape[2].1,
        TraceStepKind::DequeueEvent { event } if event == "Ping"
    ));
    assert_eq!(shape[3].0, "B");
    assert!(matches!(
        shape[3].1,
        TraceStepKind::SendEvent { event, .. } if event == "Pong"
    ));
    assert_eq!(shape[4].0, "A");
    assert!(matches!(
        shape[4].1,
        TraceStepKind::ReceiveEvent { event } if event == "Pong"
    ));
    assert_eq!(shape[5].0, "A");
    assert!(matches!(shape[5].1, TraceStepKind::Halt));
    assert_eq!(shape[6].0, "B");
    assert!(matches!(shape[6].1, TraceStepKind::Halt));

    // The visualization document keeps exactly the two sends.
    let export = trace.export_sends();
    assert_eq!(export.sends.len(), 2);
    assert_eq!(export.sends[0].sender, "A");
    assert_eq!(export.sends[0].receiver, "B");
    assert_eq!(export.sends[0].event, "Ping");
    assert_eq!(export.sends[1].sender, "B");
    assert_eq!(export.sends[1].receiver, "A");
    assert_eq!(export.sends[1].event, "Pong");
}

#[test]
fn random_exploration_of_ping_pong_stays_clean() {
    let config = Config {
        strategy: StrategyKind::Random,
        iterations: 25,
        seed: 3,
        ..Config::default()
    };
    let mut driver = IterationDriver::new(config);
    let report = driver.run(&programs::ping_pong()).unwrap();
    assert_eq!(report.result, RunResult::NoBugFound);
    assert_eq!(report.iterations, 25);
}
