//! Determinism and replay: a recorded schedule reproduces the same
//! trace step for step, and divergence is an engine error, not a bug.

use std::sync::Arc;

use tangle_engine::controller::{Controller, IterationOutcome};
use tangle_engine::strategy::RandomStrategy;
use tangle_engine::{Config, EngineError, ScheduleTrace, Strategy, StrategyKind};
use tangle_tester::{programs, IterationDriver, MachineHarness, RunResult};

fn dfs_config() -> Config {
    Config {
        strategy: StrategyKind::Dfs,
        iterations: 1000,
        max_steps: 100,
        ..Config::default()
    }
}

#[test]
fn fixed_seed_runs_are_identical() {
    let run = || {
        let mut strategy = RandomStrategy::new(42);
        assert!(strategy.prepare_for_next_iteration());
        let controller = Arc::new(Controller::new(Config::default(), Box::new(strategy)));
        MachineHarness::execute(Arc::clone(&controller), &programs::ping_pong()).unwrap();
        controller.take_artifacts()
    };

    let first = run();
    let second = run();
    assert_eq!(first.outcome, IterationOutcome::Clean);
    assert_eq!(first.schedule, second.schedule);
    assert_eq!(first.trace, second.trace);
}

#[test]
fn dfs_finds_the_race_and_replay_reproduces_it() {
    // Record: exhaustive search deterministically reaches the buggy
    // interleaving of the racy program.
    let mut driver = IterationDriver::new(dfs_config());
    let report = driver.run(&programs::racy_flag()).unwrap();

    let RunResult::SafetyBugFound { message } = &report.result else {
        panic!("expected a safety bug, got {:?}", report.result);
    };
    assert!(message.contains("'Two' arrived before 'One'"));
    let recorded_trace = report.bug_trace.clone().expect("bug trace");
    let recorded_schedule = report.bug_schedule.clone().expect("bug schedule");

    // Replay: the same decisions produce the identical trace.
    let mut replay_driver =
        IterationDriver::for_replay(Config::default(), recorded_schedule.clone());
    let replay_report = replay_driver.run(&programs::racy_flag()).unwrap();

    assert!(matches!(
        replay_report.result,
        RunResult::SafetyBugFound { .. }
    ));
    assert_eq!(replay_report.iterations, 1);
    let replayed_trace = replay_report.bug_trace.expect("replayed trace");
    assert_eq!(replayed_trace, recorded_trace);
    assert_eq!(
        replay_report.bug_schedule.expect("replayed schedule"),
        recorded_schedule
    );
}

#[test]
fn schedule_survives_its_json_round_trip() {
    let mut driver = IterationDriver::new(dfs_config());
    let report = driver.run(&programs::racy_flag()).unwrap();
    let schedule = report.bug_schedule.expect("bug schedule");

    let json = schedule.to_json().unwrap();
    let reloaded = ScheduleTrace::from_json(&json).unwrap();
    assert_eq!(reloaded, schedule);

    let mut replay_driver = IterationDriver::for_replay(Config::default(), reloaded);
    let replay_report = replay_driver.run(&programs::racy_flag()).unwrap();
    assert!(replay_report.result.is_bug());
}

#[test]
fn replaying_a_wrong_kind_of_decision_is_a_divergence_error() {
    // A schedule whose first branching record is a boolean cannot drive
    // ping-pong, whose first branching decision schedules an operation.
    let mut schedule = ScheduleTrace::new();
    schedule.push_boolean(true);

    let mut driver = IterationDriver::for_replay(Config::default(), schedule);
    let err = driver.run(&programs::ping_pong()).unwrap_err();
    let EngineError::ReplayDivergence { reason, .. } = err else {
        panic!("expected a replay divergence, got {err}");
    };
    assert!(reason.contains("not a scheduling choice"));
}

#[test]
fn replaying_a_truncated_schedule_is_a_divergence_error() {
    let mut driver = IterationDriver::for_replay(Config::default(), ScheduleTrace::new());
    let err = driver.run(&programs::ping_pong()).unwrap_err();
    let EngineError::ReplayDivergence { reason, .. } = err else {
        panic!("expected a replay divergence, got {err}");
    };
    assert!(reason.contains("longer than the recorded schedule"));
}
