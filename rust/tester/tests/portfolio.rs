//! Portfolio coordination: members race, the first bug wins, and the
//! siblings are canceled.

use tangle_engine::{Config, StrategyKind};
use tangle_tester::{programs, PortfolioCoordinator, RunResult};

#[test]
fn portfolio_finds_the_race_and_cancels_the_rest() {
    let config = Config {
        strategy: StrategyKind::Random,
        iterations: 200,
        seed: 17,
        portfolio_size: 4,
        ..Config::default()
    };
    let coordinator = PortfolioCoordinator::new(config);
    let report = coordinator.run(&programs::racy_flag()).unwrap();

    let RunResult::SafetyBugFound { message } = &report.result else {
        panic!("expected a safety bug, got {:?}", report.result);
    };
    assert!(message.contains("'Two' arrived before 'One'"));
    assert!(report.bug_schedule.is_some());
}

#[test]
fn portfolio_on_a_clean_program_reports_no_bug() {
    let config = Config {
        strategy: StrategyKind::Random,
        iterations: 10,
        seed: 23,
        portfolio_size: 3,
        ..Config::default()
    };
    let coordinator = PortfolioCoordinator::new(config);
    let report = coordinator.run(&programs::ping_pong()).unwrap();
    assert_eq!(report.result, RunResult::NoBugFound);
}

#[test]
fn portfolio_of_one_degenerates_to_a_single_driver() {
    let config = Config {
        strategy: StrategyKind::Random,
        iterations: 5,
        portfolio_size: 1,
        ..Config::default()
    };
    let coordinator = PortfolioCoordinator::new(config);
    let report = coordinator.run(&programs::blocked_trio()).unwrap();
    assert!(matches!(report.result, RunResult::LivenessBugFound { .. }));
}
