//! Iteration driver: runs the controller over a program for many
//! iterations, feeding outcomes back into the strategy.
//!
//! The driver is an explicit phase machine: Prepare resets per-
//! iteration state and advances the strategy; Run executes the program
//! through the harness; Evaluate classifies the outcome; Advance
//! notifies the strategy and decides whether to continue; Done
//! finalizes the report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tangle_engine::controller::{Controller, IterationOutcome, RunArtifacts};
use tangle_engine::strategy::{self, ReplayStrategy, Strategy};
use tangle_engine::{Config, EngineError, ScheduleTrace};

use crate::harness::{MachineHarness, Program};
use crate::report::{RunResult, TestReport};

enum Phase {
    Prepare,
    Run,
    Evaluate,
    Advance,
    Done,
}

/// Summary of one finished iteration, with operation names resolved
/// while the controller was still alive.
struct Evaluated {
    artifacts: RunArtifacts,
    waiting_names: Vec<String>,
}

/// Drives iterations of one program under one strategy.
pub struct IterationDriver {
    config: Config,
    strategy: Option<Box<dyn Strategy>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl IterationDriver {
    /// Driver with the strategy selected by the configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let strategy = strategy::build(&config);
        Self {
            config,
            strategy: Some(strategy),
            cancel: None,
        }
    }

    /// Driver with an explicitly constructed strategy.
    #[must_use]
    pub fn with_strategy(config: Config, strategy: Box<dyn Strategy>) -> Self {
        Self {
            config,
            strategy: Some(strategy),
            cancel: None,
        }
    }

    /// Driver that replays one recorded schedule.
    #[must_use]
    pub fn for_replay(mut config: Config, schedule: ScheduleTrace) -> Self {
        config.iterations = 1;
        Self::with_strategy(config, Box::new(ReplayStrategy::new(schedule)))
    }

    /// Honor an external cancel flag (portfolio coordination).
    #[must_use]
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn canceled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Explore the program until a bug is found, the iteration budget
    /// runs out, or the strategy exhausts its search space.
    ///
    /// # Errors
    ///
    /// Returns an engine error (replay divergence, registration
    /// failure); user-program bugs are reported in the [`TestReport`],
    /// never as errors.
    pub fn run(&mut self, program: &Program) -> Result<TestReport, EngineError> {
        let description = self
            .strategy
            .as_ref()
            .map_or_else(String::new, |s| s.description());
        let mut report = TestReport::new(description);
        let mut iteration = 0usize;
        let mut evaluated: Option<Evaluated> = None;
        let mut bug_this_iteration = false;
        let mut phase = Phase::Prepare;

        loop {
            match phase {
                Phase::Prepare => {
                    if iteration >= self.config.iterations || self.canceled() {
                        phase = Phase::Done;
                        continue;
                    }
                    let strategy = self.strategy.as_mut().expect("strategy present");
                    if !strategy.prepare_for_next_iteration() {
                        report.search_exhausted = true;
                        phase = Phase::Done;
                        continue;
                    }
                    tracing::debug!(iteration, "starting iteration");
                    phase = Phase::Run;
                }
                Phase::Run => {
                    let strategy = self.strategy.take().expect("strategy present");
                    let controller = Arc::new(match &self.cancel {
                        Some(flag) => Controller::with_cancel(
                            self.config.clone(),
                            strategy,
                            Arc::clone(flag),
                        ),
                        None => Controller::new(self.config.clone(), strategy),
                    });

                    let run = MachineHarness::execute(Arc::clone(&controller), program);
                    self.strategy = controller.take_strategy();
                    run?;

                    let artifacts = controller.take_artifacts();
                    let waiting_names = match &artifacts.outcome {
                        IterationOutcome::Livelock { waiting, .. } => waiting
                            .iter()
                            .map(|op| controller.operation_name(*op))
                            .collect(),
                        _ => Vec::new(),
                    };
                    evaluated = Some(Evaluated {
                        artifacts,
                        waiting_names,
                    });
                    phase = Phase::Evaluate;
                }
                Phase::Evaluate => {
                    let Evaluated {
                        artifacts,
                        waiting_names,
                    } = evaluated.take().expect("artifacts present");

                    if let Some(err) = artifacts.engine_error {
                        return Err(err);
                    }

                    report.total_explored_steps += artifacts.steps;
                    report.max_explored_steps = report.max_explored_steps.max(artifacts.steps);

                    bug_this_iteration = artifacts.outcome.is_bug();
                    match artifacts.outcome {
                        IterationOutcome::Safety { message } => {
                            report.bugs_found += 1;
                            if report.bug_trace.is_none() {
                                report.result = RunResult::SafetyBugFound { message };
                                report.bug_trace = Some(artifacts.trace);
                                report.bug_schedule = Some(artifacts.schedule);
                            }
                        }
                        IterationOutcome::Livelock { message, .. } => {
                            report.bugs_found += 1;
                            if report.bug_trace.is_none() {
                                report.result = RunResult::LivenessBugFound {
                                    message,
                                    waiting: waiting_names,
                                };
                                report.bug_trace = Some(artifacts.trace);
                                report.bug_schedule = Some(artifacts.schedule);
                            }
                        }
                        IterationOutcome::DepthBound => {
                            report.depth_bound_hits += 1;
                        }
                        IterationOutcome::Clean
                        | IterationOutcome::Exhausted
                        | IterationOutcome::Canceled => {}
                    }
                    phase = Phase::Advance;
                }
                Phase::Advance => {
                    let strategy = self.strategy.as_mut().expect("strategy present");
                    strategy.notify_scheduling_ended(bug_this_iteration);
                    iteration += 1;
                    if bug_this_iteration && self.config.stop_on_first_bug {
                        phase = Phase::Done;
                    } else {
                        phase = Phase::Prepare;
                    }
                }
                Phase::Done => break,
            }
        }

        report.iterations = iteration;
        if !report.result.is_bug() && report.depth_bound_hits > 0 {
            report.result = RunResult::DepthBoundExceeded;
        }
        tracing::debug!(summary = %report.summary(), "run finished");
        Ok(report)
    }
}
