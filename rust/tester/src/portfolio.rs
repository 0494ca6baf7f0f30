//! Portfolio coordinator: race several drivers with different
//! strategies and seeds; the first bug cancels the rest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use tangle_engine::strategy::{
    DelayBoundingStrategy, PctStrategy, RandomStrategy, Strategy,
};
use tangle_engine::{Config, EngineError};

use crate::driver::IterationDriver;
use crate::harness::Program;
use crate::report::TestReport;

/// Seed spacing between portfolio members.
const MEMBER_SEED_STRIDE: u64 = 0x0123_4567_89ab_cdef;

/// Runs independent iteration drivers on their own threads.
pub struct PortfolioCoordinator {
    config: Config,
}

impl PortfolioCoordinator {
    /// Create a coordinator; `config.portfolio_size` members run, at
    /// least one.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// The per-member strategy lineup: random scheduling first, then
    /// alternating PCT depths and delay bounding, each member on its
    /// own derived seed.
    fn member_strategy(config: &Config, member: usize) -> Box<dyn Strategy> {
        let seed = config
            .seed
            .wrapping_add(MEMBER_SEED_STRIDE.wrapping_mul(member as u64 + 1));
        match member % 4 {
            0 => Box::new(RandomStrategy::new(seed)),
            1 => Box::new(PctStrategy::new(seed, 3)),
            2 => Box::new(PctStrategy::new(seed, 10)),
            _ => Box::new(DelayBoundingStrategy::new(seed, 2)),
        }
    }

    /// Race the members over the program; the first member to report a
    /// bug wins and the others are canceled. Canceled members' partial
    /// traces are discarded.
    ///
    /// # Errors
    ///
    /// Returns the first engine error if no member produced a report.
    pub fn run(&self, program: &Program) -> Result<TestReport, EngineError> {
        let size = self.config.portfolio_size.max(1);
        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::channel::<(usize, Result<TestReport, EngineError>)>();

        let mut handles = Vec::with_capacity(size);
        for member in 0..size {
            let config = self.config.clone();
            let program = program.clone();
            let cancel = Arc::clone(&cancel);
            let sender = sender.clone();
            let handle = thread::Builder::new()
                .name(format!("portfolio-{member}"))
                .spawn(move || {
                    let strategy = Self::member_strategy(&config, member);
                    tracing::debug!(member, strategy = %strategy.description(), "portfolio member started");
                    let mut driver =
                        IterationDriver::with_strategy(config, strategy).with_cancel(cancel);
                    let result = driver.run(&program);
                    let _ = sender.send((member, result));
                })
                .expect("portfolio thread spawn failed");
            handles.push(handle);
        }
        drop(sender);

        let mut winner: Option<TestReport> = None;
        let mut fallback: Option<TestReport> = None;
        let mut first_error: Option<EngineError> = None;

        while let Ok((member, result)) = receiver.recv() {
            match result {
                Ok(report) if report.result.is_bug() => {
                    tracing::debug!(member, "portfolio member found a bug; canceling siblings");
                    cancel.store(true, Ordering::Relaxed);
                    if winner.is_none() {
                        winner = Some(report);
                    }
                }
                Ok(report) => {
                    if fallback.is_none() {
                        fallback = Some(report);
                    }
                }
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        for handle in handles {
            let _ = handle.join();
        }

        if let Some(report) = winner.or(fallback) {
            return Ok(report);
        }
        Err(first_error.expect("no report and no error from any portfolio member"))
    }
}
