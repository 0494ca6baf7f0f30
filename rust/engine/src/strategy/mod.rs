//! Pluggable exploration strategies.
//!
//! Every nondeterministic decision of a run is resolved by the active
//! strategy: which enabled operation runs next, and which value a
//! boolean/integer choice takes. Strategies own their mutable search
//! state and advance it between iterations.

mod delay;
mod dfs;
mod pct;
mod random;
mod replay;

pub use delay::DelayBoundingStrategy;
pub use dfs::{DfsStrategy, IterativeDeepeningDfsStrategy};
pub use pct::PctStrategy;
pub use random::RandomStrategy;
pub use replay::ReplayStrategy;

use crate::config::{Config, StrategyKind};
use crate::operation::OperationId;

/// A choice strategy.
///
/// `None` from a decision method means the strategy cannot answer:
/// either its search space is exhausted mid-iteration (DFS tails) or a
/// replay diverged (reported through [`Strategy::divergence`]). The
/// controller ends the iteration in both cases.
pub trait Strategy: Send {
    /// Pick the next operation from the enabled set.
    ///
    /// `enabled` is non-empty and ordered by operation creation;
    /// `current` is the operation that reached the decision point.
    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        current: OperationId,
    ) -> Option<OperationId>;

    /// Resolve a nondeterministic boolean over a domain of `max_value`
    /// outcomes (true iff the draw lands on zero).
    fn next_boolean(&mut self, max_value: u64) -> Option<bool>;

    /// Resolve a nondeterministic integer in `[0, max_value)`.
    fn next_integer(&mut self, max_value: u64) -> Option<u64>;

    /// Advance to the next iteration. Returns false once the search
    /// space is exhausted.
    fn prepare_for_next_iteration(&mut self) -> bool;

    /// Told at the end of every iteration whether it found a bug.
    fn notify_scheduling_ended(&mut self, bug_found: bool);

    /// Strategy-imposed per-iteration step ceiling, if any (IDDFS).
    fn step_limit(&self) -> Option<usize> {
        None
    }

    /// Whether the strategy schedules fairly in the long run.
    fn is_fair(&self) -> bool {
        false
    }

    /// Replay-divergence detail, when a replay strategy refused a
    /// decision. Engine-internal error, never a found bug.
    fn divergence(&self) -> Option<String> {
        None
    }

    /// Textual description for reports and engine errors.
    fn description(&self) -> String;
}

/// Build the strategy selected by a configuration.
#[must_use]
pub fn build(config: &Config) -> Box<dyn Strategy> {
    match config.strategy {
        StrategyKind::Random => Box::new(RandomStrategy::new(config.seed)),
        StrategyKind::Dfs => Box::new(DfsStrategy::new()),
        StrategyKind::IterativeDeepeningDfs { initial_bound } => Box::new(
            IterativeDeepeningDfsStrategy::new(initial_bound, config.max_steps),
        ),
        StrategyKind::Pct { priority_switches } => {
            Box::new(PctStrategy::new(config.seed, priority_switches))
        }
        StrategyKind::DelayBounding { delay_bound } => {
            Box::new(DelayBoundingStrategy::new(config.seed, delay_bound))
        }
    }
}
