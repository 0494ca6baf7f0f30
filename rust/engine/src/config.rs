//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Exploration strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Uniform random scheduling, reseeded every iteration.
    Random,
    /// Exhaustive depth-first search with backtracking.
    Dfs,
    /// DFS restarted under a growing step ceiling.
    IterativeDeepeningDfs {
        /// Initial step ceiling, also the growth increment.
        initial_bound: usize,
    },
    /// Probabilistic concurrency testing with `priority_switches`
    /// randomly placed priority-change points.
    Pct {
        /// Number of priority-change points per iteration.
        priority_switches: usize,
    },
    /// FIFO-enabled order with up to `delay_bound` randomly placed
    /// extra turns.
    DelayBounding {
        /// Maximum delays injected per iteration.
        delay_bound: usize,
    },
}

impl StrategyKind {
    /// Short name for reports and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Dfs => "dfs",
            Self::IterativeDeepeningDfs { .. } => "iddfs",
            Self::Pct { .. } => "pct",
            Self::DelayBounding { .. } => "delay-bounding",
        }
    }
}

/// Configuration of one exploration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Strategy driving the exploration.
    pub strategy: StrategyKind,
    /// Iteration budget.
    pub iterations: usize,
    /// Per-iteration scheduling-step ceiling; zero disables the bound.
    pub max_steps: usize,
    /// Master random seed; all randomized strategies derive from it.
    pub seed: u64,
    /// Stop at the first bug (default) or keep exploring past it.
    pub stop_on_first_bug: bool,
    /// Liveness checking on/off.
    pub liveness_checking: bool,
    /// Fingerprint-recurrence (lasso) detection on/off. The degenerate
    /// all-blocked check runs regardless.
    pub cache_program_state: bool,
    /// Report a depth-bound hit as a bug instead of a separate outcome.
    pub depth_bound_is_bug: bool,
    /// Portfolio width; zero runs a single driver.
    pub portfolio_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Random,
            iterations: 100,
            max_steps: 10_000,
            seed: 0,
            stop_on_first_bug: true,
            liveness_checking: true,
            cache_program_state: false,
            depth_bound_is_bug: false,
            portfolio_size: 0,
        }
    }
}

impl Config {
    /// Configuration with a given strategy and defaults elsewhere.
    #[must_use]
    pub fn with_strategy(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_stop_on_first_bug() {
        let config = Config::default();
        assert!(config.stop_on_first_bug);
        assert!(config.liveness_checking);
        assert!(!config.cache_program_state);
        assert_eq!(config.strategy.name(), "random");
    }
}
