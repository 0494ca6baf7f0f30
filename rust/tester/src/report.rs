//! Run results and coverage reporting.

use serde::{Deserialize, Serialize};

use tangle_engine::{ScheduleTrace, Trace};

/// Final verdict of one exploration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunResult {
    /// Every explored iteration completed clean.
    NoBugFound,
    /// An assertion failed or actor code panicked.
    SafetyBugFound {
        /// Human-readable bug description.
        message: String,
    },
    /// A livelock was detected.
    LivenessBugFound {
        /// Human-readable bug description.
        message: String,
        /// Names of the operations that were waiting.
        waiting: Vec<String>,
    },
    /// No bug, but at least one iteration hit the depth bound, so the
    /// program was not fully explored.
    DepthBoundExceeded,
}

impl RunResult {
    /// Whether this result is a found bug.
    #[must_use]
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            Self::SafetyBugFound { .. } | Self::LivenessBugFound { .. }
        )
    }
}

/// Aggregated outcome of one exploration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// Description of the strategy that drove the run.
    pub strategy: String,
    /// Final verdict.
    pub result: RunResult,
    /// Iterations executed.
    pub iterations: usize,
    /// Bugs encountered (can exceed one under full exploration).
    pub bugs_found: usize,
    /// Longest decision sequence over all iterations.
    pub max_explored_steps: usize,
    /// Total decisions over all iterations.
    pub total_explored_steps: usize,
    /// Iterations that hit the depth bound.
    pub depth_bound_hits: usize,
    /// Whether the strategy exhausted its search space.
    pub search_exhausted: bool,
    /// Machine-event trace of the first bug, for human-readable
    /// reports and visualization.
    pub bug_trace: Option<Trace>,
    /// Decision sequence of the first bug, for replay.
    pub bug_schedule: Option<ScheduleTrace>,
}

impl TestReport {
    /// An empty report for a strategy.
    #[must_use]
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            result: RunResult::NoBugFound,
            iterations: 0,
            bugs_found: 0,
            max_explored_steps: 0,
            total_explored_steps: 0,
            depth_bound_hits: 0,
            search_exhausted: false,
            bug_trace: None,
            bug_schedule: None,
        }
    }

    /// One-line human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let verdict = match &self.result {
            RunResult::NoBugFound => "no bug found".to_string(),
            RunResult::SafetyBugFound { message } => format!("safety bug: {message}"),
            RunResult::LivenessBugFound { message, .. } => format!("liveness bug: {message}"),
            RunResult::DepthBoundExceeded => "depth bound exceeded".to_string(),
        };
        format!(
            "{verdict} ({} iterations, {} max steps, strategy: {})",
            self.iterations, self.max_explored_steps, self.strategy
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_classification() {
        assert!(!RunResult::NoBugFound.is_bug());
        assert!(!RunResult::DepthBoundExceeded.is_bug());
        assert!(RunResult::SafetyBugFound {
            message: "x".into()
        }
        .is_bug());
        assert!(RunResult::LivenessBugFound {
            message: "x".into(),
            waiting: vec![]
        }
        .is_bug());
    }

    #[test]
    fn test_summary_mentions_strategy() {
        let report = TestReport::new("random, seed 3");
        assert!(report.summary().contains("random, seed 3"));
        assert!(report.summary().contains("no bug found"));
    }
}
