//! Engine-invariant errors.
//!
//! These are distinct from user-program bugs: a bug (assertion failure,
//! handler panic, livelock) is a *result* of a test run and is reported
//! through [`crate::controller::IterationOutcome`]. An `EngineError`
//! means the engine itself, its configuration, or a replay input is
//! broken, and terminates the whole run.

use thiserror::Error;

use crate::operation::OperationId;

/// Errors raised by the engine machinery itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// An operation id was registered twice. Indicates a runtime bug,
    /// not a user bug.
    #[error("operation {0} is already registered")]
    DuplicateOperation(OperationId),

    /// An operation id was referenced but never registered.
    #[error("operation {0} is not registered")]
    UnknownOperation(OperationId),

    /// A monitor id was referenced but never registered.
    #[error("monitor {0} is not registered")]
    UnknownMonitor(u64),

    /// A replayed schedule no longer matches the program's behavior.
    /// Reported distinctly, never counted as a found bug.
    #[error("replay diverged at decision {step}: {reason}")]
    ReplayDivergence {
        /// Index of the diverging decision.
        step: usize,
        /// What failed to match.
        reason: String,
    },

    /// A strategy reported exhaustion while an iteration was still in
    /// flight, in a context where that is not a legal answer.
    #[error("strategy '{strategy}' returned no choice at decision {step}")]
    StrategyStarved {
        /// Strategy description.
        strategy: String,
        /// Index of the failed decision.
        step: usize,
    },
}
