//! Operation: one schedulable unit of concurrent execution.
//!
//! Each actor instance or background task registers exactly one operation.
//! The controller grants turns to operations; everything else about the
//! actor (its queue, its handlers) stays on the runtime side of the
//! boundary.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Unique, creation-ordered operation identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op({})", self.0)
    }
}

/// Scheduling status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Has work to do and may be granted a turn.
    Enabled,
    /// Waiting for an event to arrive.
    BlockedOnReceive,
    /// Waiting for a set of operations to all complete.
    BlockedOnWaitAll,
    /// Waiting for any one of a set of operations to complete.
    BlockedOnWaitAny,
    /// Finished; never scheduled again.
    Completed,
}

impl OperationStatus {
    /// Whether the operation may be granted a turn.
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }

    /// Whether the operation is parked on some wait condition.
    #[must_use]
    pub fn is_blocked(self) -> bool {
        matches!(
            self,
            Self::BlockedOnReceive | Self::BlockedOnWaitAll | Self::BlockedOnWaitAny
        )
    }
}

/// The kind of the last (or next) visible action of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Initial action after creation.
    Start,
    /// Enqueued an event to another operation.
    Send,
    /// Dequeued or explicitly received an event.
    Receive,
    /// Raised an event to itself.
    Raise,
    /// Transitioned to a new state.
    GotoState,
    /// Invoked a user action.
    InvokeAction,
    /// Resolved a nondeterministic choice.
    RandomChoice,
    /// Halted.
    Halt,
}

/// Read-only view into the runtime entity behind an operation.
///
/// Used for state names in trace steps and for global-state
/// fingerprinting. Never used for control: the controller commands
/// operations through their signals only.
pub trait StateSource: Send + Sync {
    /// Current state name of the backing actor.
    fn state_name(&self) -> String;

    /// Deterministic hash of the backing actor's observable state
    /// (state name plus queued event names).
    fn state_hash(&self) -> u64;
}

/// One schedulable unit tracked by the registry.
pub struct Operation {
    /// Unique id, assigned in creation order.
    pub id: OperationId,
    /// Human-readable name for reports and logs.
    pub name: String,
    /// Current scheduling status.
    pub status: OperationStatus,
    /// Kind of the last visible action.
    pub last_action: ActionKind,
    /// Back-reference for status/fingerprint queries only.
    pub source: Option<Arc<dyn StateSource>>,
}

impl Operation {
    /// Create an operation in the given initial status.
    #[must_use]
    pub fn new(
        id: OperationId,
        name: impl Into<String>,
        status: OperationStatus,
        source: Option<Arc<dyn StateSource>>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            last_action: ActionKind::Start,
            source,
        }
    }

    /// State name from the backing source, or the operation name when
    /// no source was registered.
    #[must_use]
    pub fn state_name(&self) -> String {
        self.source
            .as_ref()
            .map_or_else(|| self.name.clone(), |source| source.state_name())
    }

    /// State hash from the backing source, or zero.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.source.as_ref().map_or(0, |source| source.state_hash())
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("last_action", &self.last_action)
            .finish_non_exhaustive()
    }
}
