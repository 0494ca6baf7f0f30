//! Schedule trace: the sequence of scheduling decisions of one
//! iteration.
//!
//! This is the replay artifact. Feeding a recorded schedule trace back
//! through the replay strategy reproduces the same machine-event trace,
//! step for step, for programs with no external nondeterminism.

use serde::{Deserialize, Serialize};

use crate::operation::OperationId;

/// One decision made by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// An operation was granted the turn.
    Operation {
        /// Granted operation.
        id: OperationId,
        /// The ordered alternatives that were available.
        alternatives: Vec<OperationId>,
    },
    /// A nondeterministic boolean was resolved.
    Boolean(bool),
    /// A nondeterministic bounded integer was resolved.
    Integer {
        /// Chosen value.
        value: u64,
        /// Exclusive upper bound of the domain.
        max: u64,
    },
}

/// An immutable decision record with its step index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDecision {
    /// Monotonically increasing step index, contiguous from zero.
    pub index: usize,
    /// The decision payload.
    pub decision: Decision,
}

/// The ordered decision sequence of one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTrace {
    decisions: Vec<ScheduleDecision>,
}

impl ScheduleTrace {
    /// Create an empty schedule trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a scheduling choice.
    pub fn push_operation(&mut self, id: OperationId, alternatives: Vec<OperationId>) {
        let index = self.decisions.len();
        self.decisions.push(ScheduleDecision {
            index,
            decision: Decision::Operation { id, alternatives },
        });
    }

    /// Record a boolean choice.
    pub fn push_boolean(&mut self, value: bool) {
        let index = self.decisions.len();
        self.decisions.push(ScheduleDecision {
            index,
            decision: Decision::Boolean(value),
        });
    }

    /// Record an integer choice.
    pub fn push_integer(&mut self, value: u64, max: u64) {
        let index = self.decisions.len();
        self.decisions.push(ScheduleDecision {
            index,
            decision: Decision::Integer { value, max },
        });
    }

    /// Decision at an index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ScheduleDecision> {
        self.decisions.get(index)
    }

    /// Number of decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    /// Whether no decisions were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Iterate decisions in order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduleDecision> {
        self.decisions.iter()
    }

    /// Serialize to the JSON replay format.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from the JSON replay format.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error for malformed input.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_contiguous() {
        let mut trace = ScheduleTrace::new();
        trace.push_operation(OperationId(0), vec![OperationId(0), OperationId(1)]);
        trace.push_boolean(true);
        trace.push_integer(2, 5);

        let indices: Vec<usize> = trace.iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_json_round_trip() {
        let mut trace = ScheduleTrace::new();
        trace.push_operation(OperationId(1), vec![OperationId(0), OperationId(1)]);
        trace.push_boolean(false);

        let json = trace.to_json().expect("serialize");
        let back = ScheduleTrace::from_json(&json).expect("deserialize");
        assert_eq!(back, trace);
    }
}
