//! Replay of a recorded schedule.
//!
//! Consumes a previously recorded decision sequence in order and
//! asserts at every step that the program still permits the recorded
//! decision. A mismatch means the program's behavior is no longer
//! reproducible (for example after a code change); it is reported as a
//! replay divergence, a distinct engine error, never as a found bug.

use crate::operation::OperationId;
use crate::schedule_trace::{Decision, ScheduleTrace};
use crate::strategy::Strategy;

/// Strategy that re-executes a recorded schedule.
pub struct ReplayStrategy {
    trace: ScheduleTrace,
    cursor: usize,
    divergence: Option<String>,
    started: bool,
}

impl ReplayStrategy {
    /// Create a replay strategy over a recorded schedule.
    #[must_use]
    pub fn new(trace: ScheduleTrace) -> Self {
        Self {
            trace,
            cursor: 0,
            divergence: None,
            started: false,
        }
    }

    /// Single-candidate decisions are auto-selected by the controller
    /// on both the recording and the replaying run, so the strategy is
    /// consulted only at branching points; skip the recorded autos.
    fn skip_auto_decisions(&mut self) {
        while let Some(recorded) = self.trace.get(self.cursor) {
            match &recorded.decision {
                Decision::Operation { alternatives, .. } if alternatives.len() <= 1 => {
                    self.cursor += 1;
                }
                _ => break,
            }
        }
    }

    fn diverge(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::debug!(step = self.cursor, %reason, "replay divergence");
        self.divergence = Some(reason);
    }
}

impl Strategy for ReplayStrategy {
    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        _current: OperationId,
    ) -> Option<OperationId> {
        self.skip_auto_decisions();
        let Some(recorded) = self.trace.get(self.cursor) else {
            self.diverge("execution is longer than the recorded schedule");
            return None;
        };
        let Decision::Operation { id, .. } = &recorded.decision else {
            self.diverge("recorded step is not a scheduling choice");
            return None;
        };
        let id = *id;
        if !enabled.contains(&id) {
            self.diverge(format!("recorded operation {id} is no longer enabled"));
            return None;
        }
        self.cursor += 1;
        Some(id)
    }

    fn next_boolean(&mut self, _max_value: u64) -> Option<bool> {
        self.skip_auto_decisions();
        let Some(recorded) = self.trace.get(self.cursor) else {
            self.diverge("execution is longer than the recorded schedule");
            return None;
        };
        let Decision::Boolean(value) = &recorded.decision else {
            self.diverge("recorded step is not a boolean choice");
            return None;
        };
        let value = *value;
        self.cursor += 1;
        Some(value)
    }

    fn next_integer(&mut self, max_value: u64) -> Option<u64> {
        self.skip_auto_decisions();
        let Some(recorded) = self.trace.get(self.cursor) else {
            self.diverge("execution is longer than the recorded schedule");
            return None;
        };
        let Decision::Integer { value, max } = recorded.decision.clone() else {
            self.diverge("recorded step is not an integer choice");
            return None;
        };
        if max != max_value {
            self.diverge(format!(
                "recorded integer domain {max} does not match requested {max_value}"
            ));
            return None;
        }
        self.cursor += 1;
        Some(value)
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        true
    }

    fn notify_scheduling_ended(&mut self, _bug_found: bool) {}

    fn divergence(&self) -> Option<String> {
        self.divergence.clone()
    }

    fn description(&self) -> String {
        format!("replay, {} recorded decisions", self.trace.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(ids: &[u64]) -> Vec<OperationId> {
        ids.iter().map(|id| OperationId(*id)).collect()
    }

    #[test]
    fn test_replays_recorded_operations_in_order() {
        let mut trace = ScheduleTrace::new();
        trace.push_operation(OperationId(1), vec![OperationId(0), OperationId(1)]);
        trace.push_operation(OperationId(0), vec![OperationId(0), OperationId(1)]);

        let mut replay = ReplayStrategy::new(trace);
        assert!(replay.prepare_for_next_iteration());
        let enabled = ops(&[0, 1]);
        assert_eq!(
            replay.next_operation(&enabled, OperationId(0)),
            Some(OperationId(1))
        );
        assert_eq!(
            replay.next_operation(&enabled, OperationId(1)),
            Some(OperationId(0))
        );
        // Replay runs exactly one iteration.
        assert!(!replay.prepare_for_next_iteration());
    }

    #[test]
    fn test_skips_single_candidate_records() {
        let mut trace = ScheduleTrace::new();
        trace.push_operation(OperationId(0), vec![OperationId(0)]);
        trace.push_boolean(true);

        let mut replay = ReplayStrategy::new(trace);
        assert!(replay.prepare_for_next_iteration());
        assert_eq!(replay.next_boolean(2), Some(true));
        assert_eq!(replay.divergence(), None);
    }

    #[test]
    fn test_disabled_recorded_operation_diverges() {
        let mut trace = ScheduleTrace::new();
        trace.push_operation(OperationId(1), vec![OperationId(0), OperationId(1)]);

        let mut replay = ReplayStrategy::new(trace);
        assert!(replay.prepare_for_next_iteration());
        assert_eq!(replay.next_operation(&ops(&[0]), OperationId(0)), None);
        assert!(replay
            .divergence()
            .is_some_and(|reason| reason.contains("no longer enabled")));
    }

    #[test]
    fn test_running_past_the_recording_diverges() {
        let mut replay = ReplayStrategy::new(ScheduleTrace::new());
        assert!(replay.prepare_for_next_iteration());
        assert_eq!(replay.next_boolean(2), None);
        assert!(replay
            .divergence()
            .is_some_and(|reason| reason.contains("longer than the recorded")));
    }

    #[test]
    fn test_kind_mismatch_diverges() {
        let mut trace = ScheduleTrace::new();
        trace.push_boolean(false);
        let mut replay = ReplayStrategy::new(trace);
        assert!(replay.prepare_for_next_iteration());
        assert_eq!(
            replay.next_operation(&ops(&[0, 1]), OperationId(0)),
            None
        );
        assert!(replay
            .divergence()
            .is_some_and(|reason| reason.contains("not a scheduling choice")));
    }
}
