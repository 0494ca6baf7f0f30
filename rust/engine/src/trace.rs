//! Machine-event trace: the ordered record of what each granted
//! operation actually did during one iteration.
//!
//! Steps are doubly linked through their indices so state-transition
//! rewriting (pop the tail, re-append) keeps the chain consistent.
//! Archived (serialized) only when a bug is confirmed.

use serde::{Deserialize, Serialize};

use crate::operation::OperationId;

/// Payload of a resolved nondeterministic choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChoiceValue {
    /// Boolean choice.
    Boolean(bool),
    /// Bounded integer choice.
    Integer {
        /// Chosen value.
        value: u64,
        /// Exclusive upper bound of the domain.
        max: u64,
    },
}

/// Kind and payload of one trace step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceStepKind {
    /// A machine created another machine.
    CreateMachine {
        /// The created operation.
        child: OperationId,
        /// Name of the created machine.
        child_name: String,
    },
    /// A machine created a monitor.
    CreateMonitor {
        /// Name of the created monitor.
        monitor: String,
    },
    /// An event was enqueued to another machine.
    SendEvent {
        /// Receiving operation.
        target: OperationId,
        /// Receiving machine name.
        target_name: String,
        /// Event name.
        event: String,
    },
    /// An event was dequeued for handling.
    DequeueEvent {
        /// Event name.
        event: String,
    },
    /// An event was raised to the machine itself.
    RaiseEvent {
        /// Event name.
        event: String,
    },
    /// The machine transitioned to a new state.
    GotoState {
        /// Destination state name.
        state: String,
    },
    /// A user action was invoked.
    InvokeAction {
        /// Action name.
        action: String,
    },
    /// The machine started waiting for a specific event.
    WaitToReceive {
        /// Awaited event name.
        event: String,
    },
    /// An explicitly awaited event arrived.
    ReceiveEvent {
        /// Event name.
        event: String,
    },
    /// A nondeterministic choice was resolved.
    RandomChoice {
        /// Chosen value.
        choice: ChoiceValue,
    },
    /// The machine halted.
    Halt,
}

/// One immutable trace step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Contiguous index from zero.
    pub index: usize,
    /// Acting operation.
    pub op: OperationId,
    /// Acting machine name.
    pub op_name: String,
    /// Machine state name at this point.
    pub state: String,
    /// Step kind and payload.
    pub kind: TraceStepKind,
    /// Index of the previous step.
    pub previous: Option<usize>,
    /// Index of the next step.
    pub next: Option<usize>,
}

/// One send, as rendered in the visualization export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRecord {
    /// Trace index of the send.
    pub step: usize,
    /// Sending machine.
    pub sender: String,
    /// Sender state at the time of the send.
    pub sender_state: String,
    /// Receiving machine.
    pub receiver: String,
    /// Event name.
    pub event: String,
}

/// Visualization document: the send steps of one trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendsExport {
    /// All sends in trace order.
    pub sends: Vec<SendRecord>,
}

/// Ordered, doubly-linked trace of one iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    steps: Vec<TraceStep>,
}

impl Trace {
    /// Create an empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, linking it to the current tail.
    pub fn push(
        &mut self,
        op: OperationId,
        op_name: impl Into<String>,
        state: impl Into<String>,
        kind: TraceStepKind,
    ) {
        let index = self.steps.len();
        let previous = index.checked_sub(1);
        if let Some(prev) = previous {
            self.steps[prev].next = Some(index);
        }
        self.steps.push(TraceStep {
            index,
            op,
            op_name: op_name.into(),
            state: state.into(),
            kind,
            previous,
            next: None,
        });
    }

    /// Remove and return the last step, fixing the new tail's link.
    pub fn pop(&mut self) -> Option<TraceStep> {
        let step = self.steps.pop()?;
        if let Some(tail) = self.steps.last_mut() {
            tail.next = None;
        }
        Some(step)
    }

    /// The last step, if any.
    #[must_use]
    pub fn peek(&self) -> Option<&TraceStep> {
        self.steps.last()
    }

    /// Step at an index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&TraceStep> {
        self.steps.get(index)
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the trace is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterate steps in order.
    pub fn iter(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps.iter()
    }

    /// Truncate back to a given length, relinking the tail.
    pub fn truncate(&mut self, len: usize) {
        while self.steps.len() > len {
            self.pop();
        }
    }

    /// Check index contiguity and previous/next consistency.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.steps.iter().enumerate().all(|(idx, step)| {
            step.index == idx
                && step.previous == idx.checked_sub(1)
                && step.next
                    == if idx + 1 < self.steps.len() {
                        Some(idx + 1)
                    } else {
                        None
                    }
        })
    }

    /// Render the send steps into the portable visualization document.
    #[must_use]
    pub fn export_sends(&self) -> SendsExport {
        let sends = self
            .steps
            .iter()
            .filter_map(|step| match &step.kind {
                TraceStepKind::SendEvent {
                    target_name, event, ..
                } => Some(SendRecord {
                    step: step.index,
                    sender: step.op_name.clone(),
                    sender_state: step.state.clone(),
                    receiver: target_name.clone(),
                    event: event.clone(),
                }),
                _ => None,
            })
            .collect();
        SendsExport { sends }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn send_kind(target: u64, event: &str) -> TraceStepKind {
        TraceStepKind::SendEvent {
            target: OperationId(target),
            target_name: format!("m{target}"),
            event: event.into(),
        }
    }

    #[test]
    fn test_push_links_steps() {
        let mut trace = Trace::new();
        trace.push(OperationId(0), "a", "Init", send_kind(1, "Ping"));
        trace.push(OperationId(1), "b", "Init", TraceStepKind::Halt);

        assert!(trace.is_consistent());
        assert_eq!(trace.get(0).unwrap().next, Some(1));
        assert_eq!(trace.get(1).unwrap().previous, Some(0));
        assert_eq!(trace.get(1).unwrap().next, None);
    }

    #[test]
    fn test_pop_fixes_tail_link() {
        let mut trace = Trace::new();
        trace.push(OperationId(0), "a", "Init", send_kind(1, "Ping"));
        trace.push(OperationId(1), "b", "Init", TraceStepKind::Halt);

        let popped = trace.pop().unwrap();
        assert_eq!(popped.index, 1);
        assert_eq!(trace.peek().unwrap().next, None);
        assert!(trace.is_consistent());
    }

    #[test]
    fn test_pop_then_reappend_restores_consistency() {
        let mut trace = Trace::new();
        trace.push(OperationId(0), "a", "Init", send_kind(1, "Ping"));
        trace.push(
            OperationId(0),
            "a",
            "Init",
            TraceStepKind::GotoState { state: "Next".into() },
        );

        trace.pop();
        trace.push(
            OperationId(0),
            "a",
            "Init",
            TraceStepKind::RaiseEvent { event: "Go".into() },
        );

        assert_eq!(trace.len(), 2);
        assert!(trace.is_consistent());
    }

    #[test]
    fn test_export_keeps_only_sends() {
        let mut trace = Trace::new();
        trace.push(OperationId(0), "a", "Init", send_kind(1, "Ping"));
        trace.push(
            OperationId(1),
            "b",
            "Init",
            TraceStepKind::DequeueEvent { event: "Ping".into() },
        );
        trace.push(OperationId(1), "b", "Init", send_kind(0, "Pong"));

        let export = trace.export_sends();
        assert_eq!(export.sends.len(), 2);
        assert_eq!(export.sends[0].sender, "a");
        assert_eq!(export.sends[0].receiver, "m1");
        assert_eq!(export.sends[1].event, "Pong");
    }

    #[test]
    fn test_serde_round_trip() {
        let mut trace = Trace::new();
        trace.push(OperationId(0), "a", "Init", send_kind(1, "Ping"));
        trace.push(
            OperationId(0),
            "a",
            "Init",
            TraceStepKind::RandomChoice {
                choice: ChoiceValue::Integer { value: 3, max: 5 },
            },
        );

        let json = serde_json::to_string(&trace).expect("serialize");
        let back: Trace = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, trace);
    }

    proptest! {
        #[test]
        fn prop_push_pop_keeps_links_consistent(ops in prop::collection::vec(prop::bool::ANY, 1..64)) {
            let mut trace = Trace::new();
            for (idx, push) in ops.iter().enumerate() {
                if *push || trace.is_empty() {
                    trace.push(
                        OperationId(idx as u64),
                        "m",
                        "S",
                        TraceStepKind::GotoState { state: format!("s{idx}") },
                    );
                } else {
                    trace.pop();
                }
                prop_assert!(trace.is_consistent());
            }
        }
    }
}
