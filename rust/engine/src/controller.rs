//! Scheduling controller: the single serialization point for all
//! concurrency.
//!
//! Every operation runs on its own OS thread but holds the turn only
//! between a grant and its next decision point. All decisions happen
//! under one scheduler lock; operation threads never touch the
//! registry, traces, or liveness state directly.

use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::EngineError;
use crate::fingerprint;
use crate::liveness::{LivenessMonitor, MonitorId};
use crate::operation::{ActionKind, Operation, OperationId, OperationStatus, StateSource};
use crate::registry::OperationRegistry;
use crate::schedule_trace::ScheduleTrace;
use crate::signal::OpSignal;
use crate::strategy::Strategy;
use crate::trace::{ChoiceValue, Trace, TraceStepKind};

/// The current iteration has ended; the calling operation thread must
/// unwind without running further actor code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionCanceled;

/// Classification of one finished iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationOutcome {
    /// The program ran to completion without a violation.
    Clean,
    /// An assertion failed or actor code panicked.
    Safety {
        /// Human-readable bug description.
        message: String,
    },
    /// A monitored condition can be postponed forever, or every
    /// operation is waiting with nothing enabled.
    Livelock {
        /// Human-readable bug description.
        message: String,
        /// The operations that were waiting.
        waiting: Vec<OperationId>,
    },
    /// The per-iteration step ceiling was hit.
    DepthBound,
    /// The strategy's search space ran dry mid-iteration.
    Exhausted,
    /// The iteration was aborted externally.
    Canceled,
}

impl IterationOutcome {
    /// Whether this outcome is a user-program bug.
    #[must_use]
    pub fn is_bug(&self) -> bool {
        matches!(self, Self::Safety { .. } | Self::Livelock { .. })
    }
}

/// Everything one finished iteration leaves behind.
#[derive(Debug)]
pub struct RunArtifacts {
    /// Outcome classification.
    pub outcome: IterationOutcome,
    /// Machine-event trace (partial on aborted iterations).
    pub trace: Trace,
    /// Recorded decision sequence, sufficient for replay.
    pub schedule: ScheduleTrace,
    /// Number of scheduling decisions taken.
    pub steps: usize,
    /// Engine-invariant error, if the iteration died of one.
    pub engine_error: Option<EngineError>,
}

struct Inner {
    config: Config,
    strategy: Option<Box<dyn Strategy>>,
    registry: OperationRegistry,
    signals: BTreeMap<OperationId, Arc<OpSignal>>,
    trace: Trace,
    schedule: ScheduleTrace,
    liveness: LivenessMonitor,
    current: Option<OperationId>,
    steps: usize,
    next_op_id: u64,
    outcome: Option<IterationOutcome>,
    engine_error: Option<EngineError>,
}

impl Inner {
    fn finished(&self) -> bool {
        self.outcome.is_some()
    }
}

enum Advance {
    /// The caller keeps the turn.
    Continue,
    /// The caller must park on its own signal.
    Park(Arc<OpSignal>),
    /// The iteration is over.
    Finished,
}

/// The scheduling controller of one iteration.
pub struct Controller {
    inner: Mutex<Inner>,
    done: Condvar,
    cancel: Option<Arc<AtomicBool>>,
}

impl Controller {
    /// Create a controller for one iteration, borrowing the strategy
    /// for its duration.
    #[must_use]
    pub fn new(config: Config, strategy: Box<dyn Strategy>) -> Self {
        Self::build(config, strategy, None)
    }

    /// Create a controller that also honors an external cancel flag,
    /// checked at every decision point.
    #[must_use]
    pub fn with_cancel(
        config: Config,
        strategy: Box<dyn Strategy>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self::build(config, strategy, Some(cancel))
    }

    fn build(
        config: Config,
        strategy: Box<dyn Strategy>,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                config,
                strategy: Some(strategy),
                registry: OperationRegistry::new(),
                signals: BTreeMap::new(),
                trace: Trace::new(),
                schedule: ScheduleTrace::new(),
                liveness: LivenessMonitor::new(),
                current: None,
                steps: 0,
                next_op_id: 0,
                outcome: None,
                engine_error: None,
            }),
            done: Condvar::new(),
            cancel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("scheduler lock poisoned")
    }

    /// Register a new operation.
    ///
    /// # Errors
    ///
    /// Returns an engine error on duplicate registration.
    pub fn create_operation(
        &self,
        name: impl Into<String>,
        status: OperationStatus,
        source: Option<Arc<dyn StateSource>>,
    ) -> Result<OperationId, EngineError> {
        let mut inner = self.lock();
        let id = OperationId(inner.next_op_id);
        inner.next_op_id += 1;
        inner
            .registry
            .register(Operation::new(id, name, status, source))?;
        let signal = Arc::new(OpSignal::new());
        if inner.finished() {
            // Late creation after the iteration ended: never park the
            // new thread.
            signal.stop();
        }
        inner.signals.insert(id, signal);
        tracing::debug!(op = %id, "operation created");
        Ok(id)
    }

    /// Register a liveness monitor in its initial state.
    pub fn register_monitor(
        &self,
        name: impl Into<String>,
        initial_state: impl Into<String>,
        hot: bool,
    ) -> MonitorId {
        self.lock().liveness.register(name, initial_state, hot)
    }

    /// Record a monitor state transition.
    ///
    /// # Errors
    ///
    /// Returns an engine error for unregistered monitors.
    pub fn notify_monitor_state(
        &self,
        id: MonitorId,
        state: impl Into<String>,
        hot: bool,
    ) -> Result<(), EngineError> {
        self.lock().liveness.set_state(id, state, hot)
    }

    /// Runtime notification of an operation status change.
    ///
    /// # Errors
    ///
    /// Returns an engine error for unregistered operations.
    pub fn set_operation_status(
        &self,
        op: OperationId,
        status: OperationStatus,
    ) -> Result<(), EngineError> {
        self.lock().registry.set_status(op, status)
    }

    /// Runtime notification of what the granted operation just did;
    /// appends one trace step.
    ///
    /// # Errors
    ///
    /// Returns an engine error for unregistered operations.
    pub fn notify_trace_event(
        &self,
        op: OperationId,
        kind: TraceStepKind,
    ) -> Result<(), EngineError> {
        let mut inner = self.lock();
        if inner.finished() {
            return Ok(());
        }
        let (name, state) = {
            let operation = inner
                .registry
                .get(op)
                .ok_or(EngineError::UnknownOperation(op))?;
            (operation.name.clone(), operation.state_name())
        };
        if let Some(action) = action_of(&kind) {
            inner.registry.set_last_action(op, action)?;
        }
        inner.trace.push(op, name, state, kind);
        Ok(())
    }

    /// Park the calling thread until its operation is granted the turn.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionCanceled`] when the iteration ended first.
    pub fn wait_for_turn(&self, op: OperationId) -> Result<(), ExecutionCanceled> {
        let signal = {
            let inner = self.lock();
            match inner.signals.get(&op) {
                Some(signal) => Arc::clone(signal),
                None => return Err(ExecutionCanceled),
            }
        };
        signal.wait_turn().map_err(|_| ExecutionCanceled)
    }

    /// Grant the first turn. Called once by the driver after every
    /// initial operation is registered and parked.
    pub fn start(&self) {
        let mut inner = self.lock();
        let _ = self.advance(&mut inner, None, false);
    }

    /// Decision point: hand the turn back and ask who runs next.
    ///
    /// Blocks the caller until its operation is granted again.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionCanceled`] when the iteration ended.
    pub fn schedule(&self, current: OperationId) -> Result<(), ExecutionCanceled> {
        let mut inner = self.lock();
        match self.advance(&mut inner, Some(current), true) {
            Advance::Continue => Ok(()),
            Advance::Park(signal) => {
                drop(inner);
                signal.wait_turn().map_err(|_| ExecutionCanceled)
            }
            Advance::Finished => Err(ExecutionCanceled),
        }
    }

    /// Resolve a nondeterministic boolean over `max_value` outcomes.
    ///
    /// Does not switch operations; the caller keeps the turn.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionCanceled`] when the iteration ended.
    pub fn next_boolean(
        &self,
        current: OperationId,
        max_value: u64,
    ) -> Result<bool, ExecutionCanceled> {
        let mut inner = self.lock();
        if let Some(outcome) = self.pre_decision_checks(&mut inner) {
            self.finish(&mut inner, outcome);
            return Err(ExecutionCanceled);
        }
        let strategy = inner.strategy.as_mut().expect("strategy present");
        let Some(value) = strategy.next_boolean(max_value) else {
            self.finish_starved(&mut inner);
            return Err(ExecutionCanceled);
        };
        inner.schedule.push_boolean(value);
        inner.steps += 1;
        self.record_choice_step(&mut inner, current, ChoiceValue::Boolean(value));
        self.liveness_step(&mut inner);
        if inner.finished() {
            return Err(ExecutionCanceled);
        }
        Ok(value)
    }

    /// Resolve a nondeterministic integer in `[0, max_value)`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionCanceled`] when the iteration ended.
    pub fn next_integer(
        &self,
        current: OperationId,
        max_value: u64,
    ) -> Result<u64, ExecutionCanceled> {
        let mut inner = self.lock();
        if let Some(outcome) = self.pre_decision_checks(&mut inner) {
            self.finish(&mut inner, outcome);
            return Err(ExecutionCanceled);
        }
        let strategy = inner.strategy.as_mut().expect("strategy present");
        let Some(value) = strategy.next_integer(max_value) else {
            self.finish_starved(&mut inner);
            return Err(ExecutionCanceled);
        };
        inner.schedule.push_integer(value, max_value);
        inner.steps += 1;
        self.record_choice_step(
            &mut inner,
            current,
            ChoiceValue::Integer {
                value,
                max: max_value,
            },
        );
        self.liveness_step(&mut inner);
        if inner.finished() {
            return Err(ExecutionCanceled);
        }
        Ok(value)
    }

    /// The calling operation finished; pass the turn on.
    ///
    /// The caller's thread exits afterwards, so it is never parked.
    pub fn operation_completed(&self, op: OperationId) {
        let mut inner = self.lock();
        if inner.finished() {
            return;
        }
        if let Err(err) = inner.registry.set_status(op, OperationStatus::Completed) {
            self.fail_engine(&mut inner, err);
            return;
        }
        tracing::debug!(op = %op, "operation completed");
        let _ = self.advance(&mut inner, Some(op), false);
    }

    /// Report an assertion failure or actor panic: a safety bug that
    /// ends the iteration with the partial trace preserved.
    pub fn notify_assertion_failure(&self, message: impl Into<String>) {
        let mut inner = self.lock();
        if inner.finished() {
            return;
        }
        let message = message.into();
        tracing::debug!(%message, "assertion failure");
        self.finish(&mut inner, IterationOutcome::Safety { message });
    }

    /// Abort the iteration from outside (portfolio cancellation).
    ///
    /// Parked operations are released without running further actor
    /// code; the in-progress trace is discarded by the caller.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if inner.finished() {
            return;
        }
        self.finish(&mut inner, IterationOutcome::Canceled);
    }

    /// Block until the iteration finishes, returning its outcome.
    #[must_use]
    pub fn wait_for_completion(&self) -> IterationOutcome {
        let mut inner = self.lock();
        while inner.outcome.is_none() {
            inner = self.done.wait(inner).expect("scheduler lock poisoned");
        }
        inner.outcome.clone().expect("outcome present")
    }

    /// Whether the iteration has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.lock().finished()
    }

    /// The operation currently holding the turn.
    #[must_use]
    pub fn current_operation(&self) -> Option<OperationId> {
        self.lock().current
    }

    /// Name of an operation, for reports.
    #[must_use]
    pub fn operation_name(&self, op: OperationId) -> String {
        self.lock().registry.name(op)
    }

    /// Number of scheduling decisions taken so far.
    #[must_use]
    pub fn explored_steps(&self) -> usize {
        self.lock().steps
    }

    /// Move the strategy back out of a finished controller.
    #[must_use]
    pub fn take_strategy(&self) -> Option<Box<dyn Strategy>> {
        self.lock().strategy.take()
    }

    /// Collect the artifacts of a finished iteration.
    #[must_use]
    pub fn take_artifacts(&self) -> RunArtifacts {
        let mut inner = self.lock();
        RunArtifacts {
            outcome: inner
                .outcome
                .clone()
                .unwrap_or(IterationOutcome::Canceled),
            trace: mem::take(&mut inner.trace),
            schedule: mem::take(&mut inner.schedule),
            steps: inner.steps,
            engine_error: inner.engine_error.take(),
        }
    }

    /// Effective step ceiling: the tighter of the configured bound and
    /// the strategy-imposed one.
    fn effective_step_limit(inner: &Inner) -> usize {
        let configured = inner.config.max_steps;
        let strategic = inner
            .strategy
            .as_ref()
            .and_then(|strategy| strategy.step_limit())
            .unwrap_or(0);
        match (configured, strategic) {
            (0, limit) | (limit, 0) => limit,
            (a, b) => a.min(b),
        }
    }

    /// Checks shared by every decision point. Returns the outcome that
    /// ends the iteration, if any.
    fn pre_decision_checks(&self, inner: &mut Inner) -> Option<IterationOutcome> {
        if inner.finished() {
            return Some(inner.outcome.clone().expect("outcome present"));
        }
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Some(IterationOutcome::Canceled);
        }
        let limit = Self::effective_step_limit(inner);
        if limit > 0 && inner.steps >= limit {
            tracing::debug!(limit, "depth bound reached");
            if inner.config.depth_bound_is_bug {
                return Some(IterationOutcome::Safety {
                    message: format!("scheduling steps exceeded the depth bound of {limit}"),
                });
            }
            return Some(IterationOutcome::DepthBound);
        }
        None
    }

    /// The decision core: pick the next operation, record the decision,
    /// and arrange the turn hand-off.
    fn advance(&self, inner: &mut Inner, current: Option<OperationId>, park: bool) -> Advance {
        if let Some(outcome) = self.pre_decision_checks(inner) {
            if !inner.finished() {
                self.finish(inner, outcome);
            }
            return Advance::Finished;
        }

        let enabled = inner.registry.enabled_operations();
        if enabled.is_empty() {
            self.finish_no_enabled(inner);
            return Advance::Finished;
        }

        let next = if enabled.len() == 1 {
            enabled[0]
        } else {
            let reference = current.unwrap_or(enabled[0]);
            let strategy = inner.strategy.as_mut().expect("strategy present");
            match strategy.next_operation(&enabled, reference) {
                Some(op) => op,
                None => {
                    self.finish_starved(inner);
                    return Advance::Finished;
                }
            }
        };

        inner.schedule.push_operation(next, enabled);
        inner.steps += 1;
        tracing::debug!(op = %next, step = inner.steps, "scheduling choice");

        self.liveness_step(inner);
        if inner.finished() {
            return Advance::Finished;
        }

        inner.current = Some(next);
        if current == Some(next) {
            return Advance::Continue;
        }

        let caller_signal = current.and_then(|op| inner.signals.get(&op).map(Arc::clone));
        if let Some(signal) = &caller_signal {
            signal.revoke();
        }
        if let Some(signal) = inner.signals.get(&next) {
            signal.grant();
        }
        match (park, caller_signal) {
            (true, Some(signal)) => Advance::Park(signal),
            _ => Advance::Continue,
        }
    }

    /// Fingerprint the global state and check for hot-cycle recurrence.
    fn liveness_step(&self, inner: &mut Inner) {
        if !inner.config.liveness_checking || !inner.config.cache_program_state {
            return;
        }
        let snapshot = inner.liveness.snapshots();
        let fp = fingerprint::capture(&inner.registry, &snapshot);
        let step = inner.steps;
        if let Some(cycle) = inner.liveness.record_step(fp, step) {
            let waiting = inner.registry.blocked_operations();
            let message = format!(
                "monitors [{}] detected a state cycle starting at step {}: \
                 the program can repeat it forever without progress",
                cycle.hot_monitors.join(", "),
                cycle.first_seen_step
            );
            self.finish(inner, IterationOutcome::Livelock { message, waiting });
        }
    }

    /// No operation is enabled: classify termination.
    fn finish_no_enabled(&self, inner: &mut Inner) {
        let waiting = inner.registry.blocked_operations();
        if !waiting.is_empty() {
            let names: Vec<String> = waiting.iter().map(|op| inner.registry.name(*op)).collect();
            let message = format!(
                "livelock: operations [{}] are waiting for an event, \
                 and no schedulable choice is enabled",
                names.join(", ")
            );
            self.finish(inner, IterationOutcome::Livelock { message, waiting });
            return;
        }

        if inner.config.liveness_checking {
            let hot = inner.liveness.check_termination();
            if !hot.is_empty() {
                let message = format!(
                    "monitors [{}] are still hot at the end of program execution",
                    hot.join(", ")
                );
                self.finish(
                    inner,
                    IterationOutcome::Livelock {
                        message,
                        waiting: Vec::new(),
                    },
                );
                return;
            }
        }

        self.finish(inner, IterationOutcome::Clean);
    }

    /// The strategy refused a decision: replay divergence or an
    /// exhausted search tail.
    fn finish_starved(&self, inner: &mut Inner) {
        let strategy = inner.strategy.as_ref().expect("strategy present");
        if let Some(reason) = strategy.divergence() {
            let err = EngineError::ReplayDivergence {
                step: inner.steps,
                reason,
            };
            self.fail_engine(inner, err);
            return;
        }
        tracing::debug!("schedule explored; ending iteration");
        self.finish(inner, IterationOutcome::Exhausted);
    }

    fn fail_engine(&self, inner: &mut Inner, err: EngineError) {
        tracing::debug!(error = %err, "engine error");
        inner.engine_error = Some(err);
        self.finish(inner, IterationOutcome::Canceled);
    }

    fn record_choice_step(&self, inner: &mut Inner, op: OperationId, choice: ChoiceValue) {
        let (name, state) = match inner.registry.get(op) {
            Some(operation) => (operation.name.clone(), operation.state_name()),
            None => (op.to_string(), String::new()),
        };
        let _ = inner.registry.set_last_action(op, ActionKind::RandomChoice);
        inner
            .trace
            .push(op, name, state, TraceStepKind::RandomChoice { choice });
    }

    /// Seal the iteration: set the outcome, tear the registry down,
    /// release every parked thread, and wake the driver.
    fn finish(&self, inner: &mut Inner, outcome: IterationOutcome) {
        if inner.finished() {
            return;
        }
        tracing::debug!(?outcome, steps = inner.steps, "iteration finished");
        inner.outcome = Some(outcome);
        inner.current = None;
        inner.registry.teardown();
        for signal in inner.signals.values() {
            signal.stop();
        }
        self.done.notify_all();
    }
}

fn action_of(kind: &TraceStepKind) -> Option<ActionKind> {
    match kind {
        TraceStepKind::SendEvent { .. } => Some(ActionKind::Send),
        TraceStepKind::DequeueEvent { .. }
        | TraceStepKind::ReceiveEvent { .. }
        | TraceStepKind::WaitToReceive { .. } => Some(ActionKind::Receive),
        TraceStepKind::RaiseEvent { .. } => Some(ActionKind::Raise),
        TraceStepKind::GotoState { .. } => Some(ActionKind::GotoState),
        TraceStepKind::InvokeAction { .. } => Some(ActionKind::InvokeAction),
        TraceStepKind::RandomChoice { .. } => Some(ActionKind::RandomChoice),
        TraceStepKind::Halt => Some(ActionKind::Halt),
        TraceStepKind::CreateMachine { .. } | TraceStepKind::CreateMonitor { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::strategy::RandomStrategy;

    fn controller() -> Controller {
        let mut strategy = RandomStrategy::new(1);
        assert!(strategy.prepare_for_next_iteration());
        Controller::new(Config::default(), Box::new(strategy))
    }

    #[test]
    fn test_duplicate_ids_cannot_happen_through_create() {
        let ctrl = controller();
        let a = ctrl
            .create_operation("a", OperationStatus::Enabled, None)
            .unwrap();
        let b = ctrl
            .create_operation("b", OperationStatus::Enabled, None)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_start_with_no_operations_finishes_clean() {
        let ctrl = controller();
        ctrl.start();
        assert_eq!(ctrl.wait_for_completion(), IterationOutcome::Clean);
    }

    #[test]
    fn test_all_blocked_at_start_is_a_livelock() {
        let ctrl = controller();
        for name in ["a", "b", "c"] {
            ctrl.create_operation(name, OperationStatus::BlockedOnReceive, None)
                .unwrap();
        }
        ctrl.start();
        let outcome = ctrl.wait_for_completion();
        let IterationOutcome::Livelock { message, waiting } = outcome else {
            panic!("expected livelock, got {outcome:?}");
        };
        assert_eq!(waiting.len(), 3);
        assert!(message.contains("[a, b, c]"), "unexpected message: {message}");
    }

    #[test]
    fn test_hot_monitor_at_termination_is_a_livelock() {
        let ctrl = controller();
        ctrl.register_monitor("progress", "Waiting", true);
        ctrl.start();
        let outcome = ctrl.wait_for_completion();
        assert_matches!(outcome, IterationOutcome::Livelock { .. });
    }

    #[test]
    fn test_assertion_failure_is_a_safety_bug() {
        let ctrl = controller();
        ctrl.create_operation("a", OperationStatus::Enabled, None)
            .unwrap();
        ctrl.notify_assertion_failure("boom");
        assert_eq!(
            ctrl.wait_for_completion(),
            IterationOutcome::Safety {
                message: "boom".into()
            }
        );
    }

    #[test]
    fn test_stop_cancels_and_discards() {
        let ctrl = controller();
        ctrl.create_operation("a", OperationStatus::Enabled, None)
            .unwrap();
        ctrl.stop();
        assert_eq!(ctrl.wait_for_completion(), IterationOutcome::Canceled);
        let artifacts = ctrl.take_artifacts();
        assert_eq!(artifacts.outcome, IterationOutcome::Canceled);
        assert!(artifacts.engine_error.is_none());
    }
}
