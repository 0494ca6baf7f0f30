//! Delay-bounded exploration.
//!
//! Operations run in FIFO-enabled order starting from the current
//! operation, but up to `delay_bound` randomly placed "delays" each
//! skip the scheduler one position further round the enabled list,
//! modeling bounded scheduler unfairness.

use std::collections::VecDeque;

use crate::operation::OperationId;
use crate::rng::ControlledRng;
use crate::strategy::Strategy;

/// Randomized delay-bounding strategy.
pub struct DelayBoundingStrategy {
    master_seed: u64,
    iteration: u64,
    delay_bound: usize,
    rng: ControlledRng,
    remaining_delays: VecDeque<usize>,
    steps: usize,
    schedule_length: usize,
}

impl DelayBoundingStrategy {
    /// Create a delay-bounding strategy.
    #[must_use]
    pub fn new(master_seed: u64, delay_bound: usize) -> Self {
        Self {
            master_seed,
            iteration: 0,
            delay_bound,
            rng: ControlledRng::for_iteration(master_seed, 0),
            remaining_delays: VecDeque::new(),
            steps: 0,
            schedule_length: 0,
        }
    }

    /// Rotate the enabled list to start at (or just after) the current
    /// operation, preserving creation order within both halves.
    fn rotate(enabled: &[OperationId], current: OperationId) -> Vec<OperationId> {
        let split = enabled
            .iter()
            .position(|id| *id >= current)
            .unwrap_or(0);
        let mut ordered = Vec::with_capacity(enabled.len());
        ordered.extend_from_slice(&enabled[split..]);
        ordered.extend_from_slice(&enabled[..split]);
        ordered
    }
}

impl Strategy for DelayBoundingStrategy {
    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        current: OperationId,
    ) -> Option<OperationId> {
        if enabled.is_empty() {
            return None;
        }

        let ordered = Self::rotate(enabled, current);
        let mut idx = 0;
        while self.remaining_delays.front() == Some(&self.steps) {
            idx = (idx + 1) % ordered.len();
            self.remaining_delays.pop_front();
            tracing::debug!(
                remaining = self.remaining_delays.len(),
                "delay inserted"
            );
        }

        self.steps += 1;
        Some(ordered[idx])
    }

    fn next_boolean(&mut self, _max_value: u64) -> Option<bool> {
        // A delay scheduled on a boolean choice flips it.
        let mut value = false;
        if self.remaining_delays.front() == Some(&self.steps) {
            value = true;
            self.remaining_delays.pop_front();
            tracing::debug!(
                remaining = self.remaining_delays.len(),
                "delay inserted"
            );
        }
        self.steps += 1;
        Some(value)
    }

    fn next_integer(&mut self, max_value: u64) -> Option<u64> {
        self.steps += 1;
        Some(self.rng.next_integer(max_value))
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        self.schedule_length = self.schedule_length.max(self.steps);
        self.steps = 0;
        self.iteration += 1;
        self.rng = ControlledRng::for_iteration(self.master_seed, self.iteration);

        let span = self.schedule_length.max(1) as u64;
        let mut delays: Vec<usize> = (0..self.delay_bound)
            .map(|_| usize::try_from(self.rng.next_integer(span)).unwrap_or(0))
            .collect();
        delays.sort_unstable();
        self.remaining_delays = delays.into();
        true
    }

    fn notify_scheduling_ended(&mut self, _bug_found: bool) {}

    fn is_fair(&self) -> bool {
        true
    }

    fn description(&self) -> String {
        format!(
            "delay-bounding, {} delays, seed {}",
            self.delay_bound, self.master_seed
        )
    }
}
