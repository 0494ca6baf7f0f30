//! Uniform random exploration.

use crate::operation::OperationId;
use crate::rng::ControlledRng;
use crate::strategy::Strategy;

/// Uniformly samples every decision from a seeded stream.
///
/// Each iteration reseeds deterministically from the master seed and
/// the iteration counter, so a run is reproducible from the master
/// seed alone.
pub struct RandomStrategy {
    master_seed: u64,
    iteration: u64,
    rng: ControlledRng,
    steps: usize,
}

impl RandomStrategy {
    /// Create a random strategy from a master seed.
    #[must_use]
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            iteration: 0,
            rng: ControlledRng::for_iteration(master_seed, 0),
            steps: 0,
        }
    }
}

impl Strategy for RandomStrategy {
    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        _current: OperationId,
    ) -> Option<OperationId> {
        if enabled.is_empty() {
            return None;
        }
        self.steps += 1;
        Some(enabled[self.rng.pick_index(enabled.len())])
    }

    fn next_boolean(&mut self, max_value: u64) -> Option<bool> {
        self.steps += 1;
        Some(self.rng.next_boolean(max_value))
    }

    fn next_integer(&mut self, max_value: u64) -> Option<u64> {
        self.steps += 1;
        Some(self.rng.next_integer(max_value))
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        if self.steps > 0 {
            self.iteration += 1;
            self.rng = ControlledRng::for_iteration(self.master_seed, self.iteration);
        }
        self.steps = 0;
        true
    }

    fn notify_scheduling_ended(&mut self, _bug_found: bool) {}

    fn is_fair(&self) -> bool {
        true
    }

    fn description(&self) -> String {
        format!("random, seed {}", self.master_seed)
    }
}
