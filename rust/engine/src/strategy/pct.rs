//! Probabilistic concurrency testing (PCT).
//!
//! Every operation gets a random priority when first seen; the enabled
//! operation with the highest priority runs. A small number of
//! randomly placed priority-change points demote the current highest
//! priority to lowest, which finds bugs requiring d-way priority
//! inversions with high probability in few iterations.

use std::collections::BTreeSet;

use crate::operation::OperationId;
use crate::rng::ControlledRng;
use crate::strategy::Strategy;

/// Priority-based probabilistic strategy.
pub struct PctStrategy {
    master_seed: u64,
    priority_switches: usize,
    rng: ControlledRng,
    /// Front of the list is the highest priority.
    priorities: Vec<OperationId>,
    change_points: BTreeSet<usize>,
    steps: usize,
    max_steps_observed: usize,
}

impl PctStrategy {
    /// Create a PCT strategy with `priority_switches` change points.
    #[must_use]
    pub fn new(master_seed: u64, priority_switches: usize) -> Self {
        Self {
            master_seed,
            priority_switches,
            rng: ControlledRng::new(master_seed),
            priorities: Vec::new(),
            change_points: BTreeSet::new(),
            steps: 0,
            max_steps_observed: 0,
        }
    }

    fn highest_priority_enabled(&self, enabled: &[OperationId]) -> Option<OperationId> {
        self.priorities
            .iter()
            .find(|id| enabled.contains(id))
            .copied()
    }

    /// A change point that lands on a single-candidate step would be
    /// wasted; slide it to the next free step instead.
    fn move_change_point_forward(&mut self) {
        self.change_points.remove(&self.steps);
        let mut candidate = self.steps + 1;
        while self.change_points.contains(&candidate) {
            candidate += 1;
        }
        self.change_points.insert(candidate);
        tracing::trace!(step = candidate, "pct change point moved forward");
    }
}

impl Strategy for PctStrategy {
    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        current: OperationId,
    ) -> Option<OperationId> {
        if enabled.is_empty() {
            return None;
        }

        if self.priorities.is_empty() {
            self.priorities.push(current);
        }
        // Insert newly seen operations at a random position below the
        // head, in enabled (creation) order.
        for id in enabled {
            if !self.priorities.contains(id) {
                let slot = self.rng.pick_index(self.priorities.len()) + 1;
                let slot = slot.min(self.priorities.len());
                self.priorities.insert(slot, *id);
                tracing::trace!(op = %id, slot, "pct registered new operation");
            }
        }

        if self.change_points.contains(&self.steps) {
            if enabled.len() == 1 {
                self.move_change_point_forward();
            } else if let Some(top) = self.highest_priority_enabled(enabled) {
                self.priorities.retain(|id| *id != top);
                self.priorities.push(top);
                tracing::debug!(op = %top, step = self.steps, "pct priority inversion");
            }
        }

        let pick = self.highest_priority_enabled(enabled)?;
        self.steps += 1;
        Some(pick)
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
        self.max_steps_observed = self.max_steps_observed.max(self.steps);
        self.steps = 0;
        self.priorities.clear();
        self.change_points.clear();

        // Sample change points uniformly over the longest schedule seen
        // so far.
        let mut range: Vec<usize> = (0..self.max_steps_observed).collect();
        self.rng.shuffle(&mut range);
        for point in range.into_iter().take(self.priority_switches) {
            self.change_points.insert(point);
        }
        true
    }

    fn notify_scheduling_ended(&mut self, _bug_found: bool) {}

    fn description(&self) -> String {
        format!(
            "pct, {} priority switches, seed {}",
            self.priority_switches, self.master_seed
        )
    }
}
