//! Exhaustive depth-first search over the decision tree.
//!
//! The tree is an arena of decision levels indexed by step number: each
//! level lists the alternatives that were available at that decision,
//! with a done flag per alternative. Backtracking is index manipulation
//! on the arena, never graph surgery.
//!
//! Within an iteration a taken choice is tentatively marked done; on
//! descending to the next level the parent's mark is cleared again, so
//! a permanent done mark means the whole subtree under that choice has
//! been explored. Between iterations the trailing fully-done levels are
//! popped and the deepest remaining level's first untried alternative
//! becomes the next path.

use crate::operation::OperationId;
use crate::strategy::Strategy;

#[derive(Debug, Clone)]
struct Choice<T> {
    value: T,
    done: bool,
}

impl<T: Copy> Choice<T> {
    fn new(value: T) -> Self {
        Self { value, done: false }
    }
}

/// One nondeterministic-value level; a program position resolves to one
/// kind only.
enum NondetLevel {
    Bool(Vec<Choice<bool>>),
    Int(Vec<Choice<u64>>),
}

fn all_done<T>(level: &[Choice<T>]) -> bool {
    level.iter().all(|choice| choice.done)
}

fn mark_first_untried<T>(level: &mut [Choice<T>]) {
    if let Some(choice) = level.iter_mut().find(|choice| !choice.done) {
        choice.done = true;
    }
}

fn unmark_last_done<T>(level: &mut [Choice<T>]) {
    if let Some(choice) = level.iter_mut().rev().find(|choice| choice.done) {
        choice.done = false;
    }
}

/// Depth-first search strategy with explicit backtracking.
#[derive(Default)]
pub struct DfsStrategy {
    schedule_stack: Vec<Vec<Choice<OperationId>>>,
    nondet_stack: Vec<NondetLevel>,
    sched_index: usize,
    nondet_index: usize,
    started: bool,
}

impl DfsStrategy {
    /// Create a DFS strategy with an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every alternative in the tree has been explored.
    #[must_use]
    pub fn has_finished(&self) -> bool {
        self.schedule_stack.iter().all(|level| all_done(level))
            && self.nondet_stack.iter().all(|level| match level {
                NondetLevel::Bool(choices) => all_done(choices),
                NondetLevel::Int(choices) => all_done(choices),
            })
    }

    fn nondet_all_done(&self) -> bool {
        self.nondet_stack.iter().all(|level| match level {
            NondetLevel::Bool(choices) => all_done(choices),
            NondetLevel::Int(choices) => all_done(choices),
        })
    }

    fn backtrack_nondet(&mut self) {
        for idx in (1..self.nondet_stack.len()).rev() {
            let exhausted = match &self.nondet_stack[idx] {
                NondetLevel::Bool(choices) => all_done(choices),
                NondetLevel::Int(choices) => all_done(choices),
            };
            if !exhausted {
                break;
            }
            match &mut self.nondet_stack[idx - 1] {
                NondetLevel::Bool(choices) => mark_first_untried(choices),
                NondetLevel::Int(choices) => mark_first_untried(choices),
            }
            self.nondet_stack.remove(idx);
        }
        if !self.nondet_stack.is_empty() && self.nondet_all_done() {
            self.nondet_stack.clear();
        }
    }

    fn backtrack_schedule(&mut self) {
        for idx in (1..self.schedule_stack.len()).rev() {
            if !all_done(&self.schedule_stack[idx]) {
                break;
            }
            mark_first_untried(&mut self.schedule_stack[idx - 1]);
            self.schedule_stack.remove(idx);
        }
    }
}

impl Strategy for DfsStrategy {
    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        _current: OperationId,
    ) -> Option<OperationId> {
        if enabled.is_empty() {
            return None;
        }

        if self.sched_index >= self.schedule_stack.len() {
            self.schedule_stack
                .push(enabled.iter().copied().map(Choice::new).collect());
        }

        let pos = self.schedule_stack[self.sched_index]
            .iter()
            .position(|choice| !choice.done)?;

        // The parent's tentative mark comes off once we descend past it;
        // a permanent mark means an exhausted subtree.
        if self.sched_index > 0 {
            let (head, _) = self.schedule_stack.split_at_mut(self.sched_index);
            unmark_last_done(head.last_mut().expect("non-empty prefix"));
        }

        let level = &mut self.schedule_stack[self.sched_index];
        let value = level[pos].value;
        if !enabled.contains(&value) {
            return None;
        }
        level[pos].done = true;
        self.sched_index += 1;

        tracing::trace!(level = self.sched_index, op = %value, "dfs scheduling choice");
        Some(value)
    }

    fn next_boolean(&mut self, _max_value: u64) -> Option<bool> {
        if self.nondet_index >= self.nondet_stack.len() {
            self.nondet_stack.push(NondetLevel::Bool(vec![
                Choice::new(false),
                Choice::new(true),
            ]));
        }

        if self.nondet_index > 0 {
            let (head, _) = self.nondet_stack.split_at_mut(self.nondet_index);
            match head.last_mut().expect("non-empty prefix") {
                NondetLevel::Bool(choices) => unmark_last_done(choices),
                NondetLevel::Int(choices) => unmark_last_done(choices),
            }
        }

        let NondetLevel::Bool(level) = &mut self.nondet_stack[self.nondet_index] else {
            return None;
        };
        let choice = level.iter_mut().find(|choice| !choice.done)?;
        let value = choice.value;
        choice.done = true;
        self.nondet_index += 1;
        Some(value)
    }

    fn next_integer(&mut self, max_value: u64) -> Option<u64> {
        if self.nondet_index >= self.nondet_stack.len() {
            self.nondet_stack
                .push(NondetLevel::Int((0..max_value).map(Choice::new).collect()));
        }

        if self.nondet_index > 0 {
            let (head, _) = self.nondet_stack.split_at_mut(self.nondet_index);
            match head.last_mut().expect("non-empty prefix") {
                NondetLevel::Bool(choices) => unmark_last_done(choices),
                NondetLevel::Int(choices) => unmark_last_done(choices),
            }
        }

        let NondetLevel::Int(level) = &mut self.nondet_stack[self.nondet_index] else {
            return None;
        };
        let choice = level.iter_mut().find(|choice| !choice.done)?;
        let value = choice.value;
        choice.done = true;
        self.nondet_index += 1;
        Some(value)
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        if !self.started {
            self.started = true;
            return true;
        }

        self.sched_index = 0;
        self.nondet_index = 0;

        self.backtrack_nondet();
        if self.nondet_stack.is_empty() {
            self.backtrack_schedule();
        } else if let Some(level) = self.schedule_stack.last_mut() {
            // Nondeterministic values remain: retry the same schedule
            // path with the next value assignment.
            unmark_last_done(level);
        }

        !self.has_finished()
    }

    fn notify_scheduling_ended(&mut self, _bug_found: bool) {}

    fn description(&self) -> String {
        "dfs".to_string()
    }
}

/// DFS restarted under a growing step ceiling.
///
/// When the inner DFS exhausts the tree reachable within the current
/// ceiling, the ceiling grows by the initial bound and the search
/// restarts from a fresh tree.
pub struct IterativeDeepeningDfsStrategy {
    dfs: DfsStrategy,
    current_bound: usize,
    increment: usize,
    hard_ceiling: usize,
}

impl IterativeDeepeningDfsStrategy {
    /// Create an IDDFS strategy.
    ///
    /// `hard_ceiling` of zero means no upper limit on deepening.
    #[must_use]
    pub fn new(initial_bound: usize, hard_ceiling: usize) -> Self {
        let bound = initial_bound.max(1);
        Self {
            dfs: DfsStrategy::new(),
            current_bound: bound,
            increment: bound,
            hard_ceiling,
        }
    }

    /// The ceiling currently in force.
    #[must_use]
    pub fn current_bound(&self) -> usize {
        self.current_bound
    }
}

impl Strategy for IterativeDeepeningDfsStrategy {
    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        current: OperationId,
    ) -> Option<OperationId> {
        self.dfs.next_operation(enabled, current)
    }

    fn next_boolean(&mut self, max_value: u64) -> Option<bool> {
        self.dfs.next_boolean(max_value)
    }

    fn next_integer(&mut self, max_value: u64) -> Option<u64> {
        self.dfs.next_integer(max_value)
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        if self.dfs.prepare_for_next_iteration() {
            return true;
        }
        if self.hard_ceiling > 0 && self.current_bound >= self.hard_ceiling {
            return false;
        }
        self.current_bound = self.current_bound.saturating_add(self.increment);
        if self.hard_ceiling > 0 {
            self.current_bound = self.current_bound.min(self.hard_ceiling);
        }
        tracing::debug!(bound = self.current_bound, "iddfs deepening restart");
        self.dfs = DfsStrategy::new();
        self.dfs.prepare_for_next_iteration()
    }

    fn notify_scheduling_ended(&mut self, bug_found: bool) {
        self.dfs.notify_scheduling_ended(bug_found);
    }

    fn step_limit(&self) -> Option<usize> {
        Some(self.current_bound)
    }

    fn description(&self) -> String {
        format!("iddfs, bound {}", self.current_bound)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn ops(ids: &[u64]) -> Vec<OperationId> {
        ids.iter().map(|id| OperationId(*id)).collect()
    }

    /// Drive DFS over a fixed two-level branching program and collect
    /// every explored path.
    #[test]
    fn test_dfs_visits_every_path_exactly_once() {
        let mut dfs = DfsStrategy::new();
        let enabled = ops(&[0, 1]);
        let mut paths = BTreeSet::new();
        let mut iterations = 0;

        while dfs.prepare_for_next_iteration() {
            iterations += 1;
            assert!(iterations <= 8, "dfs failed to exhaust");
            let first = dfs.next_operation(&enabled, OperationId(0)).unwrap();
            let second = dfs.next_operation(&enabled, OperationId(0)).unwrap();
            assert!(paths.insert((first, second)), "path explored twice");
        }

        // Two binary decisions: four distinct interleavings.
        assert_eq!(iterations, 4);
        assert_eq!(paths.len(), 4);
    }

    #[test]
    fn test_dfs_enumerates_boolean_assignments() {
        let mut dfs = DfsStrategy::new();
        let mut seen = Vec::new();

        while dfs.prepare_for_next_iteration() {
            let a = dfs.next_boolean(2).unwrap();
            let b = dfs.next_boolean(2).unwrap();
            seen.push((a, b));
            assert!(seen.len() <= 4, "dfs failed to exhaust booleans");
        }

        assert_eq!(
            seen,
            vec![
                (false, false),
                (false, true),
                (true, false),
                (true, true),
            ]
        );
    }

    #[test]
    fn test_dfs_interleaves_schedule_and_value_choices() {
        let mut dfs = DfsStrategy::new();
        let enabled = ops(&[0, 1]);
        let mut seen = BTreeSet::new();

        while dfs.prepare_for_next_iteration() {
            let op = dfs.next_operation(&enabled, OperationId(0)).unwrap();
            let flag = dfs.next_boolean(2).unwrap();
            assert!(seen.insert((op, flag)));
            assert!(seen.len() <= 4);
        }

        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_dfs_single_path_program_exhausts_after_one_iteration() {
        let mut dfs = DfsStrategy::new();
        assert!(dfs.prepare_for_next_iteration());
        let only = ops(&[3]);
        assert_eq!(
            dfs.next_operation(&only, OperationId(3)),
            Some(OperationId(3))
        );
        assert!(!dfs.prepare_for_next_iteration());
    }

    #[test]
    fn test_iddfs_deepens_after_exhaustion() {
        let mut iddfs = IterativeDeepeningDfsStrategy::new(2, 6);
        assert_eq!(iddfs.step_limit(), Some(2));

        // Exhaust a trivial tree; the wrapper should deepen rather
        // than finish.
        assert!(iddfs.prepare_for_next_iteration());
        iddfs.next_boolean(2).unwrap();
        assert!(iddfs.prepare_for_next_iteration());
        iddfs.next_boolean(2).unwrap();
        // Inner tree exhausted: next prepare deepens.
        assert!(iddfs.prepare_for_next_iteration());
        assert_eq!(iddfs.step_limit(), Some(4));
    }
}
