//! Operation registry: creation-ordered bookkeeping of schedulable units.
//!
//! Iteration order is creation order everywhere. Strategies that break
//! ties by operation order are deterministic because of this guarantee,
//! so the order is a documented convention, not an accident.

use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::operation::{ActionKind, Operation, OperationId, OperationStatus};

/// Registry of all operations of one iteration.
#[derive(Default)]
pub struct OperationRegistry {
    ops: BTreeMap<OperationId, Operation>,
    order: Vec<OperationId>,
    torn_down: bool,
}

impl OperationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new operation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateOperation`] if the id is already
    /// registered; this is fatal for the run.
    pub fn register(&mut self, op: Operation) -> Result<(), EngineError> {
        if self.ops.contains_key(&op.id) {
            return Err(EngineError::DuplicateOperation(op.id));
        }
        self.order.push(op.id);
        self.ops.insert(op.id, op);
        Ok(())
    }

    /// Remove an operation entirely.
    pub fn unregister(&mut self, id: OperationId) {
        self.ops.remove(&id);
        self.order.retain(|other| *other != id);
    }

    /// All currently enabled operations, in creation order.
    ///
    /// Empty after teardown.
    #[must_use]
    pub fn enabled_operations(&self) -> Vec<OperationId> {
        if self.torn_down {
            return Vec::new();
        }
        self.order
            .iter()
            .filter(|id| {
                self.ops
                    .get(id)
                    .is_some_and(|op| op.status.is_enabled())
            })
            .copied()
            .collect()
    }

    /// All operations parked on a wait condition, in creation order.
    #[must_use]
    pub fn blocked_operations(&self) -> Vec<OperationId> {
        self.order
            .iter()
            .filter(|id| {
                self.ops
                    .get(id)
                    .is_some_and(|op| op.status.is_blocked())
            })
            .copied()
            .collect()
    }

    /// Update an operation's status.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownOperation`] for unregistered ids.
    pub fn set_status(
        &mut self,
        id: OperationId,
        status: OperationStatus,
    ) -> Result<(), EngineError> {
        let op = self
            .ops
            .get_mut(&id)
            .ok_or(EngineError::UnknownOperation(id))?;
        op.status = status;
        Ok(())
    }

    /// Record the kind of an operation's latest visible action.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownOperation`] for unregistered ids.
    pub fn set_last_action(
        &mut self,
        id: OperationId,
        action: ActionKind,
    ) -> Result<(), EngineError> {
        let op = self
            .ops
            .get_mut(&id)
            .ok_or(EngineError::UnknownOperation(id))?;
        op.last_action = action;
        Ok(())
    }

    /// Status of an operation, if registered.
    #[must_use]
    pub fn status(&self, id: OperationId) -> Option<OperationStatus> {
        self.ops.get(&id).map(|op| op.status)
    }

    /// Look up an operation.
    #[must_use]
    pub fn get(&self, id: OperationId) -> Option<&Operation> {
        self.ops.get(&id)
    }

    /// Name of an operation, or a placeholder for unknown ids.
    #[must_use]
    pub fn name(&self, id: OperationId) -> String {
        self.ops
            .get(&id)
            .map_or_else(|| id.to_string(), |op| op.name.clone())
    }

    /// Iterate all operations in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.order.iter().filter_map(|id| self.ops.get(id))
    }

    /// Whether every registered operation has completed.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.ops
            .values()
            .all(|op| op.status == OperationStatus::Completed)
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Tear the registry down; all subsequent enabled queries return
    /// the empty set.
    pub fn teardown(&mut self) {
        self.torn_down = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(id: u64, status: OperationStatus) -> Operation {
        Operation::new(OperationId(id), format!("m{id}"), status, None)
    }

    #[test]
    fn test_enabled_operations_preserve_creation_order() {
        let mut reg = OperationRegistry::new();
        reg.register(op(2, OperationStatus::Enabled)).unwrap();
        reg.register(op(0, OperationStatus::Enabled)).unwrap();
        reg.register(op(1, OperationStatus::BlockedOnReceive)).unwrap();

        // Creation order, not id order.
        assert_eq!(
            reg.enabled_operations(),
            vec![OperationId(2), OperationId(0)]
        );
    }

    #[test]
    fn test_duplicate_registration_is_fatal() {
        let mut reg = OperationRegistry::new();
        reg.register(op(0, OperationStatus::Enabled)).unwrap();
        let err = reg.register(op(0, OperationStatus::Enabled)).unwrap_err();
        assert_eq!(err, EngineError::DuplicateOperation(OperationId(0)));
    }

    #[test]
    fn test_teardown_empties_enabled_set() {
        let mut reg = OperationRegistry::new();
        reg.register(op(0, OperationStatus::Enabled)).unwrap();
        reg.teardown();
        assert!(reg.enabled_operations().is_empty());
    }

    #[test]
    fn test_blocked_and_completed_tracking() {
        let mut reg = OperationRegistry::new();
        reg.register(op(0, OperationStatus::Enabled)).unwrap();
        reg.register(op(1, OperationStatus::BlockedOnReceive)).unwrap();
        assert_eq!(reg.blocked_operations(), vec![OperationId(1)]);
        assert!(!reg.all_completed());

        reg.set_status(OperationId(0), OperationStatus::Completed).unwrap();
        reg.set_status(OperationId(1), OperationStatus::Completed).unwrap();
        assert!(reg.all_completed());
    }

    #[test]
    fn test_unknown_operation_errors() {
        let mut reg = OperationRegistry::new();
        let err = reg
            .set_status(OperationId(9), OperationStatus::Enabled)
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownOperation(OperationId(9)));
    }
}
