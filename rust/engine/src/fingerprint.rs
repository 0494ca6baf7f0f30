//! Global-state fingerprinting for liveness detection.
//!
//! A fingerprint hashes every live operation's status and observable
//! state (in creation order) plus every monitor's state. Two iterations
//! over the same decision sequence produce identical fingerprint
//! sequences; fingerprints are iteration-scoped and never persisted, so
//! stability across builds is not required.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::liveness::MonitorSnapshot;
use crate::operation::OperationStatus;
use crate::registry::OperationRegistry;

/// Hash of the global program snapshot after one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fp({:016x})", self.0)
    }
}

fn status_tag(status: OperationStatus) -> u8 {
    match status {
        OperationStatus::Enabled => 0,
        OperationStatus::BlockedOnReceive => 1,
        OperationStatus::BlockedOnWaitAll => 2,
        OperationStatus::BlockedOnWaitAny => 3,
        OperationStatus::Completed => 4,
    }
}

/// Fingerprint the registry and monitor snapshot.
#[must_use]
pub fn capture(registry: &OperationRegistry, monitors: &[MonitorSnapshot]) -> Fingerprint {
    // DefaultHasher::new() uses fixed keys, so the value is a pure
    // function of the snapshot within one build.
    let mut hasher = DefaultHasher::new();
    for op in registry.iter() {
        op.id.0.hash(&mut hasher);
        status_tag(op.status).hash(&mut hasher);
        op.state_hash().hash(&mut hasher);
    }
    for monitor in monitors {
        monitor.name.hash(&mut hasher);
        monitor.state.hash(&mut hasher);
        monitor.hot.hash(&mut hasher);
    }
    Fingerprint(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Operation, OperationId};

    fn registry_with_status(status: OperationStatus) -> OperationRegistry {
        let mut reg = OperationRegistry::new();
        reg.register(Operation::new(OperationId(0), "m0", status, None))
            .unwrap();
        reg
    }

    #[test]
    fn test_identical_snapshots_identical_fingerprints() {
        let a = registry_with_status(OperationStatus::Enabled);
        let b = registry_with_status(OperationStatus::Enabled);
        assert_eq!(capture(&a, &[]), capture(&b, &[]));
    }

    #[test]
    fn test_status_change_changes_fingerprint() {
        let a = registry_with_status(OperationStatus::Enabled);
        let b = registry_with_status(OperationStatus::BlockedOnReceive);
        assert_ne!(capture(&a, &[]), capture(&b, &[]));
    }

    #[test]
    fn test_monitor_state_participates() {
        let reg = registry_with_status(OperationStatus::Enabled);
        let cold = MonitorSnapshot {
            name: "progress".into(),
            state: "Idle".into(),
            hot: false,
        };
        let hot = MonitorSnapshot {
            name: "progress".into(),
            state: "Waiting".into(),
            hot: true,
        };
        assert_ne!(capture(&reg, &[cold]), capture(&reg, &[hot]));
    }
}
