//! Liveness monitoring: monitor hot/cold tracking and the
//! fingerprint-recurrence state cache.
//!
//! A monitor is "hot" while a condition that must eventually progress is
//! outstanding. When a global-state fingerprint recurs while any monitor
//! is hot, the iteration has entered a cycle it can repeat forever: a
//! potential livelock. The cache is scoped to the interval since the
//! last point where all monitors were cold; a new scope starts only on
//! transitions into all-cold, which avoids false positives from stale
//! prefixes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::fingerprint::Fingerprint;

/// Unique monitor identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonitorId(pub u64);

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor({})", self.0)
    }
}

/// Observable state of one monitor, as fed into fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// Monitor name.
    pub name: String,
    /// Current state name.
    pub state: String,
    /// Whether the state is hot.
    pub hot: bool,
}

struct MonitorEntry {
    id: MonitorId,
    snapshot: MonitorSnapshot,
}

/// A detected fingerprint recurrence while hot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleDetected {
    /// Step index of the first occurrence.
    pub first_seen_step: usize,
    /// Names of the monitors that were hot.
    pub hot_monitors: Vec<String>,
}

/// Monitor registry and iteration-scoped state cache.
#[derive(Default)]
pub struct LivenessMonitor {
    monitors: Vec<MonitorEntry>,
    cache: HashMap<Fingerprint, usize>,
    next_id: u64,
}

impl LivenessMonitor {
    /// Create an empty liveness monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a monitor in its initial state.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        initial_state: impl Into<String>,
        hot: bool,
    ) -> MonitorId {
        let id = MonitorId(self.next_id);
        self.next_id += 1;
        self.monitors.push(MonitorEntry {
            id,
            snapshot: MonitorSnapshot {
                name: name.into(),
                state: initial_state.into(),
                hot,
            },
        });
        id
    }

    /// Record a monitor state transition.
    ///
    /// A transition that brings every monitor cold starts a new cache
    /// scope.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownMonitor`] for unregistered ids.
    pub fn set_state(
        &mut self,
        id: MonitorId,
        state: impl Into<String>,
        hot: bool,
    ) -> Result<(), EngineError> {
        let was_hot = self.any_hot();
        let entry = self
            .monitors
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(EngineError::UnknownMonitor(id.0))?;
        entry.snapshot.state = state.into();
        entry.snapshot.hot = hot;
        if was_hot && !self.any_hot() {
            self.cache.clear();
        }
        Ok(())
    }

    /// Whether any monitor is currently hot.
    #[must_use]
    pub fn any_hot(&self) -> bool {
        self.monitors.iter().any(|entry| entry.snapshot.hot)
    }

    /// Names of the currently hot monitors.
    #[must_use]
    pub fn hot_monitors(&self) -> Vec<String> {
        self.monitors
            .iter()
            .filter(|entry| entry.snapshot.hot)
            .map(|entry| entry.snapshot.name.clone())
            .collect()
    }

    /// Snapshot of every monitor, in registration order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<MonitorSnapshot> {
        self.monitors
            .iter()
            .map(|entry| entry.snapshot.clone())
            .collect()
    }

    /// Record the fingerprint taken after one step.
    ///
    /// Returns a [`CycleDetected`] when the fingerprint recurs while at
    /// least one monitor is hot.
    pub fn record_step(&mut self, fingerprint: Fingerprint, step: usize) -> Option<CycleDetected> {
        if !self.any_hot() {
            return None;
        }
        if let Some(first) = self.cache.get(&fingerprint) {
            return Some(CycleDetected {
                first_seen_step: *first,
                hot_monitors: self.hot_monitors(),
            });
        }
        self.cache.insert(fingerprint, step);
        None
    }

    /// Hot monitors at clean program termination; non-empty means a
    /// liveness violation even without a cycle.
    #[must_use]
    pub fn check_termination(&self) -> Vec<String> {
        self.hot_monitors()
    }

    /// Reset cache and monitors for a new iteration.
    pub fn reset(&mut self) {
        self.monitors.clear();
        self.cache.clear();
        self.next_id = 0;
    }

    /// Number of cached fingerprints in the current scope.
    #[must_use]
    pub fn cached_states(&self) -> usize {
        self.cache.len()
    }
}
