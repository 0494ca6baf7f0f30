//! Per-operation turn signal.
//!
//! Each operation's thread parks on its own signal and runs only while
//! the controller has granted it the turn. The signal is an explicit,
//! owned synchronization primitive (mutex plus condvar) so the
//! cooperative model sits directly on preemptive OS threads.

use std::sync::{Condvar, Mutex};

/// The operation's thread must stop executing: the iteration has ended
/// (bug found, schedule exhausted, or cancellation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped;

#[derive(Default)]
struct SignalState {
    active: bool,
    stopped: bool,
}

/// Turn signal owned by one operation.
#[derive(Default)]
pub struct OpSignal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl OpSignal {
    /// Create a parked signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant the turn to this operation and wake its thread.
    pub fn grant(&self) {
        let mut state = self.state.lock().expect("signal lock poisoned");
        state.active = true;
        self.cond.notify_all();
    }

    /// Revoke the turn before granting another operation.
    pub fn revoke(&self) {
        let mut state = self.state.lock().expect("signal lock poisoned");
        state.active = false;
    }

    /// Release the thread permanently; any current or future wait
    /// returns [`Stopped`].
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("signal lock poisoned");
        state.stopped = true;
        self.cond.notify_all();
    }

    /// Park until granted.
    ///
    /// # Errors
    ///
    /// Returns [`Stopped`] when the signal was stopped; the caller must
    /// unwind without running further actor code.
    pub fn wait_turn(&self) -> Result<(), Stopped> {
        let mut state = self.state.lock().expect("signal lock poisoned");
        while !state.active && !state.stopped {
            state = self.cond.wait(state).expect("signal lock poisoned");
        }
        if state.stopped {
            return Err(Stopped);
        }
        Ok(())
    }

    /// Whether this signal currently holds the turn.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().expect("signal lock poisoned").active
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_grant_wakes_waiter() {
        let signal = Arc::new(OpSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait_turn())
        };
        signal.grant();
        assert_eq!(waiter.join().expect("waiter panicked"), Ok(()));
        assert!(signal.is_active());
    }

    #[test]
    fn test_stop_releases_waiter() {
        let signal = Arc::new(OpSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait_turn())
        };
        signal.stop();
        assert_eq!(waiter.join().expect("waiter panicked"), Err(Stopped));
    }

    #[test]
    fn test_grant_before_wait_is_not_lost() {
        let signal = OpSignal::new();
        signal.grant();
        assert_eq!(signal.wait_turn(), Ok(()));
    }
}
