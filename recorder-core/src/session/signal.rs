use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::RecorderError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SignalState {
    Pending,
    Ready,
    Failed(String),
}

/// One-shot readiness flag that setup threads raise and producer threads
/// wait on.
///
/// Once set (ready or failed) the signal never changes again.
#[derive(Debug)]
pub struct ReadySignal {
    name: &'static str,
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl ReadySignal {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(SignalState::Pending),
            cond: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Mark ready and wake every waiter. Returns false if already set.
    pub fn set_ready(&self) -> bool {
        self.settle(SignalState::Ready)
    }

    /// Mark failed so waiters stop blocking. Returns false if already set.
    pub fn set_failed(&self, reason: impl Into<String>) -> bool {
        self.settle(SignalState::Failed(reason.into()))
    }

    fn settle(&self, next: SignalState) -> bool {
        let mut state = self.state.lock();
        if *state != SignalState::Pending {
            return false;
        }
        *state = next;
        self.cond.notify_all();
        true
    }

    pub fn is_ready(&self) -> bool {
        *self.state.lock() == SignalState::Ready
    }

    /// The failure reason, if setup failed.
    pub fn failure(&self) -> Option<String> {
        match &*self.state.lock() {
            SignalState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Block until the signal is set, or until `timeout` elapses.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<(), RecorderError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            match &*state {
                SignalState::Ready => return Ok(()),
                SignalState::Failed(reason) => {
                    return Err(RecorderError::SetupFailed(format!("{}: {}", self.name, reason)))
                }
                SignalState::Pending => {}
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out() && *state == SignalState::Pending {
                        return Err(RecorderError::Timeout(self.name.to_string()));
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
    }
}
