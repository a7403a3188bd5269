/*!
 * Standalone Power State Machine
 * In-memory state holder used when no device state machine is attached
 */

use super::traits::PowerStateMachine;
use super::types::{PowerState, StateChangeReason};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Records requested transitions and timer resets without driving hardware
#[derive(Clone)]
pub struct StandaloneStateMachine {
    state: Arc<RwLock<PowerState>>,
    transitions: Arc<AtomicU64>,
    inactive_resets: Arc<AtomicU64>,
    sleep_resets: Arc<AtomicU64>,
}

impl StandaloneStateMachine {
    pub fn new(initial: PowerState) -> Self {
        Self {
            state: Arc::new(RwLock::new(initial)),
            transitions: Arc::new(AtomicU64::new(0)),
            inactive_resets: Arc::new(AtomicU64::new(0)),
            sleep_resets: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    pub fn inactive_resets(&self) -> u64 {
        self.inactive_resets.load(Ordering::Relaxed)
    }

    pub fn sleep_resets(&self) -> u64 {
        self.sleep_resets.load(Ordering::Relaxed)
    }
}

impl Default for StandaloneStateMachine {
    fn default() -> Self {
        Self::new(PowerState::Awake)
    }
}

impl PowerStateMachine for StandaloneStateMachine {
    fn set_state(&self, state: PowerState, reason: StateChangeReason, immediate: bool) -> bool {
        let mut current = self.state.write();
        if *current == state {
            return true;
        }
        debug!(from = %*current, to = %state, ?reason, immediate, "Power state transition");
        *current = state;
        self.transitions.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn get_state(&self) -> PowerState {
        *self.state.read()
    }

    fn reset_inactive_timer(&self) {
        self.inactive_resets.fetch_add(1, Ordering::Relaxed);
    }

    fn reset_sleep_timer(&self) {
        self.sleep_resets.fetch_add(1, Ordering::Relaxed);
    }
}
