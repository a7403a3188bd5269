/*!
 * Core Traits
 * Collaborator abstractions consumed by the power service
 */

use super::id::ClientHandle;
use super::types::{PowerState, StateChangeReason};

/// Device power-state machine
///
/// Owned by the surrounding power service; the running lock core only
/// requests transitions and timer resets through it.
pub trait PowerStateMachine: Send + Sync {
    /// Request a transition, returns whether it was accepted
    fn set_state(&self, state: PowerState, reason: StateChangeReason, immediate: bool) -> bool;

    /// Current power state
    fn get_state(&self) -> PowerState;

    /// Restart the screen-off countdown
    fn reset_inactive_timer(&self);

    /// Restart the countdown into sleep
    fn reset_sleep_timer(&self);
}

/// One-shot callback fired when the process owning a handle dies
pub type DeathCallback = Box<dyn FnOnce(ClientHandle) + Send + Sync + 'static>;

/// Owner-death notification channel
pub trait DeathNotifier: Send + Sync {
    /// Register a one-shot callback, returns false if the handle already has one
    fn register(&self, handle: ClientHandle, callback: DeathCallback) -> bool;

    /// Drop the callback without firing it
    fn unregister(&self, handle: ClientHandle) -> bool;
}
