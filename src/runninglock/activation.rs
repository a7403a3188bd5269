/*!
 * Activation Table
 *
 * System effect applied by each lock type's counter. Activations only see
 * the lock parameters and the collaborators below; none of them can reach
 * the registry.
 */

use super::counter::{ActivateFn, TypeCounter};
use crate::core::errors::PowerResult;
use crate::core::limits::BACKGROUND_LOCK_TAG;
use crate::core::traits::PowerStateMachine;
use crate::core::types::{LockParam, LockType, PowerState, RunningLockInfo, StateChangeReason};
use crate::proximity::ProximityGate;
use crate::suspend::SuspendCoordinator;
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Collaborators reachable from activations
#[derive(Clone)]
pub struct ActivationContext {
    pub suspend: Arc<SuspendCoordinator>,
    pub state_machine: Arc<dyn PowerStateMachine>,
    pub gate: Arc<ProximityGate>,
}

pub type CounterTable = HashMap<LockType, Arc<TypeCounter>, RandomState>;

/// One counter per lock type, with the proximity counter bound to the gate
pub fn build_counters(ctx: &ActivationContext) -> CounterTable {
    let mut table = CounterTable::with_hasher(RandomState::new());
    for lock_type in LockType::ALL {
        let counter = Arc::new(TypeCounter::for_type(lock_type, activation_for(lock_type, ctx)));
        if lock_type == LockType::ProximityScreenControl {
            ctx.gate.attach_counter(&counter);
        }
        table.insert(lock_type, counter);
    }
    table
}

fn activation_for(lock_type: LockType, ctx: &ActivationContext) -> ActivateFn {
    match lock_type {
        LockType::Screen => {
            let sm = ctx.state_machine.clone();
            Box::new(move |active, _param| {
                activate_screen(sm.as_ref(), active);
                Ok(())
            })
        }
        LockType::Background => {
            let suspend = ctx.suspend.clone();
            Box::new(move |active, param| activate_background(&suspend, active, param))
        }
        LockType::ProximityScreenControl => {
            let gate = ctx.gate.clone();
            let sm = ctx.state_machine.clone();
            Box::new(move |active, _param| {
                if active {
                    return gate.enable();
                }
                let was_close = gate.disable();
                info!(was_close, "Last proximity lock released, waking screen");
                sm.set_state(PowerState::Awake, StateChangeReason::RunningLock, false);
                Ok(())
            })
        }
        _ => {
            let suspend = ctx.suspend.clone();
            Box::new(move |active, param| forward_to_driver(&suspend, active, param))
        }
    }
}

fn activate_screen(sm: &dyn PowerStateMachine, active: bool) {
    let state = sm.get_state();
    if active {
        if state != PowerState::Awake {
            debug!(from = %state, "Screen lock waking device");
            sm.set_state(PowerState::Awake, StateChangeReason::RunningLock, true);
        }
    } else if state == PowerState::Awake {
        sm.reset_inactive_timer();
    }
}

/// Legacy background locks share one type-level kernel lock
fn activate_background(suspend: &SuspendCoordinator, active: bool, param: &LockParam) -> PowerResult<()> {
    let info = RunningLockInfo {
        name: BACKGROUND_LOCK_TAG.to_string(),
        lock_type: LockType::Background,
        timeout_ms: -1,
        pid: param.pid,
        uid: param.uid,
        bundle_name: String::new(),
    };
    if active {
        suspend.acquire(&info, 0, "")
    } else {
        suspend.release(&info, 0, "")
    }
}

fn forward_to_driver(suspend: &SuspendCoordinator, active: bool, param: &LockParam) -> PowerResult<()> {
    let info = RunningLockInfo::from(param);
    if active {
        suspend.acquire(&info, param.handle.id(), &param.bundle_name)
    } else {
        suspend.release(&info, param.handle.id(), &param.bundle_name)
    }
}
