/*!
 * Proximity Gate
 *
 * Near/far latch for the proximity screen-control lock type. Sensor readings
 * only drive the power state while that type holds at least one lock.
 */

use super::traits::{ProximityCallback, ProximitySensor};
use crate::core::errors::PowerResult;
use crate::core::limits::PROXIMITY_SUBSCRIBER_NAME;
use crate::core::traits::PowerStateMachine;
use crate::core::types::{PowerState, StateChangeReason};
use crate::runninglock::TypeCounter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, info, warn};

/// Snapshot of the gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximityState {
    pub supported: bool,
    pub enabled: bool,
    pub is_close: bool,
}

pub struct ProximityGate {
    state: Mutex<ProximityState>,
    sensor: Option<Arc<dyn ProximitySensor>>,
    state_machine: Arc<dyn PowerStateMachine>,
    counter: OnceLock<Weak<TypeCounter>>,
    self_ref: Weak<ProximityGate>,
}

impl ProximityGate {
    /// Create a gate; without a sensor it stays unsupported and inert
    pub fn new(
        sensor: Option<Arc<dyn ProximitySensor>>,
        state_machine: Arc<dyn PowerStateMachine>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            state: Mutex::new(ProximityState {
                supported: sensor.is_some(),
                enabled: false,
                is_close: false,
            }),
            sensor,
            state_machine,
            counter: OnceLock::new(),
            self_ref: self_ref.clone(),
        })
    }

    /// Bind the counter whose count gates state transitions
    pub fn attach_counter(&self, counter: &Arc<TypeCounter>) {
        if self.counter.set(Arc::downgrade(counter)).is_err() {
            warn!("Proximity gate counter already attached");
        }
    }

    fn held_count(&self) -> u32 {
        self.counter
            .get()
            .and_then(Weak::upgrade)
            .map_or(0, |counter| counter.count())
    }

    /// Subscribe to the sensor
    ///
    /// Unsupported or failing sensors degrade to a disabled gate.
    pub fn enable(&self) -> PowerResult<()> {
        let Some(sensor) = self.sensor.clone() else {
            debug!("Proximity sensor not supported, gate stays disabled");
            return Ok(());
        };
        {
            let mut state = self.state.lock();
            if state.enabled {
                return Ok(());
            }
            state.enabled = true;
            state.is_close = false;
        }

        let weak = self.self_ref.clone();
        let callback: ProximityCallback = Arc::new(move |close| {
            if let Some(gate) = weak.upgrade() {
                if close {
                    gate.on_close();
                } else {
                    gate.on_away();
                }
            }
        });

        if let Err(e) = sensor.subscribe(PROXIMITY_SUBSCRIBER_NAME, callback) {
            warn!(error = %e, "Proximity subscribe failed, gate disabled");
            self.state.lock().enabled = false;
            return Ok(());
        }
        info!("Proximity gate enabled");
        Ok(())
    }

    /// Unsubscribe and clear the latch; returns whether it was latched close
    pub fn disable(&self) -> bool {
        let was_close = {
            let mut state = self.state.lock();
            if !state.enabled {
                return false;
            }
            state.enabled = false;
            std::mem::replace(&mut state.is_close, false)
        };

        if let Some(sensor) = &self.sensor {
            if let Err(e) = sensor.unsubscribe(PROXIMITY_SUBSCRIBER_NAME) {
                warn!(error = %e, "Proximity unsubscribe failed");
            }
        }
        info!(was_close, "Proximity gate disabled");
        was_close
    }

    /// Sensor reports an object near
    pub fn on_close(&self) {
        {
            let mut state = self.state.lock();
            if !state.enabled || state.is_close {
                return;
            }
            state.is_close = true;
        }

        let held = self.held_count();
        debug!(held, "Proximity close");
        if held > 0 {
            info!("Proximity close with lock held, screen going inactive");
            self.state_machine
                .set_state(PowerState::Inactive, StateChangeReason::Proximity, false);
            self.state_machine.reset_sleep_timer();
        }
    }

    /// Sensor reports the object moved away
    pub fn on_away(&self) {
        {
            let mut state = self.state.lock();
            if !state.enabled || !state.is_close {
                return;
            }
            state.is_close = false;
        }

        let held = self.held_count();
        debug!(held, "Proximity away");
        if held > 0 {
            info!("Proximity away with lock held, waking screen");
            self.state_machine
                .set_state(PowerState::Awake, StateChangeReason::Proximity, true);
        }
    }

    pub fn is_close(&self) -> bool {
        self.state.lock().is_close
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn state(&self) -> ProximityState {
        *self.state.lock()
    }
}
