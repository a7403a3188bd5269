/*!
 * Running Lock Registry Builder
 * Builder pattern for RunningLockRegistry construction
 */

use super::activation::{build_counters, ActivationContext};
use super::death::DeathRecipientRegistry;
use super::registry::{RegistryParts, RunningLockRegistry};
use crate::core::config::PowerConfig;
use crate::core::errors::PowerResult;
use crate::core::id::HandleAllocator;
use crate::core::state_machine::StandaloneStateMachine;
use crate::core::traits::{DeathNotifier, PowerStateMachine};
use crate::monitoring::LockEventSink;
use crate::proximity::{ProximityGate, ProximitySensor};
use crate::suspend::{
    DriverConnection, DriverProvider, SuspendBackend, SuspendCoordinator, SysfsDriverProvider,
    SysfsSuspendBackend,
};
use std::sync::Arc;
use tracing::info;

/// Builder for RunningLockRegistry
///
/// Every collaborator is optional; missing ones fall back to the sysfs driver
/// and backend under `config.sysfs_root`, an in-memory state machine, an
/// in-process death notifier and no proximity sensor.
pub struct RunningLockRegistryBuilder {
    config: PowerConfig,
    state_machine: Option<Arc<dyn PowerStateMachine>>,
    death: Option<Arc<dyn DeathNotifier>>,
    sensor: Option<Arc<dyn ProximitySensor>>,
    driver_provider: Option<Arc<dyn DriverProvider>>,
    backend: Option<Arc<dyn SuspendBackend>>,
    suspend: Option<Arc<SuspendCoordinator>>,
    sink: Option<Arc<dyn LockEventSink>>,
    first_handle: u64,
}

impl RunningLockRegistryBuilder {
    pub fn new() -> Self {
        Self {
            config: PowerConfig::default(),
            state_machine: None,
            death: None,
            sensor: None,
            driver_provider: None,
            backend: None,
            suspend: None,
            sink: None,
            first_handle: 1,
        }
    }

    pub fn with_config(mut self, config: PowerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_state_machine(mut self, state_machine: Arc<dyn PowerStateMachine>) -> Self {
        self.state_machine = Some(state_machine);
        self
    }

    pub fn with_death_notifier(mut self, death: Arc<dyn DeathNotifier>) -> Self {
        self.death = Some(death);
        self
    }

    /// Proximity sensor feed; ignored when proximity is disabled in config
    pub fn with_proximity_sensor(mut self, sensor: Arc<dyn ProximitySensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_driver_provider(mut self, provider: Arc<dyn DriverProvider>) -> Self {
        self.driver_provider = Some(provider);
        self
    }

    pub fn with_suspend_backend(mut self, backend: Arc<dyn SuspendBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Share an existing coordinator instead of building one
    pub fn with_suspend_coordinator(mut self, suspend: Arc<SuspendCoordinator>) -> Self {
        self.suspend = Some(suspend);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn LockEventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// First value issued by `create`
    pub fn with_first_handle(mut self, first: u64) -> Self {
        self.first_handle = first;
        self
    }

    pub fn build(self) -> PowerResult<RunningLockRegistry> {
        let config = self.config;
        let root = config.sysfs_root.clone();

        let suspend = match self.suspend {
            Some(suspend) => suspend,
            None => {
                let provider = self
                    .driver_provider
                    .unwrap_or_else(|| Arc::new(SysfsDriverProvider::new(root.clone())));
                let backend = self
                    .backend
                    .unwrap_or_else(|| Arc::new(SysfsSuspendBackend::new(root.clone())));
                Arc::new(SuspendCoordinator::new(
                    DriverConnection::new(provider),
                    backend,
                    config.auto_suspend_interval,
                ))
            }
        };

        let state_machine = self
            .state_machine
            .unwrap_or_else(|| Arc::new(StandaloneStateMachine::default()));
        let death = self
            .death
            .unwrap_or_else(|| Arc::new(DeathRecipientRegistry::new()));
        let sensor = if config.proximity_enabled { self.sensor } else { None };

        let gate = ProximityGate::new(sensor, state_machine.clone());
        let counters = build_counters(&ActivationContext {
            suspend: suspend.clone(),
            state_machine: state_machine.clone(),
            gate: gate.clone(),
        });

        if config.auto_suspend {
            suspend.start_auto_suspend()?;
        }

        info!(
            sysfs_root = %root.display(),
            auto_suspend = config.auto_suspend,
            proximity = gate.state().supported,
            "Running lock registry initialized"
        );

        Ok(RunningLockRegistry::from_parts(RegistryParts {
            counters,
            gate,
            suspend,
            state_machine,
            death,
            allocator: HandleAllocator::new(self.first_handle),
            sink: self.sink,
        }))
    }
}

impl Default for RunningLockRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningLockRegistry {
    pub fn builder() -> RunningLockRegistryBuilder {
        RunningLockRegistryBuilder::new()
    }
}
