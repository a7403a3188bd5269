/*!
 * Shared fixtures for running lock tests
 */

#![allow(dead_code)]

use mockall::mock;
use parking_lot::Mutex;
use powermgr::core::errors::PowerResult;
use powermgr::{
    DriverProvider, DriverStatus, PowerConfig, PowerDriver, PowerError, PowerState,
    PowerStateMachine, RunningLockInfo, RunningLockRegistry, RunningLockRegistryBuilder,
    StandaloneStateMachine, StateChangeReason, SuspendBackend,
};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

mock! {
    pub StateMachine {}

    impl PowerStateMachine for StateMachine {
        fn set_state(&self, state: PowerState, reason: StateChangeReason, immediate: bool) -> bool;
        fn get_state(&self) -> PowerState;
        fn reset_inactive_timer(&self);
        fn reset_sleep_timer(&self);
    }
}

/// Driver that records calls and fails on demand
#[derive(Default)]
pub struct FakeDriver {
    pub holds: AtomicU32,
    pub unholds: AtomicU32,
    /// Non-zero makes hold/unhold answer `Failure(code)`
    pub fail_code: AtomicI32,
    pub held: Mutex<Vec<(String, u64)>>,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn holds(&self) -> u32 {
        self.holds.load(Ordering::SeqCst)
    }

    pub fn unholds(&self) -> u32 {
        self.unholds.load(Ordering::SeqCst)
    }

    pub fn fail_with(&self, code: i32) {
        self.fail_code.store(code, Ordering::SeqCst);
    }

    fn reply(&self) -> Option<DriverStatus> {
        match self.fail_code.load(Ordering::SeqCst) {
            0 => None,
            code => Some(DriverStatus::Failure(code)),
        }
    }
}

impl PowerDriver for FakeDriver {
    fn hold_lock(&self, info: &RunningLockInfo, handle_id: u64, _owner: &str) -> DriverStatus {
        if let Some(status) = self.reply() {
            return status;
        }
        self.holds.fetch_add(1, Ordering::SeqCst);
        self.held.lock().push((info.name.clone(), handle_id));
        DriverStatus::Success
    }

    fn unhold_lock(&self, info: &RunningLockInfo, handle_id: u64, _owner: &str) -> DriverStatus {
        if let Some(status) = self.reply() {
            return status;
        }
        self.unholds.fetch_add(1, Ordering::SeqCst);
        self.held.lock().retain(|(name, id)| !(name == &info.name && *id == handle_id));
        DriverStatus::Success
    }

    fn start_suspend(&self) -> DriverStatus {
        DriverStatus::Success
    }

    fn stop_suspend(&self) -> DriverStatus {
        DriverStatus::Success
    }

    fn force_suspend(&self) -> DriverStatus {
        DriverStatus::Success
    }
}

pub struct FakeProvider(pub Arc<FakeDriver>);

impl DriverProvider for FakeProvider {
    fn connect(&self) -> Option<Arc<dyn PowerDriver>> {
        Some(self.0.clone())
    }
}

/// Backend that never completes a handshake
pub struct InertBackend;

impl SuspendBackend for InertBackend {
    fn read_wakeup_count(&self) -> PowerResult<u64> {
        Err(PowerError::Io("no wakeup count".to_string()))
    }

    fn write_wakeup_count(&self, _count: u64) -> PowerResult<()> {
        Ok(())
    }

    fn enter_suspend(&self) -> PowerResult<()> {
        Ok(())
    }

    fn last_wakeup_reason(&self) -> PowerResult<String> {
        Ok(String::new())
    }
}

/// Builder wired to a fake driver and an inert backend
pub fn builder(driver: &Arc<FakeDriver>) -> RunningLockRegistryBuilder {
    RunningLockRegistry::builder()
        .with_config(PowerConfig::default())
        .with_driver_provider(Arc::new(FakeProvider(driver.clone())))
        .with_suspend_backend(Arc::new(InertBackend))
}

pub fn registry(driver: &Arc<FakeDriver>) -> (RunningLockRegistry, StandaloneStateMachine) {
    let sm = StandaloneStateMachine::default();
    let registry = builder(driver)
        .with_state_machine(Arc::new(sm.clone()))
        .build()
        .unwrap();
    (registry, sm)
}

/// Poll `cond` until it holds or the timeout passes
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
