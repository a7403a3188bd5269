/*!
 * Suspend Coordinator
 * Forwards activation edges to the kernel driver and owns the auto-suspend loop
 */

use super::auto_suspend::{AutoSuspendTask, SuspendBlocker};
use super::driver::DriverConnection;
use super::stats::AtomicSuspendStats;
use super::traits::SuspendBackend;
use super::types::{DriverStatus, ServiceStatus, SuspendStats};
use crate::core::errors::{PowerError, PowerResult};
use crate::core::types::RunningLockInfo;
use parking_lot::Mutex;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Bridge between running lock activations and kernel suspend
///
/// Every kernel hold also counts as a suspend veto, so the auto-suspend loop
/// never runs while a CPU lock is active.
pub struct SuspendCoordinator {
    connection: DriverConnection,
    backend: Arc<dyn SuspendBackend>,
    blocker: Arc<SuspendBlocker>,
    stats: Arc<AtomicSuspendStats>,
    interval: Duration,
    task: Mutex<Option<AutoSuspendTask>>,
}

impl SuspendCoordinator {
    pub fn new(connection: DriverConnection, backend: Arc<dyn SuspendBackend>, interval: Duration) -> Self {
        Self {
            connection,
            backend,
            blocker: Arc::new(SuspendBlocker::new()),
            stats: Arc::new(AtomicSuspendStats::new()),
            interval,
            task: Mutex::new(None),
        }
    }

    /// Take a kernel wake lock
    ///
    /// A missing driver degrades to a logged no-op; the hold still vetoes suspend.
    pub fn acquire(&self, info: &RunningLockInfo, handle_id: u64, owner: &str) -> PowerResult<()> {
        match self
            .connection
            .call("hold_lock", |d| d.hold_lock(info, handle_id, owner))
        {
            DriverStatus::Success => {}
            DriverStatus::Unavailable => {
                warn!(name = %info.name, handle = handle_id, "Power driver unavailable, hold not applied");
            }
            DriverStatus::Failure(code) => {
                error!(name = %info.name, handle = handle_id, code, "Power driver hold failed");
                return Err(PowerError::Driver { op: "hold_lock", code });
            }
        }
        self.blocker.inc();
        Ok(())
    }

    /// Drop a kernel wake lock
    pub fn release(&self, info: &RunningLockInfo, handle_id: u64, owner: &str) -> PowerResult<()> {
        match self
            .connection
            .call("unhold_lock", |d| d.unhold_lock(info, handle_id, owner))
        {
            DriverStatus::Success => {}
            DriverStatus::Unavailable => {
                warn!(name = %info.name, handle = handle_id, "Power driver unavailable, unhold not applied");
            }
            DriverStatus::Failure(code) => {
                error!(name = %info.name, handle = handle_id, code, "Power driver unhold failed");
                return Err(PowerError::Driver { op: "unhold_lock", code });
            }
        }
        self.blocker.dec();
        Ok(())
    }

    pub fn inc_suspend_block_counter(&self) {
        self.blocker.inc();
    }

    pub fn dec_suspend_block_counter(&self) {
        self.blocker.dec();
    }

    pub fn suspend_block_count(&self) -> u32 {
        self.blocker.count()
    }

    /// Start the auto-suspend loop; no-op if already running
    pub fn start_auto_suspend(&self) -> PowerResult<()> {
        let mut task = self.task.lock();
        if task.as_ref().map_or(false, |t| t.is_running()) {
            return Ok(());
        }

        let status = self.connection.call("start_suspend", |d| d.start_suspend());
        if !status.is_success() {
            warn!(?status, "Driver did not acknowledge start_suspend");
        }

        *task = Some(AutoSuspendTask::spawn(
            self.backend.clone(),
            self.blocker.clone(),
            self.stats.clone(),
            self.interval,
        )?);
        info!("Auto-suspend started");
        Ok(())
    }

    /// Stop the auto-suspend loop, waiting for an in-flight suspend to return
    pub fn stop_auto_suspend(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };

        let status = self.connection.call("stop_suspend", |d| d.stop_suspend());
        if !status.is_success() {
            warn!(?status, "Driver did not acknowledge stop_suspend");
        }
        task.shutdown();
    }

    pub fn is_auto_suspend_running(&self) -> bool {
        self.task.lock().as_ref().map_or(false, |t| t.is_running())
    }

    /// Wake the loop for an immediate attempt
    pub fn trigger_auto_suspend(&self) {
        if let Some(task) = self.task.lock().as_ref() {
            task.trigger();
        }
    }

    /// Suspend now, through the driver when connected, else through the backend
    pub fn force_suspend(&self) -> PowerResult<()> {
        match self.connection.call("force_suspend", |d| d.force_suspend()) {
            DriverStatus::Success => {}
            DriverStatus::Failure(code) => {
                return Err(PowerError::Driver { op: "force_suspend", code });
            }
            DriverStatus::Unavailable => {
                warn!("Power driver unavailable, forcing suspend through backend");
                self.backend.enter_suspend()?;
            }
        }
        self.stats.inc_forced();
        info!("Forced suspend completed");
        Ok(())
    }

    pub fn on_service_status(&self, status: ServiceStatus) {
        self.connection.on_service_status(status);
    }

    pub fn connection(&self) -> &DriverConnection {
        &self.connection
    }

    pub fn stats(&self) -> SuspendStats {
        self.stats.snapshot()
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "SUSPEND COORDINATOR DUMP:");
        let _ = writeln!(
            out,
            "  driverConnected={} connects={}",
            self.connection.is_connected(),
            self.connection.connect_count()
        );
        let _ = writeln!(out, "  suspendBlockCount={}", self.blocker.count());
        let _ = writeln!(
            out,
            "  autoSuspend={}",
            if self.is_auto_suspend_running() { "RUNNING" } else { "STOPPED" }
        );
        let _ = writeln!(out, "  {}", self.stats.snapshot());
        if let Some(driver_dump) = self.connection.get().and_then(|d| d.dump()) {
            let _ = writeln!(out, "  driver: {}", driver_dump);
        }
        out
    }
}

impl Drop for SuspendCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.shutdown();
        }
    }
}
