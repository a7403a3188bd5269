/*!
 * Suspend Traits
 * Kernel power driver and suspend handshake abstractions
 */

use super::types::DriverStatus;
use crate::core::errors::PowerResult;
use crate::core::types::RunningLockInfo;
use std::sync::Arc;

/// Kernel power driver interface
pub trait PowerDriver: Send + Sync {
    /// Take a kernel wake lock for the given request
    fn hold_lock(&self, info: &RunningLockInfo, handle_id: u64, owner: &str) -> DriverStatus;

    /// Drop a kernel wake lock taken by `hold_lock`
    fn unhold_lock(&self, info: &RunningLockInfo, handle_id: u64, owner: &str) -> DriverStatus;

    /// Allow the driver to suspend autonomously
    fn start_suspend(&self) -> DriverStatus;

    /// Stop autonomous suspend
    fn stop_suspend(&self) -> DriverStatus;

    /// Suspend immediately
    fn force_suspend(&self) -> DriverStatus;

    /// Driver-side diagnostic text
    fn dump(&self) -> Option<String> {
        None
    }
}

/// Source of driver connections
pub trait DriverProvider: Send + Sync {
    /// Connect to the driver service, `None` while it is not running
    fn connect(&self) -> Option<Arc<dyn PowerDriver>>;
}

/// Kernel primitives used by the auto-suspend handshake
pub trait SuspendBackend: Send + Sync {
    /// Read the current wakeup event count
    fn read_wakeup_count(&self) -> PowerResult<u64>;

    /// Write the count back; the kernel rejects it if events arrived since the read
    fn write_wakeup_count(&self, count: u64) -> PowerResult<()>;

    /// Enter suspend; returns once the system has woken up again
    fn enter_suspend(&self) -> PowerResult<()>;

    /// Reason reported for the last resume
    fn last_wakeup_reason(&self) -> PowerResult<String>;
}
