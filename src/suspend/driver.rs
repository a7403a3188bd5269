/*!
 * Driver Connection
 * Lazily connected kernel power driver handle and the sysfs driver
 */

use super::traits::{DriverProvider, PowerDriver};
use super::types::{DriverStatus, ServiceStatus};
use crate::core::limits::{SUSPEND_STATE, SUSPEND_STATE_PATH, WAKE_LOCK_PATH, WAKE_UNLOCK_PATH};
use crate::core::types::RunningLockInfo;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared driver handle
///
/// One cached connection guarded by its own lock. Calls run outside the lock
/// on a cloned handle; an `Unavailable` answer drops the cache and the call is
/// retried once on a fresh connection.
#[derive(Clone)]
pub struct DriverConnection {
    provider: Arc<dyn DriverProvider>,
    driver: Arc<Mutex<Option<Arc<dyn PowerDriver>>>>,
    reconnects: Arc<AtomicU64>,
}

impl DriverConnection {
    pub fn new(provider: Arc<dyn DriverProvider>) -> Self {
        Self {
            provider,
            driver: Arc::new(Mutex::new(None)),
            reconnects: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current driver, connecting if needed
    pub fn get(&self) -> Option<Arc<dyn PowerDriver>> {
        let mut slot = self.driver.lock();
        if slot.is_none() {
            *slot = self.provider.connect();
            if slot.is_some() {
                self.reconnects.fetch_add(1, Ordering::Relaxed);
                info!("Power driver connected");
            }
        }
        slot.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.driver.lock().is_some()
    }

    /// Number of successful (re)connections
    pub fn connect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Drop the cached handle; the next call reconnects
    pub fn reset(&self) {
        if self.driver.lock().take().is_some() {
            debug!("Power driver connection dropped");
        }
    }

    /// React to driver service start/stop notifications
    pub fn on_service_status(&self, status: ServiceStatus) {
        match status {
            ServiceStatus::Started => {
                self.reset();
                if self.get().is_none() {
                    warn!("Power driver reported started but connection failed");
                }
            }
            ServiceStatus::Stopped => {
                warn!("Power driver service stopped");
                self.reset();
            }
        }
    }

    /// Run a driver call with the replace-and-retry policy
    pub fn call<F>(&self, op: &'static str, f: F) -> DriverStatus
    where
        F: Fn(&dyn PowerDriver) -> DriverStatus,
    {
        for attempt in 0..2 {
            let Some(driver) = self.get() else {
                debug!(op, attempt, "Power driver not connected");
                return DriverStatus::Unavailable;
            };
            match f(driver.as_ref()) {
                DriverStatus::Unavailable => {
                    debug!(op, attempt, "Power driver unavailable, reconnecting");
                    self.reset();
                }
                status => return status,
            }
        }
        DriverStatus::Unavailable
    }
}

/// Kernel power driver over the sysfs wake lock interface
pub struct SysfsPowerDriver {
    root: PathBuf,
}

impl SysfsPowerDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Kernel lock name; type-level locks (handle 0) use their name as-is
    pub fn lock_tag(info: &RunningLockInfo, handle_id: u64) -> String {
        let name: String = info
            .name
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();
        if handle_id == 0 {
            name
        } else {
            format!("{}_{}", name, handle_id)
        }
    }

    fn write(&self, relative: &str, value: &str) -> DriverStatus {
        match write_existing(&self.root.join(relative), value) {
            Ok(()) => DriverStatus::Success,
            Err(e) => {
                warn!(path = relative, error = %e, "Sysfs write failed");
                DriverStatus::Failure(e.raw_os_error().unwrap_or(-1))
            }
        }
    }
}

/// Write to a file that must already exist, as sysfs attributes do
fn write_existing(path: &Path, value: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
    file.write_all(value.as_bytes())
}

impl PowerDriver for SysfsPowerDriver {
    fn hold_lock(&self, info: &RunningLockInfo, handle_id: u64, owner: &str) -> DriverStatus {
        let tag = Self::lock_tag(info, handle_id);
        debug!(tag = %tag, owner, "Holding kernel wake lock");
        self.write(WAKE_LOCK_PATH, &tag)
    }

    fn unhold_lock(&self, info: &RunningLockInfo, handle_id: u64, owner: &str) -> DriverStatus {
        let tag = Self::lock_tag(info, handle_id);
        debug!(tag = %tag, owner, "Releasing kernel wake lock");
        self.write(WAKE_UNLOCK_PATH, &tag)
    }

    // The auto-suspend loop runs in-process, so the driver has nothing to start
    fn start_suspend(&self) -> DriverStatus {
        DriverStatus::Success
    }

    fn stop_suspend(&self) -> DriverStatus {
        DriverStatus::Success
    }

    fn force_suspend(&self) -> DriverStatus {
        self.write(SUSPEND_STATE_PATH, SUSPEND_STATE)
    }

    fn dump(&self) -> Option<String> {
        Some(format!("sysfs driver root={}", self.root.display()))
    }
}

/// Connects to the sysfs driver when the wake lock interface is present
pub struct SysfsDriverProvider {
    root: PathBuf,
}

impl SysfsDriverProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DriverProvider for SysfsDriverProvider {
    fn connect(&self) -> Option<Arc<dyn PowerDriver>> {
        if self.root.join(WAKE_LOCK_PATH).exists() {
            Some(Arc::new(SysfsPowerDriver::new(self.root.clone())))
        } else {
            warn!(root = %self.root.display(), "Kernel wake lock interface not found");
            None
        }
    }
}
