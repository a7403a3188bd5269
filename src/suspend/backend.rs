/*!
 * Sysfs Suspend Backend
 * Wakeup-count handshake primitives over /sys
 */

use super::traits::SuspendBackend;
use crate::core::errors::{PowerError, PowerResult};
use crate::core::limits::{SUSPEND_STATE, SUSPEND_STATE_PATH, WAKEUP_COUNT_PATH, WAKEUP_REASON_PATH};
use std::fs;
use std::path::PathBuf;

/// Suspend handshake against the kernel's sysfs files
pub struct SysfsSuspendBackend {
    root: PathBuf,
}

impl SysfsSuspendBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SuspendBackend for SysfsSuspendBackend {
    fn read_wakeup_count(&self) -> PowerResult<u64> {
        let raw = fs::read_to_string(self.root.join(WAKEUP_COUNT_PATH))?;
        raw.trim()
            .parse()
            .map_err(|_| PowerError::Io(format!("malformed wakeup count: {:?}", raw.trim())))
    }

    fn write_wakeup_count(&self, count: u64) -> PowerResult<()> {
        fs::write(self.root.join(WAKEUP_COUNT_PATH), count.to_string())?;
        Ok(())
    }

    fn enter_suspend(&self) -> PowerResult<()> {
        fs::write(self.root.join(SUSPEND_STATE_PATH), SUSPEND_STATE)?;
        Ok(())
    }

    fn last_wakeup_reason(&self) -> PowerResult<String> {
        let reason = fs::read_to_string(self.root.join(WAKEUP_REASON_PATH))?;
        Ok(reason.trim().to_string())
    }
}
