/*!
 * Service Limits and Constants
 *
 * Centralized location for paths, thresholds and tags used by the power service.
 * Organized by domain.
 */

use std::time::Duration;

// =============================================================================
// SYSFS INTERFACE
// =============================================================================

/// Default root of the kernel power interface
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// Kernel wake lock file, relative to the sysfs root
pub const WAKE_LOCK_PATH: &str = "power/wake_lock";

/// Kernel wake unlock file, relative to the sysfs root
pub const WAKE_UNLOCK_PATH: &str = "power/wake_unlock";

/// Wakeup event counter used by the suspend handshake
pub const WAKEUP_COUNT_PATH: &str = "power/wakeup_count";

/// System sleep state file
pub const SUSPEND_STATE_PATH: &str = "power/state";

/// Last resume reason reported by the kernel
pub const WAKEUP_REASON_PATH: &str = "kernel/wakeup_reasons/last_resume_reason";

/// Value written to the state file to suspend to RAM
pub const SUSPEND_STATE: &str = "mem";

// =============================================================================
// AUTO-SUSPEND
// =============================================================================

/// Pause between auto-suspend attempts
pub const DEFAULT_AUTO_SUSPEND_INTERVAL: Duration = Duration::from_millis(500);

/// Lower bound for a configured auto-suspend interval
pub const MIN_AUTO_SUSPEND_INTERVAL: Duration = Duration::from_millis(10);

// =============================================================================
// RUNNING LOCKS
// =============================================================================

/// Pids below this value cannot be proxied
pub const VALID_PID_LIMIT: i32 = 1;

/// Holds longer than this are reported when the lock is released (2 hours)
pub const APP_HOLD_RUNNINGLOCK_TIMEOUT_MS: u128 = 7_200_000;

/// Kernel wake lock tag used by the legacy background type
pub const BACKGROUND_LOCK_TAG: &str = "PowerMgr.Background";

/// Name under which the service registers with the proximity sensor
pub const PROXIMITY_SUBSCRIBER_NAME: &str = "RunningLock";
