/*!
 * Service Configuration
 *
 * Runtime configuration resolved from POWERMGR_* environment variables
 */

use super::errors::{PowerError, PowerResult};
use super::limits::{DEFAULT_AUTO_SUSPEND_INTERVAL, DEFAULT_SYSFS_ROOT, MIN_AUTO_SUSPEND_INTERVAL};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_SYSFS_ROOT: &str = "POWERMGR_SYSFS_ROOT";
pub const ENV_AUTO_SUSPEND: &str = "POWERMGR_AUTO_SUSPEND";
pub const ENV_SUSPEND_INTERVAL_MS: &str = "POWERMGR_SUSPEND_INTERVAL_MS";
pub const ENV_PROXIMITY: &str = "POWERMGR_PROXIMITY";
pub const ENV_TRACE_JSON: &str = "POWERMGR_TRACE_JSON";

/// Power service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerConfig {
    /// Root under which the kernel power files live
    pub sysfs_root: PathBuf,
    /// Run the auto-suspend loop at startup
    pub auto_suspend: bool,
    /// Pause between auto-suspend attempts
    pub auto_suspend_interval: Duration,
    /// Subscribe to the proximity sensor when a proximity lock is held
    pub proximity_enabled: bool,
    /// Emit JSON logs
    pub trace_json: bool,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            auto_suspend: false,
            auto_suspend_interval: DEFAULT_AUTO_SUSPEND_INTERVAL,
            proximity_enabled: true,
            trace_json: false,
        }
    }
}

impl PowerConfig {
    /// Configuration for tests and host runs: sysfs rooted elsewhere, no suspend
    pub fn with_sysfs_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: root.into(),
            ..Default::default()
        }
    }

    /// Resolve configuration from the environment, falling back to defaults
    pub fn from_env() -> PowerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> PowerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(root) = lookup(ENV_SYSFS_ROOT) {
            if root.trim().is_empty() {
                return Err(PowerError::Configuration(format!("{} is empty", ENV_SYSFS_ROOT)));
            }
            config.sysfs_root = PathBuf::from(root);
        }
        if let Some(value) = lookup(ENV_AUTO_SUSPEND) {
            config.auto_suspend = parse_flag(ENV_AUTO_SUSPEND, &value)?;
        }
        if let Some(value) = lookup(ENV_SUSPEND_INTERVAL_MS) {
            let ms: u64 = value.trim().parse().map_err(|_| {
                PowerError::Configuration(format!("{} is not a number: {}", ENV_SUSPEND_INTERVAL_MS, value))
            })?;
            let interval = Duration::from_millis(ms);
            if interval < MIN_AUTO_SUSPEND_INTERVAL {
                return Err(PowerError::Configuration(format!(
                    "{} must be at least {}ms",
                    ENV_SUSPEND_INTERVAL_MS,
                    MIN_AUTO_SUSPEND_INTERVAL.as_millis()
                )));
            }
            config.auto_suspend_interval = interval;
        }
        if let Some(value) = lookup(ENV_PROXIMITY) {
            config.proximity_enabled = parse_flag(ENV_PROXIMITY, &value)?;
        }
        if let Some(value) = lookup(ENV_TRACE_JSON) {
            config.trace_json = parse_flag(ENV_TRACE_JSON, &value)?;
        }

        Ok(config)
    }
}

fn parse_flag(key: &str, value: &str) -> PowerResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PowerError::Configuration(format!(
            "{} expects a boolean, got {}",
            key, other
        ))),
    }
}
