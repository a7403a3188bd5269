/*!
 * Suspend Types
 * Driver call status, service availability and loop statistics
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a kernel power driver call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverStatus {
    Success,
    /// Driver answered with a non-zero status
    Failure(i32),
    /// Driver service not reachable
    Unavailable,
}

impl DriverStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, DriverStatus::Success)
    }
}

/// Driver service availability notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Started,
    Stopped,
}

/// Auto-suspend loop statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SuspendStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub forced: u64,
    pub last_wakeup_reason: Option<String>,
}

impl fmt::Display for SuspendStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempts={} successes={} failures={} forced={} lastWakeupReason={}",
            self.attempts,
            self.successes,
            self.failures,
            self.forced,
            self.last_wakeup_reason.as_deref().unwrap_or("none")
        )
    }
}
