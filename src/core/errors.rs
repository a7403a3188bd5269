/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use super::id::ClientHandle;
use super::types::{LockType, Pid, PowerState};
use miette::Diagnostic;
use thiserror::Error;

/// Unified power service error with miette diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum PowerError {
    #[error("Client handle space exhausted")]
    #[diagnostic(
        code(runninglock::handle_exhausted),
        help("No more handles can be issued. Restart the service to reset the handle space.")
    )]
    HandleExhausted,

    #[error("Client handle {0} is already registered")]
    #[diagnostic(
        code(runninglock::handle_collision),
        help("The transport issued a handle that is still live. Release it before reuse.")
    )]
    HandleCollision(ClientHandle),

    #[error("Unsupported running lock type: {0}")]
    #[diagnostic(
        code(runninglock::unsupported_type),
        help("No activation is registered for this lock type.")
    )]
    UnsupportedType(LockType),

    #[error("Lock type {lock_type} not allowed in power state {state}")]
    #[diagnostic(
        code(runninglock::policy_rejected),
        help("Retry once the device leaves the current power state.")
    )]
    PolicyRejected { lock_type: LockType, state: PowerState },

    #[error("Invalid pid: {0}")]
    #[diagnostic(code(runninglock::invalid_pid), help("Pids below 1 cannot be proxied."))]
    InvalidPid(Pid),

    #[error("Power driver {op} failed with status {code}")]
    #[diagnostic(
        code(suspend::driver_failure),
        help("The kernel power driver rejected the request. Check the driver logs.")
    )]
    Driver { op: &'static str, code: i32 },

    #[error("Sensor error: {0}")]
    #[diagnostic(code(proximity::sensor_error))]
    Sensor(String),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code(power::io_error),
        help("Sysfs access failed. Check that the power interface files exist and are writable.")
    )]
    Io(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(power::configuration_error),
        help("Invalid configuration. Review the POWERMGR_* environment variables.")
    )]
    Configuration(String),

    #[error("Internal error: {0}")]
    #[diagnostic(
        code(power::internal_error),
        help("An unexpected internal error occurred. Please report this issue.")
    )]
    Internal(String),
}

impl From<std::io::Error> for PowerError {
    fn from(err: std::io::Error) -> Self {
        PowerError::Io(err.to_string())
    }
}

impl From<&str> for PowerError {
    fn from(msg: &str) -> Self {
        PowerError::Internal(msg.to_string())
    }
}

/// Result type for power service operations
pub type PowerResult<T> = std::result::Result<T, PowerError>;
