/*!
 * Core Types
 * Lock types, lock states, power states and lock parameters shared across the service
 */

use super::id::ClientHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Process ID as reported by the transport layer
pub type Pid = i32;

/// Owning user ID as reported by the transport layer
pub type Uid = i32;

/// Running lock type
///
/// Discriminants follow the wire values clients already use: every scene
/// sub-type carries the `Background` bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum LockType {
    /// Keeps the screen on
    Screen = 0,
    /// Keeps the CPU running (legacy, superseded by the scene types)
    Background = 1,
    /// Keeps the screen on/off under proximity sensor control
    ProximityScreenControl = 2,
    /// Keeps image transmission alive while the screen is off
    Coordination = 4,
    BackgroundPhone = 1 | 1 << 1,
    BackgroundNotification = 1 | 1 << 2,
    BackgroundAudio = 1 | 1 << 3,
    BackgroundSport = 1 | 1 << 4,
    BackgroundNavigation = 1 | 1 << 5,
    BackgroundTask = 1 | 1 << 6,
}

impl LockType {
    /// Every lock type, in dump order
    pub const ALL: [LockType; 10] = [
        LockType::Screen,
        LockType::Background,
        LockType::ProximityScreenControl,
        LockType::Coordination,
        LockType::BackgroundPhone,
        LockType::BackgroundNotification,
        LockType::BackgroundAudio,
        LockType::BackgroundSport,
        LockType::BackgroundNavigation,
        LockType::BackgroundTask,
    ];

    /// Convert from the wire value
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.raw() == raw)
    }

    /// Wire value
    pub fn raw(&self) -> u32 {
        *self as u32
    }

    /// Scene background sub-types used for fine-grained usage accounting
    pub fn is_scene(&self) -> bool {
        matches!(
            self,
            LockType::BackgroundPhone
                | LockType::BackgroundNotification
                | LockType::BackgroundAudio
                | LockType::BackgroundSport
                | LockType::BackgroundNavigation
                | LockType::BackgroundTask
        )
    }

    /// Types whose every Lock/Unlock is forwarded to the driver
    pub fn is_pass_through(&self) -> bool {
        self.is_scene() || *self == LockType::Coordination
    }

    /// Types whose system effect fires only on counter edges
    pub fn is_gated(&self) -> bool {
        !self.is_pass_through()
    }

    /// Types reported to the observability sink
    pub fn needs_notify(&self) -> bool {
        self.is_pass_through()
            || matches!(self, LockType::Screen | LockType::ProximityScreenControl)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::Screen => "SCREEN",
            LockType::Background => "BACKGROUND",
            LockType::ProximityScreenControl => "PROXIMITY_SCREEN_CONTROL",
            LockType::Coordination => "RUNNINGLOCK_COORDINATION",
            LockType::BackgroundPhone => "BACKGROUND_PHONE",
            LockType::BackgroundNotification => "BACKGROUND_NOTIFICATION",
            LockType::BackgroundAudio => "BACKGROUND_AUDIO",
            LockType::BackgroundSport => "BACKGROUND_SPORT",
            LockType::BackgroundNavigation => "BACKGROUND_NAVIGATION",
            LockType::BackgroundTask => "BACKGROUND_TASK",
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a single lock record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum LockState {
    /// Created, never locked
    Unused = 0,
    /// Locked and counted
    Enabled = 1,
    /// Unlocked
    Disabled = 2,
    /// Suspended because the owning process is proxied; remembers lock intent
    Proxied = 3,
    /// Owner was unproxied and the lock is being restored
    UnproxiedRestore = 4,
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Unused => "UNUSED",
            LockState::Enabled => "ENABLED",
            LockState::Disabled => "DISABLED",
            LockState::Proxied => "PROXIED",
            LockState::UnproxiedRestore => "UNPROXIED_RESTORE",
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device power state as seen by the power-state collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerState {
    Awake,
    Freeze,
    Inactive,
    StandBy,
    Doze,
    Sleep,
    Hibernate,
    Shutdown,
    Unknown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerState::Awake => "AWAKE",
            PowerState::Freeze => "FREEZE",
            PowerState::Inactive => "INACTIVE",
            PowerState::StandBy => "STAND_BY",
            PowerState::Doze => "DOZE",
            PowerState::Sleep => "SLEEP",
            PowerState::Hibernate => "HIBERNATE",
            PowerState::Shutdown => "SHUTDOWN",
            PowerState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Why a state transition was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateChangeReason {
    Init,
    Timeout,
    RunningLock,
    Proximity,
    Application,
    System,
}

/// Immutable parameters of a lock request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockParam {
    pub handle: ClientHandle,
    pub name: String,
    pub lock_type: LockType,
    pub pid: Pid,
    pub uid: Uid,
    pub bundle_name: String,
    /// Requested hold time; `<= 0` holds until unlocked
    pub timeout_ms: i32,
}

impl LockParam {
    pub fn new(
        handle: ClientHandle,
        name: impl Into<String>,
        lock_type: LockType,
        pid: Pid,
        uid: Uid,
        bundle_name: impl Into<String>,
    ) -> Self {
        Self {
            handle,
            name: name.into(),
            lock_type,
            pid,
            uid,
            bundle_name: bundle_name.into(),
            timeout_ms: -1,
        }
    }
}

/// Lock description handed to the kernel power driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningLockInfo {
    pub name: String,
    pub lock_type: LockType,
    pub timeout_ms: i32,
    pub pid: Pid,
    pub uid: Uid,
    pub bundle_name: String,
}

impl From<&LockParam> for RunningLockInfo {
    fn from(param: &LockParam) -> Self {
        Self {
            name: param.name.clone(),
            lock_type: param.lock_type,
            timeout_ms: param.timeout_ms,
            pid: param.pid,
            uid: param.uid,
            bundle_name: param.bundle_name.clone(),
        }
    }
}

/// Live lock record owned by the registry
#[derive(Debug, Clone)]
pub struct LockRecord {
    pub param: LockParam,
    pub state: LockState,
    pub created_at: Instant,
    /// Set on every successful Lock, used for hold-time accounting
    pub locked_at: Option<Instant>,
}

impl LockRecord {
    pub fn new(param: LockParam) -> Self {
        Self {
            param,
            state: LockState::Unused,
            created_at: Instant::now(),
            locked_at: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state == LockState::Enabled
    }

    /// Proxied and restoring records carry lock intent without being counted
    pub fn is_proxied(&self) -> bool {
        matches!(self.state, LockState::Proxied | LockState::UnproxiedRestore)
    }
}
