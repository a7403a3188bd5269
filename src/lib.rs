/*!
 * Power Manager Library
 * Running lock coordination, proximity gating and kernel suspend control
 */

pub mod core;
pub mod monitoring;
pub mod proximity;
pub mod runninglock;
pub mod suspend;

// Re-exports
pub use crate::core::{
    ClientHandle, DeathNotifier, HandleAllocator, LockParam, LockRecord, LockState, LockType, Pid,
    PowerConfig, PowerError, PowerResult, PowerState, PowerStateMachine, RunningLockInfo,
    StandaloneStateMachine, StateChangeReason, Uid,
};
pub use monitoring::{init_tracing, ChannelSink, LockEvent, LockEventSink, LockEventTag, LogSink};
pub use proximity::{ManualProximitySensor, ProximityGate, ProximitySensor, ProximityState};
pub use runninglock::{
    DeathRecipientRegistry, ProxyRegistry, RunningLockRegistry, RunningLockRegistryBuilder,
    TypeCounter,
};
pub use suspend::{
    DriverConnection, DriverProvider, DriverStatus, PowerDriver, ServiceStatus, SuspendBackend,
    SuspendCoordinator, SysfsDriverProvider, SysfsPowerDriver, SysfsSuspendBackend,
};
