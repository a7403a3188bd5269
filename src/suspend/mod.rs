/*!
 * Suspend Module
 * Kernel driver forwarding and the auto-suspend handshake
 */

mod auto_suspend;
mod backend;
mod coordinator;
mod driver;
mod stats;
pub mod traits;
pub mod types;

pub use auto_suspend::{suspend_once, AutoSuspendCommand, AutoSuspendTask, CycleOutcome, SuspendBlocker};
pub use backend::SysfsSuspendBackend;
pub use coordinator::SuspendCoordinator;
pub use driver::{DriverConnection, SysfsDriverProvider, SysfsPowerDriver};
pub use stats::AtomicSuspendStats;
pub use traits::*;
pub use types::*;
