/*!
 * Running Lock Module
 * Lock registry, per-type counters, proxy bookkeeping and timeouts
 */

mod activation;
mod builder;
mod counter;
mod death;
mod dump;
mod proxy;
mod registry;
mod timer;

pub use activation::{build_counters, ActivationContext, CounterTable};
pub use builder::RunningLockRegistryBuilder;
pub use counter::{ActivateFn, CounterMode, TypeCounter};
pub use death::DeathRecipientRegistry;
pub use dump::{render as render_dump, DumpInput};
pub use proxy::{ProxyChange, ProxyRegistry, ProxySnapshot};
pub use registry::RunningLockRegistry;
pub use timer::{ExpiryFn, LockTimer};
