/*!
 * Type Counter
 * Per lock-type reference count with edge-triggered activation
 */

use crate::core::errors::PowerResult;
use crate::core::types::{LockParam, LockType};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

/// Activation callback: `true` on the 0->1 edge, `false` on the 1->0 edge
pub type ActivateFn = Box<dyn Fn(bool, &LockParam) -> PowerResult<()> + Send + Sync>;

/// When the activation callback fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMode {
    /// Only on count edges
    Gated,
    /// On every increase and decrease
    PassThrough,
}

/// Reference counter for one lock type
///
/// The count mutex is held across the activation call so edges of one type
/// are serialized. The published count mirrors the committed value and can
/// be read without taking the mutex.
pub struct TypeCounter {
    lock_type: LockType,
    mode: CounterMode,
    count: Mutex<u32>,
    published: AtomicU32,
    activate: ActivateFn,
}

impl TypeCounter {
    pub fn new(lock_type: LockType, mode: CounterMode, activate: ActivateFn) -> Self {
        Self {
            lock_type,
            mode,
            count: Mutex::new(0),
            published: AtomicU32::new(0),
            activate,
        }
    }

    /// Counter whose mode follows the lock type
    pub fn for_type(lock_type: LockType, activate: ActivateFn) -> Self {
        let mode = if lock_type.is_pass_through() {
            CounterMode::PassThrough
        } else {
            CounterMode::Gated
        };
        Self::new(lock_type, mode, activate)
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    pub fn mode(&self) -> CounterMode {
        self.mode
    }

    /// Committed count
    #[inline]
    pub fn count(&self) -> u32 {
        self.published.load(Ordering::Acquire)
    }

    /// Count one more holder, activating on the 0->1 edge
    pub fn increase(&self, param: &LockParam) -> PowerResult<()> {
        let mut count = self.count.lock();
        let next = count.saturating_add(1);

        if next == 1 || self.mode == CounterMode::PassThrough {
            if let Err(e) = (self.activate)(true, param) {
                warn!(
                    lock_type = %self.lock_type,
                    handle = param.handle.id(),
                    error = %e,
                    "Activation failed, count left at {}",
                    *count
                );
                return Err(e);
            }
        }

        *count = next;
        self.published.store(next, Ordering::Release);
        debug!(lock_type = %self.lock_type, count = next, "Type counter increased");
        Ok(())
    }

    /// Count one holder less, deactivating on the 1->0 edge
    pub fn decrease(&self, param: &LockParam) -> PowerResult<()> {
        let mut count = self.count.lock();
        if *count == 0 {
            warn!(lock_type = %self.lock_type, handle = param.handle.id(), "Type counter already zero");
            return Ok(());
        }
        let next = *count - 1;

        if next == 0 || self.mode == CounterMode::PassThrough {
            if let Err(e) = (self.activate)(false, param) {
                warn!(
                    lock_type = %self.lock_type,
                    handle = param.handle.id(),
                    error = %e,
                    "Deactivation failed, count left at {}",
                    *count
                );
                return Err(e);
            }
        }

        *count = next;
        self.published.store(next, Ordering::Release);
        debug!(lock_type = %self.lock_type, count = next, "Type counter decreased");
        Ok(())
    }
}

impl std::fmt::Debug for TypeCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeCounter")
            .field("lock_type", &self.lock_type)
            .field("mode", &self.mode)
            .field("count", &self.count())
            .finish()
    }
}
