/*!
 * Lock-Free Suspend Statistics
 */

use super::types::SuspendStats;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic auto-suspend statistics
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - Counters updated from the suspend thread without locking
#[repr(C, align(64))]
pub struct AtomicSuspendStats {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    forced: AtomicU64,
    last_wakeup_reason: Mutex<Option<String>>,
}

impl AtomicSuspendStats {
    #[inline]
    pub fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            forced: AtomicU64::new(0),
            last_wakeup_reason: Mutex::new(None),
        }
    }

    #[inline(always)]
    pub fn inc_attempts(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_successes(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_forced(&self) {
        self.forced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_wakeup_reason(&self, reason: String) {
        *self.last_wakeup_reason.lock() = Some(reason);
    }

    /// Snapshot (may be slightly inconsistent across fields)
    pub fn snapshot(&self) -> SuspendStats {
        SuspendStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            forced: self.forced.load(Ordering::Relaxed),
            last_wakeup_reason: self.last_wakeup_reason.lock().clone(),
        }
    }
}

impl Default for AtomicSuspendStats {
    fn default() -> Self {
        Self::new()
    }
}
