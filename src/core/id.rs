/*!
 * Handle Generation
 * Opaque client handles and the allocator that issues them
 */

use super::errors::{PowerError, PowerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque identity of one lock request
///
/// The registry only compares and hashes handles; it never dereferences them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientHandle(pub u64);

impl ClientHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic handle allocator
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - Lock-free compare-exchange, no recycling: a handle value is never reissued
#[repr(C, align(64))]
pub struct HandleAllocator {
    counter: Arc<AtomicU64>,
}

impl HandleAllocator {
    /// Create allocator starting at given value
    #[inline]
    pub fn new(start: u64) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Issue the next handle, failing once the id space is used up
    pub fn next(&self) -> PowerResult<ClientHandle> {
        self.counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_add(1)
            })
            .map(ClientHandle)
            .map_err(|_| PowerError::HandleExhausted)
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Clone for HandleAllocator {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
        }
    }
}
