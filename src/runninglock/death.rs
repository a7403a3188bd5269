/*!
 * Death Recipient Registry
 * In-process owner-death notification with one-shot callbacks
 */

use crate::core::id::ClientHandle;
use crate::core::traits::{DeathCallback, DeathNotifier};
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Death notifier for transports that report owner termination by handle
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
#[repr(C, align(64))]
#[derive(Clone)]
pub struct DeathRecipientRegistry {
    recipients: Arc<DashMap<ClientHandle, DeathCallback, RandomState>>,
}

impl DeathRecipientRegistry {
    pub fn new() -> Self {
        Self {
            recipients: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    /// Report that the owner of `handle` died; fires its callback at most once
    pub fn notify_died(&self, handle: ClientHandle) -> bool {
        // Removed before invoking so the callback may re-enter the registry
        let Some((_, callback)) = self.recipients.remove(&handle) else {
            debug!(handle = handle.id(), "No death recipient registered");
            return false;
        };
        info!(handle = handle.id(), "Owner died, notifying recipient");
        callback(handle);
        true
    }

    pub fn is_registered(&self, handle: ClientHandle) -> bool {
        self.recipients.contains_key(&handle)
    }

    pub fn count(&self) -> usize {
        self.recipients.len()
    }
}

impl Default for DeathRecipientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeathNotifier for DeathRecipientRegistry {
    fn register(&self, handle: ClientHandle, callback: DeathCallback) -> bool {
        match self.recipients.entry(handle) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(callback);
                true
            }
        }
    }

    fn unregister(&self, handle: ClientHandle) -> bool {
        self.recipients.remove(&handle).is_some()
    }
}
