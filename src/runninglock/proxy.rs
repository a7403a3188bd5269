/*!
 * Proxy Registry
 *
 * Freeze requests per owner and per uid, and the locks they take out of
 * effect. A lock is frozen while its owner (pid, uid) holds a freeze request,
 * or while every uid it works on behalf of has one.
 *
 * Transitions (freeze, thaw, work-source update, reset) are serialized and
 * hold the transition mutex across their callback, so the effects of two
 * transitions never interleave.
 */

use crate::core::id::ClientHandle;
use crate::core::types::{Pid, Uid};
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct TrackedLock {
    pid: Pid,
    uid: Uid,
    /// Apps the lock is held on behalf of, by uid
    work_sources: BTreeMap<Uid, String>,
}

#[derive(Debug, Default)]
struct ProxyState {
    owners: HashMap<(Pid, Uid), u32, RandomState>,
    uids: HashMap<Uid, u32, RandomState>,
    locks: HashMap<ClientHandle, TrackedLock, RandomState>,
}

impl ProxyState {
    fn owner_count(&self, pid: Pid, uid: Uid) -> u32 {
        self.owners.get(&(pid, uid)).copied().unwrap_or(0)
    }

    fn uid_frozen(&self, uid: Uid) -> bool {
        self.uids.get(&uid).map_or(false, |&count| count > 0)
    }

    fn is_frozen(&self, lock: &TrackedLock) -> bool {
        if self.owner_count(lock.pid, lock.uid) > 0 {
            return true;
        }
        !lock.work_sources.is_empty() && lock.work_sources.keys().all(|&uid| self.uid_frozen(uid))
    }

    fn frozen_set(&self) -> HashSet<ClientHandle, RandomState> {
        self.locks
            .iter()
            .filter(|(_, lock)| self.is_frozen(lock))
            .map(|(&handle, _)| handle)
            .collect()
    }

    /// Handles whose frozen status differs from `before`, as (frozen, thawed)
    fn diff(&self, before: &HashSet<ClientHandle, RandomState>) -> ProxyChange {
        let after = self.frozen_set();
        let mut frozen: Vec<_> = after.difference(before).copied().collect();
        let mut thawed: Vec<_> = before
            .difference(&after)
            .copied()
            .filter(|handle| self.locks.contains_key(handle))
            .collect();
        frozen.sort_unstable();
        thawed.sort_unstable();
        ProxyChange { frozen, thawed }
    }

    fn drop_idle_counts(&mut self) {
        self.owners.retain(|_, count| *count > 0);
        self.uids.retain(|_, count| *count > 0);
    }
}

/// Locks whose frozen status changed in one transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyChange {
    pub frozen: Vec<ClientHandle>,
    pub thawed: Vec<ClientHandle>,
}

impl ProxyChange {
    pub fn is_empty(&self) -> bool {
        self.frozen.is_empty() && self.thawed.is_empty()
    }
}

/// Dump view of one owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySnapshot {
    pub pid: Pid,
    pub uid: Uid,
    pub proxy_count: u32,
    pub handles: Vec<ClientHandle>,
    /// Work sources of the owner's locks that have any
    pub work_sources: Vec<(ClientHandle, Vec<(Uid, String)>)>,
}

/// Freeze reference counts and work-source attribution
pub struct ProxyRegistry {
    state: Mutex<ProxyState>,
    transition: Mutex<()>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProxyState::default()),
            transition: Mutex::new(()),
        }
    }

    /// Start tracking a lock for its owner
    pub fn add_lock(&self, pid: Pid, uid: Uid, handle: ClientHandle) {
        self.state.lock().locks.insert(
            handle,
            TrackedLock {
                pid,
                uid,
                work_sources: BTreeMap::new(),
            },
        );
        debug!(pid, uid, handle = handle.id(), "Proxy tracking lock");
    }

    pub fn remove_lock(&self, handle: ClientHandle) {
        if self.state.lock().locks.remove(&handle).is_some() {
            debug!(handle = handle.id(), "Proxy stopped tracking lock");
        }
    }

    /// Add a freeze request for an owner; `on_frozen` gets the locks it newly froze
    pub fn increase_proxy_cnt<F>(&self, pid: Pid, uid: Uid, on_frozen: F)
    where
        F: FnOnce(&[ClientHandle]),
    {
        let _transition = self.transition.lock();
        let change = {
            let mut state = self.state.lock();
            let before = state.frozen_set();
            let count = state.owners.entry((pid, uid)).or_insert(0);
            *count = count.saturating_add(1);
            let count = *count;
            let by_uid = state.uids.entry(uid).or_insert(0);
            *by_uid = by_uid.saturating_add(1);
            if count == 1 {
                info!(pid, uid, "Proxying running locks");
            } else {
                debug!(pid, uid, count, "Proxy count increased");
            }
            state.diff(&before)
        };

        if !change.frozen.is_empty() {
            debug!(pid, uid, locks = change.frozen.len(), "Freezing running locks");
            on_frozen(&change.frozen);
        }
    }

    /// Drop a freeze request; `on_thawed` gets the locks no longer frozen
    pub fn decrease_proxy_cnt<F>(&self, pid: Pid, uid: Uid, on_thawed: F)
    where
        F: FnOnce(&[ClientHandle]),
    {
        let _transition = self.transition.lock();
        let change = {
            let mut state = self.state.lock();
            if state.owner_count(pid, uid) == 0 {
                return;
            }
            let before = state.frozen_set();
            if let Some(count) = state.owners.get_mut(&(pid, uid)) {
                *count -= 1;
                if *count == 0 {
                    info!(pid, uid, "Unproxying running locks");
                } else {
                    debug!(pid, uid, count = *count, "Proxy count decreased");
                }
            }
            if let Some(by_uid) = state.uids.get_mut(&uid) {
                *by_uid = by_uid.saturating_sub(1);
            }
            state.drop_idle_counts();
            state.diff(&before)
        };

        if !change.thawed.is_empty() {
            debug!(pid, uid, locks = change.thawed.len(), "Thawing running locks");
            on_thawed(&change.thawed);
        }
    }

    /// Replace the work sources of a tracked lock
    ///
    /// Returns false when the lock is not tracked. `apply` runs only when
    /// the lock's frozen status changed.
    pub fn update_work_source<F>(&self, handle: ClientHandle, sources: &[(Uid, &str)], apply: F) -> bool
    where
        F: FnOnce(&ProxyChange),
    {
        let _transition = self.transition.lock();
        let change = {
            let mut state = self.state.lock();
            let before = state.frozen_set();
            let Some(lock) = state.locks.get_mut(&handle) else {
                warn!(handle = handle.id(), "Work source update for untracked lock");
                return false;
            };
            lock.work_sources = sources
                .iter()
                .map(|&(uid, bundle)| (uid, bundle.to_string()))
                .collect();
            debug!(handle = handle.id(), sources = sources.len(), "Work sources updated");
            state.diff(&before)
        };

        if !change.is_empty() {
            apply(&change);
        }
        true
    }

    /// Clear every freeze request; `on_thawed` gets the locks that were frozen
    pub fn reset<F>(&self, on_thawed: F)
    where
        F: FnOnce(&[ClientHandle]),
    {
        let _transition = self.transition.lock();
        let change = {
            let mut state = self.state.lock();
            let before = state.frozen_set();
            state.owners.clear();
            state.uids.clear();
            state.diff(&before)
        };
        info!(locks = change.thawed.len(), "Proxy counts reset");
        if !change.thawed.is_empty() {
            on_thawed(&change.thawed);
        }
    }

    /// Whether the owner itself holds a freeze request
    pub fn is_proxied(&self, pid: Pid, uid: Uid) -> bool {
        self.state.lock().owner_count(pid, uid) > 0
    }

    /// Whether a tracked lock is currently frozen
    pub fn is_lock_proxied(&self, handle: ClientHandle) -> bool {
        let state = self.state.lock();
        state.locks.get(&handle).map_or(false, |lock| state.is_frozen(lock))
    }

    /// Whether the lock is held on behalf of `uid`
    pub fn has_work_source(&self, handle: ClientHandle, uid: Uid) -> bool {
        self.state
            .lock()
            .locks
            .get(&handle)
            .map_or(false, |lock| lock.work_sources.contains_key(&uid))
    }

    pub fn work_sources(&self, handle: ClientHandle) -> Vec<(Uid, String)> {
        self.state.lock().locks.get(&handle).map_or_else(Vec::new, |lock| {
            lock.work_sources
                .iter()
                .map(|(&uid, bundle)| (uid, bundle.clone()))
                .collect()
        })
    }

    pub fn snapshot(&self) -> Vec<ProxySnapshot> {
        let state = self.state.lock();
        let mut by_owner: BTreeMap<(Pid, Uid), ProxySnapshot> = BTreeMap::new();

        for (&(pid, uid), &proxy_count) in &state.owners {
            by_owner.insert((pid, uid), ProxySnapshot::empty(pid, uid, proxy_count));
        }
        for (&handle, lock) in &state.locks {
            let entry = by_owner
                .entry((lock.pid, lock.uid))
                .or_insert_with(|| ProxySnapshot::empty(lock.pid, lock.uid, 0));
            entry.handles.push(handle);
            if !lock.work_sources.is_empty() {
                let sources = lock
                    .work_sources
                    .iter()
                    .map(|(&uid, bundle)| (uid, bundle.clone()))
                    .collect();
                entry.work_sources.push((handle, sources));
            }
        }

        by_owner
            .into_values()
            .map(|mut snapshot| {
                snapshot.handles.sort_unstable();
                snapshot.work_sources.sort_unstable_by_key(|(handle, _)| *handle);
                snapshot
            })
            .collect()
    }

    /// Owners with a freeze request or a tracked lock
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        let mut owners: HashSet<(Pid, Uid)> = state.owners.keys().copied().collect();
        owners.extend(state.locks.values().map(|lock| (lock.pid, lock.uid)));
        owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProxySnapshot {
    fn empty(pid: Pid, uid: Uid, proxy_count: u32) -> Self {
        Self {
            pid,
            uid,
            proxy_count,
            handles: Vec::new(),
            work_sources: Vec::new(),
        }
    }
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
