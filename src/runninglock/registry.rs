/*!
 * Running Lock Registry
 *
 * Owns the live lock records and decides, for every lock, unlock, proxy and
 * owner-death event, whether a system-visible effect fires.
 *
 * Locking order: proxy transition, then record mutex, then type counter,
 * then collaborator locks. The record map and proxy state are never held
 * while a counter runs.
 */

use super::activation::CounterTable;
use super::counter::TypeCounter;
use super::dump::{self, DumpInput};
use super::proxy::ProxyRegistry;
use super::timer::LockTimer;
use crate::core::errors::{PowerError, PowerResult};
use crate::core::id::{ClientHandle, HandleAllocator};
use crate::core::limits::{APP_HOLD_RUNNINGLOCK_TIMEOUT_MS, VALID_PID_LIMIT};
use crate::core::traits::{DeathNotifier, PowerStateMachine};
use crate::core::types::{
    LockParam, LockRecord, LockState, LockType, Pid, PowerState, RunningLockInfo, Uid,
};
use crate::monitoring::{span_lock_operation, LockEvent, LockEventSink, LockEventTag};
use crate::proximity::ProximityGate;
use crate::suspend::SuspendCoordinator;
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type RecordRef = Arc<Mutex<LockRecord>>;

pub(super) struct RegistryParts {
    pub counters: CounterTable,
    pub gate: Arc<ProximityGate>,
    pub suspend: Arc<SuspendCoordinator>,
    pub state_machine: Arc<dyn PowerStateMachine>,
    pub death: Arc<dyn DeathNotifier>,
    pub allocator: HandleAllocator,
    pub sink: Option<Arc<dyn LockEventSink>>,
}

struct RegistryInner {
    records: DashMap<ClientHandle, RecordRef, RandomState>,
    counters: CounterTable,
    proxy: ProxyRegistry,
    gate: Arc<ProximityGate>,
    suspend: Arc<SuspendCoordinator>,
    state_machine: Arc<dyn PowerStateMachine>,
    death: Arc<dyn DeathNotifier>,
    allocator: HandleAllocator,
    timer: LockTimer,
    sink: RwLock<Option<Arc<dyn LockEventSink>>>,
    self_ref: Weak<RegistryInner>,
}

/// Running lock registry
///
/// Cheap to clone; clones share the same records.
#[derive(Clone)]
pub struct RunningLockRegistry {
    inner: Arc<RegistryInner>,
}

impl RunningLockRegistry {
    pub(super) fn from_parts(parts: RegistryParts) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<RegistryInner>| {
            let expired = weak.clone();
            let timer = LockTimer::new(Arc::new(move |handle| {
                if let Some(inner) = expired.upgrade() {
                    inner.on_lock_timeout(handle);
                }
            }));

            RegistryInner {
                records: DashMap::with_hasher(RandomState::new()),
                counters: parts.counters,
                proxy: ProxyRegistry::new(),
                gate: parts.gate,
                suspend: parts.suspend,
                state_machine: parts.state_machine,
                death: parts.death,
                allocator: parts.allocator,
                timer,
                sink: RwLock::new(parts.sink),
                self_ref: weak.clone(),
            }
        });
        Self { inner }
    }

    // =========================================================================
    // Record lifecycle
    // =========================================================================

    /// Create a lock record with a freshly allocated handle
    pub fn create(
        &self,
        name: impl Into<String>,
        lock_type: LockType,
        pid: Pid,
        uid: Uid,
        bundle_name: impl Into<String>,
    ) -> PowerResult<ClientHandle> {
        let handle = self.inner.allocator.next()?;
        self.create_with_param(LockParam::new(handle, name, lock_type, pid, uid, bundle_name))
    }

    /// Create a lock record under a transport-issued handle
    pub fn create_with_param(&self, param: LockParam) -> PowerResult<ClientHandle> {
        self.inner.create(param)
    }

    /// Lock; `timeout_ms > 0` unlocks automatically after that long
    pub fn lock(&self, handle: ClientHandle, timeout_ms: i32) -> PowerResult<()> {
        self.inner.lock(handle, timeout_ms)
    }

    pub fn unlock(&self, handle: ClientHandle) -> PowerResult<()> {
        self.inner.unlock(handle)
    }

    /// Unlock and destroy the record; idempotent
    pub fn release(&self, handle: ClientHandle) -> PowerResult<()> {
        self.inner.release(handle)
    }

    pub fn is_used(&self, handle: ClientHandle) -> bool {
        self.inner
            .record(handle)
            .map_or(false, |record| record.lock().is_enabled())
    }

    /// Owner process of `handle` terminated
    pub fn on_owner_died(&self, handle: ClientHandle) {
        self.inner.on_owner_died(handle);
    }

    // =========================================================================
    // Proxy
    // =========================================================================

    /// Freeze (`proxied`) or thaw the locks of one owner
    pub fn proxy_running_lock(&self, proxied: bool, pid: Pid, uid: Uid) -> PowerResult<()> {
        self.inner.proxy_running_lock(proxied, pid, uid)
    }

    /// Apply `proxy_running_lock` to every owner; returns the first failure
    pub fn proxy_running_locks(&self, proxied: bool, owners: &[(Pid, Uid)]) -> PowerResult<()> {
        let mut first_err = None;
        for &(pid, uid) in owners {
            if let Err(e) = self.inner.proxy_running_lock(proxied, pid, uid) {
                warn!(pid, uid, error = %e, "Proxy request skipped");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Drop every freeze request and restore the suspended locks
    pub fn reset_running_locks(&self) {
        self.inner.proxy.reset(|handles| self.inner.restore_handles(handles));
    }

    /// Attribute a lock to the apps it is held for
    ///
    /// The lock is frozen while every listed uid is proxied. Returns false
    /// for unknown handles and for locks the proxy does not track.
    pub fn update_work_source(&self, handle: ClientHandle, sources: &[(Uid, &str)]) -> bool {
        self.inner.update_work_source(handle, sources)
    }

    pub fn work_sources(&self, handle: ClientHandle) -> Vec<(Uid, String)> {
        self.inner.proxy.work_sources(handle)
    }

    /// Whether the owner itself holds a freeze request
    pub fn is_proxied(&self, pid: Pid, uid: Uid) -> bool {
        self.inner.proxy.is_proxied(pid, uid)
    }

    /// Whether this lock is currently frozen by owner or work-source requests
    pub fn is_lock_proxied(&self, handle: ClientHandle) -> bool {
        self.inner.proxy.is_lock_proxied(handle)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn lock_state(&self, handle: ClientHandle) -> Option<LockState> {
        self.inner.record(handle).map(|record| record.lock().state)
    }

    /// Number of records, optionally of one type
    pub fn running_lock_count(&self, lock_type: Option<LockType>) -> usize {
        match lock_type {
            None => self.inner.records.len(),
            Some(t) => self
                .inner
                .records
                .iter()
                .filter(|entry| entry.value().lock().param.lock_type == t)
                .count(),
        }
    }

    /// Committed count of the type's counter
    pub fn valid_running_lock_count(&self, lock_type: LockType) -> u32 {
        self.inner.counters.get(&lock_type).map_or(0, |c| c.count())
    }

    pub fn exist_valid_running_lock(&self) -> bool {
        self.inner
            .records
            .iter()
            .any(|entry| entry.value().lock().is_enabled())
    }

    /// Active screen locks, keyed by handle id
    pub fn query_running_lock_lists(&self) -> BTreeMap<String, RunningLockInfo> {
        self.inner
            .records
            .iter()
            .filter_map(|entry| {
                let record = entry.value().lock();
                if !record.is_enabled() || record.param.lock_type != LockType::Screen {
                    return None;
                }
                let key = record.param.handle.id().to_string();
                Some((key, RunningLockInfo::from(&record.param)))
            })
            .collect()
    }

    pub fn is_proximity_close(&self) -> bool {
        self.inner.gate.is_close()
    }

    /// Whether an active background audio lock plays for `uid`
    pub fn is_exist_audio_stream(&self, uid: Uid) -> bool {
        self.inner.records.iter().any(|entry| {
            let record = entry.value().lock();
            record.param.lock_type == LockType::BackgroundAudio
                && record.is_enabled()
                && (record.param.uid == uid || self.inner.proxy.has_work_source(record.param.handle, uid))
        })
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// Install the observability sink, replacing any previous one
    pub fn register_event_sink(&self, sink: Arc<dyn LockEventSink>) {
        *self.inner.sink.write() = Some(sink);
        info!("Running lock event sink registered");
    }

    pub fn unregister_event_sink(&self) {
        if self.inner.sink.write().take().is_some() {
            info!("Running lock event sink unregistered");
        }
    }

    pub fn suspend(&self) -> &Arc<SuspendCoordinator> {
        &self.inner.suspend
    }

    pub fn proximity(&self) -> &Arc<ProximityGate> {
        &self.inner.gate
    }

    pub fn counter(&self, lock_type: LockType) -> Option<&Arc<TypeCounter>> {
        self.inner.counters.get(&lock_type)
    }

    /// Diagnostic text: lock records, proxies, peripherals and suspend state
    pub fn dump(&self) -> String {
        let mut records: Vec<(LockRecord, bool)> = self
            .inner
            .records
            .iter()
            .map(|entry| entry.value().lock().clone())
            .map(|record| {
                let frozen = self.inner.proxy.is_lock_proxied(record.param.handle);
                (record, frozen)
            })
            .collect();
        records.sort_unstable_by_key(|(record, _)| record.param.handle);

        let mut counters: Vec<(LockType, u32)> = self
            .inner
            .counters
            .values()
            .map(|counter| (counter.lock_type(), counter.count()))
            .collect();
        counters.sort_unstable_by_key(|(lock_type, _)| lock_type.raw());
        let proxies = self.inner.proxy.snapshot();

        let mut out = dump::render(
            &DumpInput {
                records: &records,
                counters: &counters,
                proxies: &proxies,
                proximity: self.inner.gate.state(),
            },
            Instant::now(),
        );
        out.push_str(&self.inner.suspend.dump());
        out
    }

    /// Stop background threads owned by the registry
    pub fn shutdown(&self) {
        self.inner.timer.shutdown();
        self.inner.suspend.stop_auto_suspend();
    }
}

impl RegistryInner {
    fn record(&self, handle: ClientHandle) -> Option<RecordRef> {
        self.records.get(&handle).map(|entry| entry.value().clone())
    }

    fn counter(&self, lock_type: LockType) -> PowerResult<&Arc<TypeCounter>> {
        self.counters
            .get(&lock_type)
            .ok_or(PowerError::UnsupportedType(lock_type))
    }

    fn create(&self, param: LockParam) -> PowerResult<ClientHandle> {
        let handle = param.handle;
        let (lock_type, pid, uid) = (param.lock_type, param.pid, param.uid);

        match self.records.entry(handle) {
            Entry::Occupied(_) => return Err(PowerError::HandleCollision(handle)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(LockRecord::new(param))));
            }
        }

        if lock_type != LockType::ProximityScreenControl {
            self.proxy.add_lock(pid, uid, handle);
        }

        let weak = self.self_ref.clone();
        let registered = self.death.register(
            handle,
            Box::new(move |died| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_owner_died(died);
                }
            }),
        );
        if !registered {
            warn!(handle = handle.id(), "Death recipient already registered");
        }

        info!(handle = handle.id(), %lock_type, pid, uid, "Running lock created");
        Ok(handle)
    }

    /// Coordination locks make no sense once the device is going to sleep
    fn check_policy(&self, lock_type: LockType) -> PowerResult<()> {
        if lock_type != LockType::Coordination {
            return Ok(());
        }
        let state = self.state_machine.get_state();
        match state {
            PowerState::Sleep | PowerState::Hibernate => {
                Err(PowerError::PolicyRejected { lock_type, state })
            }
            _ => Ok(()),
        }
    }

    fn lock(&self, handle: ClientHandle, timeout_ms: i32) -> PowerResult<()> {
        let Some(record) = self.record(handle) else {
            debug!(handle = handle.id(), "Lock on unknown handle ignored");
            return Ok(());
        };
        let mut rec = record.lock();
        let span = span_lock_operation("lock", handle, Some(rec.param.lock_type));
        let _entered = span.enter();

        if rec.state == LockState::Enabled {
            rec.param.timeout_ms = timeout_ms;
            self.arm_timer(handle, timeout_ms);
            span.record_result(true);
            return Ok(());
        }

        let lock_type = rec.param.lock_type;
        if let Err(e) = self.check_policy(lock_type) {
            span.record_result(false);
            return Err(e);
        }
        if self.proxy.is_lock_proxied(handle) {
            info!(handle = handle.id(), pid = rec.param.pid, uid = rec.param.uid, "Lock is proxied, request ignored");
            span.record_result(true);
            return Ok(());
        }
        rec.param.timeout_ms = timeout_ms;

        if let Err(e) = self.counter(lock_type)?.increase(&rec.param) {
            span.record_result(false);
            return Err(e);
        }
        rec.state = LockState::Enabled;
        rec.locked_at = Some(Instant::now());
        self.arm_timer(handle, timeout_ms);
        self.notify(&rec.param, LockEventTag::Add);

        info!(handle = handle.id(), %lock_type, timeout_ms, "Running lock locked");
        span.record_result(true);
        Ok(())
    }

    fn unlock(&self, handle: ClientHandle) -> PowerResult<()> {
        let Some(record) = self.record(handle) else {
            debug!(handle = handle.id(), "Unlock on unknown handle ignored");
            return Ok(());
        };
        let mut rec = record.lock();
        let span = span_lock_operation("unlock", handle, Some(rec.param.lock_type));
        let _entered = span.enter();

        let result = self.unlock_record(&mut rec);
        span.record_result(result.is_ok());
        result
    }

    /// Unlock a record whose mutex the caller holds
    fn unlock_record(&self, rec: &mut LockRecord) -> PowerResult<()> {
        let handle = rec.param.handle;
        self.timer.cancel(handle);

        match rec.state {
            LockState::Enabled => {
                self.counter(rec.param.lock_type)?.decrease(&rec.param)?;
                rec.state = LockState::Disabled;
                self.check_hold_time(rec);
                self.notify(&rec.param, LockEventTag::Remove);
                info!(handle = handle.id(), lock_type = %rec.param.lock_type, "Running lock unlocked");
            }
            LockState::Disabled => {}
            LockState::Unused | LockState::Proxied | LockState::UnproxiedRestore => {
                debug!(handle = handle.id(), state = %rec.state, "Dropping uncounted lock intent");
                rec.state = LockState::Disabled;
            }
        }
        Ok(())
    }

    fn release(&self, handle: ClientHandle) -> PowerResult<()> {
        let Some((_, record)) = self.records.remove(&handle) else {
            return Ok(());
        };
        let mut rec = record.lock();
        let span = span_lock_operation("release", handle, Some(rec.param.lock_type));
        let _entered = span.enter();

        let result = self.unlock_record(&mut rec);
        if let Err(e) = &result {
            error!(handle = handle.id(), error = %e, "Release could not undo the lock effect");
        }

        self.proxy.remove_lock(handle);
        self.death.unregister(handle);

        info!(handle = handle.id(), "Running lock released");
        span.record_result(result.is_ok());
        result
    }

    fn on_owner_died(&self, handle: ClientHandle) {
        info!(handle = handle.id(), "Owner died, releasing running lock");
        if let Err(e) = self.release(handle) {
            error!(handle = handle.id(), error = %e, "Release after owner death failed");
        }
    }

    fn on_lock_timeout(&self, handle: ClientHandle) {
        let Some(record) = self.record(handle) else {
            return;
        };
        let mut rec = record.lock();

        // A relock after the deadline was queued moves locked_at forward
        let due = match (rec.state, rec.locked_at, rec.param.timeout_ms) {
            (LockState::Enabled, Some(at), timeout) if timeout > 0 => {
                at.elapsed() >= Duration::from_millis(timeout as u64)
            }
            _ => false,
        };
        if !due {
            return;
        }

        info!(handle = handle.id(), timeout_ms = rec.param.timeout_ms, "Running lock timed out");
        if let Err(e) = self.unlock_record(&mut rec) {
            error!(handle = handle.id(), error = %e, "Timeout unlock failed");
        }
    }

    fn arm_timer(&self, handle: ClientHandle, timeout_ms: i32) {
        if timeout_ms <= 0 {
            self.timer.cancel(handle);
            return;
        }
        if let Err(e) = self.timer.arm(handle, Duration::from_millis(timeout_ms as u64)) {
            warn!(handle = handle.id(), error = %e, "Lock timeout not armed");
        }
    }

    fn check_hold_time(&self, rec: &LockRecord) {
        let Some(locked_at) = rec.locked_at else {
            return;
        };
        let held_ms = locked_at.elapsed().as_millis();
        if held_ms > APP_HOLD_RUNNINGLOCK_TIMEOUT_MS {
            warn!(
                handle = rec.param.handle.id(),
                name = %rec.param.name,
                bundle = %rec.param.bundle_name,
                held_ms = held_ms as u64,
                "Running lock held past the hold limit"
            );
        }
    }

    fn notify(&self, param: &LockParam, tag: LockEventTag) {
        if !param.lock_type.needs_notify() {
            return;
        }
        let sink = self.sink.read().clone();
        if let Some(sink) = sink {
            sink.handle_event(&LockEvent::from_param(param, tag));
        }
    }

    fn proxy_running_lock(&self, proxied: bool, pid: Pid, uid: Uid) -> PowerResult<()> {
        if pid < VALID_PID_LIMIT {
            return Err(PowerError::InvalidPid(pid));
        }
        if proxied {
            self.proxy
                .increase_proxy_cnt(pid, uid, |handles| self.suspend_handles(handles));
        } else {
            self.proxy
                .decrease_proxy_cnt(pid, uid, |handles| self.restore_handles(handles));
        }
        Ok(())
    }

    fn update_work_source(&self, handle: ClientHandle, sources: &[(Uid, &str)]) -> bool {
        let Some(record) = self.record(handle) else {
            debug!(handle = handle.id(), "Work source update on unknown handle ignored");
            return false;
        };
        let updated = self.proxy.update_work_source(handle, sources, |change| {
            self.suspend_handles(&change.frozen);
            self.restore_handles(&change.thawed);
        });
        if !updated {
            return false;
        }

        let mut rec = record.lock();
        if !sources.is_empty() {
            let bundles: Vec<&str> = sources.iter().map(|&(_, bundle)| bundle).collect();
            rec.param.bundle_name = bundles.join(" ");
        }
        self.notify(&rec.param, LockEventTag::Update);
        info!(handle = handle.id(), sources = sources.len(), "Running lock work sources updated");
        true
    }

    /// Take enabled locks out of effect, remembering them for restore
    fn suspend_handles(&self, handles: &[ClientHandle]) {
        for &handle in handles {
            let Some(record) = self.record(handle) else {
                continue;
            };
            let mut rec = record.lock();
            if rec.state != LockState::Enabled {
                continue;
            }

            self.timer.cancel(handle);
            match self.counter(rec.param.lock_type).and_then(|c| c.decrease(&rec.param)) {
                Ok(()) => {
                    rec.state = LockState::Proxied;
                    self.notify(&rec.param, LockEventTag::Update);
                    debug!(handle = handle.id(), "Running lock proxied");
                }
                Err(e) => {
                    warn!(handle = handle.id(), error = %e, "Could not proxy running lock");
                }
            }
        }
    }

    /// Re-apply proxied locks with their stored parameters
    fn restore_handles(&self, handles: &[ClientHandle]) {
        for &handle in handles {
            let Some(record) = self.record(handle) else {
                continue;
            };
            let mut rec = record.lock();
            if !rec.is_proxied() {
                continue;
            }

            rec.state = LockState::UnproxiedRestore;
            match self.counter(rec.param.lock_type).and_then(|c| c.increase(&rec.param)) {
                Ok(()) => {
                    rec.state = LockState::Enabled;
                    rec.locked_at = Some(Instant::now());
                    let timeout_ms = rec.param.timeout_ms;
                    self.arm_timer(handle, timeout_ms);
                    self.notify(&rec.param, LockEventTag::Update);
                    debug!(handle = handle.id(), "Running lock restored");
                }
                Err(e) => {
                    warn!(handle = handle.id(), error = %e, "Could not restore running lock");
                }
            }
        }
    }
}
