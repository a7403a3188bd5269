/*!
 * Auto-Suspend Task
 *
 * Background thread that performs the wakeup-count handshake whenever no
 * holder blocks suspend. The kernel write that enters suspend only returns
 * after the system wakes, so the loop lives on its own thread and is never
 * driven from request threads.
 */

use super::stats::AtomicSuspendStats;
use super::traits::SuspendBackend;
use crate::core::errors::{PowerError, PowerResult};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often a blocked loop re-checks for shutdown
const BLOCKED_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counter of independent suspend vetoes
pub struct SuspendBlocker {
    count: Mutex<u32>,
    released: Condvar,
}

impl SuspendBlocker {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    pub fn inc(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_add(1);
    }

    pub fn dec(&self) {
        let mut count = self.count.lock();
        if *count == 0 {
            warn!("Suspend block counter decremented below zero");
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.released.notify_all();
        }
    }

    pub fn count(&self) -> u32 {
        *self.count.lock()
    }

    /// Block until nobody vetoes suspend; false if `stop` was raised meanwhile
    pub fn wait_unblocked(&self, stop: &AtomicBool) -> bool {
        let mut count = self.count.lock();
        while *count > 0 {
            if stop.load(Ordering::Acquire) {
                return false;
            }
            self.released.wait_for(&mut count, BLOCKED_POLL_INTERVAL);
        }
        !stop.load(Ordering::Acquire)
    }

    /// Wake waiters so they observe a stop request
    pub fn wake_all(&self) {
        let _count = self.count.lock();
        self.released.notify_all();
    }
}

impl Default for SuspendBlocker {
    fn default() -> Self {
        Self::new()
    }
}

/// Control messages for the auto-suspend thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoSuspendCommand {
    /// Attempt a cycle now instead of waiting for the interval
    Trigger,
    /// Leave the loop at the next safe point
    Shutdown,
}

/// Outcome of a single handshake cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Suspended,
    /// A holder appeared between reading and arming the wakeup count
    Blocked,
    /// Handshake I/O failed; retried next cycle
    Failed,
}

/// Handle to the auto-suspend background thread
pub struct AutoSuspendTask {
    command_tx: flume::Sender<AutoSuspendCommand>,
    stop: Arc<AtomicBool>,
    blocker: Arc<SuspendBlocker>,
    handle: Option<JoinHandle<()>>,
}

impl AutoSuspendTask {
    /// Spawn the loop on a dedicated thread
    pub fn spawn(
        backend: Arc<dyn SuspendBackend>,
        blocker: Arc<SuspendBlocker>,
        stats: Arc<AtomicSuspendStats>,
        interval: Duration,
    ) -> PowerResult<Self> {
        let (command_tx, command_rx) = flume::unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = stop.clone();
        let thread_blocker = blocker.clone();
        let handle = std::thread::Builder::new()
            .name("auto-suspend".to_string())
            .spawn(move || {
                run_auto_suspend_loop(
                    backend.as_ref(),
                    &thread_blocker,
                    &stats,
                    interval,
                    &thread_stop,
                    command_rx,
                )
            })
            .map_err(|e| PowerError::Internal(format!("failed to spawn auto-suspend thread: {}", e)))?;

        info!(interval_ms = interval.as_millis() as u64, "Auto-suspend task spawned");

        Ok(Self {
            command_tx,
            stop,
            blocker,
            handle: Some(handle),
        })
    }

    /// Run a cycle without waiting for the interval
    pub fn trigger(&self) {
        let _ = self.command_tx.send(AutoSuspendCommand::Trigger);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Stop the loop and wait for it; an in-flight suspend completes first
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        let _ = self.command_tx.send(AutoSuspendCommand::Shutdown);
        self.blocker.wake_all();

        if handle.join().is_err() {
            warn!("Auto-suspend thread panicked");
        } else {
            info!("Auto-suspend task shutdown complete");
        }
    }
}

impl Drop for AutoSuspendTask {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run_auto_suspend_loop(
    backend: &dyn SuspendBackend,
    blocker: &SuspendBlocker,
    stats: &AtomicSuspendStats,
    interval: Duration,
    stop: &AtomicBool,
    command_rx: flume::Receiver<AutoSuspendCommand>,
) {
    info!("Auto-suspend loop started");

    loop {
        match command_rx.recv_timeout(interval) {
            Ok(AutoSuspendCommand::Shutdown) | Err(flume::RecvTimeoutError::Disconnected) => break,
            Ok(AutoSuspendCommand::Trigger) | Err(flume::RecvTimeoutError::Timeout) => {}
        }

        if stop.load(Ordering::Acquire) || !blocker.wait_unblocked(stop) {
            break;
        }

        let outcome = suspend_once(backend, blocker, stats);
        debug!(?outcome, "Auto-suspend cycle finished");
    }

    info!("Auto-suspend loop stopped");
}

/// One wakeup-count handshake: read, arm, suspend
pub fn suspend_once(
    backend: &dyn SuspendBackend,
    blocker: &SuspendBlocker,
    stats: &AtomicSuspendStats,
) -> CycleOutcome {
    stats.inc_attempts();

    let count = match backend.read_wakeup_count() {
        Ok(count) => count,
        Err(e) => {
            debug!(error = %e, "Wakeup count read failed, retrying next cycle");
            stats.inc_failures();
            return CycleOutcome::Failed;
        }
    };

    if blocker.count() > 0 {
        return CycleOutcome::Blocked;
    }

    if let Err(e) = backend.write_wakeup_count(count) {
        debug!(error = %e, count, "Wakeup count rejected, retrying next cycle");
        stats.inc_failures();
        return CycleOutcome::Failed;
    }

    if let Err(e) = backend.enter_suspend() {
        warn!(error = %e, "Entering suspend failed");
        stats.inc_failures();
        return CycleOutcome::Failed;
    }

    stats.inc_successes();
    if let Ok(reason) = backend.last_wakeup_reason() {
        info!(reason = %reason, "Resumed from suspend");
        stats.set_wakeup_reason(reason);
    }
    CycleOutcome::Suspended
}
