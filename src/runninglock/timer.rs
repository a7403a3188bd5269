/*!
 * Lock Timeout Timer
 * One-shot expiry per handle on a lazily started thread
 */

use crate::core::errors::{PowerError, PowerResult};
use crate::core::id::ClientHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Called on the timer thread when a handle's deadline passes
pub type ExpiryFn = Arc<dyn Fn(ClientHandle) + Send + Sync>;

#[derive(Debug)]
enum TimerCommand {
    Arm(ClientHandle, Instant),
    Cancel(ClientHandle),
    Shutdown,
}

struct TimerWorker {
    tx: flume::Sender<TimerCommand>,
    handle: JoinHandle<()>,
}

/// Per-handle one-shot timers
///
/// Arming a handle again replaces its previous deadline.
pub struct LockTimer {
    on_expire: ExpiryFn,
    worker: Mutex<Option<TimerWorker>>,
}

impl LockTimer {
    pub fn new(on_expire: ExpiryFn) -> Self {
        Self {
            on_expire,
            worker: Mutex::new(None),
        }
    }

    /// Fire `on_expire(handle)` after `after`, replacing any pending deadline
    pub fn arm(&self, handle: ClientHandle, after: Duration) -> PowerResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_none() {
            *worker = Some(self.spawn_worker()?);
        }
        if let Some(w) = worker.as_ref() {
            let _ = w.tx.send(TimerCommand::Arm(handle, Instant::now() + after));
        }
        debug!(handle = handle.id(), after_ms = after.as_millis() as u64, "Lock timer armed");
        Ok(())
    }

    pub fn cancel(&self, handle: ClientHandle) {
        if let Some(w) = self.worker.lock().as_ref() {
            let _ = w.tx.send(TimerCommand::Cancel(handle));
        }
    }

    pub fn is_started(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Stop the timer thread; pending deadlines are discarded
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = worker.tx.send(TimerCommand::Shutdown);

        // The last registry reference may be dropped from inside an expiry callback
        if worker.handle.thread().id() == std::thread::current().id() {
            return;
        }
        if worker.handle.join().is_err() {
            warn!("Lock timer thread panicked");
        }
    }

    fn spawn_worker(&self) -> PowerResult<TimerWorker> {
        let (tx, rx) = flume::unbounded();
        let on_expire = self.on_expire.clone();
        let handle = std::thread::Builder::new()
            .name("runninglock-timer".to_string())
            .spawn(move || run_timer_loop(rx, on_expire))
            .map_err(|e| PowerError::Internal(format!("failed to spawn lock timer: {}", e)))?;

        info!("Lock timer started");
        Ok(TimerWorker { tx, handle })
    }
}

impl Drop for LockTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_timer_loop(rx: flume::Receiver<TimerCommand>, on_expire: ExpiryFn) {
    let mut deadlines: HashMap<ClientHandle, Instant> = HashMap::new();

    loop {
        let command = match deadlines.values().min().copied() {
            Some(next) => rx.recv_deadline(next),
            None => rx.recv().map_err(|_| flume::RecvTimeoutError::Disconnected),
        };

        match command {
            Ok(TimerCommand::Arm(handle, at)) => {
                deadlines.insert(handle, at);
            }
            Ok(TimerCommand::Cancel(handle)) => {
                deadlines.remove(&handle);
            }
            Ok(TimerCommand::Shutdown) | Err(flume::RecvTimeoutError::Disconnected) => break,
            Err(flume::RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        let expired: Vec<ClientHandle> = deadlines
            .iter()
            .filter(|&(_, &at)| at <= now)
            .map(|(&handle, _)| handle)
            .collect();
        for handle in expired {
            deadlines.remove(&handle);
            debug!(handle = handle.id(), "Lock timer expired");
            on_expire(handle);
        }
    }

    debug!("Lock timer stopped");
}
