/*!
 * Lock Events
 * Observability events for running lock changes and the sinks that receive them
 */

use crate::core::types::{LockParam, LockType, Pid, Uid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Kind of change carried by a lock event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockEventTag {
    Add,
    Remove,
    Update,
}

impl LockEventTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockEventTag::Add => "DUBAI_TAG_RUNNINGLOCK_ADD",
            LockEventTag::Remove => "DUBAI_TAG_RUNNINGLOCK_REMOVE",
            LockEventTag::Update => "DUBAI_TAG_RUNNINGLOCK_UPDATE",
        }
    }
}

/// Structured lock change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEvent {
    pub handle_id: u64,
    pub pid: Pid,
    pub uid: Uid,
    pub lock_type: LockType,
    pub name: String,
    pub bundle_name: String,
    pub tag: LockEventTag,
    pub timestamp_ms: u64,
}

impl LockEvent {
    pub fn from_param(param: &LockParam, tag: LockEventTag) -> Self {
        Self {
            handle_id: param.handle.id(),
            pid: param.pid,
            uid: param.uid,
            lock_type: param.lock_type,
            name: param.name.clone(),
            bundle_name: param.bundle_name.clone(),
            tag,
            timestamp_ms: now_ms(),
        }
    }
}

/// Renders the line format consumed by power usage tooling
impl fmt::Display for LockEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LOCKID={} PID={} UID={} TYPE={} NAME={} BUNDLENAME={} TAG={} TIMESTAMP={}",
            self.handle_id,
            self.pid,
            self.uid,
            self.lock_type.raw(),
            self.name,
            self.bundle_name,
            self.tag.as_str(),
            self.timestamp_ms
        )
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Receiver of lock change events
///
/// Called on the thread performing the lock operation; implementations must
/// not block and must not call back into the registry.
pub trait LockEventSink: Send + Sync {
    fn handle_event(&self, event: &LockEvent);
}

/// Forwards events into a flume channel
#[derive(Clone)]
pub struct ChannelSink {
    tx: flume::Sender<LockEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn unbounded() -> (Self, flume::Receiver<LockEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }
}

impl LockEventSink for ChannelSink {
    fn handle_event(&self, event: &LockEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.tx.send(event.clone());
    }
}

/// Writes events to the log, as the line format or as JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink {
    json: bool,
}

impl LogSink {
    pub fn new() -> Self {
        Self { json: false }
    }

    pub fn json() -> Self {
        Self { json: true }
    }

    fn render(&self, event: &LockEvent) -> String {
        if self.json {
            serde_json::to_string(event).unwrap_or_else(|_| event.to_string())
        } else {
            event.to_string()
        }
    }
}

impl LockEventSink for LogSink {
    fn handle_event(&self, event: &LockEvent) {
        info!(target: "powermgr::runninglock::events", "{}", self.render(event));
    }
}
