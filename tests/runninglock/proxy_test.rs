/*!
 * Proxy Tests
 * Freezing and thawing the locks of one owner
 */

use crate::common::{registry, FakeDriver};
use powermgr::{ChannelSink, LockEvent, LockEventSink, LockEventTag, LockState, LockType, PowerError};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PID: i32 = 100;
const UID: i32 = 1000;

#[test]
fn test_reentrant_proxy_suspends_once_and_restores_once() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let bg = registry.create("bg", LockType::Background, PID, UID, "a").unwrap();
    let audio = registry.create("audio", LockType::BackgroundAudio, PID, UID, "a").unwrap();
    registry.lock(bg, 0).unwrap();
    registry.lock(audio, 0).unwrap();
    assert_eq!(driver.holds(), 2);

    for _ in 0..3 {
        registry.proxy_running_lock(true, PID, UID).unwrap();
    }
    assert!(registry.is_proxied(PID, UID));
    assert_eq!(registry.lock_state(bg), Some(LockState::Proxied));
    assert_eq!(registry.lock_state(audio), Some(LockState::Proxied));
    assert_eq!(driver.unholds(), 2);
    assert_eq!(registry.valid_running_lock_count(LockType::Background), 0);
    assert_eq!(registry.valid_running_lock_count(LockType::BackgroundAudio), 0);

    // Two of three thaws leave the owner frozen
    registry.proxy_running_lock(false, PID, UID).unwrap();
    registry.proxy_running_lock(false, PID, UID).unwrap();
    assert!(registry.is_proxied(PID, UID));
    assert_eq!(driver.holds(), 2);

    registry.proxy_running_lock(false, PID, UID).unwrap();
    assert!(!registry.is_proxied(PID, UID));
    assert_eq!(registry.lock_state(bg), Some(LockState::Enabled));
    assert_eq!(registry.lock_state(audio), Some(LockState::Enabled));
    assert_eq!(driver.holds(), 4);
    assert_eq!(registry.valid_running_lock_count(LockType::Background), 1);
    assert_eq!(registry.valid_running_lock_count(LockType::BackgroundAudio), 1);
}

#[test]
fn test_proxy_and_restore_emit_updates() {
    let driver = FakeDriver::new();
    let (sink, rx) = ChannelSink::unbounded();
    let (registry, _sm) = registry(&driver);
    registry.register_event_sink(Arc::new(sink));

    let audio = registry.create("audio", LockType::BackgroundAudio, PID, UID, "a").unwrap();
    registry.lock(audio, 0).unwrap();
    registry.proxy_running_lock(true, PID, UID).unwrap();
    registry.proxy_running_lock(false, PID, UID).unwrap();

    let tags: Vec<LockEventTag> = rx.try_iter().map(|e| e.tag).collect();
    assert_eq!(tags, vec![LockEventTag::Add, LockEventTag::Update, LockEventTag::Update]);
}

#[test]
fn test_lock_while_proxied_is_ignored() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let task = registry.create("task", LockType::BackgroundTask, PID, UID, "a").unwrap();
    registry.proxy_running_lock(true, PID, UID).unwrap();

    registry.lock(task, 5000).unwrap();
    assert_eq!(registry.lock_state(task), Some(LockState::Unused));
    assert!(!registry.is_used(task));
    assert_eq!(driver.holds(), 0);

    // Thawing does not replay a request made while frozen
    registry.proxy_running_lock(false, PID, UID).unwrap();
    assert_eq!(registry.lock_state(task), Some(LockState::Unused));
    assert_eq!(registry.valid_running_lock_count(LockType::BackgroundTask), 0);
    assert_eq!(driver.holds(), 0);

    registry.lock(task, 0).unwrap();
    assert!(registry.is_used(task));
    assert_eq!(driver.holds(), 1);
}

#[test]
fn test_lock_on_suspended_lock_keeps_it_suspended() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let task = registry.create("task", LockType::BackgroundTask, PID, UID, "a").unwrap();
    registry.lock(task, 0).unwrap();
    registry.proxy_running_lock(true, PID, UID).unwrap();

    registry.lock(task, 0).unwrap();
    assert_eq!(registry.lock_state(task), Some(LockState::Proxied));
    assert_eq!(driver.holds(), 1);

    registry.proxy_running_lock(false, PID, UID).unwrap();
    assert_eq!(registry.lock_state(task), Some(LockState::Enabled));
    assert_eq!(driver.holds(), 2);
}

#[test]
fn test_unlock_while_proxied_drops_intent() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let task = registry.create("task", LockType::BackgroundTask, PID, UID, "a").unwrap();
    registry.lock(task, 0).unwrap();
    registry.proxy_running_lock(true, PID, UID).unwrap();

    registry.unlock(task).unwrap();
    assert_eq!(registry.lock_state(task), Some(LockState::Disabled));

    registry.proxy_running_lock(false, PID, UID).unwrap();
    assert_eq!(registry.lock_state(task), Some(LockState::Disabled));
    assert_eq!(driver.holds(), 1);
    assert_eq!(driver.unholds(), 1);
}

#[test]
fn test_other_owners_unaffected() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let mine = registry.create("mine", LockType::BackgroundTask, PID, UID, "a").unwrap();
    let same_pid_other_uid =
        registry.create("other", LockType::BackgroundTask, PID, UID + 1, "b").unwrap();
    registry.lock(mine, 0).unwrap();
    registry.lock(same_pid_other_uid, 0).unwrap();

    registry.proxy_running_lock(true, PID, UID).unwrap();

    assert_eq!(registry.lock_state(mine), Some(LockState::Proxied));
    assert!(registry.is_used(same_pid_other_uid));
}

#[test]
fn test_proximity_locks_ignore_proxy() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let prox = registry
        .create("call", LockType::ProximityScreenControl, PID, UID, "phone")
        .unwrap();
    registry.lock(prox, 0).unwrap();
    registry.proxy_running_lock(true, PID, UID).unwrap();

    assert!(registry.is_used(prox));
    assert_eq!(registry.valid_running_lock_count(LockType::ProximityScreenControl), 1);
}

#[test]
fn test_invalid_pid_rejected() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let err = registry.proxy_running_lock(true, 0, UID).unwrap_err();
    assert!(matches!(err, PowerError::InvalidPid(0)));
    assert!(!registry.is_proxied(0, UID));
}

#[test]
fn test_batch_proxy_reports_first_failure() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let err = registry
        .proxy_running_locks(true, &[(PID, UID), (-1, UID), (PID + 1, UID)])
        .unwrap_err();

    assert!(matches!(err, PowerError::InvalidPid(-1)));
    assert!(registry.is_proxied(PID, UID));
    assert!(registry.is_proxied(PID + 1, UID));
}

#[test]
fn test_reset_restores_everything() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let a = registry.create("a", LockType::BackgroundTask, PID, UID, "a").unwrap();
    let b = registry.create("b", LockType::BackgroundSport, PID + 1, UID, "b").unwrap();
    registry.lock(a, 0).unwrap();
    registry.lock(b, 0).unwrap();

    registry.proxy_running_locks(true, &[(PID, UID), (PID + 1, UID)]).unwrap();
    registry.proxy_running_lock(true, PID, UID).unwrap();
    assert!(!registry.exist_valid_running_lock());

    registry.reset_running_locks();

    assert!(registry.is_used(a));
    assert!(registry.is_used(b));
    assert!(!registry.is_proxied(PID, UID));
    assert!(!registry.is_proxied(PID + 1, UID));
}

#[test]
fn test_failed_restore_retried_on_next_lock() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let task = registry.create("task", LockType::BackgroundTask, PID, UID, "a").unwrap();
    registry.lock(task, 0).unwrap();
    registry.proxy_running_lock(true, PID, UID).unwrap();

    driver.fail_with(-1);
    registry.proxy_running_lock(false, PID, UID).unwrap();
    assert_eq!(registry.lock_state(task), Some(LockState::UnproxiedRestore));
    assert!(!registry.is_used(task));

    driver.fail_with(0);
    registry.lock(task, 0).unwrap();
    assert_eq!(registry.lock_state(task), Some(LockState::Enabled));
    assert_eq!(registry.valid_running_lock_count(LockType::BackgroundTask), 1);
}

#[test]
fn test_released_lock_leaves_proxy_entry() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let task = registry.create("task", LockType::BackgroundTask, PID, UID, "a").unwrap();
    registry.proxy_running_lock(true, PID, UID).unwrap();
    registry.release(task).unwrap();

    // Freeze request outlives the lock it was made for
    assert!(registry.is_proxied(PID, UID));
    registry.proxy_running_lock(false, PID, UID).unwrap();
    assert!(!registry.is_proxied(PID, UID));
}

/// Parks the first update event until released
struct ParkingSink {
    parked: AtomicBool,
    entered: flume::Sender<()>,
    release: flume::Receiver<()>,
}

impl LockEventSink for ParkingSink {
    fn handle_event(&self, event: &LockEvent) {
        if event.tag == LockEventTag::Update && !self.parked.swap(true, Ordering::SeqCst) {
            let _ = self.entered.send(());
            let _ = self.release.recv();
        }
    }
}

#[test]
fn test_thaw_waits_for_in_flight_freeze() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);
    let (entered_tx, entered_rx) = flume::bounded(1);
    let (release_tx, release_rx) = flume::bounded(1);
    registry.register_event_sink(Arc::new(ParkingSink {
        parked: AtomicBool::new(false),
        entered: entered_tx,
        release: release_rx,
    }));

    let task = registry.create("task", LockType::BackgroundTask, PID, UID, "a").unwrap();
    registry.lock(task, 0).unwrap();

    let freezer = {
        let registry = registry.clone();
        thread::spawn(move || registry.proxy_running_lock(true, PID, UID).unwrap())
    };
    entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let thawer = {
        let registry = registry.clone();
        thread::spawn(move || registry.proxy_running_lock(false, PID, UID).unwrap())
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!thawer.is_finished());

    release_tx.send(()).unwrap();
    freezer.join().unwrap();
    thawer.join().unwrap();

    assert!(!registry.is_proxied(PID, UID));
    assert_eq!(registry.lock_state(task), Some(LockState::Enabled));
    assert_eq!(registry.valid_running_lock_count(LockType::BackgroundTask), 1);
    assert_eq!(driver.holds() - driver.unholds(), 1);
}

#[test]
fn test_racing_freeze_thaw_pairs_leave_lock_enabled() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);
    let task = registry.create("task", LockType::BackgroundTask, PID, UID, "a").unwrap();
    registry.lock(task, 0).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    registry.proxy_running_lock(true, PID, UID).unwrap();
                    registry.proxy_running_lock(false, PID, UID).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(!registry.is_proxied(PID, UID));
    assert_eq!(registry.lock_state(task), Some(LockState::Enabled));
    assert_eq!(registry.valid_running_lock_count(LockType::BackgroundTask), 1);
    assert_eq!(driver.holds() - driver.unholds(), 1);
}

#[test]
fn test_work_sources_freeze_when_every_app_proxied() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    // Media service holds audio on behalf of two apps
    let audio = registry
        .create("playback", LockType::BackgroundAudio, 50, 1041, "media")
        .unwrap();
    registry.lock(audio, 0).unwrap();
    assert!(registry.update_work_source(audio, &[(3001, "music"), (3002, "radio")]));
    assert_eq!(
        registry.work_sources(audio),
        vec![(3001, "music".to_string()), (3002, "radio".to_string())]
    );

    registry.proxy_running_lock(true, 600, 3001).unwrap();
    assert!(registry.is_used(audio));
    assert!(!registry.is_lock_proxied(audio));

    registry.proxy_running_lock(true, 601, 3002).unwrap();
    assert!(registry.is_lock_proxied(audio));
    assert_eq!(registry.lock_state(audio), Some(LockState::Proxied));
    assert_eq!(driver.unholds(), 1);

    // Lock requests stay ignored while frozen
    registry.lock(audio, 0).unwrap();
    assert_eq!(registry.lock_state(audio), Some(LockState::Proxied));

    registry.proxy_running_lock(false, 600, 3001).unwrap();
    assert_eq!(registry.lock_state(audio), Some(LockState::Enabled));
    assert_eq!(driver.holds(), 2);
}

#[test]
fn test_work_source_update_applies_current_freezes() {
    let driver = FakeDriver::new();
    let (sink, rx) = ChannelSink::unbounded();
    let (registry, _sm) = registry(&driver);
    registry.register_event_sink(Arc::new(sink));

    let audio = registry
        .create("playback", LockType::BackgroundAudio, 50, 1041, "media")
        .unwrap();
    registry.lock(audio, 0).unwrap();
    registry.proxy_running_lock(true, 600, 3001).unwrap();

    assert!(registry.update_work_source(audio, &[(3001, "music")]));
    assert_eq!(registry.lock_state(audio), Some(LockState::Proxied));

    assert!(registry.update_work_source(audio, &[(3001, "music"), (3002, "radio")]));
    assert_eq!(registry.lock_state(audio), Some(LockState::Enabled));

    let last = rx.try_iter().last().unwrap();
    assert_eq!(last.tag, LockEventTag::Update);
    assert_eq!(last.bundle_name, "music radio");
}

#[test]
fn test_work_source_rejected_for_unknown_or_untracked() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let prox = registry
        .create("call", LockType::ProximityScreenControl, PID, UID, "phone")
        .unwrap();
    assert!(!registry.update_work_source(prox, &[(3001, "music")]));
    registry.release(prox).unwrap();
    assert!(!registry.update_work_source(prox, &[(3001, "music")]));
}

#[test]
fn test_audio_stream_lookup() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let own = registry.create("own", LockType::BackgroundAudio, PID, UID, "player").unwrap();
    let shared = registry
        .create("playback", LockType::BackgroundAudio, 50, 1041, "media")
        .unwrap();
    registry.update_work_source(shared, &[(3001, "music")]);
    assert!(!registry.is_exist_audio_stream(UID));

    registry.lock(own, 0).unwrap();
    registry.lock(shared, 0).unwrap();
    assert!(registry.is_exist_audio_stream(UID));
    assert!(registry.is_exist_audio_stream(3001));
    assert!(!registry.is_exist_audio_stream(3002));

    registry.proxy_running_lock(true, PID, UID).unwrap();
    assert!(!registry.is_exist_audio_stream(UID));
}
