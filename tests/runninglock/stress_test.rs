/*!
 * Registry Stress Tests
 * Concurrent lock traffic across types and owners
 */

use crate::common::{registry, FakeDriver};
use powermgr::{LockType, Pid};
use rand::Rng;
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const OPS_PER_THREAD: usize = 500;
const LOCKS_PER_THREAD: usize = 4;

const STRESS_TYPES: [LockType; 4] = [
    LockType::Background,
    LockType::BackgroundTask,
    LockType::BackgroundAudio,
    LockType::Screen,
];

#[test]
fn test_concurrent_lock_unlock_balances() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = registry.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let pid = 100 + t as Pid;
                let handles: Vec<_> = (0..LOCKS_PER_THREAD)
                    .map(|i| {
                        let lock_type = STRESS_TYPES[(t + i) % STRESS_TYPES.len()];
                        registry
                            .create(format!("t{}-{}", t, i), lock_type, pid, 1000, "stress")
                            .unwrap()
                    })
                    .collect();

                for _ in 0..OPS_PER_THREAD {
                    let handle = handles[rng.gen_range(0..handles.len())];
                    if rng.gen_bool(0.5) {
                        registry.lock(handle, 0).unwrap();
                    } else {
                        registry.unlock(handle).unwrap();
                    }
                }

                for handle in handles {
                    registry.release(handle).unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(registry.running_lock_count(None), 0);
    for lock_type in STRESS_TYPES {
        assert_eq!(registry.valid_running_lock_count(lock_type), 0);
    }
    assert_eq!(driver.holds(), driver.unholds());
    assert!(driver.held.lock().is_empty());
    assert_eq!(registry.suspend().suspend_block_count(), 0);
}

#[test]
fn test_concurrent_proxy_with_lock_traffic() {
    let driver = FakeDriver::new();
    let (registry, _sm) = registry(&driver);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            registry
                .create(format!("task-{}", i), LockType::BackgroundTask, 100 + (i % 4), 1000, "a")
                .unwrap()
        })
        .collect();
    let handles = Arc::new(handles);

    let lockers: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            let handles = handles.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..300 {
                    let handle = handles[rng.gen_range(0..handles.len())];
                    if rng.gen_bool(0.6) {
                        registry.lock(handle, 0).unwrap();
                    } else {
                        registry.unlock(handle).unwrap();
                    }
                }
            })
        })
        .collect();

    let proxiers: Vec<_> = (0..4)
        .map(|owner| {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    registry.proxy_running_lock(true, 100 + owner, 1000).unwrap();
                    registry.proxy_running_lock(false, 100 + owner, 1000).unwrap();
                }
            })
        })
        .collect();

    for worker in lockers.into_iter().chain(proxiers) {
        worker.join().unwrap();
    }

    // Every freeze was thawed, so enabled records and the counter agree
    let enabled = handles.iter().filter(|&&h| registry.is_used(h)).count() as u32;
    assert_eq!(registry.valid_running_lock_count(LockType::BackgroundTask), enabled);
    assert_eq!(driver.holds() - driver.unholds(), enabled);

    for &handle in handles.iter() {
        registry.release(handle).unwrap();
    }
    assert_eq!(driver.holds(), driver.unholds());
}
