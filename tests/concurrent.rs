use std::hint;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use counted_handles::{SharedHandle, SyncShared, SyncUnique, SyncWeak, WeakHandle};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Tracked {
    drops: Arc<AtomicUsize>,
    value: usize,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn tracked(value: usize) -> (Tracked, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    (
        Tracked {
            drops: drops.clone(),
            value,
        },
        drops,
    )
}

#[test]
fn handles_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SyncShared<String>>();
    assert_send_sync::<SyncWeak<String>>();
    assert_send_sync::<SyncUnique<String>>();
}

#[test]
fn clones_across_threads_drop_once() {
    init();
    let (value, drops) = tracked(11);
    let shared = SyncShared::new(value);

    thread::scope(|scope| {
        for _ in 0..8 {
            let handle = shared.clone();
            scope.spawn(move || {
                let mut local = Vec::new();
                for _ in 0..1000 {
                    local.push(handle.clone());
                }
                assert_eq!(local[0].get().map(|t| t.value), Ok(11));
            });
        }
    });

    assert_eq!(SharedHandle::count(&shared), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(shared);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn racing_last_releases_destroy_once() {
    init();
    for _ in 0..200 {
        let (value, drops) = tracked(0);
        let shared = SyncShared::new(value);
        let handles: Vec<_> = (0..4).map(|_| shared.clone()).collect();
        drop(shared);

        let barrier = Barrier::new(handles.len());
        thread::scope(|scope| {
            for handle in handles {
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    drop(handle);
                });
            }
        });

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn upgrade_never_resurrects() {
    init();
    for _ in 0..200 {
        let (value, drops) = tracked(5);
        let shared = SyncShared::new(value);
        let weak = WeakHandle::from_shared(&shared);
        let barrier = Barrier::new(2);

        thread::scope(|scope| {
            let barrier = &barrier;
            let weak = &weak;
            let drops = &drops;
            scope.spawn(move || {
                barrier.wait();
                drop(shared);
            });
            scope.spawn(move || {
                barrier.wait();
                if let Some(upgraded) = weak.upgrade() {
                    // A successful upgrade must see a live value.
                    assert_eq!(upgraded.get().map(|t| t.value), Ok(5));
                    assert_eq!(drops.load(Ordering::SeqCst), 0);
                }
            });
        });

        assert!(weak.expired());
        assert!(weak.upgrade().is_none());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn racing_weak_and_strong_release() {
    init();
    for _ in 0..200 {
        let (value, drops) = tracked(0);
        let shared = SyncShared::new(value);
        let weaks: Vec<SyncWeak<Tracked>> =
            (0..3).map(|_| SharedHandle::downgrade(&shared)).collect();
        let barrier = Barrier::new(weaks.len() + 1);

        thread::scope(|scope| {
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                drop(shared);
            });
            for weak in weaks {
                scope.spawn(move || {
                    barrier.wait();
                    drop(weak);
                });
            }
        });

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn try_unwrap_contended() {
    init();
    let shared = SyncShared::new(String::from("payload"));
    let weak = SharedHandle::downgrade(&shared);
    let other = shared.clone();

    let handle = thread::spawn(move || SharedHandle::try_unwrap(other).is_ok());
    let unwrapped_here = match SharedHandle::try_unwrap(shared) {
        Ok(value) => {
            assert_eq!(value, "payload");
            true
        }
        Err(shared) => {
            drop(shared);
            false
        }
    };
    let unwrapped_there = handle.join().unwrap();

    // at most one side can be the last owner when it tries
    assert!(!(unwrapped_here && unwrapped_there));
    assert!(weak.expired());
}

/// Upgrades `weak`, drops it, and keeps the upgraded handle for a while. `holding` is set
/// for as long as the upgraded handle may exist.
fn upgrade_and_hold(weak: SyncWeak<usize>, holding: &AtomicBool, barrier: &Barrier) {
    holding.store(true, Ordering::SeqCst);
    barrier.wait();

    let upgraded = weak.upgrade().expect("the other owner keeps the value alive");
    drop(weak);
    for _ in 0..50 {
        assert_eq!(SharedHandle::count(&upgraded), 2);
        assert!(upgraded.get().is_ok());
        hint::spin_loop();
    }

    holding.store(false, Ordering::SeqCst);
    drop(upgraded);
}

#[test]
fn get_mut_waits_for_upgraded_handles() {
    init();
    for _ in 0..200 {
        let mut shared = SyncShared::new(0usize);
        let weak = SharedHandle::downgrade(&shared);
        let holding = AtomicBool::new(false);
        let barrier = Barrier::new(2);

        thread::scope(|scope| {
            let (holding, barrier) = (&holding, &barrier);
            scope.spawn(move || upgrade_and_hold(weak, holding, barrier));

            barrier.wait();
            loop {
                if let Some(value) = shared.get_mut() {
                    assert!(!holding.load(Ordering::SeqCst));
                    *value += 1;
                    break;
                }
                hint::spin_loop();
            }
        });

        assert_eq!(shared.get(), Ok(&1));
        assert_eq!(SharedHandle::count(&shared), 1);
    }
}

#[test]
fn try_into_unique_waits_for_upgraded_handles() {
    init();
    for _ in 0..200 {
        let mut shared = SyncShared::new(7usize);
        let weak = SharedHandle::downgrade(&shared);
        let holding = AtomicBool::new(false);
        let barrier = Barrier::new(2);

        let unique: SyncUnique<usize> = thread::scope(|scope| {
            let (holding, barrier) = (&holding, &barrier);
            scope.spawn(move || upgrade_and_hold(weak, holding, barrier));

            barrier.wait();
            loop {
                match SharedHandle::try_into_unique(shared) {
                    Ok(unique) => {
                        assert!(!holding.load(Ordering::SeqCst));
                        break unique;
                    }
                    Err(back) => {
                        shared = back;
                        hint::spin_loop();
                    }
                }
            }
        });

        assert_eq!(unique.get(), Ok(&7));
        let shared = unique.into_shared();
        assert_eq!(SharedHandle::count(&shared), 1);
        let weak = SharedHandle::downgrade(&shared);
        drop(shared);
        assert!(weak.expired());
    }
}

#[test]
fn downgrade_during_uniqueness_checks() {
    init();
    let mut shared = SyncShared::new(0usize);
    let other = shared.clone();
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        let done = &done;
        let other = &other;
        scope.spawn(move || {
            while !done.load(Ordering::SeqCst) {
                let weak = SharedHandle::downgrade(other);
                assert!(!weak.expired());
            }
        });

        for _ in 0..10_000 {
            // another strong handle exists throughout
            assert!(shared.get_mut().is_none());
        }
        done.store(true, Ordering::SeqCst);
    });

    assert_eq!(SharedHandle::weak_count(&shared), 0);
    drop(other);
    assert_eq!(shared.get_mut(), Some(&mut 0));
}
