use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use splitmap::{Collector, SplitOrderedMap};

struct DropCount(Arc<AtomicUsize>);
impl Drop for DropCount {
    #[inline]
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn growth_under_sequential_load() {
    let values: Vec<u64> = (0..10_000).collect();
    let mut map: SplitOrderedMap<u64> = SplitOrderedMap::new();

    {
        let local = map.register().unwrap();

        for key in 1..=10_000u64 {
            let value = NonNull::from(&values[key as usize - 1]);
            assert_eq!(local.insert(key, value), None);
        }
        assert_eq!(local.len(), 10_000);

        for key in 1..=10_000u64 {
            let value = NonNull::from(&values[key as usize - 1]);
            assert_eq!(local.get(key), Some(value));
        }

        for key in 1..=5_000u64 {
            assert!(local.remove(key).is_some());
        }
        assert_eq!(local.len(), 5_000);

        for key in 1..=5_000u64 {
            assert_eq!(local.get(key), None);
        }
        for key in 5_001..=10_000u64 {
            let value = NonNull::from(&values[key as usize - 1]);
            assert_eq!(local.get(key), Some(value));
        }
    }

    // 10_000 entries against a load factor of 75% force multiple doublings
    // of the initial 16 buckets
    assert!(map.capacity() >= 16_384);
}

#[test]
fn disjoint_key_ranges_across_threads() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 10_000;

    let map: Arc<SplitOrderedMap<u64>> = Arc::new(SplitOrderedMap::new());
    let values: Arc<Vec<u64>> = Arc::new((0..(THREADS * PER_THREAD) as u64).collect());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let map = Arc::clone(&map);
            let values = Arc::clone(&values);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                let local = map.register().unwrap();
                let base = thread_id * PER_THREAD;
                barrier.wait();

                for offset in 0..PER_THREAD {
                    let key = (base + offset) as u64 + 1;
                    let value = NonNull::from(&values[base + offset]);
                    assert_eq!(local.insert(key, value), None);
                }

                for offset in 0..PER_THREAD {
                    let key = (base + offset) as u64 + 1;
                    let value = NonNull::from(&values[base + offset]);
                    assert_eq!(local.get(key), Some(value));
                }

                for offset in 0..PER_THREAD {
                    let key = (base + offset) as u64 + 1;
                    let value = NonNull::from(&values[base + offset]);
                    assert_eq!(local.remove(key), Some(value));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.len(), 0);
}

#[test]
fn contended_updates_on_one_key() {
    const THREADS: usize = 4;
    const ITERATIONS: usize = 1_000;

    let map: Arc<SplitOrderedMap<u64>> = Arc::new(SplitOrderedMap::new());
    let values: Arc<Vec<u64>> = Arc::new((0..THREADS as u64).collect());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let map = Arc::clone(&map);
            let values = Arc::clone(&values);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                let local = map.register().unwrap();
                let value = NonNull::from(&values[thread_id]);
                barrier.wait();

                for _ in 0..ITERATIONS {
                    let _ = local.insert(1, value);
                    assert!(local.get(1).is_some());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // all threads updated the same key, exactly one mapping survives
    assert_eq!(map.len(), 1);
    let local = map.register().unwrap();
    let survivor = local.get(1).unwrap();
    assert!(values.iter().any(|value| NonNull::from(value) == survivor));
}

#[test]
fn concurrent_retirement_is_reclaimed() {
    const THREADS: usize = 4;
    const ITERATIONS: usize = 1_000;

    let collector = Arc::new(Collector::new());
    let count = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let collector = Arc::clone(&collector);
            let count = Arc::clone(&count);

            thread::spawn(move || {
                let local = collector.register().unwrap();
                for _ in 0..ITERATIONS {
                    let guard = local.pin();
                    let record = Box::new(DropCount(Arc::clone(&count)));
                    unsafe { guard.retire(NonNull::from(Box::leak(record))) };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // drain whatever the exiting threads abandoned, then tear down
    {
        let local = collector.register().unwrap();
        for _ in 0..5 {
            let _ = local.pin();
        }
    }

    let collector = Arc::try_unwrap(collector).ok().unwrap();
    drop(collector);

    assert_eq!(count.load(Ordering::Relaxed), THREADS * ITERATIONS);
}

#[test]
fn unregistered_threads_leave_no_garbage_behind() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 1_000;

    let map: Arc<SplitOrderedMap<u64>> = Arc::new(SplitOrderedMap::new());
    let values: Arc<Vec<u64>> = Arc::new((0..(THREADS * PER_THREAD) as u64).collect());

    let handles: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let map = Arc::clone(&map);
            let values = Arc::clone(&values);

            thread::spawn(move || {
                let local = map.register().unwrap();
                let base = thread_id * PER_THREAD;

                for offset in 0..PER_THREAD {
                    let key = (base + offset) as u64 + 1;
                    let _ = local.insert(key, NonNull::from(&values[base + offset]));
                }
                for offset in 0..PER_THREAD {
                    let key = (base + offset) as u64 + 1;
                    let _ = local.remove(key);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.len(), 0);

    // dropping the map reclaims every node, including abandoned arrears
    let map = Arc::try_unwrap(map).ok().unwrap();
    drop(map);
}
