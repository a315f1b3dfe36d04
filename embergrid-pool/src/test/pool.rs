use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use test_log::test;

use crate::ObjectPool;

#[test]
fn test_acquire_constructs_when_empty() {
    let pool: ObjectPool<u64> = ObjectPool::new(4, || 7);
    assert_eq!(pool.acquire(), 7);
}

#[test]
fn test_release_then_acquire_reuses_instance() {
    let counter = Arc::new(AtomicUsize::new(0));
    let pool = {
        let counter = counter.clone();
        ObjectPool::new(2, move || counter.fetch_add(1, Ordering::SeqCst))
    };

    let a = pool.acquire();
    assert_eq!(a, 0);
    pool.release(a);

    let b = pool.acquire();
    assert_eq!(b, 0, "released instance should be reused, not reconstructed");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_release_past_cap_is_dropped() {
    let pool: ObjectPool<u64> = ObjectPool::new(1, || 0);
    pool.release(1);
    pool.release(2);
    assert_eq!(pool.idle_len(), 1);
}
