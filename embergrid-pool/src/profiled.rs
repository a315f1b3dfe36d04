use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::pool::ObjectPool;

/// A snapshot of a `ProfiledPool`'s counters, suitable for the site
/// supervisor's observability surface.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub high_water: usize,
}

/// Decorates an `ObjectPool` with hit/miss/high-water counters (spec
/// §4.1: "optional profiling counters"). Kept separate from the base
/// pool so the common path pays nothing for profiling when it's off.
pub struct ProfiledPool<T> {
    inner: ObjectPool<T>,
    hits: AtomicU64,
    misses: AtomicU64,
    high_water: AtomicUsize,
    outstanding: AtomicUsize,
}

impl<T> ProfiledPool<T> {
    pub fn new(idle_cap: usize, make: impl Fn() -> T + Send + Sync + 'static) -> Self {
        ProfiledPool {
            inner: ObjectPool::new(idle_cap, make),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            high_water: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn acquire(&self) -> T {
        let (instance, hit) = self.inner.acquire_with_hit();
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        let outstanding = self.outstanding.fetch_add(1, Ordering::Relaxed) + 1;
        self.high_water.fetch_max(outstanding, Ordering::Relaxed);
        instance
    }

    pub fn release(&self, instance: T) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        self.inner.release(instance);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            high_water: self.high_water.load(Ordering::Relaxed),
        }
    }
}

impl<T> std::fmt::Debug for ProfiledPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfiledPool")
            .field("inner", &self.inner)
            .field("stats", &self.stats())
            .finish()
    }
}
