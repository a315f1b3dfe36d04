use parking_lot::Mutex;

/// A bounded idle-list of `T`, constructed fresh on `acquire` when empty
/// and refilled on `release`. `idle_cap` bounds how many idle instances
/// the pool retains; instances released past the cap are simply dropped.
pub struct ObjectPool<T> {
    idle: Mutex<Vec<T>>,
    idle_cap: usize,
    make: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T> ObjectPool<T> {
    pub fn new(idle_cap: usize, make: impl Fn() -> T + Send + Sync + 'static) -> Self {
        ObjectPool {
            idle: Mutex::new(Vec::with_capacity(idle_cap)),
            idle_cap,
            make: Box::new(make),
        }
    }

    /// Takes an idle instance if one is available, otherwise constructs
    /// a new one. Never blocks.
    pub fn acquire(&self) -> T {
        self.acquire_with_hit().0
    }

    /// Same as `acquire`, additionally reporting whether an idle
    /// instance was reused (`true`) or freshly constructed (`false`).
    pub(crate) fn acquire_with_hit(&self) -> (T, bool) {
        match self.idle.lock().pop() {
            Some(instance) => (instance, true),
            None => ((self.make)(), false),
        }
    }

    /// Returns `instance` to the idle list unless the pool is already at
    /// `idle_cap`, in which case it is dropped.
    pub fn release(&self, instance: T) {
        let mut idle = self.idle.lock();
        if idle.len() < self.idle_cap {
            idle.push(instance);
        }
    }

    pub fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn idle_cap(&self) -> usize {
        self.idle_cap
    }
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("idle_len", &self.idle_len())
            .field("idle_cap", &self.idle_cap)
            .finish()
    }
}
