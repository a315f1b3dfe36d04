use std::collections::HashMap;
use std::sync::Arc;

use embergrid_base::{err, Result};
use embergrid_pool::{PoolStats, ProfiledPool};

use crate::host::StoredProcedure;

/// Bounded pool of reusable instances per named procedure (spec §4.4.1:
/// "If the procedure pool for the named procedure is empty, allocate
/// one"; §6 config knob "procedure-pool default size"). One registry
/// per partition executor. Pools are kept behind `Arc` so a site
/// supervisor can hold a live handle for observability after the
/// executor that owns this registry has moved onto its own thread.
pub struct ProcedureRegistry {
    pools: HashMap<String, Arc<ProfiledPool<Box<dyn StoredProcedure>>>>,
    default_idle_cap: usize,
}

impl ProcedureRegistry {
    pub fn new(default_idle_cap: usize) -> Self {
        ProcedureRegistry {
            pools: HashMap::new(),
            default_idle_cap,
        }
    }

    /// Registers a named procedure's constructor. `idle_cap` overrides
    /// the registry's default pool size for this procedure only.
    pub fn register<F>(&mut self, name: &'static str, idle_cap: Option<usize>, make: F)
    where
        F: Fn() -> Box<dyn StoredProcedure> + Send + Sync + 'static,
    {
        let cap = idle_cap.unwrap_or(self.default_idle_cap);
        self.pools
            .insert(name.to_string(), Arc::new(ProfiledPool::new(cap, make)));
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    pub fn acquire(&self, name: &str) -> Result<Box<dyn StoredProcedure>> {
        self.pools
            .get(name)
            .map(|pool| pool.acquire())
            .ok_or_else(|| err(format!("no stored procedure registered: {name}")))
    }

    pub fn release(&self, name: &str, proc: Box<dyn StoredProcedure>) {
        if let Some(pool) = self.pools.get(name) {
            pool.release(proc);
        }
    }

    /// Snapshot of every procedure pool's hit/miss/high-water counters,
    /// for the site supervisor's observability surface.
    pub fn stats(&self) -> HashMap<String, PoolStats> {
        self.pools.iter().map(|(name, pool)| (name.clone(), pool.stats())).collect()
    }

    /// Live `Arc` handles onto every registered procedure pool, for a
    /// site supervisor to retain after the owning executor has moved
    /// onto its own thread.
    pub fn pool_handles(&self) -> HashMap<String, Arc<ProfiledPool<Box<dyn StoredProcedure>>>> {
        self.pools.clone()
    }
}
