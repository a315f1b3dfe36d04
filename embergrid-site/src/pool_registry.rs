use std::collections::HashMap;
use std::sync::Arc;

use embergrid_pool::{PoolStats, ProfiledPool};
use embergrid_txn::TransactionState;

/// Named, type-erased pool handles constructed once at supervisor
/// startup, enumerable for the observability surface without
/// reflection (spec §9 Design Notes: "replace reflective enumeration
/// with an explicit registry"). Every partition's transaction-state
/// pools and procedure pools are registered here under a name that
/// encodes which partition and pool class they belong to, e.g.
/// `"p3/local"`, `"p3/remote"`, `"p3/proc/echo"`.
#[derive(Default)]
pub struct PoolRegistry {
    txn_pools: HashMap<String, Arc<ProfiledPool<TransactionState>>>,
    other_pools: HashMap<String, Arc<dyn PoolStatsSource>>,
}

/// Anything that can report `PoolStats` on demand -- lets the registry
/// hold procedure pools (keyed by `Box<dyn StoredProcedure>`, a type
/// `embergrid-site` has no reason to name) alongside transaction-state
/// pools without a generic parameter leaking into the registry itself.
pub trait PoolStatsSource: Send + Sync {
    fn stats(&self) -> PoolStats;
}

impl<T> PoolStatsSource for ProfiledPool<T> {
    fn stats(&self) -> PoolStats {
        ProfiledPool::stats(self)
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        PoolRegistry::default()
    }

    pub fn register_txn_pool(&mut self, name: impl Into<String>, pool: Arc<ProfiledPool<TransactionState>>) {
        self.txn_pools.insert(name.into(), pool);
    }

    pub fn register_pool(&mut self, name: impl Into<String>, pool: Arc<dyn PoolStatsSource>) {
        self.other_pools.insert(name.into(), pool);
    }

    /// Every registered pool's current stats, keyed by name.
    pub fn snapshot(&self) -> HashMap<String, PoolStats> {
        let mut out: HashMap<String, PoolStats> = self
            .txn_pools
            .iter()
            .map(|(name, pool)| (name.clone(), pool.stats()))
            .collect();
        out.extend(self.other_pools.iter().map(|(name, pool)| (name.clone(), pool.stats())));
        out
    }
}
