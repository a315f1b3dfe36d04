use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use embergrid_pool::PoolStats;

/// Site-wide counters (spec §4.7: "expose an observability surface --
/// pool sizes, running transactions, error counters"). One instance is
/// shared by every partition executor at a site; each counter is a
/// plain `AtomicU64` rather than anything requiring a lock, since the
/// supervisor only ever needs an eventually-consistent snapshot.
#[derive(Debug, Default)]
pub struct Stats {
    txns_initiated: AtomicU64,
    txns_committed: AtomicU64,
    txns_aborted: AtomicU64,
    txns_mispredicted: AtomicU64,
    fragments_executed: AtomicU64,
    errors_ee: AtomicU64,
    errors_sql: AtomicU64,
    errors_deserialize: AtomicU64,
    errors_unknown_txn: AtomicU64,
    errors_fatal: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    pub fn record_initiated(&self) {
        self.txns_initiated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_committed(&self) {
        self.txns_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aborted(&self) {
        self.txns_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mispredicted(&self) {
        self.txns_mispredicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fragment_executed(&self) {
        self.fragments_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, category: ErrorCategory) {
        let counter = match category {
            ErrorCategory::Ee => &self.errors_ee,
            ErrorCategory::Sql => &self.errors_sql,
            ErrorCategory::Deserialize => &self.errors_deserialize,
            ErrorCategory::UnknownTxn => &self.errors_unknown_txn,
            ErrorCategory::Fatal => &self.errors_fatal,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            txns_initiated: self.txns_initiated.load(Ordering::Relaxed),
            txns_committed: self.txns_committed.load(Ordering::Relaxed),
            txns_aborted: self.txns_aborted.load(Ordering::Relaxed),
            txns_mispredicted: self.txns_mispredicted.load(Ordering::Relaxed),
            fragments_executed: self.fragments_executed.load(Ordering::Relaxed),
            errors_ee: self.errors_ee.load(Ordering::Relaxed),
            errors_sql: self.errors_sql.load(Ordering::Relaxed),
            errors_deserialize: self.errors_deserialize.load(Ordering::Relaxed),
            errors_unknown_txn: self.errors_unknown_txn.load(Ordering::Relaxed),
            errors_fatal: self.errors_fatal.load(Ordering::Relaxed),
        }
    }
}

/// Mirrors `embergrid_txn::ExecError`'s taxonomy (spec §7), minus the
/// variants that never reach a counter (`UserAbort`/`Mispredict` have
/// their own dedicated counters above).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    Ee,
    Sql,
    Deserialize,
    UnknownTxn,
    Fatal,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    pub txns_initiated: u64,
    pub txns_committed: u64,
    pub txns_aborted: u64,
    pub txns_mispredicted: u64,
    pub fragments_executed: u64,
    pub errors_ee: u64,
    pub errors_sql: u64,
    pub errors_deserialize: u64,
    pub errors_unknown_txn: u64,
    pub errors_fatal: u64,
}

/// A full observability snapshot: site-wide counters plus every
/// registered pool's hit/miss/high-water stats, keyed by pool name
/// (spec §4.7: "pool sizes").
#[derive(Clone, Debug, Default)]
pub struct SiteSnapshot {
    pub stats: StatsSnapshot,
    pub pools: HashMap<String, PoolStats>,
}
