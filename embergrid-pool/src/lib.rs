// A typed, bounded pool per reusable class (spec §4.1). Every hot
// per-transaction structure -- TransactionState, the callback family,
// dependency records -- is acquired from one of these rather than
// allocated fresh, so steady-state transaction processing does no
// heap churn. Pools are serialized behind a per-pool mutex; no
// thread-affinity is required of callers.

mod pool;
mod profiled;

#[cfg(test)]
mod test;

pub use pool::ObjectPool;
pub use profiled::{PoolStats, ProfiledPool};
