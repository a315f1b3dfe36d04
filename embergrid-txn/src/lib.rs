//! A live transaction's per-partition bookkeeping (spec §4.2 `TransactionState`,
//! `DependencyInfo`; §4.3 callback family): what a transaction is allowed to
//! see and do, its accumulated round results, the latch a procedure body
//! gates on, and the one-shot callbacks tying outgoing RPCs back to it.

mod callback;
mod dependency;
mod error;
mod latch;
mod round;
mod state;
mod task;

#[cfg(test)]
mod test;

pub use callback::{
    CallbackSlot, CallbackState, CleanupCallback, FinishCallback, InitCallback,
    InitQueueCallback, PrepareCallback, RedirectCallback, WorkCallback,
};
pub use dependency::DependencyInfo;
pub use error::ExecError;
pub use latch::Latch;
pub use state::{LocalRole, RemoteRole, Role, TransactionState};
pub use task::{FragmentTask, TaskStatus};
