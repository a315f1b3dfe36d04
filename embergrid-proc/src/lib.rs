//! Invokes user procedure bodies, blocking them while they await
//! dependencies, and propagating mispredicts and user aborts (spec §4.6
//! Stored Procedure Host). The host itself never touches the work
//! queue, the engine, or the coordinator: a procedure only reaches
//! those through the `ExecutorContext` the partition executor hands it.

mod host;
mod registry;

#[cfg(test)]
mod test;

pub use host::{ExecutorContext, StoredProcedure};
pub use registry::ProcedureRegistry;
