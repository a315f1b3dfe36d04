// The storage engine is an opaque collaborator (spec §1): we don't
// re-specify its internals, only the surface the executor drives --
// `loadCatalog`, `executeFragments`, `loadTable`, `releaseUndoToken`,
// `undoUndoToken`, `tick`. `InMemoryEngine` is a working mock backend
// for tests and the single-process demo; the other backend targets are
// config knobs (spec §6) with no implementation in this tree.

mod backend;
mod mock;
mod trait_def;

#[cfg(test)]
mod test;

pub use backend::{create_engine, BackendTarget};
pub use mock::InMemoryEngine;
pub use trait_def::{FragmentExecRequest, StorageEngine};
