use std::time::Instant;

use embergrid_base::{DependencyId, Error, Result, TransactionId, UndoToken};
use embergrid_net::Rows;

use crate::mock::InMemoryEngine;
use crate::trait_def::{FragmentExecRequest, StorageEngine};

/// The backend target config knob (spec §6): which concrete storage
/// engine a site binds to. Only `InMemory` has a real implementation
/// in this tree -- the others name real deployment targets the
/// original system supports but that are out of scope here (spec §1:
/// "physical storage-engine internals").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendTarget {
    InMemory,
    NativeJni,
    NativeIpc,
    PureSql,
}

struct UnimplementedEngine {
    name: &'static str,
}

impl StorageEngine for UnimplementedEngine {
    fn load_catalog(&self, _catalog_bytes: &[u8]) -> Result<()> {
        Err(Error::unimplemented(self.name))
    }

    fn tick(&self, _now: Instant, _last_committed_txn_id: TransactionId) -> Result<()> {
        Err(Error::unimplemented(self.name))
    }

    fn execute_fragments(&self, _req: FragmentExecRequest) -> Result<Vec<(DependencyId, Rows)>> {
        Err(Error::unimplemented(self.name))
    }

    fn load_table(
        &self,
        _table_index: i32,
        _rows: Rows,
        _txn_id: TransactionId,
        _last_committed_txn_id: TransactionId,
        _undo_token: UndoToken,
        _allow_elt: bool,
    ) -> Result<()> {
        Err(Error::unimplemented(self.name))
    }

    fn release_undo_token(&self, _token: UndoToken) -> Result<()> {
        Err(Error::unimplemented(self.name))
    }

    fn undo_undo_token(&self, _token: UndoToken) -> Result<()> {
        Err(Error::unimplemented(self.name))
    }
}

/// Constructs the `StorageEngine` for a site's configured backend
/// target. The non-`InMemory` targets return an engine whose every
/// method fails with `Error::unimplemented` -- they exist so
/// `SiteConfig` can name a target without the executor needing a
/// separate code path per backend.
pub fn create_engine(target: BackendTarget) -> Box<dyn StorageEngine> {
    match target {
        BackendTarget::InMemory => Box::new(InMemoryEngine::new()),
        BackendTarget::NativeJni => Box::new(UnimplementedEngine { name: "native JNI backend" }),
        BackendTarget::NativeIpc => Box::new(UnimplementedEngine { name: "native IPC backend" }),
        BackendTarget::PureSql => Box::new(UnimplementedEngine { name: "pure-SQL backend" }),
    }
}
