use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use embergrid_base::{DependencyId, FragmentId, Result, TransactionId, UndoToken};
use embergrid_engine::{FragmentExecRequest, StorageEngine};
use embergrid_net::Rows;
use parking_lot::Mutex;

/// What a scripted fragment id does when executed: produce canned rows,
/// or fail with a message. Unlike `InMemoryEngine`'s positional echo,
/// this lets a scenario test control a partition's output independent
/// of whatever it was handed as input -- useful for driving a remote
/// partition's result without a real query plan behind it.
pub enum Script {
    Rows(Rows),
    Fail(String),
}

/// A `StorageEngine` stand-in for scenario tests, scripted per
/// `FragmentId` ahead of time. Also records every undo token released
/// or rolled back, so a test can assert the executor drove the engine
/// the way spec §3's commit/abort discipline requires.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<HashMap<FragmentId, Script>>,
    released: Mutex<Vec<UndoToken>>,
    undone: Mutex<Vec<UndoToken>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        ScriptedEngine::default()
    }

    pub fn script(&self, fragment_id: FragmentId, script: Script) {
        self.scripts.lock().insert(fragment_id, script);
    }

    pub fn released_tokens(&self) -> Vec<UndoToken> {
        self.released.lock().clone()
    }

    pub fn undone_tokens(&self) -> Vec<UndoToken> {
        self.undone.lock().clone()
    }
}

impl StorageEngine for ScriptedEngine {
    fn load_catalog(&self, _catalog_bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    fn tick(&self, _now: Instant, _last_committed_txn_id: TransactionId) -> Result<()> {
        Ok(())
    }

    fn execute_fragments(&self, req: FragmentExecRequest) -> Result<Vec<(DependencyId, Rows)>> {
        let scripts = self.scripts.lock();
        let mut out = Vec::with_capacity(req.output_dep_ids.len());
        for (fragment_id, dep_id) in req.fragment_ids.iter().zip(req.output_dep_ids.iter()) {
            match scripts.get(fragment_id) {
                Some(Script::Rows(rows)) => out.push((*dep_id, rows.clone())),
                Some(Script::Fail(msg)) => return Err(embergrid_base::err(msg.clone())),
                None => out.push((*dep_id, Rows::new())),
            }
        }
        Ok(out)
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
        Ok(())
    }

    fn release_undo_token(&self, token: UndoToken) -> Result<()> {
        self.released.lock().push(token);
        Ok(())
    }

    fn undo_undo_token(&self, token: UndoToken) -> Result<()> {
        self.undone.lock().push(token);
        Ok(())
    }
}

/// Lets a `Box<dyn StorageEngine>` delegate to a shared `ScriptedEngine`
/// so a test can keep an `Arc` handle to assert against after handing
/// ownership of the trait object to a `PartitionExecutor`.
impl StorageEngine for Arc<ScriptedEngine> {
    fn load_catalog(&self, catalog_bytes: &[u8]) -> Result<()> {
        self.as_ref().load_catalog(catalog_bytes)
    }

    fn tick(&self, now: Instant, last_committed_txn_id: TransactionId) -> Result<()> {
        self.as_ref().tick(now, last_committed_txn_id)
    }

    fn execute_fragments(&self, req: FragmentExecRequest) -> Result<Vec<(DependencyId, Rows)>> {
        self.as_ref().execute_fragments(req)
    }

    fn load_table(
        &self,
        table_index: i32,
        rows: Rows,
        txn_id: TransactionId,
        last_committed_txn_id: TransactionId,
        undo_token: UndoToken,
        allow_elt: bool,
    ) -> Result<()> {
        self.as_ref()
            .load_table(table_index, rows, txn_id, last_committed_txn_id, undo_token, allow_elt)
    }

    fn release_undo_token(&self, token: UndoToken) -> Result<()> {
        self.as_ref().release_undo_token(token)
    }

    fn undo_undo_token(&self, token: UndoToken) -> Result<()> {
        self.as_ref().undo_undo_token(token)
    }
}
