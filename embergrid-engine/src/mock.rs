use std::collections::HashMap;
use std::time::Instant;

use embergrid_base::{DependencyId, Result, TransactionId, UndoToken};
use embergrid_net::Rows;
use parking_lot::Mutex;

use crate::trait_def::{FragmentExecRequest, StorageEngine};

/// One recorded write, keyed by the undo token that produced it, along
/// with whatever snapshot of the table is needed to reverse it.
struct UndoRecord {
    token: UndoToken,
    table_index: i32,
    previous: Option<Rows>,
}

#[derive(Default)]
struct State {
    catalog: Vec<u8>,
    tables: HashMap<i32, Rows>,
    journal: Vec<UndoRecord>,
    ticks: u64,
}

/// A mock storage engine for tests and the single-process demo: tables
/// are plain in-memory row vectors, and fragment execution is a
/// pass-through that echoes attached input dependencies as output
/// (there is no query plan to interpret -- that's out of scope, spec
/// §1). Undo/commit bookkeeping is real: `undo_undo_token` rolls back
/// every write at or after the given token, LIFO, per spec §3.
#[derive(Default)]
pub struct InMemoryEngine {
    state: Mutex<State>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        InMemoryEngine::default()
    }

    pub fn tick_count(&self) -> u64 {
        self.state.lock().ticks
    }

    pub fn table_rows(&self, table_index: i32) -> Rows {
        self.state
            .lock()
            .tables
            .get(&table_index)
            .cloned()
            .unwrap_or_default()
    }
}

impl StorageEngine for InMemoryEngine {
    fn load_catalog(&self, catalog_bytes: &[u8]) -> Result<()> {
        self.state.lock().catalog = catalog_bytes.to_vec();
        Ok(())
    }

    fn tick(&self, _now: Instant, _last_committed_txn_id: TransactionId) -> Result<()> {
        self.state.lock().ticks += 1;
        Ok(())
    }

    fn execute_fragments(&self, req: FragmentExecRequest) -> Result<Vec<(DependencyId, Rows)>> {
        // No compiled plan to run (the SQL planner is out of scope);
        // the mock hands back each declared output id paired with
        // whatever rows its matching input carried, positionally.
        let mut out = Vec::with_capacity(req.output_dep_ids.len());
        for (i, output_id) in req.output_dep_ids.into_iter().enumerate() {
            let rows = req
                .input_deps
                .get(i)
                .map(|(_, rows)| rows.clone())
                .unwrap_or_default();
            out.push((output_id, rows));
        }
        Ok(out)
    }

    fn load_table(
        &self,
        table_index: i32,
        rows: Rows,
        _txn_id: TransactionId,
        _last_committed_txn_id: TransactionId,
        undo_token: UndoToken,
        _allow_elt: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let previous = state.tables.insert(table_index, rows);
        if !undo_token.is_none() {
            state.journal.push(UndoRecord {
                token: undo_token,
                table_index,
                previous,
            });
        }
        Ok(())
    }

    fn release_undo_token(&self, token: UndoToken) -> Result<()> {
        let mut state = self.state.lock();
        state.journal.retain(|rec| rec.token > token);
        Ok(())
    }

    fn undo_undo_token(&self, token: UndoToken) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            match state.journal.last() {
                Some(rec) if rec.token >= token => {
                    let rec = state.journal.pop().expect("just matched Some above");
                    match rec.previous {
                        Some(rows) => {
                            state.tables.insert(rec.table_index, rows);
                        }
                        None => {
                            state.tables.remove(&rec.table_index);
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }
}
