use std::time::Instant;

use embergrid_base::{DependencyId, FragmentId, Result, TransactionId, UndoToken};
use embergrid_net::{ParamBlob, Rows};

/// Parameters for a single batch of plan fragments (spec §6 "Storage
/// engine API"). `fragment_ids`, `param_blobs`, `input_dep_ids` and
/// `output_dep_ids` are parallel/declared per the executor's framing in
/// §4.4.2; this struct only bundles them for the call.
#[derive(Clone, Debug)]
pub struct FragmentExecRequest {
    pub fragment_ids: Vec<FragmentId>,
    pub param_blobs: Vec<ParamBlob>,
    pub input_deps: Vec<(DependencyId, Rows)>,
    pub output_dep_ids: Vec<DependencyId>,
    pub txn_id: TransactionId,
    pub last_committed_txn_id: TransactionId,
    pub undo_token: UndoToken,
}

/// The executor's only collaborator inside the per-partition thread.
/// Every method is expected to run synchronously on the calling
/// (partition) thread -- the trait makes no promise about thread safety
/// across partitions because the single-writer discipline (spec §5)
/// means exactly one thread ever calls into a given engine instance.
pub trait StorageEngine: Send {
    /// Loads the compiled catalog. Out of scope to re-specify (spec
    /// §1); the mock backend just records the bytes it was given.
    fn load_catalog(&self, catalog_bytes: &[u8]) -> Result<()>;

    /// Periodic housekeeping call (spec §4.4.1: "every 1s of wall
    /// time"). `last_committed_txn_id` lets the engine reclaim
    /// multi-version state older than any in-flight transaction.
    fn tick(&self, now: Instant, last_committed_txn_id: TransactionId) -> Result<()>;

    /// Executes a batch of plan fragments, returning the rows produced
    /// for each declared output dependency id.
    fn execute_fragments(&self, req: FragmentExecRequest) -> Result<Vec<(DependencyId, Rows)>>;

    /// Bulk-loads `rows` into `table_index` under `undo_token`,
    /// honoring the same undo/commit discipline as fragment execution.
    fn load_table(
        &self,
        table_index: i32,
        rows: Rows,
        txn_id: TransactionId,
        last_committed_txn_id: TransactionId,
        undo_token: UndoToken,
        allow_elt: bool,
    ) -> Result<()>;

    /// Makes every write under `undo_token` (and any earlier token)
    /// durable; the engine may discard undo records for them.
    fn release_undo_token(&self, token: UndoToken) -> Result<()>;

    /// Rolls back every write at or after `undo_token`, LIFO (spec §3
    /// "Abort LIFO property"). The executor must never call this with
    /// a token older than one it has already rolled back.
    fn undo_undo_token(&self, token: UndoToken) -> Result<()>;
}
