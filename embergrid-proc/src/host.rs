use embergrid_base::{PartitionId, TransactionId};
use embergrid_net::{ParamBlob, Rows};
use embergrid_txn::{ExecError, FragmentTask};

/// The executor's reentry surface for a running procedure body (spec
/// §4.4.3 `waitForResponses`, §5 "the only legal places a procedure
/// yields the thread"). A procedure never touches the work queue,
/// the coordinator, or the engine directly -- it only ever calls back
/// through this trait, which the partition executor implements.
pub trait ExecutorContext {
    fn txn_id(&self) -> TransactionId;
    fn base_partition(&self) -> PartitionId;
    fn is_predict_single_partition(&self) -> bool;

    /// Dispatches a batch of fragment tasks and blocks the calling
    /// (executor) thread on their combined latch, returning each
    /// task's output rows in declaration order once every dependency
    /// is satisfied, or the transaction's pending error if one lands
    /// first (spec §4.4.3).
    fn wait_for_responses(&mut self, tasks: Vec<FragmentTask>) -> Result<Vec<Rows>, ExecError>;
}

/// A user procedure body (spec §4.6). Implementations run
/// synchronously on the owning partition's executor thread -- this is
/// "the only place arbitrary user code runs" (spec §4.4.1).
pub trait StoredProcedure: Send {
    fn name(&self) -> &'static str;

    /// Runs the procedure body against `params`, returning its result
    /// tables on success. `Err(ExecError::UserAbort)` and
    /// `Err(ExecError::Mispredict(_))` are structured outcomes the
    /// host branches on explicitly; any other error is an unexpected
    /// failure the caller wraps as `UNEXPECTED_ERROR` (spec §4.6).
    fn call(
        &mut self,
        ctx: &mut dyn ExecutorContext,
        params: &ParamBlob,
    ) -> Result<Vec<Rows>, ExecError>;
}
