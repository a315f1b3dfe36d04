use embergrid_base::{
    ClientHandle, CoordTxnId, DependencyId, FragmentId, PartitionId, PartitionSet, SiteId,
    TransactionId,
};
use embergrid_net::{FinishDecision, ParamBlob, PrepareAck, Rows};

/// Addressing for a fragment that arrived through the coordinator
/// rather than being dispatched to this same partition: where the
/// eventual `FragmentResponse`/rows must be reported back to once this
/// partition has run its share of the batch.
#[derive(Clone, Copy, Debug)]
pub struct CoordinatorReplyTo {
    pub origin_site: SiteId,
    pub sequence: u64,
    pub coord_txn_id: CoordTxnId,
}

/// Everything that can land on a partition's work queue (spec §4.4.1).
/// The executor thread pulls these off one at a time, both at the top
/// of its main loop and while a procedure body is parked inside
/// `waitForResponses` -- the queue is the only channel through which a
/// blocked round gets the responses it's waiting on.
#[derive(Clone, Debug)]
pub enum WorkItem {
    Initiate {
        txn_id: TransactionId,
        client_handle: ClientHandle,
        proc_name: String,
        params: ParamBlob,
        predicted_partition_set: PartitionSet,
        predicted_read_only: bool,
        abortable: bool,
    },
    /// A batch of fragments this partition must run on behalf of
    /// another partition's round, delivered via the coordinator.
    Fragment {
        txn_id: TransactionId,
        source_partition: PartitionId,
        fragment_ids: Vec<FragmentId>,
        param_blobs: Vec<ParamBlob>,
        input_dep_ids: Vec<DependencyId>,
        output_dep_ids: Vec<DependencyId>,
        attached_deps: Vec<(DependencyId, Rows)>,
        reply_to: CoordinatorReplyTo,
    },
    /// One dependency's worth of a remote round resolving, destined for
    /// the base partition that's blocked waiting on it. `rows = None`
    /// models an explicit empty response (spec §4.2 "a dependency is
    /// satisfied once either rows or an explicit empty response has
    /// arrived").
    DeliverResult {
        txn_id: TransactionId,
        src_partition: PartitionId,
        dep_id: DependencyId,
        rows: Option<Rows>,
    },
    PrepareRequest {
        txn_id: TransactionId,
        origin_site: SiteId,
    },
    PrepareResponse {
        txn_id: TransactionId,
        ack: PrepareAck,
    },
    FinishRequest {
        txn_id: TransactionId,
        decision: FinishDecision,
        origin_site: SiteId,
    },
    FinishResponse {
        txn_id: TransactionId,
    },
    /// A coordinator response reported a non-success status for one of
    /// this round's remote fragments. Carries no dependency id: an EE
    /// or SQL error on one partition's share of a batch fails the
    /// whole round, so the only thing the base partition needs is the
    /// pending error itself (spec §4.2 `setPendingError`, §7).
    RemoteFragmentError {
        txn_id: TransactionId,
        message: String,
    },
    /// Periodic housekeeping tick (spec §4.4.1: "every 1s of wall
    /// time"), forwarded by whatever owns the executor's thread.
    Tick,
    Shutdown,
}
