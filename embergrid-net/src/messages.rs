// Wire message bodies (spec §6 "External Interfaces"). The query/plan
// layer is out of scope, so the value representation below is
// deliberately minimal: just enough for a fragment to hand rows to a
// dependent fragment and for a client response to carry results.

use embergrid_base::{
    ClientHandle, CoordTxnId, DependencyId, FragmentId, PartitionId, TransactionId,
};
use serde::{Deserialize, Serialize};

/// A single scalar produced or consumed by a plan fragment. The engine
/// itself is opaque (spec §1); this is the smallest concrete shape that
/// lets fragments exchange dependency rows over the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    I64(i64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
}

pub type Row = Vec<Value>;

/// A dependency's buffered result: an ordered set of rows. `getResults`
/// returns a list of these, one per output dependency id in declaration
/// order.
pub type Rows = Vec<Row>;

/// Opaque, already-serialized procedure parameters — the site never
/// interprets these, it only routes them to the engine or a sysproc
/// handler.
pub type ParamBlob = Vec<u8>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkMessage {
    pub txn_id: TransactionId,
    pub source_partition: PartitionId,
    pub body: WorkBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WorkBody {
    Initiate {
        base_partition: PartitionId,
        client_handle: ClientHandle,
        proc_name: String,
        params: ParamBlob,
    },
    Fragment {
        destination_partition: PartitionId,
        fragment_ids: Vec<FragmentId>,
        param_blobs: Vec<ParamBlob>,
        input_dep_ids: Vec<DependencyId>,
        output_dep_ids: Vec<DependencyId>,
        via_coordinator: bool,
        attached_deps: Vec<(DependencyId, Rows)>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FragmentStatus {
    Success,
    UnexpectedError,
    UserError,
    Null,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FragmentResponse {
    pub txn_id: TransactionId,
    pub source_partition: PartitionId,
    pub status: FragmentStatus,
    pub dep_id_list: Vec<DependencyId>,
    pub wrapped_error: Option<String>,
}

impl FragmentResponse {
    pub fn success(
        txn_id: TransactionId,
        source_partition: PartitionId,
        dep_id_list: Vec<DependencyId>,
    ) -> Self {
        FragmentResponse {
            txn_id,
            source_partition,
            status: FragmentStatus::Success,
            dep_id_list,
            wrapped_error: None,
        }
    }

    pub fn failure(
        txn_id: TransactionId,
        source_partition: PartitionId,
        status: FragmentStatus,
        wrapped_error: impl Into<String>,
    ) -> Self {
        FragmentResponse {
            txn_id,
            source_partition,
            status,
            dep_id_list: Vec::new(),
            wrapped_error: Some(wrapped_error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, FragmentStatus::Success)
    }
}

/// Rows travel separately from the metadata-only `FragmentResponse`, as
/// spec §6 requires, so that a response can be acknowledged even when its
/// rows stream out of band.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DependencySet {
    pub txn_id: TransactionId,
    pub src_partition: PartitionId,
    pub dst_partition: PartitionId,
    pub deps: Vec<(DependencyId, Rows)>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ClientStatus {
    Success,
    UserAbort,
    Mispredict,
    UnexpectedError,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientResponse {
    pub txn_id: TransactionId,
    pub client_handle: ClientHandle,
    pub status: ClientStatus,
    pub results: Vec<Rows>,
    pub status_message: String,
}

/// One partition's slice of a cross-partition request, addressed to the
/// site owning `partition_id`. `work` is the opaque wire-encoding of a
/// `WorkBody::Fragment` — the coordinator never needs to interpret it,
/// only route it (spec §4.5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartitionFragment {
    pub partition_id: PartitionId,
    pub work: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorRequest {
    pub coord_txn_id: CoordTxnId,
    pub txn_id: TransactionId,
    pub fragments: Vec<PartitionFragment>,
    pub last_fragment: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorResponse {
    pub coord_txn_id: CoordTxnId,
    pub partition_responses: Vec<(PartitionId, FragmentResponse)>,
}

/// Two-phase-commit wave messages, addressed per participating partition.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PrepareAck {
    Ready,
    Refuse,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FinishDecision {
    Commit,
    Abort,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PrepareRequest {
    pub txn_id: TransactionId,
    pub partition_id: PartitionId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PrepareResponse {
    pub txn_id: TransactionId,
    pub partition_id: PartitionId,
    pub ack: PrepareAck,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FinishRequest {
    pub txn_id: TransactionId,
    pub partition_id: PartitionId,
    pub decision: FinishDecision,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FinishResponse {
    pub txn_id: TransactionId,
    pub partition_id: PartitionId,
}
