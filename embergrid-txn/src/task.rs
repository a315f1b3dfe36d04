use embergrid_base::{DependencyId, FragmentId, PartitionId};
use embergrid_net::ParamBlob;

/// One fragment batch as emitted by a procedure body's `waitForResponses`
/// call (spec §4.4.3): a destination partition, the fragment ids to run
/// there, their parallel parameter sets, and the dependency ids it
/// declares as inputs and outputs. Input dependencies already satisfied
/// in an earlier round are not repeated on the wire -- the executor
/// attaches their rows before dispatch (spec §4.4.3 "attach internal
/// dependencies").
#[derive(Clone, Debug)]
pub struct FragmentTask {
    pub destination_partition: PartitionId,
    pub fragment_ids: Vec<FragmentId>,
    pub param_blobs: Vec<ParamBlob>,
    pub input_dep_ids: Vec<DependencyId>,
    pub output_dep_ids: Vec<DependencyId>,
}

impl FragmentTask {
    pub fn new(destination_partition: PartitionId) -> Self {
        FragmentTask {
            destination_partition,
            fragment_ids: Vec::new(),
            param_blobs: Vec::new(),
            input_dep_ids: Vec::new(),
            output_dep_ids: Vec::new(),
        }
    }
}

/// Outcome of `LocalTransactionState::add_fragment_task` (spec §4.4.3):
/// whether a just-submitted task can run immediately or must wait on a
/// sibling task in the same batch to produce one of its inputs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    Runnable,
    Blocked,
}
