mod messages;
mod messenger;
mod transport;
mod wire;

#[cfg(test)]
mod test;

pub use messages::{
    ClientResponse, ClientStatus, CoordinatorRequest, CoordinatorResponse, DependencySet,
    FinishDecision, FinishRequest, FinishResponse, FragmentResponse, FragmentStatus, ParamBlob,
    PartitionFragment, PrepareAck, PrepareRequest, PrepareResponse, Row, Rows, Value, WorkBody,
    WorkMessage,
};
pub use messenger::{body_of, Messenger};
pub use transport::{InProcessTransport, Transport};
pub use wire::{Frame, Node, RecvFrame, WireBody};
