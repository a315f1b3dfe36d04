// Identity newtypes shared by every crate in the workspace. Kept here
// rather than duplicated per-crate because they cross every seam: wire
// messages, transaction state, the coordinator, and the engine trait all
// need the same notion of "which partition", "which transaction".

use serde::{Deserialize, Serialize};
use std::fmt;

/// A partition is the smallest unit of data ownership; every row belongs
/// to exactly one partition. Partition ids are dense and site-local.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub u16);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// A site is a physical host process that hosts one or more partitions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SiteId(pub u32);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site{}", self.0)
    }
}

/// 64-bit monotonic transaction id, minted by the coordinator on arrival.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn{}", self.0)
    }
}

/// Opaque handle the site uses to route a `ClientResponse` back to the
/// network connection that submitted the original request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ClientHandle(pub u64);

/// Monotonic non-zero integer per partition marking a point in the
/// engine's write log for later release (commit) or rollback (abort).
/// `0` is reserved to mean "no undo token allocated" for a transaction
/// that did no writes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct UndoToken(pub i64);

impl UndoToken {
    pub const NONE: UndoToken = UndoToken(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// Identifies one declared input or output of a round of fragment
/// execution; scoped to a single (txn_id, round).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct DependencyId(pub i32);

/// Identifies a compiled unit of query work addressed to one partition.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct FragmentId(pub i32);

/// The coordinator's own transaction identifier, distinct from the site's
/// `TransactionId` — the executor stores the mapping on the transaction
/// state (see `embergrid_txn::RemoteTransactionState`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct CoordTxnId(pub u64);
