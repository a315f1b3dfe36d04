mod bitmap256;
mod error;
mod ids;

#[cfg(test)]
mod test;

pub use bitmap256::Bitmap256;
pub use error::{err, Error, Result};
pub use ids::{
    ClientHandle, CoordTxnId, DependencyId, FragmentId, PartitionId, SiteId, TransactionId,
    UndoToken,
};

/// A set of partitions, backed by `Bitmap256`: a site carries at most 256
/// partitions, so a dense bitmap beats a `BTreeSet` for the hot paths
/// (predicted partition set, dependency producer/pending sets) that get
/// copied and intersected on every round.
pub type PartitionSet = Bitmap256;

pub fn partition_set_of(ids: impl IntoIterator<Item = PartitionId>) -> PartitionSet {
    ids.into_iter().map(|p| p.0 as u8).collect()
}

pub fn partition_set_iter(set: &PartitionSet) -> impl Iterator<Item = PartitionId> + '_ {
    set.iter().map(|b| PartitionId(b as u16))
}
