use embergrid_base::{PartitionId, SiteId};

/// Maps a partition id to the site hosting it. Implemented by
/// `embergrid-site`'s supervisor, which owns the authoritative
/// partition-to-site directory; the coordinator only needs to ask.
pub trait PartitionLocator: Send + Sync {
    fn site_of(&self, partition: PartitionId) -> Option<SiteId>;
}
