use embergrid_base::{CoordTxnId, DependencyId, PartitionId, SiteId};
use embergrid_net::{ClientResponse, FragmentResponse, Rows};

/// Reports a local partition's share of an incoming coordinator
/// request back to whatever owns cross-partition response aggregation
/// at this site (spec §4.5: a site may host several of the
/// destination partitions named by one `CoordinatorRequest`, so the
/// combined `CoordinatorResponse` can only be sent once every one of
/// them has answered). Implemented by the site supervisor; the
/// executor itself never touches the network for this path.
/// `partition_id` is this (producing) partition; `source_partition` is
/// the base partition whose round is waiting on `rows` -- the
/// `DependencySet` this produces must be addressed to the latter, not
/// the former.
pub trait CoordinatorReplySink: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        origin_site: SiteId,
        sequence: u64,
        coord_txn_id: CoordTxnId,
        partition_id: PartitionId,
        source_partition: PartitionId,
        resp: FragmentResponse,
        rows: Vec<(DependencyId, Rows)>,
    );
}

/// Delivers a finished transaction's `ClientResponse` to whatever
/// connection issued it. The executor computes the response; routing
/// it back to the client is a site-level concern (spec §4.7).
pub trait ClientResponseSink: Send + Sync {
    fn deliver(&self, resp: ClientResponse);
}
