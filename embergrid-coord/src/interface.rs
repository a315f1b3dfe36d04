use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use embergrid_base::{err, CoordTxnId, DependencyId, PartitionId, Result, SiteId, TransactionId};
use embergrid_net::{
    CoordinatorRequest, CoordinatorResponse, FragmentResponse, Messenger, PartitionFragment, Rows,
    WorkBody, WorkMessage,
};
use embergrid_txn::FragmentTask;

use crate::locator::PartitionLocator;

/// Bookkeeping for one outstanding site-to-site coordinator request:
/// which transaction it belongs to and which partitions it covers, so
/// `complete` can hand the response back keyed the right way.
struct Inflight {
    txn_id: TransactionId,
    source_partition: PartitionId,
    partitions: Vec<PartitionId>,
}

/// Packs fragment-task batches into `CoordinatorRequest`s (one per
/// destination site), sends them via the site's `Messenger`, and
/// resolves the eventual `CoordinatorResponse` back into per-partition
/// `FragmentResponse`s for the executor to apply (spec §4.5). One
/// instance is shared by every partition executor at a site: sequence
/// numbers come from the site's single `Node`, so a single shared
/// `inflight` table is what lets `complete` resolve a response without
/// having to guess which local partition issued the matching request.
pub struct CoordinatorInterface {
    messenger: Arc<Messenger>,
    locator: Arc<dyn PartitionLocator>,
    next_coord_txn_id: AtomicU64,
    inflight: DashMap<u64, Inflight>,
}

impl CoordinatorInterface {
    pub fn new(messenger: Arc<Messenger>, locator: Arc<dyn PartitionLocator>) -> Self {
        CoordinatorInterface {
            messenger,
            locator,
            next_coord_txn_id: AtomicU64::new(1),
            inflight: DashMap::new(),
        }
    }

    fn next_coord_txn_id(&self) -> CoordTxnId {
        CoordTxnId(self.next_coord_txn_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Groups `tasks` by the site hosting each destination partition and
    /// sends one `CoordinatorRequest` per site. `attached` carries rows
    /// the originating partition already holds locally that a remote
    /// task needs as input (spec §4.4.3 "attach internal dependencies").
    /// Returns the sequence number of every request sent, so the caller
    /// can match `CoordinatorResponse`s as they arrive via `complete`.
    pub fn dispatch(
        &self,
        txn_id: TransactionId,
        source_partition: PartitionId,
        tasks: Vec<(PartitionId, FragmentTask, Vec<(DependencyId, Rows)>)>,
        last_fragment: bool,
    ) -> Result<Vec<u64>> {
        let coord_txn_id = self.next_coord_txn_id();
        let mut by_site: HashMap<SiteId, Vec<PartitionFragment>> = HashMap::new();
        let mut partitions_by_site: HashMap<SiteId, Vec<PartitionId>> = HashMap::new();

        for (dest, task, attached) in tasks {
            let site = self
                .locator
                .site_of(dest)
                .ok_or_else(|| err(format!("no site registered for partition {dest}")))?;
            let work = WorkMessage {
                txn_id,
                source_partition,
                body: WorkBody::Fragment {
                    destination_partition: dest,
                    fragment_ids: task.fragment_ids,
                    param_blobs: task.param_blobs,
                    input_dep_ids: task.input_dep_ids,
                    output_dep_ids: task.output_dep_ids,
                    via_coordinator: true,
                    attached_deps: attached,
                },
            };
            let bytes = rmp_serde::to_vec(&work)
                .map_err(|e| err(format!("failed to encode fragment task: {e}")))?;
            by_site
                .entry(site)
                .or_default()
                .push(PartitionFragment { partition_id: dest, work: bytes });
            partitions_by_site.entry(site).or_default().push(dest);
        }

        let mut sequences = Vec::with_capacity(by_site.len());
        for (site, fragments) in by_site {
            let req = CoordinatorRequest {
                coord_txn_id,
                txn_id,
                fragments,
                last_fragment,
            };
            let sequence = self.messenger.send_coordinator_request(site, req)?;
            self.inflight.insert(
                sequence,
                Inflight {
                    txn_id,
                    source_partition,
                    partitions: partitions_by_site.remove(&site).unwrap_or_default(),
                },
            );
            sequences.push(sequence);
        }
        Ok(sequences)
    }

    /// Resolves a `CoordinatorResponse` paired to `sequence` (via the
    /// messenger's request/response pairing) back into the originating
    /// transaction id, the local partition whose round dispatched the
    /// request, and its per-partition fragment responses.
    pub fn complete(
        &self,
        sequence: u64,
        resp: CoordinatorResponse,
    ) -> Option<(TransactionId, PartitionId, Vec<(PartitionId, FragmentResponse)>)> {
        let inflight = self.inflight.remove(&sequence)?.1;
        debug_assert!(
            resp.partition_responses
                .iter()
                .all(|(p, _)| inflight.partitions.contains(p)),
            "coordinator response referenced a partition outside its own request"
        );
        Some((inflight.txn_id, inflight.source_partition, resp.partition_responses))
    }

    /// Server side of the protocol: splits an incoming `CoordinatorRequest`
    /// into the `WorkMessage`s addressed to partitions this site hosts,
    /// for the supervisor to hand to each partition's executor.
    pub fn split_for_local(
        req: &CoordinatorRequest,
        locator: &dyn PartitionLocator,
        my_site: SiteId,
    ) -> Result<Vec<(PartitionId, WorkMessage)>> {
        let mut out = Vec::with_capacity(req.fragments.len());
        for frag in &req.fragments {
            if locator.site_of(frag.partition_id) != Some(my_site) {
                continue;
            }
            let work: WorkMessage = rmp_serde::from_slice(&frag.work)
                .map_err(|e| err(format!("failed to decode fragment task: {e}")))?;
            out.push((frag.partition_id, work));
        }
        Ok(out)
    }

    /// Bundles each local partition's `FragmentResponse` into the
    /// `CoordinatorResponse` sent back to the originating site.
    pub fn build_response(
        coord_txn_id: CoordTxnId,
        partition_responses: Vec<(PartitionId, FragmentResponse)>,
    ) -> CoordinatorResponse {
        CoordinatorResponse {
            coord_txn_id,
            partition_responses,
        }
    }
}
