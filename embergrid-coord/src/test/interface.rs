use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use embergrid_base::{DependencyId, FragmentId, PartitionId, SiteId, TransactionId};
use embergrid_net::{
    FragmentResponse, FragmentStatus, InProcessTransport, Messenger, RecvFrame, WireBody,
};
use embergrid_txn::FragmentTask;
use test_log::test;

use crate::{CoordinatorInterface, PartitionLocator};

struct StaticLocator(HashMap<PartitionId, SiteId>);

impl PartitionLocator for StaticLocator {
    fn site_of(&self, partition: PartitionId) -> Option<SiteId> {
        self.0.get(&partition).copied()
    }
}

fn messenger(transport: &Arc<InProcessTransport>, site: SiteId) -> Arc<Messenger> {
    let inbox = transport.register(site);
    Arc::new(Messenger::new(site, transport.clone(), inbox))
}

#[test]
fn test_dispatch_then_response_round_trip() {
    let transport = Arc::new(InProcessTransport::new());
    let site0 = SiteId(0);
    let site1 = SiteId(1);
    let messenger0 = messenger(&transport, site0);
    let messenger1 = messenger(&transport, site1);

    let mut routes = HashMap::new();
    routes.insert(PartitionId(1), site1);
    let locator = Arc::new(StaticLocator(routes));

    let coord = CoordinatorInterface::new(messenger0.clone(), locator.clone());

    let mut task = FragmentTask::new(PartitionId(1));
    task.fragment_ids = vec![FragmentId(7)];
    task.output_dep_ids = vec![DependencyId(1)];

    let sequences = coord
        .dispatch(
            TransactionId(100),
            PartitionId(0),
            vec![(PartitionId(1), task, Vec::new())],
            true,
        )
        .unwrap();
    assert_eq!(sequences.len(), 1);

    // site1 receives the CoordinatorRequest.
    let frames = messenger1.poll_timeout(Duration::from_millis(500));
    assert_eq!(frames.len(), 1);
    let (src, sequence, req) = match &frames[0] {
        RecvFrame::Single(frame) => match &frame.body {
            WireBody::CoordinatorRequest(req) => (frame.src, frame.sequence, req.clone()),
            other => panic!("unexpected body: {other:?}"),
        },
        other => panic!("unexpected frame: {other:?}"),
    };
    assert_eq!(src, site0);
    assert_eq!(req.fragments.len(), 1);
    assert_eq!(req.fragments[0].partition_id, PartitionId(1));

    let local = CoordinatorInterface::split_for_local(&req, locator.as_ref(), site1).unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].0, PartitionId(1));

    let resp = CoordinatorInterface::build_response(
        req.coord_txn_id,
        vec![(
            PartitionId(1),
            FragmentResponse::success(TransactionId(100), PartitionId(1), vec![DependencyId(1)]),
        )],
    );
    messenger1
        .send_coordinator_response(site0, sequence, resp)
        .unwrap();

    // site0 observes the paired request/response.
    let frames = messenger0.poll_timeout(Duration::from_millis(500));
    assert_eq!(frames.len(), 1);
    let (paired_seq, coord_resp) = match &frames[0] {
        RecvFrame::Paired { req, res } => {
            let resp = match &res.body {
                WireBody::CoordinatorResponse(r) => r.clone(),
                other => panic!("unexpected response body: {other:?}"),
            };
            (req.sequence, resp)
        }
        other => panic!("expected a paired request/response, got {other:?}"),
    };

    let (txn_id, source_partition, partition_responses) = coord.complete(paired_seq, coord_resp).unwrap();
    assert_eq!(txn_id, TransactionId(100));
    assert_eq!(source_partition, PartitionId(0));
    assert_eq!(partition_responses.len(), 1);
    assert_eq!(partition_responses[0].0, PartitionId(1));
    assert!(matches!(
        partition_responses[0].1.status,
        FragmentStatus::Success
    ));
}

#[test]
fn test_dispatch_groups_tasks_by_destination_site() {
    let transport = Arc::new(InProcessTransport::new());
    let site0 = SiteId(0);
    let site1 = SiteId(1);
    let site2 = SiteId(2);
    let messenger0 = messenger(&transport, site0);
    let _messenger1 = messenger(&transport, site1);
    let _messenger2 = messenger(&transport, site2);

    let mut routes = HashMap::new();
    routes.insert(PartitionId(1), site1);
    routes.insert(PartitionId(2), site2);
    let locator = Arc::new(StaticLocator(routes));
    let coord = CoordinatorInterface::new(messenger0, locator);

    let task_a = FragmentTask::new(PartitionId(1));
    let task_b = FragmentTask::new(PartitionId(2));
    let sequences = coord
        .dispatch(
            TransactionId(1),
            PartitionId(0),
            vec![
                (PartitionId(1), task_a, Vec::new()),
                (PartitionId(2), task_b, Vec::new()),
            ],
            true,
        )
        .unwrap();
    assert_eq!(sequences.len(), 2, "two destination sites => two requests");
}
