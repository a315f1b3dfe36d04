use std::time::Duration;

use embergrid_base::{DependencyId, PartitionId, SiteId, TransactionId};
use test_log::test;

use crate::messages::FragmentResponse;
use crate::messenger::{body_of, Messenger};
use crate::transport::InProcessTransport;
use crate::wire::{RecvFrame, WireBody};

#[test]
fn test_send_fragment_response_round_trip() {
    let transport = std::sync::Arc::new(InProcessTransport::new());
    let a_inbox = transport.register(SiteId(0));
    let b_inbox = transport.register(SiteId(1));
    let a = Messenger::new(SiteId(0), transport.clone(), a_inbox);
    let b = Messenger::new(SiteId(1), transport, b_inbox);

    let resp = FragmentResponse::success(TransactionId(7), PartitionId(0), vec![DependencyId(1)]);
    a.send_fragment_response(SiteId(1), resp).unwrap();

    let frames = b.poll_timeout(Duration::from_millis(500));
    assert_eq!(frames.len(), 1);
    match &frames[0] {
        RecvFrame::Single(frame) => match body_of(frame) {
            WireBody::FragmentResponse(r) => assert_eq!(r.dep_id_list, vec![DependencyId(1)]),
            other => panic!("unexpected body: {other:?}"),
        },
        other => panic!("expected single frame, got {other:?}"),
    }
}

#[test]
fn test_poll_timeout_returns_empty_when_idle() {
    let transport = std::sync::Arc::new(InProcessTransport::new());
    let inbox = transport.register(SiteId(0));
    let node = Messenger::new(SiteId(0), transport, inbox);

    let frames = node.poll_timeout(Duration::from_millis(20));
    assert!(frames.is_empty());
}

#[test]
fn test_poll_is_nonblocking_and_drains_multiple() {
    let transport = std::sync::Arc::new(InProcessTransport::new());
    let a_inbox = transport.register(SiteId(0));
    let b_inbox = transport.register(SiteId(1));
    let a = Messenger::new(SiteId(0), transport.clone(), a_inbox);
    let b = Messenger::new(SiteId(1), transport, b_inbox);

    for i in 0..3 {
        let resp = FragmentResponse::success(TransactionId(i), PartitionId(0), vec![]);
        a.send_fragment_response(SiteId(1), resp).unwrap();
    }

    std::thread::sleep(Duration::from_millis(20));
    let frames = b.poll();
    assert_eq!(frames.len(), 3);
}

#[test]
fn test_coordinator_request_response_pairs_on_sequence() {
    use crate::messages::{CoordinatorRequest, CoordinatorResponse};
    use embergrid_base::CoordTxnId;

    let transport = std::sync::Arc::new(InProcessTransport::new());
    let coord_inbox = transport.register(SiteId(0));
    let partition_inbox = transport.register(SiteId(1));
    let coord = Messenger::new(SiteId(0), transport.clone(), coord_inbox);
    let partition = Messenger::new(SiteId(1), transport, partition_inbox);

    let req = CoordinatorRequest {
        coord_txn_id: CoordTxnId(42),
        txn_id: TransactionId(42),
        fragments: vec![],
        last_fragment: true,
    };
    let seq = coord.send_coordinator_request(SiteId(1), req).unwrap();

    let frames = partition.poll_timeout(Duration::from_millis(500));
    assert_eq!(frames.len(), 1);
    let RecvFrame::Single(req_frame) = &frames[0] else {
        panic!("expected request to arrive as a single frame");
    };
    assert_eq!(req_frame.sequence, seq);

    let resp = CoordinatorResponse {
        coord_txn_id: CoordTxnId(42),
        partition_responses: vec![],
    };
    partition
        .send_coordinator_response(SiteId(0), seq, resp)
        .unwrap();

    let frames = coord.poll_timeout(Duration::from_millis(500));
    assert_eq!(frames.len(), 1);
    match &frames[0] {
        RecvFrame::Paired { req, res } => {
            assert_eq!(req.sequence, seq);
            assert_eq!(res.sequence, seq);
        }
        other => panic!("expected paired request/response, got {other:?}"),
    }
}
