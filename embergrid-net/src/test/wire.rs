use embergrid_base::{DependencyId, PartitionId, SiteId, TransactionId};
use test_log::test;

use crate::messages::FragmentResponse;
use crate::wire::{Node, RecvFrame, WireBody};

#[test]
fn test_oneway_round_trip() {
    let mut a = Node::new(SiteId(0));
    let mut b = Node::new(SiteId(1));

    let resp = FragmentResponse::success(TransactionId(1), PartitionId(0), vec![DependencyId(5)]);
    a.send_oneway(SiteId(1), WireBody::FragmentResponse(resp))
        .unwrap();

    let (dst, buf) = a.send_bytes().expect("frame queued");
    assert_eq!(dst, SiteId(1));
    b.recv_bytes(SiteId(0), buf);

    match b.recv_frame().unwrap() {
        RecvFrame::Single(frame) => {
            assert_eq!(frame.src, SiteId(0));
            match frame.body {
                WireBody::FragmentResponse(r) => assert_eq!(r.dep_id_list, vec![DependencyId(5)]),
                other => panic!("unexpected body: {other:?}"),
            }
        }
        other => panic!("expected single frame, got {other:?}"),
    }
}

#[test]
fn test_request_response_pairing() {
    let mut a = Node::new(SiteId(0));
    let mut b = Node::new(SiteId(1));

    let req_body = WireBody::FragmentResponse(FragmentResponse::success(
        TransactionId(2),
        PartitionId(0),
        vec![],
    ));
    let seq = a.send_request(SiteId(1), req_body).unwrap();

    let (_, buf) = a.send_bytes().unwrap();
    b.recv_bytes(SiteId(0), buf);
    let RecvFrame::Single(req_frame) = b.recv_frame().unwrap() else {
        panic!("expected request to arrive as a single frame at b");
    };
    assert_eq!(req_frame.sequence, seq);

    let resp_body = WireBody::FragmentResponse(FragmentResponse::success(
        TransactionId(2),
        PartitionId(1),
        vec![DependencyId(9)],
    ));
    b.send_response(SiteId(0), seq, resp_body).unwrap();
    let (_, buf) = b.send_bytes().unwrap();
    a.recv_bytes(SiteId(1), buf);

    match a.recv_frame().unwrap() {
        RecvFrame::Paired { req, res } => {
            assert_eq!(req.sequence, seq);
            assert_eq!(res.sequence, seq);
        }
        other => panic!("expected paired request/response, got {other:?}"),
    }
}

#[test]
fn test_duplicate_response_is_an_error() {
    let mut a = Node::new(SiteId(0));
    let mut b = Node::new(SiteId(1));

    let seq = a
        .send_request(
            SiteId(1),
            WireBody::FragmentResponse(FragmentResponse::success(
                TransactionId(3),
                PartitionId(0),
                vec![],
            )),
        )
        .unwrap();
    let (_, buf) = a.send_bytes().unwrap();
    b.recv_bytes(SiteId(0), buf);
    let _ = b.recv_frame().unwrap();

    let resp = || {
        WireBody::FragmentResponse(FragmentResponse::success(
            TransactionId(3),
            PartitionId(1),
            vec![],
        ))
    };
    b.send_response(SiteId(0), seq, resp()).unwrap();
    b.send_response(SiteId(0), seq, resp()).unwrap();

    let (_, buf1) = b.send_bytes().unwrap();
    let (_, buf2) = b.send_bytes().unwrap();
    a.recv_bytes(SiteId(1), buf1);
    a.recv_bytes(SiteId(1), buf2);

    assert!(a.recv_frame().is_ok());
    assert!(a.recv_frame().is_err());
}
