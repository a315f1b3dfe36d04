use embergrid_base::{PartitionId, TransactionId};
use test_log::test;

use crate::{CallbackState, InitCallback, RedirectCallback, WorkCallback};

#[test]
fn test_armed_to_fired_to_finished() {
    let cb = WorkCallback::new(TransactionId(1), PartitionId(0), 2);
    assert_eq!(cb.slot.state(), CallbackState::Armed);

    assert!(!cb.on_response());
    assert_eq!(cb.slot.state(), CallbackState::Fired);

    assert!(cb.on_response());
    assert_eq!(cb.slot.state(), CallbackState::Finished);
}

#[test]
fn test_zero_expected_finishes_immediately() {
    let cb = InitCallback::new(TransactionId(1), PartitionId(0), 0);
    assert!(cb.is_finished());
}

#[test]
fn test_abort_forces_finished_from_any_state() {
    let cb = WorkCallback::new(TransactionId(1), PartitionId(0), 5);
    assert!(!cb.is_finished());
    assert!(cb.abort());
    assert!(cb.is_finished());
    // A second abort reports no further transition.
    assert!(!cb.abort());
}

#[test]
fn test_response_after_finished_is_a_noop() {
    let cb = WorkCallback::new(TransactionId(1), PartitionId(0), 1);
    assert!(cb.on_response());
    assert!(!cb.on_response(), "extra response past expected must not re-finish");
}

#[test]
fn test_rearm_resets_identity_and_counters() {
    let mut cb = WorkCallback::new(TransactionId(1), PartitionId(0), 1);
    cb.on_response();
    assert!(cb.is_finished());

    cb.rearm(TransactionId(2), PartitionId(1), 3);
    assert_eq!(cb.slot.txn_id(), TransactionId(2));
    assert_eq!(cb.slot.partition_id(), PartitionId(1));
    assert_eq!(cb.slot.state(), CallbackState::Armed);
}

#[test]
fn test_redirect_callback_needs_both_legs() {
    let cb = RedirectCallback::new(TransactionId(1), PartitionId(0));
    assert!(!cb.is_finished());
    cb.outbound.on_response();
    assert!(!cb.is_finished(), "only one leg acked");
    cb.inbound.on_response();
    assert!(cb.is_finished());
}
