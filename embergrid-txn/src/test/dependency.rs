use embergrid_base::{partition_set_of, PartitionId, TransactionId};
use embergrid_net::Value;
use test_log::test;

use crate::DependencyInfo;

#[test]
fn test_satisfied_once_every_producer_responds() {
    let producers = partition_set_of([PartitionId(0), PartitionId(1)]);
    let mut dep = DependencyInfo::new(embergrid_base::DependencyId(10), TransactionId(1), producers);
    assert!(!dep.is_satisfied());

    assert!(!dep.add_result(PartitionId(0), vec![vec![Value::I64(1)]]));
    assert!(!dep.is_satisfied());

    assert!(dep.add_response(PartitionId(1)));
    assert!(dep.is_satisfied());
    assert_eq!(dep.rows(), &vec![vec![Value::I64(1)]]);
}

#[test]
fn test_duplicate_response_from_same_partition_is_not_double_counted() {
    let producers = partition_set_of([PartitionId(0)]);
    let mut dep = DependencyInfo::new(embergrid_base::DependencyId(1), TransactionId(1), producers);
    assert!(dep.add_response(PartitionId(0)));
    // A second, stray response from the same partition must not report
    // a fresh transition to satisfied.
    assert!(!dep.add_response(PartitionId(0)));
}

#[test]
fn test_add_producer_after_construction_reopens_pending() {
    let mut dep = DependencyInfo::new(
        embergrid_base::DependencyId(1),
        TransactionId(1),
        embergrid_base::PartitionSet::new(),
    );
    assert!(dep.is_satisfied(), "no declared producers is trivially satisfied");
    dep.add_producer(PartitionId(2));
    assert!(!dep.is_satisfied());
    assert!(dep.add_response(PartitionId(2)));
    assert!(dep.is_satisfied());
}
