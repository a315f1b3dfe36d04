use std::time::Instant;

use embergrid_base::TransactionId;
use test_log::test;

use crate::{create_engine, BackendTarget};

#[test]
fn test_in_memory_target_is_usable() {
    let engine = create_engine(BackendTarget::InMemory);
    assert!(engine.tick(Instant::now(), TransactionId(0)).is_ok());
}

#[test]
fn test_unimplemented_targets_fail_every_call() {
    for target in [
        BackendTarget::NativeJni,
        BackendTarget::NativeIpc,
        BackendTarget::PureSql,
    ] {
        let engine = create_engine(target);
        assert!(engine.tick(Instant::now(), TransactionId(0)).is_err());
        assert!(engine.load_catalog(&[]).is_err());
        assert!(engine.release_undo_token(embergrid_base::UndoToken(1)).is_err());
    }
}
