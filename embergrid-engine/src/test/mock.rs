use std::time::Instant;

use embergrid_base::{DependencyId, TransactionId, UndoToken};
use embergrid_net::Value;
use test_log::test;

use crate::{FragmentExecRequest, InMemoryEngine, StorageEngine};

#[test]
fn test_load_table_then_undo_restores_previous_rows() {
    let engine = InMemoryEngine::new();
    engine
        .load_table(
            0,
            vec![vec![Value::I64(1)]],
            TransactionId(1),
            TransactionId(0),
            UndoToken(10),
            false,
        )
        .unwrap();
    assert_eq!(engine.table_rows(0), vec![vec![Value::I64(1)]]);

    engine
        .load_table(
            0,
            vec![vec![Value::I64(2)]],
            TransactionId(2),
            TransactionId(0),
            UndoToken(20),
            false,
        )
        .unwrap();
    assert_eq!(engine.table_rows(0), vec![vec![Value::I64(2)]]);

    engine.undo_undo_token(UndoToken(20)).unwrap();
    assert_eq!(
        engine.table_rows(0),
        vec![vec![Value::I64(1)]],
        "undo of token 20 should restore the row written under token 10"
    );
}

#[test]
fn test_undo_is_lifo_across_multiple_tokens() {
    let engine = InMemoryEngine::new();
    engine
        .load_table(0, vec![vec![Value::I64(1)]], TransactionId(1), TransactionId(0), UndoToken(1), false)
        .unwrap();
    engine
        .load_table(1, vec![vec![Value::I64(2)]], TransactionId(2), TransactionId(0), UndoToken(2), false)
        .unwrap();
    engine
        .load_table(0, vec![vec![Value::I64(3)]], TransactionId(3), TransactionId(0), UndoToken(3), false)
        .unwrap();

    // Rolling back token 2 must also roll back the newer write at token 3.
    engine.undo_undo_token(UndoToken(2)).unwrap();
    assert_eq!(engine.table_rows(0), vec![vec![Value::I64(1)]]);
    assert_eq!(engine.table_rows(1), Vec::<Vec<Value>>::new());
}

#[test]
fn test_release_undo_token_forgets_journal_entry() {
    let engine = InMemoryEngine::new();
    engine
        .load_table(0, vec![vec![Value::I64(1)]], TransactionId(1), TransactionId(0), UndoToken(1), false)
        .unwrap();
    engine.release_undo_token(UndoToken(1)).unwrap();

    // With the journal entry released, undoing that token is a no-op:
    // nothing at or after it remains in the journal.
    engine.undo_undo_token(UndoToken(1)).unwrap();
    assert_eq!(engine.table_rows(0), vec![vec![Value::I64(1)]]);
}

#[test]
fn test_tick_increments_counter() {
    let engine = InMemoryEngine::new();
    engine.tick(Instant::now(), TransactionId(0)).unwrap();
    engine.tick(Instant::now(), TransactionId(0)).unwrap();
    assert_eq!(engine.tick_count(), 2);
}

#[test]
fn test_execute_fragments_echoes_inputs_positionally() {
    let engine = InMemoryEngine::new();
    let req = FragmentExecRequest {
        fragment_ids: vec![],
        param_blobs: vec![],
        input_deps: vec![(DependencyId(1), vec![vec![Value::I64(42)]])],
        output_dep_ids: vec![DependencyId(2)],
        txn_id: TransactionId(1),
        last_committed_txn_id: TransactionId(0),
        undo_token: UndoToken(1),
    };
    let out = engine.execute_fragments(req).unwrap();
    assert_eq!(out, vec![(DependencyId(2), vec![vec![Value::I64(42)]])]);
}
