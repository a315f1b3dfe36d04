use std::collections::HashSet;

use embergrid_base::{
    ClientHandle, CoordTxnId, DependencyId, PartitionId, PartitionSet, TransactionId, UndoToken,
};
use embergrid_net::{ParamBlob, Rows};

use crate::callback::{
    CleanupCallback, FinishCallback, InitCallback, InitQueueCallback, PrepareCallback,
    WorkCallback,
};
use crate::error::ExecError;
use crate::latch::Latch;
use crate::round::{self, Round};
use crate::task::{FragmentTask, TaskStatus};

use std::sync::Arc;

/// Role-specific fields (spec §9 Design Notes: "replace the shared
/// abstract base with a struct of common fields plus a tagged variant
/// `{Local, Remote}`"). `Local` is owned by the base partition running
/// the transaction's procedure body; `Remote` is owned by a partition
/// that only ever sees fragments dispatched to it for a procedure
/// running elsewhere.
pub enum Role {
    Local(LocalRole),
    Remote(RemoteRole),
}

pub struct LocalRole {
    pub client_handle: ClientHandle,
    pub proc_name: String,
    pub params: ParamBlob,
    pub predicted_partition_set: PartitionSet,
    pub predicted_read_only: bool,
    pub predicted_single_partition: bool,
    pub abortable: bool,
    pub exec_local: bool,
    pub last_undo_token: UndoToken,
    pub touched_partitions: PartitionSet,
    pub init_cb: InitCallback,
    pub work_cb: WorkCallback,
    pub prepare_cb: PrepareCallback,
    pub finish_cb: FinishCallback,
    pub cleanup_cb: CleanupCallback,
}

pub struct RemoteRole {
    pub coord_txn_id: Option<CoordTxnId>,
    pub participating_partitions: PartitionSet,
    pub last_undo_token: UndoToken,
    pub init_queue_cb: InitQueueCallback,
    pub work_cb: WorkCallback,
    pub prepare_cb: PrepareCallback,
    pub cleanup_cb: CleanupCallback,
}

/// A live transaction's progress on one partition (spec §4.2). Common
/// fields (identity, round bookkeeping, accumulated results, pending
/// error) live directly on the struct; role-specific fields live in
/// `role`.
pub struct TransactionState {
    txn_id: TransactionId,
    base_partition: PartitionId,
    pending_error: Option<ExecError>,
    round: Option<Round>,
    results: Vec<(DependencyId, Rows)>,
    available: HashSet<DependencyId>,
    role: Role,
}

impl TransactionState {
    /// Idempotent constructor for the base-partition role (spec §4.2
    /// `init`). Also used to reinitialize a pooled instance for a new
    /// transaction by identity (spec §8 S6).
    #[allow(clippy::too_many_arguments)]
    pub fn init_local(
        &mut self,
        txn_id: TransactionId,
        base_partition: PartitionId,
        client_handle: ClientHandle,
        proc_name: impl Into<String>,
        params: ParamBlob,
        predicted_partition_set: PartitionSet,
        predicted_read_only: bool,
        abortable: bool,
        exec_local: bool,
    ) {
        let predicted_single_partition =
            predicted_partition_set == embergrid_base::partition_set_of([base_partition]);
        self.txn_id = txn_id;
        self.base_partition = base_partition;
        self.pending_error = None;
        self.round = None;
        self.results.clear();
        self.available.clear();
        self.role = Role::Local(LocalRole {
            client_handle,
            proc_name: proc_name.into(),
            params,
            predicted_partition_set,
            predicted_read_only,
            predicted_single_partition,
            abortable,
            exec_local,
            last_undo_token: UndoToken::NONE,
            touched_partitions: PartitionSet::new(),
            init_cb: InitCallback::new(txn_id, base_partition, 0),
            work_cb: WorkCallback::new(txn_id, base_partition, 0),
            prepare_cb: PrepareCallback::new(txn_id, base_partition, 0),
            finish_cb: FinishCallback::new(txn_id, base_partition, 0),
            cleanup_cb: CleanupCallback::new(txn_id, base_partition, 0),
        });
    }

    /// A minimal placeholder instance, suitable as an `ObjectPool<T>`
    /// constructor: every field is overwritten by `init_local` before
    /// the instance is handed to a transaction.
    pub fn blank_local() -> Self {
        let txn_id = TransactionId(0);
        let base_partition = PartitionId(0);
        TransactionState {
            txn_id,
            base_partition,
            pending_error: None,
            round: None,
            results: Vec::new(),
            available: HashSet::new(),
            role: Role::Local(LocalRole {
                client_handle: ClientHandle(0),
                proc_name: String::new(),
                params: Vec::new(),
                predicted_partition_set: PartitionSet::new(),
                predicted_read_only: false,
                predicted_single_partition: false,
                abortable: false,
                exec_local: false,
                last_undo_token: UndoToken::NONE,
                touched_partitions: PartitionSet::new(),
                init_cb: InitCallback::new(txn_id, base_partition, 0),
                work_cb: WorkCallback::new(txn_id, base_partition, 0),
                prepare_cb: PrepareCallback::new(txn_id, base_partition, 0),
                finish_cb: FinishCallback::new(txn_id, base_partition, 0),
                cleanup_cb: CleanupCallback::new(txn_id, base_partition, 0),
            }),
        }
    }

    pub fn init_remote(
        &mut self,
        txn_id: TransactionId,
        base_partition: PartitionId,
        participating_partitions: PartitionSet,
    ) {
        self.txn_id = txn_id;
        self.base_partition = base_partition;
        self.pending_error = None;
        self.round = None;
        self.results.clear();
        self.available.clear();
        self.role = Role::Remote(RemoteRole {
            coord_txn_id: None,
            participating_partitions,
            last_undo_token: UndoToken::NONE,
            init_queue_cb: InitQueueCallback::new(txn_id, base_partition, 0),
            work_cb: WorkCallback::new(txn_id, base_partition, 0),
            prepare_cb: PrepareCallback::new(txn_id, base_partition, 0),
            cleanup_cb: CleanupCallback::new(txn_id, base_partition, 0),
        });
    }

    /// A minimal placeholder instance for the remote role's pool.
    pub fn blank_remote() -> Self {
        let txn_id = TransactionId(0);
        let base_partition = PartitionId(0);
        TransactionState {
            txn_id,
            base_partition,
            pending_error: None,
            round: None,
            results: Vec::new(),
            available: HashSet::new(),
            role: Role::Remote(RemoteRole {
                coord_txn_id: None,
                participating_partitions: PartitionSet::new(),
                last_undo_token: UndoToken::NONE,
                init_queue_cb: InitQueueCallback::new(txn_id, base_partition, 0),
                work_cb: WorkCallback::new(txn_id, base_partition, 0),
                prepare_cb: PrepareCallback::new(txn_id, base_partition, 0),
                cleanup_cb: CleanupCallback::new(txn_id, base_partition, 0),
            }),
        }
    }

    pub fn txn_id(&self) -> TransactionId {
        self.txn_id
    }

    pub fn base_partition(&self) -> PartitionId {
        self.base_partition
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn role_mut(&mut self) -> &mut Role {
        &mut self.role
    }

    pub fn as_local(&self) -> Option<&LocalRole> {
        match &self.role {
            Role::Local(l) => Some(l),
            Role::Remote(_) => None,
        }
    }

    pub fn as_local_mut(&mut self) -> Option<&mut LocalRole> {
        match &mut self.role {
            Role::Local(l) => Some(l),
            Role::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteRole> {
        match &self.role {
            Role::Remote(r) => Some(r),
            Role::Local(_) => None,
        }
    }

    pub fn as_remote_mut(&mut self) -> Option<&mut RemoteRole> {
        match &mut self.role {
            Role::Remote(r) => Some(r),
            Role::Local(_) => None,
        }
    }

    pub fn is_exec_local(&self) -> bool {
        match &self.role {
            Role::Local(l) => l.exec_local,
            Role::Remote(_) => false,
        }
    }

    pub fn is_predict_single_partition(&self) -> bool {
        match &self.role {
            Role::Local(l) => l.predicted_single_partition,
            Role::Remote(_) => false,
        }
    }

    /// Whether every fragment this transaction has actually dispatched
    /// stayed on the base partition -- distinct from the *prediction*,
    /// which is fixed before execution starts.
    pub fn is_exec_single_partition(&self) -> bool {
        match &self.role {
            Role::Local(l) => {
                l.touched_partitions.is_empty()
                    || l.touched_partitions == embergrid_base::partition_set_of([self.base_partition])
            }
            Role::Remote(_) => false,
        }
    }

    /// Enters a new batch (spec §4.2 `initRound`). `next_undo_token`
    /// fences a fresh undo window; declared output dependencies are
    /// registered incrementally as tasks are added via `add_fragment_task`.
    pub fn init_round(&mut self, next_undo_token: UndoToken) {
        assert!(
            self.round.is_none(),
            "initRound called while a round is already in progress for {}",
            self.txn_id
        );
        self.round = Some(Round::new(next_undo_token));
        match &mut self.role {
            Role::Local(l) => l.last_undo_token = next_undo_token,
            Role::Remote(r) => r.last_undo_token = next_undo_token,
        }
    }

    pub fn current_undo_token(&self) -> Option<UndoToken> {
        self.round.as_ref().map(Round::undo_token)
    }

    pub fn last_undo_token(&self) -> UndoToken {
        match &self.role {
            Role::Local(l) => l.last_undo_token,
            Role::Remote(r) => r.last_undo_token,
        }
    }

    /// Registers `task` against the current round and reports whether
    /// it can run immediately or must wait on a sibling task's output
    /// (spec §4.4.3 `addFragmentTaskMessage`).
    pub fn add_fragment_task(&mut self, task: FragmentTask) -> TaskStatus {
        if let Role::Local(l) = &mut self.role {
            l.touched_partitions.set(task.destination_partition.0 as u8, true);
        }
        let txn_id = self.txn_id;
        let available = &self.available;
        self.round
            .as_mut()
            .expect("add_fragment_task requires an active round")
            .add_task(txn_id, task, available)
    }

    /// Returns the latch a procedure body blocks on (spec §4.2
    /// `startRound`). Must be called after every task in the batch has
    /// been registered via `add_fragment_task`.
    pub fn start_round(&mut self) -> Arc<Latch> {
        self.round
            .as_mut()
            .expect("startRound requires an active round")
            .start()
    }

    /// A dependency is satisfied once either rows or an explicit empty
    /// response has arrived from every declared producer (spec §4.2).
    /// Returns the sibling tasks this promotes from blocked to runnable.
    pub fn add_result(
        &mut self,
        src_partition: PartitionId,
        dep_id: DependencyId,
        rows: Rows,
    ) -> Vec<FragmentTask> {
        match &mut self.round {
            Some(round) => round.add_result(src_partition, dep_id, rows),
            None => {
                self.assert_late_response();
                Vec::new()
            }
        }
    }

    pub fn add_response(&mut self, src_partition: PartitionId, dep_id: DependencyId) -> Vec<FragmentTask> {
        match &mut self.round {
            Some(round) => round.add_response(src_partition, dep_id),
            None => {
                self.assert_late_response();
                Vec::new()
            }
        }
    }

    /// Spec §9 Open Question (b): an `addResult`/`addResponse` arriving
    /// after `finishRound` is an assertion failure unless the
    /// transaction already has a pending error (in which case the late
    /// response is simply stale and is dropped).
    fn assert_late_response(&self) {
        assert!(
            self.pending_error.is_some(),
            "addResult/addResponse for {} arrived with no active round and no pending error",
            self.txn_id
        );
    }

    /// Asserts every declared dependency of the round is satisfied (or
    /// a pending error excuses the gap), frees the round's
    /// `DependencyInfo`, and returns this round's output rows in
    /// declaration order (spec §4.2 `finishRound`).
    pub fn finish_round(&mut self) -> Vec<Rows> {
        let round = self
            .round
            .take()
            .expect("finishRound called with no active round");
        assert!(
            round.is_fully_satisfied() || self.pending_error.is_some(),
            "finishRound for {} with unsatisfied dependencies and no pending error",
            self.txn_id
        );
        let ordered = round.into_ordered_rows();
        let mut tables = Vec::with_capacity(ordered.len());
        for (dep_id, rows) in ordered {
            self.available.insert(dep_id);
            tables.push(rows.clone());
            self.results.push((dep_id, rows));
        }
        tables
    }

    pub fn set_pending_error(&mut self, e: ExecError) {
        round::set_first(&mut self.pending_error, e);
    }

    pub fn has_pending_error(&self) -> bool {
        self.pending_error.is_some()
    }

    pub fn get_pending_error(&self) -> Option<ExecError> {
        self.pending_error.clone()
    }

    pub fn get_results(&self) -> &[(DependencyId, Rows)] {
        &self.results
    }

    /// Rows resolved for `dep_id`, whether they were produced earlier
    /// in the current round or in an already-finished one. Used to
    /// attach an already-known dependency's rows to a task before
    /// dispatch (spec §4.4.3).
    pub fn resolved_rows(&self, dep_id: DependencyId) -> Option<&Rows> {
        if let Some(round) = &self.round {
            if let Some(rows) = round.rows_of(dep_id) {
                return Some(rows);
            }
        }
        self.results
            .iter()
            .find(|(id, _)| *id == dep_id)
            .map(|(_, rows)| rows)
    }

    /// Spec §3 invariant: a transaction is deletable only when every
    /// callback slot reports `finished` and no round is in progress.
    pub fn is_deletable(&self) -> bool {
        if self.round.is_some() {
            return false;
        }
        match &self.role {
            Role::Local(l) => {
                l.init_cb.is_finished()
                    && l.work_cb.is_finished()
                    && l.prepare_cb.is_finished()
                    && l.finish_cb.is_finished()
                    && l.cleanup_cb.is_finished()
            }
            Role::Remote(r) => {
                r.init_queue_cb.is_finished()
                    && r.work_cb.is_finished()
                    && r.prepare_cb.is_finished()
                    && r.cleanup_cb.is_finished()
            }
        }
    }
}
