use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use embergrid_base::{DependencyId, PartitionId, UndoToken};
use embergrid_net::Rows;

use crate::dependency::DependencyInfo;
use crate::error::ExecError;
use crate::latch::Latch;
use crate::task::{FragmentTask, TaskStatus};

/// One batch of fragment work for a single transaction (spec §4.2: the
/// lifetime between `initRound` and `finishRound`). Tracks the
/// dependencies this round declares as outputs, any tasks that arrived
/// blocked on a sibling task's not-yet-produced output, and the latch a
/// procedure body blocks on.
pub struct Round {
    undo_token: UndoToken,
    deps: HashMap<DependencyId, DependencyInfo>,
    order: Vec<DependencyId>,
    latch: Option<Arc<Latch>>,
    waiting: Vec<(FragmentTask, HashSet<DependencyId>)>,
}

impl Round {
    pub fn new(undo_token: UndoToken) -> Self {
        Round {
            undo_token,
            deps: HashMap::new(),
            order: Vec::new(),
            latch: None,
            waiting: Vec::new(),
        }
    }

    pub fn undo_token(&self) -> UndoToken {
        self.undo_token
    }

    fn register_output(&mut self, dep_id: DependencyId, txn_id: embergrid_base::TransactionId, producer: PartitionId) {
        if !self.deps.contains_key(&dep_id) {
            self.order.push(dep_id);
            self.deps.insert(
                dep_id,
                DependencyInfo::new(dep_id, txn_id, embergrid_base::PartitionSet::new()),
            );
        }
        self.deps
            .get_mut(&dep_id)
            .expect("just inserted or already present")
            .add_producer(producer);
    }

    /// Registers `task`'s declared outputs against this round and
    /// reports whether it can run immediately (every declared input is
    /// already resolved, either from an earlier round or an
    /// already-satisfied dependency in this same round) or must wait on
    /// a sibling task in this batch (spec §4.4.3).
    pub fn add_task(
        &mut self,
        txn_id: embergrid_base::TransactionId,
        task: FragmentTask,
        available: &HashSet<DependencyId>,
    ) -> TaskStatus {
        for &dep_id in &task.output_dep_ids {
            self.register_output(dep_id, txn_id, task.destination_partition);
        }

        let missing: HashSet<DependencyId> = task
            .input_dep_ids
            .iter()
            .copied()
            .filter(|dep_id| {
                if available.contains(dep_id) {
                    return false;
                }
                match self.deps.get(dep_id) {
                    Some(info) => !info.is_satisfied(),
                    None => false,
                }
            })
            .collect();

        if missing.is_empty() {
            TaskStatus::Runnable
        } else {
            self.waiting.push((task, missing));
            TaskStatus::Blocked
        }
    }

    /// Starts the round: returns a latch counting down to zero as each
    /// declared output dependency is satisfied. Must be called after
    /// every task in the batch has been registered via `add_task`, and
    /// before any of them are dispatched, so a same-thread local
    /// dispatch can't race ahead of the latch being observed (spec
    /// §4.4.3).
    pub fn start(&mut self) -> Arc<Latch> {
        let unsatisfied = self.deps.values().filter(|d| !d.is_satisfied()).count();
        let latch = Arc::new(Latch::new(unsatisfied));
        self.latch = Some(latch.clone());
        latch
    }

    /// Records `rows` from `src_partition` for `dep_id`, counting the
    /// latch down if this was the dependency's last outstanding
    /// producer, and promoting any sibling tasks that were only waiting
    /// on this dependency. Newly-runnable tasks are returned for the
    /// caller to dispatch.
    pub fn add_result(
        &mut self,
        src_partition: PartitionId,
        dep_id: DependencyId,
        rows: Rows,
    ) -> Vec<FragmentTask> {
        let just_satisfied = match self.deps.get_mut(&dep_id) {
            Some(info) => info.add_result(src_partition, rows),
            None => false,
        };
        self.after_response(dep_id, just_satisfied)
    }

    pub fn add_response(&mut self, src_partition: PartitionId, dep_id: DependencyId) -> Vec<FragmentTask> {
        let just_satisfied = match self.deps.get_mut(&dep_id) {
            Some(info) => info.add_response(src_partition),
            None => false,
        };
        self.after_response(dep_id, just_satisfied)
    }

    fn after_response(&mut self, dep_id: DependencyId, just_satisfied: bool) -> Vec<FragmentTask> {
        if just_satisfied {
            if let Some(latch) = &self.latch {
                latch.count_down();
            }
        }
        let mut promoted = Vec::new();
        let mut remaining = Vec::new();
        for (task, mut missing) in self.waiting.drain(..) {
            if just_satisfied {
                missing.remove(&dep_id);
            }
            if missing.is_empty() {
                promoted.push(task);
            } else {
                remaining.push((task, missing));
            }
        }
        self.waiting = remaining;
        promoted
    }

    /// Rows already resolved for `dep_id` within this round, if any --
    /// used to attach a sibling task's output to a task dispatched
    /// later in the same batch (spec §4.4.3 "attach internal
    /// dependencies").
    pub fn rows_of(&self, dep_id: DependencyId) -> Option<&Rows> {
        self.deps.get(&dep_id).filter(|info| info.is_satisfied()).map(DependencyInfo::rows)
    }

    pub fn is_fully_satisfied(&self) -> bool {
        self.deps.values().all(DependencyInfo::is_satisfied)
    }

    /// Drains this round's declared outputs in declaration order,
    /// consuming the round (spec: `finishRound` "frees DependencyInfo").
    pub fn into_ordered_rows(self) -> Vec<(DependencyId, Rows)> {
        let mut deps = self.deps;
        self.order
            .into_iter()
            .filter_map(|dep_id| deps.remove(&dep_id).map(|info| (dep_id, info.into_rows())))
            .collect()
    }
}

impl std::fmt::Debug for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Round")
            .field("undo_token", &self.undo_token)
            .field("dep_count", &self.deps.len())
            .field("waiting", &self.waiting.len())
            .finish()
    }
}

/// First error wins (spec §4.2 `setPendingError`): subsequent errors are
/// dropped once one is recorded.
pub fn set_first(slot: &mut Option<ExecError>, e: ExecError) {
    if slot.is_none() {
        *slot = Some(e);
    }
}
