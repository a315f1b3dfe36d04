use embergrid_base::{DependencyId, PartitionId, PartitionSet, TransactionId};
use embergrid_net::Rows;

/// One declared output of a round (spec §4.2 `DependencyInfo`):
/// allocated by `initRound`, released by `finishRound`. A dependency
/// counts as satisfied once *either* rows or an explicit empty
/// response has arrived from every producing partition (spec §4.2 Key
/// algorithm).
#[derive(Debug)]
pub struct DependencyInfo {
    pub dependency_id: DependencyId,
    pub txn_id: TransactionId,
    producing: PartitionSet,
    pending: PartitionSet,
    rows: Rows,
}

impl DependencyInfo {
    pub fn new(dependency_id: DependencyId, txn_id: TransactionId, producing: PartitionSet) -> Self {
        DependencyInfo {
            dependency_id,
            txn_id,
            pending: producing,
            producing,
            rows: Vec::new(),
        }
    }

    /// Adds another producer to this dependency after construction,
    /// used when a round's output dependency is declared incrementally
    /// as sibling tasks are registered (spec §4.4.3 `addFragmentTaskMessage`).
    pub fn add_producer(&mut self, src_partition: PartitionId) {
        if !self.producing.get(src_partition.0 as u8) {
            self.producing.set(src_partition.0 as u8, true);
            self.pending.set(src_partition.0 as u8, true);
        }
    }

    pub fn producing(&self) -> &PartitionSet {
        &self.producing
    }

    pub fn pending(&self) -> &PartitionSet {
        &self.pending
    }

    pub fn is_satisfied(&self) -> bool {
        self.pending.is_empty()
    }

    /// Appends `rows` from `src_partition` and returns `true` if this
    /// was the last producer this dependency was waiting on.
    pub fn add_result(&mut self, src_partition: PartitionId, rows: Rows) -> bool {
        self.rows.extend(rows);
        self.mark_responded(src_partition)
    }

    /// Records that `src_partition` produced no rows. Returns `true`
    /// if this was the last producer this dependency was waiting on.
    pub fn add_response(&mut self, src_partition: PartitionId) -> bool {
        self.mark_responded(src_partition)
    }

    fn mark_responded(&mut self, src_partition: PartitionId) -> bool {
        let was_pending = self.pending.get(src_partition.0 as u8);
        if was_pending {
            self.pending.set(src_partition.0 as u8, false);
        }
        was_pending && self.pending.is_empty()
    }

    pub fn into_rows(self) -> Rows {
        self.rows
    }

    pub fn rows(&self) -> &Rows {
        &self.rows
    }
}
