use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use embergrid_base::{
    partition_set_of, ClientHandle, DependencyId, FragmentId, PartitionId, PartitionSet, SiteId,
    TransactionId, UndoToken,
};
use embergrid_coord::{CoordinatorInterface, PartitionLocator};
use embergrid_engine::{FragmentExecRequest, StorageEngine};
use embergrid_net::{
    ClientResponse, ClientStatus, FinishDecision, FinishRequest, FinishResponse, FragmentResponse,
    FragmentStatus, ParamBlob, PrepareAck, PrepareRequest, PrepareResponse, Rows,
};
use embergrid_pool::{PoolStats, ProfiledPool};
use embergrid_proc::{ExecutorContext, ProcedureRegistry};
use embergrid_txn::{ExecError, FragmentTask, Role, TaskStatus, TransactionState};

use crate::sink::{ClientResponseSink, CoordinatorReplySink};
use crate::work_item::{CoordinatorReplyTo, WorkItem};

/// One partition's state machine: a single OS thread, one work queue, one
/// `StorageEngine` handle, and a table of in-flight transactions it either
/// owns (as their base partition) or serves fragments for on behalf of
/// some other base partition's round. Nothing outside this struct ever
/// mutates a `TransactionState` directly -- the whole point of the
/// one-thread-per-partition layout is that no lock is needed around the
/// table itself.
pub struct PartitionExecutor {
    partition_id: PartitionId,
    site_id: SiteId,
    engine: Box<dyn StorageEngine>,
    queue_tx: crossbeam_channel::Sender<WorkItem>,
    queue_rx: crossbeam_channel::Receiver<WorkItem>,
    local_pool: Arc<ProfiledPool<TransactionState>>,
    remote_pool: Arc<ProfiledPool<TransactionState>>,
    txns: HashMap<TransactionId, TransactionState>,
    procedures: ProcedureRegistry,
    coordinator: Arc<CoordinatorInterface>,
    messenger: Arc<embergrid_net::Messenger>,
    locator: Arc<dyn PartitionLocator>,
    reply_sink: Arc<dyn CoordinatorReplySink>,
    client_sink: Arc<dyn ClientResponseSink>,
    next_undo_token: i64,
    last_committed_txn_id: TransactionId,
    gc_interval: Duration,
    max_txns_cleaned_per_poll: usize,
    last_gc: Instant,
}

impl PartitionExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        partition_id: PartitionId,
        site_id: SiteId,
        engine: Box<dyn StorageEngine>,
        procedures: ProcedureRegistry,
        coordinator: Arc<CoordinatorInterface>,
        messenger: Arc<embergrid_net::Messenger>,
        locator: Arc<dyn PartitionLocator>,
        reply_sink: Arc<dyn CoordinatorReplySink>,
        client_sink: Arc<dyn ClientResponseSink>,
        pool_idle_cap: usize,
    ) -> Self {
        Self::with_gc_config(
            partition_id,
            site_id,
            engine,
            procedures,
            coordinator,
            messenger,
            locator,
            reply_sink,
            client_sink,
            pool_idle_cap,
            Duration::from_secs(2),
            10,
        )
    }

    /// Same as `new`, with the garbage-collection config knobs (spec
    /// §6: "garbage-collection interval for finished transactions
    /// (default 2s)", "max transactions cleaned per poll (default
    /// 10)") broken out for callers that configure them explicitly --
    /// `embergrid-site`'s supervisor, reading `SiteConfig`.
    #[allow(clippy::too_many_arguments)]
    pub fn with_gc_config(
        partition_id: PartitionId,
        site_id: SiteId,
        engine: Box<dyn StorageEngine>,
        procedures: ProcedureRegistry,
        coordinator: Arc<CoordinatorInterface>,
        messenger: Arc<embergrid_net::Messenger>,
        locator: Arc<dyn PartitionLocator>,
        reply_sink: Arc<dyn CoordinatorReplySink>,
        client_sink: Arc<dyn ClientResponseSink>,
        pool_idle_cap: usize,
        gc_interval: Duration,
        max_txns_cleaned_per_poll: usize,
    ) -> Self {
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        PartitionExecutor {
            partition_id,
            site_id,
            engine,
            queue_tx,
            queue_rx,
            local_pool: Arc::new(ProfiledPool::new(pool_idle_cap, TransactionState::blank_local)),
            remote_pool: Arc::new(ProfiledPool::new(pool_idle_cap, TransactionState::blank_remote)),
            txns: HashMap::new(),
            procedures,
            coordinator,
            messenger,
            locator,
            reply_sink,
            client_sink,
            next_undo_token: 1,
            gc_interval,
            max_txns_cleaned_per_poll,
            last_gc: Instant::now(),
            last_committed_txn_id: TransactionId(0),
        }
    }

    /// A clonable handle onto this partition's work queue, for whatever
    /// owns routing (the site supervisor, or a test harness) to hand work
    /// to this executor from another thread.
    pub fn sender(&self) -> crossbeam_channel::Sender<WorkItem> {
        self.queue_tx.clone()
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Shared handles onto this partition's transaction-state pools, for
    /// whatever owns observability (the site supervisor) to read stats
    /// from without reaching across the executor thread boundary.
    pub fn local_pool_handle(&self) -> Arc<ProfiledPool<TransactionState>> {
        self.local_pool.clone()
    }

    pub fn remote_pool_handle(&self) -> Arc<ProfiledPool<TransactionState>> {
        self.remote_pool.clone()
    }

    /// Per-procedure pool stats, keyed by procedure name.
    pub fn procedure_pool_stats(&self) -> HashMap<String, PoolStats> {
        self.procedures.stats()
    }

    /// Live handles onto every registered procedure pool, for the site
    /// supervisor to retain once this executor has moved onto its own
    /// thread.
    pub fn procedure_pool_handles(
        &self,
    ) -> HashMap<String, Arc<embergrid_pool::ProfiledPool<Box<dyn embergrid_proc::StoredProcedure>>>> {
        self.procedures.pool_handles()
    }

    /// The main loop. Blocks on the work queue, handling one item at a
    /// time, until a `Shutdown` item arrives or the queue's senders are
    /// all dropped. A one-second idle timeout drives the periodic engine
    /// tick when no other work shows up to do it implicitly.
    pub fn run(&mut self) {
        let span = tracing::info_span!("partition", partition = %self.partition_id, site = %self.site_id);
        let _enter = span.enter();
        tracing::info!(target: "embergrid", "partition executor starting");
        loop {
            match self.queue_rx.recv_timeout(Duration::from_secs(1)) {
                Ok(WorkItem::Shutdown) => {
                    tracing::info!(target: "embergrid", "partition executor shutting down");
                    break;
                }
                Ok(item) => self.handle_work_item(item),
                Err(RecvTimeoutError::Timeout) => self.on_tick(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn handle_work_item(&mut self, item: WorkItem) {
        match item {
            WorkItem::Initiate {
                txn_id,
                client_handle,
                proc_name,
                params,
                predicted_partition_set,
                predicted_read_only,
                abortable,
            } => self.handle_initiate(
                txn_id,
                client_handle,
                proc_name,
                params,
                predicted_partition_set,
                predicted_read_only,
                abortable,
            ),
            WorkItem::Fragment {
                txn_id,
                source_partition,
                fragment_ids,
                param_blobs,
                input_dep_ids,
                output_dep_ids,
                attached_deps,
                reply_to,
            } => self.handle_remote_fragment(
                txn_id,
                source_partition,
                fragment_ids,
                param_blobs,
                input_dep_ids,
                output_dep_ids,
                attached_deps,
                reply_to,
            ),
            WorkItem::DeliverResult {
                txn_id,
                src_partition,
                dep_id,
                rows,
            } => self.handle_deliver_result(txn_id, src_partition, dep_id, rows),
            WorkItem::PrepareRequest { txn_id, origin_site } => {
                self.handle_prepare_request(txn_id, origin_site)
            }
            WorkItem::PrepareResponse { txn_id, ack } => self.handle_prepare_response(txn_id, ack),
            WorkItem::FinishRequest {
                txn_id,
                decision,
                origin_site,
            } => self.handle_finish_request(txn_id, decision, origin_site),
            WorkItem::FinishResponse { txn_id } => self.handle_finish_response(txn_id),
            WorkItem::RemoteFragmentError { txn_id, message } => {
                if let Some(state) = self.txns.get_mut(&txn_id) {
                    state.set_pending_error(ExecError::EeError(message));
                }
            }
            WorkItem::Tick => self.on_tick(),
            WorkItem::Shutdown => {}
        }
    }

    fn on_tick(&mut self) {
        if let Err(e) = self.engine.tick(Instant::now(), self.last_committed_txn_id) {
            tracing::error!(target: "embergrid", error = %e, "engine tick failed");
        }
        if self.last_gc.elapsed() >= self.gc_interval {
            self.gc_sweep();
            self.last_gc = Instant::now();
        }
    }

    /// Retries `cleanup_transaction` for entries a prior commit/abort
    /// left behind because they weren't yet deletable (spec §6 "max
    /// transactions cleaned per poll"). The common case is cleaned up
    /// synchronously at commit/abort time; this sweep only ever touches
    /// the stragglers.
    fn gc_sweep(&mut self) {
        let candidates: Vec<TransactionId> = self
            .txns
            .iter()
            .filter(|(_, state)| state.is_deletable())
            .map(|(txn_id, _)| *txn_id)
            .take(self.max_txns_cleaned_per_poll)
            .collect();
        for txn_id in candidates {
            self.cleanup_transaction(txn_id);
        }
    }

    // ---- client-initiated transactions (this partition is the base) ----

    #[allow(clippy::too_many_arguments)]
    fn handle_initiate(
        &mut self,
        txn_id: TransactionId,
        client_handle: ClientHandle,
        proc_name: String,
        params: ParamBlob,
        predicted_partition_set: PartitionSet,
        predicted_read_only: bool,
        abortable: bool,
    ) {
        if !self.procedures.is_registered(&proc_name) {
            self.client_sink.deliver(ClientResponse {
                txn_id,
                client_handle,
                status: ClientStatus::UnexpectedError,
                results: Vec::new(),
                status_message: format!("no such procedure: {proc_name}"),
            });
            return;
        }

        let mut state = self.local_pool.acquire();
        state.init_local(
            txn_id,
            self.partition_id,
            client_handle,
            proc_name.clone(),
            params.clone(),
            predicted_partition_set,
            predicted_read_only,
            abortable,
            true,
        );
        self.txns.insert(txn_id, state);

        self.run_transaction(txn_id, proc_name, params);
    }

    fn run_transaction(&mut self, txn_id: TransactionId, proc_name: String, params: ParamBlob) {
        let mut proc = match self.procedures.acquire(&proc_name) {
            Ok(p) => p,
            Err(e) => {
                if let Some(local) = self.txns.get(&txn_id).and_then(TransactionState::as_local) {
                    let client_handle = local.client_handle;
                    self.client_sink.deliver(ClientResponse {
                        txn_id,
                        client_handle,
                        status: ClientStatus::UnexpectedError,
                        results: Vec::new(),
                        status_message: e.to_string(),
                    });
                }
                self.txns.remove(&txn_id);
                return;
            }
        };

        let outcome = {
            let mut ctx = ProcCtx { exec: self, txn_id };
            proc.call(&mut ctx, &params)
        };

        // A mispredict is terminal on this attempt (spec §4.4.5): the
        // executor rolls back via the normal abort path and reports
        // MISPREDICTION to the client. Resubmitting with the
        // multi-partition prediction cleared is the coordinator's job,
        // and the coordinator/client driver are both out of scope here
        // (spec §1) -- this partition never retries a procedure body
        // in place.
        if let Err(ExecError::Mispredict(_)) = &outcome {
            tracing::debug!(target: "embergrid", %txn_id, "mispredict, aborting for coordinator resubmission");
        }

        self.procedures.release(&proc_name, proc);
        self.finish_transaction(txn_id, outcome);
    }

    fn finish_transaction(&mut self, txn_id: TransactionId, outcome: Result<Vec<Rows>, ExecError>) {
        let client_handle = match self.txns.get(&txn_id).and_then(TransactionState::as_local) {
            Some(local) => local.client_handle,
            None => return,
        };
        match outcome {
            Ok(results) => self.commit_transaction(txn_id, client_handle, results),
            Err(e) => self.finish_abort(txn_id, client_handle, e),
        }
    }

    fn participants_of(&self, txn_id: TransactionId) -> Vec<PartitionId> {
        match self.txns.get(&txn_id).and_then(TransactionState::as_local) {
            Some(local) => embergrid_base::partition_set_iter(&local.touched_partitions)
                .filter(|p| *p != self.partition_id)
                .collect(),
            None => Vec::new(),
        }
    }

    fn commit_transaction(&mut self, txn_id: TransactionId, client_handle: ClientHandle, results: Vec<Rows>) {
        let participants = self.participants_of(txn_id);
        let ready = if participants.is_empty() {
            true
        } else {
            self.run_prepare_wave(txn_id, &participants)
        };

        if !ready {
            let e = self
                .txns
                .get(&txn_id)
                .and_then(TransactionState::get_pending_error)
                .unwrap_or(ExecError::PrepareRefused);
            self.finish_abort(txn_id, client_handle, e);
            return;
        }

        let token = self
            .txns
            .get(&txn_id)
            .map(TransactionState::last_undo_token)
            .unwrap_or(UndoToken::NONE);
        if !token.is_none() {
            if let Err(e) = self.engine.release_undo_token(token) {
                tracing::error!(target: "embergrid", error = %e, %txn_id, "release_undo_token failed");
            }
        }
        self.last_committed_txn_id = txn_id;

        if !participants.is_empty() {
            self.run_finish_wave(txn_id, &participants, FinishDecision::Commit);
        }

        self.client_sink.deliver(ClientResponse {
            txn_id,
            client_handle,
            status: ClientStatus::Success,
            results,
            status_message: String::new(),
        });
        self.cleanup_transaction(txn_id);
    }

    fn finish_abort(&mut self, txn_id: TransactionId, client_handle: ClientHandle, e: ExecError) {
        let token = self
            .txns
            .get(&txn_id)
            .map(TransactionState::last_undo_token)
            .unwrap_or(UndoToken::NONE);
        if !token.is_none() {
            if let Err(err) = self.engine.undo_undo_token(token) {
                tracing::error!(target: "embergrid", error = %err, %txn_id, "undo_undo_token failed");
            }
        }

        let participants = self.participants_of(txn_id);
        if !participants.is_empty() {
            self.run_finish_wave(txn_id, &participants, FinishDecision::Abort);
        }

        let (status, msg) = match &e {
            ExecError::UserAbort => (ClientStatus::UserAbort, "user abort".to_string()),
            ExecError::Mispredict(_) => (ClientStatus::Mispredict, e.to_string()),
            other => (ClientStatus::UnexpectedError, other.to_string()),
        };
        self.client_sink.deliver(ClientResponse {
            txn_id,
            client_handle,
            status,
            results: Vec::new(),
            status_message: msg,
        });
        self.cleanup_transaction(txn_id);
    }

    fn run_prepare_wave(&mut self, txn_id: TransactionId, participants: &[PartitionId]) -> bool {
        {
            let state = self.txns.get_mut(&txn_id).expect("transaction still in table");
            if let Some(local) = state.as_local_mut() {
                local.prepare_cb.arm(participants.len());
            }
        }
        for &p in participants {
            let outcome = match self.locator.site_of(p) {
                Some(site) => self
                    .messenger
                    .send_prepare_request(site, PrepareRequest { txn_id, partition_id: p }),
                None => Err(embergrid_base::err(format!("no site registered for partition {p}"))),
            };
            if let Err(e) = outcome {
                tracing::error!(target: "embergrid", error = %e, partition = %p, "failed to send prepare request");
                if let Some(state) = self.txns.get_mut(&txn_id) {
                    state.set_pending_error(ExecError::PrepareRefused);
                    if let Some(local) = state.as_local_mut() {
                        local.prepare_cb.on_response();
                    }
                }
            }
        }
        self.pump_until(txn_id, |state| {
            state.as_local().map(|l| l.prepare_cb.is_finished()).unwrap_or(true)
        });
        !self
            .txns
            .get(&txn_id)
            .map(TransactionState::has_pending_error)
            .unwrap_or(true)
    }

    fn run_finish_wave(&mut self, txn_id: TransactionId, participants: &[PartitionId], decision: FinishDecision) {
        {
            let state = self.txns.get_mut(&txn_id).expect("transaction still in table");
            if let Some(local) = state.as_local_mut() {
                local.finish_cb.arm(participants.len());
            }
        }
        for &p in participants {
            let outcome = match self.locator.site_of(p) {
                Some(site) => self
                    .messenger
                    .send_finish_request(site, FinishRequest { txn_id, partition_id: p, decision }),
                None => Err(embergrid_base::err(format!("no site registered for partition {p}"))),
            };
            if let Err(e) = outcome {
                tracing::error!(target: "embergrid", error = %e, partition = %p, "failed to send finish request");
                if let Some(state) = self.txns.get_mut(&txn_id) {
                    if let Some(local) = state.as_local_mut() {
                        local.finish_cb.on_response();
                    }
                }
            }
        }
        self.pump_until(txn_id, |state| {
            state.as_local().map(|l| l.finish_cb.is_finished()).unwrap_or(true)
        });
    }

    /// Drains the local work queue, handling whatever arrives, until
    /// `done` reports true for this transaction's state (or the state
    /// disappears, which counts as done). Used for every wave that blocks
    /// on out-of-band acknowledgements (prepare, finish) rather than on a
    /// round's latch.
    fn pump_until(&mut self, txn_id: TransactionId, done: impl Fn(&TransactionState) -> bool) {
        loop {
            let is_done = self.txns.get(&txn_id).map(|s| done(s)).unwrap_or(true);
            if is_done {
                break;
            }
            match self.queue_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(item) => self.handle_work_item(item),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn cleanup_transaction(&mut self, txn_id: TransactionId) {
        if let Some(state) = self.txns.get_mut(&txn_id) {
            match state.role_mut() {
                Role::Local(l) => {
                    l.cleanup_cb.arm(1);
                    l.cleanup_cb.on_response();
                }
                Role::Remote(r) => {
                    r.cleanup_cb.arm(1);
                    r.cleanup_cb.on_response();
                }
            }
        }
        let deletable = self
            .txns
            .get(&txn_id)
            .map(TransactionState::is_deletable)
            .unwrap_or(false);
        if deletable {
            if let Some(state) = self.txns.remove(&txn_id) {
                if state.as_local().is_some() {
                    self.local_pool.release(state);
                } else {
                    self.remote_pool.release(state);
                }
            }
        }
    }

    // ---- a running procedure body's wait_for_responses ----

    fn wait_for_responses(&mut self, txn_id: TransactionId, tasks: Vec<FragmentTask>) -> Result<Vec<Rows>, ExecError> {
        let mispredicted = self
            .txns
            .get(&txn_id)
            .expect("active transaction")
            .is_predict_single_partition()
            && tasks.iter().any(|t| t.destination_partition != self.partition_id);
        if mispredicted {
            return Err(ExecError::Mispredict(txn_id));
        }

        let undo_token = self.next_undo_token();
        self.txns
            .get_mut(&txn_id)
            .expect("active transaction")
            .init_round(undo_token);

        let mut runnable = Vec::new();
        for task in tasks {
            let status = self
                .txns
                .get_mut(&txn_id)
                .expect("active transaction")
                .add_fragment_task(task.clone());
            if status == TaskStatus::Runnable {
                runnable.push(task);
            }
        }

        self.dispatch_tasks(txn_id, runnable);

        if let Some(local) = self
            .txns
            .get_mut(&txn_id)
            .expect("active transaction")
            .as_local_mut()
        {
            local.work_cb.arm(1);
            local.work_cb.on_response();
        }

        let latch = self
            .txns
            .get_mut(&txn_id)
            .expect("active transaction")
            .start_round();
        self.pump_round(txn_id, &latch);

        let state = self.txns.get_mut(&txn_id).expect("active transaction");
        let rows = state.finish_round();
        match state.get_pending_error() {
            Some(e) => Err(e),
            None => Ok(rows),
        }
    }

    /// Blocks until `latch` reaches zero or the transaction picks up a
    /// pending error -- a failed dependency's producer never counts its
    /// latch down, so without this check a fragment error would wedge
    /// the thread forever.
    fn pump_round(&mut self, txn_id: TransactionId, latch: &Arc<embergrid_txn::Latch>) {
        loop {
            if latch.is_zero() {
                break;
            }
            if self
                .txns
                .get(&txn_id)
                .map(TransactionState::has_pending_error)
                .unwrap_or(true)
            {
                break;
            }
            match self.queue_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(item) => self.handle_work_item(item),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Splits `tasks` into those destined for this partition (run inline,
    /// right now, on this thread) and everything else (bundled into one
    /// coordinator request per destination site). A local task's result
    /// can promote a sibling task from blocked to runnable before this
    /// function returns -- those go through the same split.
    fn dispatch_tasks(&mut self, txn_id: TransactionId, tasks: Vec<FragmentTask>) {
        let mut to_dispatch: VecDeque<FragmentTask> = tasks.into();
        let mut remote_batch = Vec::new();
        while let Some(task) = to_dispatch.pop_front() {
            if task.destination_partition == self.partition_id {
                let promoted = self.execute_local_task(txn_id, task);
                to_dispatch.extend(promoted);
                if self
                    .txns
                    .get(&txn_id)
                    .map(TransactionState::has_pending_error)
                    .unwrap_or(true)
                {
                    break;
                }
            } else {
                remote_batch.push(task);
            }
        }

        if remote_batch.is_empty() {
            return;
        }
        if self
            .txns
            .get(&txn_id)
            .map(TransactionState::has_pending_error)
            .unwrap_or(true)
        {
            return;
        }

        let bundles = remote_batch
            .into_iter()
            .map(|task| {
                let attached = self.gather_attached(txn_id, &task);
                (task.destination_partition, task, attached)
            })
            .collect();
        if let Err(e) = self.coordinator.dispatch(txn_id, self.partition_id, bundles, false) {
            if let Some(state) = self.txns.get_mut(&txn_id) {
                state.set_pending_error(ExecError::Fatal(e.to_string()));
            }
        }
    }

    /// Rows this round (or an earlier one) already resolved for each of
    /// `task`'s declared inputs -- carried alongside a remote task so the
    /// receiving partition never has to ask back for something the
    /// dispatching side already has in hand.
    fn gather_attached(&self, txn_id: TransactionId, task: &FragmentTask) -> Vec<(DependencyId, Rows)> {
        let state = self.txns.get(&txn_id).expect("active transaction");
        task.input_dep_ids
            .iter()
            .filter_map(|dep_id| state.resolved_rows(*dep_id).map(|rows| (*dep_id, rows.clone())))
            .collect()
    }

    fn execute_local_task(&mut self, txn_id: TransactionId, task: FragmentTask) -> Vec<FragmentTask> {
        let input_deps = self.gather_attached(txn_id, &task);
        let undo_token = self
            .txns
            .get(&txn_id)
            .and_then(TransactionState::current_undo_token)
            .expect("active round");
        let req = FragmentExecRequest {
            fragment_ids: task.fragment_ids,
            param_blobs: task.param_blobs,
            input_deps,
            output_dep_ids: task.output_dep_ids,
            txn_id,
            last_committed_txn_id: self.last_committed_txn_id,
            undo_token,
        };
        match self.engine.execute_fragments(req) {
            Ok(outputs) => {
                let state = self.txns.get_mut(&txn_id).expect("active transaction");
                let mut promoted = Vec::new();
                for (dep_id, rows) in outputs {
                    promoted.extend(state.add_result(self.partition_id, dep_id, rows));
                }
                promoted
            }
            Err(e) => {
                self.txns
                    .get_mut(&txn_id)
                    .expect("active transaction")
                    .set_pending_error(ExecError::EeError(e.to_string()));
                Vec::new()
            }
        }
    }

    // ---- fragments dispatched here by another partition's round ----

    #[allow(clippy::too_many_arguments)]
    fn handle_remote_fragment(
        &mut self,
        txn_id: TransactionId,
        source_partition: PartitionId,
        fragment_ids: Vec<FragmentId>,
        param_blobs: Vec<ParamBlob>,
        input_dep_ids: Vec<DependencyId>,
        output_dep_ids: Vec<DependencyId>,
        attached_deps: Vec<(DependencyId, Rows)>,
        reply_to: CoordinatorReplyTo,
    ) {
        if !self.txns.contains_key(&txn_id) {
            let mut state = self.remote_pool.acquire();
            state.init_remote(
                txn_id,
                source_partition,
                partition_set_of([source_partition, self.partition_id]),
            );
            if let Some(remote) = state.as_remote_mut() {
                remote.coord_txn_id = Some(reply_to.coord_txn_id);
            }
            self.txns.insert(txn_id, state);
        }

        let undo_token = self.next_undo_token();
        self.txns
            .get_mut(&txn_id)
            .expect("just inserted or already present")
            .init_round(undo_token);

        let mut task = FragmentTask::new(self.partition_id);
        task.fragment_ids = fragment_ids;
        task.param_blobs = param_blobs;
        task.input_dep_ids = input_dep_ids;
        task.output_dep_ids = output_dep_ids.clone();
        self.txns
            .get_mut(&txn_id)
            .expect("just inserted or already present")
            .add_fragment_task(task.clone());

        let req = FragmentExecRequest {
            fragment_ids: task.fragment_ids,
            param_blobs: task.param_blobs,
            input_deps: attached_deps,
            output_dep_ids: output_dep_ids.clone(),
            txn_id,
            last_committed_txn_id: self.last_committed_txn_id,
            undo_token,
        };

        let resp = match self.engine.execute_fragments(req) {
            Ok(outputs) => {
                let dep_ids: Vec<DependencyId> = outputs.iter().map(|(id, _)| *id).collect();
                let state = self.txns.get_mut(&txn_id).expect("just inserted or already present");
                for (dep_id, rows) in outputs {
                    state.add_result(self.partition_id, dep_id, rows);
                }
                FragmentResponse::success(txn_id, self.partition_id, dep_ids)
            }
            Err(e) => {
                self.txns
                    .get_mut(&txn_id)
                    .expect("just inserted or already present")
                    .set_pending_error(ExecError::EeError(e.to_string()));
                FragmentResponse::failure(txn_id, self.partition_id, FragmentStatus::UnexpectedError, e.to_string())
            }
        };

        let rows = self
            .txns
            .get_mut(&txn_id)
            .expect("just inserted or already present")
            .finish_round();
        // A failed fragment has nothing legitimate to report: an empty
        // `Rows` for a dependency that never actually resolved would
        // read to the base partition as a valid empty response and
        // could satisfy its latch before the failure status arrives.
        // The `FragmentResponse`'s status alone carries the outcome.
        let paired_rows: Vec<(DependencyId, Rows)> = if resp.is_success() {
            output_dep_ids.into_iter().zip(rows).collect()
        } else {
            Vec::new()
        };

        if let Some(remote) = self
            .txns
            .get_mut(&txn_id)
            .expect("just inserted or already present")
            .as_remote_mut()
        {
            remote.work_cb.arm(1);
            remote.work_cb.on_response();
        }

        self.reply_sink.report(
            reply_to.origin_site,
            reply_to.sequence,
            reply_to.coord_txn_id,
            self.partition_id,
            source_partition,
            resp,
            paired_rows,
        );
    }

    fn handle_deliver_result(
        &mut self,
        txn_id: TransactionId,
        src_partition: PartitionId,
        dep_id: DependencyId,
        rows: Option<Rows>,
    ) {
        let Some(state) = self.txns.get_mut(&txn_id) else {
            return;
        };
        let promoted = match rows {
            Some(rows) => state.add_result(src_partition, dep_id, rows),
            None => state.add_response(src_partition, dep_id),
        };
        if !promoted.is_empty() {
            self.dispatch_tasks(txn_id, promoted);
        }
    }

    // ---- two-phase commit, both sides ----

    fn handle_prepare_request(&mut self, txn_id: TransactionId, origin_site: SiteId) {
        let ack = if self.txns.contains_key(&txn_id) {
            PrepareAck::Ready
        } else {
            PrepareAck::Refuse
        };
        if let Some(state) = self.txns.get_mut(&txn_id) {
            if let Some(remote) = state.as_remote_mut() {
                remote.prepare_cb.arm(1);
                remote.prepare_cb.on_response();
            }
        }
        if let Err(e) = self.messenger.send_prepare_response(
            origin_site,
            PrepareResponse {
                txn_id,
                partition_id: self.partition_id,
                ack,
            },
        ) {
            tracing::error!(target: "embergrid", error = %e, %txn_id, "failed to send prepare response");
        }
    }

    fn handle_prepare_response(&mut self, txn_id: TransactionId, ack: PrepareAck) {
        let Some(state) = self.txns.get_mut(&txn_id) else {
            return;
        };
        if ack == PrepareAck::Refuse {
            state.set_pending_error(ExecError::PrepareRefused);
        }
        if let Role::Local(l) = state.role_mut() {
            l.prepare_cb.on_response();
        }
    }

    fn handle_finish_request(&mut self, txn_id: TransactionId, decision: FinishDecision, origin_site: SiteId) {
        let Some(token) = self.txns.get(&txn_id).map(TransactionState::last_undo_token) else {
            tracing::warn!(target: "embergrid", %txn_id, "finish request for unknown transaction");
            return;
        };
        let outcome = match decision {
            FinishDecision::Commit => self.engine.release_undo_token(token),
            FinishDecision::Abort => {
                if token.is_none() {
                    Ok(())
                } else {
                    self.engine.undo_undo_token(token)
                }
            }
        };
        if let Err(e) = outcome {
            tracing::error!(target: "embergrid", error = %e, %txn_id, "finish request failed to apply");
        }
        if decision == FinishDecision::Commit {
            self.last_committed_txn_id = txn_id;
        }

        if let Err(e) = self.messenger.send_finish_response(
            origin_site,
            FinishResponse {
                txn_id,
                partition_id: self.partition_id,
            },
        ) {
            tracing::error!(target: "embergrid", error = %e, %txn_id, "failed to send finish response");
        }

        self.cleanup_transaction(txn_id);
    }

    fn handle_finish_response(&mut self, txn_id: TransactionId) {
        if let Some(state) = self.txns.get_mut(&txn_id) {
            if let Role::Local(l) = state.role_mut() {
                l.finish_cb.on_response();
            }
        }
    }

    fn next_undo_token(&mut self) -> UndoToken {
        let token = UndoToken(self.next_undo_token);
        self.next_undo_token += 1;
        token
    }
}

/// The `ExecutorContext` a running procedure body sees: a thin borrow of
/// the executor plus the one transaction id this call is scoped to. Built
/// fresh for every `StoredProcedure::call`, never stored.
struct ProcCtx<'a> {
    exec: &'a mut PartitionExecutor,
    txn_id: TransactionId,
}

impl ExecutorContext for ProcCtx<'_> {
    fn txn_id(&self) -> TransactionId {
        self.txn_id
    }

    fn base_partition(&self) -> PartitionId {
        self.exec.partition_id
    }

    fn is_predict_single_partition(&self) -> bool {
        self.exec
            .txns
            .get(&self.txn_id)
            .map(TransactionState::is_predict_single_partition)
            .unwrap_or(false)
    }

    fn wait_for_responses(&mut self, tasks: Vec<FragmentTask>) -> Result<Vec<Rows>, ExecError> {
        self.exec.wait_for_responses(self.txn_id, tasks)
    }
}
