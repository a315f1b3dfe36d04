use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dashmap::DashMap;

use embergrid_base::{
    partition_set_of, ClientHandle, CoordTxnId, DependencyId, PartitionId, PartitionSet, Result,
    SiteId, TransactionId,
};
use embergrid_coord::CoordinatorInterface;
use embergrid_engine::{create_engine, BackendTarget};
use embergrid_exec::{ClientResponseSink, CoordinatorReplySink, PartitionExecutor, WorkItem};
use embergrid_net::{
    ClientResponse, ClientStatus, DependencySet, FragmentResponse, Messenger, ParamBlob, RecvFrame,
    Rows, Transport, WireBody, WorkBody, WorkMessage,
};
use embergrid_proc::ProcedureRegistry;

use crate::config::SiteConfig;
use crate::locator::PartitionDirectory;
use crate::pool_registry::PoolRegistry;
use crate::stats::{SiteSnapshot, Stats};

/// One hosted partition's thread and the handle the supervisor keeps on
/// it after spawning (spec §4.7: "per-process registry of partition
/// executors"). The executor itself never leaves its own thread; every
/// other field here is a clonable handle a supervisor method can use
/// without crossing that boundary.
struct PartitionHandle {
    queue: crossbeam_channel::Sender<WorkItem>,
    thread: Option<thread::JoinHandle<()>>,
}

/// One incoming `CoordinatorRequest`'s local share, tracked so the
/// combined `CoordinatorResponse` is sent exactly once every local
/// partition it named has reported in (spec §4.5: "a site may host
/// several of the destination partitions named by one request").
struct PendingAggregate {
    coord_txn_id: CoordTxnId,
    expected: usize,
    collected: Vec<(PartitionId, FragmentResponse)>,
}

/// A client request this site originated and is still waiting on, or
/// one it redirected to the site actually hosting the base partition
/// (spec §4.7 "redirecting if the request landed at the wrong site";
/// §4.3 `RedirectCallback`). `Local` holds the channel a synchronous
/// caller (`submit_and_wait`, or a test) blocks on; `Redirected` holds
/// the site the request was forwarded to, purely for observability --
/// the eventual `ClientResponse` comes back addressed to this site by
/// the remote supervisor and is matched by `txn_id` alone.
enum PendingClient {
    Local(crossbeam_channel::Sender<ClientResponse>),
    Redirected(SiteId),
}

/// The per-process registry of partition executors, object pools, and
/// the network messenger (spec §4.7). Owns every hosted partition's
/// thread, routes decoded wire frames to the right one, aggregates
/// cross-partition coordinator responses, and redirects a client
/// request that names a base partition some other site hosts.
pub struct SiteSupervisor {
    site_id: SiteId,
    messenger: Arc<Messenger>,
    coordinator: Arc<CoordinatorInterface>,
    locator: Arc<PartitionDirectory>,
    executors: HashMap<PartitionId, PartitionHandle>,
    pool_registry: PoolRegistry,
    stats: Arc<Stats>,
    next_txn_seq: AtomicU64,
    next_client_seq: AtomicU64,
    pending_coordinator: Arc<DashMap<(SiteId, u64), PendingAggregate>>,
    pending_clients: Arc<DashMap<TransactionId, PendingClient>>,
    router_stop: Arc<std::sync::atomic::AtomicBool>,
    router_thread: Option<thread::JoinHandle<()>>,
}

/// Reports a local partition's share of an incoming `CoordinatorRequest`
/// back to the site that sent it, aggregating every local partition the
/// request named before sending the combined `CoordinatorResponse`
/// (spec §4.5). Shared by every partition executor hosted at this site.
struct SupervisorReplySink {
    messenger: Arc<Messenger>,
    pending: Arc<DashMap<(SiteId, u64), PendingAggregate>>,
}

impl CoordinatorReplySink for SupervisorReplySink {
    fn report(
        &self,
        origin_site: SiteId,
        sequence: u64,
        coord_txn_id: CoordTxnId,
        partition_id: PartitionId,
        source_partition: PartitionId,
        resp: FragmentResponse,
        rows: Vec<(DependencyId, Rows)>,
    ) {
        if !rows.is_empty() {
            let _ = self.messenger.send_dependency_set(
                origin_site,
                DependencySet {
                    txn_id: resp.txn_id,
                    src_partition: partition_id,
                    dst_partition: source_partition,
                    deps: rows,
                },
            );
        }

        let key = (origin_site, sequence);
        let done = match self.pending.get_mut(&key) {
            Some(mut agg) => {
                agg.collected.push((partition_id, resp));
                agg.collected.len() >= agg.expected
            }
            None => {
                tracing::warn!(
                    target: "embergrid",
                    origin = %origin_site,
                    sequence,
                    "fragment response reported with no pending aggregate"
                );
                false
            }
        };
        if done {
            if let Some((_, agg)) = self.pending.remove(&key) {
                let coord_resp = CoordinatorInterface::build_response(coord_txn_id, agg.collected);
                if let Err(e) = self
                    .messenger
                    .send_coordinator_response(origin_site, sequence, coord_resp)
                {
                    tracing::error!(target: "embergrid", error = %e, "failed to send coordinator response");
                }
            }
        }
    }
}

/// Delivers a finished transaction's `ClientResponse` either to the
/// local caller still waiting on it or, if the request was redirected
/// in from another site, back across the wire to whichever site
/// forwarded it (spec §4.7, §4.3 `RedirectCallback`).
struct SupervisorClientSink {
    messenger: Arc<Messenger>,
    pending: Arc<DashMap<TransactionId, PendingClient>>,
    stats: Arc<Stats>,
}

impl ClientResponseSink for SupervisorClientSink {
    fn deliver(&self, resp: ClientResponse) {
        match resp.status {
            ClientStatus::Success => self.stats.record_committed(),
            ClientStatus::UserAbort => self.stats.record_aborted(),
            ClientStatus::Mispredict => self.stats.record_mispredicted(),
            ClientStatus::UnexpectedError => self.stats.record_aborted(),
        }
        match self.pending.remove(&resp.txn_id) {
            Some((_, PendingClient::Local(tx))) => {
                let _ = tx.send(resp);
            }
            Some((_, PendingClient::Redirected(origin))) => {
                if let Err(e) = self.messenger.send_client_response(origin, resp) {
                    tracing::error!(target: "embergrid", error = %e, "failed to relay redirected client response");
                }
            }
            None => {
                tracing::warn!(target: "embergrid", txn_id = %resp.txn_id, "client response for untracked transaction");
            }
        }
    }
}

impl SiteSupervisor {
    /// Builds every hosted partition's executor (spec §6 config knobs:
    /// pool idle caps, gc interval, procedure-pool default size, backend
    /// target), wires them to a shared messenger/coordinator/locator, but
    /// does not yet start any threads -- `register_procs` runs once per
    /// partition so callers can hand back distinct instances where a
    /// procedure needs partition-specific state.
    pub fn new(
        config: &SiteConfig,
        transport: Arc<dyn Transport>,
        register_procs: impl Fn(&mut ProcedureRegistry),
    ) -> Result<Self> {
        let site_id = config.site_id();
        let inbox = transport.register(site_id);
        let messenger = Arc::new(Messenger::new(site_id, transport, inbox));

        let locator = Arc::new(PartitionDirectory::from_entries(
            config.directory_map().into_iter(),
        ));
        let coordinator = Arc::new(CoordinatorInterface::new(messenger.clone(), locator.clone()));

        let pending_coordinator = Arc::new(DashMap::new());
        let pending_clients = Arc::new(DashMap::new());
        let stats = Arc::new(Stats::new());

        let reply_sink: Arc<dyn CoordinatorReplySink> = Arc::new(SupervisorReplySink {
            messenger: messenger.clone(),
            pending: pending_coordinator.clone(),
        });
        let client_sink: Arc<dyn ClientResponseSink> = Arc::new(SupervisorClientSink {
            messenger: messenger.clone(),
            pending: pending_clients.clone(),
            stats: stats.clone(),
        });

        let backend_target: BackendTarget = config.engine.backend_target.into();

        let mut pool_registry = PoolRegistry::new();
        let mut executors = HashMap::new();
        for partition_id in config.hosted_partitions() {
            locator.insert(partition_id, site_id);

            let mut procedures = ProcedureRegistry::new(config.pools.procedure_pool_default_size);
            register_procs(&mut procedures);

            let engine = create_engine(backend_target);
            let mut executor = PartitionExecutor::with_gc_config(
                partition_id,
                site_id,
                engine,
                procedures,
                coordinator.clone(),
                messenger.clone(),
                locator.clone(),
                reply_sink.clone(),
                client_sink.clone(),
                config.pools.idle_cap,
                Duration::from_secs(config.gc.interval_secs),
                config.gc.max_cleaned_per_poll,
            );

            for (name, pool) in executor.procedure_pool_handles() {
                pool_registry.register_pool(format!("{partition_id}/proc/{name}"), pool);
            }
            pool_registry.register_txn_pool(format!("{partition_id}/local"), executor.local_pool_handle());
            pool_registry.register_txn_pool(format!("{partition_id}/remote"), executor.remote_pool_handle());

            let handle = PartitionHandle {
                queue: executor.sender(),
                thread: Some(thread::spawn(move || {
                    pin_current_thread(partition_id);
                    executor.run();
                })),
            };
            executors.insert(partition_id, handle);
        }

        Ok(SiteSupervisor {
            site_id,
            messenger,
            coordinator,
            locator,
            executors,
            pool_registry,
            stats,
            next_txn_seq: AtomicU64::new(1),
            next_client_seq: AtomicU64::new(1),
            pending_coordinator,
            pending_clients,
            router_stop: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            router_thread: None,
        })
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    pub fn hosted_partitions(&self) -> Vec<PartitionId> {
        self.executors.keys().copied().collect()
    }

    /// Starts the router thread that drains the messenger's decoded
    /// frames and turns each into a `WorkItem` for the right hosted
    /// partition (or a coordinator-response/redirect-response handled
    /// at the supervisor level). Partition executor threads are already
    /// running once `new` returns; this only adds the piece that feeds
    /// them from the network.
    pub fn start(&mut self) {
        let messenger = self.messenger.clone();
        let locator = self.locator.clone();
        let coordinator = self.coordinator.clone();
        let pending_coordinator = self.pending_coordinator.clone();
        let pending_clients = self.pending_clients.clone();
        let stats = self.stats.clone();
        let site_id = self.site_id;
        let queues: HashMap<PartitionId, crossbeam_channel::Sender<WorkItem>> = self
            .executors
            .iter()
            .map(|(p, h)| (*p, h.queue.clone()))
            .collect();
        let stop = self.router_stop.clone();

        self.router_thread = Some(thread::spawn(move || {
            route_loop(
                site_id,
                &messenger,
                locator.as_ref(),
                &coordinator,
                &queues,
                &pending_coordinator,
                &pending_clients,
                &stats,
                &stop,
            );
        }));
    }

    fn mint_txn_id(&self) -> TransactionId {
        let seq = self.next_txn_seq.fetch_add(1, Ordering::Relaxed);
        // High 32 bits carry the minting site so transaction ids are
        // unique cluster-wide without a coordination round trip (spec
        // §3: "64-bit monotonic id"; monotonic per-minter is sufficient
        // since nothing outside this site ever compares two ids minted
        // elsewhere for ordering, only for equality).
        TransactionId(((self.site_id.0 as u64) << 32) | seq)
    }

    /// Submits a new transaction. If this site hosts `base_partition`,
    /// enqueues `Initiate` directly; otherwise redirects it over the
    /// wire to the site that does (spec §4.7 "redirecting if the
    /// request landed at the wrong site"). Returns a receiver the
    /// caller can block on for the eventual `ClientResponse`.
    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &self,
        base_partition: PartitionId,
        proc_name: impl Into<String>,
        params: ParamBlob,
        predicted_partition_set: PartitionSet,
        predicted_read_only: bool,
        abortable: bool,
    ) -> Result<crossbeam_channel::Receiver<ClientResponse>> {
        let txn_id = self.mint_txn_id();
        let client_handle = ClientHandle(self.next_client_seq.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = crossbeam_channel::unbounded();
        self.pending_clients.insert(txn_id, PendingClient::Local(tx));
        self.stats.record_initiated();

        let proc_name = proc_name.into();
        if let Some(handle) = self.executors.get(&base_partition) {
            let _ = handle.queue.send(WorkItem::Initiate {
                txn_id,
                client_handle,
                proc_name,
                params,
                predicted_partition_set,
                predicted_read_only,
                abortable,
            });
        } else {
            let dest_site = self
                .locator
                .site_of(base_partition)
                .ok_or_else(|| embergrid_base::err(format!("no site hosts partition {base_partition}")))?;
            self.pending_clients
                .insert(txn_id, PendingClient::Redirected(dest_site));
            let msg = WorkMessage {
                txn_id,
                source_partition: base_partition,
                body: WorkBody::Initiate {
                    base_partition,
                    client_handle,
                    proc_name,
                    params,
                },
            };
            self.messenger.send_redirect(dest_site, msg)?;
        }
        Ok(rx)
    }

    /// Convenience synchronous wrapper over `submit`, for the server
    /// binary's demo path and for tests that want a single blocking call.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_and_wait(
        &self,
        base_partition: PartitionId,
        proc_name: impl Into<String>,
        params: ParamBlob,
        predicted_partition_set: PartitionSet,
        predicted_read_only: bool,
        abortable: bool,
        timeout: Duration,
    ) -> Result<ClientResponse> {
        let rx = self.submit(
            base_partition,
            proc_name,
            params,
            predicted_partition_set,
            predicted_read_only,
            abortable,
        )?;
        rx.recv_timeout(timeout)
            .map_err(|_| embergrid_base::err("timed out waiting for client response"))
    }

    /// Every registered pool's stats plus the site-wide error/txn
    /// counters (spec §4.7 observability surface).
    pub fn snapshot(&self) -> SiteSnapshot {
        SiteSnapshot {
            stats: self.stats.snapshot(),
            pools: self.pool_registry.snapshot(),
        }
    }

    /// Flips the shutdown flag, poisons every hosted partition's queue,
    /// and joins every thread this supervisor owns (spec §5
    /// "Cancellation": "shutdown flips a flag and awakens the loop via a
    /// poison entry").
    pub fn shutdown(&mut self) {
        self.router_stop.store(true, Ordering::Relaxed);
        for handle in self.executors.values() {
            let _ = handle.queue.send(WorkItem::Shutdown);
        }
        for handle in self.executors.values_mut() {
            if let Some(t) = handle.thread.take() {
                if let Err(e) = t.join() {
                    tracing::error!(target: "embergrid", "partition executor thread panicked: {e:?}");
                }
            }
        }
        if let Some(t) = self.router_thread.take() {
            if let Err(e) = t.join() {
                tracing::error!(target: "embergrid", "router thread panicked: {e:?}");
            }
        }
    }
}

/// Pins the calling thread to the CPU matching its partition id modulo
/// the machine's core count (spec §5: one thread per partition,
/// optionally pinned). A failed `sched_setaffinity` call is logged and
/// otherwise ignored -- pinning is an optimization, not a correctness
/// requirement.
#[cfg(target_os = "linux")]
fn pin_current_thread(partition_id: PartitionId) {
    unsafe {
        let ncpus = libc::sysconf(libc::_SC_NPROCESSORS_ONLN);
        if ncpus <= 0 {
            return;
        }
        let cpu = (partition_id.0 as usize) % (ncpus as usize);
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(cpu, &mut set);
        let rc = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if rc != 0 {
            tracing::warn!(target: "embergrid", partition = %partition_id, cpu, "sched_setaffinity failed");
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_current_thread(_partition_id: PartitionId) {}

impl Drop for SiteSupervisor {
    fn drop(&mut self) {
        if self.router_thread.is_some() || self.executors.values().any(|h| h.thread.is_some()) {
            self.shutdown();
        }
    }
}

/// Decodes whatever frames have arrived at this site and turns each
/// into a `WorkItem` for the hosted partition it addresses, or handles
/// it directly at the supervisor level (a paired `CoordinatorResponse`,
/// or an incoming `Redirect` naming a partition this site hosts).
#[allow(clippy::too_many_arguments)]
fn route_loop(
    my_site: SiteId,
    messenger: &Messenger,
    locator: &PartitionDirectory,
    coordinator: &CoordinatorInterface,
    queues: &HashMap<PartitionId, crossbeam_channel::Sender<WorkItem>>,
    pending_coordinator: &DashMap<(SiteId, u64), PendingAggregate>,
    pending_clients: &DashMap<TransactionId, PendingClient>,
    stats: &Stats,
    stop: &std::sync::atomic::AtomicBool,
) {
    use std::sync::atomic::Ordering as AtomicOrdering;

    while !stop.load(AtomicOrdering::Relaxed) {
        for frame in messenger.poll_timeout(Duration::from_millis(100)) {
            match frame {
                RecvFrame::Single(frame) => {
                    let src = frame.src;
                    match frame.body {
                        WireBody::CoordinatorRequest(req) => {
                            match CoordinatorInterface::split_for_local(&req, locator, my_site) {
                                Ok(local) => {
                                    pending_coordinator.insert(
                                        (src, frame.sequence),
                                        PendingAggregate {
                                            coord_txn_id: req.coord_txn_id,
                                            expected: local.len(),
                                            collected: Vec::new(),
                                        },
                                    );
                                    for (partition_id, work) in local {
                                        dispatch_fragment(queues, src, frame.sequence, req.coord_txn_id, partition_id, work);
                                    }
                                }
                                Err(e) => tracing::error!(target: "embergrid", error = %e, "failed to split coordinator request"),
                            }
                        }
                        WireBody::DependencySet(deps) => {
                            if let Some(tx) = queues.get(&deps.dst_partition) {
                                for (dep_id, rows) in deps.deps {
                                    let _ = tx.send(WorkItem::DeliverResult {
                                        txn_id: deps.txn_id,
                                        src_partition: deps.src_partition,
                                        dep_id,
                                        rows: Some(rows),
                                    });
                                }
                            }
                        }
                        WireBody::PrepareRequest(req) => {
                            if let Some(tx) = queues.get(&req.partition_id) {
                                let _ = tx.send(WorkItem::PrepareRequest {
                                    txn_id: req.txn_id,
                                    origin_site: src,
                                });
                            }
                        }
                        WireBody::PrepareResponse(resp) => {
                            if let Some(tx) = queues.get(&resp.partition_id) {
                                let _ = tx.send(WorkItem::PrepareResponse {
                                    txn_id: resp.txn_id,
                                    ack: resp.ack,
                                });
                            }
                        }
                        WireBody::FinishRequest(req) => {
                            if let Some(tx) = queues.get(&req.partition_id) {
                                let _ = tx.send(WorkItem::FinishRequest {
                                    txn_id: req.txn_id,
                                    decision: req.decision,
                                    origin_site: src,
                                });
                            }
                        }
                        WireBody::FinishResponse(resp) => {
                            if let Some(tx) = queues.get(&resp.partition_id) {
                                let _ = tx.send(WorkItem::FinishResponse { txn_id: resp.txn_id });
                            }
                        }
                        WireBody::Redirect(msg) => {
                            if let WorkBody::Initiate {
                                base_partition,
                                client_handle,
                                proc_name,
                                params,
                            } = msg.body
                            {
                                if let Some(tx) = queues.get(&base_partition) {
                                    pending_clients.insert(msg.txn_id, PendingClient::Redirected(src));
                                    stats.record_initiated();
                                    let _ = tx.send(WorkItem::Initiate {
                                        txn_id: msg.txn_id,
                                        client_handle,
                                        proc_name,
                                        params,
                                        predicted_partition_set: partition_set_of([base_partition]),
                                        predicted_read_only: false,
                                        abortable: true,
                                    });
                                } else {
                                    tracing::error!(
                                        target: "embergrid",
                                        partition = %base_partition,
                                        "redirected transaction names a partition this site doesn't host"
                                    );
                                }
                            }
                        }
                        WireBody::ClientResponse(resp) => {
                            if let Some((_, PendingClient::Local(tx))) = pending_clients.remove(&resp.txn_id) {
                                let _ = tx.send(resp);
                            }
                        }
                        WireBody::Work(_) | WireBody::FragmentResponse(_) => {
                            // `Work` only ever travels as the payload of a
                            // `Redirect` or inside a `CoordinatorRequest`'s
                            // opaque `PartitionFragment::work` in this
                            // protocol; a bare `FragmentResponse` never
                            // crosses the wire unpaired with its
                            // `CoordinatorResponse`.
                        }
                    }
                }
                RecvFrame::Paired { req, res } => {
                    if let WireBody::CoordinatorResponse(resp) = res.body {
                        if let Some((txn_id, source_partition, partition_responses)) =
                            coordinator.complete(req.sequence, resp)
                        {
                            if let Some(tx) = queues.get(&source_partition) {
                                for (partition_id, presp) in partition_responses {
                                    if presp.is_success() {
                                        // Rows (if any) already arrived via a
                                        // `DependencySet`; every declared
                                        // output dep id still needs this
                                        // metadata ack so a dependency that
                                        // resolved with zero rows still
                                        // satisfies its latch (spec §4.2
                                        // `addResponse`, §4.5). Harmless to
                                        // repeat for a dep id that also got
                                        // rows -- `add_response` is a no-op
                                        // once a producer has already
                                        // responded.
                                        for dep_id in presp.dep_id_list {
                                            let _ = tx.send(WorkItem::DeliverResult {
                                                txn_id,
                                                src_partition: partition_id,
                                                dep_id,
                                                rows: None,
                                            });
                                        }
                                    } else {
                                        let message = presp
                                            .wrapped_error
                                            .clone()
                                            .unwrap_or_else(|| "remote fragment failed".to_string());
                                        let _ = tx.send(WorkItem::RemoteFragmentError { txn_id, message });
                                    }
                                }
                            }
                        }
                    }
                }
                RecvFrame::NoFrames => {}
            }
        }
    }
}

/// Turns one partition's share of a decoded `CoordinatorRequest` (a
/// `WorkMessage` whose body is always `WorkBody::Fragment`, per
/// `CoordinatorInterface::split_for_local`) into a `WorkItem::Fragment`
/// and hands it to that partition's queue.
fn dispatch_fragment(
    queues: &HashMap<PartitionId, crossbeam_channel::Sender<WorkItem>>,
    origin_site: SiteId,
    sequence: u64,
    coord_txn_id: CoordTxnId,
    partition_id: PartitionId,
    work: WorkMessage,
) {
    let WorkBody::Fragment {
        fragment_ids,
        param_blobs,
        input_dep_ids,
        output_dep_ids,
        attached_deps,
        ..
    } = work.body
    else {
        tracing::error!(target: "embergrid", "coordinator request carried a non-fragment work body");
        return;
    };
    if let Some(tx) = queues.get(&partition_id) {
        let _ = tx.send(WorkItem::Fragment {
            txn_id: work.txn_id,
            source_partition: work.source_partition,
            fragment_ids,
            param_blobs,
            input_dep_ids,
            output_dep_ids,
            attached_deps,
            reply_to: embergrid_exec::CoordinatorReplyTo {
                origin_site,
                sequence,
                coord_txn_id,
            },
        });
    }
}
