// # BackendState
//
// Per-backend lifecycle: exec RPC, status aggregation, cancellation, filter
// publishing. Grounded directly on `coordinator-backend-state.cc`'s
// `BackendState` class — `Init`, `Exec`/`SetRpcParams`,
// `ApplyExecStatusReport`, `Cancel`, `PublishFilter`, the snapshot
// accessors, and the two `ToJson` variants.

use crate::coordination::clock::Stopwatch;
use crate::coordination::config::CoordinatorConfig;
use crate::coordination::exec_params::{BackendExecParams, DebugOptions, FilterRoutingTable};
use crate::coordination::exec_summary::ExecSummary;
use crate::coordination::fragment_stats::FragmentStats;
use crate::coordination::instance_stats::InstanceStats;
use crate::coordination::profile::ProfileArena;
use crate::coordination::progress::ProgressUpdater;
use crate::coordination::report::{merge_error_maps, ErrorLogMap, ExecStatusReport};
use crate::coordination::rpc::{
    BackendClient, CancelQueryRequest, FragmentCtx, InstanceCtx, PublishFilterRequest,
    StartQueryRequest, PROTOCOL_VERSION,
};
use crate::coordination::status::{CoordError, Status};
use crate::coordination::types::{FragmentIdx, InstanceId, QueryId, RuntimeFilterMode};
use crate::error::DbError;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-instance CPU/memory/IO totals, mergeable the way the original merges
/// them across instances (`ResourceUtilization::Merge`): sums accumulate,
/// the per-host peak takes the max of equal-by-construction per-host values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceUtilization {
    pub cpu_user_ns: i64,
    pub cpu_sys_ns: i64,
    pub bytes_read: i64,
    pub peak_per_host_mem: i64,
}

impl ResourceUtilization {
    pub fn merge(&mut self, other: ResourceUtilization) {
        self.cpu_user_ns += other.cpu_user_ns;
        self.cpu_sys_ns += other.cpu_sys_ns;
        self.bytes_read += other.bytes_read;
        self.peak_per_host_mem = self.peak_per_host_mem.max(other.peak_per_host_mem);
    }
}

struct BackendStateInner {
    instance_stats: Vec<InstanceStats>,
    instance_idx_by_id: HashMap<InstanceId, usize>,
    fragments: HashSet<FragmentIdx>,
    num_remaining_instances: usize,
    status: Status,
    failed_instance_id: Option<InstanceId>,
    is_fragment_failure: bool,
    rpc_sent: bool,
    rpc_latency_ns: i64,
    last_report_time_ms: i64,
    error_log: ErrorLogMap,
}

impl BackendStateInner {
    fn is_done(&self) -> bool {
        self.num_remaining_instances == 0 || !self.status.is_ok()
    }
}

/// One participating worker's portion of a query. Every instance hosted
/// here shares `host` — validated at `init` and never revisited.
pub struct BackendState {
    state_idx: usize,
    host: SocketAddr,
    exec_params: BackendExecParams,
    filter_mode: RuntimeFilterMode,
    config: CoordinatorConfig,
    stopwatch: Stopwatch,
    inner: Mutex<BackendStateInner>,
}

impl BackendState {
    /// Synchronous setup: validates the shared-host invariant, registers one
    /// `InstanceStats` per assigned instance as a child of its fragment's
    /// root profile, and seeds `num_remaining_instances`. Must run exactly
    /// once before any other operation.
    pub fn init(
        state_idx: usize,
        exec_params: BackendExecParams,
        filter_mode: RuntimeFilterMode,
        config: CoordinatorConfig,
        fragment_stats: &HashMap<FragmentIdx, Arc<FragmentStats>>,
        arena: &ProfileArena,
    ) -> Result<Self, DbError> {
        let first = exec_params
            .instance_params
            .first()
            .ok_or_else(|| DbError::InvalidInput("BackendState requires at least one instance".into()))?;
        let host = first.host;

        let mut fragments = HashSet::new();
        let mut instance_stats = Vec::with_capacity(exec_params.instance_params.len());
        let mut instance_idx_by_id = HashMap::with_capacity(exec_params.instance_params.len());

        for params in &exec_params.instance_params {
            if params.host != host {
                return Err(DbError::InvalidInput(format!(
                    "instance {} host {} does not match backend host {}",
                    params.instance_id, params.host, host
                )));
            }
            fragments.insert(params.fragment_idx());
            let fs = fragment_stats.get(&params.fragment_idx()).ok_or_else(|| {
                DbError::InvalidInput(format!("no FragmentStats for fragment {}", params.fragment_idx()))
            })?;
            let instance_id = params.instance_id;
            instance_idx_by_id.insert(instance_id, instance_stats.len());
            instance_stats.push(InstanceStats::new(params.clone(), fs, arena));
        }

        let num_remaining_instances = instance_stats.len();
        info!(state_idx, %host, num_instances = num_remaining_instances, "backend state initialized");

        Ok(Self {
            state_idx,
            host,
            exec_params,
            filter_mode,
            config,
            stopwatch: Stopwatch::new(),
            inner: Mutex::new(BackendStateInner {
                instance_stats,
                instance_idx_by_id,
                fragments,
                num_remaining_instances,
                status: Status::Ok,
                failed_instance_id: None,
                is_fragment_failure: false,
                rpc_sent: false,
                rpc_latency_ns: 0,
                last_report_time_ms: 0,
                error_log: ErrorLogMap::new(),
            }),
        })
    }

    pub fn state_idx(&self) -> usize {
        self.state_idx
    }

    pub fn host(&self) -> SocketAddr {
        self.host
    }

    pub fn query_id(&self) -> QueryId {
        self.exec_params.query_id
    }

    /// Builds the StartQuery RPC payload, pruning each hash-join node's
    /// runtime filters to those present in the routing table and sourced by
    /// this instance. Requires `mt_dop == 0`, matching the original's
    /// `DCHECK_EQ`: the per-instance source check is not valid once a
    /// fragment can run multiple instances per backend.
    pub fn build_start_query_params(
        &self,
        debug_options: &DebugOptions,
        routing_table: &dyn FilterRoutingTable,
    ) -> StartQueryRequest {
        debug_assert_eq!(self.config.mt_dop, 0, "filter pruning is not valid for mt_dop != 0");

        let mut fragment_ctxs = Vec::new();
        let mut seen_fragments = HashSet::new();
        let mut instance_ctxs = Vec::new();

        for params in &self.exec_params.instance_params {
            if seen_fragments.insert(params.fragment_idx()) {
                let mut plan_nodes = params.fragment.plan_nodes.clone();
                if self.filter_mode != RuntimeFilterMode::Off {
                    for node in &mut plan_nodes {
                        if !node.is_hash_join {
                            continue;
                        }
                        node.runtime_filters.retain(|f| match routing_table.lookup(f.filter_id) {
                            Some(entry) => entry.src_fragment_instance_idxs.contains(&params.instance_idx),
                            None => false,
                        });
                    }
                }
                fragment_ctxs.push(FragmentCtx {
                    fragment_idx: params.fragment_idx(),
                    plan_nodes,
                    destinations: params.fragment.destinations.clone(),
                });
            }

            let per_node_scan_ranges = params
                .per_node_scan_ranges
                .iter()
                .map(|(node_id, ranges)| (*node_id, ranges.iter().map(|r| r.length).collect()))
                .collect();

            instance_ctxs.push(InstanceCtx {
                fragment_idx: params.fragment_idx(),
                instance_id: params.instance_id,
                per_fragment_instance_idx: params.per_fragment_instance_idx,
                per_node_scan_ranges,
                per_exch_num_senders: params.per_exch_num_senders.clone(),
                sender_id: params.sender_id,
                debug_options: debug_options.applies_to(params.instance_idx).then(|| debug_options.clone()),
            });
        }

        StartQueryRequest {
            protocol_version: PROTOCOL_VERSION,
            coord_state_idx: self.state_idx,
            min_mem_reservation_bytes: self.exec_params.min_mem_reservation_bytes,
            initial_mem_reservation_total_claims: self.exec_params.initial_mem_reservation_total_claims,
            fragment_ctxs,
            instance_ctxs,
        }
    }

    /// Sends the start-query RPC and records the outcome. Guaranteed to
    /// signal `barrier` on every exit path. Holds the backend lock across
    /// the RPC call, matching the original: this guards against a progress
    /// report arriving before Exec finishes its own bookkeeping.
    pub async fn exec(
        &self,
        debug_options: &DebugOptions,
        routing_table: &dyn FilterRoutingTable,
        client: &dyn BackendClient,
        barrier: &tokio::sync::Barrier,
    ) -> Status {
        let request = self.build_start_query_params(debug_options, routing_table);
        let started = Stopwatch::new();

        let mut guard = self.inner.lock();
        let result = client.start_query(self.host, request).await;
        let latency_ns = started.elapsed_ns();
        guard.rpc_sent = true;
        guard.rpc_latency_ns = latency_ns;

        match result {
            Ok(resp) if resp.ok => {
                info!(state_idx = self.state_idx, %self.host, "exec rpc succeeded");
            }
            Ok(resp) => {
                warn!(state_idx = self.state_idx, %self.host, msg = %resp.message, "exec rpc returned non-ok");
                guard.status.merge(Status::Error(CoordError::Expected(resp.message)));
            }
            Err(e) => {
                warn!(state_idx = self.state_idx, %self.host, error = %e, "exec rpc failed");
                guard.status.merge(Status::Error(CoordError::Expected(e.to_string())));
            }
        }
        let status = guard.status.clone();
        drop(guard);

        barrier.wait().await;
        status
    }

    /// Applies one asynchronous progress report. `exec_summary`'s lock is
    /// always acquired before this backend's own lock — the one documented
    /// fixed lock order in the core. Returns the new value of `IsDone`.
    pub fn apply_exec_status_report(
        &self,
        report: &ExecStatusReport,
        exec_summary: &ExecSummary,
        scan_range_progress: &dyn ProgressUpdater,
        arena: &ProfileArena,
    ) -> bool {
        let mut summary_guard = exec_summary.lock();
        let mut guard = self.inner.lock();

        if guard.is_done() {
            debug!(state_idx = self.state_idx, "ignoring report: backend already done");
            return false;
        }

        for instance_report in &report.instance_exec_status {
            let Some(&idx) = guard.instance_idx_by_id.get(&instance_report.instance_id) else {
                warn!(
                    state_idx = self.state_idx,
                    instance_id = %instance_report.instance_id,
                    "report for unknown instance ignored"
                );
                continue;
            };
            if guard.instance_stats[idx].done() {
                continue;
            }

            let instance_status =
                guard.instance_stats[idx].update(instance_report, arena, &mut summary_guard, scan_range_progress);

            if !instance_status.is_ok() && (guard.status.is_ok() || guard.status.is_cancelled()) {
                guard.status.merge(instance_status);
                guard.failed_instance_id = Some(instance_report.instance_id);
                guard.is_fragment_failure = true;
            }

            if instance_report.done && guard.instance_stats[idx].done() {
                guard.num_remaining_instances = guard.num_remaining_instances.saturating_sub(1);
            }
        }

        if !report.status.is_ok() && (guard.status.is_ok() || guard.status.is_cancelled()) {
            guard.status.merge(report.status.clone());
        }

        merge_error_maps(&report.error_log, &mut guard.error_log);
        guard.last_report_time_ms = self.stopwatch.elapsed_ns() / 1_000_000;

        let done = guard.is_done();
        if done {
            info!(state_idx = self.state_idx, status = %guard.status.text(), "backend reached terminal state");
        }
        done
    }

    /// Best-effort, idempotent cancellation. Returns true iff a cancel RPC
    /// attempt was made (regardless of outcome).
    pub async fn cancel(&self, client: &dyn BackendClient, debug_options: &DebugOptions) -> bool {
        {
            let mut guard = self.inner.lock();
            if !guard.rpc_sent || guard.is_done() {
                return false;
            }
            if guard.status.is_ok() {
                guard.status.merge(Status::Cancelled);
            }
        }

        let query_id = self.query_id();
        let mut final_status = Status::Ok;
        for attempt in 1..=self.config.cancel_max_attempts {
            if debug_options.enabled {
                debug!(state_idx = self.state_idx, attempt, "cancel debug hook invoked");
            }
            match client
                .cancel_query(
                    self.host,
                    CancelQueryRequest {
                        protocol_version: PROTOCOL_VERSION,
                        query_id,
                    },
                )
                .await
            {
                Ok(_) => {
                    final_status = Status::Ok;
                    break;
                }
                Err(e) => {
                    warn!(state_idx = self.state_idx, attempt, error = %e, "cancel rpc attempt failed");
                    final_status = Status::Error(CoordError::Expected(e.to_string()));
                }
            }
        }

        let mut guard = self.inner.lock();
        guard.status.merge(final_status);
        true
    }

    /// No-op if already done or if this backend does not host the addressed
    /// fragment. A failed publish is logged and otherwise ignored: runtime
    /// filters are a performance optimization, not a correctness requirement.
    pub async fn publish_filter(&self, req: PublishFilterRequest, client: &dyn BackendClient) {
        {
            let guard = self.inner.lock();
            if guard.is_done() || !guard.fragments.contains(&req.dst_fragment_idx) {
                return;
            }
        }
        if let Err(e) = client.publish_filter(self.host, req).await {
            warn!(state_idx = self.state_idx, error = %e, "publish filter failed");
        }
    }

    pub fn get_status(&self) -> Status {
        self.inner.lock().status.clone()
    }

    pub fn is_done(&self) -> bool {
        self.inner.lock().is_done()
    }

    pub fn num_remaining_instances(&self) -> usize {
        self.inner.lock().num_remaining_instances
    }

    pub fn failed_instance_id(&self) -> Option<InstanceId> {
        self.inner.lock().failed_instance_id
    }

    pub fn is_fragment_failure(&self) -> bool {
        self.inner.lock().is_fragment_failure
    }

    pub fn compute_resource_utilization(&self, arena: &ProfileArena) -> ResourceUtilization {
        let guard = self.inner.lock();
        let mut total = ResourceUtilization::default();
        for stats in &guard.instance_stats {
            for node in arena.all_descendants(stats.profile()).into_iter().chain([stats.profile()]) {
                total.cpu_user_ns += arena
                    .get_counter(node, crate::coordination::profile::TOTAL_THREADS_USER_TIME_COUNTER)
                    .unwrap_or(0);
                total.cpu_sys_ns += arena
                    .get_counter(node, crate::coordination::profile::TOTAL_THREADS_SYS_TIME_COUNTER)
                    .unwrap_or(0);
                total.bytes_read += arena
                    .get_counter(node, crate::coordination::profile::BYTES_READ_COUNTER)
                    .unwrap_or(0);
                if let Some(mem) = arena.get_counter(node, crate::coordination::profile::PER_HOST_PEAK_MEM_COUNTER) {
                    total.peak_per_host_mem = total.peak_per_host_mem.max(mem);
                }
            }
        }
        total
    }

    pub fn merge_error_log(&self, dst: &mut ErrorLogMap) {
        let guard = self.inner.lock();
        merge_error_maps(&guard.error_log, dst);
    }

    /// After every `BackendState` is terminal, folds each instance's
    /// completion time into its owning `FragmentStats`.
    pub fn update_exec_stats(&self, arena: &ProfileArena, fragment_stats: &HashMap<FragmentIdx, Arc<FragmentStats>>) {
        let guard = self.inner.lock();
        for stats in &guard.instance_stats {
            if let Some(fs) = fragment_stats.get(&stats.exec_params.fragment_idx()) {
                fs.record_instance_completion(
                    arena,
                    stats.profile(),
                    self.stopwatch.elapsed_ns(),
                    stats.total_split_size(),
                );
            }
        }
    }

    pub fn to_json(&self, arena: &ProfileArena) -> serde_json::Value {
        let guard = self.inner.lock();
        let mut util = ResourceUtilization::default();
        for stats in &guard.instance_stats {
            util.bytes_read += arena
                .get_counter(stats.profile(), crate::coordination::profile::BYTES_READ_COUNTER)
                .unwrap_or(0);
            if let Some(mem) = arena.get_counter(stats.profile(), crate::coordination::profile::PER_HOST_PEAK_MEM_COUNTER) {
                util.peak_per_host_mem = util.peak_per_host_mem.max(mem);
            }
        }
        json!({
            "num_instances": guard.instance_stats.len(),
            "done": guard.is_done(),
            "peak_per_host_mem_consumption": util.peak_per_host_mem,
            "bytes_read": util.bytes_read,
            "cpu_user_s": guard_cpu_seconds(&guard, arena, crate::coordination::profile::TOTAL_THREADS_USER_TIME_COUNTER),
            "cpu_sys_s": guard_cpu_seconds(&guard, arena, crate::coordination::profile::TOTAL_THREADS_SYS_TIME_COUNTER),
            "host": self.host.to_string(),
            "rpc_latency_ns": guard.rpc_latency_ns,
            "time_since_last_heard_from_ms": self.stopwatch.elapsed_ns() / 1_000_000 - guard.last_report_time_ms,
            "status": guard.status.text(),
            "num_remaining_instances": guard.num_remaining_instances,
        })
    }

    pub fn instance_stats_to_json(&self, arena: &ProfileArena) -> serde_json::Value {
        let guard = self.inner.lock();
        let arr: Vec<serde_json::Value> = guard.instance_stats.iter().map(|s| s.to_json(arena)).collect();
        serde_json::Value::Array(arr)
    }
}

fn guard_cpu_seconds(guard: &BackendStateInner, arena: &ProfileArena, counter: &str) -> f64 {
    let mut total = 0i64;
    for stats in &guard.instance_stats {
        total += arena.get_counter(stats.profile(), counter).unwrap_or(0);
    }
    total as f64 / 1.0e9
}

/// Debug helper: locks each backend in turn and logs the first not-done one.
/// Never holds more than one lock at a time.
pub fn log_first_in_progress(backends: &[Arc<BackendState>]) {
    for b in backends {
        if !b.is_done() {
            info!(state_idx = b.state_idx(), host = %b.host(), "first backend still in progress");
            return;
        }
    }
}
