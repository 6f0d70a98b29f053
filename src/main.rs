// # Coordinator Demo
//
// Drives a single fake query through the coordination state machine end to
// end against the loopback RPC double, printing the debug JSON at each
// terminal state. Not a server: query planning and the wire transport are
// out of scope for this crate.

use rusty_coord::coordination::exec_params::FilterRoutingEntry;
use rusty_coord::coordination::{
    AtomicProgressUpdater, BackendExecParams, BackendState, CoordinatorConfig, DebugOptions, ExecState,
    ExecStatusReport, ExecSummary, FInstanceExecParams, FilterRoutingTable, FragmentIdx, FragmentStats,
    InstanceExecStatus, LoopbackBackendClient, PlanFragment, PlanNode, ProfileArena, QueryId, RuntimeFilterMode,
    Status,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

struct EmptyRoutingTable;

impl FilterRoutingTable for EmptyRoutingTable {
    fn lookup(&self, _filter_id: u32) -> Option<&FilterRoutingEntry> {
        None
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).with_level(true).init();

    let arena = ProfileArena::new();
    let host = "127.0.0.1:28000".parse().unwrap();

    let mut fragment_stats: HashMap<FragmentIdx, Arc<FragmentStats>> = HashMap::new();
    fragment_stats.insert(0, Arc::new(FragmentStats::new("avg profile", "root profile", 1, &arena)));

    let instance_params = FInstanceExecParams {
        instance_id: Default::default(),
        instance_idx: 0,
        per_fragment_instance_idx: 0,
        host,
        fragment: PlanFragment {
            fragment_idx: 0,
            display_name: "demo-fragment".into(),
            plan_nodes: vec![PlanNode {
                node_id: 0,
                is_hash_join: false,
                runtime_filters: vec![],
            }],
            destinations: vec![],
        },
        per_node_scan_ranges: HashMap::new(),
        per_exch_num_senders: HashMap::new(),
        sender_id: 0,
    };
    let instance_id = instance_params.instance_id;

    let exec_params = BackendExecParams {
        query_id: QueryId::new(),
        instance_params: vec![instance_params],
        min_mem_reservation_bytes: 0,
        initial_mem_reservation_total_claims: 0,
    };

    let backend = BackendState::init(
        0,
        exec_params,
        RuntimeFilterMode::Off,
        CoordinatorConfig::default(),
        &fragment_stats,
        &arena,
    )
    .expect("init");

    let client = LoopbackBackendClient::new();
    let routing_table = EmptyRoutingTable;
    let barrier = tokio::sync::Barrier::new(1);
    let status = backend
        .exec(&DebugOptions::default(), &routing_table, &client, &barrier)
        .await;
    info!(?status, "exec completed");

    let exec_summary = ExecSummary::new();
    let progress = AtomicProgressUpdater::new();
    let report = ExecStatusReport {
        status: Status::Ok,
        instance_exec_status: vec![InstanceExecStatus {
            instance_id,
            status: Status::Ok,
            done: true,
            current_state: ExecState::Finished,
            profile_delta: Default::default(),
        }],
        error_log: Default::default(),
    };
    backend.apply_exec_status_report(&report, &exec_summary, &progress, &arena);

    backend.update_exec_stats(&arena, &fragment_stats);
    for fs in fragment_stats.values() {
        fs.add_split_stats(&arena);
        fs.add_exec_stats(&arena);
    }

    println!("{}", backend.to_json(&arena));
    println!("{}", backend.instance_stats_to_json(&arena));
}
