// Backend State Integration Tests
// Exercises the six named scenarios for the per-backend coordination state
// machine against the loopback RPC double.

use rusty_coord::coordination::exec_params::{FilterRoutingEntry, ScanRangeKind, ScanRangeSpec};
use rusty_coord::coordination::{
    AtomicProgressUpdater, BackendExecParams, BackendState, CoordError, CoordinatorConfig, DebugOptions, ExecState,
    ExecStatusReport, ExecSummary, FInstanceExecParams, FragmentIdx, FragmentStats, InstanceExecStatus, InstanceId,
    LoopbackBackendClient, PlanFragment, PlanNode, ProfileArena, QueryId, RuntimeFilterMode, Status,
};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

fn host() -> SocketAddr {
    "10.0.0.1:27000".parse().unwrap()
}

fn setup_backend(num_instances: usize) -> (Arc<BackendState>, ProfileArena, HashMap<FragmentIdx, Arc<FragmentStats>>) {
    let arena = ProfileArena::new();
    let mut fragment_stats = HashMap::new();
    fragment_stats.insert(0, Arc::new(FragmentStats::new("avg", "root", num_instances, &arena)));

    let mut instance_params = Vec::new();
    for i in 0..num_instances {
        let mut scan_ranges = HashMap::new();
        scan_ranges.insert(
            0,
            vec![ScanRangeSpec {
                kind: ScanRangeKind::FileSplit,
                length: 4096,
            }],
        );
        instance_params.push(FInstanceExecParams {
            instance_id: InstanceId::new(),
            instance_idx: i,
            per_fragment_instance_idx: i,
            host: host(),
            fragment: PlanFragment {
                fragment_idx: 0,
                display_name: "scan-fragment".into(),
                plan_nodes: vec![PlanNode {
                    node_id: 0,
                    is_hash_join: true,
                    runtime_filters: vec![
                        rusty_coord::coordination::exec_params::RuntimeFilterDesc {
                            filter_id: 1,
                            is_broadcast_join: true,
                        },
                        rusty_coord::coordination::exec_params::RuntimeFilterDesc {
                            filter_id: 2,
                            is_broadcast_join: true,
                        },
                        rusty_coord::coordination::exec_params::RuntimeFilterDesc {
                            filter_id: 3,
                            is_broadcast_join: false,
                        },
                    ],
                }],
                destinations: vec![],
            },
            per_node_scan_ranges: scan_ranges,
            per_exch_num_senders: HashMap::new(),
            sender_id: 0,
        });
    }
    let exec_params = BackendExecParams {
        query_id: QueryId::new(),
        instance_params,
        min_mem_reservation_bytes: 0,
        initial_mem_reservation_total_claims: 0,
    };
    let backend = BackendState::init(
        0,
        exec_params,
        RuntimeFilterMode::Global,
        CoordinatorConfig::default(),
        &fragment_stats,
        &arena,
    )
    .expect("init should succeed for a uniform-host assignment");
    (backend, arena, fragment_stats)
}

fn instance_ids(backend: &BackendState, arena: &ProfileArena) -> Vec<InstanceId> {
    let json = backend.instance_stats_to_json(arena);
    json.as_array()
        .unwrap()
        .iter()
        .map(|v| {
            let s = v["instance_id"].as_str().unwrap();
            let (hi, lo) = s.split_once(':').unwrap();
            InstanceId(u64::from_str_radix(hi, 16).unwrap(), u64::from_str_radix(lo, 16).unwrap())
        })
        .collect()
}

fn ok_report(instance_id: InstanceId) -> ExecStatusReport {
    ExecStatusReport {
        status: Status::Ok,
        instance_exec_status: vec![InstanceExecStatus {
            instance_id,
            status: Status::Ok,
            done: true,
            current_state: ExecState::Finished,
            profile_delta: Default::default(),
        }],
        error_log: Default::default(),
    }
}

#[tokio::test]
async fn happy_path_three_instances() {
    let (backend, arena, _fs) = setup_backend(3);
    let client = LoopbackBackendClient::new();
    let routing_table: HashMap<u32, FilterRoutingEntry> = HashMap::new();
    let barrier = tokio::sync::Barrier::new(1);
    let status = backend
        .exec(&DebugOptions::default(), &routing_table, &client, &barrier)
        .await;
    assert!(status.is_ok());

    let exec_summary = ExecSummary::new();
    let progress = AtomicProgressUpdater::new();
    for id in instance_ids(&backend, &arena) {
        backend.apply_exec_status_report(&ok_report(id), &exec_summary, &progress, &arena);
    }

    assert!(backend.is_done());
    assert_eq!(backend.get_status(), Status::Ok);
    assert_eq!(backend.num_remaining_instances(), 0);
}

#[tokio::test]
async fn instance_failure_becomes_query_root_cause() {
    let (backend, arena, _fs) = setup_backend(3);
    let client = LoopbackBackendClient::new();
    let routing_table: HashMap<u32, FilterRoutingEntry> = HashMap::new();
    let barrier = tokio::sync::Barrier::new(1);
    backend
        .exec(&DebugOptions::default(), &routing_table, &client, &barrier)
        .await;

    let exec_summary = ExecSummary::new();
    let progress = AtomicProgressUpdater::new();
    let ids = instance_ids(&backend, &arena);

    let failing_report = ExecStatusReport {
        status: Status::Ok,
        instance_exec_status: vec![InstanceExecStatus {
            instance_id: ids[0],
            status: Status::Error(CoordError::InstanceFatal("IO_ERROR".into())),
            done: true,
            current_state: ExecState::Finished,
            profile_delta: Default::default(),
        }],
        error_log: Default::default(),
    };
    backend.apply_exec_status_report(&failing_report, &exec_summary, &progress, &arena);

    for &id in &ids[1..] {
        let cancelled_report = ExecStatusReport {
            status: Status::Ok,
            instance_exec_status: vec![InstanceExecStatus {
                instance_id: id,
                status: Status::Cancelled,
                done: true,
                current_state: ExecState::Finished,
                profile_delta: Default::default(),
            }],
            error_log: Default::default(),
        };
        backend.apply_exec_status_report(&cancelled_report, &exec_summary, &progress, &arena);
    }

    assert!(backend.is_done());
    assert!(matches!(backend.get_status(), Status::Error(CoordError::InstanceFatal(_))));
    assert_eq!(backend.failed_instance_id(), Some(ids[0]));
    assert!(backend.is_fragment_failure());
}

#[tokio::test]
async fn cancel_races_report_error_wins() {
    let (backend, arena, _fs) = setup_backend(1);
    let client = LoopbackBackendClient::new();
    let routing_table: HashMap<u32, FilterRoutingEntry> = HashMap::new();
    let barrier = tokio::sync::Barrier::new(1);
    backend
        .exec(&DebugOptions::default(), &routing_table, &client, &barrier)
        .await;

    let exec_summary = ExecSummary::new();
    let progress = AtomicProgressUpdater::new();
    let id = instance_ids(&backend, &arena)[0];

    let oom_report = ExecStatusReport {
        status: Status::Ok,
        instance_exec_status: vec![InstanceExecStatus {
            instance_id: id,
            status: Status::Error(CoordError::InstanceFatal("OOM".into())),
            done: true,
            current_state: ExecState::Finished,
            profile_delta: Default::default(),
        }],
        error_log: Default::default(),
    };

    let backend_for_cancel = backend.clone();
    let client_for_cancel = LoopbackBackendClient::new();
    let cancel_handle = tokio::spawn(async move { backend_for_cancel.cancel(&client_for_cancel, &DebugOptions::default()).await });
    backend.apply_exec_status_report(&oom_report, &exec_summary, &progress, &arena);
    let _ = cancel_handle.await;

    assert!(matches!(backend.get_status(), Status::Error(CoordError::InstanceFatal(_))));
    assert!(backend.is_fragment_failure());
}

#[tokio::test]
async fn exec_rpc_network_failure_latches_expected_and_releases_barrier() {
    let (backend, _arena, _fs) = setup_backend(1);
    let client = LoopbackBackendClient::new().fail_start_query(1);
    let routing_table: HashMap<u32, FilterRoutingEntry> = HashMap::new();
    let barrier = tokio::sync::Barrier::new(1);
    let status = backend
        .exec(&DebugOptions::default(), &routing_table, &client, &barrier)
        .await;

    assert!(matches!(status, Status::Error(CoordError::Expected(_))));
    assert_eq!(backend.num_remaining_instances(), 1);
}

#[tokio::test]
async fn late_duplicate_report_is_idempotent() {
    let (backend, arena, _fs) = setup_backend(1);
    let exec_summary = ExecSummary::new();
    let progress = AtomicProgressUpdater::new();
    let id = instance_ids(&backend, &arena)[0];
    let report = ok_report(id);

    let first_done = backend.apply_exec_status_report(&report, &exec_summary, &progress, &arena);
    assert!(first_done);
    assert_eq!(backend.num_remaining_instances(), 0);
    let progress_after_first = progress.total();

    let second_done = backend.apply_exec_status_report(&report, &exec_summary, &progress, &arena);
    assert!(!second_done);
    assert_eq!(backend.num_remaining_instances(), 0);
    assert_eq!(progress.total(), progress_after_first);
}

#[test]
fn filter_pruning_drops_unrouted_and_unsourced_filters() {
    let (backend, _arena, _fs) = setup_backend(1);

    let mut routing_table: HashMap<u32, FilterRoutingEntry> = HashMap::new();
    let mut sources_for_1 = HashSet::new();
    sources_for_1.insert(0usize);
    routing_table.insert(
        1,
        FilterRoutingEntry {
            src_fragment_instance_idxs: sources_for_1,
        },
    );
    routing_table.insert(
        2,
        FilterRoutingEntry {
            src_fragment_instance_idxs: HashSet::new(),
        },
    );
    // filter 3 absent from the routing table entirely.

    let request = backend.build_start_query_params(&DebugOptions::default(), &routing_table);
    let pruned = &request.fragment_ctxs[0].plan_nodes[0].runtime_filters;
    assert_eq!(pruned.len(), 1);
    assert_eq!(pruned[0].filter_id, 1);
}
