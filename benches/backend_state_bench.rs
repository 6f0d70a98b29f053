// Backend State Performance Benchmarks
// Tests ApplyExecStatusReport throughput under the fixed ExecSummary-then-
// BackendState lock order.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rusty_coord::coordination::{
    AtomicProgressUpdater, BackendExecParams, BackendState, CoordinatorConfig, ExecState, ExecStatusReport,
    ExecSummary, FInstanceExecParams, FragmentStats, InstanceExecStatus, PlanFragment, ProfileArena, QueryId,
    RuntimeFilterMode, Status,
};
use std::collections::HashMap;
use std::sync::Arc;

fn build_backend(num_instances: usize) -> (Arc<BackendState>, ProfileArena, Vec<rusty_coord::coordination::InstanceId>) {
    let arena = ProfileArena::new();
    let mut fragment_stats = HashMap::new();
    fragment_stats.insert(0, Arc::new(FragmentStats::new("avg", "root", num_instances, &arena)));

    let host = "127.0.0.1:27100".parse().unwrap();
    let mut instance_params = Vec::new();
    let mut ids = Vec::new();
    for i in 0..num_instances {
        let id = rusty_coord::coordination::InstanceId::new();
        ids.push(id);
        instance_params.push(FInstanceExecParams {
            instance_id: id,
            instance_idx: i,
            per_fragment_instance_idx: i,
            host,
            fragment: PlanFragment {
                fragment_idx: 0,
                display_name: "bench-fragment".into(),
                plan_nodes: vec![],
                destinations: vec![],
            },
            per_node_scan_ranges: HashMap::new(),
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
        RuntimeFilterMode::Off,
        CoordinatorConfig::default(),
        &fragment_stats,
        &arena,
    )
    .unwrap();
    (backend, arena, ids)
}

fn bench_apply_exec_status_report(c: &mut Criterion) {
    let (backend, arena, ids) = build_backend(32);
    let exec_summary = ExecSummary::new();
    let progress = AtomicProgressUpdater::new();

    c.bench_function("apply_exec_status_report_progress_only", |b| {
        b.iter(|| {
            let report = ExecStatusReport {
                status: Status::Ok,
                instance_exec_status: vec![InstanceExecStatus {
                    instance_id: ids[0],
                    status: Status::Ok,
                    done: false,
                    current_state: ExecState::Producing,
                    profile_delta: Default::default(),
                }],
                error_log: Default::default(),
            };
            black_box(backend.apply_exec_status_report(&report, &exec_summary, &progress, &arena));
        });
    });
}

criterion_group!(benches, bench_apply_exec_status_report);
criterion_main!(benches);
