// # InstanceStats
//
// Per-instance execution state and profile bookkeeping, owned by the
// `BackendState` that holds the corresponding `FInstanceExecParams`.
// Grounded on `InstanceStats`'s constructor, `InitCounters`, `Update` and
// `ToJson` in the original coordinator backend state.

use crate::coordination::clock::Stopwatch;
use crate::coordination::exec_params::{FInstanceExecParams, ScanRangeKind};
use crate::coordination::exec_summary::ExecSummaryInner;
use crate::coordination::fragment_stats::FragmentStats;
use crate::coordination::profile::{
    ProfileArena, ProfileId, PEAK_MEMORY_USAGE_COUNTER, ROWS_RETURNED_COUNTER, SCAN_RANGES_COMPLETE_COUNTER,
};
use crate::coordination::progress::ProgressUpdater;
use crate::coordination::report::InstanceExecStatus;
use crate::coordination::status::Status;
use crate::coordination::types::ExecState;
use serde_json::json;

pub struct InstanceStats {
    pub exec_params: FInstanceExecParams,
    profile: ProfileId,
    done: bool,
    current_state: ExecState,
    stopwatch: Stopwatch,
    total_split_size: u64,
    /// Plan node ids with at least one file-split scan range assigned.
    scan_node_ids: Vec<i32>,
    /// `(node_id, profile)` pairs resolved lazily, once each scan node's own
    /// sub-profile has arrived as a named child in a report delta.
    scan_node_profiles: Vec<(i32, ProfileId)>,
    total_ranges_complete: i64,
    last_report_time_ms: i64,
}

impl InstanceStats {
    pub fn new(exec_params: FInstanceExecParams, fragment_stats: &FragmentStats, arena: &ProfileArena) -> Self {
        let total_split_size = exec_params.total_split_size();
        fragment_stats.record_bytes_assigned(total_split_size);

        let profile = arena.create(format!(
            "Instance {} (host={})",
            exec_params.instance_id, exec_params.host
        ));
        arena.add_child(fragment_stats.root_profile(), profile);

        let scan_node_ids = exec_params
            .per_node_scan_ranges
            .iter()
            .filter(|(_, ranges)| ranges.iter().any(|r| r.kind == ScanRangeKind::FileSplit))
            .map(|(node_id, _)| *node_id)
            .collect();

        Self {
            exec_params,
            profile,
            done: false,
            current_state: ExecState::Waiting,
            stopwatch: Stopwatch::new(),
            total_split_size,
            scan_node_ids,
            scan_node_profiles: Vec::new(),
            total_ranges_complete: 0,
            last_report_time_ms: 0,
        }
    }

    pub fn profile(&self) -> ProfileId {
        self.profile
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn current_state(&self) -> ExecState {
        self.current_state
    }

    pub fn total_split_size(&self) -> u64 {
        self.total_split_size
    }

    /// Resolves `scan_node_profiles` against whatever scan-node sub-profiles
    /// have arrived so far as named children of this instance's profile.
    /// Run on every `update`, since a node's sub-profile may not exist until
    /// its first report delta creates it (mirrors the original's lazy
    /// `InitCounters`, which only has real counters to bind once the first
    /// report names them).
    fn resolve_scan_node_profiles(&mut self, arena: &ProfileArena) {
        if self.scan_node_profiles.len() == self.scan_node_ids.len() {
            return;
        }
        for node in arena.all_descendants(self.profile) {
            let node_id = arena.plan_node_id(node);
            if self.scan_node_ids.contains(&node_id)
                && !self.scan_node_profiles.iter().any(|&(id, _)| id == node_id)
            {
                self.scan_node_profiles.push((node_id, node));
            }
        }
    }

    /// Apply one `ApplyExecStatusReport` fragment of the inbound report for
    /// this instance: merge profile delta, update progress, record exec
    /// summary stats. Returns the instance's own status so the caller can
    /// merge it into the backend-wide latch under the single lock it holds.
    pub fn update(
        &mut self,
        report: &InstanceExecStatus,
        arena: &ProfileArena,
        exec_summary: &mut ExecSummaryInner,
        scan_range_progress: &dyn ProgressUpdater,
    ) -> Status {
        let before: Vec<i64> = self
            .scan_node_profiles
            .iter()
            .map(|&(_, id)| arena.get_counter(id, SCAN_RANGES_COMPLETE_COUNTER).unwrap_or(0))
            .collect();

        arena.merge_delta(self.profile, &report.profile_delta);
        self.current_state = report.current_state;
        self.done = report.done;
        self.last_report_time_ms = self.stopwatch.elapsed_ns() / 1_000_000;

        self.resolve_scan_node_profiles(arena);

        let mut delta_ranges = 0i64;
        for (i, &(_, id)) in self.scan_node_profiles.iter().enumerate() {
            let prev = before.get(i).copied().unwrap_or(0);
            let now = arena.get_counter(id, SCAN_RANGES_COMPLETE_COUNTER).unwrap_or(prev);
            delta_ranges += now - prev;
        }
        if delta_ranges > 0 {
            self.total_ranges_complete += delta_ranges;
            scan_range_progress.update(delta_ranges);
        }

        for node in arena.all_descendants(self.profile) {
            let node_id = arena.plan_node_id(node);
            if node_id < 0 {
                continue;
            }
            let cardinality = arena.get_counter(node, ROWS_RETURNED_COUNTER);
            let memory_used = arena.get_counter(node, PEAK_MEMORY_USAGE_COUNTER);
            let latency_ns = arena.local_time(node);
            exec_summary.set_instance_stats(
                node_id,
                self.exec_params.per_fragment_instance_idx,
                cardinality,
                memory_used,
                latency_ns,
            );
        }

        report.status.clone()
    }

    pub fn to_json(&self, arena: &ProfileArena) -> serde_json::Value {
        json!({
            "instance_id": self.exec_params.instance_id.to_string(),
            "done": self.done,
            "current_state": self.current_state.name(),
            "total_split_size": self.total_split_size,
            "total_ranges_complete": self.total_ranges_complete,
            "last_report_time_ms": self.last_report_time_ms,
            "host": self.exec_params.host.to_string(),
            "profile_name": arena.name(self.profile),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::exec_params::{FInstanceExecParams, PlanFragment, ScanRangeSpec};
    use crate::coordination::profile::ProfileDelta;
    use crate::coordination::types::{ExecState, InstanceId};
    use std::collections::HashMap;
    use std::net::SocketAddr;

    fn mk_exec_params() -> FInstanceExecParams {
        let mut ranges = HashMap::new();
        ranges.insert(
            0,
            vec![ScanRangeSpec {
                kind: ScanRangeKind::FileSplit,
                length: 1024,
            }],
        );
        FInstanceExecParams {
            instance_id: InstanceId::new(),
            instance_idx: 0,
            per_fragment_instance_idx: 0,
            host: "127.0.0.1:1000".parse::<SocketAddr>().unwrap(),
            fragment: PlanFragment {
                fragment_idx: 0,
                display_name: "frag".into(),
                plan_nodes: vec![],
                destinations: vec![],
            },
            per_node_scan_ranges: ranges,
            per_exch_num_senders: HashMap::new(),
            sender_id: 0,
        }
    }

    #[test]
    fn new_records_split_size_against_fragment_stats() {
        let arena = ProfileArena::new();
        let fs = FragmentStats::new("avg", "root", 1, &arena);
        let stats = InstanceStats::new(mk_exec_params(), &fs, &arena);
        assert_eq!(stats.total_split_size(), 1024);
        assert_eq!(arena.children(fs.root_profile()).len(), 1);
    }

    #[test]
    fn update_advances_scan_range_progress() {
        let arena = ProfileArena::new();
        let fs = FragmentStats::new("avg", "root", 1, &arena);
        let mut stats = InstanceStats::new(mk_exec_params(), &fs, &arena);
        let progress = crate::coordination::progress::AtomicProgressUpdater::new();
        let mut summary = ExecSummaryInner::default();

        let report = InstanceExecStatus {
            instance_id: stats.exec_params.instance_id,
            status: Status::Ok,
            done: true,
            current_state: ExecState::Finished,
            profile_delta: ProfileDelta {
                counters: vec![],
                local_time_ns: 10,
                plan_node_id: None,
                children: vec![(
                    "scan-node-0".into(),
                    ProfileDelta {
                        counters: vec![(SCAN_RANGES_COMPLETE_COUNTER.to_string(), 1)],
                        local_time_ns: 0,
                        plan_node_id: Some(0),
                        children: vec![],
                    },
                )],
            },
        };
        let status = stats.update(&report, &arena, &mut summary, &progress);
        assert!(status.is_ok());
        assert!(stats.done());
        assert_eq!(progress.total(), 1);
    }

    #[test]
    fn bytes_read_accumulates_on_scan_node_sub_profile() {
        let arena = ProfileArena::new();
        let fs = FragmentStats::new("avg", "root", 1, &arena);
        let mut stats = InstanceStats::new(mk_exec_params(), &fs, &arena);
        let progress = crate::coordination::progress::AtomicProgressUpdater::new();
        let mut summary = ExecSummaryInner::default();

        let report = InstanceExecStatus {
            instance_id: stats.exec_params.instance_id,
            status: Status::Ok,
            done: false,
            current_state: ExecState::Producing,
            profile_delta: ProfileDelta {
                counters: vec![],
                local_time_ns: 0,
                plan_node_id: None,
                children: vec![(
                    "scan-node-0".into(),
                    ProfileDelta {
                        counters: vec![
                            (SCAN_RANGES_COMPLETE_COUNTER.to_string(), 1),
                            (crate::coordination::profile::BYTES_READ_COUNTER.to_string(), 4096),
                        ],
                        local_time_ns: 0,
                        plan_node_id: Some(0),
                        children: vec![],
                    },
                )],
            },
        };
        stats.update(&report, &arena, &mut summary, &progress);

        let descendants = arena.all_descendants(stats.profile());
        let bytes_read: i64 = descendants
            .iter()
            .filter_map(|&n| arena.get_counter(n, crate::coordination::profile::BYTES_READ_COUNTER))
            .sum();
        assert_eq!(bytes_read, 4096);
    }
}
