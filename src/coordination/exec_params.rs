// # Planner Output (External Collaborator, Sketched)
//
// Query planning and fragment assignment are out of scope for this crate;
// this module only defines the shapes the planner hands to `BackendState`.

use crate::coordination::types::{FragmentIdx, InstanceId, InstanceIdx, QueryId};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRangeKind {
    FileSplit,
    Other,
}

#[derive(Debug, Clone)]
pub struct ScanRangeSpec {
    pub kind: ScanRangeKind,
    pub length: u64,
}

#[derive(Debug, Clone)]
pub struct RuntimeFilterDesc {
    pub filter_id: u32,
    pub is_broadcast_join: bool,
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub node_id: i32,
    pub is_hash_join: bool,
    pub runtime_filters: Vec<RuntimeFilterDesc>,
}

#[derive(Debug, Clone)]
pub struct PlanFragment {
    pub fragment_idx: FragmentIdx,
    pub display_name: String,
    pub plan_nodes: Vec<PlanNode>,
    pub destinations: Vec<SocketAddr>,
}

/// Per-instance execution parameters, as handed out by fragment assignment.
#[derive(Debug, Clone)]
pub struct FInstanceExecParams {
    pub instance_id: InstanceId,
    pub instance_idx: InstanceIdx,
    pub per_fragment_instance_idx: usize,
    pub host: SocketAddr,
    pub fragment: PlanFragment,
    pub per_node_scan_ranges: HashMap<i32, Vec<ScanRangeSpec>>,
    pub per_exch_num_senders: HashMap<i32, i32>,
    pub sender_id: i32,
}

impl FInstanceExecParams {
    pub fn fragment_idx(&self) -> FragmentIdx {
        self.fragment.fragment_idx
    }

    pub fn total_split_size(&self) -> u64 {
        self.per_node_scan_ranges
            .values()
            .flatten()
            .filter(|r| r.kind == ScanRangeKind::FileSplit)
            .map(|r| r.length)
            .sum()
    }
}

/// The full assignment of instances to one backend, as produced by the
/// planner for one participating worker.
#[derive(Debug, Clone)]
pub struct BackendExecParams {
    pub query_id: QueryId,
    pub instance_params: Vec<FInstanceExecParams>,
    pub min_mem_reservation_bytes: i64,
    pub initial_mem_reservation_total_claims: i64,
}

/// Debug-injection hook addressed at (optionally) a single instance.
#[derive(Debug, Clone, Default)]
pub struct DebugOptions {
    pub enabled: bool,
    /// `None` means "applies to every instance" (mirrors `instance_idx() == -1`).
    pub instance_idx: Option<InstanceIdx>,
    pub action: String,
}

impl DebugOptions {
    pub fn applies_to(&self, idx: InstanceIdx) -> bool {
        self.enabled && self.instance_idx.map_or(true, |i| i == idx)
    }
}

/// One routing-table entry: which instances are permitted sources for a
/// runtime filter. Routing-table construction itself is out of scope.
#[derive(Debug, Clone, Default)]
pub struct FilterRoutingEntry {
    pub src_fragment_instance_idxs: HashSet<InstanceIdx>,
}

/// Lookup structure the coordinator hands `BackendState` for filter pruning.
pub trait FilterRoutingTable: Send + Sync {
    fn lookup(&self, filter_id: u32) -> Option<&FilterRoutingEntry>;
}

impl FilterRoutingTable for HashMap<u32, FilterRoutingEntry> {
    fn lookup(&self, filter_id: u32) -> Option<&FilterRoutingEntry> {
        self.get(&filter_id)
    }
}
