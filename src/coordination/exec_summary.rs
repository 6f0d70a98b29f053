// # ExecSummary (External Collaborator)
//
// A query-wide table of per-plan-node, per-instance execution statistics
// used to populate a debug summary page. Profile storage and the page
// itself are out of scope; this module only implements the structure
// `InstanceStats::update` writes into, and the lock `ApplyExecStatusReport`
// must take first (the one documented lock-order rule in the spec).

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct InstanceExecStats {
    pub cardinality: Option<i64>,
    pub memory_used: Option<i64>,
    pub latency_ns: i64,
}

#[derive(Debug, Default)]
struct PlanNodeExecSummary {
    node_id: i32,
    exec_stats: Vec<InstanceExecStats>,
}

#[derive(Debug, Default)]
pub struct ExecSummaryInner {
    node_id_to_idx: HashMap<i32, usize>,
    nodes: Vec<PlanNodeExecSummary>,
}

impl ExecSummaryInner {
    fn node_idx(&mut self, node_id: i32) -> usize {
        if let Some(&idx) = self.node_id_to_idx.get(&node_id) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(PlanNodeExecSummary {
            node_id,
            exec_stats: Vec::new(),
        });
        self.node_id_to_idx.insert(node_id, idx);
        idx
    }

    /// Record the latest per-instance stats for one plan node (called from
    /// `InstanceStats::update` while both locks in the fixed order are held).
    pub fn set_instance_stats(
        &mut self,
        node_id: i32,
        per_fragment_instance_idx: usize,
        cardinality: Option<i64>,
        memory_used: Option<i64>,
        latency_ns: i64,
    ) {
        let idx = self.node_idx(node_id);
        let stats = &mut self.nodes[idx].exec_stats;
        if stats.len() <= per_fragment_instance_idx {
            stats.resize(per_fragment_instance_idx + 1, InstanceExecStats::default());
        }
        stats[per_fragment_instance_idx] = InstanceExecStats {
            cardinality,
            memory_used,
            latency_ns,
        };
    }

    pub fn instance_stats(&self, node_id: i32, per_fragment_instance_idx: usize) -> Option<&InstanceExecStats> {
        let idx = *self.node_id_to_idx.get(&node_id)?;
        self.nodes[idx].exec_stats.get(per_fragment_instance_idx)
    }
}

/// Query-wide summary table. Its lock must be acquired before any
/// `BackendState` lock (the single documented lock order in the core).
#[derive(Debug, Default)]
pub struct ExecSummary {
    inner: Mutex<ExecSummaryInner>,
}

impl ExecSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ExecSummaryInner> {
        self.inner.lock()
    }
}
