// # Profile Arena
//
// A named tree of counters and info strings, standing in for Impala's
// `ObjectPool`-owned `RuntimeProfile` tree. Per Design Notes §9, back
// references from counters to profile nodes are implemented as an arena
// index resolved on use rather than a raw pointer, since nothing here
// requires interior pointers to stay valid across moves.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Sentinel used by exec nodes that don't correspond to a plan node (mirrors
/// `INVALID_PLAN_NODE_ID` in the original).
pub const INVALID_PLAN_NODE_ID: i32 = -1;

pub const SCAN_RANGES_COMPLETE_COUNTER: &str = "ScanRangesComplete";
pub const BYTES_READ_COUNTER: &str = "BytesRead";
pub const ROWS_RETURNED_COUNTER: &str = "RowsReturned";
pub const PEAK_MEMORY_USAGE_COUNTER: &str = "PeakMemoryUsage";
pub const TOTAL_THREADS_USER_TIME_COUNTER: &str = "TotalThreadsUserTime";
pub const TOTAL_THREADS_SYS_TIME_COUNTER: &str = "TotalThreadsSysTime";
pub const PER_HOST_PEAK_MEM_COUNTER: &str = "PerHostPeakMemUsage";

pub type ProfileId = usize;

#[derive(Debug, Default)]
struct ProfileNode {
    name: String,
    counters: HashMap<String, i64>,
    info_strings: HashMap<String, String>,
    children: Vec<ProfileId>,
    plan_node_id: Option<i32>,
    local_time_ns: i64,
}

/// A delta received in a progress report: the subset of a profile tree that
/// changed since the last report. Children are matched to existing nodes by
/// name, same as `RuntimeProfile::Update` merging by child profile name.
#[derive(Debug, Clone, Default)]
pub struct ProfileDelta {
    pub counters: Vec<(String, i64)>,
    pub local_time_ns: i64,
    pub plan_node_id: Option<i32>,
    pub children: Vec<(String, ProfileDelta)>,
}

/// Query-scoped arena owning every profile node for the life of the query,
/// mirroring the original's `ObjectPool`.
#[derive(Debug, Default)]
pub struct ProfileArena {
    nodes: RwLock<Vec<ProfileNode>>,
}

impl ProfileArena {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
        }
    }

    pub fn create(&self, name: impl Into<String>) -> ProfileId {
        let mut nodes = self.nodes.write();
        let id = nodes.len();
        nodes.push(ProfileNode {
            name: name.into(),
            ..Default::default()
        });
        id
    }

    pub fn add_child(&self, parent: ProfileId, child: ProfileId) {
        self.nodes.write()[parent].children.push(child);
    }

    pub fn name(&self, id: ProfileId) -> String {
        self.nodes.read()[id].name.clone()
    }

    pub fn set_counter(&self, id: ProfileId, name: &str, value: i64) {
        self.nodes.write()[id].counters.insert(name.to_string(), value);
    }

    pub fn get_counter(&self, id: ProfileId, name: &str) -> Option<i64> {
        self.nodes.read()[id].counters.get(name).copied()
    }

    pub fn add_info_string(&self, id: ProfileId, key: &str, value: impl Into<String>) {
        self.nodes
            .write()[id]
            .info_strings
            .insert(key.to_string(), value.into());
    }

    pub fn set_plan_node_id(&self, id: ProfileId, node_id: i32) {
        self.nodes.write()[id].plan_node_id = Some(node_id);
    }

    pub fn plan_node_id(&self, id: ProfileId) -> i32 {
        self.nodes.read()[id].plan_node_id.unwrap_or(INVALID_PLAN_NODE_ID)
    }

    pub fn local_time(&self, id: ProfileId) -> i64 {
        self.nodes.read()[id].local_time_ns
    }

    pub fn children(&self, id: ProfileId) -> Vec<ProfileId> {
        self.nodes.read()[id].children.clone()
    }

    /// All descendants of `id`, not just direct children (mirrors
    /// `RuntimeProfile::GetAllChildren`).
    pub fn all_descendants(&self, id: ProfileId) -> Vec<ProfileId> {
        let mut out = Vec::new();
        let mut stack = self.children(id);
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next));
        }
        out
    }

    fn find_child_by_name(&self, parent: ProfileId, name: &str) -> Option<ProfileId> {
        self.children(parent)
            .into_iter()
            .find(|&c| self.name(c) == name)
    }

    /// Apply an incoming delta to the subtree rooted at `id`, creating any
    /// child nodes the delta names that don't exist yet.
    pub fn merge_delta(&self, id: ProfileId, delta: &ProfileDelta) {
        {
            let mut nodes = self.nodes.write();
            let node = &mut nodes[id];
            for (k, v) in &delta.counters {
                node.counters.insert(k.clone(), *v);
            }
            node.local_time_ns = delta.local_time_ns;
            if let Some(pid) = delta.plan_node_id {
                node.plan_node_id = Some(pid);
            }
        }
        for (child_name, child_delta) in &delta.children {
            let child_id = match self.find_child_by_name(id, child_name) {
                Some(c) => c,
                None => {
                    let c = self.create(child_name.clone());
                    self.add_child(id, c);
                    c
                }
            };
            self.merge_delta(child_id, child_delta);
        }
    }

    /// Fold `sample`'s counters into `avg`'s as a running mean, recursing
    /// into children matched by name (mirrors `RuntimeProfile::UpdateAverage`,
    /// simplified: only numeric counters participate, not info strings).
    pub fn update_average(&self, avg: ProfileId, sample: ProfileId) {
        let sample_counters: Vec<(String, i64)> = {
            let nodes = self.nodes.read();
            nodes[sample]
                .counters
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect()
        };
        {
            let mut nodes = self.nodes.write();
            let avg_node = &mut nodes[avg];
            for (k, v) in sample_counters {
                let count_key = format!("__avg_samples__{k}");
                let prev_count = *avg_node.counters.get(&count_key).unwrap_or(&0);
                let prev_avg = *avg_node.counters.get(&k).unwrap_or(&0);
                let new_count = prev_count + 1;
                let new_avg = prev_avg + (v - prev_avg) / new_count;
                avg_node.counters.insert(k, new_avg);
                avg_node.counters.insert(count_key, new_count);
            }
        }

        let sample_children: Vec<(String, ProfileId)> = self
            .children(sample)
            .into_iter()
            .map(|c| (self.name(c), c))
            .collect();
        for (name, sample_child) in sample_children {
            let avg_child = match self.find_child_by_name(avg, &name) {
                Some(c) => c,
                None => {
                    let c = self.create(name);
                    self.add_child(avg, c);
                    c
                }
            };
            self.update_average(avg_child, sample_child);
        }
    }

    /// Sort `id`'s direct children by descending local time (mirrors
    /// `RuntimeProfile::SortChildrenByTotalTime`, used by `AddExecStats`).
    pub fn sort_children_by_total_time(&self, id: ProfileId) {
        let mut nodes = self.nodes.write();
        let times: Vec<i64> = nodes[id]
            .children
            .iter()
            .map(|&c| nodes[c].local_time_ns)
            .collect();
        let mut indexed: Vec<usize> = (0..times.len()).collect();
        indexed.sort_by_key(|&i| std::cmp::Reverse(times[i]));
        let children = &mut nodes[id].children;
        let reordered: Vec<ProfileId> = indexed.into_iter().map(|i| children[i]).collect();
        *children = reordered;
    }
}
