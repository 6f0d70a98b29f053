// # FragmentStats
//
// Cross-backend aggregation of per-fragment statistics: completion times,
// throughput, and assignment skew across every instance of one fragment.
// Written only during the single-threaded phases bracketing concurrent
// execution (construction/`add_split_stats` before Exec, `add_exec_stats`
// after every `BackendState` is terminal) — no locking needed for the
// streaming accumulators themselves.

use crate::coordination::accumulator::StreamingStats;
use crate::coordination::profile::ProfileArena;
use crate::coordination::profile::ProfileId;
use parking_lot::Mutex;

pub struct FragmentStats {
    avg_profile: ProfileId,
    root_profile: ProfileId,
    bytes_assigned: Mutex<StreamingStats>,
    completion_times: Mutex<StreamingStats>,
    rates: Mutex<StreamingStats>,
    num_instances: usize,
}

impl FragmentStats {
    pub fn new(
        avg_profile_name: impl Into<String>,
        root_profile_name: impl Into<String>,
        num_instances: usize,
        arena: &ProfileArena,
    ) -> Self {
        Self {
            avg_profile: arena.create(avg_profile_name),
            root_profile: arena.create(root_profile_name),
            bytes_assigned: Mutex::new(StreamingStats::new()),
            completion_times: Mutex::new(StreamingStats::new()),
            rates: Mutex::new(StreamingStats::new()),
            num_instances,
        }
    }

    pub fn root_profile(&self) -> ProfileId {
        self.root_profile
    }

    pub fn avg_profile(&self) -> ProfileId {
        self.avg_profile
    }

    pub fn num_instances(&self) -> usize {
        self.num_instances
    }

    /// Called from `InstanceStats::new` for every instance assigned here.
    pub fn record_bytes_assigned(&self, bytes: u64) {
        self.bytes_assigned.lock().update(bytes as f64);
    }

    /// Called from `BackendState::update_exec_stats` for every terminal
    /// instance of this fragment.
    pub fn record_instance_completion(
        &self,
        arena: &ProfileArena,
        instance_profile: ProfileId,
        completion_time_ns: i64,
        split_size: u64,
    ) {
        self.completion_times.lock().update(completion_time_ns as f64);
        if completion_time_ns > 0 {
            let rate = split_size as f64 / (completion_time_ns as f64 / 1.0e9);
            self.rates.lock().update(rate);
        }
        arena.update_average(self.avg_profile, instance_profile);
    }

    /// Called once, after `Init` has run for every `BackendState`.
    pub fn add_split_stats(&self, arena: &ProfileArena) {
        let s = self.bytes_assigned.lock();
        arena.add_info_string(
            self.avg_profile,
            "split sizes",
            format!(
                "min: {:.0}, max: {:.0}, avg: {:.0}, stddev: {:.0}",
                s.min(),
                s.max(),
                s.mean(),
                s.stddev()
            ),
        );
    }

    /// Called once, after every `BackendState` for this query is terminal.
    pub fn add_exec_stats(&self, arena: &ProfileArena) {
        arena.sort_children_by_total_time(self.root_profile);

        let times = self.completion_times.lock();
        arena.add_info_string(
            self.avg_profile,
            "completion times",
            format!(
                "min:{:.0}  max:{:.0}  mean:{:.0}  stddev:{:.0}",
                times.min(),
                times.max(),
                times.mean(),
                times.stddev()
            ),
        );
        drop(times);

        let rates = self.rates.lock();
        arena.add_info_string(
            self.avg_profile,
            "execution rates",
            format!(
                "min:{:.2}  max:{:.2}  mean:{:.2}  stddev:{:.2}",
                rates.min(),
                rates.max(),
                rates.mean(),
                rates.stddev()
            ),
        );
        drop(rates);

        arena.add_info_string(self.avg_profile, "num instances", self.num_instances.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_split_stats_reflects_recorded_samples() {
        let arena = ProfileArena::new();
        let fs = FragmentStats::new("avg", "root", 3, &arena);
        fs.record_bytes_assigned(100);
        fs.record_bytes_assigned(200);
        fs.record_bytes_assigned(300);
        fs.add_split_stats(&arena);
        // info string presence is asserted via the arena directly in profile tests;
        // here we only check the accumulator fed it the right numbers.
        assert_eq!(fs.bytes_assigned.lock().mean(), 200.0);
    }

    #[test]
    fn add_exec_stats_records_num_instances() {
        let arena = ProfileArena::new();
        let fs = FragmentStats::new("avg", "root", 4, &arena);
        fs.completion_times.lock().update(1_000_000.0);
        fs.add_exec_stats(&arena);
        assert_eq!(fs.num_instances(), 4);
    }
}
