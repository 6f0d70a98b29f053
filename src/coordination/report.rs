// # Inbound Status Report
//
// The shape of the asynchronous progress report `ApplyExecStatusReport`
// consumes, as it would arrive off an RPC handler.

use crate::coordination::profile::ProfileDelta;
use crate::coordination::status::Status;
use crate::coordination::types::{ExecState, InstanceId};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ErrorLogEntry {
    pub count: u64,
    pub sample: String,
}

pub type ErrorLogMap = HashMap<String, ErrorLogEntry>;

/// Merge `src`'s entries into `dst`, summing counts per category and keeping
/// the first sample message seen for each.
pub fn merge_error_maps(src: &ErrorLogMap, dst: &mut ErrorLogMap) {
    for (category, entry) in src {
        let slot = dst.entry(category.clone()).or_default();
        slot.count += entry.count;
        if slot.sample.is_empty() {
            slot.sample = entry.sample.clone();
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstanceExecStatus {
    pub instance_id: InstanceId,
    pub status: Status,
    pub done: bool,
    pub current_state: ExecState,
    pub profile_delta: ProfileDelta,
}

/// A `ReportExecStatus` RPC payload: one backend's view of all of its
/// instances since the last report.
#[derive(Debug, Clone, Default)]
pub struct ExecStatusReport {
    pub status: Status,
    pub instance_exec_status: Vec<InstanceExecStatus>,
    pub error_log: ErrorLogMap,
}
