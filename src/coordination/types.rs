// # Coordination Identifiers
//
// Identifiers and small value types shared across the coordination module.
// `QueryId`/`InstanceId` mirror Impala's 128-bit `TUniqueId`: a pair of
// opaque 64-bit halves printed as `hi:lo` hex, not a `uuid::Uuid` layout,
// but backed by one for generation and hashing.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Dense index of a fragment within a query's plan.
pub type FragmentIdx = usize;

/// Dense index of a fragment instance within its owning fragment.
pub type InstanceIdx = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub u64, pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64, pub u64);

impl QueryId {
    pub fn new() -> Self {
        let u = Uuid::new_v4();
        let (hi, lo) = u.as_u64_pair();
        Self(hi, lo)
    }
}

impl InstanceId {
    pub fn new() -> Self {
        let u = Uuid::new_v4();
        let (hi, lo) = u.as_u64_pair();
        Self(hi, lo)
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:{:x}", self.0, self.1)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:{:x}", self.0, self.1)
    }
}

/// Execution state of a fragment instance as last reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecState {
    Waiting,
    Opened,
    Producing,
    Finished,
}

impl ExecState {
    pub fn name(&self) -> &'static str {
        match self {
            ExecState::Waiting => "WAITING",
            ExecState::Opened => "OPENED",
            ExecState::Producing => "PRODUCING",
            ExecState::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Degree of runtime-filter propagation requested for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeFilterMode {
    Off,
    Local,
    Global,
}
