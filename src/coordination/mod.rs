// # Coordination
//
// The per-backend coordination state machine for a distributed query
// coordinator: `BackendState` owns one worker's portion of a query,
// `InstanceStats` tracks one fragment instance within it, and `FragmentStats`
// aggregates across backends for one fragment. Query planning, the wire
// transport, runtime-filter routing-table construction, and the debug-page
// surface are sketched as trait/data collaborators, not implemented here.

pub mod accumulator;
pub mod backend_state;
pub mod clock;
pub mod config;
pub mod exec_params;
pub mod exec_summary;
pub mod fragment_stats;
pub mod instance_stats;
pub mod profile;
pub mod progress;
pub mod report;
pub mod rpc;
pub mod status;
pub mod types;

pub use backend_state::{log_first_in_progress, BackendState, ResourceUtilization};
pub use config::CoordinatorConfig;
pub use exec_params::{BackendExecParams, DebugOptions, FInstanceExecParams, FilterRoutingTable, PlanFragment, PlanNode};
pub use exec_summary::{ExecSummary, InstanceExecStats};
pub use fragment_stats::FragmentStats;
pub use instance_stats::InstanceStats;
pub use profile::{ProfileArena, ProfileDelta, ProfileId};
pub use progress::{AtomicProgressUpdater, ProgressUpdater};
pub use report::{ErrorLogEntry, ErrorLogMap, ExecStatusReport, InstanceExecStatus};
pub use rpc::{BackendClient, LoopbackBackendClient};
pub use status::{CoordError, Status};
pub use types::{ExecState, FragmentIdx, InstanceId, InstanceIdx, QueryId, RuntimeFilterMode};
