// # CoordinatorConfig
//
// Small tunables for the coordination layer, constructed with `Default`
// the way the teacher's per-subsystem configs are (c.f. `ParallelQueryConfig`).

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Maximum cancel-RPC attempts per `BackendState::cancel` call.
    pub cancel_max_attempts: u32,
    /// Degree of parallelism assumed by filter pruning; must be zero, per
    /// the original's `DCHECK_EQ(mt_dop_, 0)`.
    pub mt_dop: i32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cancel_max_attempts: 3,
            mt_dop: 0,
        }
    }
}
