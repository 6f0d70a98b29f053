// # Monotonic Clock
//
// A thin wrapper so `InstanceStats`/`BackendState` measure elapsed time
// against a single fixed origin per query, mirroring the original's use of
// `MonotonicStopWatch`.

use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_ns(&self) -> i64 {
        self.start.elapsed().as_nanos() as i64
    }
}
