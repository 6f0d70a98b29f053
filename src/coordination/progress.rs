// # Progress Updater (External Collaborator, Sketched)
//
// The coordinator's global scan-range progress bar is out of scope; this is
// the narrow interface `InstanceStats::update` pushes deltas into.

use std::sync::atomic::{AtomicI64, Ordering};

pub trait ProgressUpdater: Send + Sync {
    fn update(&self, delta: i64);
}

/// A simple atomic total, standing in for the coordinator's shared progress
/// bar without pulling in the HTTP debug-page machinery.
#[derive(Debug, Default)]
pub struct AtomicProgressUpdater {
    total: AtomicI64,
}

impl AtomicProgressUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> i64 {
        self.total.load(Ordering::SeqCst)
    }
}

impl ProgressUpdater for AtomicProgressUpdater {
    fn update(&self, delta: i64) {
        self.total.fetch_add(delta, Ordering::SeqCst);
    }
}
