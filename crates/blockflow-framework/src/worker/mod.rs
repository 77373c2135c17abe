//! Worker threads hosting one block each.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) mod actor;
mod handle;
mod handlers;
pub(crate) mod messages;
mod stats;

pub use handle::Worker;
pub use stats::{WorkerStats, clock_ticks};

/// Process unique identity of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}
