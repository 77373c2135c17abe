use std::sync::OnceLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Monotonic nanoseconds since the first call in this process.
pub fn clock_ticks() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Cumulative activity counters of one worker.
///
/// Byte counters add up across cycles; message counters mirror the ports'
/// running totals. Tick fields come from [`clock_ticks`] and only move when
/// the matching counters change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub num_work_calls: u64,
    pub bytes_consumed: u64,
    pub msgs_consumed: u64,
    pub bytes_produced: u64,
    pub msgs_produced: u64,
    pub ticks_last_consumed: u64,
    pub ticks_last_produced: u64,
    pub ticks_last_work: u64,
    pub ticks_stats_query: u64,
}

impl WorkerStats {
    /// Latest production or consumption tick.
    pub fn ticks_last_activity(&self) -> u64 {
        self.ticks_last_consumed.max(self.ticks_last_produced)
    }
}
