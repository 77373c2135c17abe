use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::FrameworkError;
use crate::topology::Topology;
use crate::worker::{Worker, clock_ticks};

impl Topology {
    /// Polls worker stats until nothing was produced or consumed for `idle`.
    ///
    /// The quiet window starts no earlier than this call. Returns `false` if
    /// `timeout` passes first.
    pub fn wait_inactive(
        &self,
        idle: Duration,
        timeout: Duration,
    ) -> Result<bool, FrameworkError> {
        let started = Instant::now();
        let window_floor = clock_ticks();
        let idle_ticks = u64::try_from(idle.as_nanos()).unwrap_or(u64::MAX);
        let workers: Vec<Worker> = self.inner.state.lock().running.values().cloned().collect();

        loop {
            let mut last_activity = window_floor;
            for worker in &workers {
                last_activity = last_activity.max(worker.stats()?.ticks_last_activity());
            }
            let quiet_for = clock_ticks().saturating_sub(last_activity);
            if quiet_for >= idle_ticks {
                debug!(
                    topology = %self.scope(),
                    waited_ms = started.elapsed().as_millis(),
                    "topology inactive"
                );
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            thread::sleep(self.config().wait_poll_interval);
        }
    }
}
