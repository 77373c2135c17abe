use std::time::Duration;

use blockflow_buffer::BufferManagerArgs;
use serde::{Deserialize, Serialize};

use crate::error::FrameworkError;

/// Scheduling and control settings shared by every worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Budget for synchronous control calls into a worker.
    pub call_timeout: Duration,
    /// Readiness is rechecked after the mailbox stays idle this long.
    pub idle_poll_interval: Duration,
    /// Run the block when an input holds an async message even if some
    /// input is below its reserve.
    pub message_only_cycles: bool,
    /// Pool settings for output ports that do not declare their own.
    pub default_buffers: BufferManagerArgs,
    /// Initial capacity of each input's async message queue.
    pub async_queue_capacity: usize,
    /// Elements an input needs before the block runs, unless the block sets
    /// its own reserve.
    pub default_reserve_elements: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(2),
            idle_poll_interval: Duration::from_millis(1),
            message_only_cycles: true,
            default_buffers: BufferManagerArgs::default(),
            async_queue_capacity: 4,
            default_reserve_elements: 1,
        }
    }
}

impl WorkerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, FrameworkError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Settings for synthesized passthrough workers and control calls.
    pub worker: WorkerConfig,
    /// Delay between stats polls in [`crate::Topology::wait_inactive`].
    pub wait_poll_interval: Duration,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            wait_poll_interval: Duration::from_millis(10),
        }
    }
}

impl TopologyConfig {
    pub fn from_json_str(json: &str) -> Result<Self, FrameworkError> {
        Ok(serde_json::from_str(json)?)
    }
}
