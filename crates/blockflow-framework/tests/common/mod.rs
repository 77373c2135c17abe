#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use blockflow_buffer::BufferManagerArgs;
use blockflow_framework::{
    Block, BlockError, DType, InputPort, Label, OutputPort, Payload, PortSetup, PortTable,
    Topology, TopologyConfig, WorkContext, Worker, WorkerConfig,
};
use parking_lot::Mutex;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);
pub const IDLE: Duration = Duration::from_millis(100);

pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        call_timeout: TEST_TIMEOUT,
        ..WorkerConfig::default()
    }
}

pub fn topology() -> Topology {
    Topology::with_config(TopologyConfig {
        worker: worker_config(),
        ..TopologyConfig::default()
    })
}

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

pub fn shutdown_all(workers: &[&Worker]) -> Result<()> {
    for worker in workers {
        worker.shutdown()?;
    }
    Ok(())
}

/// Emits `total` consecutive `u32` values, optionally labelling every
/// `label_every`th position.
pub struct CountingSource {
    total: u64,
    next: u64,
    label_every: Option<u64>,
    buffers: Option<BufferManagerArgs>,
}

impl CountingSource {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            next: 0,
            label_every: None,
            buffers: None,
        }
    }

    pub fn with_labels(mut self, every: u64) -> Self {
        self.label_every = Some(every);
        self
    }

    pub fn with_buffers(mut self, num_buffers: usize, buffer_size: usize) -> Self {
        self.buffers = Some(BufferManagerArgs {
            num_buffers,
            buffer_size,
            node_affinity: None,
        });
        self
    }
}

impl Block for CountingSource {
    fn setup(&mut self, ports: &mut PortSetup) {
        let output = ports.output(0, DType::of::<u32>());
        if let Some(args) = self.buffers.clone() {
            output.buffers(args);
        }
    }

    fn work(&mut self, ctx: &mut WorkContext<'_>) -> Result<(), BlockError> {
        let Some(output) = ctx.output(0) else {
            return Ok(());
        };
        let remaining = self.total - self.next;
        let count = remaining.min(output.elements() as u64);
        if count == 0 {
            return Ok(());
        }
        let range = self.next..self.next + count;
        if let Some(every) = self.label_every {
            for index in range.clone().filter(|index| index % every == 0) {
                output.post_label(Label::new("mark", Payload::new(index), index));
            }
        }
        let values: Vec<u32> = range.map(|value| value as u32).collect();
        output.write(&values);
        self.next += count;
        Ok(())
    }
}

/// What a [`RecordingSink`] has seen, shared with the test.
#[derive(Default)]
pub struct SinkLog {
    pub elements: AtomicU64,
    pub out_of_order: AtomicU64,
    pub closed: AtomicBool,
    /// `(label id, label index, consumed elements when delivered)`.
    pub labels: Mutex<Vec<(String, u64, u64)>>,
    pub messages: Mutex<Vec<Payload>>,
}

impl SinkLog {
    pub fn elements(&self) -> u64 {
        self.elements.load(Ordering::Relaxed)
    }
}

/// Consumes `u32` input, checking that values arrive in sequence.
pub struct RecordingSink {
    log: Arc<SinkLog>,
    expected: u64,
}

impl RecordingSink {
    pub fn new(log: Arc<SinkLog>) -> Self {
        Self { log, expected: 0 }
    }
}

impl Block for RecordingSink {
    fn setup(&mut self, ports: &mut PortSetup) {
        ports.input(0, DType::of::<u32>());
    }

    fn work(&mut self, ctx: &mut WorkContext<'_>) -> Result<(), BlockError> {
        let Some(input) = ctx.input(0) else {
            return Ok(());
        };
        while let Some(message) = input.pop_message() {
            self.log.messages.lock().push(message);
        }
        if self.log.closed.load(Ordering::Relaxed) {
            return Ok(());
        }
        let values = input.read::<u32>();
        for value in &values {
            if u64::from(*value) != self.expected {
                self.log.out_of_order.fetch_add(1, Ordering::Relaxed);
            }
            self.expected = u64::from(*value) + 1;
        }
        input.consume(values.len());
        self.log
            .elements
            .fetch_add(values.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn propagate_labels(
        &mut self,
        input: &InputPort,
        labels: &[Label],
        _outputs: &mut PortTable<OutputPort>,
    ) -> Result<(), BlockError> {
        let mut seen = self.log.labels.lock();
        for label in labels {
            seen.push((label.id.clone(), label.index, input.total_elements()));
        }
        Ok(())
    }
}
