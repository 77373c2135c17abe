//! Passthrough workers bridging a link between hierarchy levels.

use blockflow_buffer::BufferManagerArgs;
use tracing::{debug, warn};

use crate::block::{Block, PortSetup, WorkContext};
use crate::config::WorkerConfig;
use crate::dtype::DType;
use crate::error::{BlockError, FrameworkError};
use crate::port::PortId;
use crate::topology::commit::Segment;
use crate::topology::flatten::Link;
use crate::worker::Worker;

/// Forwards buffers, labels and async messages from input 0 to output 0.
struct Passthrough {
    dtype: DType,
}

impl Block for Passthrough {
    fn setup(&mut self, ports: &mut PortSetup) {
        ports.input(0, self.dtype.clone());
        // Forwarded chunks are posted, so the pool only has to keep the
        // output ready.
        ports.output(0, self.dtype.clone()).buffers(BufferManagerArgs {
            num_buffers: 1,
            buffer_size: self.dtype.size(),
            node_affinity: None,
        });
    }

    fn work(&mut self, ctx: &mut WorkContext<'_>) -> Result<(), BlockError> {
        let (Some(input), Some(output)) = (ctx.inputs.get_mut(0), ctx.outputs.get_mut(0)) else {
            return Ok(());
        };
        while let Some(message) = input.pop_message() {
            output.post_message(message);
        }
        let elements = input.elements();
        if elements == 0 {
            return Ok(());
        }
        let mut chunk = input.buffer().clone();
        chunk.truncate(elements * self.dtype.size());
        output.post_buffer(chunk);
        input.consume(elements);
        Ok(())
    }
}

/// Egress worker in the source's scope and ingress worker in the
/// destination's scope.
pub(crate) struct BreakerPair {
    egress: Worker,
    ingress: Worker,
}

impl BreakerPair {
    pub(crate) fn spawn(link: &Link, config: &WorkerConfig) -> Result<Self, FrameworkError> {
        let dtype = match link.src.output(link.src_port.clone()) {
            Ok(info) => info.dtype,
            // Indexed ports that do not exist yet carry no type.
            Err(_) => DType::byte(),
        };
        let name = format!("{}:{}", link.src.name(), link.src_port);
        let egress = Worker::spawn(
            format!("{name}>egress@{}", link.src_scope),
            Passthrough {
                dtype: dtype.clone(),
            },
            config,
        )?;
        let ingress = match Worker::spawn(
            format!("{name}>ingress@{}", link.dst_scope),
            Passthrough { dtype },
            config,
        ) {
            Ok(worker) => worker,
            Err(err) => {
                shutdown_worker(&egress);
                return Err(err);
            },
        };
        debug!(egress = egress.name(), ingress = ingress.name(), "breaker pair spawned");
        Ok(Self { egress, ingress })
    }

    /// The three hops replacing a direct link.
    pub(crate) fn segments(&self, link: &Link) -> Vec<Segment> {
        vec![
            Segment::new(&link.src, link.src_port.clone(), &self.egress, PortId::Index(0)),
            Segment::new(&self.egress, PortId::Index(0), &self.ingress, PortId::Index(0)),
            Segment::new(&self.ingress, PortId::Index(0), &link.dst, link.dst_port.clone()),
        ]
    }

    pub(crate) fn shutdown(&self) {
        shutdown_worker(&self.egress);
        shutdown_worker(&self.ingress);
    }
}

fn shutdown_worker(worker: &Worker) {
    if let Err(err) = worker.deactivate() {
        warn!(worker = worker.name(), error = %err, "failed to deactivate breaker");
    }
    if let Err(err) = worker.shutdown() {
        warn!(worker = worker.name(), error = %err, "failed to shut down breaker");
    }
}
