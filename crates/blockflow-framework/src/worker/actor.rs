use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use blockflow_buffer::{BufferError, make_buffer_manager};
use blockflow_runtime::thread_actor::ActorContext;
use tracing::{debug, error, warn};

use crate::block::{Block, ManagerChoice, PortSetup, WorkContext, WorkInfo};
use crate::config::WorkerConfig;
use crate::dtype::DType;
use crate::error::{BlockError, FrameworkError};
use crate::port::{InputPort, OutputPort, PortDirection, PortId, PortTable};
use crate::worker::WorkerId;
use crate::worker::stats::{WorkerStats, clock_ticks};

/// Owns one block and its ports; every mutation happens on the worker thread.
pub(crate) struct WorkerActor {
    pub(crate) id: WorkerId,
    pub(crate) name: Arc<str>,
    pub(crate) config: WorkerConfig,
    pub(crate) block: Box<dyn Block>,
    pub(crate) inputs: PortTable<InputPort>,
    pub(crate) outputs: PortTable<OutputPort>,
    pub(crate) active: bool,
    pub(crate) shut_down: bool,
    pub(crate) work_info: WorkInfo,
    pub(crate) stats: WorkerStats,
}

impl WorkerActor {
    pub(crate) fn new(
        id: WorkerId,
        name: Arc<str>,
        block: Box<dyn Block>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id,
            name,
            config,
            block,
            inputs: PortTable::default(),
            outputs: PortTable::default(),
            active: false,
            shut_down: false,
            work_info: WorkInfo::default(),
            stats: WorkerStats::default(),
        }
    }

    /// Collects the block's declarations and allocates its ports.
    pub(crate) fn setup_ports(
        &mut self,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), FrameworkError> {
        let mut setup = PortSetup::default();
        self.block.setup(&mut setup);
        let worker = self.name.to_string();
        let port_error = |source: BufferError| FrameworkError::PortSetup {
            worker: worker.clone(),
            source,
        };

        for decl in setup.inputs {
            let reserve = decl.reserve.unwrap_or(self.config.default_reserve_elements);
            self.allocate_input(decl.name, decl.dtype, reserve);
        }
        for decl in setup.outputs {
            let manager = match &decl.manager {
                ManagerChoice::Kind(kind) => make_buffer_manager(*kind),
                ManagerChoice::Factory(factory) => factory(),
            };
            let args = decl
                .buffers
                .unwrap_or_else(|| self.config.default_buffers.clone());
            let owner = ctx.actor_ref();
            let port = OutputPort::new(decl.name.clone(), decl.dtype, manager, &args, owner)
                .map_err(port_error)?;
            self.outputs.insert(decl.name, port);
        }
        debug!(
            worker = %self.name,
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            "worker ports allocated"
        );
        Ok(())
    }

    pub(crate) fn allocate_input(&mut self, name: String, dtype: DType, reserve: usize) {
        let port = InputPort::new(name.clone(), dtype, reserve, self.config.async_queue_capacity);
        self.inputs.insert(name, port);
    }

    /// Allocates a missing indexed port, typed like the nearest lower index.
    pub(crate) fn ensure_indexed_port(
        &mut self,
        direction: PortDirection,
        port: &PortId,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), BufferError> {
        let Some(index) = port.index() else {
            return Ok(());
        };
        let name = port.to_name();
        match direction {
            PortDirection::Input => {
                if self.inputs.contains(&name) {
                    return Ok(());
                }
                let Some(dtype) = self.inputs.nearest_below(index).map(|p| p.dtype().clone())
                else {
                    return Ok(());
                };
                let reserve = self.config.default_reserve_elements;
                self.allocate_input(name, dtype, reserve);
            },
            PortDirection::Output => {
                if self.outputs.contains(&name) {
                    return Ok(());
                }
                let Some(dtype) = self.outputs.nearest_below(index).map(|p| p.dtype().clone())
                else {
                    return Ok(());
                };
                let manager = make_buffer_manager(Default::default());
                let args = self.config.default_buffers.clone();
                let owner = ctx.actor_ref();
                let output = OutputPort::new(name.clone(), dtype, manager, &args, owner)?;
                self.outputs.insert(name, output);
            },
        }
        debug!(worker = %self.name, %direction, %port, "allocated indexed port on subscribe");
        Ok(())
    }

    pub(crate) fn input_mut(
        &mut self,
        port: &PortId,
        what: &'static str,
    ) -> Option<&mut InputPort> {
        if !self.inputs.contains(port) {
            warn!(worker = %self.name, %port, what, "dropping delivery to unknown input port");
            return None;
        }
        self.inputs.get_mut(port)
    }

    /// Computes per-port element counts; true when the block may run.
    pub(crate) fn pre_work_tasks(&mut self) -> bool {
        let mut all_outputs_ready = true;
        let mut all_inputs_ready = true;
        let mut has_input_message = false;
        let mut info = WorkInfo::default();

        for port in self.outputs.iter_mut() {
            let elements = port.pre_work();
            if elements == 0 {
                all_outputs_ready = false;
            }
            if port.index().is_some() {
                info.min_out_elements = info.min_out_elements.min(elements);
            }
            info.min_all_out_elements = info.min_all_out_elements.min(elements);
        }

        for port in self.inputs.iter_mut() {
            if !port.pre_work() {
                all_inputs_ready = false;
            }
            if port.has_message() {
                has_input_message = true;
            }
            let elements = port.elements();
            if port.index().is_some() {
                info.min_in_elements = info.min_in_elements.min(elements);
            }
            info.min_all_in_elements = info.min_all_in_elements.min(elements);
        }

        info.min_elements = info.min_in_elements.min(info.min_out_elements);
        info.min_all_elements = info.min_all_in_elements.min(info.min_all_out_elements);
        self.work_info = info;

        let inputs_ok = all_inputs_ready || (self.config.message_only_cycles && has_input_message);
        all_outputs_ready && inputs_ok
    }

    /// Releases consumed input, propagates labels and sends produced output.
    pub(crate) fn post_work_tasks(&mut self) {
        let mut bytes_consumed = 0;
        let mut msgs_consumed = 0;
        for port in self.inputs.iter_mut() {
            bytes_consumed += port.post_work();
            msgs_consumed += port.total_messages();

            let due = port.take_due_labels();
            if due.is_empty() {
                continue;
            }
            let input: &InputPort = port;
            let block = &mut self.block;
            let outputs = &mut self.outputs;
            match catch_unwind(AssertUnwindSafe(|| block.propagate_labels(input, &due, outputs))) {
                Ok(Ok(())) => {},
                Ok(Err(err)) => {
                    error!(
                        worker = %self.name,
                        port = input.name(),
                        error = %err,
                        "label propagation failed"
                    );
                },
                Err(panic) => {
                    error!(
                        worker = %self.name,
                        port = input.name(),
                        error = panic_message(panic.as_ref()),
                        "label propagation panicked"
                    );
                },
            }
        }

        let now = clock_ticks();
        if bytes_consumed != 0 || self.stats.msgs_consumed != msgs_consumed {
            self.stats.ticks_last_consumed = now;
        }
        self.stats.bytes_consumed += bytes_consumed;
        self.stats.msgs_consumed = msgs_consumed;

        let mut bytes_produced = 0;
        let mut msgs_produced = 0;
        for port in self.outputs.iter_mut() {
            bytes_produced += port.post_work();
            msgs_produced += port.total_messages();
        }

        if bytes_produced != 0 || self.stats.msgs_produced != msgs_produced {
            self.stats.ticks_last_produced = now;
        }
        self.stats.bytes_produced += bytes_produced;
        self.stats.msgs_produced = msgs_produced;
    }

    /// One scheduling pass: readiness check, work call, bookkeeping.
    pub(crate) fn work_cycle(&mut self, ctx: &mut ActorContext<Self>) {
        if !self.active {
            return;
        }
        if !self.pre_work_tasks() {
            return;
        }
        self.stats.num_work_calls += 1;
        self.stats.ticks_last_work = clock_ticks();

        let block = &mut self.block;
        let mut work = WorkContext::new(&mut self.inputs, &mut self.outputs, &self.work_info);
        let outcome = catch_unwind(AssertUnwindSafe(|| block.work(&mut work)));
        match outcome {
            Ok(Ok(())) => {},
            Ok(Err(err)) => {
                warn!(worker = %self.name, error = %err, "block work failed");
            },
            Err(panic) => {
                error!(
                    worker = %self.name,
                    error = panic_message(panic.as_ref()),
                    "block work panicked, deactivating worker"
                );
                self.active = false;
            },
        }

        self.post_work_tasks();
        ctx.rearm();
    }

    /// Runs a block hook, turning errors and panics into text.
    pub(crate) fn guarded<R>(
        &mut self,
        hook: impl FnOnce(&mut Box<dyn Block>) -> Result<R, BlockError>,
    ) -> Result<R, String> {
        let block = &mut self.block;
        match catch_unwind(AssertUnwindSafe(|| hook(block))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.to_string()),
            Err(panic) => Err(panic_message(panic.as_ref()).to_string()),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        return message;
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.as_str();
    }
    "unknown panic"
}
