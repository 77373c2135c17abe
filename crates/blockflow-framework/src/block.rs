//! The contract a block implements to run inside a worker.

use std::any::Any;
use std::time::Duration;

use blockflow_buffer::{BufferManagerArgs, BufferManagerFactory, BufferManagerKind};

use crate::dtype::DType;
use crate::error::BlockError;
use crate::label::Label;
use crate::payload::Payload;
use crate::port::{InputPort, OutputPort, PortId, PortTable};

/// A unit of computation driven by a worker thread.
///
/// `setup` runs once on the worker thread before anything else. `work` runs
/// once per cycle in which every output has buffer space and every input
/// holds its reserve (or an async message is waiting). Errors and panics from
/// the other hooks are caught at the worker boundary.
pub trait Block: Send + 'static {
    fn setup(&mut self, ports: &mut PortSetup);

    fn work(&mut self, ctx: &mut WorkContext<'_>) -> Result<(), BlockError>;

    fn activate(&mut self) -> Result<(), BlockError> {
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), BlockError> {
        Ok(())
    }

    /// Receives labels whose position the input has consumed past, in order.
    ///
    /// The default forwards each label unchanged to every output.
    fn propagate_labels(
        &mut self,
        input: &InputPort,
        labels: &[Label],
        outputs: &mut PortTable<OutputPort>,
    ) -> Result<(), BlockError> {
        let _ = input;
        for output in outputs.iter_mut() {
            for label in labels {
                output.post_label(label.clone());
            }
        }
        Ok(())
    }

    /// Dispatches a named call with type erased arguments.
    fn call(&mut self, name: &str, args: CallArgs) -> Result<Payload, BlockError> {
        let _ = args;
        Err(BlockError::UnknownCall(name.to_string()))
    }
}

/// Value used for a minimum when a direction has no ports.
pub const UNBOUNDED_ELEMENTS: usize = 1 << 30;

/// Per cycle element minima computed before `work`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkInfo {
    /// Minimum over indexed inputs and outputs.
    pub min_elements: usize,
    pub min_in_elements: usize,
    pub min_out_elements: usize,
    /// Minimum over all inputs and outputs, named ones included.
    pub min_all_elements: usize,
    pub min_all_in_elements: usize,
    pub min_all_out_elements: usize,
    /// Longest a block should block inside `work`.
    pub max_timeout: Duration,
}

impl Default for WorkInfo {
    fn default() -> Self {
        Self {
            min_elements: UNBOUNDED_ELEMENTS,
            min_in_elements: UNBOUNDED_ELEMENTS,
            min_out_elements: UNBOUNDED_ELEMENTS,
            min_all_elements: UNBOUNDED_ELEMENTS,
            min_all_in_elements: UNBOUNDED_ELEMENTS,
            min_all_out_elements: UNBOUNDED_ELEMENTS,
            max_timeout: Duration::from_millis(1),
        }
    }
}

/// Ports and work info handed to [`Block::work`].
pub struct WorkContext<'a> {
    pub inputs: &'a mut PortTable<InputPort>,
    pub outputs: &'a mut PortTable<OutputPort>,
    info: &'a WorkInfo,
}

impl<'a> WorkContext<'a> {
    pub(crate) fn new(
        inputs: &'a mut PortTable<InputPort>,
        outputs: &'a mut PortTable<OutputPort>,
        info: &'a WorkInfo,
    ) -> Self {
        Self {
            inputs,
            outputs,
            info,
        }
    }

    pub fn info(&self) -> &WorkInfo {
        self.info
    }

    pub fn input(&mut self, port: impl Into<PortId>) -> Option<&mut InputPort> {
        self.inputs.get_mut(port)
    }

    pub fn output(&mut self, port: impl Into<PortId>) -> Option<&mut OutputPort> {
        self.outputs.get_mut(port)
    }
}

/// Arguments of an opaque call.
#[derive(Debug, Clone)]
pub struct CallArgs {
    call: String,
    args: Vec<Payload>,
}

impl CallArgs {
    pub fn new(call: impl Into<String>, args: Vec<Payload>) -> Self {
        Self {
            call: call.into(),
            args,
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn expect_len(&self, expected: usize) -> Result<(), BlockError> {
        if self.args.len() != expected {
            return Err(BlockError::ArgumentCount {
                call: self.call.clone(),
                expected,
                actual: self.args.len(),
            });
        }
        Ok(())
    }

    /// The argument at `index` as a `T`.
    pub fn get<T: Any>(&self, index: usize) -> Result<&T, BlockError> {
        let arg = self.args.get(index).ok_or_else(|| BlockError::ArgumentCount {
            call: self.call.clone(),
            expected: index + 1,
            actual: self.args.len(),
        })?;
        arg.downcast_ref::<T>().ok_or_else(|| BlockError::ArgumentType {
            call: self.call.clone(),
            index,
            expected: std::any::type_name::<T>(),
        })
    }

    pub fn into_payloads(self) -> Vec<Payload> {
        self.args
    }
}

/// Port declarations collected from [`Block::setup`].
#[derive(Default)]
pub struct PortSetup {
    pub(crate) inputs: Vec<InputDecl>,
    pub(crate) outputs: Vec<OutputDecl>,
}

impl PortSetup {
    pub fn input(&mut self, port: impl Into<PortId>, dtype: DType) -> &mut InputDecl {
        self.inputs.push(InputDecl {
            name: port.into().to_name(),
            dtype,
            reserve: None,
        });
        let last = self.inputs.len() - 1;
        &mut self.inputs[last]
    }

    pub fn output(&mut self, port: impl Into<PortId>, dtype: DType) -> &mut OutputDecl {
        self.outputs.push(OutputDecl {
            name: port.into().to_name(),
            dtype,
            manager: ManagerChoice::Kind(BufferManagerKind::Generic),
            buffers: None,
        });
        let last = self.outputs.len() - 1;
        &mut self.outputs[last]
    }
}

pub struct InputDecl {
    pub(crate) name: String,
    pub(crate) dtype: DType,
    pub(crate) reserve: Option<usize>,
}

impl InputDecl {
    /// Elements required before the block runs.
    pub fn reserve(&mut self, elements: usize) -> &mut Self {
        self.reserve = Some(elements);
        self
    }
}

pub(crate) enum ManagerChoice {
    Kind(BufferManagerKind),
    Factory(BufferManagerFactory),
}

pub struct OutputDecl {
    pub(crate) name: String,
    pub(crate) dtype: DType,
    pub(crate) manager: ManagerChoice,
    pub(crate) buffers: Option<BufferManagerArgs>,
}

impl OutputDecl {
    pub fn buffers(&mut self, args: BufferManagerArgs) -> &mut Self {
        self.buffers = Some(args);
        self
    }

    pub fn manager(&mut self, kind: BufferManagerKind) -> &mut Self {
        self.manager = ManagerChoice::Kind(kind);
        self
    }

    pub fn manager_factory(&mut self, factory: BufferManagerFactory) -> &mut Self {
        self.manager = ManagerChoice::Factory(factory);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{CallArgs, PortSetup};
    use crate::dtype::DType;
    use crate::error::BlockError;
    use crate::payload::Payload;

    #[test]
    fn call_args_check_count_and_type() {
        let args = CallArgs::new("setGain", vec![Payload::new(0.5f32)]);
        assert_eq!(args.get::<f32>(0).copied(), Ok(0.5));
        assert!(args.expect_len(1).is_ok());
        assert!(matches!(
            args.get::<u32>(0),
            Err(BlockError::ArgumentType { index: 0, .. })
        ));
        assert!(matches!(
            args.get::<f32>(1),
            Err(BlockError::ArgumentCount {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn port_setup_normalizes_indexed_names() {
        let mut setup = PortSetup::default();
        setup.input(0, DType::byte()).reserve(8);
        setup.output("out", DType::of::<f32>());
        assert_eq!(setup.inputs[0].name, "0");
        assert_eq!(setup.inputs[0].reserve, Some(8));
        assert_eq!(setup.outputs[0].name, "out");
    }
}
