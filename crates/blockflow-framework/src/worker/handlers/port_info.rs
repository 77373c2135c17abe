use blockflow_runtime::thread_actor::{ActorContext, Handler};

use crate::error::ProtocolError;
use crate::port::{InputPort, OutputPort, PortDirection, PortInfo};
use crate::worker::actor::WorkerActor;
use crate::worker::messages::PortInfoMessage;

impl Handler<PortInfoMessage> for WorkerActor {
    fn handle(
        &mut self,
        message: PortInfoMessage,
        ctx: &mut ActorContext<Self>,
    ) -> Result<Vec<PortInfo>, ProtocolError> {
        ctx.rearm();
        let PortInfoMessage { direction, port } = message;
        let Some(port) = port else {
            return Ok(match direction {
                PortDirection::Input => self.inputs.iter().map(InputPort::info).collect(),
                PortDirection::Output => self.outputs.iter().map(OutputPort::info).collect(),
            });
        };
        let info = match direction {
            PortDirection::Input => self.inputs.get(&port).map(InputPort::info),
            PortDirection::Output => self.outputs.get(&port).map(OutputPort::info),
        };
        info.map(|info| vec![info])
            .ok_or_else(|| ProtocolError::NoSuchPort {
                direction,
                port: port.to_name(),
            })
    }
}
