use blockflow_runtime::thread_actor::{ActorContext, Handler};

use crate::error::FrameworkError;
use crate::worker::actor::WorkerActor;
use crate::worker::messages::SetupPortsMessage;

impl Handler<SetupPortsMessage> for WorkerActor {
    fn handle(
        &mut self,
        _message: SetupPortsMessage,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), FrameworkError> {
        let result = self.setup_ports(ctx);
        if result.is_err() {
            // Ports hold our own address; drop them so the thread can exit.
            self.inputs.clear();
            self.outputs.clear();
            self.shut_down = true;
        }
        result
    }
}
