use blockflow_runtime::thread_actor::{ActorContext, Handler};
use tracing::debug;

use crate::worker::actor::WorkerActor;
use crate::worker::messages::ShutdownMessage;

impl Handler<ShutdownMessage> for WorkerActor {
    fn handle(&mut self, _message: ShutdownMessage, _ctx: &mut ActorContext<Self>) {
        if self.shut_down {
            return;
        }
        self.inputs.clear();
        self.outputs.clear();
        self.active = false;
        self.shut_down = true;
        debug!(worker = %self.name, "worker shut down");
    }
}
