use blockflow_runtime::thread_actor::{ActorContext, Handler};

use crate::worker::actor::WorkerActor;
use crate::worker::messages::DeliverMessageMessage;

impl Handler<DeliverMessageMessage> for WorkerActor {
    fn handle(&mut self, message: DeliverMessageMessage, ctx: &mut ActorContext<Self>) {
        let Some(input) = self.input_mut(&message.port, "message") else {
            return;
        };
        input.push_message(message.message);
        ctx.rearm();
    }
}
