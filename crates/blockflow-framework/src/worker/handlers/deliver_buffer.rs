use blockflow_runtime::thread_actor::{ActorContext, Handler};

use crate::worker::actor::WorkerActor;
use crate::worker::messages::DeliverBufferMessage;

impl Handler<DeliverBufferMessage> for WorkerActor {
    fn handle(&mut self, message: DeliverBufferMessage, ctx: &mut ActorContext<Self>) {
        let Some(input) = self.input_mut(&message.port, "buffer") else {
            return;
        };
        input.push_buffer(message.chunk);
        ctx.rearm();
    }
}
