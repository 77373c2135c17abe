use blockflow_runtime::thread_actor::{ActorContext, Handler};

use crate::worker::actor::WorkerActor;
use crate::worker::messages::DeliverLabelMessage;

impl Handler<DeliverLabelMessage> for WorkerActor {
    fn handle(&mut self, message: DeliverLabelMessage, ctx: &mut ActorContext<Self>) {
        let Some(input) = self.input_mut(&message.port, "label") else {
            return;
        };
        input.push_label(message.label);
        ctx.rearm();
    }
}
