use blockflow_runtime::thread_actor::{ActorContext, Handler};

use crate::worker::actor::WorkerActor;
use crate::worker::messages::BumpMessage;

impl Handler<BumpMessage> for WorkerActor {
    fn handle(&mut self, _message: BumpMessage, ctx: &mut ActorContext<Self>) {
        ctx.rearm();
    }
}
