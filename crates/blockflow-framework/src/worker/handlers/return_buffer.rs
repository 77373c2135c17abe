use blockflow_runtime::thread_actor::{ActorContext, Handler};
use tracing::debug;

use crate::worker::actor::WorkerActor;
use crate::worker::messages::BufferReturnMessage;

impl Handler<BufferReturnMessage> for WorkerActor {
    fn handle(&mut self, message: BufferReturnMessage, ctx: &mut ActorContext<Self>) {
        let BufferReturnMessage { pool, buffer } = message;
        let Some(output) = self.outputs.iter_mut().find(|port| port.pool_id() == pool) else {
            debug!(worker = %self.name, %pool, "releasing buffer of a retired pool");
            return;
        };
        output.return_buffer(buffer);
        ctx.rearm();
    }
}
