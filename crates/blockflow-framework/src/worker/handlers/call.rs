use blockflow_runtime::thread_actor::{ActorContext, Handler};

use crate::block::CallArgs;
use crate::error::BlockCallError;
use crate::payload::Payload;
use crate::worker::actor::WorkerActor;
use crate::worker::messages::CallMessage;

impl Handler<CallMessage> for WorkerActor {
    fn handle(
        &mut self,
        message: CallMessage,
        ctx: &mut ActorContext<Self>,
    ) -> Result<Payload, BlockCallError> {
        let CallMessage { name, args } = message;
        let args = CallArgs::new(name.clone(), args);
        let result = self.guarded(|block| (**block).call(&name, args));
        // Calls may change what the block is able to do next.
        ctx.rearm();
        result.map_err(|message| BlockCallError {
            call: name,
            message,
        })
    }
}
