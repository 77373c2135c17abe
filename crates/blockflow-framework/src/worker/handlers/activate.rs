use blockflow_runtime::thread_actor::{ActorContext, Handler};
use tracing::debug;

use crate::worker::actor::WorkerActor;
use crate::worker::messages::ActivateMessage;

impl Handler<ActivateMessage> for WorkerActor {
    fn handle(
        &mut self,
        _message: ActivateMessage,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), String> {
        if self.shut_down {
            return Err("worker is shut down".to_string());
        }
        // The flag stays set even when the hook fails.
        self.active = true;
        let result = self.guarded(|block| block.activate());
        debug!(worker = %self.name, ok = result.is_ok(), "worker activated");
        ctx.rearm();
        result
    }
}
