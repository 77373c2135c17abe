use blockflow_runtime::thread_actor::{ActorContext, Handler};
use tracing::debug;

use crate::worker::actor::WorkerActor;
use crate::worker::messages::DeactivateMessage;

impl Handler<DeactivateMessage> for WorkerActor {
    fn handle(
        &mut self,
        _message: DeactivateMessage,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), String> {
        if self.shut_down {
            return Ok(());
        }
        self.active = false;
        let result = self.guarded(|block| block.deactivate());
        debug!(worker = %self.name, ok = result.is_ok(), "worker deactivated");
        result
    }
}
