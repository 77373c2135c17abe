use blockflow_runtime::thread_actor::{ActorContext, Tick};

use crate::worker::actor::WorkerActor;

impl Tick for WorkerActor {
    fn tick(&mut self, ctx: &mut ActorContext<Self>) {
        self.work_cycle(ctx);
    }
}
