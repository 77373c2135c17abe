use blockflow_runtime::thread_actor::{ActorContext, Handler};

use crate::worker::actor::WorkerActor;
use crate::worker::messages::StatsMessage;
use crate::worker::stats::{WorkerStats, clock_ticks};

impl Handler<StatsMessage> for WorkerActor {
    fn handle(&mut self, _message: StatsMessage, ctx: &mut ActorContext<Self>) -> WorkerStats {
        self.stats.ticks_stats_query = clock_ticks();
        ctx.rearm();
        self.stats.clone()
    }
}
