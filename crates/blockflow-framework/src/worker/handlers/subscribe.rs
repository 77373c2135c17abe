use blockflow_runtime::thread_actor::{ActorContext, Handler};
use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::port::{PortCore, PortDirection};
use crate::worker::actor::WorkerActor;
use crate::worker::messages::{SubscribeMessage, SubscriptionAction};

impl Handler<SubscribeMessage> for WorkerActor {
    fn handle(
        &mut self,
        message: SubscribeMessage,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), ProtocolError> {
        let SubscribeMessage {
            action,
            port,
            subscriber,
        } = message;
        // An input subscribing lands on one of our outputs and vice versa.
        let (direction, subscribing) = match action {
            SubscriptionAction::SubscribeInput => (PortDirection::Output, true),
            SubscriptionAction::SubscribeOutput => (PortDirection::Input, true),
            SubscriptionAction::UnsubscribeInput => (PortDirection::Output, false),
            SubscriptionAction::UnsubscribeOutput => (PortDirection::Input, false),
        };

        if subscribing {
            if let Err(err) = self.ensure_indexed_port(direction, &port, ctx) {
                warn!(worker = %self.name, %port, error = %err, "failed to allocate indexed port");
            }
        }

        let core: Option<&mut PortCore> = match direction {
            PortDirection::Input => self.inputs.get_mut(&port).map(|p| &mut p.core),
            PortDirection::Output => self.outputs.get_mut(&port).map(|p| &mut p.core),
        };
        let Some(core) = core else {
            return Err(ProtocolError::NoSuchPort {
                direction,
                port: port.to_name(),
            });
        };

        let summary = format!("{action} {direction}:{port} <- {subscriber}");
        if subscribing {
            core.subscribe(subscriber, direction)?;
        } else {
            core.unsubscribe(&subscriber, direction)?;
        }
        debug!(worker = %self.name, %summary, "subscription updated");
        ctx.rearm();
        Ok(())
    }
}
