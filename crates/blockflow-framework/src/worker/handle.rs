use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use blockflow_buffer::BufferChunk;
use blockflow_runtime::thread_actor::{ActorRef, Handler, Message, spawn_ticking_actor_named};
use tracing::debug;

use crate::block::Block;
use crate::config::WorkerConfig;
use crate::error::{FrameworkError, ProtocolError};
use crate::label::Label;
use crate::payload::Payload;
use crate::port::{PortDirection, PortId, PortInfo, PortSubscriber};
use crate::worker::WorkerId;
use crate::worker::actor::WorkerActor;
use crate::worker::messages::{
    ActivateMessage, BumpMessage, CallMessage, DeactivateMessage, DeliverBufferMessage,
    DeliverLabelMessage, DeliverMessageMessage, PortInfoMessage, SetupPortsMessage,
    ShutdownMessage, StatsMessage, SubscribeMessage, SubscriptionAction,
};
use crate::worker::stats::WorkerStats;

/// Cloneable handle to a block running on its own worker thread.
///
/// The thread exits once every handle and every subscription pointing at it
/// is gone. Call [`Worker::shutdown`] to drop the ports, which releases the
/// subscriptions this worker holds on others.
#[derive(Clone)]
pub struct Worker {
    id: WorkerId,
    name: Arc<str>,
    actor_ref: ActorRef<WorkerActor>,
    timeout: Duration,
}

impl Worker {
    /// Starts `block` on a new thread and sets up its ports.
    pub fn spawn<B: Block>(
        name: impl Into<String>,
        block: B,
        config: &WorkerConfig,
    ) -> Result<Self, FrameworkError> {
        Self::spawn_boxed(name, Box::new(block), config)
    }

    pub fn spawn_boxed(
        name: impl Into<String>,
        block: Box<dyn Block>,
        config: &WorkerConfig,
    ) -> Result<Self, FrameworkError> {
        let name: String = name.into();
        let id = WorkerId::next();
        let shared_name: Arc<str> = Arc::from(name.as_str());
        let actor = WorkerActor::new(id, Arc::clone(&shared_name), block, config.clone());
        let (actor_ref, _join) = spawn_ticking_actor_named(
            actor,
            format!("blockflow-worker-{name}"),
            config.idle_poll_interval,
        )
        .map_err(|source| FrameworkError::SpawnWorker {
            name: name.clone(),
            source,
        })?;

        let worker = Self {
            id,
            name: shared_name,
            actor_ref,
            timeout: config.call_timeout,
        };
        worker.request("setup_ports", SetupPortsMessage)??;
        debug!(worker = %worker.name, id = %worker.id, "worker started");
        Ok(worker)
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marks the worker active, then runs the block's activate hook.
    pub fn activate(&self) -> Result<(), FrameworkError> {
        self.request("activate", ActivateMessage)?
            .map_err(|message| FrameworkError::Activate {
                worker: self.name.to_string(),
                message,
            })
    }

    pub fn deactivate(&self) -> Result<(), FrameworkError> {
        self.request("deactivate", DeactivateMessage)?
            .map_err(|message| FrameworkError::Deactivate {
                worker: self.name.to_string(),
                message,
            })
    }

    /// Drops every port and stops scheduling. Repeated calls do nothing.
    pub fn shutdown(&self) -> Result<(), FrameworkError> {
        self.request("shutdown", ShutdownMessage)
    }

    /// Snapshot of the activity counters, stamped with the query time.
    pub fn stats(&self) -> Result<WorkerStats, FrameworkError> {
        self.request("stats", StatsMessage)
    }

    /// Describes one port, or every port of `direction` when `port` is `None`.
    pub fn port_info(
        &self,
        direction: PortDirection,
        port: Option<PortId>,
    ) -> Result<Vec<PortInfo>, FrameworkError> {
        self.request("port_info", PortInfoMessage { direction, port })?
            .map_err(|source| FrameworkError::Protocol {
                worker: self.name.to_string(),
                source,
            })
    }

    pub fn inputs(&self) -> Result<Vec<PortInfo>, FrameworkError> {
        self.port_info(PortDirection::Input, None)
    }

    pub fn outputs(&self) -> Result<Vec<PortInfo>, FrameworkError> {
        self.port_info(PortDirection::Output, None)
    }

    pub fn input(&self, port: impl Into<PortId>) -> Result<PortInfo, FrameworkError> {
        self.single_port(PortDirection::Input, port.into())
    }

    pub fn output(&self, port: impl Into<PortId>) -> Result<PortInfo, FrameworkError> {
        self.single_port(PortDirection::Output, port.into())
    }

    /// Invokes the block's named call on the worker thread.
    pub fn call(
        &self,
        name: impl Into<String>,
        args: Vec<Payload>,
    ) -> Result<Payload, FrameworkError> {
        let message = CallMessage {
            name: name.into(),
            args,
        };
        Ok(self.request("call", message)??)
    }

    /// Requests a scheduling pass without delivering anything.
    pub fn bump(&self) -> Result<(), FrameworkError> {
        self.tell("bump", BumpMessage)
    }

    /// Queues an async message on one of this worker's inputs.
    pub fn post_message(
        &self,
        port: impl Into<PortId>,
        message: Payload,
    ) -> Result<(), FrameworkError> {
        let port = port.into();
        self.tell("post_message", DeliverMessageMessage { port, message })
    }

    /// Queues a label on one of this worker's inputs.
    pub fn post_label(&self, port: impl Into<PortId>, label: Label) -> Result<(), FrameworkError> {
        let port = port.into();
        self.tell("post_label", DeliverLabelMessage { port, label })
    }

    /// Appends a chunk to the stream of one of this worker's inputs.
    pub fn post_buffer(
        &self,
        port: impl Into<PortId>,
        chunk: BufferChunk,
    ) -> Result<(), FrameworkError> {
        let port = port.into();
        self.tell("post_buffer", DeliverBufferMessage { port, chunk })
    }

    pub(crate) fn subscriber(&self, port: &PortId) -> PortSubscriber {
        PortSubscriber {
            worker: self.id,
            worker_name: Arc::clone(&self.name),
            port: port.to_name(),
            actor: self.actor_ref.clone(),
        }
    }

    pub(crate) fn subscribe(
        &self,
        action: SubscriptionAction,
        port: &PortId,
        subscriber: PortSubscriber,
    ) -> Result<(), FrameworkError> {
        let message = SubscribeMessage {
            action,
            port: port.clone(),
            subscriber,
        };
        self.request("subscribe", message)?
            .map_err(|source| FrameworkError::Protocol {
                worker: self.name.to_string(),
                source,
            })
    }

    /// Sends a subscription change without a reply address.
    ///
    /// Protocol errors on the remote side are dropped.
    pub(crate) fn subscribe_detached(
        &self,
        action: SubscriptionAction,
        port: &PortId,
        subscriber: PortSubscriber,
    ) -> Result<(), FrameworkError> {
        let message = SubscribeMessage {
            action,
            port: port.clone(),
            subscriber,
        };
        self.actor_ref
            .tell(message)
            .map_err(|_| FrameworkError::WorkerExited {
                operation: "subscribe",
            })
    }

    fn single_port(
        &self,
        direction: PortDirection,
        port: PortId,
    ) -> Result<PortInfo, FrameworkError> {
        let infos = self.port_info(direction, Some(port.clone()))?;
        infos.into_iter().next().ok_or_else(|| FrameworkError::Protocol {
            worker: self.name.to_string(),
            source: ProtocolError::NoSuchPort {
                direction,
                port: port.to_name(),
            },
        })
    }

    fn request<M>(
        &self,
        operation: &'static str,
        message: M,
    ) -> Result<M::Response, FrameworkError>
    where
        M: Message,
        WorkerActor: Handler<M>,
    {
        self.actor_ref
            .call(message, self.timeout)
            .map_err(|err| FrameworkError::from_call_error(operation, self.timeout, err))
    }

    fn tell<M>(&self, operation: &'static str, message: M) -> Result<(), FrameworkError>
    where
        M: Message<Response = ()>,
        WorkerActor: Handler<M>,
    {
        self.actor_ref
            .cast(message)
            .map_err(|_| FrameworkError::WorkerExited { operation })
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
