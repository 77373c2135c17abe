use std::fmt;

use blockflow_buffer::{BufferChunk, PoolId, SharedBuffer};
use blockflow_runtime::thread_actor::Message;

use crate::error::{BlockCallError, FrameworkError, ProtocolError};
use crate::label::Label;
use crate::payload::Payload;
use crate::port::{PortDirection, PortId, PortInfo, PortSubscriber};
use crate::worker::stats::WorkerStats;

pub(crate) struct SetupPortsMessage;

impl Message for SetupPortsMessage {
    type Response = Result<(), FrameworkError>;
}

/// Appends a chunk to an input's stream.
pub(crate) struct DeliverBufferMessage {
    pub(crate) port: PortId,
    pub(crate) chunk: BufferChunk,
}

impl Message for DeliverBufferMessage {
    type Response = ();
}

/// Queues a label at an absolute stream position.
pub(crate) struct DeliverLabelMessage {
    pub(crate) port: PortId,
    pub(crate) label: Label,
}

impl Message for DeliverLabelMessage {
    type Response = ();
}

pub(crate) struct DeliverMessageMessage {
    pub(crate) port: PortId,
    pub(crate) message: Payload,
}

impl Message for DeliverMessageMessage {
    type Response = ();
}

/// Hands a released buffer back to the pool that produced it.
pub(crate) struct BufferReturnMessage {
    pub(crate) pool: PoolId,
    pub(crate) buffer: SharedBuffer,
}

impl Message for BufferReturnMessage {
    type Response = ();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubscriptionAction {
    /// An input subscribes to one of our outputs.
    SubscribeInput,
    /// An output subscribes to one of our inputs.
    SubscribeOutput,
    /// Reverses [`SubscriptionAction::SubscribeInput`].
    UnsubscribeInput,
    /// Reverses [`SubscriptionAction::SubscribeOutput`].
    UnsubscribeOutput,
}

impl fmt::Display for SubscriptionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Self::SubscribeInput => "SUBINPUT",
            Self::SubscribeOutput => "SUBOUTPUT",
            Self::UnsubscribeInput => "UNSUBINPUT",
            Self::UnsubscribeOutput => "UNSUBOUTPUT",
        };
        f.write_str(action)
    }
}

pub(crate) struct SubscribeMessage {
    pub(crate) action: SubscriptionAction,
    /// Port on the receiving worker.
    pub(crate) port: PortId,
    pub(crate) subscriber: PortSubscriber,
}

impl Message for SubscribeMessage {
    type Response = Result<(), ProtocolError>;
}

pub(crate) struct ActivateMessage;

impl Message for ActivateMessage {
    type Response = Result<(), String>;
}

pub(crate) struct DeactivateMessage;

impl Message for DeactivateMessage {
    type Response = Result<(), String>;
}

pub(crate) struct ShutdownMessage;

impl Message for ShutdownMessage {
    type Response = ();
}

pub(crate) struct PortInfoMessage {
    pub(crate) direction: PortDirection,
    /// `None` asks for every port of the direction.
    pub(crate) port: Option<PortId>,
}

impl Message for PortInfoMessage {
    type Response = Result<Vec<PortInfo>, ProtocolError>;
}

pub(crate) struct StatsMessage;

impl Message for StatsMessage {
    type Response = WorkerStats;
}

pub(crate) struct CallMessage {
    pub(crate) name: String,
    pub(crate) args: Vec<Payload>,
}

impl Message for CallMessage {
    type Response = Result<Payload, BlockCallError>;
}

/// Requests a readiness check.
pub(crate) struct BumpMessage;

impl Message for BumpMessage {
    type Response = ();
}
