//! Typed errors for blocks, the subscription protocol and worker control.

use std::time::Duration;

use blockflow_buffer::BufferError;
use blockflow_runtime::thread_actor::CallError;
use thiserror::Error;

use crate::port::PortDirection;

/// Errors a block reports from its hooks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    /// Free-form failure text.
    #[error("{0}")]
    Message(String),
    /// The opaque call dispatcher has no entry with this name.
    #[error("no call named '{0}'")]
    UnknownCall(String),
    /// A call received the wrong number of arguments.
    #[error("call '{call}' expects {expected} arguments, got {actual}")]
    ArgumentCount {
        /// Call name.
        call: String,
        /// Expected argument count.
        expected: usize,
        /// Received argument count.
        actual: usize,
    },
    /// A call argument has an unexpected type.
    #[error("argument {index} of call '{call}' is not a {expected}")]
    ArgumentType {
        /// Call name.
        call: String,
        /// Zero based argument position.
        index: usize,
        /// Expected type name.
        expected: &'static str,
    },
}

impl From<String> for BlockError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for BlockError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

/// Wiring protocol violations, reported to the issuing caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The addressed port does not exist and cannot be allocated on demand.
    #[error("no {direction} port named '{port}'")]
    NoSuchPort {
        /// Direction the port was looked up in.
        direction: PortDirection,
        /// Port name as addressed.
        port: String,
    },
    /// The subscriber is already on the port's list.
    #[error("subscription {subscriber} already exists on {direction} port '{port}'")]
    DuplicateSubscription {
        /// Direction of the local port.
        direction: PortDirection,
        /// Local port name.
        port: String,
        /// Remote end as `worker:port`.
        subscriber: String,
    },
    /// An unsubscribe named a subscriber the port does not have.
    #[error("subscription {subscriber} is missing from {direction} port '{port}'")]
    MissingSubscription {
        /// Direction of the local port.
        direction: PortDirection,
        /// Local port name.
        port: String,
        /// Remote end as `worker:port`.
        subscriber: String,
    },
}

/// Error returned in place of a result by an opaque block call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Block::call({call}): {message}")]
pub struct BlockCallError {
    /// Name of the call that failed.
    pub call: String,
    /// Error or panic text raised by the block.
    pub message: String,
}

/// Errors produced by worker handles and topologies.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// Worker thread could not be spawned.
    #[error("failed to spawn worker '{name}': {source}")]
    SpawnWorker {
        /// Worker name.
        name: String,
        /// I/O error returned by thread spawn.
        #[source]
        source: std::io::Error,
    },
    /// A declared port could not allocate its buffers.
    #[error("failed to set up ports of worker '{worker}': {source}")]
    PortSetup {
        /// Worker name.
        worker: String,
        /// Underlying allocation error.
        #[source]
        source: BufferError,
    },
    /// Worker call timed out.
    #[error("worker call '{operation}' timed out after {timeout_ms}ms")]
    WorkerCallTimedOut {
        /// Operation name used for the actor call.
        operation: &'static str,
        /// Timeout budget used for the actor call.
        timeout_ms: u128,
    },
    /// Worker exited before the operation completed.
    #[error("worker exited while handling '{operation}'")]
    WorkerExited {
        /// Operation name used for the actor call.
        operation: &'static str,
    },
    /// A subscription message was rejected.
    #[error("worker '{worker}' rejected subscription: {source}")]
    Protocol {
        /// Worker that rejected the message.
        worker: String,
        /// Rejection reason.
        #[source]
        source: ProtocolError,
    },
    /// The block failed to activate.
    #[error("failed to activate worker '{worker}': {message}")]
    Activate {
        /// Worker name.
        worker: String,
        /// Error or panic text from the activate hook.
        message: String,
    },
    /// The block failed to deactivate.
    #[error("failed to deactivate worker '{worker}': {message}")]
    Deactivate {
        /// Worker name.
        worker: String,
        /// Error or panic text from the deactivate hook.
        message: String,
    },
    /// An opaque block call failed.
    #[error(transparent)]
    Call(#[from] BlockCallError),
    /// The two ends of a flow cannot be connected.
    #[error("cannot connect {flow}: {reason}")]
    IncompatibleEndpoints {
        /// Flow as `src:port -> dst:port`.
        flow: String,
        /// Which end failed validation.
        reason: String,
    },
    /// The same flow was connected twice.
    #[error("flow {0} is already connected")]
    FlowExists(String),
    /// A disconnect named a flow that was never connected.
    #[error("flow {0} is not connected")]
    FlowMissing(String),
    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl FrameworkError {
    pub(crate) fn from_call_error(
        operation: &'static str,
        timeout: Duration,
        err: CallError,
    ) -> Self {
        match err {
            CallError::MailboxClosed | CallError::ActorStopped => {
                Self::WorkerExited { operation }
            },
            CallError::Timeout => Self::WorkerCallTimedOut {
                operation,
                timeout_ms: timeout.as_millis(),
            },
        }
    }
}
