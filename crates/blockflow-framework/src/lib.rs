#![deny(clippy::wildcard_imports)]

//! Actor-per-block dataflow scheduling.
//!
//! Every [`Block`] runs inside its own [`Worker`] thread. Workers exchange
//! buffers, labels and async messages through their ports, and a [`Topology`]
//! wires them together on [`Topology::commit`].

pub mod block;
pub mod config;
pub mod dtype;
pub mod error;
pub mod label;
pub mod logging;
pub mod payload;
pub mod port;
pub mod topology;
pub mod worker;

pub use block::{Block, CallArgs, PortSetup, WorkContext, WorkInfo};
pub use config::{TopologyConfig, WorkerConfig};
pub use dtype::DType;
pub use error::{BlockCallError, BlockError, FrameworkError, ProtocolError};
pub use label::Label;
pub use payload::Payload;
pub use port::{InputPort, OutputPort, PortDirection, PortId, PortInfo, PortTable};
pub use topology::{FlowInfo, Node, Topology};
pub use worker::{Worker, WorkerId, WorkerStats};
