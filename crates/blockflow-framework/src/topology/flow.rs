use std::fmt;

use serde::Serialize;

use crate::error::FrameworkError;
use crate::port::{PortDirection, PortId};
use crate::topology::Topology;
use crate::worker::Worker;

/// One end of a declared flow, as seen from the declaring topology.
#[derive(Clone)]
pub(crate) enum Endpoint {
    Block(Worker),
    /// The declaring topology's own boundary.
    Own,
    Sub(Topology),
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Block(a), Self::Block(b)) => a.id() == b.id(),
            (Self::Own, Self::Own) => true,
            (Self::Sub(a), Self::Sub(b)) => a.scope() == b.scope(),
            _ => false,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block(worker) => f.write_str(worker.name()),
            Self::Own => f.write_str("self"),
            Self::Sub(topology) => write!(f, "{}", topology.scope()),
        }
    }
}

#[derive(Clone, PartialEq)]
pub(crate) struct Flow {
    pub(crate) src: Endpoint,
    pub(crate) src_port: PortId,
    pub(crate) dst: Endpoint,
    pub(crate) dst_port: PortId,
}

impl Flow {
    /// Rejects flows whose worker ends lack a port of the needed direction.
    pub(crate) fn validate(&self) -> Result<(), FrameworkError> {
        if self.src == Endpoint::Own && self.dst == Endpoint::Own {
            return Err(self.incompatible("a topology cannot feed its own output directly"));
        }
        if let Some(reason) = missing_port(&self.src, &self.src_port, PortDirection::Output)? {
            return Err(self.incompatible(&reason));
        }
        if let Some(reason) = missing_port(&self.dst, &self.dst_port, PortDirection::Input)? {
            return Err(self.incompatible(&reason));
        }
        Ok(())
    }

    pub(crate) fn sub_topologies(&self) -> impl Iterator<Item = &Topology> {
        [&self.src, &self.dst].into_iter().filter_map(|endpoint| match endpoint {
            Endpoint::Sub(topology) => Some(topology),
            _ => None,
        })
    }

    fn incompatible(&self, reason: &str) -> FrameworkError {
        FrameworkError::IncompatibleEndpoints {
            flow: self.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src, self.src_port, self.dst, self.dst_port
        )
    }
}

fn missing_port(
    endpoint: &Endpoint,
    port: &PortId,
    direction: PortDirection,
) -> Result<Option<String>, FrameworkError> {
    let Endpoint::Block(worker) = endpoint else {
        return Ok(None);
    };
    let ports = worker.port_info(direction, None)?;
    let name = port.to_name();
    if ports.iter().any(|info| info.name == name) {
        return Ok(None);
    }
    let allocatable = port.index().is_some_and(|index| {
        ports
            .iter()
            .any(|info| info.index.is_some_and(|existing| existing < index))
    });
    if allocatable {
        return Ok(None);
    }
    Ok(Some(format!("{} has no {direction} port '{name}'", worker.name())))
}

/// A committed link between two concrete worker ports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FlowInfo {
    pub src: String,
    pub src_port: String,
    pub dst: String,
    pub dst_port: String,
    /// Bridged by a pair of passthrough workers.
    pub crosses_scope: bool,
}

impl fmt::Display for FlowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src, self.src_port, self.dst, self.dst_port
        )
    }
}
