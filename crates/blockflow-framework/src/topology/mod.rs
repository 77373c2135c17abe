//! Connection graphs of workers, nested topologies and their commit.
//!
//! Edits made with [`Topology::connect`] and [`Topology::disconnect`] only
//! record intent. [`Topology::commit`] flattens the hierarchy into links
//! between concrete worker ports, diffs them against what is live, and sends
//! the subscription messages and lifecycle calls the difference requires.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::TopologyConfig;
use crate::error::FrameworkError;
use crate::port::PortId;
use crate::worker::{Worker, WorkerId};

mod breaker;
mod commit;
mod flatten;
mod flow;
mod wait;

pub use flow::FlowInfo;

use commit::ActiveLink;
use flatten::LinkKey;
use flow::{Endpoint, Flow};

/// Process unique identity of one topology, used as its hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "topology#{}", self.0)
    }
}

/// Either side of a connection.
#[derive(Debug, Clone)]
pub enum Node {
    Worker(Worker),
    Topology(Topology),
}

impl From<Worker> for Node {
    fn from(worker: Worker) -> Self {
        Self::Worker(worker)
    }
}

impl From<&Worker> for Node {
    fn from(worker: &Worker) -> Self {
        Self::Worker(worker.clone())
    }
}

impl From<Topology> for Node {
    fn from(topology: Topology) -> Self {
        Self::Topology(topology)
    }
}

impl From<&Topology> for Node {
    fn from(topology: &Topology) -> Self {
        Self::Topology(topology.clone())
    }
}

/// Cloneable handle to a connection graph.
///
/// Connecting a topology to itself declares its boundary ports: a flow from
/// `(self, p)` feeds topology input `p` into the graph and a flow into
/// `(self, p)` exposes topology output `p`. Using a topology as an endpoint of
/// another nests it. Commit only the outermost topology of a hierarchy.
#[derive(Clone)]
pub struct Topology {
    inner: Arc<TopologyInner>,
}

struct TopologyInner {
    scope: ScopeId,
    config: TopologyConfig,
    state: Mutex<TopologyState>,
}

#[derive(Default)]
struct TopologyState {
    /// Declared flows, applied on the next commit.
    flows: Vec<Flow>,
    /// Committed links between concrete worker ports.
    active: BTreeMap<LinkKey, ActiveLink>,
    /// Workers this topology has activated.
    running: BTreeMap<WorkerId, Worker>,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology {
    pub fn new() -> Self {
        Self::with_config(TopologyConfig::default())
    }

    pub fn with_config(config: TopologyConfig) -> Self {
        Self {
            inner: Arc::new(TopologyInner {
                scope: ScopeId::next(),
                config,
                state: Mutex::new(TopologyState::default()),
            }),
        }
    }

    /// Display name, unique within the process.
    pub fn name(&self) -> String {
        self.inner.scope.to_string()
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.inner.config
    }

    /// Records a flow from `src:src_port` to `dst:dst_port`.
    ///
    /// Worker endpoints are checked for a port of the right direction; an
    /// indexed port counts as present when a lower index exists, since it
    /// is allocated on subscribe.
    pub fn connect(
        &self,
        src: impl Into<Node>,
        src_port: impl Into<PortId>,
        dst: impl Into<Node>,
        dst_port: impl Into<PortId>,
    ) -> Result<(), FrameworkError> {
        let flow = self.flow(src.into(), src_port.into(), dst.into(), dst_port.into());
        flow.validate()?;
        let mut state = self.inner.state.lock();
        if state.flows.contains(&flow) {
            return Err(FrameworkError::FlowExists(flow.to_string()));
        }
        debug!(topology = %self.inner.scope, %flow, "flow connected");
        state.flows.push(flow);
        Ok(())
    }

    /// Removes a previously connected flow.
    pub fn disconnect(
        &self,
        src: impl Into<Node>,
        src_port: impl Into<PortId>,
        dst: impl Into<Node>,
        dst_port: impl Into<PortId>,
    ) -> Result<(), FrameworkError> {
        let flow = self.flow(src.into(), src_port.into(), dst.into(), dst_port.into());
        let mut state = self.inner.state.lock();
        let Some(position) = state.flows.iter().position(|f| *f == flow) else {
            return Err(FrameworkError::FlowMissing(flow.to_string()));
        };
        state.flows.remove(position);
        debug!(topology = %self.inner.scope, %flow, "flow disconnected");
        Ok(())
    }

    /// Drops every declared flow here and in nested topologies.
    ///
    /// Like any edit this takes effect on the next commit.
    pub fn disconnect_all(&self) {
        let flows = std::mem::take(&mut self.inner.state.lock().flows);
        for flow in &flows {
            for topology in flow.sub_topologies() {
                topology.disconnect_all();
            }
        }
        debug!(topology = %self.inner.scope, removed = flows.len(), "all flows disconnected");
    }

    /// Live links, sorted.
    pub fn active_flows(&self) -> Vec<FlowInfo> {
        let state = self.inner.state.lock();
        let mut flows: Vec<FlowInfo> = state.active.values().map(ActiveLink::info).collect();
        flows.sort();
        flows
    }

    /// Passthrough workers currently bridging hierarchy levels.
    pub fn breaker_count(&self) -> usize {
        let state = self.inner.state.lock();
        state
            .active
            .values()
            .filter(|link| link.breakers.is_some())
            .count()
            * 2
    }

    pub(crate) fn scope(&self) -> ScopeId {
        self.inner.scope
    }

    pub(crate) fn flows(&self) -> Vec<Flow> {
        self.inner.state.lock().flows.clone()
    }

    fn endpoint(&self, node: Node) -> Endpoint {
        match node {
            Node::Worker(worker) => Endpoint::Block(worker),
            Node::Topology(topology) if topology.scope() == self.scope() => Endpoint::Own,
            Node::Topology(topology) => Endpoint::Sub(topology),
        }
    }

    fn flow(&self, src: Node, src_port: PortId, dst: Node, dst_port: PortId) -> Flow {
        Flow {
            src: self.endpoint(src),
            src_port,
            dst: self.endpoint(dst),
            dst_port,
        }
    }
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("scope", &self.inner.scope)
            .finish()
    }
}

impl Drop for TopologyInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.active.is_empty() {
            return;
        }
        debug!(topology = %self.scope, links = state.active.len(), "tearing down live links");
        let active = std::mem::take(&mut state.active);
        let running = std::mem::take(&mut state.running);
        commit::teardown(active.into_values(), running.into_values());
    }
}
