//! Resolution of a topology tree into links between worker ports.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::port::PortId;
use crate::topology::ScopeId;
use crate::topology::flow::{Endpoint, Flow};
use crate::worker::{Worker, WorkerId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Vertex {
    BlockOut(WorkerId, String),
    BlockIn(WorkerId, String),
    TopologyIn(ScopeId, String),
    TopologyOut(ScopeId, String),
}

struct Edge {
    to: Vertex,
    /// Scope of the topology that declared the flow.
    scope: ScopeId,
}

/// Identity of a link; scopes are part of it so re-nesting rebuilds the link.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct LinkKey {
    src: WorkerId,
    src_port: String,
    src_scope: ScopeId,
    dst: WorkerId,
    dst_port: String,
    dst_scope: ScopeId,
}

/// Output port of one worker feeding an input port of another.
///
/// Each end is scoped to the topology whose flow names that worker.
#[derive(Clone)]
pub(crate) struct Link {
    pub(crate) src: Worker,
    pub(crate) src_port: PortId,
    pub(crate) src_scope: ScopeId,
    pub(crate) dst: Worker,
    pub(crate) dst_port: PortId,
    pub(crate) dst_scope: ScopeId,
}

impl Link {
    pub(crate) fn key(&self) -> LinkKey {
        LinkKey {
            src: self.src.id(),
            src_port: self.src_port.to_name(),
            src_scope: self.src_scope,
            dst: self.dst.id(),
            dst_port: self.dst_port.to_name(),
            dst_scope: self.dst_scope,
        }
    }

    pub(crate) fn crosses_scope(&self) -> bool {
        self.src_scope != self.dst_scope
    }
}

/// Flattens `flows` of the topology at `root` and every topology nested in
/// them. Boundary ports of `root` itself stay unresolved.
pub(crate) fn flatten(root: ScopeId, flows: Vec<Flow>) -> BTreeMap<LinkKey, Link> {
    let mut graph: HashMap<Vertex, Vec<Edge>> = HashMap::new();
    let mut workers: HashMap<WorkerId, Worker> = HashMap::new();
    let mut visited = HashSet::from([root]);
    let mut pending = vec![(root, flows)];

    while let Some((scope, flows)) = pending.pop() {
        for flow in flows {
            let src_port = flow.src_port.to_name();
            let from = match &flow.src {
                Endpoint::Block(worker) => {
                    workers.insert(worker.id(), worker.clone());
                    Vertex::BlockOut(worker.id(), src_port)
                },
                Endpoint::Own => Vertex::TopologyIn(scope, src_port),
                Endpoint::Sub(topology) => Vertex::TopologyOut(topology.scope(), src_port),
            };
            let dst_port = flow.dst_port.to_name();
            let to = match &flow.dst {
                Endpoint::Block(worker) => {
                    workers.insert(worker.id(), worker.clone());
                    Vertex::BlockIn(worker.id(), dst_port)
                },
                Endpoint::Own => Vertex::TopologyOut(scope, dst_port),
                Endpoint::Sub(topology) => Vertex::TopologyIn(topology.scope(), dst_port),
            };
            for topology in flow.sub_topologies() {
                if visited.insert(topology.scope()) {
                    pending.push((topology.scope(), topology.flows()));
                }
            }
            graph.entry(from).or_default().push(Edge { to, scope });
        }
    }

    let mut links = BTreeMap::new();
    for (vertex, edges) in &graph {
        let Vertex::BlockOut(src, src_port) = vertex else {
            continue;
        };
        for edge in edges {
            let mut reached = Vec::new();
            let mut path = Vec::new();
            walk(&graph, &edge.to, edge.scope, &mut path, &mut reached);
            for (dst, dst_port, dst_scope) in reached {
                let link = Link {
                    src: workers[src].clone(),
                    src_port: PortId::from(src_port.as_str()),
                    src_scope: edge.scope,
                    dst: workers[&dst].clone(),
                    dst_port: PortId::from(dst_port),
                    dst_scope,
                };
                links.insert(link.key(), link);
            }
        }
    }
    links
}

/// Follows boundary vertices until block inputs are reached.
fn walk<'a>(
    graph: &'a HashMap<Vertex, Vec<Edge>>,
    vertex: &'a Vertex,
    scope: ScopeId,
    path: &mut Vec<&'a Vertex>,
    reached: &mut Vec<(WorkerId, String, ScopeId)>,
) {
    match vertex {
        Vertex::BlockIn(worker, port) => reached.push((*worker, port.clone(), scope)),
        Vertex::BlockOut(..) => {},
        Vertex::TopologyIn(..) | Vertex::TopologyOut(..) => {
            if path.contains(&vertex) {
                return;
            }
            path.push(vertex);
            for edge in graph.get(vertex).into_iter().flatten() {
                walk(graph, &edge.to, edge.scope, path, reached);
            }
            path.pop();
        },
    }
}
