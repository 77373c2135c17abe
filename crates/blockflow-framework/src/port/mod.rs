//! Named and indexed endpoints of a worker.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use blockflow_runtime::thread_actor::ActorRef;
use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::ProtocolError;
use crate::worker::WorkerId;
use crate::worker::actor::WorkerActor;

mod input;
mod output;

pub use input::InputPort;
pub use output::OutputPort;
pub(crate) use output::PortRecycler;

/// Port address: a name, or an index spelled as its decimal name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortId {
    Name(String),
    Index(usize),
}

impl PortId {
    pub fn to_name(&self) -> String {
        match self {
            Self::Name(name) => name.clone(),
            Self::Index(index) => index.to_string(),
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Name(name) => port_name_to_index(name),
            Self::Index(index) => Some(*index),
        }
    }
}

impl From<&str> for PortId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for PortId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&String> for PortId {
    fn from(name: &String) -> Self {
        Self::Name(name.clone())
    }
}

impl From<usize> for PortId {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&PortId> for PortId {
    fn from(port: &PortId) -> Self {
        port.clone()
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Index of a port whose name is all decimal digits.
pub fn port_name_to_index(name: &str) -> Option<usize> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Snapshot of one port answered by a port info query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub index: Option<usize>,
    pub dtype: DType,
    pub direction: PortDirection,
    /// Remote ends as `worker:port`.
    pub subscribers: Vec<String>,
}

/// Remote end of a subscription. Equality is (worker, port).
#[derive(Clone)]
pub(crate) struct PortSubscriber {
    pub(crate) worker: WorkerId,
    pub(crate) worker_name: Arc<str>,
    pub(crate) port: String,
    pub(crate) actor: ActorRef<WorkerActor>,
}

impl PartialEq for PortSubscriber {
    fn eq(&self, other: &Self) -> bool {
        self.worker == other.worker && self.port == other.port
    }
}

impl fmt::Display for PortSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.worker_name, self.port)
    }
}

impl fmt::Debug for PortSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortSubscriber")
            .field("worker", &self.worker)
            .field("worker_name", &self.worker_name)
            .field("port", &self.port)
            .finish()
    }
}

/// Fields shared by input and output ports.
pub(crate) struct PortCore {
    pub(crate) name: String,
    pub(crate) index: Option<usize>,
    pub(crate) dtype: DType,
    pub(crate) subscribers: Vec<PortSubscriber>,
}

impl PortCore {
    pub(crate) fn new(name: String, dtype: DType) -> Self {
        Self {
            index: port_name_to_index(&name),
            name,
            dtype,
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn subscribe(
        &mut self,
        subscriber: PortSubscriber,
        direction: PortDirection,
    ) -> Result<(), ProtocolError> {
        if self.subscribers.contains(&subscriber) {
            return Err(ProtocolError::DuplicateSubscription {
                direction,
                port: self.name.clone(),
                subscriber: subscriber.to_string(),
            });
        }
        self.subscribers.push(subscriber);
        Ok(())
    }

    pub(crate) fn unsubscribe(
        &mut self,
        subscriber: &PortSubscriber,
        direction: PortDirection,
    ) -> Result<(), ProtocolError> {
        let Some(position) = self.subscribers.iter().position(|s| s == subscriber) else {
            return Err(ProtocolError::MissingSubscription {
                direction,
                port: self.name.clone(),
                subscriber: subscriber.to_string(),
            });
        };
        self.subscribers.remove(position);
        Ok(())
    }

    pub(crate) fn info(&self, direction: PortDirection) -> PortInfo {
        PortInfo {
            name: self.name.clone(),
            index: self.index,
            dtype: self.dtype.clone(),
            direction,
            subscribers: self.subscribers.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Ports of one direction keyed by name; indexed ports use their decimal name.
pub struct PortTable<P> {
    ports: BTreeMap<String, P>,
}

impl<P> Default for PortTable<P> {
    fn default() -> Self {
        Self {
            ports: BTreeMap::new(),
        }
    }
}

impl<P> PortTable<P> {
    pub fn get(&self, port: impl Into<PortId>) -> Option<&P> {
        self.ports.get(&port.into().to_name())
    }

    pub fn get_mut(&mut self, port: impl Into<PortId>) -> Option<&mut P> {
        self.ports.get_mut(&port.into().to_name())
    }

    pub fn contains(&self, port: impl Into<PortId>) -> bool {
        self.ports.contains_key(&port.into().to_name())
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ports.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &P> {
        self.ports.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut P> {
        self.ports.values_mut()
    }

    pub(crate) fn insert(&mut self, name: String, port: P) {
        self.ports.insert(name, port);
    }

    pub(crate) fn clear(&mut self) {
        self.ports.clear();
    }

    /// The nearest existing indexed port below `index`.
    pub(crate) fn nearest_below(&self, index: usize) -> Option<&P> {
        (0..index).rev().find_map(|i| self.ports.get(&i.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{PortId, PortTable, port_name_to_index};

    #[test]
    fn only_decimal_names_are_indexes() {
        assert_eq!(port_name_to_index("0"), Some(0));
        assert_eq!(port_name_to_index("12"), Some(12));
        assert_eq!(port_name_to_index("in0"), None);
        assert_eq!(port_name_to_index("-1"), None);
        assert_eq!(port_name_to_index(""), None);
        assert_eq!(PortId::from(3).to_name(), "3");
    }

    #[test]
    fn table_resolves_indexes_through_names() {
        let mut table = PortTable::default();
        table.insert("0".to_string(), 'a');
        table.insert("2".to_string(), 'c');
        table.insert("msg".to_string(), 'm');
        assert_eq!(table.get(0), Some(&'a'));
        assert_eq!(table.get("msg"), Some(&'m'));
        assert_eq!(table.nearest_below(4), Some(&'c'));
        assert_eq!(table.nearest_below(2), Some(&'a'));
        assert_eq!(table.nearest_below(0), None);
    }
}
