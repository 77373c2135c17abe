//! Buffer pool contract and factory.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use crate::error::BufferError;
use crate::generic::GenericBufferManager;
use crate::managed::{BufferRecycler, ManagedBuffer};
use crate::shared::SharedBuffer;

/// Process unique identity of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(u64);

impl PoolId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferManagerArgs {
    pub num_buffers: usize,
    pub buffer_size: usize,
    /// Preferred NUMA node, `None` for the default placement.
    pub node_affinity: Option<u32>,
}

impl Default for BufferManagerArgs {
    fn default() -> Self {
        Self {
            num_buffers: 4,
            buffer_size: 8192,
            node_affinity: None,
        }
    }
}

/// A fixed set of buffers cycling between a producer and its consumers.
///
/// Every buffer is created by [`BufferManager::init`] and stays in circulation
/// for the manager's lifetime: it is either ready in the pool or held by a
/// consumer that will eventually [`BufferManager::push`] it back. Calling
/// `front`/`pop` on an empty pool or `push` on a full one is a programming
/// error and panics.
pub trait BufferManager: Send {
    fn init(
        &mut self,
        args: &BufferManagerArgs,
        recycler: Weak<dyn BufferRecycler>,
    ) -> Result<(), BufferError>;

    fn pool_id(&self) -> PoolId;

    fn is_empty(&self) -> bool;

    /// The oldest ready buffer.
    fn front(&self) -> &ManagedBuffer;

    /// Retires the front buffer after `num_bytes` of it were used.
    fn pop(&mut self, num_bytes: usize);

    /// Puts a released buffer back in the pool.
    fn push(&mut self, buffer: SharedBuffer);

    fn ready_len(&self) -> usize;

    /// Number of buffers in circulation.
    fn capacity(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferManagerKind {
    #[default]
    Generic,
    /// Generic pool whose buffers are double mapped circular regions.
    Circular,
}

impl FromStr for BufferManagerKind {
    type Err = BufferError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "generic" => Ok(Self::Generic),
            "circular" => Ok(Self::Circular),
            other => Err(BufferError::UnknownManager(other.to_string())),
        }
    }
}

/// Builds a manager for ports that do not use one of the built-in kinds.
pub type BufferManagerFactory = Arc<dyn Fn() -> Box<dyn BufferManager> + Send + Sync>;

pub fn make_buffer_manager(kind: BufferManagerKind) -> Box<dyn BufferManager> {
    match kind {
        BufferManagerKind::Generic => Box::new(GenericBufferManager::new()),
        BufferManagerKind::Circular => Box::new(GenericBufferManager::circular()),
    }
}

#[cfg(test)]
mod tests {
    use super::{BufferManagerArgs, BufferManagerKind, PoolId};
    use crate::error::BufferError;

    #[test]
    fn pool_ids_are_unique() {
        let a = PoolId::next();
        let b = PoolId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn manager_kind_parses_known_names() {
        let generic: BufferManagerKind = "generic".parse().expect("generic kind");
        let circular: BufferManagerKind = "circular".parse().expect("circular kind");
        assert_eq!(generic, BufferManagerKind::Generic);
        assert_eq!(circular, BufferManagerKind::Circular);
        let err = "slab".parse::<BufferManagerKind>().expect_err("unknown kind");
        assert!(matches!(err, BufferError::UnknownManager(name) if name == "slab"));
    }

    #[test]
    fn args_fill_missing_fields_with_defaults() {
        let args: BufferManagerArgs =
            serde_json::from_str(r#"{"buffer_size": 1024}"#).expect("parse args");
        assert_eq!(args.num_buffers, 4);
        assert_eq!(args.buffer_size, 1024);
        assert_eq!(args.node_affinity, None);
    }
}
