#![deny(clippy::wildcard_imports)]

//! Buffer memory for dataflow ports.
//!
//! A [`SharedBuffer`] is a reference counted memory region. A [`ManagedBuffer`]
//! binds one to the pool that created it and hands it back through a
//! [`BufferRecycler`] once the last handle drops. Ports move [`BufferChunk`]
//! views around and reassemble them with a [`BufferAccumulator`].

pub mod accumulator;
pub mod circular;
pub mod error;
pub mod generic;
pub mod managed;
pub mod manager;
pub mod region;
pub mod ring_deque;
pub mod shared;

pub use accumulator::BufferAccumulator;
pub use error::BufferError;
pub use generic::GenericBufferManager;
pub use managed::{BufferChunk, BufferRecycler, ManagedBuffer};
pub use manager::{
    BufferManager, BufferManagerArgs, BufferManagerFactory, BufferManagerKind, PoolId,
    make_buffer_manager,
};
pub use ring_deque::RingDeque;
pub use shared::SharedBuffer;
