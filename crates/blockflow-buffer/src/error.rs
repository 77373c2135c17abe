//! Error type for buffer allocation and pool setup.

use thiserror::Error;

/// Errors produced while allocating buffer memory or configuring a pool.
#[derive(Debug, Error)]
pub enum BufferError {
    /// A pool was configured without any buffers.
    #[error("buffer manager needs at least one buffer")]
    NoBuffers,
    /// A zero byte allocation was requested.
    #[error("buffer size must be non-zero")]
    ZeroSize,
    /// Anonymous memory could not be mapped.
    #[error("failed to allocate {size} byte region: {source}")]
    Allocate {
        /// Requested region size in bytes.
        size: usize,
        /// OS error returned by the mapping call.
        #[source]
        source: std::io::Error,
    },
    /// The region could not be bound to the requested NUMA node.
    #[error("failed to bind {size} byte region to NUMA node {node}: {source}")]
    NumaBind {
        /// Requested node.
        node: u32,
        /// Region size in bytes.
        size: usize,
        /// OS error returned by `mbind`.
        #[source]
        source: std::io::Error,
    },
    /// The requested NUMA node id is beyond what the kernel can address.
    #[error("NUMA node {node} is out of range (max {max})")]
    NumaNodeOutOfRange {
        /// Requested node.
        node: u32,
        /// Exclusive upper bound on node ids.
        max: u32,
    },
    /// One step of the circular double mapping failed.
    #[error("circular mapping failed while {stage}: {source}")]
    CircularMap {
        /// Step that failed.
        stage: &'static str,
        /// OS error returned by that step.
        #[source]
        source: std::io::Error,
    },
    /// Circular buffers need memfd double mapping.
    #[error("circular buffers are not supported on this platform")]
    CircularUnsupported,
    /// A sub-buffer does not fit inside its parent.
    #[error("sub-buffer at {address:#x}+{length} is outside parent {parent_address:#x}+{parent_length}")]
    OutOfBounds {
        /// Requested start address.
        address: usize,
        /// Requested length.
        length: usize,
        /// Parent start address.
        parent_address: usize,
        /// Parent length.
        parent_length: usize,
    },
    /// No buffer manager is registered under this name.
    #[error("unknown buffer manager kind: {0}")]
    UnknownManager(String),
}
