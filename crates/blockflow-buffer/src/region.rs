//! Page aligned heap regions backing plain shared buffers.

use memmap2::{MmapMut, MmapOptions};

use crate::error::BufferError;

/// Anonymous mapping owned by the container of a [`crate::SharedBuffer`].
pub(crate) struct HeapRegion {
    map: MmapMut,
    address: usize,
}

impl HeapRegion {
    pub(crate) fn allocate(size: usize, node_affinity: Option<u32>) -> Result<Self, BufferError> {
        if size == 0 {
            return Err(BufferError::ZeroSize);
        }
        let mut map = MmapOptions::new()
            .len(size)
            .map_anon()
            .map_err(|source| BufferError::Allocate { size, source })?;
        let address = map.as_mut_ptr() as usize;
        if let Some(node) = node_affinity {
            bind_to_node(address, size, node)?;
        }
        Ok(Self { map, address })
    }

    pub(crate) fn address(&self) -> usize {
        self.address
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}

/// Node ids at or above this are rejected before reaching `mbind`.
pub const MAX_NUMA_NODES: u32 = 1024;

/// Applies a preferred-node memory policy to `[address, address + size)`.
///
/// Kernels built without NUMA support report `ENOSYS`; the region is then
/// left with the default policy.
#[cfg(target_os = "linux")]
pub(crate) fn bind_to_node(address: usize, size: usize, node: u32) -> Result<(), BufferError> {
    const MPOL_PREFERRED: libc::c_int = 1;

    if node >= MAX_NUMA_NODES {
        return Err(BufferError::NumaNodeOutOfRange {
            node,
            max: MAX_NUMA_NODES,
        });
    }
    let word_bits = libc::c_ulong::BITS as usize;
    let word = node as usize / word_bits;
    let mut mask = vec![0 as libc::c_ulong; word + 1];
    mask[word] |= 1 << (node as usize % word_bits);
    // The kernel reads `maxnode - 1` bits.
    let max_node = (mask.len() * word_bits + 1) as libc::c_ulong;

    let rc = unsafe {
        libc::syscall(
            libc::SYS_mbind,
            address as *mut libc::c_void,
            size as libc::c_ulong,
            MPOL_PREFERRED,
            mask.as_ptr(),
            max_node,
            0 as libc::c_uint,
        )
    };
    if rc == 0 {
        return Ok(());
    }
    let source = std::io::Error::last_os_error();
    if source.raw_os_error() == Some(libc::ENOSYS) {
        tracing::debug!(node, size, "NUMA policy unavailable, using default placement");
        return Ok(());
    }
    Err(BufferError::NumaBind { node, size, source })
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn bind_to_node(_address: usize, size: usize, node: u32) -> Result<(), BufferError> {
    tracing::warn!(node, size, "NUMA affinity is not supported on this platform");
    Ok(())
}
