use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::circular::CircularRegion;
use crate::error::BufferError;
use crate::region::HeapRegion;

pub(crate) type Container = Arc<dyn Any + Send + Sync>;

/// A memory region with shared ownership.
///
/// The container keeps the storage alive; address and length describe the
/// part of it this handle covers. When `alias` is non-zero the bytes are also
/// visible at `alias`, so a view may run past the end of a circular buffer.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    address: usize,
    length: usize,
    alias: usize,
    container: Option<Container>,
}

impl SharedBuffer {
    pub const fn null() -> Self {
        Self {
            address: 0,
            length: 0,
            alias: 0,
            container: None,
        }
    }

    /// Allocates `num_bytes` of zeroed memory, optionally on a NUMA node.
    pub fn make(num_bytes: usize, node_affinity: Option<u32>) -> Result<Self, BufferError> {
        let region = HeapRegion::allocate(num_bytes, node_affinity)?;
        let address = region.address();
        let length = region.len();
        Ok(Self {
            address,
            length,
            alias: 0,
            container: Some(Arc::new(region)),
        })
    }

    /// Allocates a circular buffer whose length is rounded up to the page size.
    pub fn make_circular(
        num_bytes: usize,
        node_affinity: Option<u32>,
    ) -> Result<Self, BufferError> {
        let region = CircularRegion::allocate(num_bytes, node_affinity)?;
        let address = region.address();
        let length = region.len();
        Ok(Self {
            address,
            length,
            alias: address + length,
            container: Some(Arc::new(region)),
        })
    }

    /// Copies `bytes` into a freshly allocated buffer.
    pub fn copy_from_slice(bytes: &[u8]) -> Result<Self, BufferError> {
        let mut buffer = Self::make(bytes.len(), None)?;
        unsafe { buffer.as_mut_slice() }.copy_from_slice(bytes);
        Ok(buffer)
    }

    /// Wraps externally owned memory. `container` must keep
    /// `[address, address + length)` valid for as long as it lives.
    pub unsafe fn from_container(
        address: usize,
        length: usize,
        container: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            address,
            length,
            alias: 0,
            container: Some(container),
        }
    }

    /// A view of `[address, address + length)` sharing this buffer's storage.
    pub fn sub_buffer(&self, address: usize, length: usize) -> Result<Self, BufferError> {
        let in_bounds = address >= self.address
            && address
                .checked_add(length)
                .is_some_and(|end| end <= self.end());
        if !in_bounds {
            return Err(BufferError::OutOfBounds {
                address,
                length,
                parent_address: self.address,
                parent_length: self.length,
            });
        }
        let alias = if self.alias == 0 {
            0
        } else {
            self.alias + (address - self.address)
        };
        Ok(Self {
            address,
            length,
            alias,
            container: self.container.clone(),
        })
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Address where this buffer's bytes are mirrored, or zero.
    pub fn alias(&self) -> usize {
        self.alias
    }

    pub fn end(&self) -> usize {
        self.address + self.length
    }

    /// True when no other handle shares the storage.
    pub fn is_unique(&self) -> bool {
        self.container
            .as_ref()
            .is_some_and(|container| Arc::strong_count(container) == 1)
    }

    pub fn is_null(&self) -> bool {
        self.container.is_none()
    }

    pub fn use_count(&self) -> usize {
        self.container.as_ref().map_or(0, Arc::strong_count)
    }

    /// True when both handles keep the same storage alive.
    pub fn same_storage(&self, other: &SharedBuffer) -> bool {
        match (&self.container, &other.container) {
            (Some(a), Some(b)) => container_ptr(a) == container_ptr(b),
            _ => false,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.is_null() || self.length == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.address as *const u8, self.length) }
    }

    /// # Safety
    ///
    /// No other handle may read or write the same bytes while the slice lives.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.is_null() || self.length == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.address as *mut u8, self.length) }
    }
}

fn container_ptr(container: &Container) -> *const () {
    Arc::as_ptr(container) as *const ()
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("address", &format_args!("{:#x}", self.address))
            .field("length", &self.length)
            .field("alias", &format_args!("{:#x}", self.alias))
            .field("null", &self.is_null())
            .finish()
    }
}
