//! Pool-bound buffers and the chunk views that travel between ports.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::shared::SharedBuffer;

/// Return path from a released [`ManagedBuffer`] to the pool that owns it.
///
/// Implementations typically forward the buffer as a message to the actor that
/// owns the pool, which then calls [`crate::BufferManager::push`].
pub trait BufferRecycler: Send + Sync {
    fn recycle(&self, buffer: SharedBuffer);
}

struct ManagedInner {
    buffer: SharedBuffer,
    recycler: Weak<dyn BufferRecycler>,
}

impl Drop for ManagedInner {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.upgrade() {
            recycler.recycle(std::mem::take(&mut self.buffer));
        }
    }
}

/// A [`SharedBuffer`] that goes back to its pool when the last clone drops.
///
/// If the pool is gone by then, the memory is simply released.
#[derive(Clone, Default)]
pub struct ManagedBuffer {
    inner: Option<Arc<ManagedInner>>,
}

static NULL_BUFFER: SharedBuffer = SharedBuffer::null();

impl ManagedBuffer {
    pub fn new(buffer: SharedBuffer, recycler: Weak<dyn BufferRecycler>) -> Self {
        Self {
            inner: Some(Arc::new(ManagedInner { buffer, recycler })),
        }
    }

    pub fn buffer(&self) -> &SharedBuffer {
        self.inner
            .as_ref()
            .map_or(&NULL_BUFFER, |inner| &inner.buffer)
    }

    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// True when this is the only handle, so the pool may hand it out.
    pub fn is_unique(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| Arc::strong_count(inner) == 1)
    }

    pub fn use_count(&self) -> usize {
        self.inner.as_ref().map_or(0, Arc::strong_count)
    }

    pub fn same_buffer(&self, other: &ManagedBuffer) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ManagedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedBuffer")
            .field("buffer", self.buffer())
            .field("use_count", &self.use_count())
            .finish()
    }
}

#[derive(Clone, Default)]
enum ChunkOwner {
    #[default]
    Null,
    Shared(SharedBuffer),
    Managed(ManagedBuffer),
}

/// A byte range inside a shared or managed buffer.
///
/// Truncating or advancing a chunk only moves its own bounds; the owner stays
/// referenced until the chunk drops.
#[derive(Clone, Default)]
pub struct BufferChunk {
    owner: ChunkOwner,
    address: usize,
    length: usize,
}

impl BufferChunk {
    pub const fn null() -> Self {
        Self {
            owner: ChunkOwner::Null,
            address: 0,
            length: 0,
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn end(&self) -> usize {
        self.address + self.length
    }

    pub fn is_null(&self) -> bool {
        matches!(self.owner, ChunkOwner::Null)
    }

    /// Number of whole elements of `element_size` bytes.
    pub fn elements(&self, element_size: usize) -> usize {
        if element_size == 0 {
            return 0;
        }
        self.length / element_size
    }

    /// Storage behind the chunk; null for null chunks.
    pub fn shared_buffer(&self) -> &SharedBuffer {
        match &self.owner {
            ChunkOwner::Null => &NULL_BUFFER,
            ChunkOwner::Shared(buffer) => buffer,
            ChunkOwner::Managed(buffer) => buffer.buffer(),
        }
    }

    pub fn managed_buffer(&self) -> Option<&ManagedBuffer> {
        match &self.owner {
            ChunkOwner::Managed(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// Shortens the chunk to `length` bytes.
    pub fn truncate(&mut self, length: usize) {
        assert!(
            length <= self.length,
            "cannot grow a chunk from {} to {length} bytes",
            self.length
        );
        self.length = length;
    }

    /// Drops the first `bytes` bytes from the view.
    pub fn advance(&mut self, bytes: usize) {
        assert!(
            bytes <= self.length,
            "cannot advance {bytes} bytes past a {} byte chunk",
            self.length
        );
        self.address += bytes;
        self.length -= bytes;
    }

    /// True when `next` starts exactly where this chunk ends, on the same storage.
    pub fn is_continued_by(&self, next: &BufferChunk) -> bool {
        if self.end() != next.address {
            return false;
        }
        match (&self.owner, &next.owner) {
            (ChunkOwner::Shared(a), ChunkOwner::Shared(b)) => a.same_storage(b),
            (ChunkOwner::Managed(a), ChunkOwner::Managed(b)) => a.same_buffer(b),
            _ => false,
        }
    }

    pub(crate) fn extend(&mut self, bytes: usize) {
        self.length += bytes;
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

impl From<SharedBuffer> for BufferChunk {
    fn from(buffer: SharedBuffer) -> Self {
        if buffer.is_null() {
            return Self::null();
        }
        Self {
            address: buffer.address(),
            length: buffer.length(),
            owner: ChunkOwner::Shared(buffer),
        }
    }
}

impl From<ManagedBuffer> for BufferChunk {
    fn from(buffer: ManagedBuffer) -> Self {
        if buffer.is_null() {
            return Self::null();
        }
        Self {
            address: buffer.buffer().address(),
            length: buffer.buffer().length(),
            owner: ChunkOwner::Managed(buffer),
        }
    }
}

impl fmt::Debug for BufferChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owner = match &self.owner {
            ChunkOwner::Null => "null",
            ChunkOwner::Shared(_) => "shared",
            ChunkOwner::Managed(_) => "managed",
        };
        f.debug_struct("BufferChunk")
            .field("owner", &owner)
            .field("address", &format_args!("{:#x}", self.address))
            .field("length", &self.length)
            .finish()
    }
}
