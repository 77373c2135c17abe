use std::sync::Weak;

use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Observer as _, Producer as _};

use crate::error::BufferError;
use crate::managed::{BufferRecycler, ManagedBuffer};
use crate::manager::{BufferManager, BufferManagerArgs, PoolId};
use crate::shared::SharedBuffer;

/// Ring of preallocated buffers handed out in FIFO order.
pub struct GenericBufferManager {
    id: PoolId,
    circular: bool,
    ready: Option<HeapRb<ManagedBuffer>>,
    recycler: Option<Weak<dyn BufferRecycler>>,
}

impl GenericBufferManager {
    pub fn new() -> Self {
        Self {
            id: PoolId::next(),
            circular: false,
            ready: None,
            recycler: None,
        }
    }

    /// A pool whose buffers are circular regions.
    pub fn circular() -> Self {
        Self {
            circular: true,
            ..Self::new()
        }
    }

    fn allocate(&self, args: &BufferManagerArgs) -> Result<SharedBuffer, BufferError> {
        if self.circular {
            SharedBuffer::make_circular(args.buffer_size, args.node_affinity)
        } else {
            SharedBuffer::make(args.buffer_size, args.node_affinity)
        }
    }

    fn ready(&self) -> &HeapRb<ManagedBuffer> {
        self.ready
            .as_ref()
            .expect("buffer manager used before init")
    }

    fn ready_mut(&mut self) -> &mut HeapRb<ManagedBuffer> {
        self.ready
            .as_mut()
            .expect("buffer manager used before init")
    }
}

impl Default for GenericBufferManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferManager for GenericBufferManager {
    fn init(
        &mut self,
        args: &BufferManagerArgs,
        recycler: Weak<dyn BufferRecycler>,
    ) -> Result<(), BufferError> {
        if args.num_buffers == 0 {
            return Err(BufferError::NoBuffers);
        }
        if args.buffer_size == 0 {
            return Err(BufferError::ZeroSize);
        }
        let buffers = (0..args.num_buffers)
            .map(|_| self.allocate(args))
            .collect::<Result<Vec<_>, _>>()?;

        let mut ready = HeapRb::new(args.num_buffers);
        for buffer in buffers {
            let managed = ManagedBuffer::new(buffer, recycler.clone());
            if ready.try_push(managed).is_err() {
                unreachable!("ring sized for every buffer");
            }
        }
        self.ready = Some(ready);
        self.recycler = Some(recycler);
        Ok(())
    }

    fn pool_id(&self) -> PoolId {
        self.id
    }

    fn is_empty(&self) -> bool {
        self.ready.as_ref().is_none_or(|ready| ready.is_empty())
    }

    fn front(&self) -> &ManagedBuffer {
        self.ready()
            .try_peek()
            .expect("front() called on an empty buffer pool")
    }

    fn pop(&mut self, num_bytes: usize) {
        let front = self
            .ready_mut()
            .try_pop()
            .expect("pop() called on an empty buffer pool");
        assert!(
            num_bytes <= front.buffer().length(),
            "popped {num_bytes} bytes from a {} byte buffer",
            front.buffer().length()
        );
    }

    fn push(&mut self, buffer: SharedBuffer) {
        let recycler = self
            .recycler
            .clone()
            .expect("buffer manager used before init");
        let managed = ManagedBuffer::new(buffer, recycler);
        if self.ready_mut().try_push(managed).is_err() {
            panic!("push() called on a full buffer pool");
        }
    }

    fn ready_len(&self) -> usize {
        self.ready.as_ref().map_or(0, |ready| ready.occupied_len())
    }

    fn capacity(&self) -> usize {
        self.ready.as_ref().map_or(0, |ready| ready.capacity().get())
    }
}
