use std::sync::{Arc, Weak};

use blockflow_buffer::{
    BufferChunk, BufferError, BufferManager, BufferManagerArgs, BufferRecycler, PoolId,
    RingDeque, SharedBuffer,
};
use blockflow_runtime::thread_actor::ActorRef;
use tracing::debug;

use crate::dtype::DType;
use crate::label::Label;
use crate::payload::Payload;
use crate::port::{PortCore, PortDirection, PortId, PortInfo};
use crate::worker::actor::WorkerActor;
use crate::worker::messages::{
    BufferReturnMessage, DeliverBufferMessage, DeliverLabelMessage, DeliverMessageMessage,
};

/// Sends released pool buffers back to the worker that owns the pool.
pub(crate) struct PortRecycler {
    pool: PoolId,
    actor: ActorRef<WorkerActor>,
}

impl BufferRecycler for PortRecycler {
    fn recycle(&self, buffer: SharedBuffer) {
        let message = BufferReturnMessage {
            pool: self.pool,
            buffer,
        };
        if self.actor.cast(message).is_err() {
            debug!(pool = %self.pool, "owning worker is gone, releasing buffer");
        }
    }
}

/// Producing end of a stream with its own buffer pool.
pub struct OutputPort {
    pub(crate) core: PortCore,
    // Dropped before the manager so pool teardown does not mail buffers home.
    recycler: Arc<PortRecycler>,
    manager: Box<dyn BufferManager>,
    buffer: BufferChunk,
    elements: usize,
    pending_elements: usize,
    total_elements: u64,
    total_messages: u64,
    posted: RingDeque<BufferChunk>,
}

impl OutputPort {
    pub(crate) fn new(
        name: String,
        dtype: DType,
        mut manager: Box<dyn BufferManager>,
        args: &BufferManagerArgs,
        owner: ActorRef<WorkerActor>,
    ) -> Result<Self, BufferError> {
        let recycler = Arc::new(PortRecycler {
            pool: manager.pool_id(),
            actor: owner,
        });
        let weak = Arc::downgrade(&recycler);
        let weak: Weak<dyn BufferRecycler> = weak;
        manager.init(args, weak)?;
        Ok(Self {
            core: PortCore::new(name, dtype),
            recycler,
            manager,
            buffer: BufferChunk::null(),
            elements: 0,
            pending_elements: 0,
            total_elements: 0,
            total_messages: 0,
            posted: RingDeque::with_capacity(4),
        })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn index(&self) -> Option<usize> {
        self.core.index
    }

    pub fn dtype(&self) -> &DType {
        &self.core.dtype
    }

    /// Pool buffer staged for this cycle; null when the pool is empty.
    pub fn buffer(&self) -> &BufferChunk {
        &self.buffer
    }

    /// Writable bytes of the staged buffer.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        // The staged buffer sits in the pool, so no consumer holds it.
        unsafe { self.buffer.as_mut_slice() }
    }

    /// Whole elements that fit in the staged buffer.
    pub fn elements(&self) -> usize {
        self.elements
    }

    /// Writes as many of `values` as fit after already produced elements and
    /// produces them. Returns the count written.
    pub fn write<T: Copy>(&mut self, values: &[T]) -> usize {
        let size = std::mem::size_of::<T>();
        assert_eq!(
            size,
            self.core.dtype.size(),
            "writing {} elements to a {} port",
            std::any::type_name::<T>(),
            self.core.dtype
        );
        let start = self.pending_elements;
        let count = values.len().min(self.elements - start);
        if count == 0 {
            return 0;
        }
        let dest = &mut self.buffer_mut()[start * size..(start + count) * size];
        unsafe {
            std::ptr::copy_nonoverlapping(
                values.as_ptr() as *const u8,
                dest.as_mut_ptr(),
                count * size,
            );
        }
        self.produce(count);
        count
    }

    /// Marks `elements` of the staged buffer as produced this cycle.
    pub fn produce(&mut self, elements: usize) {
        assert!(
            self.pending_elements + elements <= self.elements,
            "produced {} elements into a buffer of {}",
            self.pending_elements + elements,
            self.elements
        );
        self.pending_elements += elements;
    }

    /// Takes the staged buffer out of the pool, trimmed to `num_bytes`.
    ///
    /// The chunk can later be sent with [`Self::post_buffer`].
    pub fn pop_buffer(&mut self, num_bytes: usize) -> BufferChunk {
        assert!(!self.buffer.is_null(), "pop_buffer() without a staged buffer");
        assert_eq!(self.pending_elements, 0, "pop_buffer() after produce()");
        let mut chunk = std::mem::take(&mut self.buffer);
        chunk.truncate(num_bytes);
        self.manager.pop(num_bytes);
        self.elements = 0;
        chunk
    }

    /// Sends a label to every subscriber now. `label.index` is an absolute
    /// stream position.
    pub fn post_label(&mut self, label: Label) {
        for subscriber in &self.core.subscribers {
            let message = DeliverLabelMessage {
                port: PortId::Name(subscriber.port.clone()),
                label: label.clone(),
            };
            if subscriber.actor.cast(message).is_err() {
                debug!(port = %self.core.name, %subscriber, "dropping label for exited worker");
            }
        }
    }

    /// Sends an async message to every subscriber now.
    pub fn post_message(&mut self, message: Payload) {
        for subscriber in &self.core.subscribers {
            let delivery = DeliverMessageMessage {
                port: PortId::Name(subscriber.port.clone()),
                message: message.clone(),
            };
            if subscriber.actor.cast(delivery).is_err() {
                debug!(port = %self.core.name, %subscriber, "dropping message for exited worker");
            }
        }
        self.total_messages += 1;
    }

    /// Queues an externally owned chunk, sent in order after this cycle.
    pub fn post_buffer(&mut self, chunk: BufferChunk) {
        self.posted.push_back(chunk);
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    pub fn info(&self) -> PortInfo {
        self.core.info(PortDirection::Output)
    }

    pub(crate) fn pool_id(&self) -> PoolId {
        self.recycler.pool
    }

    pub(crate) fn return_buffer(&mut self, buffer: SharedBuffer) {
        self.manager.push(buffer);
    }

    /// Stages the pool front; returns the elements it can hold.
    pub(crate) fn pre_work(&mut self) -> usize {
        self.buffer = if self.manager.is_empty() {
            BufferChunk::null()
        } else {
            BufferChunk::from(self.manager.front().clone())
        };
        self.elements = self.buffer.elements(self.core.dtype.size());
        self.pending_elements = 0;
        self.elements
    }

    /// Sends produced and posted buffers; returns the bytes sent.
    pub(crate) fn post_work(&mut self) -> u64 {
        let size = self.core.dtype.size();
        let bytes = self.pending_elements * size;
        let mut produced = bytes as u64;
        let mut staged = std::mem::take(&mut self.buffer);
        if bytes != 0 {
            staged.truncate(bytes);
            self.manager.pop(bytes);
            self.send_buffer(staged);
        }

        while let Some(chunk) = self.posted.pop_front() {
            produced += chunk.length() as u64;
            self.total_elements += (chunk.length() / size) as u64;
            self.send_buffer(chunk);
        }

        self.total_elements += self.pending_elements as u64;
        self.pending_elements = 0;
        self.elements = 0;
        produced
    }

    fn send_buffer(&self, chunk: BufferChunk) {
        for subscriber in &self.core.subscribers {
            let message = DeliverBufferMessage {
                port: PortId::Name(subscriber.port.clone()),
                chunk: chunk.clone(),
            };
            if subscriber.actor.cast(message).is_err() {
                debug!(port = %self.core.name, %subscriber, "dropping buffer for exited worker");
            }
        }
    }
}
