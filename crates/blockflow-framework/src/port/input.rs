use blockflow_buffer::{BufferAccumulator, BufferChunk, RingDeque};
use tracing::warn;

use crate::dtype::DType;
use crate::label::Label;
use crate::payload::Payload;
use crate::port::{PortCore, PortDirection, PortInfo};

/// Receiving end of a stream: buffers, inline labels and async messages.
pub struct InputPort {
    pub(crate) core: PortCore,
    accumulator: BufferAccumulator,
    messages: RingDeque<Payload>,
    labels: Vec<Label>,
    reserve_elements: usize,
    buffer: BufferChunk,
    elements: usize,
    pending_elements: usize,
    total_elements: u64,
    total_messages: u64,
}

impl InputPort {
    pub(crate) fn new(
        name: String,
        dtype: DType,
        reserve_elements: usize,
        queue_capacity: usize,
    ) -> Self {
        Self {
            core: PortCore::new(name, dtype),
            accumulator: BufferAccumulator::default(),
            messages: RingDeque::with_capacity(queue_capacity),
            labels: Vec::new(),
            reserve_elements,
            buffer: BufferChunk::null(),
            elements: 0,
            pending_elements: 0,
            total_elements: 0,
            total_messages: 0,
        }
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

    /// Contiguous window available this cycle.
    pub fn buffer(&self) -> &BufferChunk {
        &self.buffer
    }

    /// Whole elements in [`Self::buffer`].
    pub fn elements(&self) -> usize {
        self.elements
    }

    /// Copies the current window out as elements of `T`.
    pub fn read<T: Copy>(&self) -> Vec<T> {
        let size = std::mem::size_of::<T>();
        assert_eq!(
            size,
            self.core.dtype.size(),
            "reading {} elements from a {} port",
            std::any::type_name::<T>(),
            self.core.dtype
        );
        let bytes = self.buffer.as_slice();
        (0..self.elements)
            .map(|i| unsafe { std::ptr::read_unaligned(bytes[i * size..].as_ptr() as *const T) })
            .collect()
    }

    /// Marks `elements` of the current window as consumed.
    pub fn consume(&mut self, elements: usize) {
        assert!(
            self.pending_elements + elements <= self.elements,
            "consumed {} elements from a window of {}",
            self.pending_elements + elements,
            self.elements
        );
        self.pending_elements += elements;
    }

    pub fn reserve(&self) -> usize {
        self.reserve_elements
    }

    pub fn set_reserve(&mut self, elements: usize) {
        self.reserve_elements = elements;
    }

    /// Pending inline labels sorted by position.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn has_message(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn pop_message(&mut self) -> Option<Payload> {
        let message = self.messages.pop_front()?;
        self.total_messages += 1;
        Some(message)
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    pub fn info(&self) -> PortInfo {
        self.core.info(PortDirection::Input)
    }

    pub(crate) fn push_buffer(&mut self, chunk: BufferChunk) {
        self.accumulator.push(chunk);
    }

    pub(crate) fn push_label(&mut self, label: Label) {
        self.labels.push(label);
        self.labels.sort_by_key(|label| label.index);
    }

    pub(crate) fn push_message(&mut self, message: Payload) {
        self.messages.push_back(message);
    }

    /// Prepares the window for a cycle; true when the reserve is met.
    pub(crate) fn pre_work(&mut self) -> bool {
        let size = self.core.dtype.size();
        if let Err(err) = self.accumulator.require(self.reserve_elements * size) {
            warn!(port = %self.core.name, error = %err, "failed to merge input fragments");
        }
        self.buffer = self.accumulator.front().clone();
        self.elements = self.buffer.elements(size);
        self.pending_elements = 0;
        self.elements >= self.reserve_elements
    }

    /// Releases consumed bytes and returns how many there were.
    pub(crate) fn post_work(&mut self) -> u64 {
        let bytes = self.pending_elements * self.core.dtype.size();
        self.buffer = BufferChunk::null();
        if bytes != 0 {
            self.accumulator.pop(bytes);
        }
        self.total_elements += self.pending_elements as u64;
        self.pending_elements = 0;
        self.elements = 0;
        bytes as u64
    }

    /// Removes and returns the labels positioned before the consumed count.
    pub(crate) fn take_due_labels(&mut self) -> Vec<Label> {
        let due = self
            .labels
            .partition_point(|label| label.index < self.total_elements);
        self.labels.drain(..due).collect()
    }

    /// Bytes delivered to this input and not yet consumed.
    pub fn bytes_queued(&self) -> usize {
        self.accumulator.bytes_available()
    }
}
