//! Reassembly of incoming chunks into contiguous input windows.

use std::collections::VecDeque;

use crate::error::BufferError;
use crate::managed::BufferChunk;
use crate::shared::SharedBuffer;

static NULL_CHUNK: BufferChunk = BufferChunk::null();

#[derive(Default)]
pub struct BufferAccumulator {
    chunks: VecDeque<BufferChunk>,
    bytes_available: usize,
}

impl BufferAccumulator {
    /// Queues `chunk`, extending the last chunk when `chunk` directly follows it.
    pub fn push(&mut self, chunk: BufferChunk) {
        if chunk.length() == 0 {
            return;
        }
        self.bytes_available += chunk.length();
        if let Some(last) = self.chunks.back_mut() {
            if last.is_continued_by(&chunk) {
                last.extend(chunk.length());
                return;
            }
        }
        self.chunks.push_back(chunk);
    }

    /// The first contiguous chunk, or a null chunk when nothing is queued.
    pub fn front(&self) -> &BufferChunk {
        self.chunks.front().unwrap_or(&NULL_CHUNK)
    }

    /// Releases `bytes` from the front chunk.
    pub fn pop(&mut self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        let front = self
            .chunks
            .front_mut()
            .expect("pop() called on an empty accumulator");
        front.advance(bytes);
        if front.length() == 0 {
            self.chunks.pop_front();
        }
        self.bytes_available -= bytes;
    }

    /// Makes `min(bytes, available)` bytes contiguous at the front.
    ///
    /// Fragments are copied into one fresh buffer when the front chunk is too
    /// short on its own.
    pub fn require(&mut self, bytes: usize) -> Result<(), BufferError> {
        let target = bytes.min(self.bytes_available);
        if self.front().length() >= target {
            return Ok(());
        }

        let mut merged = SharedBuffer::make(target, None)?;
        let dest = unsafe { merged.as_mut_slice() };
        let mut filled = 0;
        while filled < target {
            let Some(chunk) = self.chunks.front_mut() else {
                break;
            };
            let take = chunk.length().min(target - filled);
            dest[filled..filled + take].copy_from_slice(&chunk.as_slice()[..take]);
            filled += take;
            chunk.advance(take);
            if chunk.length() == 0 {
                self.chunks.pop_front();
            }
        }

        let mut chunk = BufferChunk::from(merged);
        chunk.truncate(filled);
        self.chunks.push_front(chunk);
        Ok(())
    }

    pub fn bytes_available(&self) -> usize {
        self.bytes_available
    }

    pub fn is_empty(&self) -> bool {
        self.bytes_available == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.bytes_available = 0;
    }
}
