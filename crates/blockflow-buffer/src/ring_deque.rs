use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Observer as _, Producer as _};

/// FIFO over a heap ring that doubles its capacity instead of rejecting items.
pub struct RingDeque<T> {
    ring: HeapRb<T>,
}

impl<T> RingDeque<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
        }
    }

    pub fn push_back(&mut self, item: T) {
        let mut item = item;
        loop {
            match self.ring.try_push(item) {
                Ok(()) => return,
                Err(rejected) => {
                    item = rejected;
                    self.grow();
                },
            }
        }
    }

    pub fn front(&self) -> Option<&T> {
        self.ring.try_peek()
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.ring.try_pop()
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    fn grow(&mut self) {
        let mut grown = HeapRb::new(self.capacity() * 2);
        while let Some(item) = self.ring.try_pop() {
            if grown.try_push(item).is_err() {
                unreachable!("grown ring holds every queued item");
            }
        }
        self.ring = grown;
    }
}

impl<T> Default for RingDeque<T> {
    fn default() -> Self {
        Self::with_capacity(1)
    }
}

#[cfg(test)]
mod tests {
    use super::RingDeque;

    #[test]
    fn ring_deque_doubles_when_full_and_keeps_order() {
        let mut deque = RingDeque::with_capacity(2);
        for value in 0..5 {
            deque.push_back(value);
        }
        assert_eq!(deque.capacity(), 8);
        assert_eq!(deque.len(), 5);
        assert_eq!(deque.front(), Some(&0));
        let drained: Vec<_> = std::iter::from_fn(|| deque.pop_front()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(deque.is_empty());
    }
}
