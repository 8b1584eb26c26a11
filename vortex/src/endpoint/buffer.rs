//! Holding area for exchanges parked while no consumer is attached.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicUsize, Ordering };

use parking_lot::Mutex;

use crate::endpoint::exchange::Exchange;

/// Bounded FIFO drained into the next ring buffer after a reconfiguration
pub struct TemporaryBuffer<T> {
    queue: Mutex<VecDeque<Exchange<T>>>,
    capacity: AtomicUsize,
}

impl<T> TemporaryBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: AtomicUsize::new(capacity),
        }
    }

    /// Append, handing the exchange back if the buffer is full
    pub fn offer(&self, exchange: Exchange<T>) -> Result<(), Exchange<T>> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity.load(Ordering::Acquire) {
            return Err(exchange);
        }
        queue.push_back(exchange);
        Ok(())
    }

    /// Remove everything in enqueue order
    pub fn drain(&self) -> Vec<Exchange<T>> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_and_bound() {
        let buffer = TemporaryBuffer::new(2);
        assert!(buffer.offer(Exchange::new(1)).is_ok());
        assert!(buffer.offer(Exchange::new(2)).is_ok());

        let rejected = buffer.offer(Exchange::new(3)).unwrap_err();
        assert_eq!(*rejected.body(), 3);
        assert_eq!(buffer.len(), 2);

        let drained: Vec<i32> = buffer.drain().into_iter().map(Exchange::into_body).collect();
        assert_eq!(drained, vec![1, 2]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_grow_capacity() {
        let buffer = TemporaryBuffer::new(1);
        buffer.offer(Exchange::new(1)).unwrap();
        buffer.set_capacity(4);
        assert!(buffer.offer(Exchange::new(2)).is_ok());
        assert_eq!(buffer.capacity(), 4);
    }
}
