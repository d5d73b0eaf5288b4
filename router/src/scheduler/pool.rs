use bytes::BytesMut;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("more buffers returned than were borrowed")]
pub struct UnbalancedReturn;

/// A bounded pool of pre-allocated packet buffers. Acquisition never blocks;
/// an empty pool is the backpressure signal. The pool tracks how many
/// buffers are out, so returning a foreign buffer is caught instead of
/// silently growing the pool.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    capacity: usize,
    buffer_bytes: usize,
}

impl BufferPool {
    pub fn new(capacity: usize, buffer_bytes: usize) -> Self {
        let free = (0..capacity).map(|_| BytesMut::with_capacity(buffer_bytes)).collect();
        Self { free: Mutex::new(free), capacity, buffer_bytes }
    }

    pub fn acquire(&self) -> Option<BytesMut> {
        self.free.lock().pop()
    }

    pub fn release(&self, mut buffer: BytesMut) -> Result<(), UnbalancedReturn> {
        let mut free = self.free.lock();
        if free.len() >= self.capacity {
            return Err(UnbalancedReturn);
        }
        buffer.clear();
        free.push(buffer);
        Ok(())
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    pub fn outstanding(&self) -> usize {
        self.capacity - self.free_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }
}
