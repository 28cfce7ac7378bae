//! # Byte Queue
//!
//! Fixed-capacity ring buffer of bytes. Writes go to `tail`, reads come
//! from `head`, both advancing modulo the capacity. The explicit `used`
//! count keeps `used + free == C` without sacrificing a slot.
//!
//! A bare `ByteQueue` is not interrupt safe. Queues shared with an
//! interrupt handler are wrapped in [`crate::sync::SharedQueue`].

use crate::error::QueueError;

/// Ring buffer of `C` bytes.
pub struct ByteQueue<const C: usize> {
    buffer: [u8; C],
    head: usize,
    tail: usize,
    used: usize,
}

impl<const C: usize> ByteQueue<C> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            buffer: [0u8; C],
            head: 0,
            tail: 0,
            used: 0,
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        C
    }

    #[inline]
    pub const fn used_space(&self) -> usize {
        self.used
    }

    #[inline]
    pub const fn free_space(&self) -> usize {
        C - self.used
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Append all of `bytes`, or nothing at all.
    ///
    /// # Returns
    /// - `Ok(())`: every byte was queued
    /// - `Err(InsufficientSpace)`: `free_space() < bytes.len()`, queue untouched
    pub fn enqueue(&mut self, bytes: &[u8]) -> Result<(), QueueError> {
        if bytes.len() > self.free_space() {
            return Err(QueueError::InsufficientSpace);
        }

        // At most two contiguous runs: up to the end of the buffer, then from 0.
        let first = bytes.len().min(C - self.tail);
        self.buffer[self.tail..self.tail + first].copy_from_slice(&bytes[..first]);
        let rest = bytes.len() - first;
        self.buffer[..rest].copy_from_slice(&bytes[first..]);

        self.tail = (self.tail + bytes.len()) % C;
        self.used += bytes.len();
        Ok(())
    }

    pub fn enqueue_byte(&mut self, byte: u8) -> Result<(), QueueError> {
        if self.used == C {
            return Err(QueueError::InsufficientSpace);
        }
        self.buffer[self.tail] = byte;
        self.tail = (self.tail + 1) % C;
        self.used += 1;
        Ok(())
    }

    pub fn dequeue_byte(&mut self) -> Result<u8, QueueError> {
        if self.used == 0 {
            return Err(QueueError::Empty);
        }
        let byte = self.buffer[self.head];
        self.head = (self.head + 1) % C;
        self.used -= 1;
        Ok(byte)
    }

    /// Dequeue up to `out.len()` bytes in FIFO order. Returns how many were read.
    pub fn dequeue(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.used);

        let first = count.min(C - self.head);
        out[..first].copy_from_slice(&self.buffer[self.head..self.head + first]);
        let rest = count - first;
        out[first..count].copy_from_slice(&self.buffer[..rest]);

        self.head = (self.head + count) % C;
        self.used -= count;
        count
    }

    /// Drop every queued byte.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.used = 0;
    }
}

impl<const C: usize> Default for ByteQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
