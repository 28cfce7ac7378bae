//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. The serial queues are the
//! only state shared between the cooperative loop and interrupt handlers,
//! and every mutation of them happens inside one short critical section.
//!
//! The implementation comes from the `critical-section` crate: on the
//! Cortex-M target `cortex-m` supplies the single-core (interrupt-disable)
//! implementation, on hosted builds the `std` implementation stands in.

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

use crate::error::QueueError;
use crate::queue::ByteQueue;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Keep critical sections as short as possible to minimize interrupt latency,
/// and never call out to a sink or driver callback from inside one.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

/// A [`ByteQueue`] shared across the cooperative/interrupt boundary.
///
/// Each method is one bounded critical section around the index update.
pub struct SharedQueue<const C: usize> {
    inner: Mutex<RefCell<ByteQueue<C>>>,
}

impl<const C: usize> SharedQueue<C> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(ByteQueue::new())),
        }
    }

    /// Run `f` on the queue inside a critical section.
    #[inline]
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ByteQueue<C>) -> R,
    {
        critical_section(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    pub fn enqueue(&self, bytes: &[u8]) -> Result<(), QueueError> {
        self.with(|q| q.enqueue(bytes))
    }

    pub fn enqueue_byte(&self, byte: u8) -> Result<(), QueueError> {
        self.with(|q| q.enqueue_byte(byte))
    }

    pub fn dequeue_byte(&self) -> Result<u8, QueueError> {
        self.with(|q| q.dequeue_byte())
    }

    pub fn dequeue(&self, out: &mut [u8]) -> usize {
        self.with(|q| q.dequeue(out))
    }

    pub fn used_space(&self) -> usize {
        self.with(|q| q.used_space())
    }

    pub fn free_space(&self) -> usize {
        self.with(|q| q.free_space())
    }

    pub fn is_empty(&self) -> bool {
        self.with(|q| q.is_empty())
    }

    /// Used and free bytes read in the same critical section.
    pub fn usage(&self) -> (usize, usize) {
        self.with(|q| (q.used_space(), q.free_space()))
    }

    pub const fn capacity(&self) -> usize {
        C
    }

    pub fn clear(&self) {
        self.with(|q| q.clear())
    }
}

impl<const C: usize> Default for SharedQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_queue_keeps_fifo_order() {
        let q = SharedQueue::<8>::new();
        q.enqueue(&[1, 2, 3]).unwrap();
        q.enqueue_byte(4).unwrap();

        let mut out = [0u8; 8];
        assert_eq!(q.dequeue(&mut out), 4);
        assert_eq!(out[..4], [1, 2, 3, 4]);
        assert!(q.is_empty());
        assert_eq!(q.dequeue_byte(), Err(QueueError::Empty));
    }

    #[test]
    fn test_usage_always_sums_to_capacity() {
        let q = SharedQueue::<16>::new();
        for n in 0..16 {
            let (used, free) = q.usage();
            assert_eq!((used, free), (n, 16 - n));
            q.enqueue_byte(n as u8).unwrap();
        }
        assert_eq!(q.enqueue_byte(0), Err(QueueError::InsufficientSpace));
        q.clear();
        assert_eq!(q.usage(), (0, q.capacity()));
    }

    #[test]
    fn test_sections_nest() {
        let q = SharedQueue::<4>::new();
        let used = critical_section(|_| {
            q.enqueue(&[9, 9]).unwrap();
            q.used_space()
        });
        assert_eq!(used, 2);
        assert_eq!(q.free_space(), 2);
    }
}
