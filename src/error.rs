//! # Error Types
//!
//! Structured errors for each subsystem. Ordinary conditions
//! (`InsufficientSpace`, `Empty`, `OutOfPages`) are return values the caller
//! checks; failures on the transmit path are escalated to [`crate::halt`].

use thiserror::Error;

/// Errors from the page pool and the swappable allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No free page and nothing left to evict.
    #[error("page pool exhausted with no evictable allocation")]
    OutOfPages,
    /// The request cannot be satisfied, even after one eviction round.
    #[error("allocation cannot be satisfied")]
    AllocationFailed,
    /// The eviction sink refused the victim's bytes. There is no backing
    /// store beyond the link, so this is fatal for the caller.
    #[error("eviction sink refused the evicted bytes")]
    EvictionRejected,
    /// The handle's pages were evicted; its contents are gone.
    #[error("allocation was evicted")]
    Evicted,
    /// Access past the end of the allocation.
    #[error("access outside allocation bounds")]
    OutOfBounds,
}

impl PoolError {
    /// True for errors that must stop the system instead of being retried.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::EvictionRejected)
    }
}

/// Errors from a byte queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The write does not fit; nothing was written.
    #[error("insufficient space in byte queue")]
    InsufficientSpace,
    /// Nothing to dequeue.
    #[error("byte queue is empty")]
    Empty,
}

/// Errors from building, sending or decoding a serial frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("payload of {len} bytes exceeds the {slot}-byte frame slot")]
    PayloadTooLarge { len: usize, slot: usize },
    #[error("frame checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors from task registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("task table is full")]
    TaskTableFull,
    /// Tasks are registered once, before the run loop starts.
    #[error("scheduler is already running")]
    AlreadyRunning,
}
