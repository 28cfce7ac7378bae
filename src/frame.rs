//! # Serial Frames
//!
//! Every unit on the serial link is one fixed-size frame:
//!
//! ```text
//!   ┌─────────┬───────────────────────┬──────────────┬──────────┐
//!   │ command │ arguments (k-1 bytes) │ zero padding │ checksum │
//!   └─────────┴───────────────────────┴──────────────┴──────────┘
//!   ◄──────────────────── S bytes ────────────────────►  optional
//! ```
//!
//! The checksum is the XOR of all `S` slot bytes, padding included.
//! Frames never span a partial write: the sender checks for room for the
//! whole wire image before the first byte is queued.

use crate::error::{FrameError, QueueError};
use crate::queue::ByteQueue;

/// First byte of every frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Liveness check from the remote side.
    Ping = 0x01,
    /// Answer to [`Command::Ping`].
    Pong = 0x02,
    /// Remote side asks for an immediate resource snapshot.
    StatusRequest = 0x10,
    /// Resource snapshot for the status display.
    Status = 0x11,
    /// A slice of an evicted allocation.
    Evicted = 0xE0,
}

impl Command {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Ping),
            0x02 => Some(Self::Pong),
            0x10 => Some(Self::StatusRequest),
            0x11 => Some(Self::Status),
            0xE0 => Some(Self::Evicted),
            _ => None,
        }
    }
}

/// XOR checksum over a padded slot.
pub fn checksum(slot: &[u8]) -> u8 {
    slot.iter().fold(0, |acc, &b| acc ^ b)
}

/// One outbound frame with an `S`-byte payload slot.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'p, const S: usize> {
    payload: &'p [u8],
    checksum: bool,
}

impl<'p, const S: usize> Frame<'p, S> {
    /// Wrap `payload`; it must fit the slot.
    ///
    /// Up to `S` bytes are accepted. A payload of exactly `S` bytes fills
    /// the slot with no zero padding; one more is `PayloadTooLarge`.
    pub fn new(payload: &'p [u8], checksum: bool) -> Result<Self, FrameError> {
        if payload.len() > S {
            return Err(FrameError::PayloadTooLarge {
                len: payload.len(),
                slot: S,
            });
        }
        Ok(Self { payload, checksum })
    }

    /// Bytes this frame occupies on the wire.
    #[inline]
    pub const fn wire_len(&self) -> usize {
        S + self.checksum as usize
    }

    /// The padded slot.
    pub fn slot(&self) -> [u8; S] {
        let mut slot = [0u8; S];
        slot[..self.payload.len()].copy_from_slice(self.payload);
        slot
    }

    /// Queue the complete wire image, or nothing.
    pub fn write_to<const C: usize>(&self, queue: &mut ByteQueue<C>) -> Result<(), QueueError> {
        if self.wire_len() > queue.free_space() {
            return Err(QueueError::InsufficientSpace);
        }
        let slot = self.slot();
        queue.enqueue(&slot)?;
        if self.checksum {
            queue.enqueue_byte(checksum(&slot))?;
        }
        Ok(())
    }
}

/// Reassembles inbound frames from a byte stream.
pub struct FrameDecoder<const S: usize> {
    slot: [u8; S],
    filled: usize,
    checksum: bool,
    rejected: u32,
}

impl<const S: usize> FrameDecoder<S> {
    pub const fn new(checksum: bool) -> Self {
        Self {
            slot: [0u8; S],
            filled: 0,
            checksum,
            rejected: 0,
        }
    }

    /// Feed one byte. Yields the slot once a whole frame has arrived.
    pub fn push(&mut self, byte: u8) -> Option<Result<[u8; S], FrameError>> {
        if self.filled < S {
            self.slot[self.filled] = byte;
            self.filled += 1;
            if self.filled < S || self.checksum {
                return None;
            }
            self.filled = 0;
            return Some(Ok(self.slot));
        }

        // Slot complete, `byte` is the checksum.
        self.filled = 0;
        let expected = checksum(&self.slot);
        if byte != expected {
            self.rejected = self.rejected.wrapping_add(1);
            return Some(Err(FrameError::ChecksumMismatch {
                expected,
                actual: byte,
            }));
        }
        Some(Ok(self.slot))
    }

    /// Frames dropped for a bad checksum.
    pub const fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Discard a partially received frame.
    pub fn reset(&mut self) {
        self.filled = 0;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
