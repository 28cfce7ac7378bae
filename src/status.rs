//! # Resource Status
//!
//! Snapshot of the runtime's resource counters for the remote status display.
//!
//! ## Wire Layout
//!
//! Six big-endian `u16` fields, in this order:
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0  | free pages |
//! | 2  | used pages |
//! | 4  | page size (bytes) |
//! | 6  | task-queue load |
//! | 8  | free receive-queue bytes |
//! | 10 | used receive-queue bytes |

use crate::config::{RECEIVE_QUEUE_DISPLAY_MAX, TASK_QUEUE_LOAD_MAX};
use crate::page_pool::PagePool;
use crate::sync::SharedQueue;

/// Encoded size of a [`ResourcePayload`].
pub const PAYLOAD_LEN: usize = 12;

/// Flat snapshot of pool, queue and scheduler counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourcePayload {
    pub free_pages: u16,
    pub used_pages: u16,
    pub page_size: u16,
    /// Pending work units, capped at `TASK_QUEUE_LOAD_MAX`.
    pub task_queue_load: u16,
    pub free_receive_queue: u16,
    pub used_receive_queue: u16,
}

impl ResourcePayload {
    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        let fields = [
            self.free_pages,
            self.used_pages,
            self.page_size,
            self.task_queue_load,
            self.free_receive_queue,
            self.used_receive_queue,
        ];
        let mut out = [0u8; PAYLOAD_LEN];
        for (chunk, field) in out.chunks_exact_mut(2).zip(fields) {
            chunk.copy_from_slice(&field.to_be_bytes());
        }
        out
    }

    /// Decode a payload; `None` if `bytes` is too short.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..PAYLOAD_LEN)?;
        let field = |i: usize| u16::from_be_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        Some(Self {
            free_pages: field(0),
            used_pages: field(1),
            page_size: field(2),
            task_queue_load: field(3),
            free_receive_queue: field(4),
            used_receive_queue: field(5),
        })
    }

    /// The values as the display renders them: while the receive queue is
    /// idle (nothing used), free receive bytes read as the nominal maximum.
    pub fn for_display(mut self) -> Self {
        if self.used_receive_queue == 0 {
            self.free_receive_queue = RECEIVE_QUEUE_DISPLAY_MAX;
        }
        self
    }
}

/// Read the counters of the page pool and the receive queue at one instant.
///
/// Pure read, O(1). How often to call it is the caller's business.
pub fn snapshot<const N: usize, const P: usize, const C: usize>(
    pages: &PagePool<N, P>,
    inbound: &SharedQueue<C>,
    task_load: usize,
) -> ResourcePayload {
    let (used_rx, free_rx) = inbound.usage();
    ResourcePayload {
        free_pages: saturate(pages.free_count()),
        used_pages: saturate(pages.used_count()),
        page_size: saturate(pages.page_size()),
        task_queue_load: saturate(task_load.min(TASK_QUEUE_LOAD_MAX)),
        free_receive_queue: saturate(free_rx),
        used_receive_queue: saturate(used_rx),
    }
}

fn saturate(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
