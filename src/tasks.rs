//! # Runtime Tasks
//!
//! Task steps shared by every vehicle build: periodic status reporting,
//! inbound command handling, and a sample log that spills to the link
//! under memory pressure.

use crate::config::SCI_CMD_AND_PAYLOAD_SIZE;
use crate::error::PoolError;
use crate::frame::{Command, FrameDecoder};
use crate::link::TxKick;
use crate::runtime::Runtime;
use crate::swap::Allocation;
use crate::task::Task;

/// Wire size of a checksummed frame.
const FRAME_WIRE_LEN: usize = SCI_CMD_AND_PAYLOAD_SIZE + 1;

/// Received bytes handled per step, so one step stays short.
const RX_BUDGET: usize = 2 * FRAME_WIRE_LEN;

// ---------------------------------------------------------------------------
// Status reporting
// ---------------------------------------------------------------------------

/// Sends a resource snapshot every `period` cycles.
///
/// A snapshot that does not fit the outbound queue is deferred to the next
/// cycle instead of being forced onto a backed-up link.
pub struct StatusTask {
    period: u32,
    countdown: u32,
    sent: u32,
}

impl StatusTask {
    /// First report goes out on the first step.
    pub const fn new(period: u32) -> Self {
        Self {
            period,
            countdown: 1,
            sent: 0,
        }
    }

    pub const fn sent(&self) -> u32 {
        self.sent
    }
}

impl<K: TxKick> Task<Runtime<'_, K>> for StatusTask {
    fn step(&mut self, rt: &mut Runtime<'_, K>) {
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown > 0 {
            return;
        }
        if rt.link().outbound().free_space() < FRAME_WIRE_LEN {
            log::trace!("status deferred, outbound queue busy");
            return;
        }
        rt.send_status();
        self.sent = self.sent.wrapping_add(1);
        self.countdown = self.period.max(1);
    }

    fn name(&self) -> &'static str {
        "status"
    }
}

// ---------------------------------------------------------------------------
// Inbound commands
// ---------------------------------------------------------------------------

/// Decodes checksummed frames from the inbound queue and answers them.
pub struct CommandTask {
    decoder: FrameDecoder<SCI_CMD_AND_PAYLOAD_SIZE>,
    handled: u32,
}

impl CommandTask {
    pub const fn new() -> Self {
        Self {
            decoder: FrameDecoder::new(true),
            handled: 0,
        }
    }

    /// Frames answered so far.
    pub const fn handled(&self) -> u32 {
        self.handled
    }

    /// Frames dropped for a bad checksum.
    pub const fn rejected(&self) -> u32 {
        self.decoder.rejected()
    }

    fn dispatch<K: TxKick>(&mut self, rt: &mut Runtime<'_, K>, slot: &[u8]) {
        match Command::from_byte(slot[0]) {
            Some(Command::Ping) => rt.link().send_checked_or_halt(&[Command::Pong as u8]),
            Some(Command::StatusRequest) => rt.send_status(),
            other => {
                log::warn!("ignoring inbound command {:#04x} ({:?})", slot[0], other);
                return;
            }
        }
        self.handled = self.handled.wrapping_add(1);
    }
}

impl Default for CommandTask {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TxKick> Task<Runtime<'_, K>> for CommandTask {
    fn step(&mut self, rt: &mut Runtime<'_, K>) {
        // RX_BUDGET bytes complete at most two frames; leave inbound bytes
        // queued until both replies are sure to fit.
        if rt.link().outbound().free_space() < RX_BUDGET {
            log::trace!("commands deferred, outbound queue busy");
            return;
        }
        let mut buf = [0u8; RX_BUDGET];
        let n = rt.link().receive(&mut buf);
        for &byte in &buf[..n] {
            match self.decoder.push(byte) {
                Some(Ok(slot)) => self.dispatch(rt, &slot),
                Some(Err(err)) => log::warn!("inbound frame dropped: {}", err),
                None => {}
            }
        }
    }

    fn name(&self) -> &'static str {
        "commands"
    }
}

// ---------------------------------------------------------------------------
// Sample log
// ---------------------------------------------------------------------------

/// Appends one sample per step to a block of working memory.
///
/// A full block is retired: its handle is dropped while its pages stay
/// allocated, so memory pressure later evicts it over the link, oldest
/// block first. A block evicted while still being filled is replaced.
///
/// A new block is only taken once the outbound queue can hold every
/// eviction it causes; until then samples are dropped and counted.
pub struct SampleLogTask<F> {
    sample: F,
    block_size: usize,
    block: Option<Allocation>,
    filled: usize,
    retired: u32,
    dropped: u32,
}

impl<F: FnMut() -> u8> SampleLogTask<F> {
    pub const fn new(block_size: usize, sample: F) -> Self {
        Self {
            sample,
            block_size,
            block: None,
            filled: 0,
            retired: 0,
            dropped: 0,
        }
    }

    /// Blocks filled so far.
    pub const fn retired(&self) -> u32 {
        self.retired
    }

    /// Samples lost while no block was available.
    pub const fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Make sure a resident block is ready. `Ok(false)` while the link has
    /// no room yet for the evictions a new block would cause.
    fn ensure_block<K: TxKick>(&mut self, rt: &mut Runtime<'_, K>) -> Result<bool, PoolError> {
        let resident = self
            .block
            .as_ref()
            .is_some_and(|block| rt.memory().is_resident(block));
        if resident {
            return Ok(true);
        }
        if self.block.take().is_some() {
            log::debug!("sample block evicted after {} bytes", self.filled);
        }
        self.filled = 0;

        let spill = rt.eviction_wire_len(self.block_size);
        if spill > rt.link().outbound().free_space() {
            log::trace!("sample block deferred, {} bytes of eviction pending", spill);
            return Ok(false);
        }
        self.block = Some(rt.allocate(self.block_size)?);
        Ok(true)
    }

    /// Hand the full block over to the allocator's eviction order.
    fn retire(&mut self) {
        self.block = None;
        self.filled = 0;
        self.retired = self.retired.wrapping_add(1);
    }
}

impl<K: TxKick, F: FnMut() -> u8> Task<Runtime<'_, K>> for SampleLogTask<F> {
    fn step(&mut self, rt: &mut Runtime<'_, K>) {
        let sample = (self.sample)();
        match self.ensure_block(rt) {
            Ok(true) => {}
            Ok(false) => {
                self.dropped = self.dropped.wrapping_add(1);
                return;
            }
            Err(err) => {
                log::warn!("sample dropped: {}", err);
                self.dropped = self.dropped.wrapping_add(1);
                return;
            }
        }
        let Some(block) = self.block.as_ref() else {
            return;
        };
        if let Err(err) = rt.memory().write(block, self.filled, &[sample]) {
            log::warn!("sample dropped: {}", err);
            self.block = None;
            return;
        }
        self.filled += 1;
        if self.filled >= self.block_size {
            self.retire();
        }
    }

    fn name(&self) -> &'static str {
        "sample-log"
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
