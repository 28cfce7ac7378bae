//! # Serial Link
//!
//! The framed transmit/receive queues between the cooperative loop and the
//! serial interrupt handlers.
//!
//! ```text
//!  task steps ──send_*──►┌──────────────┐──on_transmit_ready──► UART TX ISR
//!  eviction   ──────────►│   outbound   │
//!                        └──────────────┘
//!  task steps ◄─receive──┌──────────────┐◄────on_receive─────── UART RX ISR
//!                        │   inbound    │
//!                        └──────────────┘
//! ```
//!
//! Only the cooperative loop writes to the outbound queue and only the
//! transmit interrupt drains it, so free space can only grow between a
//! space check and the write that follows it.
//!
//! When a write finds the transmitter idle, the link marks it busy and
//! calls [`TxKick::resume_transmit`] once, outside any critical section.

use core::cell::Cell;

use critical_section::Mutex;

use crate::config::SCI_CMD_AND_PAYLOAD_SIZE;
use crate::error::{FrameError, QueueError};
use crate::frame::{Command, Frame};
use crate::halt::halt;
use crate::swap::EvictionSink;
use crate::sync::{critical_section, SharedQueue};

const SLOT: usize = SCI_CMD_AND_PAYLOAD_SIZE;

/// Data bytes carried by one [`Command::Evicted`] frame.
pub const EVICTED_BYTES_PER_FRAME: usize = SLOT - 1;

/// Outbound bytes taken by evicting an allocation of `len` bytes.
pub const fn evicted_wire_len(len: usize) -> usize {
    len.div_ceil(EVICTED_BYTES_PER_FRAME) * (SLOT + 1)
}

/// Restarts interrupt-driven transmission on the link driver.
pub trait TxKick {
    fn resume_transmit(&self);
}

impl<F: Fn()> TxKick for F {
    fn resume_transmit(&self) {
        self()
    }
}

/// Outbound and inbound serial queues of `C` bytes each.
pub struct SerialLink<K, const C: usize> {
    outbound: SharedQueue<C>,
    inbound: SharedQueue<C>,
    tx_busy: Mutex<Cell<bool>>,
    kick: K,
}

impl<K: TxKick, const C: usize> SerialLink<K, C> {
    pub const fn new(kick: K) -> Self {
        Self {
            outbound: SharedQueue::new(),
            inbound: SharedQueue::new(),
            tx_busy: Mutex::new(Cell::new(false)),
            kick,
        }
    }

    /// Empty both queues and mark the transmitter idle.
    pub fn reset(&self) {
        critical_section(|cs| {
            self.outbound.with(|q| q.clear());
            self.inbound.with(|q| q.clear());
            self.tx_busy.borrow(cs).set(false);
        });
    }

    // -----------------------------------------------------------------------
    // Cooperative side
    // -----------------------------------------------------------------------

    /// Queue a zero-padded command frame.
    pub fn send_command(&self, payload: &[u8]) -> Result<(), FrameError> {
        self.send_frame(payload, false)
    }

    /// Queue a zero-padded command frame followed by its checksum byte.
    pub fn send_checked(&self, payload: &[u8]) -> Result<(), FrameError> {
        self.send_frame(payload, true)
    }

    /// [`send_command`](Self::send_command), halting the system on failure.
    pub fn send_command_or_halt(&self, payload: &[u8]) {
        if let Err(err) = self.send_command(payload) {
            halt(&err);
        }
    }

    /// [`send_checked`](Self::send_checked), halting the system on failure.
    pub fn send_checked_or_halt(&self, payload: &[u8]) {
        if let Err(err) = self.send_checked(payload) {
            halt(&err);
        }
    }

    fn send_frame(&self, payload: &[u8], checksum: bool) -> Result<(), FrameError> {
        let frame = Frame::<SLOT>::new(payload, checksum)?;
        if let Err(err) = self.outbound.with(|q| frame.write_to(q)) {
            log::warn!("outbound frame of {} bytes rejected: {}", frame.wire_len(), err);
            return Err(err.into());
        }
        self.kick_if_idle();
        Ok(())
    }

    /// Dequeue one received byte.
    pub fn receive_byte(&self) -> Result<u8, QueueError> {
        self.inbound.dequeue_byte()
    }

    /// Dequeue up to `out.len()` received bytes. Returns how many were read.
    pub fn receive(&self, out: &mut [u8]) -> usize {
        self.inbound.dequeue(out)
    }

    pub fn outbound(&self) -> &SharedQueue<C> {
        &self.outbound
    }

    pub fn inbound(&self) -> &SharedQueue<C> {
        &self.inbound
    }

    pub fn is_transmitting(&self) -> bool {
        critical_section(|cs| self.tx_busy.borrow(cs).get())
    }

    fn kick_if_idle(&self) {
        let was_idle = critical_section(|cs| !self.tx_busy.borrow(cs).replace(true));
        if was_idle {
            self.kick.resume_transmit();
        }
    }

    // -----------------------------------------------------------------------
    // Interrupt side
    // -----------------------------------------------------------------------

    /// Transmit-ready interrupt: next byte for the wire, or `None` once the
    /// outbound queue is drained (the transmitter is then idle).
    pub fn on_transmit_ready(&self) -> Option<u8> {
        critical_section(|cs| {
            let next = self.outbound.with(|q| q.dequeue_byte()).ok();
            if next.is_none() {
                self.tx_busy.borrow(cs).set(false);
            }
            next
        })
    }

    /// Receive interrupt: store one byte from the wire.
    pub fn on_receive(&self, byte: u8) -> Result<(), QueueError> {
        self.inbound.enqueue_byte(byte)
    }
}

/// Evicted bytes leave as consecutive checksummed [`Command::Evicted`] frames.
impl<K: TxKick, const C: usize> EvictionSink for &SerialLink<K, C> {
    fn accept_evicted(
        &mut self,
        len: usize,
        bytes: &mut dyn Iterator<Item = u8>,
    ) -> Result<(), QueueError> {
        let wire_len = evicted_wire_len(len);
        if wire_len > self.outbound.free_space() {
            log::warn!("no room for {} bytes of eviction frames", wire_len);
            return Err(QueueError::InsufficientSpace);
        }

        let mut remaining = len;
        while remaining > 0 {
            let mut payload = [0u8; SLOT];
            payload[0] = Command::Evicted as u8;
            let n = remaining.min(EVICTED_BYTES_PER_FRAME);
            for dst in &mut payload[1..=n] {
                *dst = bytes.next().unwrap_or(0);
            }
            let frame = Frame::<SLOT>::new(&payload[..=n], true)
                .map_err(|_| QueueError::InsufficientSpace)?;
            self.outbound.with(|q| frame.write_to(q))?;
            remaining -= n;
        }

        self.kick_if_idle();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    use crate::frame::checksum;

    fn drain<K: TxKick, const C: usize>(link: &SerialLink<K, C>) -> Vec<u8> {
        let mut wire = Vec::new();
        while let Some(b) = link.on_transmit_ready() {
            wire.push(b);
        }
        wire
    }

    #[test]
    fn test_first_frame_kicks_idle_transmitter_once() {
        let kicks = AtomicU32::new(0);
        let link = SerialLink::<_, 128>::new(|| {
            kicks.fetch_add(1, Ordering::Relaxed);
        });

        link.send_command(&[Command::Ping as u8]).unwrap();
        link.send_command(&[Command::Ping as u8]).unwrap();
        assert_eq!(kicks.load(Ordering::Relaxed), 1);
        assert!(link.is_transmitting());

        assert_eq!(drain(&link).len(), 2 * SLOT);
        assert!(!link.is_transmitting());

        link.send_checked(&[Command::Pong as u8]).unwrap();
        assert_eq!(kicks.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_checked_frame_on_wire() {
        let link = SerialLink::<_, 128>::new(|| {});
        link.send_checked(&[0x11, 0x22, 0x33]).unwrap();

        let wire = drain(&link);
        assert_eq!(wire.len(), SLOT + 1);
        assert_eq!(&wire[..3], &[0x11, 0x22, 0x33]);
        assert!(wire[3..SLOT].iter().all(|&b| b == 0));
        assert_eq!(wire[SLOT], checksum(&wire[..SLOT]));
    }

    #[test]
    fn test_full_outbound_rejects_whole_frame() {
        let link = SerialLink::<_, 40>::new(|| {});
        link.send_checked(&[1]).unwrap();
        link.send_checked(&[2]).unwrap();
        assert_eq!(
            link.send_checked(&[3]),
            Err(FrameError::Queue(QueueError::InsufficientSpace))
        );
        assert_eq!(link.outbound().used_space(), 2 * (SLOT + 1));
    }

    #[test]
    #[should_panic(expected = "fatal halt")]
    fn test_transmit_path_failure_halts() {
        let link = SerialLink::<_, 16>::new(|| {});
        link.send_checked_or_halt(&[1]);
    }

    #[test]
    fn test_receive_path_is_fifo() {
        let link = SerialLink::<_, 4>::new(|| {});
        for b in [7, 8, 9] {
            link.on_receive(b).unwrap();
        }
        assert_eq!(link.receive_byte(), Ok(7));
        let mut out = [0u8; 4];
        assert_eq!(link.receive(&mut out), 2);
        assert_eq!(&out[..2], &[8, 9]);
        assert_eq!(link.receive_byte(), Err(QueueError::Empty));
    }

    #[test]
    fn test_receive_overflow_drops_byte() {
        let link = SerialLink::<_, 2>::new(|| {});
        link.on_receive(1).unwrap();
        link.on_receive(2).unwrap();
        assert_eq!(link.on_receive(3), Err(QueueError::InsufficientSpace));
        assert_eq!(link.inbound().usage(), (2, 0));
    }

    #[test]
    fn test_eviction_sink_frames_bytes_in_order() {
        let link = SerialLink::<_, 128>::new(|| {});
        let evicted: Vec<u8> = (0..20).collect();

        let mut sink = &link;
        sink.accept_evicted(evicted.len(), &mut evicted.iter().copied())
            .unwrap();

        let wire = drain(&link);
        assert_eq!(wire.len(), 2 * (SLOT + 1));
        assert_eq!(wire.len(), evicted_wire_len(evicted.len()));

        let (first, second) = wire.split_at(SLOT + 1);
        assert_eq!(first[0], Command::Evicted as u8);
        assert_eq!(&first[1..SLOT], &evicted[..EVICTED_BYTES_PER_FRAME]);
        assert_eq!(first[SLOT], checksum(&first[..SLOT]));

        let tail = &evicted[EVICTED_BYTES_PER_FRAME..];
        assert_eq!(second[0], Command::Evicted as u8);
        assert_eq!(&second[1..=tail.len()], tail);
        assert!(second[tail.len() + 1..SLOT].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_eviction_sink_refuses_without_partial_frames() {
        let link = SerialLink::<_, 20>::new(|| {});
        let evicted = [0xAB; 20];

        let mut sink = &link;
        assert_eq!(
            sink.accept_evicted(evicted.len(), &mut evicted.iter().copied()),
            Err(QueueError::InsufficientSpace)
        );
        assert_eq!(link.outbound().used_space(), 0);
    }

    #[test]
    fn test_evicted_wire_len() {
        assert_eq!(evicted_wire_len(0), 0);
        assert_eq!(evicted_wire_len(1), SLOT + 1);
        assert_eq!(evicted_wire_len(EVICTED_BYTES_PER_FRAME), SLOT + 1);
        assert_eq!(evicted_wire_len(64), 5 * (SLOT + 1));
    }

    #[test]
    fn test_reset_clears_queues_and_busy_flag() {
        let link = SerialLink::<_, 64>::new(|| {});
        link.send_command(&[1]).unwrap();
        link.on_receive(9).unwrap();
        link.reset();
        assert_eq!(link.outbound().used_space(), 0);
        assert_eq!(link.inbound().used_space(), 0);
        assert!(!link.is_transmitting());
    }
}
