//! # Runtime
//!
//! The explicitly constructed context every task step receives. It replaces
//! process-wide singletons: the page pool and the serial link are created by
//! the firmware entry point, handed to [`Runtime::boot`], and reached through
//! the runtime from then on.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► Runtime::boot()             ← PagePool → SwappableMemoryPool → ByteQueues
//!         ├─► Scheduler::schedule_task()  ← Register tasks (×N)
//!         └─► Runtime::start()            ← Record task load, run loop (no return)
//! ```

use crate::config::{PAGE_COUNT, PAGE_SIZE, QUEUE_CAPACITY};
use crate::error::PoolError;
use crate::frame::Command;
use crate::halt::halt;
use crate::link::{evicted_wire_len, SerialLink, TxKick};
use crate::page_pool::PagePool;
use crate::scheduler::Scheduler;
use crate::status::{self, ResourcePayload, PAYLOAD_LEN};
use crate::swap::{Allocation, SwappableMemoryPool};

/// Page pool with the vehicle's geometry.
pub type VehiclePages = PagePool<PAGE_COUNT, PAGE_SIZE>;

/// Serial link with the vehicle's queue capacity.
pub type VehicleLink<K> = SerialLink<K, QUEUE_CAPACITY>;

/// Swappable allocator that evicts over the serial link.
pub type VehicleMemory<'a, K> =
    SwappableMemoryPool<'a, &'a VehicleLink<K>, PAGE_COUNT, PAGE_SIZE>;

/// Context handed to every task step.
pub struct Runtime<'a, K: TxKick> {
    memory: VehicleMemory<'a, K>,
    link: &'a VehicleLink<K>,
    task_load: usize,
}

impl<'a, K: TxKick> Runtime<'a, K> {
    /// Bring the core up in its fixed order: page pool, swappable allocator
    /// (bound to the link as eviction sink), then the serial queues.
    pub fn boot(pages: &'a mut VehiclePages, link: &'a VehicleLink<K>) -> Self {
        pages.reset();
        let memory = SwappableMemoryPool::new(pages, link);
        link.reset();
        log::info!(
            "runtime up: {} pages x {} bytes, queues {} bytes",
            PAGE_COUNT,
            PAGE_SIZE,
            QUEUE_CAPACITY
        );
        Self {
            memory,
            link,
            task_load: 0,
        }
    }

    /// Record the scheduler's load and enter its run loop. **Does not return.**
    pub fn start(mut self, scheduler: &mut Scheduler<'_, Self>) -> ! {
        self.track_load(scheduler);
        scheduler.execute(&mut self)
    }

    /// Take the task-queue load reported in status snapshots from `scheduler`.
    pub fn track_load<C, const MAX: usize>(&mut self, scheduler: &Scheduler<'_, C, MAX>) {
        self.task_load = scheduler.task_count();
    }

    /// Allocate working memory.
    ///
    /// Ordinary failures are returned; a refused eviction is fatal and halts,
    /// since the victim's bytes have nowhere else to go.
    pub fn allocate(&mut self, size: usize) -> Result<Allocation, PoolError> {
        match self.memory.allocate(size) {
            Err(err) if err.is_fatal() => halt(&err),
            result => result,
        }
    }

    /// Outbound bytes that `allocate(size)` would queue by evicting now.
    ///
    /// Tasks that allocate under memory pressure compare this with the
    /// outbound free space and wait while the link is still busy, instead
    /// of forcing an eviction the link has to refuse.
    pub fn eviction_wire_len(&self, size: usize) -> usize {
        let mut total = 0;
        self.memory
            .for_each_victim(size, |len| total += evicted_wire_len(len));
        total
    }

    pub fn memory(&mut self) -> &mut VehicleMemory<'a, K> {
        &mut self.memory
    }

    pub fn link(&self) -> &'a VehicleLink<K> {
        self.link
    }

    pub fn task_load(&self) -> usize {
        self.task_load
    }

    /// Current resource counters.
    pub fn status(&self) -> ResourcePayload {
        status::snapshot(self.memory.page_pool(), self.link.inbound(), self.task_load)
    }

    /// Send a checksummed status frame; halts if it cannot be queued.
    pub fn send_status(&self) {
        let mut payload = [0u8; 1 + PAYLOAD_LEN];
        payload[0] = Command::Status as u8;
        payload[1..].copy_from_slice(&self.status().encode());
        self.link.send_checked_or_halt(&payload);
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SCI_CMD_AND_PAYLOAD_SIZE;

    fn noop() {}

    #[test]
    fn test_boot_resets_components() {
        let mut pages = VehiclePages::new();
        pages.allocate_page().unwrap();
        let link = VehicleLink::new(noop as fn());
        link.on_receive(1).unwrap();

        let rt = Runtime::boot(&mut pages, &link);
        let status = rt.status();
        assert_eq!(status.free_pages as usize, PAGE_COUNT);
        assert_eq!(status.used_pages, 0);
        assert_eq!(status.page_size as usize, PAGE_SIZE);
        assert_eq!(status.used_receive_queue, 0);
        assert_eq!(status.free_receive_queue as usize, QUEUE_CAPACITY);
    }

    #[test]
    fn test_status_tracks_allocations_and_load() {
        let mut pages = VehiclePages::new();
        let link = VehicleLink::new(noop as fn());
        let mut rt = Runtime::boot(&mut pages, &link);

        let mut a = |_: &mut ()| {};
        let mut b = |_: &mut ()| {};
        let mut sched = Scheduler::<'_, ()>::new();
        sched.schedule_task(&mut a).unwrap();
        sched.schedule_task(&mut b).unwrap();
        rt.track_load(&sched);

        assert_eq!(rt.eviction_wire_len(PAGE_SIZE * 2 + 1), 0);
        let _buf = rt.allocate(PAGE_SIZE * 2 + 1).unwrap();
        let status = rt.status();
        assert_eq!(status.used_pages, 3);
        assert_eq!(status.free_pages as usize, PAGE_COUNT - 3);
        assert_eq!(status.task_queue_load, 2);
    }

    #[test]
    fn test_send_status_frame() {
        let mut pages = VehiclePages::new();
        let link = VehicleLink::new(noop as fn());
        let rt = Runtime::boot(&mut pages, &link);

        rt.send_status();
        let mut wire = [0u8; SCI_CMD_AND_PAYLOAD_SIZE + 1];
        assert_eq!(link.outbound().dequeue(&mut wire), wire.len());
        assert_eq!(wire[0], Command::Status as u8);
        assert_eq!(ResourcePayload::decode(&wire[1..]), Some(rt.status()));
    }

    #[test]
    fn test_memory_pressure_spills_over_link() {
        let mut pages = VehiclePages::new();
        let link = VehicleLink::new(noop as fn());
        let mut rt = Runtime::boot(&mut pages, &link);

        let oldest = rt.allocate(40).unwrap();
        rt.memory().write(&oldest, 0, &[0x5A; 40]).unwrap();
        let _rest = rt.allocate(PAGE_SIZE * (PAGE_COUNT - 2)).unwrap();

        assert_eq!(rt.eviction_wire_len(PAGE_SIZE), 3 * (SCI_CMD_AND_PAYLOAD_SIZE + 1));
        // Three pages need both allocations gone: 3 + 30 frames.
        assert_eq!(
            rt.eviction_wire_len(PAGE_SIZE * 3),
            33 * (SCI_CMD_AND_PAYLOAD_SIZE + 1)
        );

        let fresh = rt.allocate(PAGE_SIZE).unwrap();
        assert!(!rt.memory().is_resident(&oldest));
        assert!(rt.memory().is_resident(&fresh));
        assert_eq!(rt.memory().evictions(), 1);

        // 40 bytes at 15 per frame: three checksummed frames.
        assert_eq!(link.outbound().used_space(), 3 * (SCI_CMD_AND_PAYLOAD_SIZE + 1));
        assert_eq!(link.outbound().dequeue_byte(), Ok(Command::Evicted as u8));
        assert_eq!(link.outbound().dequeue_byte(), Ok(0x5A));
    }

    #[test]
    #[should_panic(expected = "fatal halt")]
    fn test_eviction_that_cannot_be_queued_halts() {
        let mut pages = VehiclePages::new();
        let link = VehicleLink::new(noop as fn());
        let mut rt = Runtime::boot(&mut pages, &link);

        // Evicting the whole pool needs far more frames than the queue holds.
        let _everything = rt.allocate(PAGE_SIZE * PAGE_COUNT).unwrap();
        let _ = rt.allocate(1);
    }
}
