//! # Swappable Memory Pool
//!
//! Allocator on top of [`PagePool`] that relieves memory pressure by
//! evicting whole allocations through an injected [`EvictionSink`].
//!
//! ## Allocation Algorithm
//!
//! 1. Pages needed = ⌈size / P⌉
//! 2. Enough free pages → allocate directly
//! 3. Otherwise evict the oldest outstanding allocations (FIFO by allocation
//!    order) until enough pages are free; each victim's bytes go to the sink
//! 4. The sink refusing bytes is fatal ([`PoolError::EvictionRejected`]);
//!    the victim stays resident
//! 5. Retry the allocation once; still short → [`PoolError::AllocationFailed`]
//!
//! An allocation's pages are chained through `links`, so an allocation
//! never needs contiguous pages.
//!
//! ## Eviction Is Destructive
//!
//! Eviction revokes the victim's handle. Every later access through it
//! returns [`PoolError::Evicted`]; owners poll [`SwappableMemoryPool::is_resident`]
//! to learn about it.

use crate::error::{PoolError, QueueError};
use crate::page_pool::{PageIndex, PagePool};
use crate::queue::ByteQueue;

// ---------------------------------------------------------------------------
// Eviction sink capability
// ---------------------------------------------------------------------------

/// Accepts the bytes of an evicted allocation.
///
/// Implementations must not block. They either take all `len` bytes or
/// none of them.
pub trait EvictionSink {
    fn accept_evicted(
        &mut self,
        len: usize,
        bytes: &mut dyn Iterator<Item = u8>,
    ) -> Result<(), QueueError>;
}

/// Raw sink: evicted bytes are queued unframed.
impl<const C: usize> EvictionSink for ByteQueue<C> {
    fn accept_evicted(
        &mut self,
        len: usize,
        bytes: &mut dyn Iterator<Item = u8>,
    ) -> Result<(), QueueError> {
        if len > self.free_space() {
            return Err(QueueError::InsufficientSpace);
        }
        for _ in 0..len {
            self.enqueue_byte(bytes.next().unwrap_or(0))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Allocation handle
// ---------------------------------------------------------------------------

/// Handle to an allocation. Owned by the requesting task until passed to
/// [`SwappableMemoryPool::free`].
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    id: u64,
    size: usize,
    pages: usize,
}

impl Allocation {
    /// Requested size in bytes.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Pages backing the allocation: ⌈size / page size⌉.
    pub const fn page_count(&self) -> usize {
        self.pages
    }
}

#[derive(Debug, Clone, Copy)]
struct Record {
    id: u64,
    head: PageIndex,
    size: usize,
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Page allocator that evicts its oldest allocation when memory runs out.
pub struct SwappableMemoryPool<'a, S, const N: usize, const P: usize> {
    pages: &'a mut PagePool<N, P>,
    sink: S,
    /// Outstanding allocations. At most one per page.
    records: [Option<Record>; N],
    /// Next page of the same allocation, `None` at the end of a chain.
    links: [Option<PageIndex>; N],
    /// Allocation order. Never wraps in practice, so the lowest id is
    /// always the oldest and a revoked handle never matches a newer one.
    next_id: u64,
    evictions: u32,
}

impl<'a, S: EvictionSink, const N: usize, const P: usize> SwappableMemoryPool<'a, S, N, P> {
    /// Bind the allocator to its page pool and eviction sink.
    pub fn new(pages: &'a mut PagePool<N, P>, sink: S) -> Self {
        Self {
            pages,
            sink,
            records: [None; N],
            links: [None; N],
            next_id: 0,
            evictions: 0,
        }
    }

    /// Allocate `size` bytes, evicting older allocations if needed.
    ///
    /// # Returns
    /// - `Ok(allocation)`: backed by exactly ⌈size / P⌉ pages
    /// - `Err(AllocationFailed)`: zero-sized, larger than the pool, or still
    ///   short after eviction
    /// - `Err(EvictionRejected)`: the sink refused a victim (fatal)
    pub fn allocate(&mut self, size: usize) -> Result<Allocation, PoolError> {
        let needed = size.div_ceil(P);
        if needed == 0 || needed > N {
            log::warn!("allocation of {} bytes can never be satisfied", size);
            return Err(PoolError::AllocationFailed);
        }

        if self.pages.free_count() < needed {
            self.evict_for(needed)?;
            if self.pages.free_count() < needed {
                return Err(PoolError::AllocationFailed);
            }
        }

        let Some(slot) = self.records.iter().position(Option::is_none) else {
            return Err(PoolError::AllocationFailed);
        };

        // Build the chain back to front so `head` ends up as the first page.
        let mut head = None;
        for _ in 0..needed {
            let page = self.pages.allocate_page()?;
            self.links[page.get()] = head;
            head = Some(page);
        }
        let head = head.ok_or(PoolError::AllocationFailed)?;

        let id = self.next_id;
        self.next_id += 1;
        self.records[slot] = Some(Record { id, head, size });

        log::trace!("allocated #{}: {} bytes in {} pages", id, size, needed);
        Ok(Allocation {
            id,
            size,
            pages: needed,
        })
    }

    /// Return an allocation's pages to the pool.
    pub fn free(&mut self, allocation: Allocation) -> Result<(), PoolError> {
        let slot = self.slot_of(&allocation)?;
        if let Some(record) = self.records[slot].take() {
            self.release_chain(record.head);
            log::trace!("freed #{}", record.id);
        }
        Ok(())
    }

    /// Copy `data` into the allocation starting at `offset`.
    pub fn write(
        &mut self,
        allocation: &Allocation,
        offset: usize,
        data: &[u8],
    ) -> Result<(), PoolError> {
        let record = self.record(allocation)?;
        let mut page = self.locate(record, offset, data.len())?;

        let mut within = offset % P;
        let mut data = data;
        while !data.is_empty() {
            let index = page.ok_or(PoolError::OutOfBounds)?;
            let n = (P - within).min(data.len());
            self.pages.page_mut(index)[within..within + n].copy_from_slice(&data[..n]);
            data = &data[n..];
            within = 0;
            page = self.links[index.get()];
        }
        Ok(())
    }

    /// Copy bytes out of the allocation starting at `offset` into `out`.
    pub fn read(
        &self,
        allocation: &Allocation,
        offset: usize,
        out: &mut [u8],
    ) -> Result<(), PoolError> {
        let record = self.record(allocation)?;
        let mut page = self.locate(record, offset, out.len())?;

        let mut within = offset % P;
        let mut filled = 0;
        while filled < out.len() {
            let index = page.ok_or(PoolError::OutOfBounds)?;
            let n = (P - within).min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&self.pages.page(index)[within..within + n]);
            filled += n;
            within = 0;
            page = self.links[index.get()];
        }
        Ok(())
    }

    /// False once the allocation has been evicted.
    pub fn is_resident(&self, allocation: &Allocation) -> bool {
        self.slot_of(allocation).is_ok()
    }

    /// Report the size of every allocation that `allocate(size)` would
    /// evict right now, oldest first. Requests that fail without evicting
    /// report nothing.
    pub fn for_each_victim(&self, size: usize, mut visit: impl FnMut(usize)) {
        let needed = size.div_ceil(P);
        if needed == 0 || needed > N {
            return;
        }
        let mut free = self.pages.free_count();
        let mut after = None;
        while free < needed {
            let Some(victim) = self.next_oldest(after) else {
                return;
            };
            visit(victim.size);
            free += victim.size.div_ceil(P);
            after = Some(victim.id);
        }
    }

    /// Number of allocations currently holding pages.
    pub fn outstanding(&self) -> usize {
        self.records.iter().filter(|r| r.is_some()).count()
    }

    /// Total evictions since construction.
    pub const fn evictions(&self) -> u32 {
        self.evictions
    }

    pub fn page_pool(&self) -> &PagePool<N, P> {
        &*self.pages
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Evict oldest-first until `needed` pages are free.
    fn evict_for(&mut self, needed: usize) -> Result<(), PoolError> {
        while self.pages.free_count() < needed {
            let Some(slot) = self.oldest() else {
                return Err(PoolError::OutOfPages);
            };
            self.evict(slot)?;
        }
        Ok(())
    }

    fn evict(&mut self, slot: usize) -> Result<(), PoolError> {
        let Some(record) = self.records[slot] else {
            return Ok(());
        };

        let mut bytes = ChainBytes {
            pages: &*self.pages,
            links: &self.links,
            page: Some(record.head),
            within: 0,
            remaining: record.size,
        };
        if let Err(err) = self.sink.accept_evicted(record.size, &mut bytes) {
            log::error!("eviction of #{} ({} bytes) rejected: {}", record.id, record.size, err);
            return Err(PoolError::EvictionRejected);
        }

        self.records[slot] = None;
        self.release_chain(record.head);
        self.evictions = self.evictions.wrapping_add(1);
        log::debug!("evicted #{} ({} bytes)", record.id, record.size);
        Ok(())
    }

    /// Slot of the outstanding allocation with the lowest id.
    fn oldest(&self) -> Option<usize> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(slot, r)| r.map(|r| (slot, r.id)))
            .min_by_key(|&(_, id)| id)
            .map(|(slot, _)| slot)
    }

    /// Oldest outstanding allocation allocated after `after`.
    fn next_oldest(&self, after: Option<u64>) -> Option<Record> {
        self.records
            .iter()
            .flatten()
            .filter(|r| after.map_or(true, |id| r.id > id))
            .min_by_key(|r| r.id)
            .copied()
    }

    fn release_chain(&mut self, head: PageIndex) {
        let mut page = Some(head);
        while let Some(index) = page {
            page = self.links[index.get()].take();
            self.pages.release_page(index);
        }
    }

    fn slot_of(&self, allocation: &Allocation) -> Result<usize, PoolError> {
        self.records
            .iter()
            .position(|r| matches!(r, Some(r) if r.id == allocation.id))
            .ok_or(PoolError::Evicted)
    }

    fn record(&self, allocation: &Allocation) -> Result<Record, PoolError> {
        let slot = self.slot_of(allocation)?;
        self.records[slot].ok_or(PoolError::Evicted)
    }

    /// Bounds-check `[offset, offset + len)` and find the page holding `offset`.
    fn locate(
        &self,
        record: Record,
        offset: usize,
        len: usize,
    ) -> Result<Option<PageIndex>, PoolError> {
        let end = offset.checked_add(len).ok_or(PoolError::OutOfBounds)?;
        if end > record.size {
            return Err(PoolError::OutOfBounds);
        }
        let mut page = Some(record.head);
        for _ in 0..offset / P {
            page = page.and_then(|p| self.links[p.get()]);
        }
        Ok(page)
    }
}

/// Iterator over the first `remaining` bytes of a page chain.
struct ChainBytes<'p, const N: usize, const P: usize> {
    pages: &'p PagePool<N, P>,
    links: &'p [Option<PageIndex>; N],
    page: Option<PageIndex>,
    within: usize,
    remaining: usize,
}

impl<const N: usize, const P: usize> Iterator for ChainBytes<'_, N, P> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        let page = self.page?;
        let byte = self.pages.page(page)[self.within];
        self.remaining -= 1;
        self.within += 1;
        if self.within == P {
            self.within = 0;
            self.page = self.links[page.get()];
        }
        Some(byte)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that records what it accepts and can be told to refuse.
    struct Recorder {
        accepted: Vec<Vec<u8>>,
        refuse: bool,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                accepted: Vec::new(),
                refuse: false,
            }
        }
    }

    impl EvictionSink for Recorder {
        fn accept_evicted(
            &mut self,
            len: usize,
            bytes: &mut dyn Iterator<Item = u8>,
        ) -> Result<(), QueueError> {
            if self.refuse {
                return Err(QueueError::InsufficientSpace);
            }
            let evicted: Vec<u8> = bytes.collect();
            assert_eq!(evicted.len(), len);
            self.accepted.push(evicted);
            Ok(())
        }
    }

    fn assert_accounting<S: EvictionSink, const N: usize, const P: usize>(
        pool: &SwappableMemoryPool<'_, S, N, P>,
    ) {
        let pages = pool.page_pool();
        assert_eq!(pages.used_count() + pages.free_count(), N);
    }

    #[test]
    fn test_allocation_rounds_up_to_pages() {
        let mut pages = PagePool::<4, 64>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());

        let a = pool.allocate(65).unwrap();
        assert_eq!(a.page_count(), 2);
        assert_eq!(pool.page_pool().used_count(), 2);

        let b = pool.allocate(64).unwrap();
        assert_eq!(b.page_count(), 1);
        assert_eq!(pool.page_pool().used_count(), 3);
        assert_accounting(&pool);
    }

    #[test]
    fn test_request_larger_than_pool_fails() {
        let mut pages = PagePool::<4, 64>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());

        assert_eq!(pool.allocate(300), Err(PoolError::AllocationFailed));
        assert_eq!(pool.evictions(), 0);
        assert_eq!(pool.page_pool().free_count(), 4);
    }

    #[test]
    fn test_zero_sized_request_fails() {
        let mut pages = PagePool::<4, 64>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());
        assert_eq!(pool.allocate(0), Err(PoolError::AllocationFailed));
    }

    #[test]
    fn test_write_read_across_page_boundary() {
        let mut pages = PagePool::<4, 8>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());

        let a = pool.allocate(20).unwrap();
        let data: Vec<u8> = (1..=14).collect();
        pool.write(&a, 5, &data).unwrap();

        let mut out = [0u8; 20];
        pool.read(&a, 0, &mut out).unwrap();
        assert_eq!(&out[..5], &[0; 5]);
        assert_eq!(&out[5..19], &data[..]);
        assert_eq!(out[19], 0);
    }

    #[test]
    fn test_out_of_bounds_access() {
        let mut pages = PagePool::<4, 8>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());

        let a = pool.allocate(10).unwrap();
        assert_eq!(pool.write(&a, 8, &[1, 2, 3]), Err(PoolError::OutOfBounds));
        let mut out = [0u8; 11];
        assert_eq!(pool.read(&a, 0, &mut out), Err(PoolError::OutOfBounds));
    }

    #[test]
    fn test_exhaustion_evicts_oldest_allocation() {
        let mut pages = PagePool::<4, 8>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());

        let first = pool.allocate(12).unwrap();
        pool.write(&first, 0, b"first-alloc!").unwrap();
        let second = pool.allocate(16).unwrap();
        pool.write(&second, 0, b"second-allocatio").unwrap();
        assert_eq!(pool.page_pool().free_count(), 0);

        let third = pool.allocate(9).unwrap();
        assert_eq!(third.page_count(), 2);
        assert_eq!(pool.evictions(), 1);

        // Only the oldest was evicted, and only its requested bytes were sent.
        assert_eq!(pool.sink().accepted, vec![b"first-alloc!".to_vec()]);
        assert!(!pool.is_resident(&first));
        assert!(pool.is_resident(&second));
        assert!(pool.is_resident(&third));
        assert_accounting(&pool);
    }

    #[test]
    fn test_eviction_takes_several_victims_in_fifo_order() {
        let mut pages = PagePool::<4, 8>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());

        let a = pool.allocate(8).unwrap();
        pool.write(&a, 0, &[0xA; 8]).unwrap();
        let b = pool.allocate(8).unwrap();
        pool.write(&b, 0, &[0xB; 8]).unwrap();
        let c = pool.allocate(16).unwrap();

        let big = pool.allocate(16).unwrap();
        assert_eq!(big.page_count(), 2);
        assert_eq!(pool.evictions(), 2);
        assert_eq!(pool.sink().accepted, vec![vec![0xA; 8], vec![0xB; 8]]);
        assert!(pool.is_resident(&c));
        assert_eq!(pool.outstanding(), 2);
    }

    #[test]
    fn test_evicted_handle_is_revoked() {
        let mut pages = PagePool::<2, 8>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());

        let old = pool.allocate(16).unwrap();
        let _new = pool.allocate(8).unwrap();

        let mut out = [0u8; 1];
        assert_eq!(pool.read(&old, 0, &mut out), Err(PoolError::Evicted));
        assert_eq!(pool.write(&old, 0, &[1]), Err(PoolError::Evicted));
        assert_eq!(pool.free(old), Err(PoolError::Evicted));
        assert_accounting(&pool);
    }

    #[test]
    fn test_rejected_eviction_is_fatal_and_keeps_victim() {
        let mut pages = PagePool::<2, 8>::new();
        let mut recorder = Recorder::new();
        recorder.refuse = true;
        let mut pool = SwappableMemoryPool::new(&mut pages, recorder);

        let victim = pool.allocate(16).unwrap();
        let err = pool.allocate(8).unwrap_err();
        assert_eq!(err, PoolError::EvictionRejected);
        assert!(err.is_fatal());
        assert!(pool.is_resident(&victim));
        assert_eq!(pool.page_pool().used_count(), 2);
    }

    #[test]
    fn test_free_returns_pages() {
        let mut pages = PagePool::<4, 8>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());

        let a = pool.allocate(30).unwrap();
        assert_eq!(pool.page_pool().free_count(), 0);
        pool.free(a).unwrap();
        assert_eq!(pool.page_pool().free_count(), 4);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_byte_queue_sink_receives_evicted_bytes_in_order() {
        let mut pages = PagePool::<2, 4>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, ByteQueue::<16>::new());

        let a = pool.allocate(6).unwrap();
        pool.write(&a, 0, &[1, 2, 3, 4, 5, 6]).unwrap();
        let _b = pool.allocate(4).unwrap();

        let mut out = [0u8; 16];
        let n = pool.sink_mut().dequeue(&mut out);
        assert_eq!(&out[..n], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_aggregate_pages_never_exceed_pool() {
        let mut pages = PagePool::<4, 8>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());

        let mut live = Vec::new();
        for size in [3usize, 17, 8, 25, 1, 9, 32, 16] {
            let a = pool.allocate(size).unwrap();
            assert!(a.page_count() <= size.div_ceil(8));
            live.push(a);
            assert!(pool.page_pool().used_count() <= 4);
            assert_accounting(&pool);
        }
    }

    #[test]
    fn test_victims_match_what_allocate_evicts() {
        let mut pages = PagePool::<4, 8>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());

        let _a = pool.allocate(5).unwrap();
        let _b = pool.allocate(12).unwrap();
        let mut victims = Vec::new();
        pool.for_each_victim(8, |len| victims.push(len));
        assert!(victims.is_empty());

        let _c = pool.allocate(8).unwrap();
        pool.for_each_victim(16, |len| victims.push(len));
        assert_eq!(victims, [5, 12]);

        // Requests that can never succeed evict nothing.
        victims.clear();
        pool.for_each_victim(0, |len| victims.push(len));
        pool.for_each_victim(33, |len| victims.push(len));
        assert!(victims.is_empty());

        let _d = pool.allocate(16).unwrap();
        let evicted: Vec<usize> = pool.sink().accepted.iter().map(Vec::len).collect();
        assert_eq!(evicted, [5, 12]);
    }

    #[test]
    fn test_fifo_order_survives_32_bit_ids() {
        let mut pages = PagePool::<2, 8>::new();
        let mut pool = SwappableMemoryPool::new(&mut pages, Recorder::new());
        pool.next_id = u64::from(u32::MAX);

        let old = pool.allocate(8).unwrap();
        pool.write(&old, 0, &[1]).unwrap();
        let newer = pool.allocate(8).unwrap();
        pool.write(&newer, 0, &[2]).unwrap();

        let _fresh = pool.allocate(8).unwrap();
        assert!(!pool.is_resident(&old));
        assert!(pool.is_resident(&newer));
        assert_eq!(pool.sink().accepted[0][0], 1);
    }
}
