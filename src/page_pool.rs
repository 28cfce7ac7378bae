//! # Page Pool
//!
//! Owns `N` pages of `P` bytes each and hands them out by index. The free
//! pages form a LIFO stack, so allocating and releasing are both O(1).
//!
//! ```text
//!   free stack            storage
//!   ┌───┬───┬───┐        ┌────────┬────────┬────────┬────────┐
//!   │ 3 │ 2 │ 1 │ top    │ page 0 │ page 1 │ page 2 │ page 3 │
//!   └───┴───┴───┘        └────────┴────────┴────────┴────────┘
//!                           used      free     free     free
//! ```
//!
//! Invariant: `used_count() + free_count() == N` in every reachable state.

use crate::error::PoolError;

/// Index of a page inside its [`PagePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageIndex(usize);

impl PageIndex {
    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }
}

/// Fixed pool of `N` pages, `P` bytes each.
pub struct PagePool<const N: usize, const P: usize> {
    pages: [[u8; P]; N],
    free: [usize; N],
    free_len: usize,
    in_use: [bool; N],
}

impl<const N: usize, const P: usize> PagePool<N, P> {
    /// Create a pool with every page free. Page 0 is handed out first.
    pub const fn new() -> Self {
        let mut free = [0usize; N];
        let mut i = 0;
        while i < N {
            free[i] = N - 1 - i;
            i += 1;
        }
        Self {
            pages: [[0u8; P]; N],
            free,
            free_len: N,
            in_use: [false; N],
        }
    }

    /// Return every page to the free stack.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Take a free page. Its contents are zeroed.
    pub fn allocate_page(&mut self) -> Result<PageIndex, PoolError> {
        if self.free_len == 0 {
            return Err(PoolError::OutOfPages);
        }
        self.free_len -= 1;
        let index = self.free[self.free_len];
        self.in_use[index] = true;
        self.pages[index] = [0u8; P];
        Ok(PageIndex(index))
    }

    /// Give a page back to the pool.
    ///
    /// Releasing a page that is already free is a caller bug; it is logged
    /// and ignored so the accounting invariant survives it.
    pub fn release_page(&mut self, page: PageIndex) {
        let index = page.0;
        if index >= N || !self.in_use[index] {
            log::warn!("release of page {} which is not in use", index);
            return;
        }
        self.in_use[index] = false;
        self.free[self.free_len] = index;
        self.free_len += 1;
    }

    #[inline]
    pub const fn free_count(&self) -> usize {
        self.free_len
    }

    #[inline]
    pub const fn used_count(&self) -> usize {
        N - self.free_len
    }

    #[inline]
    pub const fn page_count(&self) -> usize {
        N
    }

    #[inline]
    pub const fn page_size(&self) -> usize {
        P
    }

    pub fn page(&self, page: PageIndex) -> &[u8; P] {
        &self.pages[page.0]
    }

    pub fn page_mut(&mut self, page: PageIndex) -> &mut [u8; P] {
        &mut self.pages[page.0]
    }
}

impl<const N: usize, const P: usize> Default for PagePool<N, P> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
