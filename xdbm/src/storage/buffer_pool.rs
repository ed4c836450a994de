//! Spare page buffers for the block cache.
//!
//! Pages evicted from the cache or discarded by a rollback are kept here and
//! handed out again when a new page is loaded, instead of allocating a fresh
//! 8KB buffer each time.
//!
//! # Invariants
//!
//! - Only pages with `transaction_count == 0` are accepted.
//! - The pool never holds more than `capacity` pages.

use crate::storage::page::{Page, PageError, PageId};

/// Default number of spare buffers kept around.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// A bounded free list of page buffers.
#[derive(Debug)]
pub struct BufferPool {
    free_list: Vec<Page>,
    capacity: usize,
}

impl BufferPool {
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            free_list: Vec::new(),
            capacity,
        }
    }

    /// Lease a zeroed page carrying `page_id`.
    ///
    /// # Post-conditions
    /// - The page is clean and has no outstanding transactions.
    pub fn lease(&mut self, page_id: PageId) -> Result<Page, PageError> {
        match self.free_list.pop() {
            Some(mut page) => {
                page.set_id(page_id)?;
                Ok(page)
            }
            None => Ok(Page::new(page_id)),
        }
    }

    /// Hand a page back for reuse.
    ///
    /// # Errors
    ///
    /// Refuses pages whose committed changes have not been written back.
    pub fn recycle(&mut self, page: Page) -> Result<(), PageError> {
        if page.is_in_transaction() {
            return Err(PageError::InFlight {
                page_id: page.id(),
                transaction_count: page.transaction_count(),
            });
        }
        if self.free_list.len() < self.capacity {
            self.free_list.push(page);
        }
        Ok(())
    }

    /// Number of spare buffers currently held.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free_list.len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_reuses_and_zeroes() {
        let mut pool = BufferPool::new(2);
        let mut page = pool.lease(4).expect("lease");
        page.write_u64(100, 99);
        page.set_clean();
        pool.recycle(page).expect("recycle");
        assert_eq!(pool.available(), 1);

        let reused = pool.lease(9).expect("lease again");
        assert_eq!(reused.id(), 9);
        assert_eq!(reused.read_u64(100), 0);
        assert!(!reused.is_dirty());
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_recycle_refuses_in_flight_page() {
        let mut pool = BufferPool::new(2);
        let mut page = Page::new(1);
        page.increment_transaction_count();

        let err = pool.recycle(page).expect_err("in-flight page");
        assert!(err.is_illegal_state());
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_capacity_bound() {
        let mut pool = BufferPool::new(1);
        pool.recycle(Page::new(1)).expect("first");
        pool.recycle(Page::new(2)).expect("second is dropped");
        assert_eq!(pool.available(), 1);
    }
}
