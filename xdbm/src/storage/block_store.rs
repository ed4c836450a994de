//! Block cache with transactional write-back.
//!
//! Every page the record manager touches goes through here. Modified pages
//! stay in memory until [`BlockStore::commit`] appends their images to the
//! transaction log; the data file only sees them at a checkpoint.
//!
//! # Page lifecycle
//!
//! ```text
//! load ──> clean ──write──> dirty ──commit──> in transaction ──checkpoint──> clean
//!                             │
//!                             └──rollback──> discarded
//! ```
//!
//! # Invariants
//!
//! - Dirty pages and pages with `transaction_count > 0` are never evicted.
//! - A read returns, in order of preference: the cached page, the newest
//!   committed image still in the log, the data file.
//! - Checkpoint writes committed images only; uncommitted edits in the
//!   cache are never written to the data file.

use std::collections::HashMap;

use crate::storage::StoreError;
use crate::storage::buffer_pool::BufferPool;
use crate::storage::file::DatabaseFile;
use crate::storage::log::{TransactionLog, TxnId};
use crate::storage::page::{PAGE_SIZE, Page, PageId, PageType};

/// Cache of pages over a data file and an optional transaction log.
pub struct BlockStore {
    file: DatabaseFile,
    log: Option<TransactionLog>,
    cache: HashMap<PageId, Page>,
    pool: BufferPool,
    /// Soft bound on cached pages.
    cache_capacity: usize,
    /// Commits buffered in the log before a checkpoint.
    txns_in_log: usize,
}

impl BlockStore {
    #[must_use]
    pub fn new(
        file: DatabaseFile,
        log: Option<TransactionLog>,
        cache_capacity: usize,
        txns_in_log: usize,
    ) -> Self {
        Self {
            file,
            log,
            cache: HashMap::new(),
            pool: BufferPool::default(),
            cache_capacity: cache_capacity.max(1),
            txns_in_log: txns_in_log.max(1),
        }
    }

    /// Whether commits go through the transaction log.
    #[must_use]
    pub const fn is_transactional(&self) -> bool {
        self.log.is_some()
    }

    /// Get a page for reading.
    pub fn read(&mut self, page_id: PageId) -> Result<&Page, StoreError> {
        self.load(page_id)?;
        self.cache
            .get(&page_id)
            .ok_or_else(|| StoreError::IllegalState(format!("page {page_id} vanished from cache")))
    }

    /// Get a page for modification. Writes through the returned page mark it dirty.
    pub fn get_mut(&mut self, page_id: PageId) -> Result<&mut Page, StoreError> {
        self.load(page_id)?;
        self.cache
            .get_mut(&page_id)
            .ok_or_else(|| StoreError::IllegalState(format!("page {page_id} vanished from cache")))
    }

    /// Start a fresh, zeroed, dirty page for a newly allocated id.
    ///
    /// # Errors
    ///
    /// Fails with `IllegalState` if the id still has committed changes
    /// waiting for a checkpoint.
    pub fn create(&mut self, page_id: PageId) -> Result<&mut Page, StoreError> {
        if self.is_in_flight(page_id) {
            return Err(StoreError::IllegalState(format!(
                "page {page_id} reused before its last transaction was checkpointed"
            )));
        }
        if !self.cache.contains_key(&page_id) {
            self.evict_clean()?;
            let page = self.pool.lease(page_id)?;
            self.cache.insert(page_id, page);
        }
        let page = self
            .cache
            .get_mut(&page_id)
            .ok_or_else(|| StoreError::IllegalState(format!("page {page_id} vanished from cache")))?;
        page.clear();
        Ok(page)
    }

    /// Whether committed changes to `page_id` are only in the log so far.
    #[must_use]
    pub fn is_in_flight(&self, page_id: PageId) -> bool {
        self.cache.get(&page_id).is_some_and(Page::is_in_transaction)
            || self
                .log
                .as_ref()
                .is_some_and(|log| log.pending_image(page_id).is_some())
    }

    /// Whether any page was modified since the last commit or rollback.
    #[must_use]
    pub fn has_dirty(&self) -> bool {
        self.cache.values().any(Page::is_dirty)
    }

    #[must_use]
    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }

    fn load(&mut self, page_id: PageId) -> Result<(), StoreError> {
        if self.cache.contains_key(&page_id) {
            return Ok(());
        }
        self.evict_clean()?;

        let mut page = self.pool.lease(page_id)?;
        match self.log.as_ref().and_then(|log| log.pending_image(page_id)) {
            Some(image) => {
                page.as_bytes_mut().copy_from_slice(image.data.as_slice());
                for _ in 0..image.transactions {
                    page.increment_transaction_count();
                }
            }
            None => {
                self.file.read_into(&mut page)?;
                if page_id != 0 {
                    validate(&page)?;
                }
            }
        }
        self.cache.insert(page_id, page);
        Ok(())
    }

    /// Drop clean, settled pages until there is room for one more.
    fn evict_clean(&mut self) -> Result<(), StoreError> {
        if self.cache.len() < self.cache_capacity {
            return Ok(());
        }
        let excess = self.cache.len() + 1 - self.cache_capacity;
        let victims: Vec<PageId> = self
            .cache
            .values()
            .filter(|page| page.id() != 0 && !page.is_dirty() && !page.is_in_transaction())
            .map(Page::id)
            .take(excess)
            .collect();
        let evicted = victims.len();
        for page_id in victims {
            if let Some(page) = self.cache.remove(&page_id) {
                self.pool.recycle(page)?;
            }
        }
        tracing::trace!(
            "evicted {evicted} clean pages, {} spare buffers",
            self.pool.available()
        );
        Ok(())
    }

    /// Make every dirty page durable as transaction `txn_id`.
    ///
    /// With a log, the images are appended and synced there and a
    /// checkpoint follows once enough commits have accumulated. Without
    /// one, the pages are written to the data file and synced directly.
    pub fn commit(&mut self, txn_id: TxnId) -> Result<(), StoreError> {
        let mut dirty: Vec<PageId> = self
            .cache
            .values()
            .filter(|page| page.is_dirty())
            .map(Page::id)
            .collect();
        if dirty.is_empty() {
            return Ok(());
        }
        dirty.sort_unstable();

        for page_id in &dirty {
            if let Some(page) = self.cache.get_mut(page_id) {
                if *page_id != 0 {
                    page.stamp_checksum();
                }
            }
        }

        let checkpoint_due = if let Some(log) = self.log.as_mut() {
            let images: Vec<(PageId, &[u8; PAGE_SIZE])> = dirty
                .iter()
                .filter_map(|id| self.cache.get(id).map(|page| (*id, page.as_bytes())))
                .collect();
            log.append_transaction(txn_id, &images)?;
            for page_id in &dirty {
                if let Some(page) = self.cache.get_mut(page_id) {
                    page.set_clean();
                    page.increment_transaction_count();
                }
            }
            log.committed_transactions() >= self.txns_in_log
        } else {
            for page_id in &dirty {
                if let Some(page) = self.cache.get(page_id) {
                    self.file.write_page(*page_id, page.as_bytes())?;
                }
            }
            self.file.sync()?;
            for page_id in &dirty {
                if let Some(page) = self.cache.get_mut(page_id) {
                    page.set_clean();
                }
            }
            false
        };

        tracing::debug!("committed transaction {txn_id} ({} pages)", dirty.len());

        if checkpoint_due {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Write every committed image in the log to the data file, sync it and
    /// truncate the log.
    pub fn checkpoint(&mut self) -> Result<(), StoreError> {
        let Some(log) = self.log.as_mut() else {
            return Ok(self.file.sync()?);
        };
        if log.is_empty() {
            return Ok(());
        }

        for (page_id, image) in log.pending_images() {
            self.file.write_page(page_id, &image.data)?;
        }
        self.file.sync()?;

        let settled = log.truncate()?;
        for (page_id, image) in &settled {
            if let Some(page) = self.cache.get_mut(page_id) {
                for _ in 0..image.transactions {
                    page.decrement_transaction_count()?;
                }
            }
        }

        tracing::debug!(
            "checkpoint wrote {} pages to {}",
            settled.len(),
            self.file.path().display()
        );
        Ok(())
    }

    /// Discard every uncommitted modification.
    pub fn rollback(&mut self) -> Result<(), StoreError> {
        let dirty: Vec<PageId> = self
            .cache
            .values()
            .filter(|page| page.is_dirty())
            .map(Page::id)
            .collect();
        for page_id in &dirty {
            if let Some(page) = self.cache.remove(page_id) {
                if !page.is_in_transaction() {
                    self.pool.recycle(page)?;
                }
            }
        }
        if !dirty.is_empty() {
            tracing::debug!("rolled back {} dirty pages", dirty.len());
        }
        Ok(())
    }
}

/// Check the header and checksum of a page read from the data file.
fn validate(page: &Page) -> Result<(), StoreError> {
    let header = page.header()?;
    if header.page_type == PageType::Superblock {
        return Err(StoreError::Corruption(format!(
            "page {} claims to be a superblock",
            page.id()
        )));
    }
    page.verify_checksum()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::superblock::Superblock;

    fn create_test_store(txns_in_log: usize) -> (tempfile::TempDir, BlockStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = DatabaseFile::create(&dir.path().join("test.db")).expect("create file");
        let log = TransactionLog::open(&dir.path().join("test.lg")).expect("open log");
        (dir, BlockStore::new(file, Some(log), 16, txns_in_log))
    }

    fn write_record_page(store: &mut BlockStore, page_id: PageId, value: u64) {
        let page = store.create(page_id).expect("create page");
        page.write_header(PageType::Record);
        page.write_u64(64, value);
    }

    #[test]
    fn test_commit_keeps_page_in_flight_until_checkpoint() {
        let (dir, mut store) = create_test_store(10);
        write_record_page(&mut store, 1, 42);
        store.commit(1).expect("commit");

        assert!(store.is_in_flight(1));
        assert!(!store.has_dirty());
        // The data file has not been extended yet
        assert_eq!(
            std::fs::metadata(dir.path().join("test.db"))
                .expect("metadata")
                .len(),
            PAGE_SIZE as u64
        );

        store.checkpoint().expect("checkpoint");
        assert!(!store.is_in_flight(1));
        assert_eq!(store.read(1).expect("read").read_u64(64), 42);
        assert_eq!(
            std::fs::metadata(dir.path().join("test.lg"))
                .expect("metadata")
                .len(),
            0
        );
    }

    #[test]
    fn test_checkpoint_after_txns_in_log_commits() {
        let (_dir, mut store) = create_test_store(2);
        write_record_page(&mut store, 1, 1);
        store.commit(1).expect("commit 1");
        assert!(store.is_in_flight(1));

        store.get_mut(1).expect("page").write_u64(64, 2);
        store.commit(2).expect("commit 2");
        assert!(!store.is_in_flight(1));
    }

    #[test]
    fn test_rollback_restores_committed_image() {
        let (_dir, mut store) = create_test_store(10);
        write_record_page(&mut store, 1, 7);
        store.commit(1).expect("commit");

        store.get_mut(1).expect("page").write_u64(64, 8);
        store.rollback().expect("rollback");

        let page = store.read(1).expect("read");
        assert_eq!(page.read_u64(64), 7);
        assert_eq!(page.transaction_count(), 1);
    }

    #[test]
    fn test_reusing_in_flight_page_is_illegal() {
        let (_dir, mut store) = create_test_store(10);
        write_record_page(&mut store, 1, 7);
        store.commit(1).expect("commit");

        let err = store.create(1).expect_err("page still in flight");
        assert!(err.is_illegal_state());

        store.checkpoint().expect("checkpoint");
        store.create(1).expect("settled page can be reused");
    }

    #[test]
    fn test_superblock_page_goes_through_cache() {
        let (_dir, mut store) = create_test_store(10);
        let mut sb = Superblock::from_page(store.read(0).expect("page 0")).expect("superblock");
        sb.next_txn_id = 9;
        sb.write_to(store.get_mut(0).expect("page 0"));
        store.rollback().expect("rollback");

        let sb = Superblock::from_page(store.read(0).expect("page 0")).expect("superblock");
        assert_eq!(sb.next_txn_id, 1);
    }

    #[test]
    fn test_eviction_spares_dirty_pages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = DatabaseFile::create(&dir.path().join("test.db")).expect("create file");
        let mut store = BlockStore::new(file, None, 2, 1);

        for page_id in 1..=4 {
            write_record_page(&mut store, page_id, page_id);
        }
        assert_eq!(store.cached_pages(), 4);

        store.commit(1).expect("commit");
        store.read(0).expect("superblock");
        assert!(store.cached_pages() <= 4);
        for page_id in 1..=4 {
            assert_eq!(store.read(page_id).expect("read").read_u64(64), page_id);
        }
    }
}
