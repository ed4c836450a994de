//! Record manager.
//!
//! Stores variable-length byte records in chains of pages and hands out a
//! stable [`RecordId`] for each, which is simply the id of the chain's first
//! page. It also keeps a small directory of named roots so that trees and
//! tables can be found again after a restart.
//!
//! # Record Page Format
//!
//! ```text
//! +----------------+----------------+----------------+------------------+
//! | Page Header    | Next Page ID   | Data Length    | Data...          |
//! | (8 bytes)      | (8 bytes)      | (4 bytes)      | (variable)       |
//! +----------------+----------------+----------------+------------------+
//! ```
//!
//! The first page of a chain carries [`FIRST_PAGE_FLAG`] in its header so a
//! continuation page is never mistaken for a record.
//!
//! # Transactions
//!
//! Every change stays in the block cache until [`RecordManager::commit`].
//! [`RecordManager::rollback`] discards everything since the last commit,
//! including allocations, frees and named-root changes.
//!
//! # Generation
//!
//! [`RecordManager::generation`] increases on every insert, update, delete
//! and rollback. Tree browsers compare it against the value they saw when
//! positioned to notice that the structure may have moved under them.

// Record chunks are bounded by PAGE_SIZE and fit in u32.
#![allow(clippy::cast_possible_truncation)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::codec::{ByteReader, ByteWriter};
use crate::config::StoreConfig;
use crate::storage::StoreError;
use crate::storage::block_store::BlockStore;
use crate::storage::file::DatabaseFile;
use crate::storage::log::TransactionLog;
use crate::storage::page::{PAGE_SIZE, Page, PageHeader, PageId, PageType};
use crate::storage::recovery::{self, RecoveryResult};
use crate::storage::superblock::Superblock;

/// Identifier of a stored record.
pub type RecordId = u64;

/// A record manager shared between the tables of one store.
pub type SharedRecordManager = Arc<Mutex<RecordManager>>;

/// Header flag marking the first page of a record chain.
pub const FIRST_PAGE_FLAG: u8 = 0x01;

/// Offset of the next-page pointer in record and free pages.
const NEXT_OFFSET: usize = PageHeader::SIZE;

/// Offset of the chunk length in record pages.
const LEN_OFFSET: usize = NEXT_OFFSET + 8;

/// Offset where record data starts.
const DATA_OFFSET: usize = LEN_OFFSET + 4;

/// Maximum record data per page.
pub const RECORD_DATA_PER_PAGE: usize = PAGE_SIZE - DATA_OFFSET;

/// Paged record storage with named roots and transactions.
pub struct RecordManager {
    store: BlockStore,
    superblock: Superblock,
    directory: BTreeMap<String, RecordId>,
    generation: u64,
    path: PathBuf,
    recovery: RecoveryResult,
    closed: bool,
}

impl std::fmt::Debug for RecordManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordManager")
            .field("path", &self.path)
            .field("generation", &self.generation)
            .field("roots", &self.directory.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl RecordManager {
    /// Open the store at `base`, creating it when absent.
    ///
    /// The data lives in `base` with extension `.db` and the log in `.lg`.
    /// A non-empty log left by a crash is replayed before anything else.
    pub fn open(base: &Path, config: &StoreConfig) -> Result<Self, StoreError> {
        let data_path = base.with_extension("db");
        let log_path = base.with_extension("lg");

        let mut file = if data_path.exists() {
            DatabaseFile::open(&data_path)?
        } else {
            tracing::info!("creating store {}", data_path.display());
            DatabaseFile::create(&data_path)?
        };

        // A log left behind is replayed even when transactions are now disabled
        let mut log = if config.disable_transactions && !log_path.exists() {
            None
        } else {
            Some(TransactionLog::open(&log_path)?)
        };
        let recovery = match log.as_mut() {
            Some(log) => recovery::recover(&mut file, log)?,
            None => RecoveryResult::default(),
        };
        if config.disable_transactions {
            log = None;
        }

        let mut store = BlockStore::new(file, log, config.cache_pages, config.txns_in_log);
        let superblock = Superblock::from_page(store.read(0)?)?;

        let mut manager = Self {
            store,
            superblock,
            directory: BTreeMap::new(),
            generation: 0,
            path: data_path,
            recovery,
            closed: false,
        };
        manager.directory = manager.load_directory()?;

        tracing::info!(
            "opened store {} ({} pages, {} named roots)",
            manager.path.display(),
            manager.superblock.total_page_count,
            manager.directory.len()
        );
        Ok(manager)
    }

    /// Open the store and wrap it for sharing between tables.
    pub fn open_shared(base: &Path, config: &StoreConfig) -> Result<SharedRecordManager, StoreError> {
        Ok(Arc::new(Mutex::new(Self::open(base, config)?)))
    }

    /// Lock a shared record manager.
    ///
    /// A poisoned lock means a panic happened mid-operation; the cached
    /// state can no longer be trusted.
    pub fn lock(shared: &SharedRecordManager) -> Result<MutexGuard<'_, Self>, StoreError> {
        shared
            .lock()
            .map_err(|_| StoreError::IllegalState("record manager lock poisoned".to_string()))
    }

    /// Path of the data file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What recovery did when this store was opened.
    #[must_use]
    pub const fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Pages handed out so far, including the superblock.
    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        self.superblock.total_page_count
    }

    /// Pages waiting on the free list.
    #[must_use]
    pub const fn free_pages(&self) -> u64 {
        self.superblock.free_page_count
    }

    const fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Store `data` as a new record.
    pub fn insert(&mut self, data: &[u8]) -> Result<RecordId, StoreError> {
        self.check_open()?;
        let first = self.allocate_page()?;
        self.write_chain(vec![first], data)?;
        self.generation += 1;
        Ok(first)
    }

    /// Read a record back.
    pub fn fetch(&mut self, recid: RecordId) -> Result<Vec<u8>, StoreError> {
        self.check_open()?;
        let limit = self.superblock.total_page_count;
        let mut out = Vec::new();
        let mut page_id = recid;
        let mut hops = 0u64;
        loop {
            let page = self.record_page(recid, page_id, hops == 0)?;
            let len = page.read_u32(LEN_OFFSET) as usize;
            if len > RECORD_DATA_PER_PAGE {
                return Err(StoreError::Corruption(format!(
                    "record {recid}: page {page_id} claims {len} bytes"
                )));
            }
            out.extend_from_slice(page.read_bytes(DATA_OFFSET, len));
            let next = page.read_u64(NEXT_OFFSET);
            if next == 0 {
                return Ok(out);
            }
            hops += 1;
            if hops >= limit {
                return Err(StoreError::Corruption(format!(
                    "record {recid}: page chain does not terminate"
                )));
            }
            page_id = next;
        }
    }

    /// Replace the contents of a record. The id stays the same.
    pub fn update(&mut self, recid: RecordId, data: &[u8]) -> Result<(), StoreError> {
        self.check_open()?;
        let pages = self.chain_pages(recid)?;
        self.write_chain(pages, data)?;
        self.generation += 1;
        Ok(())
    }

    /// Remove a record and return its pages to the free list.
    pub fn delete(&mut self, recid: RecordId) -> Result<(), StoreError> {
        self.check_open()?;
        for page_id in self.chain_pages(recid)? {
            self.free_page(page_id)?;
        }
        self.generation += 1;
        Ok(())
    }

    /// Look up a named root.
    pub fn root(&self, name: &str) -> Result<Option<RecordId>, StoreError> {
        self.check_open()?;
        Ok(self.directory.get(name).copied())
    }

    /// Bind `name` to `recid`, replacing any previous binding.
    pub fn set_root(&mut self, name: &str, recid: RecordId) -> Result<(), StoreError> {
        self.check_open()?;
        self.directory.insert(name.to_string(), recid);
        self.save_directory()
    }

    /// Remove a named root, returning what it pointed to.
    pub fn remove_root(&mut self, name: &str) -> Result<Option<RecordId>, StoreError> {
        self.check_open()?;
        let removed = self.directory.remove(name);
        if removed.is_some() {
            self.save_directory()?;
        }
        Ok(removed)
    }

    /// Names of all roots, in order.
    pub fn root_names(&self) -> Result<Vec<String>, StoreError> {
        self.check_open()?;
        Ok(self.directory.keys().cloned().collect())
    }

    /// Make everything since the last commit durable.
    ///
    /// On failure the uncommitted changes are rolled back before the error
    /// is returned.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        self.check_open()?;
        if !self.store.has_dirty() {
            return Ok(());
        }
        let txn_id = self.superblock.next_txn_id;
        self.superblock.next_txn_id += 1;
        self.flush_superblock()?;

        if let Err(e) = self.store.commit(txn_id) {
            tracing::warn!("commit of transaction {txn_id} failed, rolling back: {e}");
            if let Err(rollback_error) = self.discard_uncommitted() {
                tracing::warn!("rollback after failed commit also failed: {rollback_error}");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Discard everything since the last commit.
    pub fn rollback(&mut self) -> Result<(), StoreError> {
        self.check_open()?;
        self.discard_uncommitted()
    }

    fn discard_uncommitted(&mut self) -> Result<(), StoreError> {
        self.store.rollback()?;
        self.superblock = Superblock::from_page(self.store.read(0)?)?;
        self.directory = self.load_directory()?;
        self.generation += 1;
        Ok(())
    }

    /// Commit, then write every logged page to the data file.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.commit()?;
        self.store.checkpoint()
    }

    /// Close the store.
    ///
    /// Uncommitted changes are rolled back, committed ones are checkpointed.
    /// Closing twice is a no-op; any other operation after close fails.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        if self.store.has_dirty() {
            tracing::warn!(
                "closing {} with uncommitted changes, rolling them back",
                self.path.display()
            );
            self.discard_uncommitted()?;
        }
        self.store.checkpoint()?;
        self.closed = true;
        tracing::info!("closed store {}", self.path.display());
        Ok(())
    }

    fn record_page(
        &mut self,
        recid: RecordId,
        page_id: PageId,
        first: bool,
    ) -> Result<&Page, StoreError> {
        if page_id == 0 || page_id >= self.superblock.total_page_count {
            return Err(StoreError::RecordNotFound(recid));
        }
        let page = self.store.read(page_id)?;
        let header = page.header()?;
        let is_first = header.flags & FIRST_PAGE_FLAG != 0;
        if header.page_type != PageType::Record || is_first != first {
            return Err(StoreError::RecordNotFound(recid));
        }
        Ok(page)
    }

    fn chain_pages(&mut self, recid: RecordId) -> Result<Vec<PageId>, StoreError> {
        let limit = self.superblock.total_page_count;
        let mut pages = Vec::new();
        let mut page_id = recid;
        loop {
            let next = self
                .record_page(recid, page_id, pages.is_empty())?
                .read_u64(NEXT_OFFSET);
            pages.push(page_id);
            if next == 0 {
                return Ok(pages);
            }
            if pages.len() as u64 >= limit {
                return Err(StoreError::Corruption(format!(
                    "record {recid}: page chain does not terminate"
                )));
            }
            page_id = next;
        }
    }

    /// Lay `data` out over `pages`, growing or shrinking the chain as needed.
    fn write_chain(&mut self, mut pages: Vec<PageId>, data: &[u8]) -> Result<(), StoreError> {
        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![data]
        } else {
            data.chunks(RECORD_DATA_PER_PAGE).collect()
        };
        while pages.len() < chunks.len() {
            pages.push(self.allocate_page()?);
        }
        let surplus = pages.split_off(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let next = pages.get(i + 1).copied().unwrap_or(0);
            let page = self.store.get_mut(pages[i])?;
            page.clear();
            page.write_header(PageType::Record);
            if i == 0 {
                page.write_u8(1, FIRST_PAGE_FLAG);
            }
            page.write_u64(NEXT_OFFSET, next);
            page.write_u32(LEN_OFFSET, chunk.len() as u32);
            page.write_bytes(DATA_OFFSET, chunk);
        }

        for page_id in surplus {
            self.free_page(page_id)?;
        }
        Ok(())
    }

    fn allocate_page(&mut self) -> Result<PageId, StoreError> {
        let head = self.superblock.free_list_head;
        let page_id = if head == 0 {
            let page_id = self.superblock.total_page_count;
            self.superblock.total_page_count += 1;
            page_id
        } else {
            // A freed page is only reused once its last logged image is in the data file
            if self.store.is_in_flight(head) {
                self.store.checkpoint()?;
            }
            let page = self.store.read(head)?;
            if page.header()?.page_type != PageType::Free {
                return Err(StoreError::Corruption(format!(
                    "free list head {head} is not a free page"
                )));
            }
            self.superblock.free_list_head = page.read_u64(NEXT_OFFSET);
            self.superblock.free_page_count = self.superblock.free_page_count.saturating_sub(1);
            head
        };
        self.store.create(page_id)?;
        self.flush_superblock()?;
        Ok(page_id)
    }

    fn free_page(&mut self, page_id: PageId) -> Result<(), StoreError> {
        let head = self.superblock.free_list_head;
        let page = self.store.get_mut(page_id)?;
        page.clear();
        page.write_header(PageType::Free);
        page.write_u64(NEXT_OFFSET, head);
        self.superblock.free_list_head = page_id;
        self.superblock.free_page_count += 1;
        self.flush_superblock()
    }

    fn flush_superblock(&mut self) -> Result<(), StoreError> {
        self.superblock.write_to(self.store.get_mut(0)?);
        Ok(())
    }

    fn load_directory(&mut self) -> Result<BTreeMap<String, RecordId>, StoreError> {
        let mut directory = BTreeMap::new();
        if self.superblock.directory_record == 0 {
            return Ok(directory);
        }
        let bytes = self.fetch(self.superblock.directory_record)?;
        let mut reader = ByteReader::new(&bytes);
        let count = reader.get_u32()?;
        for _ in 0..count {
            let name = reader.get_str()?;
            let recid = reader.get_u64()?;
            directory.insert(name, recid);
        }
        reader.finish()?;
        Ok(directory)
    }

    fn save_directory(&mut self) -> Result<(), StoreError> {
        let mut writer = ByteWriter::new();
        writer.put_u32(self.directory.len() as u32);
        for (name, recid) in &self.directory {
            writer.put_str(name);
            writer.put_u64(*recid);
        }
        let bytes = writer.into_bytes();

        if self.superblock.directory_record == 0 {
            let recid = self.insert(&bytes)?;
            self.superblock.directory_record = recid;
            self.flush_superblock()
        } else {
            self.update(self.superblock.directory_record, &bytes)
        }
    }
}

impl Drop for RecordManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("failed to close store {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StoreConfig {
        StoreConfig::default().with_cache_pages(8)
    }

    fn create_test_store() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("store");
        (dir, base)
    }

    #[test]
    fn test_insert_fetch_update_delete() {
        let (_dir, base) = create_test_store();
        let mut rm = RecordManager::open(&base, &test_config()).expect("open");

        let recid = rm.insert(b"hello").expect("insert");
        assert_eq!(rm.fetch(recid).expect("fetch"), b"hello");

        rm.update(recid, b"hello, world").expect("update");
        assert_eq!(rm.fetch(recid).expect("fetch"), b"hello, world");

        rm.delete(recid).expect("delete");
        assert!(matches!(
            rm.fetch(recid),
            Err(StoreError::RecordNotFound(id)) if id == recid
        ));
    }

    #[test]
    fn test_multi_page_record_grows_and_shrinks() {
        let (_dir, base) = create_test_store();
        let mut rm = RecordManager::open(&base, &test_config()).expect("open");

        let big: Vec<u8> = (0..RECORD_DATA_PER_PAGE * 3 + 17)
            .map(|i| (i % 251) as u8)
            .collect();
        let recid = rm.insert(&big).expect("insert");
        assert_eq!(rm.fetch(recid).expect("fetch"), big);
        let pages_used = rm.total_pages();

        rm.update(recid, b"small").expect("shrink");
        assert_eq!(rm.fetch(recid).expect("fetch"), b"small");
        assert_eq!(rm.free_pages(), 3);

        // Freed pages are reused before the file grows
        let other = rm.insert(&big[..RECORD_DATA_PER_PAGE * 2]).expect("insert");
        assert_eq!(rm.total_pages(), pages_used);
        assert_eq!(rm.free_pages(), 1);
        assert_eq!(rm.fetch(other).expect("fetch").len(), RECORD_DATA_PER_PAGE * 2);
    }

    #[test]
    fn test_empty_record() {
        let (_dir, base) = create_test_store();
        let mut rm = RecordManager::open(&base, &test_config()).expect("open");
        let recid = rm.insert(&[]).expect("insert");
        assert!(rm.fetch(recid).expect("fetch").is_empty());
    }

    #[test]
    fn test_continuation_page_is_not_a_record() {
        let (_dir, base) = create_test_store();
        let mut rm = RecordManager::open(&base, &test_config()).expect("open");
        let big = vec![1u8; RECORD_DATA_PER_PAGE + 1];
        let recid = rm.insert(&big).expect("insert");

        let second = rm.chain_pages(recid).expect("chain")[1];
        assert!(matches!(
            rm.fetch(second),
            Err(StoreError::RecordNotFound(_))
        ));
    }

    #[test]
    fn test_commit_persists_across_reopen() {
        let (_dir, base) = create_test_store();
        let recid = {
            let mut rm = RecordManager::open(&base, &test_config()).expect("open");
            let recid = rm.insert(b"durable").expect("insert");
            rm.set_root("main", recid).expect("set root");
            rm.commit().expect("commit");
            rm.close().expect("close");
            recid
        };

        let mut rm = RecordManager::open(&base, &test_config()).expect("reopen");
        assert_eq!(rm.root("main").expect("root"), Some(recid));
        assert_eq!(rm.fetch(recid).expect("fetch"), b"durable");
    }

    #[test]
    fn test_named_roots_follow_transactions() {
        let (_dir, base) = create_test_store();
        let mut rm = RecordManager::open(&base, &test_config()).expect("open");
        let alpha = rm.insert(b"alpha").expect("insert");
        let beta = rm.insert(b"beta").expect("insert");
        rm.set_root("beta", beta).expect("set root");
        rm.set_root("alpha", alpha).expect("set root");
        rm.commit().expect("commit");
        assert_eq!(rm.root_names().expect("names"), vec!["alpha", "beta"]);

        assert_eq!(rm.remove_root("alpha").expect("remove"), Some(alpha));
        assert_eq!(rm.remove_root("alpha").expect("remove again"), None);
        assert_eq!(rm.root_names().expect("names"), vec!["beta"]);

        rm.rollback().expect("rollback");
        assert_eq!(rm.root_names().expect("names"), vec!["alpha", "beta"]);
        assert_eq!(rm.root("alpha").expect("root"), Some(alpha));

        rm.remove_root("alpha").expect("remove");
        rm.commit().expect("commit");
        rm.close().expect("close");
        assert!(rm.root_names().is_err());

        let rm = RecordManager::open(&base, &test_config()).expect("reopen");
        assert_eq!(rm.root_names().expect("names"), vec!["beta"]);
        assert_eq!(rm.root("alpha").expect("root"), None);
        assert_eq!(rm.root("beta").expect("root"), Some(beta));
    }

    #[test]
    fn test_rollback_discards_uncommitted() {
        let (_dir, base) = create_test_store();
        let mut rm = RecordManager::open(&base, &test_config()).expect("open");
        let kept = rm.insert(b"kept").expect("insert");
        rm.commit().expect("commit");
        let pages = rm.total_pages();

        let dropped = rm.insert(b"dropped").expect("insert");
        rm.set_root("dropped", dropped).expect("set root");
        rm.update(kept, b"changed").expect("update");
        let generation = rm.generation();
        rm.rollback().expect("rollback");

        assert!(rm.generation() > generation);
        assert_eq!(rm.total_pages(), pages);
        assert_eq!(rm.root("dropped").expect("root"), None);
        assert_eq!(rm.fetch(kept).expect("fetch"), b"kept");
    }

    #[test]
    fn test_recovery_replays_committed_work_after_crash() {
        let (_dir, base) = create_test_store();
        let recid = {
            let mut rm = RecordManager::open(&base, &test_config()).expect("open");
            let recid = rm.insert(b"committed").expect("insert");
            rm.commit().expect("commit");
            rm.insert(b"lost").expect("insert");
            // Crash: no rollback, no checkpoint
            std::mem::forget(rm);
            recid
        };

        let mut rm = RecordManager::open(&base, &test_config()).expect("reopen");
        assert_eq!(rm.recovery().transactions_replayed, 1);
        assert_eq!(rm.fetch(recid).expect("fetch"), b"committed");
        assert_eq!(rm.total_pages(), recid + 1);
    }

    #[test]
    fn test_operations_after_close_fail() {
        let (_dir, base) = create_test_store();
        let mut rm = RecordManager::open(&base, &test_config()).expect("open");
        rm.insert(b"pending").expect("insert");
        rm.close().expect("close");
        rm.close().expect("second close is a no-op");

        let err = rm.insert(b"late").expect_err("closed");
        assert!(err.is_illegal_state());
        assert!(rm.root("anything").is_err());
    }

    #[test]
    fn test_without_transactions() {
        let (_dir, base) = create_test_store();
        let config = test_config().with_transactions_disabled(true);
        let recid = {
            let mut rm = RecordManager::open(&base, &config).expect("open");
            let recid = rm.insert(b"direct").expect("insert");
            rm.commit().expect("commit");
            std::mem::forget(rm);
            recid
        };
        assert!(!base.with_extension("lg").exists());

        let mut rm = RecordManager::open(&base, &config).expect("reopen");
        assert_eq!(rm.fetch(recid).expect("fetch"), b"direct");
    }
}
