//! Record storage engine.
//!
//! A paged store of variable-length records with a physical transaction log.
//!
//! # File Format
//!
//! Each store is a pair of files sharing a base name:
//!
//! - `<name>.db`: 8KB pages. Page 0 is the superblock, every other page is
//!   either part of a record chain or on the free list.
//! - `<name>.lg`: page images of committed transactions that have not been
//!   checkpointed into `<name>.db` yet.
//!
//! # Usage
//!
//! ```no_run
//! use xdbm::config::StoreConfig;
//! use xdbm::storage::RecordManager;
//!
//! # fn main() -> Result<(), xdbm::storage::StoreError> {
//! let mut rm = RecordManager::open("data/partition".as_ref(), &StoreConfig::default())?;
//! let recid = rm.insert(b"hello")?;
//! rm.set_root("greeting", recid)?;
//! rm.commit()?;
//! rm.close()?;
//! # Ok(())
//! # }
//! ```

mod block_store;
mod buffer_pool;
mod error;
mod file;
mod log;
mod page;
mod recman;
mod recovery;
mod superblock;

pub use block_store::BlockStore;
pub use error::StoreError;
pub use file::{DatabaseFile, FileError};
pub use log::{LogError, Lsn, TransactionLog, TxnId};
pub use page::{PAGE_SIZE, Page, PageError, PageHeader, PageId, PageType};
pub use recman::{RECORD_DATA_PER_PAGE, RecordId, RecordManager, SharedRecordManager};
pub use recovery::RecoveryResult;
pub use superblock::{Superblock, SuperblockError};
