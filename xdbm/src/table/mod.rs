//! Tables and indices.
//!
//! A [`Table`] maps keys to one value or to a set of values over a B-tree.
//! An [`Index`] keeps a forward and a reverse table of the same attribute
//! in step, mapping attribute values to [`EntryId`](crate::types::EntryId)s
//! and back.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use xdbm::comparator::{CaseIgnoreString, NaturalOrder};
//! use xdbm::config::StoreConfig;
//! use xdbm::cursor::Cursor;
//! use xdbm::storage::RecordManager;
//! use xdbm::table::Table;
//!
//! # fn main() -> xdbm::Result<()> {
//! let config = StoreConfig::default();
//! let recman = RecordManager::open_shared("data/partition".as_ref(), &config)?;
//! let table: Table<String, u64> = Table::open_duplicates(
//!     recman,
//!     "member",
//!     Arc::new(CaseIgnoreString),
//!     Arc::new(NaturalOrder),
//!     &config,
//! )?;
//! table.add("Admins".to_string(), 1)?;
//! table.add("admins".to_string(), 2)?;
//! assert_eq!(table.count_key(&"ADMINS".to_string())?, 2);
//!
//! let mut cursor = table.cursor()?;
//! while cursor.next()? {
//!     let tuple = cursor.get()?;
//!     println!("{} -> {}", tuple.key, tuple.value);
//! }
//! table.close()?;
//! # Ok(())
//! # }
//! ```

mod cursors;
mod dups;
mod index;
mod keyed;

pub use cursors::{DupsCursor, TableCursor};
pub use dups::{DupsContainer, DupsContainerCursor, ValueCursor};
pub use index::Index;
pub use keyed::Table;
