//! Persistent B-trees over the record manager.
//!
//! # Structure
//!
//! The tree consists of:
//! - A header record: root id, height, entry count, order, comparator name
//! - Branch nodes: separator keys and child record ids
//! - Leaf nodes: sorted key/value tuples, doubly linked for range scans
//!
//! Keys are unique within a tree. Mapping one key to several values is the
//! table layer's job.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use xdbm::btree::BTree;
//! use xdbm::comparator::NaturalOrder;
//! use xdbm::config::StoreConfig;
//! use xdbm::storage::RecordManager;
//!
//! # fn main() -> xdbm::Result<()> {
//! let mut rm = RecordManager::open("/tmp/example".as_ref(), &StoreConfig::default())?;
//! let tree: BTree<u64, String> = BTree::create(&mut rm, Arc::new(NaturalOrder), 32)?;
//! tree.insert(&mut rm, 7, "seven".to_string(), false)?;
//! assert_eq!(tree.find(&mut rm, &7)?, Some("seven".to_string()));
//! rm.commit()?;
//! # Ok(())
//! # }
//! ```

mod browser;
mod node;
mod tree;

pub use browser::Browser;
pub use node::{Branch, Leaf, Node};
pub use tree::BTree;
