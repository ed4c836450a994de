// Layers, bottom up:
//  - storage: paged block store, transaction log, record manager
//  - btree: ordered tree of records over the record manager
//  - cursor: bidirectional cursor protocol and the filtering enumeration
//  - table: unique and duplicate-key tables, attribute indices
//
// Everything above storage shares one record manager behind a mutex and
// takes the lock once per operation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod btree;
pub mod codec;
pub mod comparator;
pub mod config;
pub mod cursor;
pub mod error;
pub mod storage;
pub mod table;
pub mod types;

pub use error::{Error, Result};
