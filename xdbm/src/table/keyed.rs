//! Keyed tables over a B-tree.
//!
//! A table is a named B-tree plus a small header record bound under the
//! table's name in the record manager's root directory. Tables either map
//! each key to one value, or map each key to a set of values through a
//! [`DupsContainer`].
//!
//! Every public mutation is one transaction: it commits on success and rolls
//! back on failure, so a failed write leaves no partial changes behind.
//!
//! # Header Format
//!
//! ```text
//! version (1) | tree recid (8) | duplicates (1) | count (8) | dup limit (4) | order (4)
//! ```

#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::btree::BTree;
use crate::codec::{ByteReader, ByteWriter, Codec};
use crate::comparator::{self, Comparator};
use crate::config::StoreConfig;
use crate::cursor::{ListCursor, TupleCursor};
use crate::error::{Error, Result};
use crate::storage::{RecordId, RecordManager, SharedRecordManager, StoreError};
use crate::table::cursors::{DupsCursor, TableCursor};
use crate::table::dups::{DupsContainer, ValueCursor, nested_tree};

const HEADER_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableHeader {
    tree: RecordId,
    duplicates: bool,
    count: u64,
    dup_limit: u32,
    order: u32,
}

impl TableHeader {
    fn encode(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.put_u8(HEADER_VERSION);
        writer.put_u64(self.tree);
        writer.put_u8(u8::from(self.duplicates));
        writer.put_u64(self.count);
        writer.put_u32(self.dup_limit);
        writer.put_u32(self.order);
        writer.into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let version = reader.get_u8()?;
        if version != HEADER_VERSION {
            return Err(StoreError::Corruption(format!(
                "unsupported table header version {version}"
            ))
            .into());
        }
        let header = Self {
            tree: reader.get_u64()?,
            duplicates: reader.get_u8()? != 0,
            count: reader.get_u64()?,
            dup_limit: reader.get_u32()?,
            order: reader.get_u32()?,
        };
        reader.finish()?;
        Ok(header)
    }
}

enum Layout<K, V> {
    Unique(BTree<K, V>),
    Duplicates(BTree<K, DupsContainer<V>>),
}

/// A persistent keyed table.
pub struct Table<K, V> {
    name: String,
    recman: SharedRecordManager,
    header: RecordId,
    layout: Layout<K, V>,
    key_comparator: Arc<dyn Comparator<K>>,
    value_comparator: Arc<dyn Comparator<V>>,
    dup_limit: usize,
    order: usize,
    closed: AtomicBool,
}

impl<K, V> std::fmt::Debug for Table<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("duplicates", &matches!(self.layout, Layout::Duplicates(_)))
            .field("header", &self.header)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<K, V> Table<K, V>
where
    K: Codec + Clone,
    V: Codec + Clone,
{
    /// Open or create a table that maps each key to exactly one value.
    pub fn open_unique(
        recman: SharedRecordManager,
        name: &str,
        key_comparator: Arc<dyn Comparator<K>>,
        value_comparator: Arc<dyn Comparator<V>>,
        config: &StoreConfig,
    ) -> Result<Self> {
        Self::open(recman, name, false, key_comparator, value_comparator, config)
    }

    /// Open or create a table that maps each key to a set of values.
    pub fn open_duplicates(
        recman: SharedRecordManager,
        name: &str,
        key_comparator: Arc<dyn Comparator<K>>,
        value_comparator: Arc<dyn Comparator<V>>,
        config: &StoreConfig,
    ) -> Result<Self> {
        Self::open(recman, name, true, key_comparator, value_comparator, config)
    }

    fn open(
        recman: SharedRecordManager,
        name: &str,
        duplicates: bool,
        key_comparator: Arc<dyn Comparator<K>>,
        value_comparator: Arc<dyn Comparator<V>>,
        config: &StoreConfig,
    ) -> Result<Self> {
        let (header_recid, header, layout) = {
            let mut rm = RecordManager::lock(&recman)?;
            let opened = match rm.root(name)? {
                Some(recid) => {
                    Self::load_existing(&mut rm, name, recid, duplicates, &key_comparator)
                }
                None => Self::create_new(&mut rm, name, duplicates, &key_comparator, config),
            };
            match opened {
                Ok(opened) => {
                    rm.commit()?;
                    opened
                }
                Err(e) => {
                    if let Err(rollback_error) = rm.rollback() {
                        tracing::warn!("rollback after failed open of {name} failed: {rollback_error}");
                    }
                    return Err(e);
                }
            }
        };

        tracing::info!(
            "opened table {name} ({} entries, duplicates: {})",
            header.count,
            header.duplicates
        );
        Ok(Self {
            name: name.to_string(),
            recman,
            header: header_recid,
            layout,
            key_comparator,
            value_comparator,
            dup_limit: header.dup_limit as usize,
            order: header.order as usize,
            closed: AtomicBool::new(false),
        })
    }

    fn load_existing(
        rm: &mut RecordManager,
        name: &str,
        recid: RecordId,
        duplicates: bool,
        key_comparator: &Arc<dyn Comparator<K>>,
    ) -> Result<(RecordId, TableHeader, Layout<K, V>)> {
        let header = TableHeader::decode(&rm.fetch(recid)?)?;
        if header.duplicates != duplicates {
            return Err(Error::TableMismatch {
                table: name.to_string(),
                message: format!(
                    "stored with duplicates={}, opened with duplicates={duplicates}",
                    header.duplicates
                ),
            });
        }
        let cmp = Arc::clone(key_comparator);
        let layout = if duplicates {
            Layout::Duplicates(BTree::load(rm, header.tree, cmp)?)
        } else {
            Layout::Unique(BTree::load(rm, header.tree, cmp)?)
        };
        Ok((recid, header, layout))
    }

    fn create_new(
        rm: &mut RecordManager,
        name: &str,
        duplicates: bool,
        key_comparator: &Arc<dyn Comparator<K>>,
        config: &StoreConfig,
    ) -> Result<(RecordId, TableHeader, Layout<K, V>)> {
        let cmp = Arc::clone(key_comparator);
        let (tree, layout) = if duplicates {
            let tree = BTree::create(rm, cmp, config.btree_order)?;
            (tree.recid(), Layout::Duplicates(tree))
        } else {
            let tree = BTree::create(rm, cmp, config.btree_order)?;
            (tree.recid(), Layout::Unique(tree))
        };
        let header = TableHeader {
            tree,
            duplicates,
            count: 0,
            dup_limit: config.duplicate_limit as u32,
            order: config.btree_order as u32,
        };
        let recid = rm.insert(&header.encode())?;
        rm.set_root(name, recid)?;
        tracing::debug!("created table {name}");
        Ok((recid, header, layout))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a key may map to several values.
    #[must_use]
    pub const fn is_dup_sorted(&self) -> bool {
        matches!(self.layout, Layout::Duplicates(_))
    }

    #[must_use]
    pub fn key_comparator(&self) -> &dyn Comparator<K> {
        &*self.key_comparator
    }

    #[must_use]
    pub fn value_comparator(&self) -> &dyn Comparator<V> {
        &*self.value_comparator
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Add `key -> value`.
    ///
    /// Returns true if the pair was not stored before. In a unique table an
    /// existing value under `key` is replaced.
    pub fn add(&self, key: K, value: V) -> Result<bool> {
        self.check_open()?;
        let mut rm = RecordManager::lock(&self.recman)?;
        let result = self.add_in(&mut rm, key, value);
        finish(&mut rm, result)
    }

    /// Remove `key -> value`.
    ///
    /// Returns true if the pair was stored. In a unique table a value that
    /// differs from the stored one leaves the entry in place.
    pub fn drop(&self, key: &K, value: &V) -> Result<bool> {
        self.check_open()?;
        let mut rm = RecordManager::lock(&self.recman)?;
        let result = self.drop_in(&mut rm, key, value);
        finish(&mut rm, result)
    }

    /// Remove `key` and all of its values, returning how many were removed.
    pub fn drop_key(&self, key: &K) -> Result<u64> {
        self.check_open()?;
        let mut rm = RecordManager::lock(&self.recman)?;
        let result = self.drop_key_in(&mut rm, key);
        finish(&mut rm, result)
    }

    /// Number of (key, value) pairs in the table.
    pub fn count(&self) -> Result<u64> {
        self.check_open()?;
        let mut rm = RecordManager::lock(&self.recman)?;
        Ok(self.read_header(&mut rm)?.count)
    }

    /// Number of values stored under `key`.
    pub fn count_key(&self, key: &K) -> Result<u64> {
        self.check_open()?;
        let mut rm = RecordManager::lock(&self.recman)?;
        match &self.layout {
            Layout::Unique(tree) => Ok(u64::from(tree.find(&mut rm, key)?.is_some())),
            Layout::Duplicates(tree) => match tree.find(&mut rm, key)? {
                Some(container) => container.count(&mut rm, self.values_cmp()),
                None => Ok(0),
            },
        }
    }

    pub fn has(&self, key: &K) -> Result<bool> {
        Ok(self.count_key(key)? > 0)
    }

    pub fn has_tuple(&self, key: &K, value: &V) -> Result<bool> {
        self.check_open()?;
        let mut rm = RecordManager::lock(&self.recman)?;
        match &self.layout {
            Layout::Unique(tree) => Ok(tree
                .find(&mut rm, key)?
                .is_some_and(|stored| self.value_comparator.equal(&stored, value))),
            Layout::Duplicates(tree) => match tree.find(&mut rm, key)? {
                Some(container) => container.contains(&mut rm, value, self.values_cmp()),
                None => Ok(false),
            },
        }
    }

    /// The value under `key`; for duplicates, the smallest one.
    pub fn forward_lookup(&self, key: &K) -> Result<Option<V>> {
        self.check_open()?;
        let mut rm = RecordManager::lock(&self.recman)?;
        self.forward_lookup_in(&mut rm, key)
    }

    /// Every value under `key`, in value order.
    pub fn values(&self, key: &K) -> Result<Vec<V>> {
        self.check_open()?;
        let mut rm = RecordManager::lock(&self.recman)?;
        self.values_in(&mut rm, key)
    }

    /// A cursor over every (key, value) pair, unpositioned.
    pub fn cursor(&self) -> Result<TableCursor<K, V>> {
        self.check_open()?;
        Ok(match &self.layout {
            Layout::Unique(tree) => {
                TableCursor::Unique(TupleCursor::new(Arc::clone(&self.recman), tree.clone()))
            }
            Layout::Duplicates(tree) => TableCursor::Duplicates(DupsCursor::new(
                Arc::clone(&self.recman),
                tree.clone(),
                self.values_cmp(),
            )),
        })
    }

    /// A cursor over the values of `key`, unpositioned.
    pub fn cursor_for(&self, key: &K) -> Result<ValueCursor<V>> {
        self.check_open()?;
        let mut rm = RecordManager::lock(&self.recman)?;
        match &self.layout {
            Layout::Unique(tree) => Ok(match tree.find(&mut rm, key)? {
                Some(value) => ValueCursor::Inline(ListCursor::singleton(value, self.values_cmp())),
                None => ValueCursor::empty(),
            }),
            Layout::Duplicates(tree) => match tree.find(&mut rm, key)? {
                Some(container) => container.cursor(&mut rm, &self.recman, self.values_cmp()),
                None => Ok(ValueCursor::empty()),
            },
        }
    }

    /// Commit and checkpoint the underlying store.
    pub fn sync(&self) -> Result<()> {
        self.check_open()?;
        let mut rm = RecordManager::lock(&self.recman)?;
        rm.sync()?;
        Ok(())
    }

    /// Sync and close the table. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.sync()?;
        self.closed.store(true, Ordering::Release);
        tracing::info!("closed table {}", self.name);
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::TableClosed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn values_cmp(&self) -> Arc<dyn Comparator<V>> {
        Arc::clone(&self.value_comparator)
    }

    fn read_header(&self, rm: &mut RecordManager) -> Result<TableHeader> {
        TableHeader::decode(&rm.fetch(self.header)?)
    }

    fn adjust_count(&self, rm: &mut RecordManager, added: u64, removed: u64) -> Result<()> {
        let mut header = self.read_header(rm)?;
        let total = header.count + added;
        header.count = total.checked_sub(removed).ok_or_else(|| {
            StoreError::IllegalState(format!(
                "table {}: removing {removed} entries from a count of {total}",
                self.name
            ))
        })?;
        rm.update(self.header, &header.encode())?;
        Ok(())
    }

    pub(crate) fn add_in(&self, rm: &mut RecordManager, key: K, value: V) -> Result<bool> {
        self.check_open()?;
        match &self.layout {
            Layout::Unique(tree) => {
                let added = match tree.find(rm, &key)? {
                    Some(stored) if self.value_comparator.equal(&stored, &value) => return Ok(false),
                    Some(_) => false,
                    None => true,
                };
                tree.insert(rm, key, value, true)?;
                if added {
                    self.adjust_count(rm, 1, 0)?;
                }
                Ok(true)
            }
            Layout::Duplicates(tree) => {
                let container = match tree.find(rm, &key)? {
                    None => DupsContainer::Inline(vec![value]),
                    Some(DupsContainer::Inline(mut values)) => {
                        let Err(idx) =
                            comparator::search(&values, &value, |v| v, &*self.value_comparator)
                        else {
                            return Ok(false);
                        };
                        values.insert(idx, value);
                        if values.len() > self.dup_limit {
                            self.migrate(rm, values)?
                        } else {
                            DupsContainer::Inline(values)
                        }
                    }
                    Some(DupsContainer::Tree(recid)) => {
                        let nested = nested_tree(rm, recid, self.values_cmp())?;
                        return match nested.insert(rm, value, (), false) {
                            Ok(_) => {
                                self.adjust_count(rm, 1, 0)?;
                                Ok(true)
                            }
                            Err(Error::DuplicateKey) => Ok(false),
                            Err(e) => Err(e),
                        };
                    }
                };
                tree.insert(rm, key, container, true)?;
                self.adjust_count(rm, 1, 0)?;
                Ok(true)
            }
        }
    }

    /// Move an inline value set into a nested tree.
    fn migrate(&self, rm: &mut RecordManager, values: Vec<V>) -> Result<DupsContainer<V>> {
        let count = values.len();
        let nested: BTree<V, ()> = BTree::create(rm, self.values_cmp(), self.order)?;
        for value in values {
            nested.insert(rm, value, (), false)?;
        }
        tracing::debug!(
            "table {}: moved {count} duplicates into nested tree {}",
            self.name,
            nested.recid()
        );
        Ok(DupsContainer::Tree(nested.recid()))
    }

    pub(crate) fn drop_in(&self, rm: &mut RecordManager, key: &K, value: &V) -> Result<bool> {
        self.check_open()?;
        match &self.layout {
            Layout::Unique(tree) => match tree.find(rm, key)? {
                Some(stored) if self.value_comparator.equal(&stored, value) => {
                    tree.remove(rm, key)?;
                    self.adjust_count(rm, 0, 1)?;
                    Ok(true)
                }
                Some(_) => {
                    tracing::warn!(
                        "table {}: drop ignored, stored value differs from the one given",
                        self.name
                    );
                    Ok(false)
                }
                None => Ok(false),
            },
            Layout::Duplicates(tree) => match tree.find(rm, key)? {
                None => Ok(false),
                Some(DupsContainer::Inline(mut values)) => {
                    let Ok(idx) = comparator::search(&values, value, |v| v, &*self.value_comparator)
                    else {
                        return Ok(false);
                    };
                    values.remove(idx);
                    if values.is_empty() {
                        tree.remove(rm, key)?;
                    } else {
                        tree.insert(rm, key.clone(), DupsContainer::Inline(values), true)?;
                    }
                    self.adjust_count(rm, 0, 1)?;
                    Ok(true)
                }
                Some(DupsContainer::Tree(recid)) => {
                    let nested = nested_tree(rm, recid, self.values_cmp())?;
                    if nested.remove(rm, value)?.is_none() {
                        return Ok(false);
                    }
                    if nested.is_empty(rm)? {
                        nested.delete(rm)?;
                        tree.remove(rm, key)?;
                    }
                    self.adjust_count(rm, 0, 1)?;
                    Ok(true)
                }
            },
        }
    }

    pub(crate) fn drop_key_in(&self, rm: &mut RecordManager, key: &K) -> Result<u64> {
        self.check_open()?;
        let removed = match &self.layout {
            Layout::Unique(tree) => u64::from(tree.remove(rm, key)?.is_some()),
            Layout::Duplicates(tree) => match tree.remove(rm, key)? {
                None => 0,
                Some(DupsContainer::Inline(values)) => values.len() as u64,
                Some(DupsContainer::Tree(recid)) => {
                    let nested = nested_tree(rm, recid, self.values_cmp())?;
                    let size = nested.size(rm)?;
                    nested.delete(rm)?;
                    size
                }
            },
        };
        if removed > 0 {
            self.adjust_count(rm, 0, removed)?;
        }
        Ok(removed)
    }

    pub(crate) fn forward_lookup_in(&self, rm: &mut RecordManager, key: &K) -> Result<Option<V>> {
        self.check_open()?;
        match &self.layout {
            Layout::Unique(tree) => tree.find(rm, key),
            Layout::Duplicates(tree) => match tree.find(rm, key)? {
                Some(container) => container.first(rm, self.values_cmp()),
                None => Ok(None),
            },
        }
    }

    pub(crate) fn values_in(&self, rm: &mut RecordManager, key: &K) -> Result<Vec<V>> {
        self.check_open()?;
        match &self.layout {
            Layout::Unique(tree) => Ok(tree.find(rm, key)?.into_iter().collect()),
            Layout::Duplicates(tree) => match tree.find(rm, key)? {
                Some(container) => container.values(rm, self.values_cmp()),
                None => Ok(Vec::new()),
            },
        }
    }
}

/// Commit the outcome of a mutation, or roll it back on error.
pub(crate) fn finish<T>(rm: &mut RecordManager, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            rm.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_error) = rm.rollback() {
                tracing::warn!("rollback after failed table update failed: {rollback_error}");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::comparator::{CaseIgnoreString, NaturalOrder};
    use crate::cursor::Cursor;

    fn store(config: &StoreConfig) -> (tempfile::TempDir, SharedRecordManager) {
        let dir = tempfile::tempdir().expect("tempdir");
        let recman =
            RecordManager::open_shared(&dir.path().join("tables"), config).expect("open store");
        (dir, recman)
    }

    fn unique_table(recman: &SharedRecordManager) -> Table<String, u64> {
        Table::open_unique(
            Arc::clone(recman),
            "uid",
            Arc::new(NaturalOrder),
            Arc::new(NaturalOrder),
            &StoreConfig::default(),
        )
        .expect("open table")
    }

    fn dup_table(recman: &SharedRecordManager, limit: usize) -> Table<String, u64> {
        Table::open_duplicates(
            Arc::clone(recman),
            "member",
            Arc::new(CaseIgnoreString),
            Arc::new(NaturalOrder),
            &StoreConfig::default()
                .with_duplicate_limit(limit)
                .with_btree_order(4),
        )
        .expect("open table")
    }

    fn all_tuples(table: &Table<String, u64>) -> Vec<(String, u64)> {
        let mut cursor = table.cursor().expect("cursor");
        let mut out = Vec::new();
        while cursor.next().expect("next") {
            out.push(cursor.get().expect("get").into_parts());
        }
        out
    }

    #[test]
    fn test_unique_add_replace_drop() {
        let (_dir, recman) = store(&StoreConfig::default());
        let table = unique_table(&recman);

        assert!(table.add("a".to_string(), 1).expect("add"));
        assert!(!table.add("a".to_string(), 1).expect("add same"));
        assert!(table.add("a".to_string(), 2).expect("replace"));
        assert_eq!(table.count().expect("count"), 1);
        assert_eq!(table.forward_lookup(&"a".to_string()).expect("lookup"), Some(2));
        assert_eq!(table.count_key(&"a".to_string()).expect("count key"), 1);
        assert_eq!(table.count_key(&"b".to_string()).expect("count key"), 0);

        assert!(!table.drop(&"a".to_string(), &1).expect("drop mismatched"));
        assert!(table.has(&"a".to_string()).expect("has"));
        assert!(table.drop(&"a".to_string(), &2).expect("drop"));
        assert!(!table.has(&"a".to_string()).expect("has"));
        assert_eq!(table.count().expect("count"), 0);
    }

    #[test]
    fn test_duplicates_are_a_set() {
        let (_dir, recman) = store(&StoreConfig::default());
        let table = dup_table(&recman, 8);

        assert!(table.add("k".to_string(), 3).expect("add"));
        assert!(table.add("K".to_string(), 1).expect("add"));
        assert!(!table.add("k".to_string(), 3).expect("add again"));
        assert_eq!(table.count_key(&"k".to_string()).expect("count key"), 2);
        assert_eq!(table.count().expect("count"), 2);
        assert_eq!(table.values(&"k".to_string()).expect("values"), vec![1, 3]);
        assert!(table.has_tuple(&"k".to_string(), &1).expect("has tuple"));
        assert!(!table.has_tuple(&"k".to_string(), &2).expect("has tuple"));
    }

    #[test]
    fn test_migration_is_transparent() {
        let (_dir, recman) = store(&StoreConfig::default());
        let table = dup_table(&recman, 4);
        let key = "group".to_string();
        let mut rng = StdRng::seed_from_u64(11);
        let mut values: Vec<u64> = (0..40).map(|i| i * 3).collect();
        values.shuffle(&mut rng);

        for (i, value) in values.iter().enumerate() {
            table.add(key.clone(), *value).expect("add");
            let mut expected = values[..=i].to_vec();
            expected.sort_unstable();
            assert_eq!(table.values(&key).expect("values"), expected);
            assert_eq!(table.forward_lookup(&key).expect("lookup"), expected.first().copied());
        }
        assert!(!table.add(key.clone(), values[0]).expect("duplicate after migration"));
        assert_eq!(table.count_key(&key).expect("count key"), 40);

        for value in &values {
            assert!(table.drop(&key, value).expect("drop"));
        }
        assert!(!table.has(&key).expect("has"));
        assert_eq!(table.count().expect("count"), 0);
    }

    #[test]
    fn test_cursor_orders_keys_then_values() {
        let (_dir, recman) = store(&StoreConfig::default());
        let table = dup_table(&recman, 2);
        let mut rng = StdRng::seed_from_u64(3);
        let mut expected = Vec::new();
        for k in 0..12u64 {
            let key = format!("key{k:02}");
            let n = rng.random_range(1..6);
            for v in 0..n {
                table.add(key.clone(), v * 10).expect("add");
                expected.push((key.clone(), v * 10));
            }
        }
        expected.sort();
        assert_eq!(all_tuples(&table), expected);
        assert_eq!(table.count().expect("count"), expected.len() as u64);
    }

    #[test]
    fn test_cursor_for_single_key() {
        let (_dir, recman) = store(&StoreConfig::default());
        let table = dup_table(&recman, 2);
        for v in [5, 1, 9, 7] {
            table.add("k".to_string(), v).expect("add");
        }
        let mut cursor = table.cursor_for(&"k".to_string()).expect("cursor");
        cursor.after(&5).expect("after");
        let mut rest = Vec::new();
        while cursor.next().expect("next") {
            rest.push(cursor.get().expect("get"));
        }
        assert_eq!(rest, vec![7, 9]);

        let mut missing = table.cursor_for(&"nope".to_string()).expect("cursor");
        assert!(matches!(missing, ValueCursor::Empty(_)));
        assert!(!missing.next().expect("next"));
        assert!(matches!(missing.get(), Err(Error::InvalidPosition)));

        let unique = unique_table(&recman);
        assert!(matches!(
            unique.cursor_for(&"x".to_string()).expect("cursor"),
            ValueCursor::Empty(_)
        ));
        unique.add("x".to_string(), 4).expect("add");
        let mut single = unique.cursor_for(&"x".to_string()).expect("cursor");
        assert!(single.first().expect("first"));
        assert_eq!(single.get().expect("get"), 4);
    }

    #[test]
    fn test_drop_key_removes_all_values() {
        let (_dir, recman) = store(&StoreConfig::default());
        let table = dup_table(&recman, 2);
        for v in 0..10 {
            table.add("many".to_string(), v).expect("add");
        }
        table.add("one".to_string(), 1).expect("add");
        assert_eq!(table.drop_key(&"many".to_string()).expect("drop key"), 10);
        assert_eq!(table.drop_key(&"many".to_string()).expect("drop key again"), 0);
        assert_eq!(table.count().expect("count"), 1);
        assert_eq!(all_tuples(&table), vec![("one".to_string(), 1)]);
    }

    #[test]
    fn test_reopen_checks_layout_and_keeps_data() {
        let (_dir, recman) = store(&StoreConfig::default());
        {
            let table = dup_table(&recman, 2);
            for v in 0..5 {
                table.add("k".to_string(), v).expect("add");
            }
            table.close().expect("close");
            table.close().expect("close twice");
            assert!(matches!(
                table.add("k".to_string(), 9),
                Err(Error::TableClosed(_))
            ));
        }
        let table = dup_table(&recman, 2);
        assert_eq!(table.count().expect("count"), 5);

        let wrong = Table::<String, u64>::open_unique(
            Arc::clone(&recman),
            "member",
            Arc::new(CaseIgnoreString),
            Arc::new(NaturalOrder),
            &StoreConfig::default(),
        );
        assert!(matches!(wrong, Err(Error::TableMismatch { .. })));
    }

    #[test]
    fn test_count_underflow_is_illegal_state() {
        let (_dir, recman) = store(&StoreConfig::default());
        let table = unique_table(&recman);
        table.add("only".to_string(), 1).expect("add");
        {
            let mut rm = RecordManager::lock(&recman).expect("lock");
            let result = table.adjust_count(&mut rm, 0, 2);
            assert!(matches!(
                result,
                Err(Error::Store(StoreError::IllegalState(_)))
            ));
            rm.rollback().expect("rollback");
        }
        assert_eq!(table.count().expect("count"), 1);
    }

    #[test]
    fn test_failed_add_rolls_back() {
        let (_dir, recman) = store(&StoreConfig::default());
        let table = unique_table(&recman);
        table.add("kept".to_string(), 1).expect("add");
        {
            let mut rm = RecordManager::lock(&recman).expect("lock");
            let result: Result<()> = table
                .add_in(&mut rm, "lost".to_string(), 2)
                .and_then(|_| Err(Error::DuplicateKey));
            assert!(finish(&mut rm, result).is_err());
        }
        assert!(!table.has(&"lost".to_string()).expect("has"));
        assert_eq!(table.count().expect("count"), 1);
        assert_eq!(all_tuples(&table), vec![("kept".to_string(), 1)]);
    }
}
