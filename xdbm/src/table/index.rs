//! Attribute indices.
//!
//! An [`Index`] pairs a forward table (attribute value to entry id) with a
//! reverse table (entry id to attribute value). Both allow duplicates: one
//! value may be held by many entries and one entry may hold many values.
//! Every index operation updates both tables inside one transaction.

use std::sync::Arc;

use crate::codec::Codec;
use crate::comparator::{Comparator, NaturalOrder};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::storage::{RecordManager, SharedRecordManager};
use crate::table::cursors::TableCursor;
use crate::table::dups::ValueCursor;
use crate::table::keyed::{Table, finish};
use crate::types::EntryId;

/// A bidirectional index from attribute values to entry ids.
#[derive(Debug)]
pub struct Index<K> {
    attribute: String,
    recman: SharedRecordManager,
    forward: Table<K, EntryId>,
    reverse: Table<EntryId, K>,
}

impl<K: Codec + Clone> Index<K> {
    /// Open or create the index on `attribute`.
    ///
    /// The tables are stored as `<attribute>.forward` and `<attribute>.reverse`.
    pub fn open(
        recman: SharedRecordManager,
        attribute: &str,
        comparator: Arc<dyn Comparator<K>>,
        config: &StoreConfig,
    ) -> Result<Self> {
        let ids: Arc<dyn Comparator<EntryId>> = Arc::new(NaturalOrder);
        let forward = Table::open_duplicates(
            Arc::clone(&recman),
            &format!("{attribute}.forward"),
            Arc::clone(&comparator),
            Arc::clone(&ids),
            config,
        )?;
        let reverse = Table::open_duplicates(
            Arc::clone(&recman),
            &format!("{attribute}.reverse"),
            ids,
            comparator,
            config,
        )?;
        Ok(Self {
            attribute: attribute.to_string(),
            recman,
            forward,
            reverse,
        })
    }

    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Record that entry `id` holds `key`. Returns false if it already did.
    pub fn add(&self, key: K, id: EntryId) -> Result<bool> {
        let mut rm = RecordManager::lock(&self.recman)?;
        let result = self
            .forward
            .add_in(&mut rm, key.clone(), id)
            .and_then(|added| {
                self.reverse.add_in(&mut rm, id, key)?;
                Ok(added)
            });
        finish(&mut rm, result)
    }

    /// Record that entry `id` no longer holds `key`.
    pub fn drop(&self, key: &K, id: EntryId) -> Result<bool> {
        let mut rm = RecordManager::lock(&self.recman)?;
        let result = self.forward.drop_in(&mut rm, key, &id).and_then(|dropped| {
            self.reverse.drop_in(&mut rm, &id, key)?;
            Ok(dropped)
        });
        finish(&mut rm, result)
    }

    /// Remove every value held by entry `id`, returning how many there were.
    pub fn drop_entry(&self, id: EntryId) -> Result<u64> {
        let mut rm = RecordManager::lock(&self.recman)?;
        let result = self.drop_entry_in(&mut rm, id);
        finish(&mut rm, result)
    }

    fn drop_entry_in(&self, rm: &mut RecordManager, id: EntryId) -> Result<u64> {
        for key in self.reverse.values_in(rm, &id)? {
            self.forward.drop_in(rm, &key, &id)?;
        }
        self.reverse.drop_key_in(rm, &id)
    }

    /// Number of (key, id) pairs.
    pub fn count(&self) -> Result<u64> {
        self.forward.count()
    }

    /// Number of entries holding `key`.
    pub fn count_key(&self, key: &K) -> Result<u64> {
        self.forward.count_key(key)
    }

    /// The smallest entry id holding `key`.
    pub fn forward_lookup(&self, key: &K) -> Result<Option<EntryId>> {
        self.forward.forward_lookup(key)
    }

    /// Every entry id holding `key`.
    pub fn forward_values(&self, key: &K) -> Result<Vec<EntryId>> {
        self.forward.values(key)
    }

    /// The smallest value held by entry `id`.
    pub fn reverse_lookup(&self, id: &EntryId) -> Result<Option<K>> {
        self.reverse.forward_lookup(id)
    }

    /// Every value held by entry `id`.
    pub fn reverse_values(&self, id: &EntryId) -> Result<Vec<K>> {
        self.reverse.values(id)
    }

    /// Cursor over every (key, id) pair in key order.
    pub fn forward_cursor(&self) -> Result<TableCursor<K, EntryId>> {
        self.forward.cursor()
    }

    /// Cursor over the ids of the entries holding `key`.
    pub fn forward_cursor_for(&self, key: &K) -> Result<ValueCursor<EntryId>> {
        self.forward.cursor_for(key)
    }

    /// Cursor over every (id, key) pair in id order.
    pub fn reverse_cursor(&self) -> Result<TableCursor<EntryId, K>> {
        self.reverse.cursor()
    }

    /// Commit and checkpoint the underlying store.
    pub fn sync(&self) -> Result<()> {
        self.forward.sync()
    }

    /// Close both tables. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        self.forward.close()?;
        self.reverse.close()
    }
}
