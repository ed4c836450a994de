//! Cursors over whole tables.

use std::sync::Arc;

use crate::btree::BTree;
use crate::codec::Codec;
use crate::comparator::Comparator;
use crate::cursor::{ClosedGuard, Cursor, TupleCursor};
use crate::error::{Error, Result};
use crate::storage::{RecordManager, SharedRecordManager};
use crate::table::dups::{DupsContainer, DupsContainerCursor};
use crate::types::Tuple;

/// Cursor over every (key, value) pair of a table with duplicates.
///
/// Walks the outer tree with a [`TupleCursor`] and, for the key it is on,
/// the key's values with a [`DupsContainerCursor`]. All values of a key are
/// returned before the next key.
pub struct DupsCursor<K, V> {
    recman: SharedRecordManager,
    containers: TupleCursor<K, DupsContainer<V>>,
    value_comparator: Arc<dyn Comparator<V>>,
    /// Key the outer cursor is on and a cursor over its values.
    values: Option<(K, DupsContainerCursor<V>)>,
    current: Option<Tuple<K, V>>,
    guard: ClosedGuard,
}

impl<K, V> std::fmt::Debug for DupsCursor<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DupsCursor")
            .field("containers", &self.containers)
            .field("available", &self.current.is_some())
            .field("closed", &self.guard.is_closed())
            .finish_non_exhaustive()
    }
}

impl<K, V> DupsCursor<K, V>
where
    K: Codec + Clone,
    V: Codec + Clone,
{
    #[must_use]
    pub fn new(
        recman: SharedRecordManager,
        tree: BTree<K, DupsContainer<V>>,
        value_comparator: Arc<dyn Comparator<V>>,
    ) -> Self {
        Self {
            containers: TupleCursor::new(Arc::clone(&recman), tree),
            recman,
            value_comparator,
            values: None,
            current: None,
            guard: ClosedGuard::new(),
        }
    }

    /// Position before the first pair whose key is `>= key`.
    pub fn before_key(&mut self, key: &K) -> Result<()> {
        self.guard.check()?;
        self.containers.before_key(key)?;
        self.clear_values()
    }

    /// Position after the last pair whose key is `<= key`.
    pub fn after_key(&mut self, key: &K) -> Result<()> {
        self.guard.check()?;
        self.containers.after_key(key)?;
        self.clear_values()
    }

    fn clear_values(&mut self) -> Result<()> {
        self.current = None;
        if let Some((_, mut values)) = self.values.take() {
            values.close()?;
        }
        Ok(())
    }

    fn open_values(&self, container: &DupsContainer<V>) -> Result<DupsContainerCursor<V>> {
        let mut rm = RecordManager::lock(&self.recman)?;
        container.cursor(&mut rm, &self.recman, Arc::clone(&self.value_comparator))
    }

    /// Put the outer cursor on `tuple.key` and the value cursor inside that
    /// key's values. Returns `None`, leaving the outer cursor before the key,
    /// if the key is absent.
    fn seek_tuple(&mut self, tuple: &Tuple<K, V>) -> Result<Option<DupsContainerCursor<V>>> {
        self.containers.before_key(&tuple.key)?;
        if self.containers.next()? {
            let entry = self.containers.get()?;
            if self
                .containers
                .tree()
                .comparator()
                .equal(&entry.key, &tuple.key)
            {
                return self.open_values(&entry.value).map(Some);
            }
        }
        self.containers.before_key(&tuple.key)?;
        Ok(None)
    }

    fn step(&mut self, forward: bool) -> Result<bool> {
        self.guard.check()?;
        loop {
            if let Some((key, values)) = &mut self.values {
                let moved = if forward {
                    values.next()?
                } else {
                    values.previous()?
                };
                if moved {
                    self.current = Some(Tuple::new(key.clone(), values.get()?));
                    return Ok(true);
                }
            }

            let moved = if forward {
                self.containers.next()?
            } else {
                self.containers.previous()?
            };
            if !moved {
                self.clear_values()?;
                return Ok(false);
            }
            let entry = self.containers.get()?;
            let mut values = self.open_values(&entry.value)?;
            if forward {
                values.before_first()?;
            } else {
                values.after_last()?;
            }
            self.clear_values()?;
            self.values = Some((entry.key, values));
        }
    }
}

impl<K, V> Cursor for DupsCursor<K, V>
where
    K: Codec + Clone,
    V: Codec + Clone,
{
    type Element = Tuple<K, V>;

    fn before_first(&mut self) -> Result<()> {
        self.guard.check()?;
        self.containers.before_first()?;
        self.clear_values()
    }

    fn after_last(&mut self) -> Result<()> {
        self.guard.check()?;
        self.containers.after_last()?;
        self.clear_values()
    }

    fn before(&mut self, element: &Tuple<K, V>) -> Result<()> {
        self.guard.check()?;
        self.clear_values()?;
        if let Some(mut values) = self.seek_tuple(element)? {
            values.before(&element.value)?;
            self.values = Some((element.key.clone(), values));
        }
        Ok(())
    }

    fn after(&mut self, element: &Tuple<K, V>) -> Result<()> {
        self.guard.check()?;
        self.clear_values()?;
        if let Some(mut values) = self.seek_tuple(element)? {
            values.after(&element.value)?;
            self.values = Some((element.key.clone(), values));
        }
        Ok(())
    }

    fn next(&mut self) -> Result<bool> {
        self.step(true)
    }

    fn previous(&mut self) -> Result<bool> {
        self.step(false)
    }

    fn available(&self) -> bool {
        !self.guard.is_closed() && self.current.is_some()
    }

    fn get(&self) -> Result<Tuple<K, V>> {
        self.guard.check()?;
        self.current.clone().ok_or(Error::InvalidPosition)
    }

    fn close(&mut self) -> Result<()> {
        if self.guard.close(None) {
            self.clear_values()?;
            self.containers.close()?;
        }
        Ok(())
    }

    fn close_with(&mut self, cause: &str) -> Result<()> {
        if self.guard.close(Some(cause)) {
            self.clear_values()?;
            self.containers.close_with(cause)?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }
}

/// Cursor over every (key, value) pair of a table, whatever its layout.
#[derive(Debug)]
pub enum TableCursor<K, V> {
    Unique(TupleCursor<K, V>),
    Duplicates(DupsCursor<K, V>),
}

impl<K, V> TableCursor<K, V>
where
    K: Codec + Clone,
    V: Codec + Clone,
{
    /// Position before the first pair whose key is `>= key`.
    pub fn before_key(&mut self, key: &K) -> Result<()> {
        match self {
            Self::Unique(c) => c.before_key(key),
            Self::Duplicates(c) => c.before_key(key),
        }
    }

    /// Position after the last pair whose key is `<= key`.
    pub fn after_key(&mut self, key: &K) -> Result<()> {
        match self {
            Self::Unique(c) => c.after_key(key),
            Self::Duplicates(c) => c.after_key(key),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $cursor:ident => $body:expr) => {
        match $self {
            Self::Unique($cursor) => $body,
            Self::Duplicates($cursor) => $body,
        }
    };
}

impl<K, V> Cursor for TableCursor<K, V>
where
    K: Codec + Clone,
    V: Codec + Clone,
{
    type Element = Tuple<K, V>;

    fn before_first(&mut self) -> Result<()> {
        delegate!(self, c => c.before_first())
    }

    fn after_last(&mut self) -> Result<()> {
        delegate!(self, c => c.after_last())
    }

    fn before(&mut self, element: &Tuple<K, V>) -> Result<()> {
        delegate!(self, c => c.before(element))
    }

    fn after(&mut self, element: &Tuple<K, V>) -> Result<()> {
        delegate!(self, c => c.after(element))
    }

    fn next(&mut self) -> Result<bool> {
        delegate!(self, c => c.next())
    }

    fn previous(&mut self) -> Result<bool> {
        delegate!(self, c => c.previous())
    }

    fn available(&self) -> bool {
        delegate!(self, c => c.available())
    }

    fn get(&self) -> Result<Tuple<K, V>> {
        delegate!(self, c => c.get())
    }

    fn close(&mut self) -> Result<()> {
        delegate!(self, c => c.close())
    }

    fn close_with(&mut self, cause: &str) -> Result<()> {
        delegate!(self, c => c.close_with(cause))
    }

    fn is_closed(&self) -> bool {
        delegate!(self, c => c.is_closed())
    }
}
