//! Cursors over a single B-tree.
//!
//! The underlying [`Browser`] returns the same entry twice when the walk
//! reverses direction. [`TupleCursor`] remembers the key it returned last
//! and drops the browser's first candidate after a reversal only if it is
//! that key, so a reversal never skips an entry that changed in between.

use crate::btree::{BTree, Browser};
use crate::codec::Codec;
use crate::cursor::{ClosedGuard, Cursor, Direction};
use crate::error::{Error, Result};
use crate::storage::{RecordManager, SharedRecordManager};
use crate::types::Tuple;

/// Cursor over the key/value tuples of a tree.
pub struct TupleCursor<K, V> {
    recman: SharedRecordManager,
    tree: BTree<K, V>,
    browser: Option<Browser<K, V>>,
    direction: Direction,
    current: Option<Tuple<K, V>>,
    /// Key of the last tuple returned, cleared when the walk runs off an end.
    last_key: Option<K>,
    guard: ClosedGuard,
}

impl<K, V> std::fmt::Debug for TupleCursor<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TupleCursor")
            .field("tree", &self.tree)
            .field("direction", &self.direction)
            .field("available", &self.current.is_some())
            .field("closed", &self.guard.is_closed())
            .finish_non_exhaustive()
    }
}

impl<K, V> TupleCursor<K, V>
where
    K: Codec + Clone,
    V: Codec + Clone,
{
    /// An unpositioned cursor. The first `next()` starts at the beginning.
    #[must_use]
    pub const fn new(recman: SharedRecordManager, tree: BTree<K, V>) -> Self {
        Self {
            recman,
            tree,
            browser: None,
            direction: Direction::Unknown,
            current: None,
            last_key: None,
            guard: ClosedGuard::new(),
        }
    }

    /// Position before the first tuple whose key is `>= key`.
    pub fn before_key(&mut self, key: &K) -> Result<()> {
        self.guard.check()?;
        let browser = {
            let mut rm = RecordManager::lock(&self.recman)?;
            self.tree.browse_from(&mut rm, key)?
        };
        self.reset(browser);
        Ok(())
    }

    /// Position after the last tuple whose key is `<= key`.
    pub fn after_key(&mut self, key: &K) -> Result<()> {
        self.guard.check()?;
        let browser = {
            let mut rm = RecordManager::lock(&self.recman)?;
            let mut browser = self.tree.browse_from(&mut rm, key)?;
            // Step over every entry <= key, then back over the first one past it.
            while let Some(tuple) = browser.get_next(&mut rm)? {
                if self.tree.comparator().compare(&tuple.key, key).is_gt() {
                    browser.get_previous(&mut rm)?;
                    break;
                }
            }
            browser
        };
        self.reset(browser);
        Ok(())
    }

    /// Tree this cursor walks.
    #[must_use]
    pub const fn tree(&self) -> &BTree<K, V> {
        &self.tree
    }

    fn reset(&mut self, browser: Browser<K, V>) {
        self.browser = Some(browser);
        self.direction = Direction::Unknown;
        self.current = None;
        self.last_key = None;
    }

    fn is_last_returned(&self, tuple: &Tuple<K, V>) -> bool {
        self.last_key
            .as_ref()
            .is_some_and(|key| self.tree.comparator().equal(key, &tuple.key))
    }

    fn step(&mut self, direction: Direction) -> Result<bool> {
        self.guard.check()?;
        let mut rm = RecordManager::lock(&self.recman)?;
        let mut browser = match self.browser.take() {
            Some(browser) => browser,
            None => self.tree.browse(&mut rm)?,
        };

        let reversed = self.direction != Direction::Unknown && self.direction != direction;
        let mut candidate = advance(&mut browser, &mut rm, direction)?;
        if reversed && candidate.as_ref().is_some_and(|t| self.is_last_returned(t)) {
            candidate = advance(&mut browser, &mut rm, direction)?;
        }
        self.browser = Some(browser);
        self.direction = direction;

        self.last_key = candidate.as_ref().map(|t| t.key.clone());
        self.current = candidate;
        Ok(self.current.is_some())
    }
}

fn advance<K, V>(
    browser: &mut Browser<K, V>,
    rm: &mut RecordManager,
    direction: Direction,
) -> Result<Option<Tuple<K, V>>>
where
    K: Codec + Clone,
    V: Codec + Clone,
{
    if direction == Direction::Backward {
        browser.get_previous(rm)
    } else {
        browser.get_next(rm)
    }
}

impl<K, V> Cursor for TupleCursor<K, V>
where
    K: Codec + Clone,
    V: Codec + Clone,
{
    type Element = Tuple<K, V>;

    fn before_first(&mut self) -> Result<()> {
        self.guard.check()?;
        let browser = {
            let mut rm = RecordManager::lock(&self.recman)?;
            self.tree.browse(&mut rm)?
        };
        self.reset(browser);
        Ok(())
    }

    fn after_last(&mut self) -> Result<()> {
        self.guard.check()?;
        let browser = {
            let mut rm = RecordManager::lock(&self.recman)?;
            self.tree.browse_last(&mut rm)?
        };
        self.reset(browser);
        Ok(())
    }

    fn before(&mut self, element: &Tuple<K, V>) -> Result<()> {
        self.before_key(&element.key)
    }

    fn after(&mut self, element: &Tuple<K, V>) -> Result<()> {
        self.after_key(&element.key)
    }

    fn next(&mut self) -> Result<bool> {
        self.step(Direction::Forward)
    }

    fn previous(&mut self) -> Result<bool> {
        self.step(Direction::Backward)
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
            self.browser = None;
            self.current = None;
        }
        Ok(())
    }

    fn close_with(&mut self, cause: &str) -> Result<()> {
        if self.guard.close(Some(cause)) {
            self.browser = None;
            self.current = None;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }
}

/// Cursor over the keys of a tree whose values carry no data.
///
/// Backs the nested-tree form of a duplicates container, where the values of
/// one table key are stored as the keys of their own tree.
#[derive(Debug)]
pub struct KeyCursor<K> {
    inner: TupleCursor<K, ()>,
}

impl<K: Codec + Clone> KeyCursor<K> {
    #[must_use]
    pub const fn new(recman: SharedRecordManager, tree: BTree<K, ()>) -> Self {
        Self {
            inner: TupleCursor::new(recman, tree),
        }
    }
}

impl<K: Codec + Clone> Cursor for KeyCursor<K> {
    type Element = K;

    fn before_first(&mut self) -> Result<()> {
        self.inner.before_first()
    }

    fn after_last(&mut self) -> Result<()> {
        self.inner.after_last()
    }

    fn before(&mut self, element: &K) -> Result<()> {
        self.inner.before_key(element)
    }

    fn after(&mut self, element: &K) -> Result<()> {
        self.inner.after_key(element)
    }

    fn next(&mut self) -> Result<bool> {
        self.inner.next()
    }

    fn previous(&mut self) -> Result<bool> {
        self.inner.previous()
    }

    fn available(&self) -> bool {
        self.inner.available()
    }

    fn get(&self) -> Result<K> {
        Ok(self.inner.get()?.key)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn close_with(&mut self, cause: &str) -> Result<()> {
        self.inner.close_with(cause)
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::comparator::NaturalOrder;
    use crate::config::StoreConfig;

    fn digit_tree() -> (tempfile::TempDir, SharedRecordManager, BTree<String, ()>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let recman = RecordManager::open_shared(&dir.path().join("cursor"), &StoreConfig::default())
            .expect("open");
        let tree = {
            let mut rm = RecordManager::lock(&recman).expect("lock");
            let tree = BTree::create(&mut rm, Arc::new(NaturalOrder), 4).expect("create");
            for i in 0..10 {
                tree.insert(&mut rm, i.to_string(), (), false).expect("insert");
            }
            rm.commit().expect("commit");
            tree
        };
        (dir, recman, tree)
    }

    fn key(cursor: &TupleCursor<String, ()>) -> String {
        cursor.get().expect("get").key
    }

    fn forward(cursor: &mut TupleCursor<String, ()>) -> Vec<String> {
        let mut out = Vec::new();
        while cursor.next().expect("next") {
            out.push(key(cursor));
        }
        out
    }

    fn digits(range: std::ops::RangeInclusive<u32>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_fresh_cursor_walks_everything() {
        let (_dir, recman, tree) = digit_tree();
        let mut cursor = TupleCursor::new(recman, tree);
        assert!(matches!(cursor.get(), Err(Error::InvalidPosition)));
        assert_eq!(forward(&mut cursor), digits(0..=9));
        assert!(matches!(cursor.get(), Err(Error::InvalidPosition)));
    }

    #[test]
    fn test_after_key_then_next() {
        let (_dir, recman, tree) = digit_tree();
        let mut cursor = TupleCursor::new(recman, tree);
        cursor.after_key(&"0".to_string()).expect("after");
        assert_eq!(forward(&mut cursor), digits(1..=9));

        cursor.after_key(&"9".to_string()).expect("after last key");
        assert!(!cursor.next().expect("next"));
        assert!(cursor.previous().expect("previous"));
        assert_eq!(key(&cursor), "9");
    }

    #[test]
    fn test_before_key_skips_removed_gap() {
        let (_dir, recman, tree) = digit_tree();
        {
            let mut rm = RecordManager::lock(&recman).expect("lock");
            for k in ["5", "6", "7"] {
                tree.remove(&mut rm, &k.to_string()).expect("remove");
            }
            rm.commit().expect("commit");
        }
        let mut cursor = TupleCursor::new(recman, tree);
        cursor.before_key(&"5".to_string()).expect("before");
        assert!(cursor.next().expect("next"));
        assert_eq!(key(&cursor), "8");

        cursor.before_key(&"5".to_string()).expect("before");
        assert!(cursor.previous().expect("previous"));
        assert_eq!(key(&cursor), "4");
    }

    #[test]
    fn test_reversal_does_not_repeat() {
        let (_dir, recman, tree) = digit_tree();
        let mut cursor = TupleCursor::new(recman, tree);
        cursor.before_first().expect("before first");
        for _ in 0..4 {
            assert!(cursor.next().expect("next"));
        }
        assert_eq!(key(&cursor), "3");
        assert!(cursor.previous().expect("previous"));
        assert_eq!(key(&cursor), "2");
        assert!(cursor.next().expect("next"));
        assert_eq!(key(&cursor), "3");
    }

    #[test]
    fn test_exhaustion_both_ends() {
        let (_dir, recman, tree) = digit_tree();
        let mut cursor = TupleCursor::new(recman, tree);

        cursor.after_last().expect("after last");
        assert!(!cursor.next().expect("next"));
        assert!(matches!(cursor.get(), Err(Error::InvalidPosition)));
        assert!(cursor.previous().expect("previous"));
        assert_eq!(key(&cursor), "9");

        cursor.before_first().expect("before first");
        assert!(!cursor.previous().expect("previous"));
        assert!(matches!(cursor.get(), Err(Error::InvalidPosition)));
        assert!(cursor.next().expect("next"));
        assert_eq!(key(&cursor), "0");

        assert!(cursor.last().expect("last"));
        assert_eq!(key(&cursor), "9");
        assert!(cursor.first().expect("first"));
        assert_eq!(key(&cursor), "0");
    }

    #[test]
    fn test_sees_inserts_made_while_open() {
        let (_dir, recman, tree) = digit_tree();
        let mut cursor = TupleCursor::new(Arc::clone(&recman), tree.clone());
        assert!(cursor.next().expect("next"));
        assert!(cursor.next().expect("next"));
        assert_eq!(key(&cursor), "1");
        {
            let mut rm = RecordManager::lock(&recman).expect("lock");
            tree.insert(&mut rm, "15".to_string(), (), false).expect("insert");
            tree.remove(&mut rm, &"2".to_string()).expect("remove");
        }
        assert!(cursor.next().expect("next"));
        assert_eq!(key(&cursor), "15");
        assert!(cursor.next().expect("next"));
        assert_eq!(key(&cursor), "3");
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_dir, recman, tree) = digit_tree();
        let mut cursor = KeyCursor::new(recman, tree);
        assert!(cursor.next().expect("next"));
        assert_eq!(cursor.get().expect("get"), "0");
        cursor.close().expect("close");
        cursor.close().expect("close again");
        assert!(cursor.is_closed());
        assert!(!cursor.available());
        assert!(matches!(cursor.next(), Err(Error::CursorClosed { .. })));
        assert!(matches!(cursor.get(), Err(Error::CursorClosed { .. })));
    }
}
