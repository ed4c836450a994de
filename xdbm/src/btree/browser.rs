//! Positioned pointers into the leaf chain of a tree.
//!
//! A [`Browser`] sits in a gap between two entries. `get_next` returns the
//! entry after the gap and moves past it; `get_previous` returns the entry
//! before the gap and moves before it. Calling one after the other therefore
//! returns the same entry twice, which the cursor layer compensates for.
//!
//! A browser caches one leaf. When the record manager's generation changes
//! (any insert, update, delete or rollback) the cached leaf may be stale, so
//! the browser re-seeks from the root using the last key it stepped over.

use crate::btree::node::Leaf;
use crate::btree::tree::BTree;
use crate::codec::Codec;
use crate::comparator;
use crate::error::Result;
use crate::storage::{RecordId, RecordManager};
use crate::types::Tuple;

/// Logical position of a browser, independent of any page layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Anchor<K> {
    /// Before every entry.
    Start,
    /// After every entry.
    End,
    /// Between the last entry `< key` and the first entry `>= key`.
    Before(K),
    /// Between the last entry `<= key` and the first entry `> key`.
    After(K),
}

/// A directionless position in a tree's leaf sequence.
pub struct Browser<K, V> {
    tree: BTree<K, V>,
    leaf: Leaf<K, V>,
    index: usize,
    generation: u64,
    anchor: Anchor<K>,
}

impl<K, V> std::fmt::Debug for Browser<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("tree", &self.tree)
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<K, V> Browser<K, V>
where
    K: Codec + Clone,
    V: Codec + Clone,
{
    pub(crate) fn open(tree: BTree<K, V>, rm: &mut RecordManager, anchor: Anchor<K>) -> Result<Self> {
        let mut browser = Self {
            tree,
            leaf: Leaf::empty(),
            index: 0,
            generation: rm.generation(),
            anchor,
        };
        browser.seek(rm)?;
        Ok(browser)
    }

    /// Return the entry after the current gap and step over it.
    pub fn get_next(&mut self, rm: &mut RecordManager) -> Result<Option<Tuple<K, V>>> {
        self.revalidate(rm)?;
        loop {
            if let Some(entry) = self.leaf.entries.get(self.index) {
                let entry = entry.clone();
                self.index += 1;
                self.anchor = Anchor::After(entry.key.clone());
                return Ok(Some(entry));
            }
            match self.leaf.next {
                Some(next) => {
                    self.load(rm, next)?;
                    self.index = 0;
                }
                None => {
                    self.anchor = Anchor::End;
                    return Ok(None);
                }
            }
        }
    }

    /// Return the entry before the current gap and step back over it.
    pub fn get_previous(&mut self, rm: &mut RecordManager) -> Result<Option<Tuple<K, V>>> {
        self.revalidate(rm)?;
        loop {
            if self.index > 0 {
                self.index -= 1;
                let entry = self.leaf.entries[self.index].clone();
                self.anchor = Anchor::Before(entry.key.clone());
                return Ok(Some(entry));
            }
            match self.leaf.prev {
                Some(prev) => {
                    self.load(rm, prev)?;
                    self.index = self.leaf.entries.len();
                }
                None => {
                    self.anchor = Anchor::Start;
                    return Ok(None);
                }
            }
        }
    }

    fn revalidate(&mut self, rm: &mut RecordManager) -> Result<()> {
        if rm.generation() != self.generation {
            tracing::trace!("tree {} changed under a browser, re-seeking", self.tree.recid());
            self.seek(rm)?;
        }
        Ok(())
    }

    fn load(&mut self, rm: &mut RecordManager, id: RecordId) -> Result<()> {
        self.leaf = self.tree.load_leaf(rm, id)?;
        Ok(())
    }

    fn seek(&mut self, rm: &mut RecordManager) -> Result<()> {
        let root = self.tree.root(rm)?;
        let cmp = self.tree.comparator();
        let (leaf, index) = match &self.anchor {
            Anchor::Start => (self.tree.edge_leaf(rm, root, true)?.1, 0),
            Anchor::End => {
                let leaf = self.tree.edge_leaf(rm, root, false)?.1;
                let len = leaf.entries.len();
                (leaf, len)
            }
            Anchor::Before(key) => {
                let leaf = self.tree.find_leaf(rm, root, key)?.1;
                let index = comparator::lower_bound(&leaf.entries, key, |t| &t.key, cmp);
                (leaf, index)
            }
            Anchor::After(key) => {
                let leaf = self.tree.find_leaf(rm, root, key)?.1;
                let index = comparator::upper_bound(&leaf.entries, key, |t| &t.key, cmp);
                (leaf, index)
            }
        };
        self.leaf = leaf;
        self.index = index;
        self.generation = rm.generation();
        Ok(())
    }
}
