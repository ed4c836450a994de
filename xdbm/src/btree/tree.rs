//! B-tree operations over record-manager records.
//!
//! A tree is addressed by the record id of its header record, which holds
//! the root node id, the height, the entry count, the order and the name of
//! the comparator that orders the keys. Every node is a separate record.
//!
//! # Invariants
//!
//! - An in-order walk of the leaves yields keys in comparator order with no
//!   key repeated.
//! - Every node except the root holds between `order / 2` and `order` keys.
//! - All leaves are at the same depth (`height`, where a lone leaf root is 1).
//!
//! Trees do not commit. The table layer brackets each mutation with a
//! commit or a rollback of the record manager.

#![allow(clippy::cast_possible_truncation)]

use std::marker::PhantomData;
use std::sync::Arc;

use crate::btree::browser::{Anchor, Browser};
use crate::btree::node::{Branch, Leaf, Node};
use crate::codec::{ByteReader, ByteWriter, Codec};
use crate::comparator::Comparator;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::storage::{RecordId, RecordManager, StoreError};

const HEADER_VERSION: u8 = 1;

/// Persistent tree metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TreeHeader {
    root: RecordId,
    height: u32,
    size: u64,
    order: u32,
    comparator: String,
}

impl TreeHeader {
    fn encode(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.put_u8(HEADER_VERSION);
        writer.put_u64(self.root);
        writer.put_u32(self.height);
        writer.put_u64(self.size);
        writer.put_u32(self.order);
        writer.put_str(&self.comparator);
        writer.into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let version = reader.get_u8()?;
        if version != HEADER_VERSION {
            return Err(StoreError::Corruption(format!(
                "unsupported tree header version {version}"
            ))
            .into());
        }
        let header = Self {
            root: reader.get_u64()?,
            height: reader.get_u32()?,
            size: reader.get_u64()?,
            order: reader.get_u32()?,
            comparator: reader.get_str()?,
        };
        reader.finish()?;
        Ok(header)
    }

    const fn min_keys(&self) -> usize {
        (self.order / 2) as usize
    }
}

/// Result of inserting below a node.
struct Inserted<K, V> {
    previous: Option<V>,
    split: Option<(K, RecordId)>,
}

/// Result of removing below a node.
struct Removed<V> {
    value: Option<V>,
    underflow: bool,
}

/// A persistent B-tree mapping unique keys to values.
pub struct BTree<K, V> {
    recid: RecordId,
    comparator: Arc<dyn Comparator<K>>,
    _values: PhantomData<fn() -> V>,
}

impl<K, V> Clone for BTree<K, V> {
    fn clone(&self) -> Self {
        Self {
            recid: self.recid,
            comparator: Arc::clone(&self.comparator),
            _values: PhantomData,
        }
    }
}

impl<K, V> std::fmt::Debug for BTree<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTree")
            .field("recid", &self.recid)
            .field("comparator", &self.comparator.name())
            .finish()
    }
}

impl<K, V> BTree<K, V>
where
    K: Codec + Clone,
    V: Codec + Clone,
{
    /// Create an empty tree. `order` is the maximum number of keys per node.
    pub fn create(
        rm: &mut RecordManager,
        comparator: Arc<dyn Comparator<K>>,
        order: usize,
    ) -> Result<Self> {
        let order = order.max(StoreConfig::MIN_BTREE_ORDER) as u32;
        let root = rm.insert(&Node::<K, V>::Leaf(Leaf::empty()).encode())?;
        let header = TreeHeader {
            root,
            height: 1,
            size: 0,
            order,
            comparator: comparator.name().to_string(),
        };
        let recid = rm.insert(&header.encode())?;
        tracing::debug!("created tree {recid} of order {order}");
        Ok(Self {
            recid,
            comparator,
            _values: PhantomData,
        })
    }

    /// Reopen a tree by the record id of its header.
    ///
    /// Fails with [`Error::ComparatorMismatch`] when the tree was built with a
    /// comparator of a different name.
    pub fn load(
        rm: &mut RecordManager,
        recid: RecordId,
        comparator: Arc<dyn Comparator<K>>,
    ) -> Result<Self> {
        let header = TreeHeader::decode(&rm.fetch(recid)?)?;
        if header.comparator != comparator.name() {
            return Err(Error::ComparatorMismatch {
                expected: comparator.name().to_string(),
                found: header.comparator,
            });
        }
        Ok(Self {
            recid,
            comparator,
            _values: PhantomData,
        })
    }

    /// Record id of the tree header; the tree's stable identity.
    #[must_use]
    pub const fn recid(&self) -> RecordId {
        self.recid
    }

    #[must_use]
    pub fn comparator(&self) -> &dyn Comparator<K> {
        &*self.comparator
    }

    /// Number of entries, kept in the header.
    pub fn size(&self, rm: &mut RecordManager) -> Result<u64> {
        Ok(self.header(rm)?.size)
    }

    pub fn height(&self, rm: &mut RecordManager) -> Result<u32> {
        Ok(self.header(rm)?.height)
    }

    pub fn is_empty(&self, rm: &mut RecordManager) -> Result<bool> {
        Ok(self.size(rm)? == 0)
    }

    /// Exact-match lookup.
    pub fn find(&self, rm: &mut RecordManager, key: &K) -> Result<Option<V>> {
        let header = self.header(rm)?;
        let leaf = self.find_leaf(rm, header.root, key)?.1;
        Ok(leaf
            .search(key, self.comparator())
            .ok()
            .map(|i| leaf.entries[i].value.clone()))
    }

    /// Insert `key -> value`.
    ///
    /// If `key` is present and `replace` is false the tree is left untouched
    /// and [`Error::DuplicateKey`] is returned. Otherwise the previous value,
    /// if any, is returned.
    pub fn insert(
        &self,
        rm: &mut RecordManager,
        key: K,
        value: V,
        replace: bool,
    ) -> Result<Option<V>> {
        let mut header = self.header(rm)?;
        let outcome = self.insert_into(rm, &header, header.root, key, value, replace)?;

        if let Some((separator, right)) = outcome.split {
            let root = Node::<K, V>::Branch(Branch::with_children(header.root, separator, right));
            header.root = rm.insert(&root.encode())?;
            header.height += 1;
            tracing::trace!("tree {} grew to height {}", self.recid, header.height);
        }
        if outcome.previous.is_none() {
            header.size += 1;
        }
        self.write_header(rm, &header)?;
        Ok(outcome.previous)
    }

    /// Remove `key`, returning its value if it was present.
    pub fn remove(&self, rm: &mut RecordManager, key: &K) -> Result<Option<V>> {
        let mut header = self.header(rm)?;
        let removed = self.remove_from(rm, &header, header.root, key)?;
        if removed.value.is_none() {
            return Ok(None);
        }

        match self.load_node(rm, header.root)? {
            Node::Branch(root) if root.keys.is_empty() => {
                rm.delete(header.root)?;
                header.root = root.children[0];
                header.height -= 1;
                tracing::trace!("tree {} shrank to height {}", self.recid, header.height);
            }
            _ => {}
        }
        header.size -= 1;
        self.write_header(rm, &header)?;
        Ok(removed.value)
    }

    /// Remove every entry. The tree keeps its identity.
    pub fn clear(&self, rm: &mut RecordManager) -> Result<()> {
        let mut header = self.header(rm)?;
        self.free_subtree(rm, header.root)?;
        header.root = rm.insert(&Node::<K, V>::Leaf(Leaf::empty()).encode())?;
        header.height = 1;
        header.size = 0;
        self.write_header(rm, &header)
    }

    /// Free every record of the tree, header included.
    pub fn delete(self, rm: &mut RecordManager) -> Result<()> {
        let header = self.header(rm)?;
        self.free_subtree(rm, header.root)?;
        rm.delete(self.recid)?;
        tracing::debug!("deleted tree {}", self.recid);
        Ok(())
    }

    /// A browser positioned before the first entry.
    pub fn browse(&self, rm: &mut RecordManager) -> Result<Browser<K, V>> {
        Browser::open(self.clone(), rm, Anchor::Start)
    }

    /// A browser positioned after the last entry.
    pub fn browse_last(&self, rm: &mut RecordManager) -> Result<Browser<K, V>> {
        Browser::open(self.clone(), rm, Anchor::End)
    }

    /// A browser positioned between the last entry `< key` and the first
    /// entry `>= key`.
    pub fn browse_from(&self, rm: &mut RecordManager, key: &K) -> Result<Browser<K, V>> {
        Browser::open(self.clone(), rm, Anchor::Before(key.clone()))
    }

    fn header(&self, rm: &mut RecordManager) -> Result<TreeHeader> {
        TreeHeader::decode(&rm.fetch(self.recid)?)
    }

    fn write_header(&self, rm: &mut RecordManager, header: &TreeHeader) -> Result<()> {
        rm.update(self.recid, &header.encode())?;
        Ok(())
    }

    pub(crate) fn load_node(&self, rm: &mut RecordManager, id: RecordId) -> Result<Node<K, V>> {
        Ok(Node::decode(&rm.fetch(id)?)?)
    }

    fn write_node(&self, rm: &mut RecordManager, id: RecordId, node: &Node<K, V>) -> Result<()> {
        rm.update(id, &node.encode())?;
        Ok(())
    }

    pub(crate) fn load_leaf(&self, rm: &mut RecordManager, id: RecordId) -> Result<Leaf<K, V>> {
        match self.load_node(rm, id)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Branch(_) => Err(corrupt(self.recid, id, "expected a leaf")),
        }
    }

    /// Root record id, for browsers re-seeking after a mutation.
    pub(crate) fn root(&self, rm: &mut RecordManager) -> Result<RecordId> {
        Ok(self.header(rm)?.root)
    }

    /// Descend from `root` to the leaf whose range covers `key`.
    pub(crate) fn find_leaf(
        &self,
        rm: &mut RecordManager,
        root: RecordId,
        key: &K,
    ) -> Result<(RecordId, Leaf<K, V>)> {
        let mut id = root;
        loop {
            match self.load_node(rm, id)? {
                Node::Leaf(leaf) => return Ok((id, leaf)),
                Node::Branch(branch) => {
                    id = branch.children[branch.find_child(key, self.comparator())];
                }
            }
        }
    }

    /// Descend to the first (`leftmost`) or last leaf.
    pub(crate) fn edge_leaf(
        &self,
        rm: &mut RecordManager,
        root: RecordId,
        leftmost: bool,
    ) -> Result<(RecordId, Leaf<K, V>)> {
        let mut id = root;
        loop {
            match self.load_node(rm, id)? {
                Node::Leaf(leaf) => return Ok((id, leaf)),
                Node::Branch(branch) => {
                    let child = if leftmost {
                        branch.children.first()
                    } else {
                        branch.children.last()
                    };
                    id = *child.ok_or_else(|| corrupt(self.recid, id, "branch without children"))?;
                }
            }
        }
    }

    fn insert_into(
        &self,
        rm: &mut RecordManager,
        header: &TreeHeader,
        id: RecordId,
        key: K,
        value: V,
        replace: bool,
    ) -> Result<Inserted<K, V>> {
        match self.load_node(rm, id)? {
            Node::Leaf(mut leaf) => match leaf.search(&key, self.comparator()) {
                Ok(i) => {
                    if !replace {
                        return Err(Error::DuplicateKey);
                    }
                    let previous = std::mem::replace(&mut leaf.entries[i].value, value);
                    self.write_node(rm, id, &Node::Leaf(leaf))?;
                    Ok(Inserted {
                        previous: Some(previous),
                        split: None,
                    })
                }
                Err(i) => {
                    leaf.entries.insert(i, (key, value).into());
                    let split = if leaf.entries.len() > header.order as usize {
                        Some(self.split_leaf(rm, id, &mut leaf)?)
                    } else {
                        None
                    };
                    self.write_node(rm, id, &Node::Leaf(leaf))?;
                    Ok(Inserted {
                        previous: None,
                        split,
                    })
                }
            },
            Node::Branch(mut branch) => {
                let idx = branch.find_child(&key, self.comparator());
                let outcome =
                    self.insert_into(rm, header, branch.children[idx], key, value, replace)?;
                let Some((separator, right)) = outcome.split else {
                    return Ok(outcome);
                };

                branch.insert_split(idx, separator, right);
                let split = if branch.keys.len() > header.order as usize {
                    let (median, right_branch) = branch
                        .split()
                        .ok_or_else(|| corrupt(self.recid, id, "split of an empty branch"))?;
                    let right_id = rm.insert(&Node::<K, V>::Branch(right_branch).encode())?;
                    Some((median, right_id))
                } else {
                    None
                };
                self.write_node(rm, id, &Node::Branch(branch))?;
                Ok(Inserted {
                    previous: outcome.previous,
                    split,
                })
            }
        }
    }

    /// Split an overflowing leaf, writing the new right half and relinking
    /// the neighbours. The caller writes `leaf` itself.
    fn split_leaf(
        &self,
        rm: &mut RecordManager,
        id: RecordId,
        leaf: &mut Leaf<K, V>,
    ) -> Result<(K, RecordId)> {
        let mut right = leaf.split();
        right.prev = Some(id);
        let separator = right.entries[0].key.clone();
        let old_next = right.next;
        let right_id = rm.insert(&Node::Leaf(right).encode())?;
        leaf.next = Some(right_id);

        if let Some(next_id) = old_next {
            let mut next = self.load_leaf(rm, next_id)?;
            next.prev = Some(right_id);
            self.write_node(rm, next_id, &Node::Leaf(next))?;
        }
        Ok((separator, right_id))
    }

    fn remove_from(
        &self,
        rm: &mut RecordManager,
        header: &TreeHeader,
        id: RecordId,
        key: &K,
    ) -> Result<Removed<V>> {
        match self.load_node(rm, id)? {
            Node::Leaf(mut leaf) => {
                let Ok(i) = leaf.search(key, self.comparator()) else {
                    return Ok(Removed {
                        value: None,
                        underflow: false,
                    });
                };
                let value = leaf.entries.remove(i).value;
                let underflow = leaf.entries.len() < header.min_keys();
                self.write_node(rm, id, &Node::Leaf(leaf))?;
                Ok(Removed {
                    value: Some(value),
                    underflow,
                })
            }
            Node::Branch(mut branch) => {
                let idx = branch.find_child(key, self.comparator());
                let removed = self.remove_from(rm, header, branch.children[idx], key)?;
                if !removed.underflow {
                    return Ok(removed);
                }
                self.rebalance(rm, header, &mut branch, idx)?;
                let underflow = branch.keys.len() < header.min_keys();
                self.write_node(rm, id, &Node::Branch(branch))?;
                Ok(Removed {
                    value: removed.value,
                    underflow,
                })
            }
        }
    }

    /// Fix an underflowing `parent.children[idx]` by borrowing from or
    /// merging with a sibling. The caller writes `parent`.
    fn rebalance(
        &self,
        rm: &mut RecordManager,
        header: &TreeHeader,
        parent: &mut Branch<K>,
        idx: usize,
    ) -> Result<()> {
        if parent.children.len() < 2 {
            return Ok(());
        }
        let sep = if idx > 0 { idx - 1 } else { idx };
        let left_id = parent.children[sep];
        let right_id = parent.children[sep + 1];
        let order = header.order as usize;

        match (self.load_node(rm, left_id)?, self.load_node(rm, right_id)?) {
            (Node::Leaf(mut left), Node::Leaf(mut right)) => {
                if left.entries.len() + right.entries.len() <= order {
                    left.entries.append(&mut right.entries);
                    left.next = right.next;
                    if let Some(next_id) = right.next {
                        let mut next = self.load_leaf(rm, next_id)?;
                        next.prev = Some(left_id);
                        self.write_node(rm, next_id, &Node::Leaf(next))?;
                    }
                    rm.delete(right_id)?;
                    parent.keys.remove(sep);
                    parent.children.remove(sep + 1);
                    self.write_node(rm, left_id, &Node::Leaf(left))?;
                } else {
                    let mut all = std::mem::take(&mut left.entries);
                    all.append(&mut right.entries);
                    right.entries = all.split_off(all.len() / 2);
                    left.entries = all;
                    parent.keys[sep] = right.entries[0].key.clone();
                    self.write_node(rm, left_id, &Node::Leaf(left))?;
                    self.write_node(rm, right_id, &Node::Leaf(right))?;
                }
            }
            (Node::Branch(mut left), Node::Branch(mut right)) => {
                let separator = parent.keys[sep].clone();
                if left.keys.len() + right.keys.len() < order {
                    left.keys.push(separator);
                    left.keys.append(&mut right.keys);
                    left.children.append(&mut right.children);
                    rm.delete(right_id)?;
                    parent.keys.remove(sep);
                    parent.children.remove(sep + 1);
                    self.write_node(rm, left_id, &Node::Branch(left))?;
                } else {
                    let mut keys = std::mem::take(&mut left.keys);
                    keys.push(separator);
                    keys.append(&mut right.keys);
                    let mut children = std::mem::take(&mut left.children);
                    children.append(&mut right.children);

                    let mid = keys.len() / 2;
                    right.keys = keys.split_off(mid + 1);
                    right.children = children.split_off(mid + 1);
                    parent.keys[sep] = keys
                        .pop()
                        .ok_or_else(|| corrupt(self.recid, left_id, "empty branch pair"))?;
                    left.keys = keys;
                    left.children = children;
                    self.write_node(rm, left_id, &Node::Branch(left))?;
                    self.write_node(rm, right_id, &Node::Branch(right))?;
                }
            }
            _ => return Err(corrupt(self.recid, left_id, "siblings at different depths")),
        }
        Ok(())
    }

    fn free_subtree(&self, rm: &mut RecordManager, id: RecordId) -> Result<()> {
        if let Node::Branch(branch) = self.load_node(rm, id)? {
            for child in branch.children {
                self.free_subtree(rm, child)?;
            }
        }
        rm.delete(id)?;
        Ok(())
    }
}

fn corrupt(tree: RecordId, node: RecordId, message: &str) -> Error {
    StoreError::Corruption(format!("tree {tree}, node {node}: {message}")).into()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;

    use super::*;
    use crate::comparator::{CaseIgnoreString, NaturalOrder};

    fn open_store() -> (tempfile::TempDir, RecordManager) {
        let dir = tempfile::tempdir().expect("tempdir");
        let rm = RecordManager::open(&dir.path().join("tree"), &StoreConfig::default())
            .expect("open record manager");
        (dir, rm)
    }

    fn u64_tree(rm: &mut RecordManager, order: usize) -> BTree<u64, u64> {
        BTree::create(rm, Arc::new(NaturalOrder), order).expect("create tree")
    }

    fn collect(tree: &BTree<u64, u64>, rm: &mut RecordManager) -> Vec<u64> {
        let mut browser = tree.browse(rm).expect("browse");
        let mut keys = Vec::new();
        while let Some(tuple) = browser.get_next(rm).expect("next") {
            keys.push(tuple.key);
        }
        keys
    }

    #[test]
    fn test_insert_find_replace() {
        let (_dir, mut rm) = open_store();
        let tree = u64_tree(&mut rm, 4);

        assert_eq!(tree.insert(&mut rm, 1, 10, false).expect("insert"), None);
        assert_eq!(tree.find(&mut rm, &1).expect("find"), Some(10));
        assert!(matches!(
            tree.insert(&mut rm, 1, 11, false),
            Err(Error::DuplicateKey)
        ));
        assert_eq!(tree.find(&mut rm, &1).expect("find"), Some(10));
        assert_eq!(tree.insert(&mut rm, 1, 12, true).expect("replace"), Some(10));
        assert_eq!(tree.find(&mut rm, &1).expect("find"), Some(12));
        assert_eq!(tree.size(&mut rm).expect("size"), 1);
        assert_eq!(tree.find(&mut rm, &2).expect("find"), None);
    }

    #[test]
    fn test_tiny_order_is_raised_to_minimum() {
        let (_dir, mut rm) = open_store();
        let tree = u64_tree(&mut rm, 1);
        let header = tree.header(&mut rm).expect("header");
        assert_eq!(header.order as usize, StoreConfig::MIN_BTREE_ORDER);

        for key in (0..50).rev() {
            tree.insert(&mut rm, key, key, false).expect("insert");
        }
        assert_eq!(collect(&tree, &mut rm), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_splits_grow_height_and_keep_order() {
        let (_dir, mut rm) = open_store();
        let tree = u64_tree(&mut rm, 4);

        for key in (0..200).rev() {
            tree.insert(&mut rm, key, key * 2, false).expect("insert");
        }
        assert!(tree.height(&mut rm).expect("height") >= 3);
        assert_eq!(tree.size(&mut rm).expect("size"), 200);
        assert_eq!(collect(&tree, &mut rm), (0..200).collect::<Vec<_>>());
        for key in 0..200 {
            assert_eq!(tree.find(&mut rm, &key).expect("find"), Some(key * 2));
        }
    }

    #[test]
    fn test_random_removal_rebalances_down_to_a_leaf() {
        let (_dir, mut rm) = open_store();
        let tree = u64_tree(&mut rm, 4);
        let mut rng = StdRng::seed_from_u64(7);

        let mut keys: Vec<u64> = (0..300).collect();
        keys.shuffle(&mut rng);
        for key in &keys {
            tree.insert(&mut rm, *key, *key, false).expect("insert");
        }

        keys.shuffle(&mut rng);
        let (gone, kept) = keys.split_at(250);
        for key in gone {
            assert_eq!(tree.remove(&mut rm, key).expect("remove"), Some(*key));
        }
        assert_eq!(tree.remove(&mut rm, &gone[0]).expect("remove again"), None);

        let mut expected = kept.to_vec();
        expected.sort_unstable();
        assert_eq!(collect(&tree, &mut rm), expected);
        assert_eq!(tree.size(&mut rm).expect("size"), 50);

        for key in kept {
            tree.remove(&mut rm, key).expect("remove");
        }
        assert_eq!(tree.height(&mut rm).expect("height"), 1);
        assert!(tree.is_empty(&mut rm).expect("empty"));
        assert!(collect(&tree, &mut rm).is_empty());
    }

    #[test]
    fn test_reload_checks_comparator_name() {
        let (_dir, mut rm) = open_store();
        let tree: BTree<String, u64> =
            BTree::create(&mut rm, Arc::new(CaseIgnoreString), 8).expect("create");
        tree.insert(&mut rm, "Alpha".to_string(), 1, false)
            .expect("insert");

        let reloaded: BTree<String, u64> =
            BTree::load(&mut rm, tree.recid(), Arc::new(CaseIgnoreString)).expect("load");
        assert_eq!(
            reloaded.find(&mut rm, &"ALPHA".to_string()).expect("find"),
            Some(1)
        );

        let err = BTree::<String, u64>::load(&mut rm, tree.recid(), Arc::new(NaturalOrder))
            .expect_err("wrong comparator");
        assert!(matches!(err, Error::ComparatorMismatch { .. }));
    }

    #[test]
    fn test_clear_and_delete_free_pages() {
        let (_dir, mut rm) = open_store();
        let tree = u64_tree(&mut rm, 4);
        for key in 0..100 {
            tree.insert(&mut rm, key, key, false).expect("insert");
        }
        rm.commit().expect("commit");
        let used = rm.total_pages() - rm.free_pages();

        tree.clear(&mut rm).expect("clear");
        assert_eq!(tree.size(&mut rm).expect("size"), 0);
        assert!(rm.total_pages() - rm.free_pages() < used);
        tree.insert(&mut rm, 5, 5, false).expect("insert after clear");
        assert_eq!(collect(&tree, &mut rm), vec![5]);

        let recid = tree.recid();
        tree.delete(&mut rm).expect("delete");
        assert!(rm.fetch(recid).is_err());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("tree");
        let recid = {
            let mut rm = RecordManager::open(&base, &StoreConfig::default()).expect("open");
            let tree = u64_tree(&mut rm, 6);
            for key in 0..64 {
                tree.insert(&mut rm, key, key + 1, false).expect("insert");
            }
            rm.commit().expect("commit");
            rm.close().expect("close");
            tree.recid()
        };

        let mut rm = RecordManager::open(&base, &StoreConfig::default()).expect("reopen");
        let tree: BTree<u64, u64> =
            BTree::load(&mut rm, recid, Arc::new(NaturalOrder)).expect("load");
        assert_eq!(tree.size(&mut rm).expect("size"), 64);
        assert_eq!(tree.find(&mut rm, &63).expect("find"), Some(64));
    }
}
