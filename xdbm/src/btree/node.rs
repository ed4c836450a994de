//! B-tree node layout.
//!
//! Every node is one record in the record manager. A node is either a
//! branch (separator keys and child record ids) or a leaf (sorted
//! key/value tuples linked to its neighbours).
//!
//! # Record Format
//!
//! ```text
//! Branch: tag (1) | key count (4) | keys (len-prefixed) | children (8 each)
//! Leaf:   tag (1) | prev (8) | next (8) | entry count (4) | (key, value) pairs
//! ```
//!
//! `Child[i]` holds keys < `Key[i]`, `Child[i+1]` holds keys >= `Key[i]`.
//! A leaf link of 0 means "no neighbour": record 0 is the superblock page and
//! never a node.

#![allow(clippy::cast_possible_truncation)]

use crate::codec::{ByteReader, ByteWriter, Codec, CodecError};
use crate::comparator::{self, Comparator};
use crate::storage::RecordId;
use crate::types::Tuple;

const BRANCH_TAG: u8 = 1;
const LEAF_TAG: u8 = 2;

/// Interior node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch<K> {
    pub keys: Vec<K>,
    /// `children.len() == keys.len() + 1`
    pub children: Vec<RecordId>,
}

impl<K> Branch<K> {
    /// A new root above two halves of a split.
    #[must_use]
    pub fn with_children(left: RecordId, separator: K, right: RecordId) -> Self {
        Self {
            keys: vec![separator],
            children: vec![left, right],
        }
    }

    /// Index of the child whose subtree may contain `key`.
    pub fn find_child(&self, key: &K, cmp: &dyn Comparator<K>) -> usize {
        match comparator::search(&self.keys, key, |k| k, cmp) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// Insert a separator produced by splitting `children[idx]`.
    pub fn insert_split(&mut self, idx: usize, separator: K, right: RecordId) {
        self.keys.insert(idx, separator);
        self.children.insert(idx + 1, right);
    }

    /// Split the node, returning the promoted median and the new right node.
    pub fn split(&mut self) -> Option<(K, Self)> {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let median = self.keys.pop()?;
        Some((
            median,
            Self {
                keys: right_keys,
                children: right_children,
            },
        ))
    }
}

/// Leaf node holding the actual tuples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf<K, V> {
    pub entries: Vec<Tuple<K, V>>,
    pub prev: Option<RecordId>,
    pub next: Option<RecordId>,
}

impl<K, V> Leaf<K, V> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: Vec::new(),
            prev: None,
            next: None,
        }
    }

    pub fn search(&self, key: &K, cmp: &dyn Comparator<K>) -> Result<usize, usize> {
        comparator::search(&self.entries, key, |t| &t.key, cmp)
    }

    /// Move the upper half of the entries into a new leaf.
    ///
    /// The caller links the new leaf once it has a record id.
    pub fn split(&mut self) -> Self {
        let mid = self.entries.len() / 2;
        Self {
            entries: self.entries.split_off(mid),
            prev: None,
            next: self.next,
        }
    }
}

/// A decoded B-tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<K, V> {
    Branch(Branch<K>),
    Leaf(Leaf<K, V>),
}

impl<K, V> Node<K, V> {
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Number of keys (branch) or entries (leaf).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Branch(branch) => branch.keys.len(),
            Self::Leaf(leaf) => leaf.entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Codec, V: Codec> Node<K, V> {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        match self {
            Self::Branch(branch) => {
                writer.put_u8(BRANCH_TAG);
                writer.put_u32(branch.keys.len() as u32);
                for key in &branch.keys {
                    writer.put_encoded(key);
                }
                for child in &branch.children {
                    writer.put_u64(*child);
                }
            }
            Self::Leaf(leaf) => {
                writer.put_u8(LEAF_TAG);
                writer.put_u64(leaf.prev.unwrap_or(0));
                writer.put_u64(leaf.next.unwrap_or(0));
                writer.put_u32(leaf.entries.len() as u32);
                for entry in &leaf.entries {
                    writer.put_encoded(&entry.key);
                    writer.put_encoded(&entry.value);
                }
            }
        }
        writer.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let node = match reader.get_u8()? {
            BRANCH_TAG => {
                // length-prefixed key plus child id
                let count = reader.get_count(4 + 8)?;
                let mut keys = Vec::with_capacity(count);
                for _ in 0..count {
                    keys.push(reader.get_decoded()?);
                }
                let mut children = Vec::with_capacity(count + 1);
                for _ in 0..=count {
                    children.push(reader.get_u64()?);
                }
                Self::Branch(Branch { keys, children })
            }
            LEAF_TAG => {
                let prev = non_zero(reader.get_u64()?);
                let next = non_zero(reader.get_u64()?);
                // length-prefixed key and value
                let count = reader.get_count(4 + 4)?;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = reader.get_decoded()?;
                    let value = reader.get_decoded()?;
                    entries.push(Tuple::new(key, value));
                }
                Self::Leaf(Leaf {
                    entries,
                    prev,
                    next,
                })
            }
            tag => return Err(CodecError::InvalidTag(tag)),
        };
        reader.finish()?;
        Ok(node)
    }
}

const fn non_zero(id: RecordId) -> Option<RecordId> {
    if id == 0 { None } else { Some(id) }
}
