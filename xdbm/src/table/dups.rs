//! Duplicate-value containers.
//!
//! In a table that allows duplicates, the tree maps each key to a
//! [`DupsContainer`] rather than to a single value. Small value sets are
//! stored inline, sorted by the table's value comparator. Once a set grows
//! past the table's duplicate limit it moves into a nested tree whose keys
//! are the values. Sets never move back inline when they shrink.
//!
//! # Record Format
//!
//! ```text
//! Inline: tag 0 (1) | count (4) | values (len-prefixed)
//! Tree:   tag 1 (1) | nested tree header record id (8)
//! ```

#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;

use crate::btree::BTree;
use crate::codec::{ByteReader, ByteWriter, Codec, CodecError};
use crate::comparator::Comparator;
use crate::cursor::{Cursor, EmptyCursor, KeyCursor, ListCursor};
use crate::error::Result;
use crate::storage::{RecordId, RecordManager, SharedRecordManager};

const INLINE_TAG: u8 = 0;
const TREE_TAG: u8 = 1;

/// The value set stored under one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DupsContainer<V> {
    /// Sorted values held in the tree entry itself.
    Inline(Vec<V>),
    /// Header record of a nested tree holding the values as keys.
    Tree(RecordId),
}

impl<V> DupsContainer<V> {
    #[must_use]
    pub const fn is_tree(&self) -> bool {
        matches!(self, Self::Tree(_))
    }
}

impl<V: Codec + Clone> DupsContainer<V> {
    /// Number of values in the set.
    pub fn count(&self, rm: &mut RecordManager, comparator: Arc<dyn Comparator<V>>) -> Result<u64> {
        match self {
            Self::Inline(values) => Ok(values.len() as u64),
            Self::Tree(recid) => nested_tree(rm, *recid, comparator)?.size(rm),
        }
    }

    /// All values, in comparator order.
    pub fn values(
        &self,
        rm: &mut RecordManager,
        comparator: Arc<dyn Comparator<V>>,
    ) -> Result<Vec<V>> {
        match self {
            Self::Inline(values) => Ok(values.clone()),
            Self::Tree(recid) => {
                let tree = nested_tree(rm, *recid, comparator)?;
                let mut browser = tree.browse(rm)?;
                let mut values = Vec::new();
                while let Some(tuple) = browser.get_next(rm)? {
                    values.push(tuple.key);
                }
                Ok(values)
            }
        }
    }

    /// Smallest value of the set.
    pub fn first(&self, rm: &mut RecordManager, comparator: Arc<dyn Comparator<V>>) -> Result<Option<V>> {
        match self {
            Self::Inline(values) => Ok(values.first().cloned()),
            Self::Tree(recid) => {
                let tree = nested_tree(rm, *recid, comparator)?;
                Ok(tree.browse(rm)?.get_next(rm)?.map(|tuple| tuple.key))
            }
        }
    }

    /// Whether `value` is in the set.
    pub fn contains(
        &self,
        rm: &mut RecordManager,
        value: &V,
        comparator: Arc<dyn Comparator<V>>,
    ) -> Result<bool> {
        match self {
            Self::Inline(values) => Ok(values
                .binary_search_by(|v| comparator.compare(v, value))
                .is_ok()),
            Self::Tree(recid) => Ok(nested_tree(rm, *recid, comparator)?
                .find(rm, value)?
                .is_some()),
        }
    }

    /// A cursor over the set, unpositioned.
    ///
    /// The inline form is copied into the cursor; the nested form is read live.
    pub fn cursor(
        &self,
        rm: &mut RecordManager,
        recman: &SharedRecordManager,
        comparator: Arc<dyn Comparator<V>>,
    ) -> Result<DupsContainerCursor<V>> {
        Ok(match self {
            Self::Inline(values) => DupsContainerCursor::Inline(ListCursor::new(values.clone(), comparator)),
            Self::Tree(recid) => DupsContainerCursor::Tree(KeyCursor::new(
                Arc::clone(recman),
                nested_tree(rm, *recid, comparator)?,
            )),
        })
    }
}

/// Open the nested tree of a container.
pub(crate) fn nested_tree<V: Codec + Clone>(
    rm: &mut RecordManager,
    recid: RecordId,
    comparator: Arc<dyn Comparator<V>>,
) -> Result<BTree<V, ()>> {
    BTree::load(rm, recid, comparator)
}

impl<V: Codec> Codec for DupsContainer<V> {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut writer = ByteWriter::new();
        match self {
            Self::Inline(values) => {
                writer.put_u8(INLINE_TAG);
                writer.put_u32(values.len() as u32);
                for value in values {
                    writer.put_encoded(value);
                }
            }
            Self::Tree(recid) => {
                writer.put_u8(TREE_TAG);
                writer.put_u64(*recid);
            }
        }
        out.extend_from_slice(&writer.into_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let container = match reader.get_u8()? {
            INLINE_TAG => {
                let count = reader.get_count(4)?;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(reader.get_decoded()?);
                }
                Self::Inline(values)
            }
            TREE_TAG => Self::Tree(reader.get_u64()?),
            tag => return Err(CodecError::InvalidTag(tag)),
        };
        reader.finish()?;
        Ok(container)
    }
}

/// Cursor over the values of one key, whichever form they are stored in.
#[derive(Debug)]
pub enum DupsContainerCursor<V> {
    /// The key has no values.
    Empty(EmptyCursor<V>),
    Inline(ListCursor<V>),
    Tree(KeyCursor<V>),
}

/// The cursor a table hands out for a single key's values.
pub type ValueCursor<V> = DupsContainerCursor<V>;

impl<V: Codec + Clone> DupsContainerCursor<V> {
    /// A cursor over no values.
    #[must_use]
    pub const fn empty() -> Self {
        Self::Empty(EmptyCursor::new())
    }
}

macro_rules! delegate {
    ($self:ident, $cursor:ident => $body:expr) => {
        match $self {
            Self::Empty($cursor) => $body,
            Self::Inline($cursor) => $body,
            Self::Tree($cursor) => $body,
        }
    };
}

impl<V: Codec + Clone> Cursor for DupsContainerCursor<V> {
    type Element = V;

    fn before_first(&mut self) -> Result<()> {
        delegate!(self, c => c.before_first())
    }

    fn after_last(&mut self) -> Result<()> {
        delegate!(self, c => c.after_last())
    }

    fn before(&mut self, element: &V) -> Result<()> {
        delegate!(self, c => c.before(element))
    }

    fn after(&mut self, element: &V) -> Result<()> {
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

    fn get(&self) -> Result<V> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::NaturalOrder;
    use crate::config::StoreConfig;

    #[test]
    fn test_container_roundtrip() {
        let inline: DupsContainer<String> =
            DupsContainer::Inline(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            DupsContainer::<String>::decode(&inline.to_bytes()).expect("decode"),
            inline
        );

        let tree: DupsContainer<String> = DupsContainer::Tree(42);
        let decoded = DupsContainer::<String>::decode(&tree.to_bytes()).expect("decode");
        assert!(decoded.is_tree());
        assert_eq!(decoded, tree);

        assert_eq!(
            DupsContainer::<String>::decode(&[7]),
            Err(CodecError::InvalidTag(7))
        );
        assert_eq!(
            DupsContainer::<String>::decode(&[INLINE_TAG, 0xff, 0xff, 0xff, 0xff]),
            Err(CodecError::UnexpectedEof {
                needed: 4 * u32::MAX as usize,
                remaining: 0
            })
        );
    }

    #[test]
    fn test_nested_container_reads_through_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let recman = RecordManager::open_shared(&dir.path().join("dups"), &StoreConfig::default())
            .expect("open");
        let cmp: Arc<dyn Comparator<u64>> = Arc::new(NaturalOrder);

        let container = {
            let mut rm = RecordManager::lock(&recman).expect("lock");
            let tree: BTree<u64, ()> = BTree::create(&mut rm, Arc::clone(&cmp), 4).expect("create");
            for v in [30, 10, 20] {
                tree.insert(&mut rm, v, (), false).expect("insert");
            }
            DupsContainer::<u64>::Tree(tree.recid())
        };

        let mut rm = RecordManager::lock(&recman).expect("lock");
        assert_eq!(container.count(&mut rm, Arc::clone(&cmp)).expect("count"), 3);
        assert_eq!(
            container.values(&mut rm, Arc::clone(&cmp)).expect("values"),
            vec![10, 20, 30]
        );
        assert_eq!(container.first(&mut rm, Arc::clone(&cmp)).expect("first"), Some(10));
        assert!(container.contains(&mut rm, &20, Arc::clone(&cmp)).expect("contains"));
        assert!(!container.contains(&mut rm, &25, Arc::clone(&cmp)).expect("contains"));

        let mut cursor = container
            .cursor(&mut rm, &recman, Arc::clone(&cmp))
            .expect("cursor");
        drop(rm);
        cursor.after(&10).expect("after");
        assert!(cursor.next().expect("next"));
        assert_eq!(cursor.get().expect("get"), 20);
    }
}
