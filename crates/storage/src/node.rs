//! Logical B+tree nodes.
//!
//! Nodes refer to each other by [`PageId`] only. In the persisted tree that
//! id is the page the node is serialized to; in the in-memory tree it is an
//! arena key.

use crate::error::{Result, StorageError};
use crate::pager::PageId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> Entry<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }
}

/// A leaf: sorted entries plus links to its neighbours in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode<K, V> {
    pub page_id: PageId,
    pub parent: Option<PageId>,
    pub entries: Vec<Entry<K, V>>,
    pub next: Option<PageId>,
    pub previous: Option<PageId>,
}

impl<K, V> LeafNode<K, V> {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            parent: None,
            entries: Vec::new(),
            next: None,
            previous: None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.iter().map(|entry| &entry.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Ord, V> LeafNode<K, V> {
    fn position(&self, key: &K) -> Option<usize> {
        let idx = self.entries.partition_point(|entry| entry.key < *key);
        (idx < self.entries.len() && self.entries[idx].key == *key).then_some(idx)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.position(key).map(|idx| &self.entries[idx].value)
    }

    /// Insert after any entries with an equal key.
    pub fn insert(&mut self, entry: Entry<K, V>) {
        let idx = self.entries.partition_point(|existing| existing.key <= entry.key);
        self.entries.insert(idx, entry);
    }

    pub fn remove(&mut self, key: &K) -> Option<Entry<K, V>> {
        self.position(key).map(|idx| self.entries.remove(idx))
    }
}

/// An internal node: `keys.len() + 1` children.
///
/// Child `i` holds keys below `keys[i]`; the last child holds keys at or
/// above the last key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode<K> {
    pub page_id: PageId,
    pub parent: Option<PageId>,
    pub keys: Vec<K>,
    pub children: Vec<PageId>,
}

impl<K> InternalNode<K> {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            parent: None,
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn first_child(&self) -> Result<PageId> {
        self.children.first().copied().ok_or_else(|| {
            StorageError::Corruption(format!("internal node {} has no children", self.page_id))
        })
    }
}

impl<K: Ord> InternalNode<K> {
    /// Index of the child a new `key` is routed to: past every equal key.
    pub fn child_index(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    /// Index of the leftmost child that may hold `key`.
    ///
    /// Duplicates of a separator can sit on both sides of it, so lookups
    /// start here and continue along the leaf chain.
    pub fn lower_child_index(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k < key)
    }

    pub fn child_for(&self, key: &K) -> Result<PageId> {
        self.child_at(self.child_index(key))
    }

    pub fn lower_child_for(&self, key: &K) -> Result<PageId> {
        self.child_at(self.lower_child_index(key))
    }

    fn child_at(&self, idx: usize) -> Result<PageId> {
        self.children.get(idx).copied().ok_or_else(|| {
            StorageError::Corruption(format!(
                "internal node {} has {} keys but {} children",
                self.page_id,
                self.keys.len(),
                self.children.len()
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<K, V> {
    Leaf(LeafNode<K, V>),
    Internal(InternalNode<K>),
}

impl<K, V> Node<K, V> {
    pub fn page_id(&self) -> PageId {
        match self {
            Node::Leaf(leaf) => leaf.page_id,
            Node::Internal(internal) => internal.page_id,
        }
    }

    pub fn parent(&self) -> Option<PageId> {
        match self {
            Node::Leaf(leaf) => leaf.parent,
            Node::Internal(internal) => internal.parent,
        }
    }

    pub fn set_parent(&mut self, parent: Option<PageId>) {
        match self {
            Node::Leaf(leaf) => leaf.parent = parent,
            Node::Internal(internal) => internal.parent = parent,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Entry count of a leaf, key count of an internal node.
    pub fn key_count(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.len(),
            Node::Internal(internal) => internal.keys.len(),
        }
    }

    pub fn into_leaf(self) -> Result<LeafNode<K, V>> {
        match self {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(internal) => Err(StorageError::Corruption(format!(
                "expected leaf at page {}, found internal node",
                internal.page_id
            ))),
        }
    }

    pub fn into_internal(self) -> Result<InternalNode<K>> {
        match self {
            Node::Internal(internal) => Ok(internal),
            Node::Leaf(leaf) => Err(StorageError::Corruption(format!(
                "expected internal node at page {}, found leaf",
                leaf.page_id
            ))),
        }
    }
}
