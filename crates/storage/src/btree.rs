//! B+tree algorithm, generic over where its nodes live.
//!
//! Nodes name each other by [`PageId`]; a [`NodeResolver`] turns ids into
//! nodes and stores mutated nodes back. The same algorithm therefore runs
//! over an in-memory [`NodeArena`] and over pager-backed pages
//! ([`crate::persisted::PagedNodes`]).
//!
//! Splitting happens when a node reaches `degree` keys:
//! - a leaf keeps `[0, mid)`, its new right sibling takes `[mid, len)`, and
//!   the right sibling's first key is copied up to the parent;
//! - an internal node keeps keys `[0, mid)` and children `[0, mid]`, its new
//!   sibling takes keys `(mid, len)` and children `[mid + 1, len]`, and
//!   `keys[mid]` moves up.
//!
//! Splitting the root allocates a new root, which is the only way the tree
//! grows taller. Deletion never merges or redistributes.
//!
//! A split changes several nodes. They are staged first and every one is
//! checked against the resolver before any is stored, so a node that does
//! not fit fails the insert with the tree untouched.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, trace, warn};

use crate::config::validate_degree;
use crate::error::{Result, StorageError};
use crate::node::{Entry, InternalNode, LeafNode, Node};
use crate::pager::PageId;

/// Resolves node ids to nodes and stores nodes back.
pub trait NodeResolver<K, V> {
    /// Load an owned copy of the node stored under `page_id`.
    fn fetch(&mut self, page_id: PageId) -> Result<Node<K, V>>;

    /// Store `node` under its own page id, replacing what was there.
    fn persist(&mut self, node: Node<K, V>) -> Result<()>;

    /// Reserve an id for a new node.
    fn allocate(&mut self) -> Result<PageId>;

    /// True if a node can be loaded from `page_id`.
    fn contains(&self, page_id: PageId) -> bool;

    /// Fail if `node` could not be stored. Must not change anything.
    fn check(&self, _node: &Node<K, V>) -> Result<()> {
        Ok(())
    }

    /// Hand back an id from [`allocate`](Self::allocate) that was never
    /// stored to.
    fn release(&mut self, _page_id: PageId) -> Result<()> {
        Ok(())
    }

    /// Run `f` against a node without keeping it.
    fn with_node<T>(&mut self, page_id: PageId, f: impl FnOnce(&Node<K, V>) -> T) -> Result<T> {
        let node = self.fetch(page_id)?;
        Ok(f(&node))
    }
}

/// Told whenever a tree's root moves to a new page.
pub trait RootListener {
    fn on_root_changed(&mut self, tree_name: &str, new_root: PageId);
}

impl<F: FnMut(&str, PageId)> RootListener for F {
    fn on_root_changed(&mut self, tree_name: &str, new_root: PageId) {
        self(tree_name, new_root)
    }
}

/// A tree name paired with the listener that tracks its root.
pub struct RootBinding {
    tree_name: String,
    listener: Box<dyn RootListener>,
}

impl RootBinding {
    pub fn new(tree_name: impl Into<String>, listener: impl RootListener + 'static) -> Self {
        Self {
            tree_name: tree_name.into(),
            listener: Box::new(listener),
        }
    }

    pub fn tree_name(&self) -> &str {
        &self.tree_name
    }
}

impl fmt::Debug for RootBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootBinding")
            .field("tree_name", &self.tree_name)
            .finish_non_exhaustive()
    }
}

/// Nodes held in a map keyed by id. Ids start at 1.
#[derive(Debug)]
pub struct NodeArena<K, V> {
    nodes: HashMap<PageId, Node<K, V>>,
    next_id: PageId,
}

impl<K, V> Default for NodeArena<K, V> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<K, V> NodeArena<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<K: Clone, V: Clone> NodeResolver<K, V> for NodeArena<K, V> {
    fn fetch(&mut self, page_id: PageId) -> Result<Node<K, V>> {
        self.nodes
            .get(&page_id)
            .cloned()
            .ok_or_else(|| missing_node(page_id))
    }

    fn persist(&mut self, node: Node<K, V>) -> Result<()> {
        self.nodes.insert(node.page_id(), node);
        Ok(())
    }

    fn allocate(&mut self) -> Result<PageId> {
        let page_id = self.next_id;
        self.next_id = page_id
            .checked_add(1)
            .ok_or(StorageError::InvalidPageId(i64::from(page_id) + 1))?;
        Ok(page_id)
    }

    fn contains(&self, page_id: PageId) -> bool {
        self.nodes.contains_key(&page_id)
    }

    fn release(&mut self, page_id: PageId) -> Result<()> {
        self.nodes.remove(&page_id);
        if page_id.checked_add(1) == Some(self.next_id) {
            self.next_id = page_id;
        }
        Ok(())
    }

    fn with_node<T>(&mut self, page_id: PageId, f: impl FnOnce(&Node<K, V>) -> T) -> Result<T> {
        self.nodes
            .get(&page_id)
            .map(f)
            .ok_or_else(|| missing_node(page_id))
    }
}

fn missing_node(page_id: PageId) -> StorageError {
    StorageError::Corruption(format!("no node stored under id {page_id}"))
}

/// Nodes changed by one split, held back until all of them are known to fit.
struct PendingWrites<K, V> {
    nodes: Vec<Node<K, V>>,
    allocated: Vec<PageId>,
    new_root: Option<PageId>,
}

impl<K: Clone, V: Clone> PendingWrites<K, V> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            allocated: Vec::new(),
            new_root: None,
        }
    }

    fn get(&self, page_id: PageId) -> Option<&Node<K, V>> {
        self.nodes.iter().find(|node| node.page_id() == page_id)
    }

    /// Replace the staged copy of the node, keeping its place in write order.
    fn stage(&mut self, node: Node<K, V>) {
        match self
            .nodes
            .iter_mut()
            .find(|staged| staged.page_id() == node.page_id())
        {
            Some(staged) => *staged = node,
            None => self.nodes.push(node),
        }
    }
}

/// A B+tree whose nodes are reached through `R`.
pub struct BPlusTree<K, V, R> {
    nodes: R,
    root: PageId,
    degree: usize,
    binding: Option<RootBinding>,
    _entries: PhantomData<fn() -> (K, V)>,
}

/// A tree living entirely in memory.
pub type InMemoryBPlusTree<K, V> = BPlusTree<K, V, NodeArena<K, V>>;

impl<K: Ord + Clone, V: Clone> BPlusTree<K, V, NodeArena<K, V>> {
    /// An empty in-memory tree.
    pub fn new(degree: usize) -> Result<Self> {
        Self::from_resolver(NodeArena::new(), 0, degree, None)
    }
}

impl<K, V, R> BPlusTree<K, V, R>
where
    K: Ord + Clone,
    V: Clone,
    R: NodeResolver<K, V>,
{
    /// Open the tree rooted at `root`, or start an empty one when `root` is
    /// not resolvable. Starting a tree reports the new root to `binding`.
    pub fn from_resolver(
        nodes: R,
        root: PageId,
        degree: usize,
        binding: Option<RootBinding>,
    ) -> Result<Self> {
        validate_degree(degree)?;
        let mut tree = Self {
            nodes,
            root,
            degree,
            binding,
            _entries: PhantomData,
        };
        if !tree.nodes.contains(root) {
            let root_id = tree.nodes.allocate()?;
            tree.nodes.persist(Node::Leaf(LeafNode::new(root_id)))?;
            tree.set_root(root_id);
        }
        Ok(tree)
    }

    pub fn root_page_id(&self) -> PageId {
        self.root
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn resolver(&self) -> &R {
        &self.nodes
    }

    /// Load any node of this tree by id.
    pub fn read_node(&mut self, page_id: PageId) -> Result<Node<K, V>> {
        self.nodes.fetch(page_id)
    }

    /// Value of the first entry matching `key`, in key order.
    pub fn search(&mut self, key: &K) -> Result<Option<V>> {
        let Some(leaf_id) = self.first_match_leaf(key)? else {
            return Ok(None);
        };
        self.nodes.with_node(leaf_id, |node| match node {
            Node::Leaf(leaf) => leaf.get(key).cloned(),
            Node::Internal(_) => None,
        })
    }

    /// Insert `(key, value)` after any entries with an equal key.
    ///
    /// If any node touched by a resulting split cannot be stored, nothing is
    /// stored and ids allocated for the split are released.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        let leaf_id = self.find_leaf(&key)?;
        let mut leaf = self.nodes.fetch(leaf_id)?.into_leaf()?;
        leaf.insert(Entry::new(key, value));
        if leaf.len() < self.degree {
            return self.nodes.persist(Node::Leaf(leaf));
        }

        let mut pending = PendingWrites::new();
        let staged = self
            .split_leaf(leaf, &mut pending)
            .and_then(|()| self.check_pending(&pending));
        if let Err(err) = staged {
            self.abandon(pending);
            return Err(err);
        }
        self.commit(pending)
    }

    /// Remove the first entry matching `key`. Returns whether one was found.
    pub fn delete(&mut self, key: &K) -> Result<bool> {
        let Some(leaf_id) = self.first_match_leaf(key)? else {
            return Ok(false);
        };
        let mut leaf = self.nodes.fetch(leaf_id)?.into_leaf()?;
        if leaf.remove(key).is_none() {
            return Ok(false);
        }
        self.nodes.persist(Node::Leaf(leaf))?;
        Ok(true)
    }

    /// Every entry in ascending key order, read lazily along the leaf chain.
    pub fn scan(&mut self) -> Result<Scan<'_, K, V, R>> {
        let first_leaf = self.leftmost_leaf()?;
        Ok(Scan {
            nodes: &mut self.nodes,
            next_leaf: Some(first_leaf),
            pending: Vec::new().into_iter(),
        })
    }

    /// Every value in ascending key order.
    pub fn values(&mut self) -> Result<impl Iterator<Item = Result<V>> + '_> {
        Ok(self.scan()?.map(|item| item.map(|(_, value)| value)))
    }

    /// Number of levels from the root down to the leaves.
    pub fn height(&mut self) -> Result<usize> {
        let mut height = 1;
        let mut page_id = self.root;
        while let Some(child) = self.first_child_of(page_id)? {
            height += 1;
            page_id = child;
        }
        Ok(height)
    }

    /// The leaf a new entry for `key` belongs in.
    fn find_leaf(&mut self, key: &K) -> Result<PageId> {
        self.descend(key, InternalNode::child_for)
    }

    /// The leaf holding the first entry for `key`, if there is one.
    fn first_match_leaf(&mut self, key: &K) -> Result<Option<PageId>> {
        let mut page_id = self.descend(key, InternalNode::lower_child_for)?;
        loop {
            let (found, passed, next) = self.nodes.with_node(page_id, |node| match node {
                Node::Leaf(leaf) => Ok((
                    leaf.get(key).is_some(),
                    leaf.keys().any(|k| k > key),
                    leaf.next,
                )),
                Node::Internal(_) => Err(StorageError::Corruption(format!(
                    "leaf chain reaches internal node {page_id}"
                ))),
            })??;
            if found {
                return Ok(Some(page_id));
            }
            match next {
                Some(next) if !passed => page_id = next,
                _ => return Ok(None),
            }
        }
    }

    fn descend(
        &mut self,
        key: &K,
        route: fn(&InternalNode<K>, &K) -> Result<PageId>,
    ) -> Result<PageId> {
        let mut page_id = self.root;
        loop {
            let child = self.nodes.with_node(page_id, |node| match node {
                Node::Leaf(_) => Ok(None),
                Node::Internal(internal) => route(internal, key).map(Some),
            })??;
            match child {
                Some(child) => page_id = child,
                None => return Ok(page_id),
            }
        }
    }

    fn leftmost_leaf(&mut self) -> Result<PageId> {
        let mut page_id = self.root;
        while let Some(child) = self.first_child_of(page_id)? {
            page_id = child;
        }
        Ok(page_id)
    }

    fn first_child_of(&mut self, page_id: PageId) -> Result<Option<PageId>> {
        self.nodes.with_node(page_id, |node| match node {
            Node::Leaf(_) => Ok(None),
            Node::Internal(internal) => internal.first_child().map(Some),
        })?
    }

    fn split_leaf(
        &mut self,
        mut left: LeafNode<K, V>,
        pending: &mut PendingWrites<K, V>,
    ) -> Result<()> {
        let mid = left.len() / 2;
        let right_id = self.allocate_pending(pending)?;

        let mut right = LeafNode::new(right_id);
        right.entries = left.entries.split_off(mid);
        right.parent = left.parent;
        right.next = left.next;
        right.previous = Some(left.page_id);
        let old_next = left.next.replace(right_id);

        let separator = right.entries[0].key.clone();
        let (left_id, parent) = (left.page_id, left.parent);
        trace!(left = left_id, right = right_id, "split leaf");

        pending.stage(Node::Leaf(left));
        pending.stage(Node::Leaf(right));
        self.insert_into_parent(left_id, parent, separator, right_id, pending)?;

        if let Some(next_id) = old_next {
            let mut next = self.load(pending, next_id)?.into_leaf()?;
            next.previous = Some(right_id);
            pending.stage(Node::Leaf(next));
        }
        Ok(())
    }

    fn split_internal(
        &mut self,
        mut left: InternalNode<K>,
        pending: &mut PendingWrites<K, V>,
    ) -> Result<()> {
        let mid = left.keys.len() / 2;
        let right_id = self.allocate_pending(pending)?;

        let mut right_keys = left.keys.split_off(mid);
        let separator = right_keys.remove(0);
        let right = InternalNode {
            page_id: right_id,
            parent: left.parent,
            keys: right_keys,
            children: left.children.split_off(mid + 1),
        };

        let (left_id, parent) = (left.page_id, left.parent);
        let moved = right.children.clone();
        trace!(left = left_id, right = right_id, "split internal node");

        pending.stage(Node::Internal(left));
        pending.stage(Node::Internal(right));
        self.reparent(&moved, right_id, pending)?;
        self.insert_into_parent(left_id, parent, separator, right_id, pending)
    }

    fn insert_into_parent(
        &mut self,
        left_id: PageId,
        parent: Option<PageId>,
        separator: K,
        right_id: PageId,
        pending: &mut PendingWrites<K, V>,
    ) -> Result<()> {
        let Some(parent_id) = parent else {
            let root_id = self.allocate_pending(pending)?;
            let root = InternalNode {
                page_id: root_id,
                parent: None,
                keys: vec![separator],
                children: vec![left_id, right_id],
            };
            pending.stage(Node::Internal(root));
            self.reparent(&[left_id, right_id], root_id, pending)?;
            pending.new_root = Some(root_id);
            return Ok(());
        };

        let mut parent = self.load(pending, parent_id)?.into_internal()?;
        let pos = parent
            .children
            .iter()
            .position(|child| *child == left_id)
            .ok_or_else(|| {
                StorageError::Corruption(format!(
                    "node {left_id} is not a child of its parent {parent_id}"
                ))
            })?;
        parent.keys.insert(pos, separator);
        parent.children.insert(pos + 1, right_id);

        if parent.keys.len() >= self.degree {
            self.split_internal(parent, pending)
        } else {
            pending.stage(Node::Internal(parent));
            Ok(())
        }
    }

    fn reparent(
        &mut self,
        children: &[PageId],
        parent_id: PageId,
        pending: &mut PendingWrites<K, V>,
    ) -> Result<()> {
        for child_id in children {
            let mut child = self.load(pending, *child_id)?;
            child.set_parent(Some(parent_id));
            pending.stage(child);
        }
        Ok(())
    }

    /// The staged copy of a node if there is one, else the stored one.
    fn load(&mut self, pending: &PendingWrites<K, V>, page_id: PageId) -> Result<Node<K, V>> {
        match pending.get(page_id) {
            Some(node) => Ok(node.clone()),
            None => self.nodes.fetch(page_id),
        }
    }

    fn allocate_pending(&mut self, pending: &mut PendingWrites<K, V>) -> Result<PageId> {
        let page_id = self.nodes.allocate()?;
        pending.allocated.push(page_id);
        Ok(page_id)
    }

    fn check_pending(&self, pending: &PendingWrites<K, V>) -> Result<()> {
        pending.nodes.iter().try_for_each(|node| self.nodes.check(node))
    }

    fn commit(&mut self, pending: PendingWrites<K, V>) -> Result<()> {
        for node in pending.nodes {
            self.nodes.persist(node)?;
        }
        if let Some(root_id) = pending.new_root {
            self.set_root(root_id);
        }
        Ok(())
    }

    fn abandon(&mut self, pending: PendingWrites<K, V>) {
        for page_id in pending.allocated.into_iter().rev() {
            if let Err(err) = self.nodes.release(page_id) {
                warn!(page_id, error = %err, "failed to release page of abandoned split");
            }
        }
    }

    fn set_root(&mut self, root_id: PageId) {
        self.root = root_id;
        match self.binding.as_mut() {
            Some(binding) => {
                debug!(tree = %binding.tree_name, root = root_id, "root changed");
                binding
                    .listener
                    .on_root_changed(&binding.tree_name, root_id);
            }
            None => debug!(root = root_id, "root changed"),
        }
    }
}

impl<K, V, R> fmt::Debug for BPlusTree<K, V, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BPlusTree")
            .field("root", &self.root)
            .field("degree", &self.degree)
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

/// Forward-only iterator over a tree's entries, one leaf at a time.
///
/// Stops after the first error.
pub struct Scan<'t, K, V, R> {
    nodes: &'t mut R,
    next_leaf: Option<PageId>,
    pending: std::vec::IntoIter<Entry<K, V>>,
}

impl<K, V, R: NodeResolver<K, V>> Iterator for Scan<'_, K, V, R> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.next() {
                return Some(Ok((entry.key, entry.value)));
            }
            let leaf_id = self.next_leaf.take()?;
            match self.nodes.fetch(leaf_id).and_then(Node::into_leaf) {
                Ok(leaf) => {
                    self.next_leaf = leaf.next;
                    self.pending = leaf.entries.into_iter();
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn tree_with(degree: usize, keys: &[i32]) -> InMemoryBPlusTree<i32, String> {
        let mut tree = BPlusTree::new(degree).unwrap();
        for key in keys {
            tree.insert(*key, format!("v{key}")).unwrap();
        }
        tree
    }

    fn keys_in_order(tree: &mut InMemoryBPlusTree<i32, String>) -> Vec<i32> {
        tree.scan()
            .unwrap()
            .map(|item| item.unwrap().0)
            .collect()
    }

    fn leaf_keys(tree: &mut InMemoryBPlusTree<i32, String>, page_id: PageId) -> Vec<i32> {
        tree.read_node(page_id)
            .unwrap()
            .into_leaf()
            .unwrap()
            .keys()
            .copied()
            .collect()
    }

    #[test]
    fn empty_tree_search_finds_nothing() {
        let mut tree = tree_with(3, &[]);
        let root = tree.root_page_id();
        assert_eq!(tree.search(&1).unwrap(), None);
        assert!(!tree.delete(&1).unwrap());
        assert_eq!(tree.root_page_id(), root);
        assert_eq!(tree.height().unwrap(), 1);
        assert_eq!(keys_in_order(&mut tree), Vec::<i32>::new());
    }

    #[test]
    fn rejects_degree_below_two() {
        let err = InMemoryBPlusTree::<i32, String>::new(1).unwrap_err();
        assert!(matches!(err, StorageError::InvalidDegree(1)));
    }

    #[test]
    fn insert_and_search_without_split() {
        let mut tree = tree_with(10, &[5, 1, 3]);
        assert_eq!(tree.search(&3).unwrap().as_deref(), Some("v3"));
        assert_eq!(tree.search(&4).unwrap(), None);
        assert_eq!(tree.height().unwrap(), 1);
    }

    #[test]
    fn first_leaf_split_promotes_middle_key() {
        let mut tree = tree_with(3, &[10, 30, 20]);

        let root = tree
            .read_node(tree.root_page_id())
            .unwrap()
            .into_internal()
            .unwrap();
        assert_eq!(root.keys, vec![20]);
        assert_eq!(root.children.len(), 2);
        assert_eq!(leaf_keys(&mut tree, root.children[0]), vec![10]);
        assert_eq!(leaf_keys(&mut tree, root.children[1]), vec![20, 30]);

        for key in [10, 20, 30] {
            assert_eq!(tree.search(&key).unwrap(), Some(format!("v{key}")));
        }
    }

    #[test]
    fn cascading_split_grows_height() {
        let mut tree = tree_with(3, &[10, 20, 30, 40, 50, 60, 5]);

        let root = tree
            .read_node(tree.root_page_id())
            .unwrap()
            .into_internal()
            .unwrap();
        assert_eq!(root.keys, vec![30]);
        for child in &root.children {
            let child = tree.read_node(*child).unwrap();
            assert!(!child.is_leaf());
            assert_eq!(child.parent(), Some(root.page_id));
        }
        assert_eq!(tree.height().unwrap(), 3);
        assert_eq!(keys_in_order(&mut tree), vec![5, 10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn sibling_chain_is_doubly_linked() {
        let mut tree = tree_with(3, &(1..=20).collect::<Vec<_>>());

        let mut page_id = tree.leftmost_leaf().unwrap();
        let first = tree.read_node(page_id).unwrap().into_leaf().unwrap();
        assert_eq!(first.previous, None);

        let mut visited = 1;
        let mut current = first;
        while let Some(next_id) = current.next {
            let next = tree.read_node(next_id).unwrap().into_leaf().unwrap();
            assert_eq!(next.previous, Some(page_id));
            assert!(current.keys().last() < next.keys().next());
            page_id = next_id;
            current = next;
            visited += 1;
        }
        assert!(visited > 5);
    }

    #[test]
    fn interior_insert_relinks_old_next_neighbour() {
        // Fill the left leaf after a split so it splits again in front of
        // an existing right neighbour.
        let mut tree = tree_with(3, &[10, 20, 30, 11, 12]);
        assert_eq!(keys_in_order(&mut tree), vec![10, 11, 12, 20, 30]);

        let leftmost = tree.leftmost_leaf().unwrap();
        let mut ids = vec![leftmost];
        let mut current = tree.read_node(leftmost).unwrap().into_leaf().unwrap();
        while let Some(next) = current.next {
            let node = tree.read_node(next).unwrap().into_leaf().unwrap();
            assert_eq!(node.previous, ids.last().copied());
            ids.push(next);
            current = node;
        }
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn delete_removes_without_rebalancing() {
        let mut tree = tree_with(3, &[10, 20, 30, 40]);
        let root_before = tree.root_page_id();

        assert!(tree.delete(&20).unwrap());
        assert!(!tree.delete(&20).unwrap());
        assert_eq!(tree.search(&20).unwrap(), None);
        assert_eq!(tree.root_page_id(), root_before);
        assert_eq!(keys_in_order(&mut tree), vec![10, 30, 40]);
    }

    #[test]
    fn values_follow_key_order() {
        let mut tree = tree_with(4, &[9, 2, 7, 4, 1, 8, 3, 6, 5]);
        let values: Vec<String> = tree.values().unwrap().map(|v| v.unwrap()).collect();
        let expected: Vec<String> = (1..=9).map(|k| format!("v{k}")).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn duplicate_keys_are_kept_in_insertion_order() {
        let mut tree: InMemoryBPlusTree<i32, &str> = BPlusTree::new(4).unwrap();
        tree.insert(1, "first").unwrap();
        tree.insert(1, "second").unwrap();
        assert_eq!(tree.search(&1).unwrap(), Some("first"));
        let all: Vec<&str> = tree.values().unwrap().map(|v| v.unwrap()).collect();
        assert_eq!(all, vec!["first", "second"]);
    }

    #[test]
    fn duplicates_split_across_leaves_return_the_first() {
        let mut tree: InMemoryBPlusTree<i32, &str> = BPlusTree::new(3).unwrap();
        for value in ["a", "b", "c"] {
            tree.insert(5, value).unwrap();
        }
        assert_eq!(tree.height().unwrap(), 2);
        assert_eq!(tree.search(&5).unwrap(), Some("a"));

        assert!(tree.delete(&5).unwrap());
        assert_eq!(tree.search(&5).unwrap(), Some("b"));
        let rest: Vec<&str> = tree.values().unwrap().map(|v| v.unwrap()).collect();
        assert_eq!(rest, vec!["b", "c"]);
    }

    #[test]
    fn lookup_continues_past_a_leaf_without_the_key() {
        // [3] | [5, 5] under separator 5: a left-leaning lookup lands on
        // the left leaf first.
        let mut tree: InMemoryBPlusTree<i32, i32> = BPlusTree::new(3).unwrap();
        for (key, value) in [(3, 0), (5, 1), (5, 2)] {
            tree.insert(key, value).unwrap();
        }
        assert_eq!(tree.search(&5).unwrap(), Some(1));
        assert_eq!(tree.search(&4).unwrap(), None);
        assert_eq!(tree.search(&6).unwrap(), None);
    }

    #[test]
    fn listener_sees_every_root_change() {
        let seen: Rc<RefCell<Vec<(String, PageId)>>> = Rc::default();
        let log = Rc::clone(&seen);
        let binding = RootBinding::new("numbers", move |name: &str, root: PageId| {
            log.borrow_mut().push((name.to_string(), root));
        });

        let mut tree: InMemoryBPlusTree<i32, i32> =
            BPlusTree::from_resolver(NodeArena::new(), 0, 3, Some(binding)).unwrap();
        assert_eq!(seen.borrow().len(), 1);

        for key in 0..3 {
            tree.insert(key, key).unwrap();
        }
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], ("numbers".to_string(), tree.root_page_id()));
    }
}
