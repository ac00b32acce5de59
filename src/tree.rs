//! The tree handle: descent, copy-on-write mutation and root installation.
//!
//! A mutation never edits a stored page. Inserting or deleting a key rebuilds
//! every node on the path from the leaf to the root, stores the new nodes
//! under new page ids and finally swaps the root id. Until the swap, every
//! reader holding the old root sees the old tree. The pages of the old path
//! are freed only after the swap, and only if `TreeSettings::reclaim_pages` is
//! set; otherwise they are handed back through `BTree::take_retired` for the
//! caller to free once no reader can still reach them.
use std::mem;

use crate::builder;
use crate::constants::*;
use crate::errors::{Error, Result};
use crate::lookup::{lookup_eq, lookup_le};
use crate::node::{Node, NodeType};
use crate::page::{PageId, NULL_PAGE};
use crate::store::PageStore;

/// Options of a tree handle.
#[derive(Debug, Clone, Copy)]
pub struct TreeSettings {
    /// Free the pages a mutation made unreachable as soon as the new root is
    /// installed. Turn it off when readers may still hold older roots.
    pub reclaim_pages: bool,
}

impl Default for TreeSettings {
    fn default() -> TreeSettings {
        TreeSettings { reclaim_pages: true }
    }
}

/// A copy-on-write B+tree over a page store.
///
/// The leftmost leaf always starts with the empty key. It sorts before every
/// other key, so descent never needs a "smaller than everything" case; in
/// exchange the empty key cannot be stored.
#[derive(Debug)]
pub struct BTree<S> {
    store: S,
    root: PageId,
    settings: TreeSettings,
    retired: Vec<PageId>,
}

impl<S: PageStore> BTree<S> {
    /// An empty tree.
    pub fn new(store: S) -> BTree<S> {
        BTree::open(store, NULL_PAGE, TreeSettings::default())
    }

    /// A tree rooted at `root`, which must be `NULL_PAGE` or a root page
    /// previously installed by a tree over the same store.
    pub fn open(store: S, root: PageId, settings: TreeSettings) -> BTree<S> {
        BTree {
            store: store,
            root: root,
            settings: settings,
            retired: Vec::new(),
        }
    }

    /// The current root page id, `NULL_PAGE` for an empty tree.
    pub fn root(&self) -> PageId {
        self.root
    }

    /// The underlying page store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The underlying page store, mutably. Pages reachable from the root
    /// must not be freed through it.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consume the handle, returning the page store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Pages made unreachable by mutations since the last call, when
    /// `reclaim_pages` is off.
    pub fn take_retired(&mut self) -> Vec<PageId> {
        mem::replace(&mut self.retired, Vec::new())
    }

    /// Looks up `key` in the current tree.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_at(self.root, key)
    }

    /// Looks up `key` in the tree rooted at `root`, which may be an older root
    /// whose pages have not been freed yet.
    pub fn get_at(&self, root: PageId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if root == NULL_PAGE {
            return Ok(None);
        }

        let mut id = root;
        loop {
            let node = Node::from_page(self.store.fetch(id)?)?;
            match node.node_type() {
                NodeType::Leaf => {
                    return Ok(lookup_eq(&node, key).map(|idx| node.value(idx).to_vec()));
                }
                NodeType::Internal => {
                    check_internal(&node)?;
                    id = node.ptr(lookup_le(&node, key));
                    if id == NULL_PAGE {
                        return Err(Error::CorruptedNode("internal node points at the null page"));
                    }
                }
            }
        }
    }

    /// Inserts `key` or replaces its value. Returns true if the key was not
    /// in the tree before.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<bool> {
        check_key(key)?;
        if val.len() > MAX_VALUE_SIZE {
            return Err(Error::ValueTooLarge(val.len()));
        }

        let root = self.root;
        let (new_root, added, retired) = {
            let mut m = Mutation::new(&mut self.store);
            match insert_root(&mut m, root, key, val) {
                Ok((new_root, added)) => {
                    let retired = m.commit();
                    (new_root, added, retired)
                }
                Err(err) => {
                    m.rollback();
                    return Err(err);
                }
            }
        };
        self.install(new_root, retired);
        Ok(added)
    }

    /// Removes `key`. Returns false if it was not in the tree.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        check_key(key)?;

        let root = self.root;
        let (new_root, retired) = {
            let mut m = Mutation::new(&mut self.store);
            match delete_root(&mut m, root, key) {
                Ok(Some(new_root)) => (new_root, m.commit()),
                Ok(None) => return Ok(false),
                Err(err) => {
                    m.rollback();
                    return Err(err);
                }
            }
        };
        self.install(new_root, retired);
        Ok(true)
    }

    fn install(&mut self, root: PageId, retired: Vec<PageId>) {
        debug!("installing root {} (was {}), {} pages retired",
               root,
               self.root,
               retired.len());
        self.root = root;

        if !self.settings.reclaim_pages {
            self.retired.extend(retired);
            return;
        }
        for id in retired {
            if let Err(err) = self.store.free(id) {
                warn!("failed to free retired page {}: {}", id, err);
            }
        }
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::EmptyKey);
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(Error::KeyTooLarge(key.len()));
    }
    Ok(())
}

fn check_internal(node: &Node) -> Result<()> {
    if node.key_count() == 0 {
        return Err(Error::CorruptedNode("internal node without children"));
    }
    Ok(())
}

// Pages allocated and made unreachable by one mutation. Nothing is freed until
// the mutation either commits or rolls back.
struct Mutation<'a, S: 'a> {
    store: &'a mut S,
    allocated: Vec<PageId>,
    retired: Vec<PageId>,
}

impl<'a, S: PageStore> Mutation<'a, S> {
    fn new(store: &'a mut S) -> Mutation<'a, S> {
        Mutation {
            store: store,
            allocated: Vec::new(),
            retired: Vec::new(),
        }
    }

    fn fetch(&self, id: PageId) -> Result<Node> {
        Node::from_page(self.store.fetch(id)?)
    }

    fn store_node(&mut self, node: &Node) -> Result<PageId> {
        let id = self.store.allocate(node.page_bytes())?;
        self.allocated.push(id);
        Ok(id)
    }

    // Stores nodes produced by a split, returning each page id with the
    // node's first key.
    fn store_all(&mut self, nodes: &[Node]) -> Result<Vec<(PageId, Vec<u8>)>> {
        let mut kids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = self.store_node(node)?;
            kids.push((id, node.key(0).to_vec()));
        }
        Ok(kids)
    }

    fn retire(&mut self, id: PageId) {
        self.retired.push(id);
    }

    fn commit(self) -> Vec<PageId> {
        self.retired
    }

    fn rollback(self) {
        for id in self.allocated {
            if let Err(err) = self.store.free(id) {
                warn!("failed to free page {} while rolling back: {}", id, err);
            }
        }
    }
}

// Stores the nodes of a rebuilt root. More than one node means the root was
// split, and a new root one level up is created over them.
fn store_root<S: PageStore>(m: &mut Mutation<S>, nodes: Vec<Node>) -> Result<PageId> {
    if nodes.len() == 1 {
        return m.store_node(&nodes[0]);
    }

    let kids = m.store_all(&nodes)?;
    let mut root = Node::new();
    root.set_header(NodeType::Internal, kids.len() as u16);
    for (i, (id, key)) in kids.iter().enumerate() {
        builder::append_kv(&mut root, i as u16, *id, key, &[]);
    }
    debug!("root split in {}, tree grows one level", kids.len());
    m.store_node(&root)
}

fn insert_root<S: PageStore>(m: &mut Mutation<S>,
                             root: PageId,
                             key: &[u8],
                             val: &[u8])
                             -> Result<(PageId, bool)> {
    if root == NULL_PAGE {
        let mut leaf = Node::new();
        leaf.set_header(NodeType::Leaf, 2);
        builder::append_kv(&mut leaf, 0, 0, &[], &[]);
        builder::append_kv(&mut leaf, 1, 0, key, val);
        return Ok((m.store_node(&leaf)?, true));
    }

    let node = m.fetch(root)?;
    let (updated, added) = tree_insert(m, &node, key, val)?;
    m.retire(root);
    let new_root = store_root(m, builder::split(updated))?;
    Ok((new_root, added))
}

// Returns the replacement for `node` with `key` inserted. The result may be
// larger than a page; the caller splits it.
fn tree_insert<S: PageStore>(m: &mut Mutation<S>,
                             node: &Node,
                             key: &[u8],
                             val: &[u8])
                             -> Result<(Node, bool)> {
    let mut new = Node::with_capacity(2 * PAGE_SIZE);
    let idx = lookup_le(node, key);
    match node.node_type() {
        NodeType::Leaf => {
            if node.key_count() > 0 && node.key(idx) == key {
                builder::leaf_update(&mut new, node, idx, key, val);
                Ok((new, false))
            } else {
                let at = if node.key_count() == 0 { 0 } else { idx + 1 };
                builder::leaf_insert(&mut new, node, at, key, val);
                Ok((new, true))
            }
        }
        NodeType::Internal => {
            check_internal(node)?;
            let kid_id = node.ptr(idx);
            let kid = m.fetch(kid_id)?;
            let (updated, added) = tree_insert(m, &kid, key, val)?;
            m.retire(kid_id);
            let kids = m.store_all(&builder::split(updated))?;
            builder::replace_kids(&mut new, node, idx, &kids);
            Ok((new, added))
        }
    }
}

fn delete_root<S: PageStore>(m: &mut Mutation<S>,
                             root: PageId,
                             key: &[u8])
                             -> Result<Option<PageId>> {
    if root == NULL_PAGE {
        return Ok(None);
    }

    let node = m.fetch(root)?;
    let updated = match tree_delete(m, &node, key)? {
        Some(updated) => updated,
        None => return Ok(None),
    };
    m.retire(root);

    if updated.node_type() == NodeType::Internal {
        match updated.key_count() {
            0 => return Ok(Some(NULL_PAGE)),
            1 => return collapse_root(m, updated.ptr(0)).map(Some),
            _ => {}
        }
    }
    store_root(m, builder::split(updated)).map(Some)
}

// Drops internal levels with a single child from the top of the tree.
fn collapse_root<S: PageStore>(m: &mut Mutation<S>, mut root: PageId) -> Result<PageId> {
    let mut levels = 1;
    loop {
        let node = m.fetch(root)?;
        if node.node_type() != NodeType::Internal || node.key_count() != 1 {
            break;
        }
        m.retire(root);
        root = node.ptr(0);
        levels += 1;
    }
    debug!("root has a single child, tree shrinks by {} levels", levels);
    Ok(root)
}

// Returns the replacement for `node` with `key` removed, or None if the key is
// not in the subtree.
fn tree_delete<S: PageStore>(m: &mut Mutation<S>,
                             node: &Node,
                             key: &[u8])
                             -> Result<Option<Node>> {
    match node.node_type() {
        NodeType::Leaf => {
            let idx = match lookup_eq(node, key) {
                Some(idx) => idx,
                None => return Ok(None),
            };
            let mut new = Node::new();
            builder::node_delete(&mut new, node, idx);
            Ok(Some(new))
        }
        NodeType::Internal => {
            check_internal(node)?;
            internal_delete(m, node, lookup_le(node, key), key)
        }
    }
}

enum Sibling {
    Left(Node),
    Right(Node),
    None,
}

fn internal_delete<S: PageStore>(m: &mut Mutation<S>,
                                 node: &Node,
                                 idx: u16,
                                 key: &[u8])
                                 -> Result<Option<Node>> {
    let kid_id = node.ptr(idx);
    let kid = m.fetch(kid_id)?;
    let updated = match tree_delete(m, &kid, key)? {
        Some(updated) => updated,
        None => return Ok(None),
    };
    m.retire(kid_id);

    // The first key of the kid may have changed and grown, so the parent can
    // overflow even on delete.
    let mut new = Node::with_capacity(2 * PAGE_SIZE);
    match should_merge(m, node, idx, &updated)? {
        Sibling::Left(sibling) => {
            let mut merged = Node::new();
            builder::merge(&mut merged, &sibling, &updated);
            m.retire(node.ptr(idx - 1));
            let id = m.store_node(&merged)?;
            builder::replace_two_kids(&mut new, node, idx - 1, id, merged.key(0));
            debug!("merged child {} into its left sibling", idx);
        }
        Sibling::Right(sibling) => {
            let mut merged = Node::new();
            builder::merge(&mut merged, &updated, &sibling);
            m.retire(node.ptr(idx + 1));
            let id = m.store_node(&merged)?;
            builder::replace_two_kids(&mut new, node, idx, id, merged.key(0));
            debug!("merged child {} with its right sibling", idx);
        }
        Sibling::None if updated.key_count() == 0 => {
            builder::node_delete(&mut new, node, idx);
        }
        Sibling::None => {
            let kids = m.store_all(&builder::split(updated))?;
            builder::replace_kids(&mut new, node, idx, &kids);
        }
    }
    Ok(Some(new))
}

// Picks the sibling an underflowing child should be merged with, if any.
fn should_merge<S: PageStore>(m: &Mutation<S>,
                              node: &Node,
                              idx: u16,
                              updated: &Node)
                              -> Result<Sibling> {
    if updated.nbytes() > MERGE_THRESHOLD {
        return Ok(Sibling::None);
    }
    if idx > 0 {
        let sibling = m.fetch(node.ptr(idx - 1))?;
        if sibling.nbytes() + updated.nbytes() - HEADER_SIZE <= PAGE_SIZE {
            return Ok(Sibling::Left(sibling));
        }
    }
    if idx + 1 < node.key_count() {
        let sibling = m.fetch(node.ptr(idx + 1))?;
        if sibling.nbytes() + updated.nbytes() - HEADER_SIZE <= PAGE_SIZE {
            return Ok(Sibling::Right(sibling));
        }
    }
    Ok(Sibling::None)
}
