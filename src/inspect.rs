//! Read-only views of a tree's internal shape.
//!
//! These functions walk the node arena of a [`BPlusTree`] without mutating it. They exist for
//! tests, debugging and tooling: dumping keys level by level, rendering the tree as text,
//! exporting a serializable snapshot and checking the structural invariants.
//!
//! ```
//! use bplus_index::{BPlusTree, inspect};
//!
//! let mut tree = BPlusTree::new(5);
//! for key in 1..=6 {
//!     tree.insert(key, key).unwrap();
//! }
//!
//! assert_eq!(inspect::leaf_keys(&tree), [vec![1, 2], vec![3, 4, 5, 6]]);
//! assert_eq!(inspect::render_levels(&tree), ["* * * * * 2 6 * * * * *", "* * 1 2 * * 3 4 5 6 * *"]);
//! assert!(inspect::validate(&tree).is_ok());
//! ```

use core::borrow::Borrow;
use core::fmt::{self, Display};

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use serde::Serialize;

use crate::BPlusTree;
use crate::raw::{Entry, Handle, Node, NodeKind, RawBPlusTree};

/// Nodes grouped by level, root first, each level ordered left to right.
///
/// Built by following child handles only, so it is independent of the sibling links.
fn levels<K, V>(raw: &RawBPlusTree<K, V>) -> Vec<Vec<&Node<K, V>>> {
    let mut levels = Vec::new();
    let mut frontier: Vec<Handle> = raw.root().into_iter().collect();

    while !frontier.is_empty() {
        let nodes: Vec<&Node<K, V>> = frontier.iter().map(|&h| raw.node(h)).collect();
        frontier = nodes.iter().flat_map(|node| node.children()).collect();
        levels.push(nodes);
    }

    levels
}

fn keys<K: Clone, V>(node: &Node<K, V>) -> Vec<K> {
    node.entries().iter().map(|e| e.key.clone()).collect()
}

/// Keys of every node, level by level from the root down.
///
/// Returns an empty vector for an empty tree.
pub fn level_keys<K: Clone, V>(tree: &BPlusTree<K, V>) -> Vec<Vec<Vec<K>>> {
    levels(tree.raw())
        .into_iter()
        .map(|level| level.into_iter().map(keys).collect())
        .collect()
}

/// Keys of every leaf, left to right.
///
/// # Examples
///
/// ```
/// use bplus_index::{BPlusTree, inspect};
///
/// let mut tree = BPlusTree::new(5);
/// for key in [1, 20, 30, 40, 50, 3, 4, 2, 5] {
///     tree.insert(key, ()).unwrap();
/// }
/// assert_eq!(inspect::leaf_keys(&tree), [vec![1, 2, 3, 4], vec![5, 20], vec![30, 40, 50]]);
/// ```
pub fn leaf_keys<K: Clone, V>(tree: &BPlusTree<K, V>) -> Vec<Vec<K>> {
    levels(tree.raw())
        .pop()
        .map(|leaves| leaves.into_iter().map(keys).collect())
        .unwrap_or_default()
}

/// Formats one level: `gap` stars, then each node's keys followed by `gap` stars.
fn render_level<K: Display, V>(level: &[&Node<K, V>], leaf_entries: usize) -> String {
    let entries: usize = level.iter().map(|node| node.len()).sum();
    let gap = (leaf_entries * 2).saturating_sub(entries) / (level.len() + 1);

    let mut tokens: Vec<String> = vec![String::from("*"); gap];
    for node in level {
        for entry in node.entries() {
            tokens.push(entry.key.to_string());
        }
        tokens.extend(core::iter::repeat_n(String::from("*"), gap));
    }
    tokens.join(" ")
}

/// Renders every level as one line of keys, padded with `*` so the levels line up roughly
/// above each other.
///
/// # Examples
///
/// ```
/// use bplus_index::{BPlusTree, inspect};
///
/// let mut tree = BPlusTree::new(5);
/// assert!(inspect::render_levels(&tree).is_empty());
///
/// for key in 1..=6 {
///     tree.insert(key, ()).unwrap();
/// }
/// for line in inspect::render_levels(&tree) {
///     println!("{line}");
/// }
/// ```
pub fn render_levels<K: Display, V>(tree: &BPlusTree<K, V>) -> Vec<String> {
    let levels = levels(tree.raw());
    let leaf_entries = tree.count();
    levels.iter().map(|level| render_level(level, leaf_entries)).collect()
}

/// Renders the leaf level only, in the same format as [`render_levels`].
pub fn render_leaves<K: Display, V>(tree: &BPlusTree<K, V>) -> String {
    levels(tree.raw())
        .last()
        .map(|leaves| render_level(leaves, tree.count()))
        .unwrap_or_default()
}

/// Number of branch nodes a lookup for `key` passes through before reaching its leaf.
///
/// This is the tree height minus one for every key; it is `0` for an empty tree or a tree
/// whose root is a leaf.
pub fn depth_of<K, V, Q>(tree: &BPlusTree<K, V>, key: &Q) -> usize
where
    K: Borrow<Q>,
    Q: ?Sized + Ord,
{
    let raw = tree.raw();
    let mut hops = 0;
    let mut current = raw.root();

    while let Some(handle) = current {
        let node = raw.node(handle);
        if node.is_leaf() {
            break;
        }
        current = Some(node.child(node.route(key)));
        hops += 1;
    }

    hops
}

/// A serializable picture of the whole tree.
#[derive(Debug, Serialize)]
pub struct TreeSnapshot<'a, K, V> {
    /// The root node.
    pub root: NodeSnapshot<'a, K, V>,
    /// The tree's rank.
    pub rank: usize,
    /// Number of keys in the tree.
    pub count: usize,
    /// Every node, level by level from the root down.
    pub level: Vec<Vec<NodeSnapshot<'a, K, V>>>,
}

/// One node of a [`TreeSnapshot`].
#[derive(Debug, Serialize)]
pub struct NodeSnapshot<'a, K, V> {
    /// The node's maximum key, which is also the key its parent stores for it.
    pub id: &'a K,
    /// The node's entries in key order.
    pub meta: Vec<EntrySnapshot<'a, K, V>>,
}

/// One entry of a [`NodeSnapshot`].
#[derive(Debug, Serialize)]
pub struct EntrySnapshot<'a, K, V> {
    /// The entry's key. For a branch entry this equals the child's `id`.
    pub key: &'a K,
    /// The stored value, set for leaf entries only.
    pub value: Option<&'a V>,
    /// The `id` of the child node, set for branch entries only.
    pub children: Option<&'a K>,
}

fn node_snapshot<'a, K, V>(raw: &'a RawBPlusTree<K, V>, node: &'a Node<K, V>) -> NodeSnapshot<'a, K, V> {
    let meta = node
        .entries()
        .iter()
        .map(|entry: &'a Entry<K, V>| EntrySnapshot {
            key: &entry.key,
            value: entry.value(),
            children: entry.child().and_then(|child| raw.node(child).last_key()),
        })
        .collect();

    NodeSnapshot {
        id: node.last_key().expect("node in a settled tree is empty"),
        meta,
    }
}

/// Captures the tree's structure for serialization. Returns `None` for an empty tree.
///
/// # Examples
///
/// ```
/// use bplus_index::{BPlusTree, inspect};
///
/// let mut tree = BPlusTree::new(5);
/// assert!(inspect::snapshot(&tree).is_none());
///
/// for key in 1..=6 {
///     tree.insert(key, key * 10).unwrap();
/// }
/// let snapshot = inspect::snapshot(&tree).unwrap();
/// assert_eq!(*snapshot.root.id, 6);
/// assert_eq!(snapshot.level.len(), 2);
/// assert_eq!(snapshot.level[1][0].meta[1].value, Some(&20));
/// ```
#[must_use]
pub fn snapshot<K, V>(tree: &BPlusTree<K, V>) -> Option<TreeSnapshot<'_, K, V>> {
    let raw = tree.raw();
    let root = raw.node(raw.root()?);

    Some(TreeSnapshot {
        root: node_snapshot(raw, root),
        rank: raw.rank(),
        count: raw.len(),
        level: levels(raw)
            .into_iter()
            .map(|level| level.into_iter().map(|node| node_snapshot(raw, node)).collect())
            .collect(),
    })
}

/// Checks every structural invariant and returns all violations found.
///
/// The checks cover node sizes, key order within and across nodes, branch keys matching the
/// maximum of their subtree, parent handles, the sibling links on every level, the key count
/// and that no node is left unreachable in the arena.
///
/// # Errors
///
/// Returns one human-readable message per violation.
pub fn validate<K: Ord + Clone + fmt::Debug, V>(tree: &BPlusTree<K, V>) -> Result<(), Vec<String>> {
    let errors = violations(tree.raw());
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

pub(crate) fn violations<K: Ord + Clone + fmt::Debug, V>(raw: &RawBPlusTree<K, V>) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();

    let Some(root) = raw.root() else {
        if raw.len() != 0 {
            errors.push(alloc::format!("empty tree reports len {}", raw.len()));
        }
        if raw.node_count() != 0 {
            errors.push(alloc::format!("empty tree still holds {} nodes", raw.node_count()));
        }
        return errors;
    };

    if raw.node(root).parent().is_some() {
        errors.push(alloc::format!("root {root:?} has a parent"));
    }

    let mut rows: Vec<Vec<Handle>> = Vec::new();
    let mut leaf_depth = None;
    check_node(raw, root, 0, &mut leaf_depth, &mut rows, &mut errors);

    for (depth, row) in rows.iter().enumerate() {
        check_links(raw, depth, row, &mut errors);
    }

    let leaves = rows.last().map(Vec::as_slice).unwrap_or_default();
    let mut previous: Option<&K> = None;
    let mut count = 0;
    for &leaf in leaves {
        for entry in raw.node(leaf).entries() {
            if previous.is_some_and(|prev| prev >= &entry.key) {
                errors.push(alloc::format!("leaf keys out of order at {:?} in {leaf:?}", entry.key));
            }
            previous = Some(&entry.key);
            count += 1;
        }
    }
    if count != raw.len() {
        errors.push(alloc::format!("len mismatch: len={}, leaf entries={count}", raw.len()));
    }

    let reachable: usize = rows.iter().map(Vec::len).sum();
    if reachable != raw.node_count() {
        errors.push(alloc::format!("{reachable} reachable nodes, but the arena holds {}", raw.node_count()));
    }

    errors
}

fn check_node<K: Ord + Clone + fmt::Debug, V>(
    raw: &RawBPlusTree<K, V>,
    handle: Handle,
    depth: usize,
    leaf_depth: &mut Option<usize>,
    rows: &mut Vec<Vec<Handle>>,
    errors: &mut Vec<String>,
) {
    let node = raw.node(handle);
    if rows.len() <= depth {
        rows.push(Vec::new());
    }
    rows[depth].push(handle);

    let is_root = node.parent().is_none();
    let len = node.len();
    if len >= raw.rank() {
        errors.push(alloc::format!("{handle:?} holds {len} entries, rank is {}", raw.rank()));
    }
    if is_root {
        if len == 0 || (!node.is_leaf() && len < 2) {
            errors.push(alloc::format!("root {handle:?} holds only {len} entries"));
        }
    } else if len < raw.min_keys() {
        errors.push(alloc::format!("{handle:?} holds {len} entries, minimum is {}", raw.min_keys()));
    }

    if node.entries().windows(2).any(|pair| pair[0].key >= pair[1].key) {
        errors.push(alloc::format!("{handle:?} keys are not strictly increasing"));
    }

    match node.kind() {
        NodeKind::Leaf => match *leaf_depth {
            None => *leaf_depth = Some(depth),
            Some(expected) if expected != depth => {
                errors.push(alloc::format!("leaf {handle:?} at depth {depth}, expected {expected}"));
            }
            Some(_) => {}
        },
        NodeKind::Branch => {
            for entry in node.entries() {
                let Some(child) = entry.child() else {
                    errors.push(alloc::format!("branch {handle:?} holds a value entry"));
                    continue;
                };
                let child_node = raw.node(child);
                if child_node.parent() != Some(handle) {
                    errors.push(alloc::format!(
                        "{child:?} parent is {:?}, expected {handle:?}",
                        child_node.parent()
                    ));
                }
                if child_node.last_key() != Some(&entry.key) {
                    errors.push(alloc::format!(
                        "{handle:?} key {:?} does not match child {child:?} max {:?}",
                        entry.key,
                        child_node.last_key()
                    ));
                }
                check_node(raw, child, depth + 1, leaf_depth, rows, errors);
            }
        }
    }
}

fn check_links<K, V>(raw: &RawBPlusTree<K, V>, depth: usize, row: &[Handle], errors: &mut Vec<String>) {
    for (i, &handle) in row.iter().enumerate() {
        let node = raw.node(handle);
        let expected_left = i.checked_sub(1).map(|j| row[j]);
        let expected_right = row.get(i + 1).copied();
        if node.left() != expected_left {
            errors.push(alloc::format!(
                "level {depth}: {handle:?} left is {:?}, expected {expected_left:?}",
                node.left()
            ));
        }
        if node.right() != expected_right {
            errors.push(alloc::format!(
                "level {depth}: {handle:?} right is {:?}, expected {expected_right:?}",
                node.right()
            ));
        }
    }
}
