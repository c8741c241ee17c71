use core::borrow::Borrow;

use alloc::vec::Vec;
use smallvec::SmallVec;
use tracing::trace;

use super::arena::Arena;
use super::handle::Handle;
use super::node::{Entry, INLINE_ENTRIES, Node, NodeKind, SearchResult};
use crate::error::Error;

/// Smallest rank for which a split root still fits in `rank - 1` entries.
pub(crate) const MIN_RANK: usize = 3;

/// The core B+Tree implementation backing `BPlusTree`.
#[derive(Clone)]
pub(crate) struct RawBPlusTree<K, V> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K, V>>,
    /// Handle to the root node, if the tree is non-empty.
    root: Option<Handle>,
    /// Total number of key-value pairs in the tree.
    len: usize,
    /// A node holds at most `rank - 1` entries.
    rank: usize,
    /// `rank / 2`, the fewest entries a non-root node may hold.
    min_keys: usize,
}

impl<K, V> RawBPlusTree<K, V> {
    /// Creates a new, empty tree. `rank` must already be validated.
    pub(crate) const fn new(rank: usize) -> Self {
        debug_assert!(rank >= MIN_RANK);
        Self {
            nodes: Arena::new(),
            root: None,
            len: 0,
            rank,
            min_keys: rank / 2,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) const fn rank(&self) -> usize {
        self.rank
    }

    pub(crate) const fn min_keys(&self) -> usize {
        self.min_keys
    }

    pub(crate) const fn root(&self) -> Option<Handle> {
        self.root
    }

    pub(crate) fn node(&self, handle: Handle) -> &Node<K, V> {
        self.nodes.get(handle)
    }

    #[cfg(test)]
    pub(crate) fn node_mut(&mut self, handle: Handle) -> &mut Node<K, V> {
        self.nodes.get_mut(handle)
    }

    /// Number of live nodes in the arena.
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Discards every node.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.len = 0;
    }

    /// Leftmost leaf, the start of the leaf chain.
    pub(crate) fn first_leaf(&self) -> Option<Handle> {
        let mut current = self.root?;
        while !self.nodes.get(current).is_leaf() {
            current = self.nodes.get(current).child(0);
        }
        Some(current)
    }

    /// Rightmost leaf, the end of the leaf chain.
    pub(crate) fn last_leaf(&self) -> Option<Handle> {
        let mut current = self.root?;
        loop {
            let node = self.nodes.get(current);
            if node.is_leaf() {
                return Some(current);
            }
            current = node.child(node.len() - 1);
        }
    }

    /// Points every child of `parent` back at it after entries moved between nodes.
    fn adopt_children(&mut self, parent: Handle) {
        let children: SmallVec<[Handle; INLINE_ENTRIES]> = self.nodes.get(parent).children().collect();
        for child in children {
            self.nodes.get_mut(child).set_parent(Some(parent));
        }
    }
}

impl<K: Ord + Clone, V> RawBPlusTree<K, V> {
    /// Returns the leaf a lookup for `key` lands in.
    pub(crate) fn descend<Q>(&self, key: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root?;
        loop {
            let node = self.nodes.get(current);
            if node.is_leaf() {
                return Some(current);
            }
            current = node.child(node.route(key));
        }
    }

    /// Searches for a key and returns the leaf handle and index if found.
    pub(crate) fn search<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf = self.descend(key)?;
        match self.nodes.get(leaf).search(key) {
            SearchResult::Found(idx) => Some((leaf, idx)),
            SearchResult::NotFound(_) => None,
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf, idx) = self.search(key)?;
        Some(self.nodes.get(leaf).value(idx))
    }

    pub(crate) fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf, idx) = self.search(key)?;
        Some(self.nodes.get_mut(leaf).value_mut(idx))
    }

    /// Collects the values whose keys fall in `[min, max]`, walking right along the leaf chain.
    pub(crate) fn range<Q>(&self, min: &Q, max: &Q) -> Vec<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut result = Vec::new();
        let mut current = self.descend(min);

        while let Some(handle) = current {
            let leaf = self.nodes.get(handle);
            for (idx, entry) in leaf.entries().iter().enumerate() {
                let key = entry.key.borrow();
                if key >= min && key <= max {
                    result.push(leaf.value(idx));
                }
                if key >= max {
                    return result;
                }
            }
            current = leaf.right();
        }

        result
    }

    /// Inserts a key-value pair, rejecting keys that are already present.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Result<(), Error> {
        let Some(leaf) = self.descend(&key) else {
            let mut root = Node::new(NodeKind::Leaf);
            root.push(Entry::leaf(key, value));
            self.root = Some(self.nodes.alloc(root));
            self.len = 1;
            return Ok(());
        };

        let node = self.nodes.get_mut(leaf);
        let idx = match node.search(&key) {
            SearchResult::Found(_) => return Err(Error::DuplicateKey),
            SearchResult::NotFound(idx) => idx,
        };
        let new_max = idx == node.len();
        node.insert(idx, Entry::leaf(key, value));
        let full = node.len() >= self.rank;

        if new_max {
            self.propagate_max(leaf);
        }
        if full {
            self.repair_overflow(leaf);
        }
        self.len += 1;
        Ok(())
    }

    /// Rewrites ancestor keys after the maximum of `node` changed.
    ///
    /// Climbing stops at the first ancestor entry that is not the last in its node, because the
    /// maximum above that point is unaffected.
    fn propagate_max(&mut self, mut node: Handle) {
        let Some(max) = self.nodes.get(node).last_key().cloned() else {
            return;
        };

        while let Some(parent) = self.nodes.get(node).parent() {
            let branch = self.nodes.get_mut(parent);
            let idx = branch.position_of(node).expect("parent does not reference child");
            branch.set_key(idx, max.clone());
            if idx + 1 != branch.len() {
                break;
            }
            node = parent;
        }
    }

    /// Brings a node holding `rank` entries back under the limit, shifting one entry into a
    /// neighbour with room before resorting to a split.
    fn repair_overflow(&mut self, handle: Handle) {
        let node = self.nodes.get(handle);
        let (left, right) = (node.left(), node.right());

        if let Some(left) = left
            && self.nodes.get(left).len() + 1 < self.rank
        {
            let entry = self.nodes.get_mut(handle).pop_front().expect("overflowing node is empty");
            self.nodes.get_mut(left).push(entry);
            self.adopt_children(left);
            self.propagate_max(left);
            trace!(node = ?handle, into = ?left, "shifted first entry left");
            return;
        }

        if let Some(right) = right
            && self.nodes.get(right).len() + 1 < self.rank
        {
            let entry = self.nodes.get_mut(handle).pop().expect("overflowing node is empty");
            self.nodes.get_mut(right).push_front(entry);
            self.adopt_children(right);
            self.propagate_max(handle);
            trace!(node = ?handle, into = ?right, "shifted last entry right");
            return;
        }

        self.split(handle);
    }

    /// Splits a full node at `min_keys`, moving the upper part into a new right sibling.
    fn split(&mut self, handle: Handle) {
        let node = self.nodes.get_mut(handle);
        let parent = node.parent();
        let old_right = node.right();
        let mut sibling = Node::with_entries(node.kind(), node.split_off(self.min_keys));
        let left_max = node.last_key().cloned().expect("split left half is empty");
        let right_max = sibling.last_key().cloned().expect("split right half is empty");

        sibling.set_parent(parent);
        sibling.set_left(Some(handle));
        sibling.set_right(old_right);
        let sibling = self.nodes.alloc(sibling);
        self.nodes.get_mut(handle).set_right(Some(sibling));
        if let Some(old_right) = old_right {
            self.nodes.get_mut(old_right).set_left(Some(sibling));
        }
        self.adopt_children(sibling);

        let Some(parent) = parent else {
            let mut root = Node::new(NodeKind::Branch);
            root.push(Entry::branch(left_max, handle));
            root.push(Entry::branch(right_max, sibling));
            let root = self.nodes.alloc(root);
            self.nodes.get_mut(handle).set_parent(Some(root));
            self.nodes.get_mut(sibling).set_parent(Some(root));
            self.root = Some(root);
            trace!(left = ?handle, right = ?sibling, root = ?root, "split root");
            return;
        };

        // The right half keeps the old maximum, so the parent's own maximum is unchanged.
        let branch = self.nodes.get_mut(parent);
        let idx = branch.position_of(handle).expect("parent does not reference child");
        branch.set_key(idx, left_max);
        branch.insert(idx + 1, Entry::branch(right_max, sibling));
        let full = branch.len() >= self.rank;
        trace!(left = ?handle, right = ?sibling, parent = ?parent, "split node");

        if full {
            self.repair_overflow(parent);
        }
    }

    /// Removes a key from the tree and returns its value.
    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf, idx) = self.search(key)?;
        let entry = self.remove_at(leaf, idx);
        self.len -= 1;
        entry.into_value()
    }

    /// Removes one entry from a node and restores the invariants at this level, recursing into
    /// the parent when a merge drops one of its entries.
    fn remove_at(&mut self, handle: Handle, index: usize) -> Entry<K, V> {
        let node = self.nodes.get_mut(handle);
        let was_max = index + 1 == node.len();
        let entry = node.remove(index);
        let remaining = node.len();
        let parent = node.parent();

        if was_max && remaining > 0 {
            self.propagate_max(handle);
        }

        match parent {
            None => self.shrink_root(handle),
            Some(_) if remaining < self.min_keys => self.repair_underflow(handle),
            Some(_) => {}
        }

        entry
    }

    /// Empties the tree once the root leaf has no entries, or hands the root over to the only
    /// child of a branch root. Repeats while the promoted child is itself a one-entry branch.
    fn shrink_root(&mut self, mut root: Handle) {
        if self.nodes.get(root).is_empty() {
            self.nodes.clear();
            self.root = None;
            return;
        }

        loop {
            let node = self.nodes.get(root);
            if node.is_leaf() || node.len() > 1 {
                return;
            }

            let child = node.child(0);
            self.nodes.take(root);
            self.nodes.get_mut(child).set_parent(None);
            self.root = Some(child);
            trace!(old = ?root, new = ?child, "root collapsed");
            root = child;
        }
    }

    fn spare(&self, sibling: Option<Handle>) -> Option<Handle> {
        sibling.filter(|&h| self.nodes.get(h).len() > self.min_keys)
    }

    /// Repairs a non-root node that fell below `min_keys`: borrow from the right neighbour,
    /// then the left one, and merge only when neither can lend.
    fn repair_underflow(&mut self, handle: Handle) {
        let node = self.nodes.get(handle);
        let (left, right) = (node.left(), node.right());

        if let Some(right) = self.spare(right) {
            self.rotate_from_right(handle, right);
        } else if let Some(left) = self.spare(left) {
            self.rotate_from_left(left, handle);
        } else if let Some(right) = right {
            self.merge(handle, right);
        } else if let Some(left) = left {
            self.merge(left, handle);
        } else {
            unreachable!("non-root node {handle:?} has no siblings");
        }
    }

    /// Left rotation: the right neighbour keeps `min_keys` entries, its surplus head moves to
    /// the end of `handle`.
    fn rotate_from_right(&mut self, handle: Handle, right: Handle) {
        let donor = self.nodes.get_mut(right);
        let surplus = donor.len() - self.min_keys;
        let moved = donor.drain_front(surplus);

        self.nodes.get_mut(handle).append(moved);
        self.adopt_children(handle);
        self.propagate_max(handle);
        trace!(node = ?handle, from = ?right, moved = surplus, "rotated left");
    }

    /// Right rotation: the left neighbour keeps `min_keys` entries, its surplus tail moves to
    /// the front of `handle`.
    fn rotate_from_left(&mut self, left: Handle, handle: Handle) {
        let moved = self.nodes.get_mut(left).split_off(self.min_keys);
        let surplus = moved.len();

        self.nodes.get_mut(handle).prepend(moved);
        self.adopt_children(handle);
        self.propagate_max(left);
        // `handle` may have been emptied by the delete that triggered the repair.
        self.propagate_max(handle);
        trace!(node = ?handle, from = ?left, moved = surplus, "rotated right");
    }

    /// Folds `left` into its right neighbour and deletes `left`'s entry from `left`'s parent.
    ///
    /// The two nodes may have different parents. `left` is then the last child of its parent
    /// and `right` the first child of the next one, so the absorbed keys still sit between the
    /// two parents' ranges and only `left`'s parent loses an entry.
    fn merge(&mut self, left: Handle, right: Handle) {
        let mut absorbed = self.nodes.take(left);
        let parent = absorbed.parent().expect("merged node has no parent");
        let outer = absorbed.left();

        let target = self.nodes.get_mut(right);
        target.prepend(absorbed.take_entries());
        target.set_left(outer);
        if let Some(outer) = outer {
            self.nodes.get_mut(outer).set_right(Some(right));
        }
        self.adopt_children(right);
        self.propagate_max(right);
        trace!(from = ?left, into = ?right, "merged nodes");

        let idx = self.nodes.get(parent).position_of(left).expect("parent does not reference child");
        self.remove_at(parent, idx);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::inspect::violations;
    use alloc::collections::BTreeMap;
    use alloc::vec;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    impl<K: Ord + Clone + core::fmt::Debug, V> RawBPlusTree<K, V> {
        /// Panics with every invariant violation found.
        fn validate_invariants(&self) {
            let errors = violations(self);
            assert!(errors.is_empty(), "Tree invariant violations:\n{}", errors.join("\n"));
        }

        /// Keys of each leaf, read through the leaf chain.
        fn chained_leaves(&self) -> Vec<Vec<K>> {
            let mut leaves = Vec::new();
            let mut current = self.first_leaf();
            while let Some(handle) = current {
                let leaf = self.node(handle);
                leaves.push(leaf.entries().iter().map(|e| e.key.clone()).collect());
                current = leaf.right();
            }
            leaves
        }

        fn height(&self) -> usize {
            let mut height = 0;
            let mut current = self.root;
            while let Some(handle) = current {
                height += 1;
                let node = self.node(handle);
                current = if node.is_leaf() { None } else { Some(node.child(0)) };
            }
            height
        }
    }

    fn build(rank: usize, keys: impl IntoIterator<Item = i32>) -> RawBPlusTree<i32, i32> {
        let mut tree = RawBPlusTree::new(rank);
        for key in keys {
            tree.insert(key, key * 10).expect("keys are distinct");
            tree.validate_invariants();
        }
        tree
    }

    #[test]
    fn fifth_insert_splits_root_leaf() {
        let tree = build(5, 1..=5);
        assert_eq!(tree.chained_leaves(), vec![vec![1, 2], vec![3, 4, 5]]);
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn overflow_shifts_into_left_neighbour() {
        let tree = build(5, 1..=7);
        assert_eq!(tree.chained_leaves(), vec![vec![1, 2, 3], vec![4, 5, 6, 7]]);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn overflow_shifts_into_right_neighbour() {
        let tree = build(5, [1, 20, 30, 40, 50, 3, 4, 2, 5]);
        assert_eq!(tree.chained_leaves(), vec![vec![1, 2, 3, 4], vec![5, 20], vec![30, 40, 50]]);
    }

    #[test]
    fn branch_split_grows_height() {
        let tree = build(5, 1..=17);
        assert_eq!(tree.height(), 3);
        let root = tree.node(tree.root().unwrap());
        assert_eq!(root.entries().iter().map(|e| e.key).collect::<Vec<_>>(), [8, 17]);
    }

    #[test]
    fn rotation_leaves_donor_at_minimum() {
        let mut tree = build(5, 1..=13);
        for key in [8, 7] {
            assert_eq!(tree.remove(&key), Some(key * 10));
            tree.validate_invariants();
        }
        assert_eq!(tree.chained_leaves(), vec![vec![1, 2, 3, 4], vec![5, 6], vec![9, 10], vec![11, 12, 13]]);

        assert_eq!(tree.remove(&6), Some(60));
        tree.validate_invariants();
        assert_eq!(tree.chained_leaves(), vec![vec![1, 2], vec![3, 4, 5], vec![9, 10], vec![11, 12, 13]]);
    }

    #[test]
    fn rotation_from_right_neighbour() {
        // Leaves [1,2,3,4] [5,6,7,8] [9,10] [11,12,13]: emptying [1..4] down to one key pulls
        // the surplus head of [5..8].
        let mut tree = build(5, 1..=13);
        for key in [1, 2, 3] {
            tree.remove(&key);
            tree.validate_invariants();
        }
        assert_eq!(tree.chained_leaves(), vec![vec![4, 5, 6], vec![7, 8], vec![9, 10], vec![11, 12, 13]]);
    }

    #[test]
    fn merge_with_right_neighbour_drops_parent_entry() {
        let mut tree = build(5, 1..=13);
        // Bring both neighbours of [9, 10] down to the minimum so it has to merge.
        for key in [5, 6, 12] {
            tree.remove(&key);
            tree.validate_invariants();
        }
        assert_eq!(tree.chained_leaves(), vec![vec![1, 2, 3, 4], vec![7, 8], vec![9, 10], vec![11, 13]]);

        tree.remove(&9);
        tree.validate_invariants();
        assert_eq!(tree.chained_leaves(), vec![vec![1, 2, 3, 4], vec![7, 8], vec![10, 11, 13]]);
        let root = tree.node(tree.root().unwrap());
        assert_eq!(root.entries().iter().map(|e| e.key).collect::<Vec<_>>(), [4, 8, 13]);
    }

    #[test]
    fn merge_collapses_root() {
        let mut tree = build(5, 1..=5);
        tree.remove(&5);
        assert_eq!(tree.height(), 2);

        // [1] cannot borrow from [3, 4], so the two leaves merge and the root is left with a
        // single entry.
        tree.remove(&1);
        tree.validate_invariants();
        assert_eq!(tree.chained_leaves(), vec![vec![2, 3, 4]]);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn cross_parent_rotation() {
        // Height 3: root [8, 17] over branches [4, 8] and [12, 14, 17].
        let mut tree = build(5, 1..=17);
        assert_eq!(
            tree.chained_leaves(),
            vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8], vec![9, 10, 11, 12], vec![13, 14], vec![15, 16, 17]]
        );

        // [5..8] is the last child of the left branch; its right neighbour [9..12] is the first
        // child of the right branch and lends across the parent boundary.
        for key in [5, 6, 7] {
            tree.remove(&key);
            tree.validate_invariants();
        }
        assert_eq!(
            tree.chained_leaves(),
            vec![vec![1, 2, 3, 4], vec![8, 9, 10], vec![11, 12], vec![13, 14], vec![15, 16, 17]]
        );
        let root = tree.node(tree.root().unwrap());
        assert_eq!(root.entries().iter().map(|e| e.key).collect::<Vec<_>>(), [10, 17]);
    }

    #[test]
    fn cross_parent_merge() {
        let mut tree = build(5, 1..=17);
        for key in [5, 6, 7, 1, 2, 10] {
            tree.remove(&key);
            tree.validate_invariants();
        }
        assert_eq!(tree.chained_leaves(), vec![vec![3, 4], vec![8, 9], vec![11, 12], vec![13, 14], vec![15, 16, 17]]);

        // [8, 9] underflows with both neighbours at the minimum. It is folded into [11, 12], which
        // belongs to the right branch; the left branch drops to one entry and borrows back the
        // merged leaf from the right branch.
        tree.remove(&8);
        tree.validate_invariants();
        assert_eq!(tree.chained_leaves(), vec![vec![3, 4], vec![9, 11, 12], vec![13, 14], vec![15, 16, 17]]);

        let root = tree.node(tree.root().unwrap());
        assert_eq!(root.entries().iter().map(|e| e.key).collect::<Vec<_>>(), [12, 17]);
        let left_branch = tree.node(root.child(0));
        assert_eq!(left_branch.entries().iter().map(|e| e.key).collect::<Vec<_>>(), [4, 12]);
        let right_branch = tree.node(root.child(1));
        assert_eq!(right_branch.entries().iter().map(|e| e.key).collect::<Vec<_>>(), [14, 17]);
    }

    #[test]
    fn cross_parent_merge_into_cousin() {
        // Rank 3 keeps nodes tiny so cousins meet quickly.
        let mut tree = build(3, 1..=12);
        let mut expected: Vec<i32> = (1..=12).collect();
        for key in [4, 5, 6, 7, 3] {
            assert_eq!(tree.remove(&key), Some(key * 10));
            expected.retain(|&k| k != key);
            tree.validate_invariants();
            assert_eq!(tree.chained_leaves().concat(), expected);
        }
    }

    fn level_keys(tree: &RawBPlusTree<i32, i32>) -> Vec<Vec<Vec<i32>>> {
        let mut levels = Vec::new();
        let mut row: Vec<Handle> = tree.root().into_iter().collect();
        while !row.is_empty() {
            levels.push(row.iter().map(|&h| tree.node(h).entries().iter().map(|e| e.key).collect()).collect());
            row = row.iter().flat_map(|&h| tree.node(h).children()).collect();
        }
        levels
    }

    fn remove_checked(tree: &mut RawBPlusTree<i32, i32>, key: i32) {
        assert_eq!(tree.remove(&key), Some(key * 10));
        tree.validate_invariants();
    }

    #[test]
    fn rank_three_emptied_leaf_borrows_from_right() {
        let mut tree = build(3, 1..=5);
        assert_eq!(level_keys(&tree), vec![vec![vec![2, 5]], vec![vec![2], vec![3, 5]], vec![vec![1, 2], vec![3], vec![4, 5]]]);

        // [3] empties completely; [4, 5] lends its surplus.
        remove_checked(&mut tree, 3);
        assert_eq!(level_keys(&tree), vec![vec![vec![2, 5]], vec![vec![2], vec![4, 5]], vec![vec![1, 2], vec![4], vec![5]]]);
    }

    #[test]
    fn rank_three_emptied_leaf_borrows_from_left() {
        let mut tree = build(3, 1..=5);
        remove_checked(&mut tree, 5);
        assert_eq!(tree.chained_leaves(), vec![vec![1, 2], vec![3], vec![4]]);

        // [4] cannot lend, so [1, 2] in the other branch gives up its tail.
        remove_checked(&mut tree, 3);
        assert_eq!(level_keys(&tree), vec![vec![vec![1, 4]], vec![vec![1], vec![2, 4]], vec![vec![1], vec![2], vec![4]]]);
    }

    #[test]
    fn rank_three_merge_cascades_to_leaf_root() {
        let mut tree = build(3, 1..=5);
        remove_checked(&mut tree, 3);
        remove_checked(&mut tree, 4);
        assert_eq!(level_keys(&tree), vec![vec![vec![1, 5]], vec![vec![1], vec![2, 5]], vec![vec![1], vec![2], vec![5]]]);

        remove_checked(&mut tree, 5);
        assert_eq!(level_keys(&tree), vec![vec![vec![1, 2]], vec![vec![1], vec![2]], vec![vec![1], vec![2]]]);

        // Leaf merge empties the left branch, the branches merge, and the root collapses twice.
        remove_checked(&mut tree, 1);
        assert_eq!(level_keys(&tree), vec![vec![vec![2]]]);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn rank_three_shuffled_drain_collapses_root_chain() {
        let mut tree = build(3, [1, 4, 0, 2, 3]);
        for key in [2, 0, 4, 1] {
            remove_checked(&mut tree, key);
        }
        assert_eq!(level_keys(&tree), vec![vec![vec![3]]]);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn removing_last_key_empties_tree() {
        let mut tree = build(5, [7]);
        assert_eq!(tree.remove(&7), Some(70));
        assert!(tree.is_empty());
        assert_eq!(tree.root(), None);
        assert_eq!(tree.node_count(), 0);
        assert_eq!(tree.remove(&7), None);
    }

    #[test]
    fn duplicate_insert_leaves_tree_untouched() {
        let mut tree = build(5, 1..=9);
        let before = tree.chained_leaves();
        assert_eq!(tree.insert(4, 0), Err(Error::DuplicateKey));
        assert_eq!(tree.chained_leaves(), before);
        assert_eq!(tree.get(&4), Some(&40));
        assert_eq!(tree.len(), 9);
    }

    #[test]
    fn range_walks_leaf_chain() {
        let tree = build(5, [1, 20, 30, 40, 50, 3, 4, 2, 5]);
        let values: Vec<i32> = tree.range(&5, &40).into_iter().copied().collect();
        assert_eq!(values, [50, 200, 300, 400]);
        assert!(tree.range(&41, &49).is_empty());
        assert!(tree.range(&40, &5).is_empty());
        assert_eq!(tree.range(&0, &1000).len(), 9);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(i32),
        Remove(i32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0i32..400).prop_map(Op::Insert),
            2 => (0i32..400).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn tree_invariants_maintained_after_operations(
            rank in MIN_RANK..12usize,
            ops in prop::collection::vec(op_strategy(), 0..400),
        ) {
            let mut tree: RawBPlusTree<i32, i32> = RawBPlusTree::new(rank);
            let mut model: BTreeMap<i32, i32> = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(key) => {
                        let expected = if model.contains_key(&key) {
                            Err(Error::DuplicateKey)
                        } else {
                            model.insert(key, key * 2);
                            Ok(())
                        };
                        prop_assert_eq!(tree.insert(key, key * 2), expected);
                    }
                    Op::Remove(key) => {
                        prop_assert_eq!(tree.remove(&key), model.remove(&key));
                    }
                }
                let errors = violations(&tree);
                prop_assert!(errors.is_empty(), "violations:\n{}", errors.join("\n"));
                prop_assert_eq!(tree.len(), model.len());
            }

            let keys: Vec<i32> = tree.chained_leaves().concat();
            let expected: Vec<i32> = model.keys().copied().collect();
            prop_assert_eq!(keys, expected);
        }

        #[test]
        fn draining_in_any_order_empties_tree(
            rank in MIN_RANK..9usize,
            keys in prop::collection::hash_set(0i32..2_000, 1..300),
        ) {
            let keys: Vec<i32> = keys.into_iter().collect();
            let mut tree: RawBPlusTree<i32, i32> = RawBPlusTree::new(rank);
            for &key in &keys {
                tree.insert(key, key).unwrap();
            }
            for &key in keys.iter().rev() {
                prop_assert_eq!(tree.remove(&key), Some(key));
                let errors = violations(&tree);
                prop_assert!(errors.is_empty(), "violations:\n{}", errors.join("\n"));
            }
            prop_assert!(tree.is_empty());
            prop_assert_eq!(tree.node_count(), 0);
        }
    }
}
