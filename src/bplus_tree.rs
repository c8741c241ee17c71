use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;
use core::ops::ControlFlow;

use alloc::vec::Vec;

use crate::error::Error;
use crate::raw::{Handle, RawBPlusTree};

/// The smallest rank a [`BPlusTree`] accepts.
pub const MIN_RANK: usize = crate::raw::MIN_RANK;

/// The rank used by [`BPlusTree::default`].
pub const DEFAULT_RANK: usize = 32;

/// Traversal order for [`BPlusTree::for_each`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Direction {
    /// Smallest key first, following right links from the leftmost leaf.
    #[default]
    Ascending,
    /// Largest key first, following left links from the rightmost leaf.
    Descending,
}

/// An ordered key/value index stored as a B+Tree.
///
/// Values live only in the leaves, and the leaves form a doubly linked list, so range scans
/// and full traversals walk sideways instead of through the branch levels. Each branch entry
/// carries the maximum key of the subtree below it.
///
/// The tree is configured with a *rank*: every node holds at most `rank - 1` entries and every
/// node except the root holds at least `rank / 2`. A full node first tries to shift an entry
/// into a neighbour with room and only splits when both neighbours are full. An underfull node
/// borrows the surplus of a neighbour and only merges when neither can lend.
///
/// Keys are unique. Inserting a key that is already present fails with
/// [`Error::DuplicateKey`]; use [`modify`](BPlusTree::modify) to replace a value.
///
/// # Examples
///
/// ```
/// use bplus_index::BPlusTree;
///
/// let mut tree = BPlusTree::new(5);
/// for key in [1, 20, 30, 40, 50, 3, 4, 2, 5] {
///     tree.insert(key, key * 100).unwrap();
/// }
///
/// assert_eq!(tree.find(&50), Some(&5000));
/// assert_eq!(tree.find(&6), None);
/// assert_eq!(tree.find_range(&5, &40), [&500, &2000, &3000, &4000]);
///
/// assert!(tree.delete(&20));
/// assert!(!tree.has(&20));
/// assert_eq!(tree.count(), 8);
/// ```
#[derive(Clone)]
pub struct BPlusTree<K, V> {
    raw: RawBPlusTree<K, V>,
}

impl<K, V> BPlusTree<K, V> {
    /// Makes a new, empty tree of the given rank.
    ///
    /// Does not allocate anything on its own.
    ///
    /// # Panics
    ///
    /// Panics if `rank` is smaller than [`MIN_RANK`]. See [`try_new`](BPlusTree::try_new) for
    /// a fallible version.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let tree: BPlusTree<i32, &str> = BPlusTree::new(5);
    /// assert_eq!(tree.rank(), 5);
    /// assert_eq!(tree.min_keys(), 2);
    /// ```
    #[must_use]
    pub fn new(rank: usize) -> Self {
        match Self::try_new(rank) {
            Ok(tree) => tree,
            Err(err) => panic!("`BPlusTree::new()` - {err}"),
        }
    }

    /// Makes a new, empty tree of the given rank, rejecting ranks below [`MIN_RANK`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRank`] if `rank < MIN_RANK`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, Error};
    ///
    /// assert!(BPlusTree::<u8, u8>::try_new(4).is_ok());
    /// assert_eq!(BPlusTree::<u8, u8>::try_new(2).err(), Some(Error::InvalidRank(2)));
    /// ```
    pub fn try_new(rank: usize) -> Result<Self, Error> {
        if rank < MIN_RANK {
            return Err(Error::InvalidRank(rank));
        }
        Ok(Self {
            raw: RawBPlusTree::new(rank),
        })
    }

    /// Returns the number of keys in the tree.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub const fn count(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the tree holds no keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns the configured rank. A node holds at most `rank - 1` entries.
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.raw.rank()
    }

    /// Returns `rank / 2`, the fewest entries any non-root node holds.
    #[must_use]
    pub const fn min_keys(&self) -> usize {
        self.raw.min_keys()
    }

    /// Removes every key, dropping all nodes. The rank is kept.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4);
    /// tree.insert(1, "a").unwrap();
    /// tree.clear();
    /// assert!(tree.is_empty());
    /// assert_eq!(tree.find(&1), None);
    /// ```
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Gets an iterator over the entries of the tree, sorted by key.
    ///
    /// The iterator is double-ended; `tree.iter().rev()` walks the leaf chain backwards.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3);
    /// for key in [3, 1, 2] {
    ///     tree.insert(key, key * 10).unwrap();
    /// }
    ///
    /// let keys: Vec<_> = tree.iter().map(|(k, _)| *k).collect();
    /// assert_eq!(keys, [1, 2, 3]);
    /// assert_eq!(tree.iter().next_back(), Some((&3, &30)));
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: &self.raw,
            front: self.raw.first_leaf().map(|leaf| (leaf, 0)),
            back: self.raw.last_leaf().map(|leaf| (leaf, self.raw.node(leaf).len() - 1)),
            remaining: self.raw.len(),
        }
    }

    /// Returns the entry with the smallest key.
    ///
    /// # Complexity
    ///
    /// O(log n)
    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.iter().next()
    }

    /// Returns the entry with the largest key.
    ///
    /// # Complexity
    ///
    /// O(log n)
    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.iter().next_back()
    }

    /// Visits leaf entries in the given direction until the visitor breaks.
    ///
    /// The visitor only gets shared access to the tree, so it cannot insert or delete while the
    /// leaf chain is being walked.
    ///
    /// # Examples
    ///
    /// ```
    /// use core::ops::ControlFlow;
    /// use bplus_index::{BPlusTree, Direction};
    ///
    /// let mut tree = BPlusTree::new(5);
    /// for key in 1..=7 {
    ///     tree.insert(key, ()).unwrap();
    /// }
    ///
    /// let mut seen = Vec::new();
    /// tree.for_each(Direction::Descending, |key, _| {
    ///     seen.push(*key);
    ///     if *key == 5 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
    /// });
    /// assert_eq!(seen, [7, 6, 5]);
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n + k) for k visited entries.
    pub fn for_each<F>(&self, direction: Direction, mut visitor: F)
    where
        F: FnMut(&K, &V) -> ControlFlow<()>,
    {
        let _ = match direction {
            Direction::Ascending => self.iter().try_for_each(|(k, v)| visitor(k, v)),
            Direction::Descending => self.iter().rev().try_for_each(|(k, v)| visitor(k, v)),
        };
    }

    pub(crate) const fn raw(&self) -> &RawBPlusTree<K, V> {
        &self.raw
    }
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Inserts a key-value pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if the key is already present. The tree is left
    /// unchanged and `value` is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, Error};
    ///
    /// let mut tree = BPlusTree::new(5);
    /// assert_eq!(tree.insert(37, "a"), Ok(()));
    /// assert_eq!(tree.insert(37, "b"), Err(Error::DuplicateKey));
    /// assert_eq!(tree.find(&37), Some(&"a"));
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn insert(&mut self, key: K, value: V) -> Result<(), Error> {
        self.raw.insert(key, value)
    }

    /// Returns a reference to the value stored under `key`.
    ///
    /// The key may be any borrowed form of the tree's key type, but the ordering on the
    /// borrowed form *must* match the ordering on the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(5);
    /// tree.insert(String::from("ada"), 1815).unwrap();
    /// assert_eq!(tree.find("ada"), Some(&1815));
    /// assert_eq!(tree.find("grace"), None);
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn find<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key)
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub fn find_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get_mut(key)
    }

    /// Returns `true` if the tree holds `key`.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.search(key).is_some()
    }

    /// Replaces the value stored under `key`. Returns `false`, dropping `value`, if the key is
    /// absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(5);
    /// assert!(!tree.modify(&9, 5));
    /// tree.insert(4, 4).unwrap();
    /// assert!(tree.modify(&4, 2000));
    /// assert_eq!(tree.find(&4), Some(&2000));
    /// ```
    pub fn modify<Q>(&mut self, key: &Q, value: V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.raw.get_mut(key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Returns the values whose keys lie in `[min, max]`, in key order.
    ///
    /// Returns an empty vector when `min > max` or the tree is empty.
    ///
    /// # Complexity
    ///
    /// O(log n + k) for k matching entries.
    pub fn find_range<Q>(&self, min: &Q, max: &Q) -> Vec<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.range(min, max)
    }

    /// Removes `key`, returning whether it was present.
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove(key).is_some()
    }

    /// Removes `key` and returns the value that was stored under it.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(5);
    /// tree.insert(1, "a").unwrap();
    /// assert_eq!(tree.remove(&1), Some("a"));
    /// assert_eq!(tree.remove(&1), None);
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove(key)
    }
}

impl<K, V> Default for BPlusTree<K, V> {
    /// Creates an empty tree of rank [`DEFAULT_RANK`].
    fn default() -> Self {
        Self {
            raw: RawBPlusTree::new(DEFAULT_RANK),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BPlusTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V> IntoIterator for &'a BPlusTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

/// An iterator over the entries of a [`BPlusTree`], driven by the leaf chain.
///
/// This `struct` is created by the [`iter`](BPlusTree::iter) method.
pub struct Iter<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    front: Option<(Handle, usize)>,
    back: Option<(Handle, usize)>,
    remaining: usize,
}

impl<'a, K: 'a, V: 'a> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let (handle, idx) = self.front?;
        let tree = self.tree;
        let leaf = tree.node(handle);

        self.remaining -= 1;
        self.front = if idx + 1 < leaf.len() {
            Some((handle, idx + 1))
        } else {
            leaf.right().map(|next| (next, 0))
        };

        Some((leaf.key(idx), leaf.value(idx)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K: 'a, V: 'a> DoubleEndedIterator for Iter<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let (handle, idx) = self.back?;
        let tree = self.tree;
        let leaf = tree.node(handle);

        self.remaining -= 1;
        self.back = if idx > 0 {
            Some((handle, idx - 1))
        } else {
            leaf.left().map(|prev| (prev, tree.node(prev).len() - 1))
        };

        Some((leaf.key(idx), leaf.value(idx)))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            tree: self.tree,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}
