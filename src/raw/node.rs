use core::borrow::Borrow;

use smallvec::SmallVec;

use super::handle::Handle;

/// Trees with `rank <= INLINE_ENTRIES` never spill node entries to the heap. A full node
/// briefly holds `rank` entries while it waits for overflow repair.
pub(crate) const INLINE_ENTRIES: usize = 8;

pub(crate) type Entries<K, V> = SmallVec<[Entry<K, V>; INLINE_ENTRIES]>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum NodeKind {
    Leaf,
    Branch,
}

/// What an entry points at: a stored value in a leaf, a subtree in a branch.
#[derive(Clone)]
pub(crate) enum Slot<V> {
    Value(V),
    Child(Handle),
}

/// One `(key, value-or-child)` pair.
///
/// In a branch the key is the maximum key reachable through the child, not a separator.
#[derive(Clone)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) slot: Slot<V>,
}

impl<K, V> Entry<K, V> {
    pub(crate) const fn leaf(key: K, value: V) -> Self {
        Self {
            key,
            slot: Slot::Value(value),
        }
    }

    pub(crate) const fn branch(key: K, child: Handle) -> Self {
        Self {
            key,
            slot: Slot::Child(child),
        }
    }

    pub(crate) const fn child(&self) -> Option<Handle> {
        match self.slot {
            Slot::Child(child) => Some(child),
            Slot::Value(_) => None,
        }
    }

    pub(crate) const fn value(&self) -> Option<&V> {
        match &self.slot {
            Slot::Value(value) => Some(value),
            Slot::Child(_) => None,
        }
    }

    pub(crate) fn into_value(self) -> Option<V> {
        match self.slot {
            Slot::Value(value) => Some(value),
            Slot::Child(_) => None,
        }
    }
}

/// Result of searching for a key in a node.
pub(crate) enum SearchResult {
    /// Key was found at the given index.
    Found(usize),
    /// Key was not found; index is where it would be inserted.
    NotFound(usize),
}

/// A leaf or branch node.
///
/// `parent`, `left` and `right` are plain handles: the arena owns every node, so these links
/// never form ownership cycles. `left`/`right` chain all nodes of one level, not just the
/// children of one parent.
#[derive(Clone)]
pub(crate) struct Node<K, V> {
    kind: NodeKind,
    parent: Option<Handle>,
    left: Option<Handle>,
    right: Option<Handle>,
    entries: Entries<K, V>,
}

impl<K, V> Node<K, V> {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self::with_entries(kind, SmallVec::new())
    }

    pub(crate) const fn with_entries(kind: NodeKind, entries: Entries<K, V>) -> Self {
        Self {
            kind,
            parent: None,
            left: None,
            right: None,
            entries,
        }
    }

    pub(crate) const fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    pub(crate) const fn parent(&self) -> Option<Handle> {
        self.parent
    }

    pub(crate) const fn set_parent(&mut self, parent: Option<Handle>) {
        self.parent = parent;
    }

    pub(crate) const fn left(&self) -> Option<Handle> {
        self.left
    }

    pub(crate) const fn set_left(&mut self, left: Option<Handle>) {
        self.left = left;
    }

    pub(crate) const fn right(&self) -> Option<Handle> {
        self.right
    }

    pub(crate) const fn set_right(&mut self, right: Option<Handle>) {
        self.right = right;
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &[Entry<K, V>] {
        &self.entries
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.entries[index].key
    }

    /// The node's maximum key, `None` only while an emptied node awaits repair.
    pub(crate) fn last_key(&self) -> Option<&K> {
        self.entries.last().map(|e| &e.key)
    }

    /// Child handle of a branch entry.
    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.entries[index].child().expect("expected branch entry")
    }

    /// Handles of every child, empty for a leaf.
    pub(crate) fn children(&self) -> impl Iterator<Item = Handle> + '_ {
        self.entries.iter().filter_map(Entry::child)
    }

    /// Index of the entry pointing at `child`.
    pub(crate) fn position_of(&self, child: Handle) -> Option<usize> {
        self.entries.iter().position(|e| e.child() == Some(child))
    }

    #[inline]
    pub(crate) fn value(&self, index: usize) -> &V {
        self.entries[index].value().expect("expected leaf entry")
    }

    #[inline]
    pub(crate) fn value_mut(&mut self, index: usize) -> &mut V {
        match &mut self.entries[index].slot {
            Slot::Value(value) => value,
            Slot::Child(_) => panic!("expected leaf entry"),
        }
    }

    /// Searches for an exact key.
    pub(crate) fn search<Q>(&self, key: &Q) -> SearchResult
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.entries.binary_search_by(|e| e.key.borrow().cmp(key)) {
            Ok(idx) => SearchResult::Found(idx),
            Err(idx) => SearchResult::NotFound(idx),
        }
    }

    /// Index of the branch entry to descend into for `key`: the first entry whose key is
    /// `>= key`, or the last entry when every key is smaller.
    #[inline]
    pub(crate) fn route<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let idx = self.entries.partition_point(|e| e.key.borrow() < key);
        idx.min(self.entries.len().saturating_sub(1))
    }

    pub(crate) fn insert(&mut self, index: usize, entry: Entry<K, V>) {
        self.entries.insert(index, entry);
    }

    pub(crate) fn remove(&mut self, index: usize) -> Entry<K, V> {
        self.entries.remove(index)
    }

    pub(crate) fn set_key(&mut self, index: usize, key: K) {
        self.entries[index].key = key;
    }

    pub(crate) fn push(&mut self, entry: Entry<K, V>) {
        self.entries.push(entry);
    }

    pub(crate) fn push_front(&mut self, entry: Entry<K, V>) {
        self.entries.insert(0, entry);
    }

    pub(crate) fn pop(&mut self) -> Option<Entry<K, V>> {
        self.entries.pop()
    }

    pub(crate) fn pop_front(&mut self) -> Option<Entry<K, V>> {
        if self.entries.is_empty() { None } else { Some(self.entries.remove(0)) }
    }

    /// Removes and returns the entries from `at` onwards.
    pub(crate) fn split_off(&mut self, at: usize) -> Entries<K, V> {
        self.entries.drain(at..).collect()
    }

    /// Removes and returns the first `count` entries.
    pub(crate) fn drain_front(&mut self, count: usize) -> Entries<K, V> {
        self.entries.drain(..count).collect()
    }

    pub(crate) fn append(&mut self, entries: Entries<K, V>) {
        self.entries.extend(entries);
    }

    pub(crate) fn prepend(&mut self, entries: Entries<K, V>) {
        self.entries.insert_many(0, entries);
    }

    pub(crate) fn take_entries(&mut self) -> Entries<K, V> {
        core::mem::take(&mut self.entries)
    }
}
