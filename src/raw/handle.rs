use core::fmt;
use core::num::NonZero;

// Test builds use 16-bit handles so capacity limits are reachable in tests.
#[cfg(test)]
type RawHandle = u16;
#[cfg(not(test))]
type RawHandle = u32;

/// Address of a leaf or branch node in the tree's arena.
///
/// Every link between nodes is an `Option<Handle>`: the parent pointer used by key propagation,
/// the `left`/`right` chain that connects each level for shifts, rotations, merges and range
/// scans, and the child slot of a branch entry. Nodes never own each other, so merging or
/// collapsing the root only rewrites handles and frees one arena slot.
///
/// The arena index is stored plus one, so a missing link costs no extra space.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub(crate) struct Handle(NonZero<RawHandle>);

impl Handle {
    /// Largest arena index a handle can address, and so the node limit of one tree.
    pub(crate) const MAX: usize = (RawHandle::MAX - 1) as usize;

    #[inline]
    pub(crate) const fn from_index(index: usize) -> Self {
        assert!(index <= Self::MAX, "`Handle::from_index()` - `index` > `Handle::MAX`!");
        #[allow(clippy::cast_possible_truncation)]
        match NonZero::new((index + 1) as RawHandle) {
            Some(raw) => Self(raw),
            None => unreachable!(),
        }
    }

    #[inline]
    pub(crate) const fn to_index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

// Trace events print node links as `#3`.
impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_index())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::format;
    use proptest::prelude::*;
    use static_assertions::assert_eq_size;

    // A node carries three optional links; none of them may grow past a bare index.
    assert_eq_size!(Handle, Option<Handle>);
    assert_eq_size!(Handle, RawHandle);
    assert_eq_size!([Option<Handle>; 3], [RawHandle; 3]);

    #[test]
    #[should_panic(expected = "`Handle::from_index()` - `index` > `Handle::MAX`!")]
    fn node_limit_is_enforced() {
        let _ = Handle::from_index(Handle::MAX + 1);
    }

    #[test]
    fn links_debug_as_arena_index() {
        assert_eq!(format!("{:?}", Handle::from_index(3)), "#3");
        assert_eq!(format!("{:?}", Some(Handle::from_index(0))), "Some(#0)");
    }

    proptest! {
        #[test]
        fn index_survives_round_trip(index in 0..=Handle::MAX) {
            prop_assert_eq!(Handle::from_index(index).to_index(), index);
        }
    }
}
