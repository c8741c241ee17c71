use thiserror::Error;

/// Errors returned by [`BPlusTree`](crate::BPlusTree).
///
/// Absent keys and empty trees are not errors: lookups report them through `Option`, `bool` or
/// an empty result.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum Error {
    /// The key is already present. The tree was not modified.
    #[error("duplicate key")]
    DuplicateKey,

    /// The requested rank is below the supported minimum of 3.
    #[error("invalid rank {0}: a B+Tree needs a rank of at least 3")]
    InvalidRank(usize),
}
