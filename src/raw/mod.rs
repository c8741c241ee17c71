mod arena;
mod handle;
mod node;
mod raw_bplus_tree;

pub(crate) use handle::Handle;
pub(crate) use node::{Entry, Node, NodeKind};
pub(crate) use raw_bplus_tree::{MIN_RANK, RawBPlusTree};
