//! An in-memory B+Tree index for Rust.
//!
//! This crate provides [`BPlusTree`], an ordered key/value index whose leaves form a doubly
//! linked list:
//!
//! - [`find`](BPlusTree::find), [`has`](BPlusTree::has) and [`modify`](BPlusTree::modify) - O(log n) point access
//! - [`find_range`](BPlusTree::find_range) - inclusive range scans along the leaf chain
//! - [`for_each`](BPlusTree::for_each) and [`iter`](BPlusTree::iter) - ordered traversal in either direction
//! - [`insert`](BPlusTree::insert) and [`delete`](BPlusTree::delete) - ordered mutation with
//!   rotation before split and rotation before merge
//!
//! # Example
//!
//! ```
//! use bplus_index::{BPlusTree, Error};
//!
//! let mut index = BPlusTree::new(5);
//! for key in 1..=13 {
//!     index.insert(key, key.to_string()).unwrap();
//! }
//!
//! assert_eq!(index.find(&7).map(String::as_str), Some("7"));
//! assert_eq!(index.insert(7, "again".into()), Err(Error::DuplicateKey));
//!
//! let values: Vec<&String> = index.find_range(&5, &8);
//! assert_eq!(values, ["5", "6", "7", "8"]);
//!
//! assert!(index.delete(&8));
//! assert_eq!(index.count(), 12);
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard library dependency
//! - **Configurable rank** - every non-root node keeps between `rank / 2` and `rank - 1` entries
//! - **Arena storage** - nodes live in one arena and link to each other by handle
//! - **Introspection** - the [`inspect`] module dumps levels, renders the tree and checks its invariants
//!
//! # Implementation
//!
//! Every branch entry stores the *maximum* key of its subtree rather than a separator. When a
//! node's maximum changes the new key is pushed up through parent handles until it reaches an
//! ancestor entry that is not the last in its node. Structural events are emitted as `tracing`
//! events at `TRACE` level.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod error;
mod raw;

pub mod bplus_tree;
pub mod inspect;

pub use bplus_tree::{BPlusTree, DEFAULT_RANK, Direction, MIN_RANK};
pub use error::Error;
