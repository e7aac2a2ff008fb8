//! Lock-free concurrent hash trie with constant-time snapshots.
//!
//! This crate provides a concurrent hash array mapped trie (Ctrie). Lookups,
//! inserts and removals are lock-free, and the whole map can be snapshotted in
//! O(1): the snapshot and the live map share structure and copy it lazily as
//! either side writes.
//!
//! Replaced nodes are reclaimed through kovan, so readers never block writers
//! and nothing is freed while a thread may still be looking at it.
//!
//! # Features
//!
//! - **Lock-Free**: Every operation completes through CAS retries, never a lock
//! - **O(1) Snapshots**: Writable and read-only, consistent across the whole map
//! - **Linearizable Iteration**: Iterators and `len` walk a frozen snapshot
//! - **Splittable Iterators**: Hand halves of a traversal to other threads
//! - **Flexible Hashing**: Support for custom hash builders
//!
//! # Example
//!
//! ```rust
//! use kovan_ctrie::TrieMap;
//!
//! let map = TrieMap::new();
//! map.insert(42, "hello");
//! map.insert(100, "world");
//!
//! let frozen = map.read_only_snapshot();
//! map.remove(&42);
//!
//! assert_eq!(map.lookup(&42), None);
//! assert_eq!(frozen.lookup(&42), Some("hello"));
//! assert_eq!(frozen.len(), 2);
//! ```

#![warn(missing_docs)]
#![no_std]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

mod cell;
mod debug;
mod error;
mod gcas;
mod iter;
mod listmap;
mod map;
mod node;
mod rdcss;
mod trie;

pub use error::TrieError;
pub use iter::{Iter, Keys, Values};
pub use map::{ReadOnlyTrieMap, TrieMap};
