//! # Yamltree
//!
//! An arena-backed tree model and mutation engine for YAML 1.2 documents.
//!
//! This crate provides the data structure a YAML parser deposits nodes into
//! and that emitters and consumers traverse: flat node storage with stable
//! integer handles, O(1) claim/release through an intrusive free list, full
//! hierarchy maintenance across insertion, removal, move, swap, duplicate,
//! and pre-order compaction, and YAML anchor/alias/merge-key resolution.
//!
//! ## Quick Start
//!
//! ```
//! use yamltree::{NodeType, Tree};
//!
//! // build the map {a: 1, b: *x} where &x anchors the value of `a`
//! let mut t = Tree::new();
//! let root = t.claim();
//! t.set_parent(root, None, None);
//! t.to_map(root, NodeType::NOTYPE);
//!
//! let a = t.claim();
//! t.set_parent(a, Some(root), None);
//! t.to_keyval(a, "a", "1", NodeType::NOTYPE);
//! t.set_val_anchor(a, "x");
//!
//! let b = t.claim();
//! t.set_parent(b, Some(root), Some(a));
//! t.to_keyval(b, "b", "*x", NodeType::VALREF);
//!
//! // materialize the alias
//! t.resolve();
//! assert_eq!(t.val(b), b"1");
//! ```
//!
//! ## Handles
//!
//! Nodes are addressed by [`NodeId`] handles, which are indices into the
//! tree's node buffer. Handles stay valid across every mutation except
//! [`Tree::reorder`] and [`Tree::clear`], which renumber, and they survive
//! node-buffer growth. Byte slices returned by scalar accessors go stale
//! whenever the arena grows; re-fetch them by handle.
//!
//! ## Features
//!
//! - `std` (default) - build against the standard library. Without it the
//!   crate is `no_std` and only requires `alloc`.

// Use no_std unless std feature is enabled or we're in test mode
#![cfg_attr(not(any(test, feature = "std")), no_std)]

// When using no_std, we need to explicitly link the alloc crate
#[cfg(not(any(test, feature = "std")))]
extern crate alloc;

// When using std, re-export alloc types from std for compatibility
#[cfg(any(test, feature = "std"))]
extern crate std as alloc;

mod node;
mod resolve;
mod scalar;
mod tree;
mod types;

pub use node::NodeId;
pub use scalar::{Scalar, Span};
pub use tree::Tree;
pub use types::NodeType;
