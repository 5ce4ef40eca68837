//! An authenticated binary Patricia trie over an append-only,
//! memory-mapped cell array.
//!
//! Keys are bit paths split into segments; every segment boundary is
//! marked by a bud node, so a context can hold nested keyspaces. Values
//! are opaque byte blobs interned in a refcounted, content-addressed leaf
//! store. Edits are functional: `upsert`/`delete` return a new root and
//! leave every previous root usable. `commit` appends the dirty part of a
//! root to the array and records its digest in the root table; `gc`
//! compacts the array down to the cells reachable from the recorded roots.
//!
//! ```no_run
//! use bramble_trie::{Context, ContextOptions, Segment, TriePath, empty_root};
//!
//! # fn main() -> Result<(), bramble_trie::TrieError> {
//! let mut ctx = Context::open("state.bramble", ContextOptions::default())?;
//! let path = TriePath::single(Segment::from_bytes(b"key!"))?;
//! let root = ctx.upsert(&empty_root(), &path, b"value")?;
//! let (root, digest) = ctx.commit(&root)?;
//! assert_eq!(ctx.get(&root, &path)?.as_deref(), Some(&b"value"[..]));
//! assert!(ctx.checkout(&digest).is_some());
//! # Ok(())
//! # }
//! ```

mod array;
mod cell;
pub mod check;
mod commit;
mod context;
pub mod error;
mod gc;
mod leaf_store;
mod node;
pub mod node_hash;
mod segment;
mod trie_iter;

pub use primitive_types::H256;

pub use self::cell::CELL_SIZE;
pub use self::context::{Context, ContextOptions, ContextStats};
pub use self::error::TrieError;
pub use self::leaf_store::LeafStore;
pub use self::node::{
    BudNode, CellIndex, ExtenderNode, InternalNode, LeafNode, Node, NodeRef, View,
};
pub use self::node_hash::{EMPTY_DIGEST, leaf_digest};
pub use self::segment::{Bits, MAX_SEGMENT_BITS, Segment, Side, TriePath};
pub use self::trie_iter::TrieIterator;

/// The root of an empty trie.
pub fn empty_root() -> NodeRef {
    NodeRef::Null
}
