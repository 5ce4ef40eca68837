//! The context: one mmapped cell array, its leaf store and its root table.
//!
//! A context is single-writer: every mutating operation takes `&mut self`.
//! Reads work against committed snapshots through [`NodeRef`] handles and
//! never mutate the array. The root table and the leaf store are kept in
//! memory and persisted as bincode sidecars next to the array file, written
//! atomically on every commit and GC.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use primitive_types::H256;
use tracing::{debug, info, warn};

use crate::array::CellArray;
use crate::cell::{self, DecodedCell};
use crate::error::TrieError;
use crate::leaf_store::LeafStore;
use crate::node::{
    BudNode, CellIndex, ExtenderNode, InternalNode, LeafNode, Node, NodeRef, View,
};
use crate::segment::{Bits, Segment, TriePath, cut};

/// Tuning knobs for opening a context.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Capacity, in cells, of a freshly created array file.
    pub initial_capacity: u64,
}

impl Default for ContextOptions {
    fn default() -> Self {
        // 1 MiB of 64-byte cells.
        ContextOptions {
            initial_capacity: 16 * 1024,
        }
    }
}

impl ContextOptions {
    pub fn with_initial_capacity(mut self, cells: u64) -> Self {
        self.initial_capacity = cells;
        self
    }
}

/// Point-in-time figures about a context, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStats {
    pub committed_cells: u64,
    pub capacity_cells: u64,
    pub roots: usize,
    pub leaf_values: usize,
    pub leaf_refs: u64,
    pub leaf_bytes: u64,
}

pub struct Context {
    pub(crate) path: PathBuf,
    pub(crate) array: CellArray,
    pub(crate) leaves: LeafStore,
    pub(crate) roots: BTreeMap<H256, CellIndex>,
}

impl Context {
    /// Opens the context at `path`, creating it when absent.
    pub fn open(path: impl AsRef<Path>, options: ContextOptions) -> Result<Self, TrieError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            let array = CellArray::open(&path)?;
            let roots: BTreeMap<H256, CellIndex> =
                read_sidecar(&sidecar(&path, "roots"))?.unwrap_or_default();
            let leaves: LeafStore = read_sidecar(&sidecar(&path, "leaves"))?.unwrap_or_default();
            if array.length() > 1 && leaves.is_empty() && !roots.is_empty() {
                warn!(path = %path.display(), "leaf store sidecar missing; values unreachable");
            }
            info!(
                path = %path.display(),
                cells = array.length(),
                roots = roots.len(),
                "opened context"
            );
            Ok(Context {
                path,
                array,
                leaves,
                roots,
            })
        } else {
            let array = CellArray::create(&path, options.initial_capacity)?;
            info!(path = %path.display(), capacity = array.capacity(), "created context");
            Ok(Context {
                path,
                array,
                leaves: LeafStore::new(),
                roots: BTreeMap::new(),
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks a committed root up by its digest.
    pub fn checkout(&self, digest: &H256) -> Option<NodeRef> {
        self.roots.get(digest).map(|index| NodeRef::Disk(*index))
    }

    /// Digests of all roots the context retains.
    pub fn root_digests(&self) -> Vec<H256> {
        self.roots.keys().copied().collect()
    }

    /// Drops a root from the table; its cells become garbage for the next
    /// GC. Returns whether the root was present.
    pub fn forget_root(&mut self, digest: &H256) -> Result<bool, TrieError> {
        let removed = self.roots.remove(digest).is_some();
        if removed {
            self.persist_sidecars()?;
            debug!(root = ?digest, "forgot root");
        }
        Ok(removed)
    }

    /// Read-only view of the leaf store, for diagnostics and tests.
    pub fn leaf_store(&self) -> &LeafStore {
        &self.leaves
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            committed_cells: self.array.length(),
            capacity_cells: self.array.capacity(),
            roots: self.roots.len(),
            leaf_values: self.leaves.len(),
            leaf_refs: self.leaves.total_refs(),
            leaf_bytes: self.leaves.value_bytes(),
        }
    }

    /// Extends the array file by `additional_cells`, e.g. after commit
    /// reported [`TrieError::OutOfSpace`].
    pub fn grow(&mut self, additional_cells: u64) -> Result<(), TrieError> {
        self.array.grow(additional_cells)?;
        info!(capacity = self.array.capacity(), "grew cell array");
        Ok(())
    }

    /// Returns a new root in which `path` leads to a leaf holding `value`,
    /// overwriting any previous leaf at that path.
    pub fn upsert(
        &mut self,
        root: &NodeRef,
        path: &TriePath,
        value: &[u8],
    ) -> Result<NodeRef, TrieError> {
        let digest = self.leaves.insert(value);
        let leaf = LeafNode { digest };
        let (first, rest) = path.split_first();
        match root.upsert_at(self, first.as_bits(), rest, &leaf) {
            Ok(new_root) => Ok(new_root),
            Err(err) => {
                // The traversal failed before the leaf was linked anywhere;
                // give its reference back.
                self.leaves.decr(&digest);
                Err(err)
            }
        }
    }

    /// Retrieves the value stored at `path` under `root`.
    pub fn get(&self, root: &NodeRef, path: &TriePath) -> Result<Option<Vec<u8>>, TrieError> {
        let (first, rest) = path.split_first();
        let Some(digest) = root.get_at(self, first.as_bits(), rest)? else {
            return Ok(None);
        };
        let value = self
            .leaves
            .get(&digest)
            .ok_or(TrieError::MissingLeaf(digest))?;
        Ok(Some(value.to_vec()))
    }

    /// Removes the leaf at `path`. Returns the new root and whether a leaf
    /// was actually removed; an absent path leaves the root unchanged.
    pub fn delete(
        &mut self,
        root: &NodeRef,
        path: &TriePath,
    ) -> Result<(NodeRef, bool), TrieError> {
        let (first, rest) = path.split_first();
        match root.delete_at(self, first.as_bits(), rest)? {
            None => Ok((root.clone(), false)),
            Some(new_root) => Ok((new_root, true)),
        }
    }

    pub(crate) fn decr_leaf(&mut self, digest: &H256) {
        self.leaves.decr(digest);
    }

    /// Resolves the root of the nested sub-trie behind the bud reached by
    /// walking `segments` from `root`.
    ///
    /// Returns `None` when no bud exists there. An empty segment list
    /// resolves to `root` itself. The returned handle can be traversed
    /// like any other root, with paths relative to the sub-trie.
    pub fn subtree(
        &self,
        root: &NodeRef,
        segments: &[Segment],
    ) -> Result<Option<NodeRef>, TrieError> {
        let mut node = root.clone();
        'segments: for segment in segments {
            let mut bits: &Bits = segment.as_bits();
            loop {
                let Some(view) = node.resolve(self)? else {
                    return Ok(None);
                };
                if bits.is_empty() {
                    match view.node() {
                        Node::Bud(bud) => {
                            node = bud.child.clone();
                            continue 'segments;
                        }
                        Node::Leaf(_) => {
                            return Err(TrieError::BudLeafConflict {
                                expected: "bud",
                                found: "leaf",
                            });
                        }
                        Node::Internal(_) => {
                            return Err(TrieError::BadPath("path ends at an internal node"));
                        }
                        // The boundary falls inside a compressed run.
                        Node::Extender(_) => return Ok(None),
                    }
                }
                match view.node() {
                    Node::Internal(internal) => {
                        let Some((side, tail)) = cut(bits) else {
                            unreachable!("bits are non-empty here");
                        };
                        node = internal.child(side).clone();
                        bits = tail;
                    }
                    Node::Extender(ext) => {
                        let len = ext.segment.len();
                        if bits.len() < len || &bits[..len] != ext.segment.as_bits() {
                            return Ok(None);
                        }
                        bits = &bits[len..];
                        node = ext.child.clone();
                    }
                    Node::Bud(_) => {
                        return Err(TrieError::BudLeafConflict {
                            expected: "subtree",
                            found: "bud",
                        });
                    }
                    Node::Leaf(_) => {
                        return Err(TrieError::BadPath("path continues past a leaf"));
                    }
                }
            }
        }
        Ok(Some(node))
    }

    /// Materializes the node stored at `index`.
    ///
    /// Children stay [`NodeRef::Disk`] references until themselves loaded;
    /// nothing is mutated.
    pub(crate) fn load_node(&self, index: CellIndex) -> Result<Arc<View>, TrieError> {
        self.check_node_index(index)?;
        let node = match cell::decode(index, self.array.cell(index))? {
            DecodedCell::Internal {
                left,
                right,
                digest,
            } => View::loaded(
                Node::Internal(InternalNode {
                    left: NodeRef::Disk(left),
                    right: NodeRef::Disk(right),
                }),
                digest,
                index,
            ),
            DecodedCell::Extender {
                segment,
                child,
                digest,
            } => View::loaded(
                Node::Extender(ExtenderNode {
                    segment,
                    child: NodeRef::Disk(child),
                }),
                digest,
                index,
            ),
            DecodedCell::Bud { child, digest } => View::loaded(
                Node::Bud(BudNode {
                    child: NodeRef::Disk(child),
                }),
                digest,
                index,
            ),
            DecodedCell::Leaf { digest } => {
                // The spare cell belongs to the leaf and must be committed
                // with it.
                if index + 1 >= self.array.length() {
                    return Err(TrieError::CorruptNode {
                        index,
                        reason: "leaf spare cell outside the committed area".into(),
                    });
                }
                cell::check_leaf_spare(index, self.array.cell(index + 1))?;
                View::loaded(Node::Leaf(LeafNode { digest }), digest, index)
            }
        };
        Ok(node)
    }

    /// Reads the digest of the node cell at `index` without materializing
    /// its children.
    pub(crate) fn cell_digest(&self, index: CellIndex) -> Result<H256, TrieError> {
        self.check_node_index(index)?;
        match cell::decode(index, self.array.cell(index))? {
            DecodedCell::Internal { digest, .. }
            | DecodedCell::Extender { digest, .. }
            | DecodedCell::Bud { digest, .. }
            | DecodedCell::Leaf { digest } => Ok(digest),
        }
    }

    pub(crate) fn check_node_index(&self, index: CellIndex) -> Result<(), TrieError> {
        if index == 0 {
            return Err(TrieError::CorruptNode {
                index,
                reason: "node reference into the header cell".into(),
            });
        }
        if index >= self.array.length() {
            return Err(TrieError::CorruptNode {
                index,
                reason: format!(
                    "node reference beyond the committed length {}",
                    self.array.length()
                ),
            });
        }
        Ok(())
    }

    /// Writes the root table and leaf store sidecars atomically.
    pub(crate) fn persist_sidecars(&self) -> Result<(), TrieError> {
        write_sidecar(&sidecar(&self.path, "roots"), &self.roots)?;
        write_sidecar(&sidecar(&self.path, "leaves"), &self.leaves)?;
        Ok(())
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn write_sidecar<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), TrieError> {
    let bytes =
        bincode::serialize(value).map_err(|err| TrieError::InvalidFile(err.to_string()))?;
    let tmp = sidecar(path, "tmp");
    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_sidecar<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, TrieError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    let value =
        bincode::deserialize(&bytes).map_err(|err| TrieError::InvalidFile(err.to_string()))?;
    Ok(Some(value))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node_hash::leaf_digest;

    #[test]
    fn open_creates_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.bramble");
        {
            let ctx = Context::open(&path, ContextOptions::default()).unwrap();
            assert_eq!(ctx.stats().committed_cells, 1);
            assert_eq!(ctx.stats().roots, 0);
        }
        let ctx = Context::open(&path, ContextOptions::default()).unwrap();
        assert_eq!(ctx.stats().committed_cells, 1);
    }

    #[test]
    fn checkout_unknown_digest_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::open(dir.path().join("ctx"), ContextOptions::default()).unwrap();
        assert!(ctx.checkout(&leaf_digest(b"nope")).is_none());
    }

    #[test]
    fn load_node_rejects_bad_indices() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::open(dir.path().join("ctx"), ContextOptions::default()).unwrap();
        assert!(matches!(
            ctx.load_node(0),
            Err(TrieError::CorruptNode { .. })
        ));
        assert!(matches!(
            ctx.load_node(1),
            Err(TrieError::CorruptNode { .. })
        ));
    }
}
