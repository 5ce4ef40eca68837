//! Commit: flushing a dirty subtree into the cell array.
//!
//! Commit walks the unindexed part of a root post-order, computing digests
//! on the way and appending one cell per node (two per leaf) beyond the
//! committed length. Children always land below their parents; when an
//! internal node has a choice, the left child takes the cell(s) directly
//! below the parent so its index can be elided from the parent cell.
//!
//! Nothing observable changes until the whole subtree is written: cell
//! indices are staged and only assigned to the in-memory views after the
//! last cell landed, and the header length, root table and sidecars are
//! updated last. A commit that fails with `OutOfSpace` or an I/O error
//! leaves the context as it was; the scratch cells it may have written are
//! dead and get overwritten by the next commit.

use std::sync::Arc;

use primitive_types::H256;
use tracing::info;

use crate::cell::{self, ChildSlot};
use crate::context::Context;
use crate::error::TrieError;
use crate::node::{CellIndex, Node, NodeRef, View};
use crate::node_hash::{EMPTY_DIGEST, bud_digest, extender_digest, internal_digest};
use crate::segment::Side;

impl Context {
    /// Writes every unindexed node under `root` into the array, records the
    /// root digest in the root table and returns the (now indexed) root
    /// with its digest.
    ///
    /// Committing an already indexed root only re-records it: same digest,
    /// no new cells.
    pub fn commit(&mut self, root: &NodeRef) -> Result<(NodeRef, H256), TrieError> {
        if root.is_null() {
            return Ok((NodeRef::Null, EMPTY_DIGEST));
        }
        if let Some(index) = root.index() {
            let digest = self.cell_digest(index)?;
            self.roots.insert(digest, index);
            self.persist_sidecars()?;
            self.array.flush()?;
            return Ok((root.clone(), digest));
        }

        let mut cursor = self.array.length();
        let mut staged: Vec<(Arc<View>, CellIndex)> = Vec::new();
        let (index, digest) = self.write_subtree(root, &mut cursor, &mut staged)?;

        // Every cell landed; publish.
        for (view, assigned) in &staged {
            view.set_index(*assigned);
        }
        let cells = cursor - self.array.length();
        self.array.set_length(cursor);
        self.roots.insert(digest, index);
        self.persist_sidecars()?;
        self.array.flush()?;
        info!(cells, index, root = ?digest, "committed root");
        Ok((root.clone(), digest))
    }

    fn write_subtree(
        &mut self,
        node: &NodeRef,
        cursor: &mut u64,
        staged: &mut Vec<(Arc<View>, CellIndex)>,
    ) -> Result<(CellIndex, H256), TrieError> {
        // Indexed subtrees are immutable and reused as-is.
        if let Some(index) = node.index() {
            let digest = match node {
                NodeRef::View(view) => view
                    .cached_digest()
                    .expect("indexed node must carry a digest"),
                _ => self.cell_digest(index)?,
            };
            return Ok((index, digest));
        }
        let NodeRef::View(view) = node else {
            panic!("null node reached during commit");
        };

        let (index, digest) = match view.node() {
            Node::Leaf(leaf) => {
                let index = self.alloc(cursor, 2)?;
                let bytes = cell::encode_leaf(&leaf.digest);
                self.array.cell_mut(index).copy_from_slice(&bytes);
                let spare = cell::encode_leaf_spare();
                self.array.cell_mut(index + 1).copy_from_slice(&spare);
                (index, leaf.digest)
            }
            Node::Bud(bud) => {
                let (child, child_digest) = self.write_subtree(&bud.child, cursor, staged)?;
                let digest = bud_digest(&child_digest);
                let index = self.alloc(cursor, 1)?;
                let bytes = cell::encode_bud(child, &digest);
                self.array.cell_mut(index).copy_from_slice(&bytes);
                (index, digest)
            }
            Node::Extender(ext) => {
                let (child, child_digest) = self.write_subtree(&ext.child, cursor, staged)?;
                let digest = extender_digest(&ext.segment, &child_digest);
                let index = self.alloc(cursor, 1)?;
                let bytes = cell::encode_extender(&ext.segment, child, &digest);
                self.array.cell_mut(index).copy_from_slice(&bytes);
                (index, digest)
            }
            Node::Internal(internal) => {
                // Write the child that will sit adjacent to the parent
                // last: the left one when both need writing, otherwise the
                // single unindexed one (there is always at least one, or
                // the parent itself would already be indexed).
                let (left, right, elided) = if !internal.left.is_indexed() {
                    let right = self.write_subtree(&internal.right, cursor, staged)?;
                    let left = self.write_subtree(&internal.left, cursor, staged)?;
                    (left, right, Some(Side::Left))
                } else if !internal.right.is_indexed() {
                    let left = self.write_subtree(&internal.left, cursor, staged)?;
                    let right = self.write_subtree(&internal.right, cursor, staged)?;
                    (left, right, Some(Side::Right))
                } else {
                    let left = self.write_subtree(&internal.left, cursor, staged)?;
                    let right = self.write_subtree(&internal.right, cursor, staged)?;
                    (left, right, None)
                };
                let digest = internal_digest(&left.1, &right.1);
                let index = self.alloc(cursor, 1)?;
                let (left_slot, right_slot) = match elided {
                    Some(Side::Left) => {
                        let leaf = is_leaf_view(&internal.left);
                        debug_assert_eq!(left.0, index - if leaf { 2 } else { 1 });
                        (ChildSlot::Adjacent { leaf }, ChildSlot::Explicit(right.0))
                    }
                    Some(Side::Right) => {
                        let leaf = is_leaf_view(&internal.right);
                        debug_assert_eq!(right.0, index - if leaf { 2 } else { 1 });
                        (ChildSlot::Explicit(left.0), ChildSlot::Adjacent { leaf })
                    }
                    None => (ChildSlot::Explicit(left.0), ChildSlot::Explicit(right.0)),
                };
                let bytes = cell::encode_internal(left_slot, right_slot, &digest);
                self.array.cell_mut(index).copy_from_slice(&bytes);
                (index, digest)
            }
        };

        let digest = view.note_digest(digest);
        staged.push((view.clone(), index));
        Ok((index, digest))
    }

    fn alloc(&self, cursor: &mut u64, cells: u64) -> Result<CellIndex, TrieError> {
        let capacity = self.array.capacity();
        if *cursor + cells > capacity {
            return Err(TrieError::OutOfSpace {
                needed: *cursor + cells - capacity,
                available: capacity - *cursor,
            });
        }
        let index = *cursor;
        *cursor += cells;
        Ok(index)
    }
}

fn is_leaf_view(node: &NodeRef) -> bool {
    matches!(node, NodeRef::View(view) if matches!(view.node(), Node::Leaf(_)))
}
