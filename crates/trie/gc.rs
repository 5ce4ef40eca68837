//! Stop-and-copy compaction of the cell array.
//!
//! GC copies every cell reachable from the root table into a fresh array
//! file, children before parents so the copied file satisfies the same
//! ordering the commit path produces, then atomically replaces the array
//! (a rename; the new mapping stays valid across it). The leaf store is
//! rebuilt from the copied leaves, which drops references leaked by edits
//! that were abandoned before a commit, and the root table is rewritten
//! with the new indices. Root digests never change.
//!
//! Copying rewrites child references as explicit indices; the adjacency
//! elision is an encoding option of commit, not an invariant of the file.
//!
//! The copy is stop-the-world for the context: `Disk` handles issued
//! before a GC refer to the old cell numbering and must be re-acquired
//! through [`Context::checkout`].

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::array::CellArray;
use crate::cell::{self, ChildSlot, DecodedCell};
use crate::context::Context;
use crate::error::TrieError;
use crate::leaf_store::LeafStore;
use crate::node::CellIndex;

/// Smallest post-GC capacity; the copy gets semispace-style headroom of
/// twice its live size, so small contexts do not have to grow immediately.
const GC_MIN_CAPACITY: u64 = 4096;

impl Context {
    /// Compacts the array down to the cells reachable from the root table.
    pub fn gc(&mut self) -> Result<(), TrieError> {
        let scratch = {
            let mut name: OsString = self.path.as_os_str().to_os_string();
            name.push(".gc");
            PathBuf::from(name)
        };
        match self.collect_into(&scratch) {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = std::fs::remove_file(&scratch);
                Err(err)
            }
        }
    }

    fn collect_into(&mut self, scratch: &Path) -> Result<(), TrieError> {
        let before = self.array.length();

        // The live set is a subset of the committed cells, so the old
        // length bounds the copy.
        let mut dst = CellArray::create(scratch, before)?;
        let mut cursor = 1u64;
        let mut forwarded: HashMap<CellIndex, CellIndex> = HashMap::new();
        let mut leaves = LeafStore::new();
        let mut roots = BTreeMap::new();
        for (digest, index) in &self.roots {
            let moved =
                self.copy_reachable(*index, &mut dst, &mut cursor, &mut forwarded, &mut leaves)?;
            roots.insert(*digest, moved);
        }
        dst.set_length(cursor);
        dst.resize((cursor * 2).max(GC_MIN_CAPACITY))?;
        dst.flush()?;

        // Publish: the rename swaps the file under the old context; the new
        // mapping was taken from the scratch file and survives the rename.
        std::fs::rename(scratch, &self.path)?;
        self.array = dst;
        self.leaves = leaves;
        self.roots = roots;
        self.persist_sidecars()?;
        info!(
            live = cursor - 1,
            reclaimed = before - cursor,
            roots = self.roots.len(),
            "garbage collected"
        );
        Ok(())
    }

    /// Copies the subtree rooted at `index` into `dst`, post-order, and
    /// returns its new index. Shared subtrees are copied once.
    fn copy_reachable(
        &self,
        index: CellIndex,
        dst: &mut CellArray,
        cursor: &mut u64,
        forwarded: &mut HashMap<CellIndex, CellIndex>,
        leaves: &mut LeafStore,
    ) -> Result<CellIndex, TrieError> {
        if let Some(moved) = forwarded.get(&index) {
            return Ok(*moved);
        }
        self.check_node_index(index)?;
        let moved = match cell::decode(index, self.array.cell(index))? {
            DecodedCell::Leaf { digest } => {
                self.check_node_index(index + 1)?;
                cell::check_leaf_spare(index, self.array.cell(index + 1))?;
                let value = self
                    .leaves
                    .get(&digest)
                    .ok_or(TrieError::MissingLeaf(digest))?;
                let interned = leaves.insert(value);
                debug_assert_eq!(interned, digest);
                let moved = *cursor;
                *cursor += 2;
                dst.cell_mut(moved).copy_from_slice(&cell::encode_leaf(&digest));
                let spare = cell::encode_leaf_spare();
                dst.cell_mut(moved + 1).copy_from_slice(&spare);
                moved
            }
            DecodedCell::Bud { child, digest } => {
                let child = self.copy_reachable(child, dst, cursor, forwarded, leaves)?;
                let moved = *cursor;
                *cursor += 1;
                dst.cell_mut(moved)
                    .copy_from_slice(&cell::encode_bud(child, &digest));
                moved
            }
            DecodedCell::Extender {
                segment,
                child,
                digest,
            } => {
                let child = self.copy_reachable(child, dst, cursor, forwarded, leaves)?;
                let moved = *cursor;
                *cursor += 1;
                dst.cell_mut(moved)
                    .copy_from_slice(&cell::encode_extender(&segment, child, &digest));
                moved
            }
            DecodedCell::Internal {
                left,
                right,
                digest,
            } => {
                let left = self.copy_reachable(left, dst, cursor, forwarded, leaves)?;
                let right = self.copy_reachable(right, dst, cursor, forwarded, leaves)?;
                let moved = *cursor;
                *cursor += 1;
                let bytes = cell::encode_internal(
                    ChildSlot::Explicit(left),
                    ChildSlot::Explicit(right),
                    &digest,
                );
                dst.cell_mut(moved).copy_from_slice(&bytes);
                moved
            }
        };
        forwarded.insert(index, moved);
        Ok(moved)
    }
}
