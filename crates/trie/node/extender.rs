use primitive_types::H256;

use crate::context::Context;
use crate::error::TrieError;
use crate::node::{LeafNode, NodeRef};
use crate::segment::{Bits, Segment, cut, split_common};

/// A compressed run of bits with a single child.
///
/// The segment is never empty and the child is never another extender;
/// construction through [`NodeRef::extend`] maintains both.
#[derive(Debug, Clone)]
pub struct ExtenderNode {
    pub segment: Segment,
    pub child: NodeRef,
}

impl ExtenderNode {
    pub(crate) fn get(
        &self,
        ctx: &Context,
        seg: &Bits,
        rest: &[Segment],
    ) -> Result<Option<H256>, TrieError> {
        let (_, seg_tail, ext_tail) = split_common(seg, self.segment.as_bits());
        if !ext_tail.is_empty() {
            // The path diverges from the run or stops inside it; either way
            // nothing is stored there.
            return Ok(None);
        }
        self.child.get_at(ctx, seg_tail, rest)
    }

    pub(crate) fn upsert(
        &self,
        ctx: &mut Context,
        seg: &Bits,
        rest: &[Segment],
        leaf: &LeafNode,
    ) -> Result<NodeRef, TrieError> {
        let (prefix, seg_tail, ext_tail) = split_common(seg, self.segment.as_bits());
        match (cut(seg_tail), cut(ext_tail)) {
            // The run matches (possibly with path bits left over): continue
            // below it.
            (_, None) => {
                let child = self.child.upsert_at(ctx, seg_tail, rest, leaf)?;
                NodeRef::extend(ctx, self.segment.clone(), child)
            }
            // The path stops strictly inside the run: no node exists there
            // to hold a leaf or a bud.
            (None, Some(_)) => Err(TrieError::BadPath("path ends inside an extender")),
            // First differing bit: split the run into a branch holding the
            // new chain on one side and the shortened run on the other.
            (Some((new_side, new_tail)), Some((old_side, old_tail))) => {
                debug_assert_ne!(new_side, old_side);
                let fresh = NodeRef::grow_chain(ctx, new_tail, rest, leaf)?;
                let kept = NodeRef::extend(ctx, Segment::from_bits(old_tail), self.child.clone())?;
                let branch = NodeRef::internal(fresh, kept, new_side);
                NodeRef::extend(ctx, Segment::from_bits(prefix), branch)
            }
        }
    }

    pub(crate) fn delete(
        &self,
        ctx: &mut Context,
        seg: &Bits,
        rest: &[Segment],
    ) -> Result<Option<NodeRef>, TrieError> {
        let (_, seg_tail, ext_tail) = split_common(seg, self.segment.as_bits());
        if !ext_tail.is_empty() {
            return Ok(None);
        }
        let Some(child) = self.child.delete_at(ctx, seg_tail, rest)? else {
            return Ok(None);
        };
        if child.is_null() {
            return Ok(Some(NodeRef::Null));
        }
        let rebuilt = NodeRef::extend(ctx, self.segment.clone(), child)?;
        Ok(Some(rebuilt))
    }
}
