use primitive_types::H256;

use crate::context::Context;
use crate::error::TrieError;
use crate::node::{LeafNode, NodeRef};
use crate::segment::{Bits, Segment, Side, cut};

/// Branch on one bit of the current segment.
///
/// An internal node never sits at a segment boundary: a path reaching it
/// with an exhausted segment is malformed.
#[derive(Debug, Clone)]
pub struct InternalNode {
    pub left: NodeRef,
    pub right: NodeRef,
}

impl InternalNode {
    pub fn child(&self, side: Side) -> &NodeRef {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub(crate) fn get(
        &self,
        ctx: &Context,
        seg: &Bits,
        rest: &[Segment],
    ) -> Result<Option<H256>, TrieError> {
        let Some((side, tail)) = cut(seg) else {
            return Err(TrieError::BadPath("path ends at an internal node"));
        };
        self.child(side).get_at(ctx, tail, rest)
    }

    pub(crate) fn upsert(
        &self,
        ctx: &mut Context,
        seg: &Bits,
        rest: &[Segment],
        leaf: &LeafNode,
    ) -> Result<NodeRef, TrieError> {
        let Some((side, tail)) = cut(seg) else {
            return Err(TrieError::BadPath("path ends at an internal node"));
        };
        let child = self.child(side).upsert_at(ctx, tail, rest, leaf)?;
        Ok(NodeRef::internal(
            child,
            self.child(side.flip()).clone(),
            side,
        ))
    }

    pub(crate) fn delete(
        &self,
        ctx: &mut Context,
        seg: &Bits,
        rest: &[Segment],
    ) -> Result<Option<NodeRef>, TrieError> {
        let Some((side, tail)) = cut(seg) else {
            return Err(TrieError::BadPath("path ends at an internal node"));
        };
        let Some(child) = self.child(side).delete_at(ctx, tail, rest)? else {
            return Ok(None);
        };
        if child.is_null() {
            // One side emptied out: the branch degenerates into an extender
            // over the surviving direction.
            let surviving = self.child(side.flip()).clone();
            if surviving.is_null() {
                return Ok(Some(NodeRef::Null));
            }
            let collapsed = NodeRef::extend(ctx, Segment::single(side.flip()), surviving)?;
            return Ok(Some(collapsed));
        }
        Ok(Some(NodeRef::internal(
            child,
            self.child(side.flip()).clone(),
            side,
        )))
    }
}
