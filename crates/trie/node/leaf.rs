use primitive_types::H256;

use crate::context::Context;
use crate::error::TrieError;
use crate::node::NodeRef;
use crate::segment::{Bits, Segment};

/// End of a path: holds the digest of a value in the leaf store.
#[derive(Debug, Clone)]
pub struct LeafNode {
    pub digest: H256,
}

impl LeafNode {
    pub(crate) fn get(&self, seg: &Bits, rest: &[Segment]) -> Result<Option<H256>, TrieError> {
        self.check_terminal(seg, rest)?;
        Ok(Some(self.digest))
    }

    pub(crate) fn upsert(
        &self,
        ctx: &mut Context,
        seg: &Bits,
        rest: &[Segment],
        leaf: &LeafNode,
    ) -> Result<NodeRef, TrieError> {
        self.check_terminal(seg, rest)?;
        // Overwrite: the previous value loses this reference.
        ctx.decr_leaf(&self.digest);
        Ok(NodeRef::leaf(leaf.digest))
    }

    pub(crate) fn delete(
        &self,
        ctx: &mut Context,
        seg: &Bits,
        rest: &[Segment],
    ) -> Result<Option<NodeRef>, TrieError> {
        self.check_terminal(seg, rest)?;
        ctx.decr_leaf(&self.digest);
        Ok(Some(NodeRef::Null))
    }

    /// A leaf terminates the whole path; anything left over is malformed.
    fn check_terminal(&self, seg: &Bits, rest: &[Segment]) -> Result<(), TrieError> {
        if !seg.is_empty() {
            return Err(TrieError::BadPath("path continues past a leaf"));
        }
        if !rest.is_empty() {
            return Err(TrieError::BudLeafConflict {
                expected: "bud",
                found: "leaf",
            });
        }
        Ok(())
    }
}
