use primitive_types::H256;

use crate::context::Context;
use crate::error::TrieError;
use crate::node::{LeafNode, NodeRef};
use crate::segment::{Bits, Segment};

/// End of a path segment: the root of a nested sub-trie.
///
/// Buds only occur at segment boundaries, so a traversal reaching one must
/// have exhausted its current segment and must have further segments left.
#[derive(Debug, Clone)]
pub struct BudNode {
    pub child: NodeRef,
}

impl BudNode {
    pub(crate) fn get(
        &self,
        ctx: &Context,
        seg: &Bits,
        rest: &[Segment],
    ) -> Result<Option<H256>, TrieError> {
        if !seg.is_empty() {
            return Err(TrieError::BudLeafConflict {
                expected: "subtree",
                found: "bud",
            });
        }
        match rest.split_first() {
            None => Err(TrieError::BudLeafConflict {
                expected: "leaf",
                found: "bud",
            }),
            Some((next, rest)) => self.child.get_at(ctx, next.as_bits(), rest),
        }
    }

    pub(crate) fn upsert(
        &self,
        ctx: &mut Context,
        seg: &Bits,
        rest: &[Segment],
        leaf: &LeafNode,
    ) -> Result<NodeRef, TrieError> {
        if !seg.is_empty() {
            return Err(TrieError::BudLeafConflict {
                expected: "subtree",
                found: "bud",
            });
        }
        match rest.split_first() {
            None => Err(TrieError::BudLeafConflict {
                expected: "leaf",
                found: "bud",
            }),
            Some((next, rest)) => {
                let child = self.child.upsert_at(ctx, next.as_bits(), rest, leaf)?;
                Ok(NodeRef::bud(child))
            }
        }
    }

    pub(crate) fn delete(
        &self,
        ctx: &mut Context,
        seg: &Bits,
        rest: &[Segment],
    ) -> Result<Option<NodeRef>, TrieError> {
        if !seg.is_empty() {
            return Err(TrieError::BudLeafConflict {
                expected: "subtree",
                found: "bud",
            });
        }
        match rest.split_first() {
            None => Err(TrieError::BudLeafConflict {
                expected: "leaf",
                found: "bud",
            }),
            Some((next, rest)) => match self.child.delete_at(ctx, next.as_bits(), rest)? {
                None => Ok(None),
                // The nested sub-trie emptied out; the bud dissolves with it.
                Some(child) if child.is_null() => Ok(Some(NodeRef::Null)),
                Some(child) => Ok(Some(NodeRef::bud(child))),
            },
        }
    }
}
