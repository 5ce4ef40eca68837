mod bud;
mod extender;
mod internal;
mod leaf;

use std::sync::{Arc, OnceLock};

pub use bud::BudNode;
pub use extender::ExtenderNode;
pub use internal::InternalNode;
pub use leaf::LeafNode;
use primitive_types::H256;

use crate::context::Context;
use crate::error::TrieError;
use crate::node_hash::{EMPTY_DIGEST, bud_digest, extender_digest, internal_digest};
use crate::segment::{Bits, Segment, Side};

/// Index of a cell in the on-disk array. Cell 0 holds the file header and
/// is never a valid node index.
pub type CellIndex = u64;

/// A reference to a node.
///
/// `Null` marks an absent subtree, `Disk` an unresolved reference into the
/// cell array, and `View` a materialized in-memory node. Handles are cheap
/// to clone; in-memory subtrees are shared through `Arc`.
#[derive(Clone, Debug)]
pub enum NodeRef {
    Null,
    Disk(CellIndex),
    View(Arc<View>),
}

/// A materialized node together with its persistence state.
///
/// The digest cache and cell index double as the hashed/indexed state: a
/// view is *hashed* once its digest is computed and *indexed* once commit
/// assigned it a cell. Both only ever move forward, which is what makes an
/// indexed subtree safely shareable between handles.
#[derive(Debug)]
pub struct View {
    node: Node,
    digest: OnceLock<H256>,
    index: OnceLock<CellIndex>,
}

impl View {
    /// A freshly built node: not hashed, not indexed.
    pub(crate) fn fresh(node: Node) -> Arc<View> {
        Arc::new(View {
            node,
            digest: OnceLock::new(),
            index: OnceLock::new(),
        })
    }

    /// A node decoded from the array: hashed and indexed from birth.
    pub(crate) fn loaded(node: Node, digest: H256, index: CellIndex) -> Arc<View> {
        let view = View {
            node,
            digest: OnceLock::new(),
            index: OnceLock::new(),
        };
        let _ = view.digest.set(digest);
        let _ = view.index.set(index);
        Arc::new(view)
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn index(&self) -> Option<CellIndex> {
        self.index.get().copied()
    }

    pub fn is_indexed(&self) -> bool {
        self.index.get().is_some()
    }

    pub fn cached_digest(&self) -> Option<H256> {
        self.digest.get().copied()
    }

    pub fn is_hashed(&self) -> bool {
        self.digest.get().is_some()
    }

    /// Computes (and caches) the digest, forcing the children's digests.
    pub fn digest(&self, ctx: &Context) -> Result<H256, TrieError> {
        if let Some(digest) = self.digest.get() {
            return Ok(*digest);
        }
        let digest = match &self.node {
            Node::Internal(node) => {
                internal_digest(&node.left.digest(ctx)?, &node.right.digest(ctx)?)
            }
            Node::Extender(node) => extender_digest(&node.segment, &node.child.digest(ctx)?),
            Node::Bud(node) => bud_digest(&node.child.digest(ctx)?),
            Node::Leaf(node) => node.digest,
        };
        Ok(*self.digest.get_or_init(|| digest))
    }

    pub(crate) fn set_index(&self, index: CellIndex) {
        let assigned = *self.index.get_or_init(|| index);
        debug_assert_eq!(assigned, index, "cell index assigned twice");
    }

    /// Caches `digest`, keeping an earlier cached value when present.
    pub(crate) fn note_digest(&self, digest: H256) -> H256 {
        let cached = *self.digest.get_or_init(|| digest);
        debug_assert_eq!(cached, digest, "conflicting digests for one node");
        cached
    }
}

/// A node of the trie.
#[derive(Debug, Clone)]
pub enum Node {
    /// Branch on one bit of the current segment.
    Internal(InternalNode),
    /// Compressed run of bits with a single child.
    Extender(ExtenderNode),
    /// End of a path segment; root of a nested sub-trie.
    Bud(BudNode),
    /// End of a path; holds the digest of a stored value.
    Leaf(LeafNode),
}

impl NodeRef {
    /// Builds an internal node placing `fresh` on `side`.
    pub(crate) fn internal(fresh: NodeRef, other: NodeRef, side: Side) -> NodeRef {
        let (left, right) = match side {
            Side::Left => (fresh, other),
            Side::Right => (other, fresh),
        };
        NodeRef::View(View::fresh(Node::Internal(InternalNode { left, right })))
    }

    /// Wraps `child` in an extender over `segment`.
    ///
    /// Returns `child` unchanged when the segment is empty and collapses a
    /// nested extender, so two extenders never chain.
    pub(crate) fn extend(
        ctx: &Context,
        segment: Segment,
        child: NodeRef,
    ) -> Result<NodeRef, TrieError> {
        if segment.is_empty() {
            return Ok(child);
        }
        if let Some(view) = child.resolve(ctx)? {
            if let Node::Extender(inner) = view.node() {
                return Ok(NodeRef::View(View::fresh(Node::Extender(ExtenderNode {
                    segment: segment.concat(&inner.segment),
                    child: inner.child.clone(),
                }))));
            }
        }
        Ok(NodeRef::View(View::fresh(Node::Extender(ExtenderNode {
            segment,
            child,
        }))))
    }

    pub(crate) fn bud(child: NodeRef) -> NodeRef {
        NodeRef::View(View::fresh(Node::Bud(BudNode { child })))
    }

    pub(crate) fn leaf(digest: H256) -> NodeRef {
        NodeRef::View(View::fresh(Node::Leaf(LeafNode { digest })))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, NodeRef::Null)
    }

    /// The assigned cell index, when this reference is indexed.
    pub fn index(&self) -> Option<CellIndex> {
        match self {
            NodeRef::Null => None,
            NodeRef::Disk(index) => Some(*index),
            NodeRef::View(view) => view.index(),
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.index().is_some()
    }

    /// Digest of the referenced subtree; the empty digest for `Null`.
    pub fn digest(&self, ctx: &Context) -> Result<H256, TrieError> {
        match self {
            NodeRef::Null => Ok(EMPTY_DIGEST),
            NodeRef::Disk(index) => ctx.cell_digest(*index),
            NodeRef::View(view) => view.digest(ctx),
        }
    }

    /// Materializes the referenced node, loading it from the array when
    /// necessary. `Null` resolves to `None`.
    pub(crate) fn resolve(&self, ctx: &Context) -> Result<Option<Arc<View>>, TrieError> {
        match self {
            NodeRef::Null => Ok(None),
            NodeRef::Disk(index) => ctx.load_node(*index).map(Some),
            NodeRef::View(view) => Ok(Some(view.clone())),
        }
    }

    /// Retrieves the value digest reachable over `(seg, rest)`.
    pub(crate) fn get_at(
        &self,
        ctx: &Context,
        seg: &Bits,
        rest: &[Segment],
    ) -> Result<Option<H256>, TrieError> {
        let Some(view) = self.resolve(ctx)? else {
            return Ok(None);
        };
        match view.node() {
            Node::Internal(node) => node.get(ctx, seg, rest),
            Node::Extender(node) => node.get(ctx, seg, rest),
            Node::Bud(node) => node.get(ctx, seg, rest),
            Node::Leaf(node) => node.get(seg, rest),
        }
    }

    /// Rebuilds this subtree so that `(seg, rest)` leads to `leaf`.
    pub(crate) fn upsert_at(
        &self,
        ctx: &mut Context,
        seg: &Bits,
        rest: &[Segment],
        leaf: &LeafNode,
    ) -> Result<NodeRef, TrieError> {
        let Some(view) = self.resolve(ctx)? else {
            return NodeRef::grow_chain(ctx, seg, rest, leaf);
        };
        match view.node() {
            Node::Internal(node) => node.upsert(ctx, seg, rest, leaf),
            Node::Extender(node) => node.upsert(ctx, seg, rest, leaf),
            Node::Bud(node) => node.upsert(ctx, seg, rest, leaf),
            Node::Leaf(node) => node.upsert(ctx, seg, rest, leaf),
        }
    }

    /// Builds the chain for a path below an absent subtree: extenders over
    /// the remaining bits, buds at every remaining segment boundary, the
    /// leaf at the end.
    pub(crate) fn grow_chain(
        ctx: &Context,
        seg: &Bits,
        rest: &[Segment],
        leaf: &LeafNode,
    ) -> Result<NodeRef, TrieError> {
        let tip = match rest.split_first() {
            None => NodeRef::leaf(leaf.digest),
            Some((next, rest)) => {
                NodeRef::bud(NodeRef::grow_chain(ctx, next.as_bits(), rest, leaf)?)
            }
        };
        NodeRef::extend(ctx, Segment::from_bits(seg), tip)
    }

    /// Removes the leaf at `(seg, rest)`.
    ///
    /// `None` means the path is absent and the subtree unchanged; otherwise
    /// the rebuilt subtree is returned, `NodeRef::Null` when it became
    /// empty.
    pub(crate) fn delete_at(
        &self,
        ctx: &mut Context,
        seg: &Bits,
        rest: &[Segment],
    ) -> Result<Option<NodeRef>, TrieError> {
        let Some(view) = self.resolve(ctx)? else {
            return Ok(None);
        };
        match view.node() {
            Node::Internal(node) => node.delete(ctx, seg, rest),
            Node::Extender(node) => node.delete(ctx, seg, rest),
            Node::Bud(node) => node.delete(ctx, seg, rest),
            Node::Leaf(node) => node.delete(ctx, seg, rest),
        }
    }
}

impl From<Arc<View>> for NodeRef {
    fn from(view: Arc<View>) -> Self {
        NodeRef::View(view)
    }
}
