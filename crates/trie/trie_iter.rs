use primitive_types::H256;

use crate::context::Context;
use crate::error::TrieError;
use crate::node::{Node, NodeRef};
use crate::segment::{Segment, Side, TriePath};

/// Depth-first iterator over the leaves of a root, left to right.
///
/// Yields each leaf's full path together with its value digest; values can
/// be resolved through the context's leaf store. Disk nodes are
/// materialized on the way down, so iteration can surface decode errors.
pub struct TrieIterator<'a> {
    ctx: &'a Context,
    stack: Vec<Frame>,
}

struct Frame {
    node: NodeRef,
    /// Completed path segments above this node.
    segments: Vec<Segment>,
    /// Bits walked since the last bud boundary.
    partial: Segment,
}

impl<'a> TrieIterator<'a> {
    pub fn new(ctx: &'a Context, root: NodeRef) -> Self {
        TrieIterator {
            ctx,
            stack: vec![Frame {
                node: root,
                segments: Vec::new(),
                partial: Segment::new(),
            }],
        }
    }
}

impl Iterator for TrieIterator<'_> {
    type Item = Result<(TriePath, H256), TrieError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            let view = match frame.node.resolve(self.ctx) {
                Ok(Some(view)) => view,
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            };
            match view.node() {
                Node::Internal(node) => {
                    // Right first so the left branch pops first.
                    self.stack.push(Frame {
                        node: node.right.clone(),
                        segments: frame.segments.clone(),
                        partial: frame.partial.concat(&Segment::single(Side::Right)),
                    });
                    self.stack.push(Frame {
                        node: node.left.clone(),
                        segments: frame.segments,
                        partial: frame.partial.concat(&Segment::single(Side::Left)),
                    });
                }
                Node::Extender(node) => {
                    self.stack.push(Frame {
                        node: node.child.clone(),
                        segments: frame.segments,
                        partial: frame.partial.concat(&node.segment),
                    });
                }
                Node::Bud(node) => {
                    let mut segments = frame.segments;
                    segments.push(frame.partial);
                    self.stack.push(Frame {
                        node: node.child.clone(),
                        segments,
                        partial: Segment::new(),
                    });
                }
                Node::Leaf(node) => {
                    let mut segments = frame.segments;
                    segments.push(frame.partial);
                    return Some(TriePath::new(segments).map(|path| (path, node.digest)));
                }
            }
        }
        None
    }
}
