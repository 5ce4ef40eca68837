//! Structural invariant checks, for tests and debug builds.

use crate::context::Context;
use crate::error::TrieError;
use crate::node::{Node, NodeRef};

/// Walks the whole tree under `root` (materializing disk nodes) and
/// returns a description of every violated structural invariant.
pub fn check_tree(ctx: &Context, root: &NodeRef) -> Result<Vec<String>, TrieError> {
    let mut violations = Vec::new();
    walk(ctx, root, true, &mut violations, true)?;
    Ok(violations)
}

/// Checks only the in-memory part of the tree, stopping at disk
/// references. Cheap enough to run after every edit in debug builds.
pub fn check_views(ctx: &Context, root: &NodeRef) -> Result<Vec<String>, TrieError> {
    let mut violations = Vec::new();
    walk(ctx, root, false, &mut violations, true)?;
    Ok(violations)
}

fn walk(
    ctx: &Context,
    node: &NodeRef,
    follow_disk: bool,
    violations: &mut Vec<String>,
    is_root: bool,
) -> Result<(), TrieError> {
    let view = match node {
        NodeRef::Null => {
            if !is_root {
                violations.push("null node below the root".into());
            }
            return Ok(());
        }
        NodeRef::Disk(index) => {
            if !follow_disk {
                return Ok(());
            }
            ctx.load_node(*index)?
        }
        NodeRef::View(view) => view.clone(),
    };

    if view.is_indexed() && !view.is_hashed() {
        violations.push("indexed node without a digest".into());
    }

    match view.node() {
        Node::Internal(internal) => {
            if internal.left.is_null() && internal.right.is_null() {
                violations.push("internal node with two null children".into());
            }
            if view.is_hashed() && !(is_hashed(&internal.left) && is_hashed(&internal.right)) {
                violations.push("hashed internal node with an unhashed child".into());
            }
            if !view.is_indexed() && internal.left.is_indexed() && internal.right.is_indexed() {
                violations.push("unindexed internal node with two indexed children".into());
            }
            walk(ctx, &internal.left, follow_disk, violations, false)?;
            walk(ctx, &internal.right, follow_disk, violations, false)?;
        }
        Node::Extender(ext) => {
            if ext.segment.is_empty() {
                violations.push("extender with an empty segment".into());
            }
            if ext.child.is_null() {
                violations.push("extender over a null child".into());
            }
            if let Some(child) = ext.child.resolve(ctx).ok().flatten() {
                if matches!(child.node(), Node::Extender(_)) {
                    violations.push("extender chained into an extender".into());
                }
            }
            if view.is_hashed() && !is_hashed(&ext.child) {
                violations.push("hashed extender with an unhashed child".into());
            }
            walk(ctx, &ext.child, follow_disk, violations, false)?;
        }
        Node::Bud(bud) => {
            if view.is_hashed() && !is_hashed(&bud.child) {
                violations.push("hashed bud with an unhashed child".into());
            }
            walk(ctx, &bud.child, follow_disk, violations, false)?;
        }
        Node::Leaf(_) => {}
    }
    Ok(())
}

fn is_hashed(node: &NodeRef) -> bool {
    match node {
        // Disk cells always carry their digest.
        NodeRef::Null | NodeRef::Disk(_) => true,
        NodeRef::View(view) => view.is_hashed(),
    }
}
