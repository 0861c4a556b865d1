//! YieldFinder (§4.3): locates the unique `yield` in a fully exposed subtree.

use jscomp_genlower_ast::{Arena, NodeId};
use jscomp_genlower_diagnostics::InternalError;

/// Depth-first search for the unique `yield` node reachable from `root` without crossing into
/// nested function bodies.
///
/// This is only ever called on subtrees that `YieldExposer` has already normalized, so finding
/// zero or more than one `yield` is an internal invariant violation (§7: "Internal invariants ...
/// are not reported through the user diagnostic channel; they signal a bug in the pass itself"),
/// not a recoverable condition.
pub fn find_unique_yield(arena: &Arena, root: NodeId) -> Result<NodeId, InternalError> {
    let mut found = Vec::new();
    collect_yields(arena, root, &mut found);
    match found.len() {
        1 => Ok(found[0]),
        count => Err(InternalError::YieldCountMismatch { count }),
    }
}

fn collect_yields(arena: &Arena, node: NodeId, found: &mut Vec<NodeId>) {
    if arena.is_function(node) {
        return;
    }
    if arena.is_yield(node) {
        found.push(node);
    }
    for child in arena.children(node) {
        collect_yields(arena, child, found);
    }
}
