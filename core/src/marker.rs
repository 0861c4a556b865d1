//! MarkerPropagator (§4.1): a post-order walk that tags every node of a detached function body
//! with whether its subtree contains a `yield`, without crossing into nested function bodies.

use jscomp_genlower_ast::{Arena, NodeId};

/// Runs MarkerPropagator over `root` (typically a function's body block) and returns whether
/// `root` itself is marked.
///
/// Nested `function`/`function*` nodes are visited (so their own `generator_marker` is reset to
/// `false`, matching "any node on which generatorMarker=false is unmarked and may be emitted
/// verbatim") but their bodies are never descended into — marking an inner generator is that
/// inner function's own, later, MarkerPropagator run (§4.4: "nested generator functions are
/// lowered first").
pub fn propagate_markers(arena: &mut Arena, root: NodeId) -> bool {
    if arena.is_function(root) {
        arena.set_generator_marker(root, false);
        return false;
    }

    let is_yield = arena.is_yield(root);
    let mut marked = is_yield;
    for child in arena.children(root) {
        marked |= propagate_markers(arena, child);
    }
    arena.set_generator_marker(root, marked);
    marked
}
