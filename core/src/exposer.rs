//! YieldExposer (§4.2): rewrites an expression containing `yield` so that every `yield` ends up
//! standing alone, either as the whole body of an expression-statement or as the right-hand side
//! of a preceding `temp = yield E;` assignment, by repeatedly delegating to an
//! [`ExpressionDecomposer`].

use jscomp_genlower_ast::{Arena, NodeId};
use jscomp_genlower_diagnostics::{DiagnosticsHandler, Report, Severity, Span};

use crate::marker::propagate_markers;

/// What one decomposition step did, mirroring the external `ExpressionDecomposer` service named
/// in §1/§4.2.
pub enum DecomposeStep {
    /// No `yield` remains embedded anywhere in the expression rooted at the probed node.
    Done,
    /// One `yield` was hoisted into a new statement, which must be emitted immediately before the
    /// statement being exposed. The probed expression was mutated in place to no longer contain
    /// that `yield` (it now references the temporary instead); further calls may still find more
    /// embedded yields.
    Decomposed(NodeId),
    /// The subexpression containing a `yield` cannot be safely hoisted into a preceding statement
    /// without changing evaluation order/short-circuit semantics.
    Undecomposable,
}

/// Pulls a side-effecting (here: yield-containing) subexpression out into a preceding temporary,
/// the service this pass treats as external (§1).
pub trait ExpressionDecomposer {
    fn decompose_one(&mut self, arena: &mut Arena, expr_root: NodeId) -> DecomposeStep;
}

/// Reference implementation sufficient to drive this repository's own tests (§6.1). Finds the
/// first `yield` embedded in a compound expression that is not already "exposed" (the sole
/// top-level value of the statement owning `expr_root`) and hoists it into
/// `var $jscomp$generator$temp$N = yield E;`, rewriting its original position to reference the
/// temporary by name.
#[derive(Default)]
pub struct DefaultExpressionDecomposer {
    next_temp: u32,
}

impl DefaultExpressionDecomposer {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_temp_name(&mut self) -> String {
        let name = format!("$jscomp$generator$temp${}", self.next_temp);
        self.next_temp += 1;
        name
    }
}

impl ExpressionDecomposer for DefaultExpressionDecomposer {
    fn decompose_one(&mut self, arena: &mut Arena, expr_root: NodeId) -> DecomposeStep {
        let Some(target) = find_embedded_yield(arena, expr_root, true) else {
            return DecomposeStep::Done;
        };

        if is_in_non_decomposable_position(arena, target) {
            return DecomposeStep::Undecomposable;
        }

        let temp_name = self.fresh_temp_name();
        let name_ref = arena.make_name(&temp_name);
        arena.replace_with(target, name_ref);
        let declarator = arena.make_var_declarator(&temp_name, Some(target));
        let stmt = arena.make_var_decl(&[declarator]);
        DecomposeStep::Decomposed(stmt)
    }
}

/// A `yield` whose immediate parent is a short-circuiting binary operator, and which is the
/// conditionally-evaluated (right-hand) operand, cannot be hoisted above the operator without
/// making it unconditionally evaluated.
fn is_in_non_decomposable_position(arena: &Arena, yield_node: NodeId) -> bool {
    let Some(parent) = arena.parent(yield_node) else {
        return false;
    };
    if let jscomp_genlower_ast::NodeKind::Binary { op, right, .. } = arena.kind(parent) {
        if (op.as_str() == "&&" || op.as_str() == "||") && *right == yield_node {
            return true;
        }
    }
    false
}

/// Finds the first `yield` in the expression rooted at `node`, skipping the root itself when
/// `root_is_exposed_slot` is true (the caller already knows the top-level value *may* legally be
/// a bare yield, e.g. an expression-statement's expression or a declarator's initializer) and
/// never descending into nested function bodies.
fn find_embedded_yield(arena: &Arena, node: NodeId, root_is_exposed_slot: bool) -> Option<NodeId> {
    if arena.is_function(node) {
        return None;
    }
    if arena.is_yield(node) && !root_is_exposed_slot {
        return Some(node);
    }
    for child in arena.children(node) {
        if let Some(found) = find_embedded_yield(arena, child, false) {
            return Some(found);
        }
    }
    None
}

/// Returns `true` if `expr_root` is already fully exposed in isolation: either a bare `yield`
/// with no further embedded yields, or `target = yield E` with a simple name target.
pub fn is_already_exposed(arena: &Arena, expr_root: NodeId) -> bool {
    if arena.is_yield(expr_root) {
        return true;
    }
    if let jscomp_genlower_ast::NodeKind::Assign { target, value } = arena.kind(expr_root) {
        if arena.is_name(*target) && arena.is_yield(*value) {
            return true;
        }
    }
    false
}

/// Repeatedly decomposes `expr_root` (the value/condition/initializer expression of some
/// statement) until no `yield` remains embedded in a compound position, returning the hoisted
/// statements in the order they must be spliced in immediately before the statement owning
/// `expr_root`.
///
/// If `expr_root` is already fully exposed (see [`is_already_exposed`]) this is a no-op and
/// returns an empty list — preserving it lets callers (e.g. EXPR_RESULT, §4.4.c) special-case a
/// bare `yield` without losing the empty-case merging opportunity the spec calls out.
pub fn expose_and_decompose(
    decomposer: &mut dyn ExpressionDecomposer,
    diagnostics: &DiagnosticsHandler,
    arena: &mut Arena,
    expr_root: NodeId,
    span: Span,
) -> Result<Vec<NodeId>, Report> {
    if is_already_exposed(arena, expr_root) {
        return Ok(Vec::new());
    }

    let mut hoisted = Vec::new();
    loop {
        match decomposer.decompose_one(arena, expr_root) {
            DecomposeStep::Done => break,
            DecomposeStep::Decomposed(stmt) => hoisted.push(stmt),
            DecomposeStep::Undecomposable => {
                log::warn!(target: "jscomp_genlower", "undecomposable yield expression at {span:?}");
                return Err(diagnostics
                    .diagnostic(Severity::Error)
                    .with_message(
                        "Undecomposable expression: please rewrite the yield/await as a separate \
                         statement",
                    )
                    .with_primary_label(span, "this yield cannot be safely extracted")
                    .with_help("see FAQ#generator-decomposition")
                    .into_report());
            }
        }
    }

    // The restructured tree's markers are stale (YieldExposer "clears generatorMarker on every
    // node it visits"); re-establish them before anything inspects generator_marker again.
    for &stmt in &hoisted {
        propagate_markers(arena, stmt);
    }
    propagate_markers(arena, expr_root);

    Ok(hoisted)
}

#[cfg(test)]
mod tests {
    use jscomp_genlower_ast::Arena;
    use jscomp_genlower_diagnostics::DiagnosticsHandler;

    use super::*;

    #[test]
    fn bare_yield_statement_needs_no_decomposition() {
        let mut arena = Arena::new();
        let one = arena.make_number(1);
        let y = arena.make_yield(Some(one), false);
        let mut decomposer = DefaultExpressionDecomposer::new();
        let diags = DiagnosticsHandler::new();

        let hoisted =
            expose_and_decompose(&mut decomposer, &diags, &mut arena, y, Span::default()).unwrap();
        assert!(hoisted.is_empty());
    }

    #[test]
    fn yield_in_binary_is_hoisted_to_a_preceding_temp() {
        let mut arena = Arena::new();
        let a = arena.make_name("a");
        let b = arena.make_name("b");
        let y = arena.make_yield(Some(b), false);
        let sum = arena.make_binary("+", a, y);
        let _wrapping_return = arena.make_return(Some(sum));

        let mut decomposer = DefaultExpressionDecomposer::new();
        let diags = DiagnosticsHandler::new();
        let hoisted =
            expose_and_decompose(&mut decomposer, &diags, &mut arena, sum, Span::default()).unwrap();

        assert_eq!(hoisted.len(), 1);
        let (_, left, right) = arena.binary_parts(sum);
        assert_eq!(left, a);
        assert!(arena.is_name(right));
        assert_eq!(arena.name_of(right), "$jscomp$generator$temp$0");
    }

    #[test]
    fn short_circuit_right_operand_is_undecomposable() {
        let mut arena = Arena::new();
        let a = arena.make_name("a");
        let y = arena.make_yield(None, false);
        let and_expr = arena.make_binary("&&", a, y);

        let mut decomposer = DefaultExpressionDecomposer::new();
        let diags = DiagnosticsHandler::new();
        let err =
            expose_and_decompose(&mut decomposer, &diags, &mut arena, and_expr, Span::default())
                .unwrap_err();
        assert!(format!("{err:?}").contains("Undecomposable expression"));
    }
}
