//! `GeneratorLoweringPass`: walks a program, lowering every `function*` innermost-first (§4.4's
//! precondition that a nested generator is already rewritten by the time its enclosing generator's
//! `MarkerPropagator` run treats it as an opaque unmarked function).
//!
//! Mirrors the host compiler's own `Pass` shape: one entry point over a tree, diagnostics collected
//! rather than unwound so one malformed generator does not block lowering the rest of the program
//! (§7 propagation policy).

use jscomp_genlower_ast::{Arena, NodeId};
use jscomp_genlower_diagnostics::{DiagnosticsHandler, Severity};

use crate::cfg::CfgOracle;
use crate::exposer::ExpressionDecomposer;
use crate::function_transpiler::{contains_super, EmitOptions, FunctionTranspiler};

/// Lowers every generator function reachable from `root`, recursing into each function's body
/// first so nested generators are rewritten before the generator enclosing them.
///
/// `decomposer` and `cfg` are taken by `&mut dyn` rather than by type parameter since a single pass
/// run may recurse across many independently-transpiled functions that all share one
/// `ExpressionDecomposer`/`CfgOracle` instance — matching how the host compiler shares its own
/// decomposer/CFG builder across passes rather than constructing one per function.
pub struct GeneratorLoweringPass<'a> {
    diagnostics: &'a DiagnosticsHandler,
    decomposer: &'a mut dyn ExpressionDecomposer,
    cfg: &'a mut dyn CfgOracle,
    options: EmitOptions,
}

impl<'a> GeneratorLoweringPass<'a> {
    pub fn new(
        diagnostics: &'a DiagnosticsHandler,
        decomposer: &'a mut dyn ExpressionDecomposer,
        cfg: &'a mut dyn CfgOracle,
        options: EmitOptions,
    ) -> Self {
        Self {
            diagnostics,
            decomposer,
            cfg,
            options,
        }
    }

    /// Runs the pass over `root` (any node — typically a `Program` or a single function under
    /// test). Errors are reported to `self.diagnostics` rather than returned; a function whose
    /// lowering fails is left untouched (still a `function*`) so the rest of the walk can proceed.
    pub fn run(&mut self, arena: &mut Arena, root: NodeId) {
        log::trace!(target: "jscomp_genlower", "pass starting at root {root:?}");
        self.walk(arena, root, 0);
        log::trace!(target: "jscomp_genlower", "pass finished at root {root:?}");
    }

    fn walk(&mut self, arena: &mut Arena, node: NodeId, generator_depth: u32) {
        let is_function = arena.is_function(node);
        let is_generator = is_function && arena.function_is_generator(node);
        let child_depth = if is_generator { generator_depth + 1 } else { generator_depth };

        for child in arena.children(node) {
            self.walk(arena, child, child_depth);
        }

        if is_generator {
            self.lower_one(arena, node, generator_depth);
        }
    }

    fn lower_one(&mut self, arena: &mut Arena, function: NodeId, nesting_level: u32) {
        log::debug!(target: "jscomp_genlower", "lowering generator function {function:?} at nesting level {nesting_level}");
        let body = arena.function_body(function);
        if contains_super(arena, body) {
            log::warn!(target: "jscomp_genlower", "aborting {function:?}: `super` is not supported inside a generator");
            self.diagnostics.emit(
                self.diagnostics
                    .diagnostic(Severity::Error)
                    .with_message("internal error: `super` is not supported inside a generator function")
                    .into_report(),
            );
            return;
        }

        let transpiler = FunctionTranspiler::new(
            self.diagnostics,
            self.decomposer,
            self.cfg,
            nesting_level,
            self.options,
        );
        match transpiler.run(arena, function) {
            Ok(()) => log::debug!(target: "jscomp_genlower", "lowered generator function {function:?}"),
            Err(report) => {
                log::warn!(target: "jscomp_genlower", "aborting {function:?}: lowering failed");
                self.diagnostics.emit(report);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use jscomp_genlower_ast::Arena;
    use jscomp_genlower_diagnostics::DiagnosticsHandler;

    use super::*;
    use crate::cfg::SimpleCfgOracle;
    use crate::exposer::DefaultExpressionDecomposer;

    #[test]
    fn lowers_a_trivial_generator_into_a_create_generator_call() {
        let mut arena = Arena::new();
        let func = arena.make_function(Some("gen"), &[], true);
        let body = arena.function_body(func);
        let y = arena.make_yield(None, false);
        let stmt = arena.make_expr_stmt(y);
        arena.add_child_to_back(body, stmt);

        let diagnostics = DiagnosticsHandler::new();
        let mut decomposer = DefaultExpressionDecomposer::default();
        let mut cfg = SimpleCfgOracle::new();
        let mut pass = GeneratorLoweringPass::new(&diagnostics, &mut decomposer, &mut cfg, EmitOptions::default());

        pass.run(&mut arena, func);

        assert!(diagnostics.is_empty());
        assert!(!arena.function_is_generator(func));
    }

    #[test]
    fn nested_generator_is_lowered_before_its_enclosing_generator() {
        let mut arena = Arena::new();
        let outer = arena.make_function(Some("outer"), &[], true);
        let outer_body = arena.function_body(outer);

        let inner = arena.make_function(Some("inner"), &[], true);
        let inner_body = arena.function_body(inner);
        let inner_yield = arena.make_yield(None, false);
        let inner_stmt = arena.make_expr_stmt(inner_yield);
        arena.add_child_to_back(inner_body, inner_stmt);

        let inner_decl = arena.make_expr_stmt(inner);
        arena.add_child_to_back(outer_body, inner_decl);
        let outer_yield = arena.make_yield(None, false);
        let outer_stmt = arena.make_expr_stmt(outer_yield);
        arena.add_child_to_back(outer_body, outer_stmt);

        let diagnostics = DiagnosticsHandler::new();
        let mut decomposer = DefaultExpressionDecomposer::default();
        let mut cfg = SimpleCfgOracle::new();
        let mut pass = GeneratorLoweringPass::new(&diagnostics, &mut decomposer, &mut cfg, EmitOptions::default());

        pass.run(&mut arena, outer);

        assert!(diagnostics.is_empty());
        assert!(!arena.function_is_generator(outer));
        assert!(!arena.function_is_generator(inner));
    }
}
