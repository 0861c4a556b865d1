//! FunctionTranspiler (§4.4): lowers one marked generator function's body into the
//! `switch (context.nextAddress)` state machine owned by a fresh [`TranspilationContext`].
//!
//! One instance transpiles exactly one function. Nested generator functions are never visited
//! here — `GeneratorLoweringPass` walks the tree innermost-first, so by the time an enclosing
//! generator reaches a nested one it has already been rewritten into a plain function returning
//! `runtime.createGenerator(...)`, which this walk treats like any other unmarked subtree.

use compact_str::CompactString;
use jscomp_genlower_ast::{Arena, NodeId, NodeKind};
use jscomp_genlower_diagnostics::{DiagnosticsHandler, InternalError, Report, Span};

use crate::cfg::CfgOracle;
use crate::context::{LabelCases, TranspilationContext};
use crate::exposer::{expose_and_decompose, is_already_exposed, ExpressionDecomposer};
use crate::marker::propagate_markers;
use crate::runtime::{
    self, context_name, emit_jump_to_and_break, emit_jump_to_end, emit_return, emit_yield,
    emit_yield_all, for_in_name, make_for_in_call,
};
use crate::unmarked_fixer::{HoistedDecls, UnmarkedSubtreeFixer};

/// Literal generated-code shape that the original pass treats as policy rather than semantics
/// (§9 Design Notes: the `do { switch { .. } } while (0)` wrapper exists to placate a downstream
/// type-inference quirk and "an implementer should preserve current behavior and expose the
/// policy as a toggle rather than guess intent"). Defaults to the historical behavior.
#[derive(Clone, Copy, Debug)]
pub struct EmitOptions {
    pub wrap_in_do_while_false: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            wrap_in_do_while_false: true,
        }
    }
}

/// Lowers one generator function in place, per §4.4's seven steps.
pub struct FunctionTranspiler<'a> {
    diagnostics: &'a DiagnosticsHandler,
    decomposer: &'a mut dyn ExpressionDecomposer,
    cfg: &'a mut dyn CfgOracle,
    options: EmitOptions,
    nesting_level: u32,
    context_var: String,
    ctx: TranspilationContext,
    hoisted: HoistedDecls,
    /// Stashed by `lower_label` for the next loop it wraps, so the loop registers the label
    /// against cases it allocates for itself rather than the label pre-allocating cases the loop
    /// would have to adopt. Not a faithful translation of §4.4.a's literal case allocation order,
    /// but an equivalent generated program — permitted by the Non-goal on optimal addressing.
    pending_label: Option<CompactString>,
    next_for_in_id: u32,
}

impl<'a> FunctionTranspiler<'a> {
    pub fn new(
        diagnostics: &'a DiagnosticsHandler,
        decomposer: &'a mut dyn ExpressionDecomposer,
        cfg: &'a mut dyn CfgOracle,
        nesting_level: u32,
        options: EmitOptions,
    ) -> Self {
        Self {
            diagnostics,
            decomposer,
            cfg,
            options,
            nesting_level,
            context_var: context_name(nesting_level),
            ctx: TranspilationContext::new(),
            hoisted: HoistedDecls::default(),
            pending_label: None,
            next_for_in_id: 0,
        }
    }

    /// Runs the whole lowering: §4.4 steps 1 through 7. `function` must be a generator whose body
    /// has already been confirmed free of `super` by the caller (the pass aborts per-function
    /// before reaching here otherwise, per §7's "internal precondition failure" entry).
    pub fn run(mut self, arena: &mut Arena, function: NodeId) -> Result<(), Report> {
        let original_body = arena.function_body(function);

        // Step 1: does control reach the end of the body if nothing returns first?
        let probe = arena.make_return(None);
        arena.add_child_to_back(original_body, probe);
        let should_add_final_jump = self.cfg.is_reachable(arena, probe);
        arena.detach(probe);
        log::trace!(target: "jscomp_genlower", "should_add_final_jump = {should_add_final_jump}");

        // Step 2: name self if anonymous, so `return runtime.createGenerator(self, program)` has
        // a name to close over.
        let self_name = match arena.function_name(function) {
            Some(n) => n.to_string(),
            None => {
                let synth = runtime::generated_name("generator$function", self.nesting_level);
                arena.set_function_name(function, &synth);
                synth
            }
        };

        // Step 4: mark the original body before draining it — `YieldExposer`/lowering below rely
        // on `generator_marker` already being correct for every statement it looks at.
        propagate_markers(arena, original_body);
        log::trace!(target: "jscomp_genlower", "marked body of {self_name}");

        // Step 5: drain each top-level statement in source order.
        while let Some(stmt) = arena.pop_front_child(original_body) {
            self.lower_marked(arena, stmt)?;
        }

        // Step 6: terminate.
        if self.ctx.case(self.ctx.current_id()).may_fall_through {
            if should_add_final_jump {
                emit_jump_to_end(&mut self.ctx, arena, &self.context_var);
            } else {
                let end = self.ctx.program_end_id();
                emit_jump_to_and_break(&mut self.ctx, arena, &self.context_var, end);
            }
        }
        self.ctx.verify_empty()?;

        let context_var = self.context_var.clone();
        let options = self.options;
        let hoisted = std::mem::take(&mut self.hoisted);
        let cases = self.ctx.finalize(arena);

        // Step 3 (built here now that the final case list is known; §9 notes this ordering is an
        // implementation detail the spec leaves open — nothing observes `function`'s body between
        // step 2 and here).
        let program_fn = assemble_program(arena, &context_var, &cases, options);
        let self_name_node = arena.make_name(&self_name);
        let create_call = arena.make_context_call("runtime", "createGenerator", &[self_name_node, program_fn]);
        splice_hoisted_decls(arena, function, &hoisted);
        arena.replace_function_body_with_return(function, create_call);

        // Step 7.
        arena.set_function_generator(function, false);
        Ok(())
    }

    fn lower_unmarked(&mut self, arena: &mut Arena, node: NodeId) -> Result<NodeId, InternalError> {
        let mut fixer = UnmarkedSubtreeFixer::new(&mut self.ctx, self.context_var.clone(), self.nesting_level);
        let fixed = fixer.fix(arena, node)?;
        let h = fixer.into_hoisted();
        self.merge_hoisted(h);
        Ok(fixed)
    }

    fn fix_embedded_expr(&mut self, arena: &mut Arena, node: NodeId) -> Result<NodeId, InternalError> {
        let mut fixer = UnmarkedSubtreeFixer::new(&mut self.ctx, self.context_var.clone(), self.nesting_level);
        let fixed = fixer.fix_expr(arena, node)?;
        let h = fixer.into_hoisted();
        self.merge_hoisted(h);
        Ok(fixed)
    }

    fn merge_hoisted(&mut self, h: HoistedDecls) {
        if self.hoisted.this_decl.is_none() {
            self.hoisted.this_decl = h.this_decl;
        }
        if self.hoisted.arguments_decl.is_none() {
            self.hoisted.arguments_decl = h.arguments_decl;
        }
        self.hoisted.var_decls.extend(h.var_decls);
        self.hoisted.functions.extend(h.functions);
    }

    fn jump_to_case_if_falling_through(&mut self, arena: &mut Arena, target: u32) {
        if self.ctx.case(self.ctx.current_id()).may_fall_through {
            emit_jump_to_and_break(&mut self.ctx, arena, &self.context_var, target);
        }
    }

    /// Shared by every marked-statement lowering that needs an expression embedded directly into
    /// generated code — an `if`/`for`/`while`/`do-while` condition, a `for`'s non-`var` init or
    /// update, a `for-in`'s object, a `return`/`throw` value, a `switch` discriminant.
    fn decompose_for_embedding(
        &mut self,
        arena: &mut Arena,
        expr: NodeId,
        span: Span,
    ) -> Result<NodeId, Report> {
        let hoisted = expose_and_decompose(self.decomposer, self.diagnostics, arena, expr, span)?;
        for stmt in hoisted {
            // Each hoisted statement is itself `$temp = yield E;`, freshly re-marked by
            // `expose_and_decompose` — it suspends in its own right (via VAR's marked-declarator
            // case), it is not an unmarked subtree to merely rewrite `this`/`arguments` in.
            self.lower_marked(arena, stmt)?;
        }
        let expr = self.fix_embedded_expr(arena, expr)?;
        if arena.is_yield(expr) {
            // `expose_and_decompose` treats a bare yield as already in its final form (it is, as
            // a statement) but an embedding position cannot hold a suspend directly — suspend
            // here and substitute `context.yieldResult` once execution resumes.
            let next_id = self.ctx.alloc_case();
            let (argument, delegate) = arena.yield_parts(expr);
            let value = argument.unwrap_or_else(|| arena.make_undefined());
            if delegate {
                emit_yield_all(&mut self.ctx, arena, &self.context_var, value, next_id);
            } else {
                emit_yield(&mut self.ctx, arena, &self.context_var, value, next_id);
            }
            self.ctx.switch_to(next_id);
            let ctx_name = arena.make_name(&self.context_var);
            Ok(arena.make_member(ctx_name, "yieldResult"))
        } else {
            Ok(expr)
        }
    }

    fn fix_embedded_expr_stmt(&mut self, arena: &mut Arena, node: NodeId) -> Result<NodeId, Report> {
        let mut fixer = UnmarkedSubtreeFixer::new(&mut self.ctx, self.context_var.clone(), self.nesting_level);
        let fixed = fixer.fix(arena, node)?;
        let h = fixer.into_hoisted();
        self.merge_hoisted(h);
        Ok(fixed)
    }

    fn lower_marked(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        if !arena.generator_marker(node) {
            let fixed = self.lower_unmarked(arena, node)?;
            self.ctx.emit(fixed);
            return Ok(());
        }
        match arena.kind(node).clone() {
            NodeKind::Label { .. } => self.lower_label(arena, node),
            NodeKind::Block => self.lower_block(arena, node),
            NodeKind::ExprStmt => self.lower_expr_result(arena, node),
            NodeKind::VarDecl => self.lower_var(arena, node),
            NodeKind::Return { .. } => self.lower_return(arena, node),
            NodeKind::Throw { .. } => self.lower_throw(arena, node),
            NodeKind::If { .. } => self.lower_if(arena, node, None),
            NodeKind::For { .. } => self.lower_for(arena, node),
            NodeKind::ForIn { .. } => self.lower_for_in(arena, node),
            NodeKind::While { .. } => self.lower_while(arena, node),
            NodeKind::DoWhile { .. } => self.lower_do_while(arena, node),
            NodeKind::Try { .. } => self.lower_try(arena, node),
            NodeKind::Switch { .. } => self.lower_switch(arena, node),
            _ => {
                let fixed = self.lower_unmarked(arena, node)?;
                self.ctx.emit(fixed);
                Ok(())
            }
        }
    }

    // ---- a. LABEL -------------------------------------------------------------------------

    fn lower_label(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        let name = arena.label_name(node);
        let body = arena.label_body(node);
        if arena.is_loop_structure(body) {
            self.pending_label = Some(name);
            self.lower_marked(arena, body)
        } else {
            let break_case = self.ctx.alloc_case();
            self.ctx.register_label(&name, LabelCases {
                break_case,
                continue_case: None,
            });
            self.lower_marked(arena, body)?;
            self.jump_to_case_if_falling_through(arena, break_case);
            self.ctx.switch_to(break_case);
            self.ctx.unregister_label(&name);
            Ok(())
        }
    }

    // ---- b. BLOCK -------------------------------------------------------------------------

    fn lower_block(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        while let Some(stmt) = arena.pop_front_child(node) {
            self.lower_marked(arena, stmt)?;
        }
        Ok(())
    }

    // ---- c. EXPR_RESULT -------------------------------------------------------------------

    fn lower_expr_result(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        let expr = arena.expr_stmt_expr(node);
        let span = to_diag_span(arena.span(node));

        if is_already_exposed(arena, expr) {
            if arena.is_yield(expr) {
                let next_id = self.ctx.alloc_case();
                let (argument, delegate) = arena.yield_parts(expr);
                let value = argument.unwrap_or_else(|| arena.make_undefined());
                if delegate {
                    emit_yield_all(&mut self.ctx, arena, &self.context_var, value, next_id);
                } else {
                    emit_yield(&mut self.ctx, arena, &self.context_var, value, next_id);
                }
                self.ctx.switch_to(next_id);
                // Do not also materialize `context.yieldResult;` — the value is discarded, and an
                // empty resume case is free to merge away during collapse.
                return Ok(());
            }

            let (target, value) = arena.assign_parts(expr);
            let next_id = self.ctx.alloc_case();
            let (argument, delegate) = arena.yield_parts(value);
            let yielded = argument.unwrap_or_else(|| arena.make_undefined());
            if delegate {
                emit_yield_all(&mut self.ctx, arena, &self.context_var, yielded, next_id);
            } else {
                emit_yield(&mut self.ctx, arena, &self.context_var, yielded, next_id);
            }
            self.ctx.switch_to(next_id);
            let ctx_name = arena.make_name(&self.context_var);
            let yield_result = arena.make_member(ctx_name, "yieldResult");
            let assign = arena.make_assign(target, yield_result);
            let stmt = arena.make_expr_stmt(assign);
            self.ctx.emit(stmt);
            return Ok(());
        }

        let hoisted = expose_and_decompose(self.decomposer, self.diagnostics, arena, expr, span)?;
        for stmt in hoisted {
            self.lower_marked(arena, stmt)?;
        }
        let fixed_expr = self.fix_embedded_expr(arena, expr)?;
        let stmt = arena.make_expr_stmt(fixed_expr);
        self.ctx.emit(stmt);
        Ok(())
    }

    // ---- d. VAR ---------------------------------------------------------------------------

    fn lower_var(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        let declarators: Vec<NodeId> = arena.children(node).to_vec();
        let mut run: Vec<NodeId> = Vec::new();

        for d in declarators {
            if arena.generator_marker(d) {
                self.flush_var_run(arena, &mut run)?;

                let name = arena.var_declarator_name(d);
                let span = to_diag_span(arena.span(d));
                let init = arena.var_declarator_init(d);
                let declarator = match init {
                    Some(i) => {
                        let fixed_init = self.decompose_for_embedding(arena, i, span)?;
                        arena.make_var_declarator(&name, Some(fixed_init))
                    }
                    None => arena.make_var_declarator(&name, None),
                };
                let single = arena.make_var_decl(&[declarator]);
                self.ctx.emit(single);
            } else {
                run.push(d);
            }
        }
        self.flush_var_run(arena, &mut run)?;
        Ok(())
    }

    fn flush_var_run(&mut self, arena: &mut Arena, run: &mut Vec<NodeId>) -> Result<(), Report> {
        if run.is_empty() {
            return Ok(());
        }
        let decl = arena.make_var_decl(run);
        run.clear();
        let fixed = self.fix_embedded_expr_stmt(arena, decl)?;
        self.ctx.emit(fixed);
        Ok(())
    }

    // ---- e. RETURN ------------------------------------------------------------------------

    fn lower_return(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        let span = to_diag_span(arena.span(node));
        let value = match arena.return_value(node) {
            Some(v) => Some(self.decompose_for_embedding(arena, v, span)?),
            None => None,
        };
        emit_return(&mut self.ctx, arena, &self.context_var, value);
        Ok(())
    }

    // ---- f. THROW -------------------------------------------------------------------------

    fn lower_throw(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        let span = to_diag_span(arena.span(node));
        let value = arena.throw_value(node);
        let fixed = self.decompose_for_embedding(arena, value, span)?;
        let stmt = arena.make_throw(fixed);
        self.ctx.emit(stmt);
        self.ctx.set_may_fall_through(false);
        Ok(())
    }

    // ---- g. IF ----------------------------------------------------------------------------

    /// `enclosing_end`, when given, is an already-allocated case to jump to instead of a fresh
    /// one — used when a label wraps a non-loop `if` (uncommon; exercised defensively here even
    /// though `lower_label`'s fast path only hands loops their own break case directly).
    fn lower_if(
        &mut self,
        arena: &mut Arena,
        node: NodeId,
        enclosing_end: Option<u32>,
    ) -> Result<(), Report> {
        let (cond, then_branch, else_branch) = arena.if_parts(node);
        let span = to_diag_span(arena.span(node));
        let fixed_cond = self.decompose_for_embedding(arena, cond, span)?;

        let end_case = enclosing_end.unwrap_or_else(|| self.ctx.alloc_case());
        let if_case = self.ctx.alloc_case();

        let lit = arena.make_number(if_case as i64);
        let jump_call = {
            let ctx_name = arena.make_name(&self.context_var);
            let callee = arena.make_member(ctx_name, "jumpTo");
            arena.make_call(callee, &[lit])
        };
        self.ctx.record_reference(if_case, lit);
        let jump_stmt = arena.make_expr_stmt(jump_call);
        let brk = arena.make_break(None);
        let then_block = jscomp_genlower_ast::block_of(arena, &[jump_stmt, brk]);
        let guard = arena.make_if(fixed_cond, then_block, None);
        self.ctx.emit(guard);

        // Else branch (if any) runs in the current (fall-through) case, then jumps to end.
        if let Some(e) = else_branch {
            self.lower_marked(arena, e)?;
        }
        self.jump_to_case_if_falling_through(arena, end_case);

        self.ctx.switch_to(if_case);
        self.lower_marked(arena, then_branch)?;
        self.jump_to_case_if_falling_through(arena, end_case);

        self.ctx.switch_to(end_case);
        Ok(())
    }

    // ---- h. FOR ---------------------------------------------------------------------------

    fn lower_for(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        let (init, cond, update, body) = arena.for_parts(node);
        let span = to_diag_span(arena.span(node));

        if let Some(i) = init {
            if arena.is_var(i) {
                self.lower_var_in_place(arena, i)?;
            } else {
                let fixed = self.decompose_for_embedding(arena, i, span)?;
                let stmt = arena.make_expr_stmt(fixed);
                self.ctx.emit(stmt);
            }
        }

        let start_case = self.ctx.alloc_case();
        let end_case = self.ctx.alloc_case();
        let increment_case = self.ctx.alloc_case();
        let label = self.pending_label.take();
        if let Some(name) = &label {
            self.ctx.register_label(name, LabelCases {
                break_case: end_case,
                continue_case: Some(increment_case),
            });
        }

        self.ctx.switch_to(start_case);
        if let Some(c) = cond {
            let fixed_cond = self.decompose_for_embedding(arena, c, span)?;
            let not_cond = arena.make_unary("!", fixed_cond);
            let lit = arena.make_number(end_case as i64);
            let jump_call = {
                let ctx_name = arena.make_name(&self.context_var);
                let callee = arena.make_member(ctx_name, "jumpTo");
                arena.make_call(callee, &[lit])
            };
            self.ctx.record_reference(end_case, lit);
            let jump_stmt = arena.make_expr_stmt(jump_call);
            let brk = arena.make_break(None);
            let then_block = jscomp_genlower_ast::block_of(arena, &[jump_stmt, brk]);
            let guard = arena.make_if(not_cond, then_block, None);
            self.ctx.emit(guard);
        }

        self.ctx.push_break(end_case);
        self.ctx.push_continue(increment_case);
        let body_result = self.lower_marked(arena, body);
        self.ctx.pop_continue();
        self.ctx.pop_break();
        body_result?;

        self.jump_to_case_if_falling_through(arena, increment_case);

        self.ctx.switch_to(increment_case);
        if let Some(u) = update {
            let fixed = self.decompose_for_embedding(arena, u, span)?;
            let stmt = arena.make_expr_stmt(fixed);
            self.ctx.emit(stmt);
        }
        emit_jump_to_and_break(&mut self.ctx, arena, &self.context_var, start_case);

        self.ctx.switch_to(end_case);
        if let Some(name) = &label {
            self.ctx.unregister_label(name);
        }
        Ok(())
    }

    fn lower_var_in_place(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        // A `for` loop's own `var` init is drained the same way as a top-level `var`, but its
        // declarators stay in the `for (...)` head rather than becoming case-body statements —
        // there is nothing to decompose here unless a declarator is itself marked, which cannot
        // happen: `cond`/`update`/`body` would already have forced this `for` to be unwrapped by
        // `UnmarkedSubtreeFixer` if no declarator's initializer contained a yield. So an `init`
        // that reaches here unmarked is emitted through the fixer like any other unmarked subtree.
        let fixed = self.fix_embedded_expr_stmt(arena, node)?;
        self.ctx.emit(fixed);
        Ok(())
    }

    // ---- i. FOR-IN ------------------------------------------------------------------------

    fn lower_for_in(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        let (var_name, object, body) = arena.for_in_parts(node);
        let uid = self.next_for_in_id;
        self.next_for_in_id += 1;
        let iter_name = for_in_name(uid);

        let fi_call = make_for_in_call(arena, &self.context_var, object);
        let fi_declarator = arena.make_var_declarator(&iter_name, Some(fi_call));
        let v_declarator = arena.make_var_declarator(&var_name, None);
        let init = arena.make_var_decl(&[v_declarator, fi_declarator]);

        let v_name = arena.make_name(&var_name);
        let iter_ref = arena.make_name(&iter_name);
        let get_next = arena.make_member(iter_ref, "getNext");
        let call = arena.make_call(get_next, &[]);
        let assign = arena.make_assign(v_name, call);
        let null = arena.make_null();
        let cond = arena.make_binary("!=", assign, null);

        let for_node = arena.make_for(Some(init), Some(cond), None, body);
        self.lower_for(arena, for_node)
    }

    // ---- j. WHILE / DO-WHILE ----------------------------------------------------------------

    fn lower_while(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        let (cond, body) = arena.while_parts(node);
        let span = to_diag_span(arena.span(node));

        let start_case = self.ctx.alloc_case();
        let end_case = self.ctx.alloc_case();
        let label = self.pending_label.take();
        if let Some(name) = &label {
            self.ctx.register_label(name, LabelCases {
                break_case: end_case,
                continue_case: Some(start_case),
            });
        }

        self.ctx.switch_to(start_case);
        let fixed_cond = self.decompose_for_embedding(arena, cond, span)?;
        let not_cond = arena.make_unary("!", fixed_cond);
        let lit = arena.make_number(end_case as i64);
        let jump_call = {
            let ctx_name = arena.make_name(&self.context_var);
            let callee = arena.make_member(ctx_name, "jumpTo");
            arena.make_call(callee, &[lit])
        };
        self.ctx.record_reference(end_case, lit);
        let jump_stmt = arena.make_expr_stmt(jump_call);
        let brk = arena.make_break(None);
        let then_block = jscomp_genlower_ast::block_of(arena, &[jump_stmt, brk]);
        let guard = arena.make_if(not_cond, then_block, None);
        self.ctx.emit(guard);

        self.ctx.push_break(end_case);
        self.ctx.push_continue(start_case);
        let body_result = self.lower_marked(arena, body);
        self.ctx.pop_continue();
        self.ctx.pop_break();
        body_result?;

        self.jump_to_case_if_falling_through(arena, start_case);

        self.ctx.switch_to(end_case);
        if let Some(name) = &label {
            self.ctx.unregister_label(name);
        }
        Ok(())
    }

    fn lower_do_while(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        let (body, cond) = arena.do_while_parts(node);
        let span = to_diag_span(arena.span(node));

        let body_case = self.ctx.alloc_case();
        let continue_case = self.ctx.alloc_case();
        let end_case = self.ctx.alloc_case();
        let label = self.pending_label.take();
        if let Some(name) = &label {
            self.ctx.register_label(name, LabelCases {
                break_case: end_case,
                continue_case: Some(continue_case),
            });
        }

        emit_jump_to_and_break(&mut self.ctx, arena, &self.context_var, body_case);

        self.ctx.switch_to(body_case);
        self.ctx.push_break(end_case);
        self.ctx.push_continue(continue_case);
        let body_result = self.lower_marked(arena, body);
        self.ctx.pop_continue();
        self.ctx.pop_break();
        body_result?;
        self.jump_to_case_if_falling_through(arena, continue_case);

        self.ctx.switch_to(continue_case);
        let fixed_cond = self.decompose_for_embedding(arena, cond, span)?;
        let lit = arena.make_number(body_case as i64);
        let jump_call = {
            let ctx_name = arena.make_name(&self.context_var);
            let callee = arena.make_member(ctx_name, "jumpTo");
            arena.make_call(callee, &[lit])
        };
        self.ctx.record_reference(body_case, lit);
        let jump_stmt = arena.make_expr_stmt(jump_call);
        let brk = arena.make_break(None);
        let then_block = jscomp_genlower_ast::block_of(arena, &[jump_stmt, brk]);
        let guard = arena.make_if(fixed_cond, then_block, None);
        self.ctx.emit(guard);

        self.ctx.switch_to(end_case);
        if let Some(name) = &label {
            self.ctx.unregister_label(name);
        }
        Ok(())
    }

    // ---- k. TRY/CATCH/FINALLY ---------------------------------------------------------------

    fn lower_try(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        let (block, catch, finally) = arena.try_parts(node);
        let end_case = self.ctx.alloc_case();
        let catch_case = catch.as_ref().map(|_| self.ctx.alloc_case());
        let finally_case = finally.map(|_| self.ctx.alloc_case());

        let mut setup_args = Vec::new();
        if let Some(cc) = catch_case {
            let lit = arena.make_number(cc as i64);
            self.ctx.record_reference(cc, lit);
            setup_args.push(lit);
        }
        if let Some(fc) = finally_case {
            let lit = arena.make_number(fc as i64);
            self.ctx.record_reference(fc, lit);
            setup_args.push(lit);
        }
        let setup_method = match (catch_case, finally_case) {
            (Some(_), Some(_)) => Some("setCatchFinallyBlocks"),
            (Some(_), None) => Some("setCatchFinallyBlocks"),
            (None, Some(_)) => Some("setFinallyBlock"),
            (None, None) => None,
        };
        if let Some(method) = setup_method {
            let call = arena.make_context_call(&self.context_var, method, &setup_args);
            let stmt = arena.make_expr_stmt(call);
            self.ctx.emit(stmt);
        }

        if let Some(fc) = finally_case {
            self.ctx.push_finally(fc);
        }
        if let Some(cc) = catch_case {
            self.ctx.push_catch(cc);
        }
        let try_result = self.lower_marked(arena, block);
        if catch_case.is_some() {
            self.ctx.pop_catch();
        }
        if finally_case.is_some() {
            self.ctx.pop_finally();
        }
        try_result?;

        if self.ctx.case(self.ctx.current_id()).may_fall_through {
            // A trailing `finally` always runs next regardless of which id we name here, so the
            // try body always leaves toward `endCase`; `finally`'s own lowering below switches
            // `endCase`'s occupant to run the finally block first.
            let lit = arena.make_number(end_case as i64);
            self.ctx.record_reference(end_case, lit);
            let call = arena.make_context_call(&self.context_var, "leaveTryBlock", &[lit]);
            let stmt = arena.make_expr_stmt(call);
            self.ctx.emit(stmt);
            let brk = arena.make_break(None);
            self.ctx.emit(brk);
            self.ctx.set_may_fall_through(false);
        }

        if let (Some(cc), Some((param_name, catch_body))) = (catch_case, catch) {
            self.ctx.switch_to(cc);
            if self.ctx.mark_catch_name_hoisted(&param_name) {
                let declarator = arena.make_var_declarator(&param_name, None);
                self.hoisted.var_decls.push(arena.make_var_decl(&[declarator]));
            }
            let param_name_ref = arena.make_name(&param_name);
            let enter_args: Vec<NodeId> = finally_case
                .map(|fc| {
                    let lit = arena.make_number(fc as i64);
                    self.ctx.record_reference(fc, lit);
                    vec![lit]
                })
                .unwrap_or_default();
            let call = arena.make_context_call(&self.context_var, "enterCatchBlock", &enter_args);
            let assign = arena.make_assign(param_name_ref, call);
            let stmt = arena.make_expr_stmt(assign);
            self.ctx.emit(stmt);

            let catch_result = self.lower_marked(arena, catch_body);
            catch_result?;
            if self.ctx.case(self.ctx.current_id()).may_fall_through {
                if let Some(fc) = finally_case {
                    self.jump_to_case_if_falling_through(arena, fc);
                } else {
                    self.jump_to_case_if_falling_through(arena, end_case);
                }
            }
        }

        if let (Some(fc), Some(finally_body)) = (finally_case, finally) {
            self.ctx.switch_to(fc);
            let enter_call = arena.make_context_call(&self.context_var, "enterFinallyBlock", &[]);
            let enter_stmt = arena.make_expr_stmt(enter_call);
            self.ctx.emit(enter_stmt);
            self.ctx.enter_finally_body();
            let finally_result = self.lower_marked(arena, finally_body);
            self.ctx.leave_finally_body()?;
            finally_result?;
            if self.ctx.case(self.ctx.current_id()).may_fall_through {
                let leave_call = arena.make_context_call(&self.context_var, "leaveFinallyBlock", &[]);
                let leave_stmt = arena.make_expr_stmt(leave_call);
                self.ctx.emit(leave_stmt);
                let brk = arena.make_break(None);
                self.ctx.emit(brk);
                self.ctx.set_may_fall_through(false);
            }
        }

        self.ctx.switch_to(end_case);
        Ok(())
    }

    // ---- l. SWITCH ------------------------------------------------------------------------

    fn lower_switch(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), Report> {
        let (discriminant, case_nodes) = arena.switch_parts(node);
        let span = to_diag_span(arena.span(node));
        for &c in &case_nodes {
            if let (Some(test), _) = arena.switch_case_parts(c) {
                if arena.generator_marker(test) {
                    log::warn!(target: "jscomp_genlower", "switch case label contains a yield; aborting lowering");
                    return Err(self
                        .diagnostics
                        .diagnostic(jscomp_genlower_diagnostics::Severity::Error)
                        .with_message("Cannot convert yet: Case statements that contain yields")
                        .with_primary_label(to_diag_span(arena.span(test)), "this case label contains a yield")
                        .into_report());
                }
            }
        }

        let fixed_disc = self.decompose_for_embedding(arena, discriminant, span)?;
        let end_case = self.ctx.alloc_case();

        let mut pending_bodies: Vec<(u32, NodeId)> = Vec::new();
        let mut saw_marked = false;
        for &c in &case_nodes {
            let (_, body) = arena.switch_case_parts(c);
            let body_is_empty = arena.children(body).is_empty();
            if arena.generator_marker(body) {
                saw_marked = true;
            }
            if !body_is_empty && saw_marked {
                let generated = self.ctx.alloc_case();
                pending_bodies.push((generated, body));
                let lit = arena.make_number(generated as i64);
                self.ctx.record_reference(generated, lit);
                let jump_call = {
                    let ctx_name = arena.make_name(&self.context_var);
                    let callee = arena.make_member(ctx_name, "jumpTo");
                    arena.make_call(callee, &[lit])
                };
                // A plain `jumpTo(generated); break;` would only exit this embedded switch —
                // control would then fall into the unconditional `jumpTo(end_case)` emitted right
                // after it below, clobbering the address this case just set. `return` exits the
                // whole generated case instead, the same way a labeled break through an active
                // finally must `return` rather than `break` (see `jump_through_or_plain_return`).
                let return_stmt = arena.make_return(Some(jump_call));
                let replacement = jscomp_genlower_ast::block_of(arena, &[return_stmt]);
                arena.set_generator_safe(return_stmt, true);
                arena.set_switch_case_body(c, replacement);
            }
        }

        let switch_node = arena.make_switch(fixed_disc, &case_nodes);
        self.ctx.push_break(end_case);
        let fixed_switch = self.lower_unmarked(arena, switch_node)?;
        self.ctx.pop_break();
        self.ctx.emit(fixed_switch);
        self.jump_to_case_if_falling_through(arena, end_case);

        for (generated, body) in pending_bodies {
            self.ctx.switch_to(generated);
            self.ctx.push_break(end_case);
            let result = self.lower_marked(arena, body);
            self.ctx.pop_break();
            result?;
            self.jump_to_case_if_falling_through(arena, end_case);
        }

        self.ctx.switch_to(end_case);
        Ok(())
    }
}

fn to_diag_span(s: jscomp_genlower_ast::Span) -> Span {
    Span::new(s.start, s.end)
}

/// True if `node`'s subtree (not crossing function boundaries) contains a `super` reference —
/// the one precondition `GeneratorLoweringPass` checks before constructing a [`FunctionTranspiler`]
/// at all (§7: "`super` inside generator" is an internal precondition failure, not a user
/// diagnostic, since a real host AST would have already rejected or rewritten `super` earlier in
/// the pipeline).
pub fn contains_super(arena: &Arena, node: NodeId) -> bool {
    if arena.is_super(node) {
        return true;
    }
    if arena.is_function(node) {
        return false;
    }
    arena.children(node).iter().any(|&c| contains_super(arena, c))
}

/// Builds the `function(context) { do { switch (context.nextAddress) { .. } } while (0); }`
/// program function handed to `runtime.createGenerator` (§4.4 step 3, §9 `do-while` toggle).
fn assemble_program(
    arena: &mut Arena,
    context_var: &str,
    cases: &[crate::context::Case],
    options: EmitOptions,
) -> NodeId {
    let discriminant = {
        let ctx_name = arena.make_name(context_var);
        arena.make_member(ctx_name, "nextAddress")
    };
    let switch_cases: Vec<NodeId> = cases
        .iter()
        .filter(|c| c.id != crate::context::PROGRAM_END_ID)
        .map(|c| {
            let test = arena.make_number(c.id as i64);
            let body = jscomp_genlower_ast::block_of(arena, &c.body);
            arena.make_switch_case(Some(test), body)
        })
        .collect();
    let switch_node = arena.make_switch(discriminant, &switch_cases);

    let program_fn = arena.make_function(None, &[context_var], false);
    let program_body = arena.function_body(program_fn);
    if options.wrap_in_do_while_false {
        let inner = arena.make_block();
        arena.add_child_to_back(inner, switch_node);
        let cond = arena.make_bool(false);
        let do_node = arena.make_do_while(inner, cond);
        arena.add_child_to_back(program_body, do_node);
    } else {
        arena.add_child_to_back(program_body, switch_node);
    }
    program_fn
}

/// Splices hoisted declarations between `function`'s head and its (already-rewritten)
/// `return runtime.createGenerator(...)` statement, in the placement order §6 describes:
/// `this`, then `arguments`, then plain vars/catch params, then nested function declarations,
/// then the program function itself.
fn splice_hoisted_decls(arena: &mut Arena, function: NodeId, hoisted: &HoistedDecls) {
    let body = arena.function_body(function);
    let return_stmt = arena.children(body)[0];

    if let Some(d) = hoisted.this_decl {
        arena.insert_before(return_stmt, d);
    }
    if let Some(d) = hoisted.arguments_decl {
        arena.insert_before(return_stmt, d);
    }
    for &d in &hoisted.var_decls {
        arena.insert_before(return_stmt, d);
    }
    for &f in &hoisted.functions {
        arena.insert_before(return_stmt, f);
    }
}

#[cfg(test)]
mod tests {
    use jscomp_genlower_ast::Arena;
    use jscomp_genlower_diagnostics::DiagnosticsHandler;

    use super::*;
    use crate::cfg::SimpleCfgOracle;
    use crate::context::Case;
    use crate::exposer::DefaultExpressionDecomposer;
    use crate::unmarked_fixer::HoistedDecls;

    #[test]
    fn contains_super_finds_a_direct_reference() {
        let mut arena = Arena::new();
        let sup = arena.make_super();
        let callee = arena.make_member(sup, "foo");
        let call = arena.make_call(callee, &[]);
        let stmt = arena.make_expr_stmt(call);
        assert!(contains_super(&arena, stmt));
    }

    #[test]
    fn contains_super_does_not_cross_into_a_nested_function() {
        let mut arena = Arena::new();
        let inner = arena.make_function(Some("inner"), &[], false);
        let inner_body = arena.function_body(inner);
        let sup = arena.make_super();
        let inner_stmt = arena.make_expr_stmt(sup);
        arena.add_child_to_back(inner_body, inner_stmt);

        let outer_stmt = arena.make_expr_stmt(inner);
        assert!(!contains_super(&arena, outer_stmt));
    }

    fn bare_case(id: u32) -> Case {
        Case {
            id,
            body: Vec::new(),
            references: Vec::new(),
            jump_to: None,
            embed_into: None,
            may_fall_through: true,
        }
    }

    #[test]
    fn assemble_program_wraps_in_do_while_false_by_default() {
        let mut arena = Arena::new();
        let cases = vec![bare_case(crate::context::PROGRAM_END_ID), bare_case(crate::context::ENTRY_ID)];
        let program_fn =
            assemble_program(&mut arena, "$jscomp$generator$context", &cases, EmitOptions::default());
        let body = arena.function_body(program_fn);
        let only_child = arena.children(body)[0];
        assert!(arena.is_do_while(only_child));
    }

    #[test]
    fn assemble_program_skips_the_wrapper_when_disabled() {
        let mut arena = Arena::new();
        let cases = vec![bare_case(crate::context::PROGRAM_END_ID), bare_case(crate::context::ENTRY_ID)];
        let options = EmitOptions { wrap_in_do_while_false: false };
        let program_fn = assemble_program(&mut arena, "$jscomp$generator$context", &cases, options);
        let body = arena.function_body(program_fn);
        let only_child = arena.children(body)[0];
        assert!(!arena.is_do_while(only_child));
        assert!(matches!(arena.kind(only_child), NodeKind::Switch { .. }));
    }

    #[test]
    fn assemble_program_drops_the_program_end_case_from_the_switch() {
        let mut arena = Arena::new();
        let cases = vec![bare_case(crate::context::PROGRAM_END_ID), bare_case(crate::context::ENTRY_ID)];
        let program_fn =
            assemble_program(&mut arena, "$jscomp$generator$context", &cases, EmitOptions::default());
        let body = arena.function_body(program_fn);
        let do_node = arena.children(body)[0];
        let (inner, _cond) = arena.do_while_parts(do_node);
        let switch_node = arena.children(inner)[0];
        let (_disc, switch_cases) = arena.switch_parts(switch_node);
        assert_eq!(switch_cases.len(), 1);
        let (test, _) = arena.switch_case_parts(switch_cases[0]);
        assert_eq!(arena.as_number(test.unwrap()), Some(crate::context::ENTRY_ID as i64));
    }

    #[test]
    fn splice_hoisted_decls_orders_this_arguments_vars_then_functions() {
        let mut arena = Arena::new();
        let function = arena.make_function(Some("f"), &[], false);
        let body = arena.function_body(function);
        let ret = arena.make_return(None);
        arena.add_child_to_back(body, ret);

        let this_decl = {
            let d = arena.make_var_declarator("$jscomp$generator$this", None);
            arena.make_var_decl(&[d])
        };
        let arguments_decl = {
            let d = arena.make_var_declarator("$jscomp$generator$arguments", None);
            arena.make_var_decl(&[d])
        };
        let var_decl = {
            let d = arena.make_var_declarator("x", None);
            arena.make_var_decl(&[d])
        };
        let nested_fn = arena.make_function(Some("helper"), &[], false);

        let hoisted = HoistedDecls {
            this_decl: Some(this_decl),
            arguments_decl: Some(arguments_decl),
            var_decls: vec![var_decl],
            functions: vec![nested_fn],
        };
        splice_hoisted_decls(&mut arena, function, &hoisted);

        let children = arena.children(body);
        assert_eq!(
            children.to_vec(),
            vec![this_decl, arguments_decl, var_decl, nested_fn, ret]
        );
    }

    fn run_pass(arena: &mut Arena, func: NodeId) -> DiagnosticsHandler {
        let diagnostics = DiagnosticsHandler::new();
        let mut decomposer = DefaultExpressionDecomposer::new();
        let mut cfg = SimpleCfgOracle::new();
        let transpiler = FunctionTranspiler::new(&diagnostics, &mut decomposer, &mut cfg, 0, EmitOptions::default());
        transpiler.run(arena, func).unwrap();
        diagnostics
    }

    #[test]
    fn an_anonymous_generator_is_given_a_synthetic_name() {
        let mut arena = Arena::new();
        let func = arena.make_function(None, &[], true);
        let body = arena.function_body(func);
        let y = arena.make_yield(None, false);
        let stmt = arena.make_expr_stmt(y);
        arena.add_child_to_back(body, stmt);

        run_pass(&mut arena, func);

        assert_eq!(arena.function_name(func).map(|n| n.to_string()), Some("generator$function".to_string()));
    }

    #[test]
    fn an_if_with_a_yield_in_its_then_branch_produces_a_dedicated_case() {
        let mut arena = Arena::new();
        let func = arena.make_function(Some("gen"), &[], true);
        let body = arena.function_body(func);

        let cond = arena.make_name("flag");
        let y = arena.make_yield(None, false);
        let then_stmt = arena.make_expr_stmt(y);
        let then_block = jscomp_genlower_ast::block_of(&mut arena, &[then_stmt]);
        let if_node = arena.make_if(cond, then_block, None);
        arena.add_child_to_back(body, if_node);

        let diagnostics = run_pass(&mut arena, func);
        assert!(diagnostics.is_empty());
        assert!(!arena.function_is_generator(func));
    }

    #[test]
    fn a_try_finally_with_no_yield_anywhere_still_lowers_cleanly() {
        let mut arena = Arena::new();
        let func = arena.make_function(Some("gen"), &[], true);
        let body = arena.function_body(func);

        let side_effect = arena.make_name("doThing");
        let call = arena.make_call(side_effect, &[]);
        let try_stmt = arena.make_expr_stmt(call);
        let try_block = jscomp_genlower_ast::block_of(&mut arena, &[try_stmt]);

        let cleanup = arena.make_name("cleanup");
        let cleanup_call = arena.make_call(cleanup, &[]);
        let finally_stmt = arena.make_expr_stmt(cleanup_call);
        let finally_block = jscomp_genlower_ast::block_of(&mut arena, &[finally_stmt]);

        let try_node = arena.make_try(try_block, None, Some(finally_block));

        let y = arena.make_yield(None, false);
        let y_stmt = arena.make_expr_stmt(y);
        arena.add_child_to_back(body, try_node);
        arena.add_child_to_back(body, y_stmt);

        let diagnostics = run_pass(&mut arena, func);
        assert!(diagnostics.is_empty());
        assert!(!arena.function_is_generator(func));
    }
}
