//! UnmarkedSubtreeFixer (§4.5): the secondary walk applied to yield-free subtrees that get
//! emitted verbatim into a generated case. Rewrites bare `return`, bare `break`/`continue` that
//! escape the current case, labeled break/continue, `this`/`arguments` references, splits
//! `var`-declarator lists, and collects nested function declarations for hoisting.

use jscomp_genlower_ast::{block_of, Arena, NodeId, NodeKind};
use jscomp_genlower_diagnostics::InternalError;

use crate::context::TranspilationContext;
use crate::runtime::{arguments_name, this_name};

/// Declarations this walk decided must be hoisted to program-body scope (§4.5, §6
/// "Hoisted-var placement"), to be spliced in by the caller between the outer function's head and
/// `return runtime.createGenerator(...)`.
#[derive(Default)]
pub struct HoistedDecls {
    pub this_decl: Option<NodeId>,
    pub arguments_decl: Option<NodeId>,
    pub var_decls: Vec<NodeId>,
    pub functions: Vec<NodeId>,
}

pub struct UnmarkedSubtreeFixer<'a> {
    ctx: &'a mut TranspilationContext,
    context_var: String,
    nesting_level: u32,
    break_suppressors: u32,
    continue_suppressors: u32,
    hoisted: HoistedDecls,
}

impl<'a> UnmarkedSubtreeFixer<'a> {
    pub fn new(ctx: &'a mut TranspilationContext, context_var: String, nesting_level: u32) -> Self {
        Self {
            ctx,
            context_var,
            nesting_level,
            break_suppressors: 0,
            continue_suppressors: 0,
            hoisted: HoistedDecls::default(),
        }
    }

    pub fn into_hoisted(self) -> HoistedDecls {
        self.hoisted
    }

    /// Entry point: fixes one unmarked statement, returning the node that should occupy its
    /// original position (usually the same node, mutated in place; occasionally a replacement,
    /// e.g. a bare `break;` becomes a two-statement block).
    pub fn fix(&mut self, arena: &mut Arena, node: NodeId) -> Result<NodeId, InternalError> {
        self.fix_stmt(arena, node)
    }

    fn fix_stmt(&mut self, arena: &mut Arena, node: NodeId) -> Result<NodeId, InternalError> {
        if arena.take_generator_safe(node) {
            return Ok(node);
        }
        if arena.is_function(node) {
            self.hoisted.functions.push(node);
            return Ok(arena.make_block());
        }

        match arena.kind(node).clone() {
            NodeKind::Block => self.fix_block(arena, node),
            NodeKind::ExprStmt => {
                let e = arena.expr_stmt_expr(node);
                let fixed = self.fix_expr(arena, e)?;
                if fixed != e {
                    arena.replace_with(e, fixed);
                }
                Ok(node)
            }
            NodeKind::VarDecl => self.split_var_decl(arena, node),
            NodeKind::Return { value } => self.fix_return(arena, node, value),
            NodeKind::Throw { value } => {
                let fixed = self.fix_expr(arena, value)?;
                arena.set_throw_value(node, fixed);
                Ok(node)
            }
            NodeKind::Break { label: None } if self.break_suppressors == 0 => {
                Ok(self.rewrite_bare_break(arena))
            }
            NodeKind::Continue { label: None } if self.continue_suppressors == 0 => {
                Ok(self.rewrite_bare_continue(arena))
            }
            NodeKind::Break { label: None } | NodeKind::Continue { label: None } => Ok(node),
            NodeKind::Break { label: Some(name) } => self.rewrite_labeled_break(arena, &name),
            NodeKind::Continue { label: Some(name) } => self.rewrite_labeled_continue(arena, &name),
            NodeKind::Label { body, .. } => {
                let fixed = self.fix_stmt(arena, body)?;
                if fixed != body {
                    arena.replace_with(body, fixed);
                }
                Ok(node)
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.fix_if(arena, node, cond, then_branch, else_branch),
            NodeKind::For { .. }
            | NodeKind::While { .. }
            | NodeKind::DoWhile { .. }
            | NodeKind::ForIn { .. } => self.fix_loop(arena, node),
            NodeKind::Try { .. } => self.fix_try(arena, node),
            NodeKind::Switch { .. } => self.fix_switch(arena, node),
            _ => self.fix_expr(arena, node),
        }
    }

    fn fix_block(&mut self, arena: &mut Arena, node: NodeId) -> Result<NodeId, InternalError> {
        let children: Vec<NodeId> = arena.children(node).to_vec();
        for child in children {
            let fixed = self.fix_stmt(arena, child)?;
            if fixed != child {
                arena.replace_with(child, fixed);
            }
        }
        Ok(node)
    }

    fn fix_if(
        &mut self,
        arena: &mut Arena,
        node: NodeId,
        cond: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    ) -> Result<NodeId, InternalError> {
        let fixed_cond = self.fix_expr(arena, cond)?;
        if fixed_cond != cond {
            arena.replace_with(cond, fixed_cond);
        }
        let fixed_then = self.fix_stmt(arena, then_branch)?;
        if fixed_then != then_branch {
            arena.replace_with(then_branch, fixed_then);
        }
        if let Some(e) = else_branch {
            let fixed_else = self.fix_stmt(arena, e)?;
            if fixed_else != e {
                arena.replace_with(e, fixed_else);
            }
        }
        Ok(node)
    }

    fn fix_loop(&mut self, arena: &mut Arena, node: NodeId) -> Result<NodeId, InternalError> {
        self.break_suppressors += 1;
        self.continue_suppressors += 1;
        let result = self.fix_loop_inner(arena, node);
        self.break_suppressors -= 1;
        self.continue_suppressors -= 1;
        result?;
        Ok(node)
    }

    fn fix_loop_inner(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), InternalError> {
        match arena.kind(node).clone() {
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(i) = init {
                    let fixed = if arena.is_var(i) {
                        self.split_var_decl(arena, i)?
                    } else {
                        self.fix_expr(arena, i)?
                    };
                    if fixed != i {
                        arena.replace_with(i, fixed);
                    }
                }
                if let Some(c) = cond {
                    let fixed = self.fix_expr(arena, c)?;
                    if fixed != c {
                        arena.replace_with(c, fixed);
                    }
                }
                if let Some(u) = update {
                    let fixed = self.fix_expr(arena, u)?;
                    if fixed != u {
                        arena.replace_with(u, fixed);
                    }
                }
                let fixed_body = self.fix_stmt(arena, body)?;
                if fixed_body != body {
                    arena.replace_with(body, fixed_body);
                }
            }
            NodeKind::While { cond, body } => {
                let fixed_cond = self.fix_expr(arena, cond)?;
                if fixed_cond != cond {
                    arena.replace_with(cond, fixed_cond);
                }
                let fixed_body = self.fix_stmt(arena, body)?;
                if fixed_body != body {
                    arena.replace_with(body, fixed_body);
                }
            }
            NodeKind::DoWhile { body, cond } => {
                let fixed_body = self.fix_stmt(arena, body)?;
                if fixed_body != body {
                    arena.replace_with(body, fixed_body);
                }
                let fixed_cond = self.fix_expr(arena, cond)?;
                if fixed_cond != cond {
                    arena.replace_with(cond, fixed_cond);
                }
            }
            NodeKind::ForIn { object, body, .. } => {
                let fixed_obj = self.fix_expr(arena, object)?;
                if fixed_obj != object {
                    arena.replace_with(object, fixed_obj);
                }
                let fixed_body = self.fix_stmt(arena, body)?;
                if fixed_body != body {
                    arena.replace_with(body, fixed_body);
                }
            }
            _ => unreachable!("fix_loop called on a non-loop node"),
        }
        Ok(())
    }

    fn fix_try(&mut self, arena: &mut Arena, node: NodeId) -> Result<NodeId, InternalError> {
        let (block, catch, finally) = arena.try_parts(node);
        let fixed_block = self.fix_stmt(arena, block)?;
        if fixed_block != block {
            arena.replace_with(block, fixed_block);
        }
        if let Some((_, body)) = catch {
            let fixed = self.fix_stmt(arena, body)?;
            if fixed != body {
                arena.replace_with(body, fixed);
            }
        }
        if let Some(f) = finally {
            let fixed = self.fix_stmt(arena, f)?;
            if fixed != f {
                arena.replace_with(f, fixed);
            }
        }
        Ok(node)
    }

    fn fix_switch(&mut self, arena: &mut Arena, node: NodeId) -> Result<NodeId, InternalError> {
        let (discriminant, cases) = arena.switch_parts(node);
        let fixed_disc = self.fix_expr(arena, discriminant)?;
        if fixed_disc != discriminant {
            arena.replace_with(discriminant, fixed_disc);
        }

        self.break_suppressors += 1;
        let result = (|| -> Result<(), InternalError> {
            for case in cases.iter().copied() {
                let (test, body) = arena.switch_case_parts(case);
                if let Some(t) = test {
                    let fixed_t = self.fix_expr(arena, t)?;
                    if fixed_t != t {
                        arena.replace_with(t, fixed_t);
                    }
                }
                let fixed_body = self.fix_stmt(arena, body)?;
                if fixed_body != body {
                    arena.replace_with(body, fixed_body);
                }
            }
            Ok(())
        })();
        self.break_suppressors -= 1;
        result?;
        Ok(node)
    }

    fn fix_return(
        &mut self,
        arena: &mut Arena,
        node: NodeId,
        value: Option<NodeId>,
    ) -> Result<NodeId, InternalError> {
        let fixed_value = match value {
            Some(v) => Some(self.fix_expr(arena, v)?),
            None => None,
        };
        let value_expr = fixed_value.unwrap_or_else(|| arena.make_undefined());
        let call = arena.make_context_call(&self.context_var, "return", &[value_expr]);
        arena.set_return_value(node, Some(call));
        Ok(node)
    }

    /// `break;` with no enclosing original loop/switch in this walk: the current case itself is
    /// what needs exiting, so a literal `break;` (of the *generated* outer switch) works.
    fn rewrite_bare_break(&mut self, arena: &mut Arena) -> NodeId {
        let target = self
            .ctx
            .innermost_break()
            .expect("bare break outside any break target is a parser-level error, not ours");
        self.jump_and_break(arena, target)
    }

    fn rewrite_bare_continue(&mut self, arena: &mut Arena) -> NodeId {
        let target = self
            .ctx
            .innermost_continue()
            .expect("bare continue outside any continue target is a parser-level error, not ours");
        self.jump_and_break(arena, target)
    }

    fn jump_and_break(&mut self, arena: &mut Arena, target: u32) -> NodeId {
        let lit = arena.make_number(target as i64);
        let call = arena.make_context_call(&self.context_var, "jumpTo", &[lit]);
        let call_stmt = arena.make_expr_stmt(call);
        let brk = arena.make_break(None);
        self.ctx.record_reference(target, lit);
        block_of(arena, &[call_stmt, brk])
    }

    /// Labeled break/continue may be reached after passing through originally-nested loops or
    /// switches that this walk already counted as suppressors, so a plain `break;` would only
    /// escape the nearest one. `return context.jumpTo(...)`/`jumpThroughFinallyBlocks` unwinds
    /// regardless of nesting depth (§4.5).
    fn rewrite_labeled_break(&mut self, arena: &mut Arena, name: &str) -> Result<NodeId, InternalError> {
        let label = self
            .ctx
            .label(name)
            .ok_or_else(|| InternalError::UnresolvedLabel { name: name.to_string() })?;
        Ok(self.jump_through_or_plain_return(arena, label.break_case))
    }

    fn rewrite_labeled_continue(
        &mut self,
        arena: &mut Arena,
        name: &str,
    ) -> Result<NodeId, InternalError> {
        let label = self
            .ctx
            .label(name)
            .ok_or_else(|| InternalError::UnresolvedLabel { name: name.to_string() })?;
        let target = label
            .continue_case
            .ok_or_else(|| InternalError::UnresolvedLabel { name: name.to_string() })?;
        Ok(self.jump_through_or_plain_return(arena, target))
    }

    fn jump_through_or_plain_return(&mut self, arena: &mut Arena, target: u32) -> NodeId {
        let method = if self.ctx.active_finally_count() > 0 {
            "jumpThroughFinallyBlocks"
        } else {
            "jumpTo"
        };
        let lit = arena.make_number(target as i64);
        let call = arena.make_context_call(&self.context_var, method, &[lit]);
        let ret = arena.make_return(Some(call));
        self.ctx.record_reference(target, lit);
        ret
    }

    fn rewrite_this(&mut self, arena: &mut Arena) -> NodeId {
        let name = this_name(self.nesting_level);
        if self.ctx.mark_this_hoisted() {
            let this_val = arena.make_this();
            let declarator = arena.make_var_declarator(&name, Some(this_val));
            self.hoisted.this_decl = Some(arena.make_var_decl(&[declarator]));
        }
        arena.make_name(&name)
    }

    fn rewrite_arguments(&mut self, arena: &mut Arena) -> NodeId {
        let name = arguments_name(self.nesting_level);
        if self.ctx.mark_arguments_hoisted() {
            let args_val = arena.make_arguments();
            let declarator = arena.make_var_declarator(&name, Some(args_val));
            self.hoisted.arguments_decl = Some(arena.make_var_decl(&[declarator]));
        }
        arena.make_name(&name)
    }

    /// `var x = e, y;` → a bare `var x, y;` hoisted to program-body scope, plus `x = e;` (or a
    /// comma expression for several initialized declarators) left at the original site (§4.5).
    fn split_var_decl(&mut self, arena: &mut Arena, node: NodeId) -> Result<NodeId, InternalError> {
        let declarators: Vec<NodeId> = arena.children(node).to_vec();
        let mut hoisted_names = Vec::new();
        let mut assigns = Vec::new();

        for d in declarators {
            let name = arena.var_declarator_name(d);
            if let Some(init) = arena.var_declarator_init(d) {
                let fixed_init = self.fix_expr(arena, init)?;
                let name_ref = arena.make_name(&name);
                assigns.push(arena.make_assign(name_ref, fixed_init));
            }
            hoisted_names.push(name);
        }

        let hoisted_declarators: Vec<NodeId> = hoisted_names
            .iter()
            .map(|n| arena.make_var_declarator(n, None))
            .collect();
        self.hoisted.var_decls.push(arena.make_var_decl(&hoisted_declarators));

        Ok(if assigns.is_empty() {
            arena.make_block()
        } else if assigns.len() == 1 {
            arena.make_expr_stmt(assigns[0])
        } else {
            let comma = arena.make_comma(&assigns);
            arena.make_expr_stmt(comma)
        })
    }

    pub(crate) fn fix_expr(&mut self, arena: &mut Arena, node: NodeId) -> Result<NodeId, InternalError> {
        if arena.take_generator_safe(node) {
            return Ok(node);
        }
        match arena.kind(node) {
            NodeKind::This => Ok(self.rewrite_this(arena)),
            NodeKind::Arguments => Ok(self.rewrite_arguments(arena)),
            // Nested function bodies are a separate scope; never descend into them here, mirroring
            // MarkerPropagator/YieldFinder's function-boundary rule.
            NodeKind::Function { .. } => Ok(node),
            _ => {
                let children: Vec<NodeId> = arena.children(node).to_vec();
                for child in children {
                    let fixed = self.fix_expr(arena, child)?;
                    if fixed != child {
                        arena.replace_with(child, fixed);
                    }
                }
                Ok(node)
            }
        }
    }
}
