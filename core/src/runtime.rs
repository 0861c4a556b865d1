//! Generated identifier conventions (§6) and convenience emitters for the runtime method-call
//! surface (`context.jumpTo`, `context.yield`, ...) the lowering writes into generated cases.

use jscomp_genlower_ast::{Arena, NodeId};

use crate::context::TranspilationContext;

/// Builds one of the `$jscomp$generator$...` identifiers, appending a `$<nestingLevel>` suffix
/// when `nesting_level > 0` (§6: "Generated identifier conventions").
pub fn generated_name(base: &str, nesting_level: u32) -> String {
    if nesting_level == 0 {
        base.to_string()
    } else {
        format!("{base}${nesting_level}")
    }
}

pub fn context_name(nesting_level: u32) -> String {
    generated_name("$jscomp$generator$context", nesting_level)
}

pub fn function_name(nesting_level: u32) -> String {
    generated_name("$jscomp$generator$function", nesting_level)
}

pub fn arguments_name(nesting_level: u32) -> String {
    generated_name("$jscomp$generator$arguments", nesting_level)
}

pub fn this_name(nesting_level: u32) -> String {
    generated_name("$jscomp$generator$this", nesting_level)
}

pub fn for_in_name(uid: u32) -> String {
    format!("$jscomp$generator$forin${uid}")
}

/// Emits `context.jumpTo(target); break;` into the current case, recording the literal as a
/// reference to `target` so collapse can retarget it, and marks the current case as not falling
/// through.
pub fn emit_jump_to_and_break(
    ctx: &mut TranspilationContext,
    arena: &mut Arena,
    context_var: &str,
    target: u32,
) {
    let lit = arena.make_number(target as i64);
    let call = arena.make_context_call(context_var, "jumpTo", &[lit]);
    let stmt = arena.make_expr_stmt(call);
    ctx.emit(stmt);
    let brk = arena.make_break(None);
    ctx.emit(brk);
    ctx.record_reference(target, lit);
    ctx.set_may_fall_through(false);
}

/// Emits `context.jumpToEnd(); break;` into the current case — like `emit_jump_to_and_break`, the
/// `break` is required so a surviving case physically stops here rather than falling into whatever
/// case the generated switch happens to place next.
pub fn emit_jump_to_end(ctx: &mut TranspilationContext, arena: &mut Arena, context_var: &str) {
    let call = arena.make_context_call(context_var, "jumpToEnd", &[]);
    let stmt = arena.make_expr_stmt(call);
    ctx.emit(stmt);
    let brk = arena.make_break(None);
    ctx.emit(brk);
    ctx.set_may_fall_through(false);
}

/// Emits `return context.return(value ?? undefined);`.
pub fn emit_return(
    ctx: &mut TranspilationContext,
    arena: &mut Arena,
    context_var: &str,
    value: Option<NodeId>,
) {
    let v = value.unwrap_or_else(|| arena.make_undefined());
    let call = arena.make_context_call(context_var, "return", &[v]);
    let stmt = arena.make_return(Some(call));
    ctx.emit(stmt);
    ctx.set_may_fall_through(false);
}

/// Emits `return context.yield(value, nextId);` and records `nextId` as a reference, the
/// canonical suspend-point shape used by every marked-statement lowering that reaches a bare
/// `yield` (§4.4.c, §8 scenario 1).
pub fn emit_yield(
    ctx: &mut TranspilationContext,
    arena: &mut Arena,
    context_var: &str,
    value: NodeId,
    next_id: u32,
) {
    let id_lit = arena.make_number(next_id as i64);
    let call = arena.make_context_call(context_var, "yield", &[value, id_lit]);
    let stmt = arena.make_return(Some(call));
    ctx.emit(stmt);
    ctx.record_reference(next_id, id_lit);
    ctx.set_may_fall_through(false);
}

/// Emits `return context.yieldAll(iterable, nextId);` (delegated yield, `yield*`).
pub fn emit_yield_all(
    ctx: &mut TranspilationContext,
    arena: &mut Arena,
    context_var: &str,
    iterable: NodeId,
    next_id: u32,
) {
    let id_lit = arena.make_number(next_id as i64);
    let call = arena.make_context_call(context_var, "yieldAll", &[iterable, id_lit]);
    let stmt = arena.make_return(Some(call));
    ctx.emit(stmt);
    ctx.record_reference(next_id, id_lit);
    ctx.set_may_fall_through(false);
}

/// `context.forIn(object)`, the expression side of the for-in → for rewrite (§4.4.i).
pub fn make_for_in_call(arena: &mut Arena, context_var: &str, object: NodeId) -> NodeId {
    arena.make_context_call(context_var, "forIn", &[object])
}
