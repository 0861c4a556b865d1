//! TranspilationContext (§3, §4.6): owns the generated state machine while one generator function
//! is being transpiled — the sequence of [`Case`]s, the break/continue/label/catch/finally stacks,
//! and the address-graph collapse run by [`TranspilationContext::finalize`].

use compact_str::CompactString;
use jscomp_genlower_ast::{Arena, NodeId};
use jscomp_genlower_diagnostics::InternalError;
use rustc_hash::FxHashMap;

/// The address reserved for the synthetic "generator has completed" case (§3).
pub const PROGRAM_END_ID: u32 = 0;
/// The address of the case `context.nextAddress` starts at.
pub const ENTRY_ID: u32 = 1;

/// One node of the generated `switch (context.nextAddress)` (§3).
pub struct Case {
    pub id: u32,
    pub body: Vec<NodeId>,
    /// Literal-number AST nodes elsewhere in the tree whose value is this case's id — rewritten in
    /// place by [`TranspilationContext::finalize`] if this case is merged into another.
    pub references: Vec<NodeId>,
    pub jump_to: Option<u32>,
    pub embed_into: Option<NodeId>,
    pub may_fall_through: bool,
}

impl Case {
    fn new(id: u32) -> Self {
        Self {
            id,
            body: Vec::new(),
            references: Vec::new(),
            jump_to: None,
            embed_into: None,
            may_fall_through: true,
        }
    }
}

/// `(breakCase, continueCase?)` keyed by label name (§3).
#[derive(Clone, Copy)]
pub struct LabelCases {
    pub break_case: u32,
    pub continue_case: Option<u32>,
}

/// `(catchCase, finallyBlocksPending)` (§3).
#[derive(Clone, Copy)]
pub struct CatchCase {
    pub catch_case: u32,
    pub finally_blocks_pending: u32,
}

pub struct TranspilationContext {
    cases: Vec<Case>,
    id_index: FxHashMap<u32, usize>,
    current: u32,
    next_id: u32,

    named_labels: FxHashMap<CompactString, LabelCases>,
    break_cases: Vec<u32>,
    continue_cases: Vec<u32>,
    catch_cases: Vec<CatchCase>,
    finally_cases: Vec<u32>,
    nested_finally_block_count: u32,
    catch_names: std::collections::HashSet<CompactString>,
    this_reference_found: bool,
    arguments_reference_found: bool,
}

impl TranspilationContext {
    /// Creates a fresh context with the program-end case (id 0) and the entry case (id 1)
    /// already allocated, current positioned at the entry case.
    pub fn new() -> Self {
        let mut cases = Vec::new();
        let mut id_index = FxHashMap::default();
        cases.push(Case::new(PROGRAM_END_ID));
        id_index.insert(PROGRAM_END_ID, 0);
        cases.push(Case::new(ENTRY_ID));
        id_index.insert(ENTRY_ID, 1);

        Self {
            cases,
            id_index,
            current: ENTRY_ID,
            next_id: ENTRY_ID + 1,
            named_labels: FxHashMap::default(),
            break_cases: Vec::new(),
            continue_cases: Vec::new(),
            catch_cases: Vec::new(),
            finally_cases: Vec::new(),
            nested_finally_block_count: 0,
            catch_names: std::collections::HashSet::new(),
            this_reference_found: false,
            arguments_reference_found: false,
        }
    }

    pub fn program_end_id(&self) -> u32 {
        PROGRAM_END_ID
    }

    pub fn current_id(&self) -> u32 {
        self.current
    }

    fn index_of(&self, id: u32) -> usize {
        self.id_index[&id]
    }

    pub fn case(&self, id: u32) -> &Case {
        &self.cases[self.index_of(id)]
    }

    pub fn case_mut(&mut self, id: u32) -> &mut Case {
        let idx = self.index_of(id);
        &mut self.cases[idx]
    }

    fn current_mut(&mut self) -> &mut Case {
        let idx = self.index_of(self.current);
        &mut self.cases[idx]
    }

    /// Allocates a fresh case (not yet current) and returns its id.
    pub fn alloc_case(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.id_index.insert(id, self.cases.len());
        self.cases.push(Case::new(id));
        log::trace!(target: "jscomp_genlower", "allocated case {id}");
        id
    }

    /// "Switch to C": `allCases.push(C); currentCase ← C` (§4.4). `C` must already have been
    /// allocated via [`Self::alloc_case`]. If the outgoing case's body is empty, it becomes a pure
    /// jump-chain hop into `C` — a collapse candidate.
    pub fn switch_to(&mut self, id: u32) {
        if self.current_mut().body.is_empty() {
            self.current_mut().jump_to = Some(id);
        }
        self.current = id;
    }

    /// Appends a statement to the current case's body.
    pub fn emit(&mut self, stmt: NodeId) {
        self.current_mut().body.push(stmt);
    }

    /// Appends several statements to the current case's body, in order.
    pub fn emit_all(&mut self, stmts: impl IntoIterator<Item = NodeId>) {
        let cur = self.current_mut();
        cur.body.extend(stmts);
    }

    /// Records `node` (a literal-number AST node) as referring to `target_id`, so that
    /// [`Self::finalize`] rewrites it in place if `target_id`'s case is later merged away.
    pub fn record_reference(&mut self, target_id: u32, node: NodeId) {
        self.case_mut(target_id).references.push(node);
    }

    pub fn set_may_fall_through(&mut self, value: bool) {
        self.current_mut().may_fall_through = value;
    }

    // ---- stacks (§3, §5: "every push is paired with a pop on every exit path") ----------------

    pub fn push_break(&mut self, id: u32) {
        self.break_cases.push(id);
    }

    pub fn pop_break(&mut self) {
        self.break_cases.pop();
    }

    pub fn innermost_break(&self) -> Option<u32> {
        self.break_cases.last().copied()
    }

    pub fn push_continue(&mut self, id: u32) {
        self.continue_cases.push(id);
    }

    pub fn pop_continue(&mut self) {
        self.continue_cases.pop();
    }

    pub fn innermost_continue(&self) -> Option<u32> {
        self.continue_cases.last().copied()
    }

    pub fn register_label(&mut self, name: &str, cases: LabelCases) {
        self.named_labels.insert(name.into(), cases);
    }

    pub fn unregister_label(&mut self, name: &str) {
        self.named_labels.remove(name);
    }

    pub fn label(&self, name: &str) -> Option<LabelCases> {
        self.named_labels.get(name).copied()
    }

    pub fn push_catch(&mut self, catch_case: u32) {
        self.catch_cases.push(CatchCase {
            catch_case,
            finally_blocks_pending: 0,
        });
    }

    pub fn pop_catch(&mut self) {
        self.catch_cases.pop();
    }

    pub fn innermost_catch(&self) -> Option<CatchCase> {
        self.catch_cases.last().copied()
    }

    pub fn push_finally(&mut self, id: u32) {
        self.finally_cases.push(id);
        for c in &mut self.catch_cases {
            c.finally_blocks_pending += 1;
        }
    }

    pub fn pop_finally(&mut self) {
        self.finally_cases.pop();
        for c in &mut self.catch_cases {
            c.finally_blocks_pending = c.finally_blocks_pending.saturating_sub(1);
        }
    }

    pub fn enter_finally_body(&mut self) {
        self.nested_finally_block_count += 1;
    }

    pub fn leave_finally_body(&mut self) -> Result<(), InternalError> {
        self.nested_finally_block_count = self
            .nested_finally_block_count
            .checked_sub(1)
            .ok_or(InternalError::NestedFinallyUnderflow)?;
        Ok(())
    }

    pub fn in_finally_body(&self) -> bool {
        self.nested_finally_block_count > 0
    }

    /// Number of finally blocks currently active (entered but not yet left) at this point in the
    /// walk — used by `UnmarkedSubtreeFixer` to decide whether a labeled jump must run through
    /// intervening finally blocks (§4.5).
    pub fn active_finally_count(&self) -> usize {
        self.finally_cases.len()
    }

    pub fn mark_this_hoisted(&mut self) -> bool {
        let first = !self.this_reference_found;
        self.this_reference_found = true;
        first
    }

    pub fn mark_arguments_hoisted(&mut self) -> bool {
        let first = !self.arguments_reference_found;
        self.arguments_reference_found = true;
        first
    }

    pub fn mark_catch_name_hoisted(&mut self, name: &str) -> bool {
        self.catch_names.insert(name.into())
    }

    /// Verifies the end-of-function invariants from §3: every stack empty, no active finally
    /// nesting. Called by `FunctionTranspiler` step 6 before `finalize`.
    pub fn verify_empty(&self) -> Result<(), InternalError> {
        if !self.break_cases.is_empty() {
            return Err(InternalError::StackImbalance { which: "break_cases" });
        }
        if !self.continue_cases.is_empty() {
            return Err(InternalError::StackImbalance { which: "continue_cases" });
        }
        if !self.catch_cases.is_empty() {
            return Err(InternalError::StackImbalance { which: "catch_cases" });
        }
        if !self.finally_cases.is_empty() {
            return Err(InternalError::StackImbalance { which: "finally_cases" });
        }
        if !self.named_labels.is_empty() {
            return Err(InternalError::StackImbalance { which: "named_labels" });
        }
        if self.nested_finally_block_count != 0 {
            return Err(InternalError::NestedFinallyUnderflow);
        }
        Ok(())
    }

    /// Address-graph collapse (§4.6): chain flattening, then adjacent merging. Returns the
    /// surviving cases in final switch order (entry case never renamed or dropped).
    pub fn finalize(mut self, arena: &mut Arena) -> Vec<Case> {
        log::trace!(target: "jscomp_genlower", "collapsing {} cases before chain flattening", self.cases.len());
        self.flatten_chains(arena);
        self.merge_adjacent(arena);
        log::trace!(target: "jscomp_genlower", "{} cases survive collapse", self.cases.len());
        self.cases
    }

    /// Step 1: for each case with `jump_to` set, walk the jump chain to its terminal, move the
    /// embedding hint along if uniquely referenced, retarget all of its `references` to the
    /// terminal's id, then drop it from the surviving set.
    fn flatten_chains(&mut self, arena: &mut Arena) {
        let ids: Vec<u32> = self.cases.iter().map(|c| c.id).collect();
        let mut terminal_of: FxHashMap<u32, u32> = FxHashMap::default();

        for &id in &ids {
            if id == ENTRY_ID {
                continue;
            }
            let mut terminal = id;
            let mut guard = 0usize;
            loop {
                let next = self.cases[self.index_of(terminal)].jump_to;
                match next {
                    Some(n) if n != terminal => terminal = n,
                    _ => break,
                }
                guard += 1;
                if guard > self.cases.len() + 1 {
                    break;
                }
            }
            terminal_of.insert(id, terminal);
        }

        let mut dropped: Vec<u32> = Vec::new();
        for &id in &ids {
            if id == ENTRY_ID {
                continue;
            }
            let Some(&terminal) = terminal_of.get(&id) else {
                continue;
            };
            if terminal == id || self.cases[self.index_of(id)].jump_to.is_none() {
                continue;
            }

            let (embed_into, references) = {
                let case = &mut self.cases[self.index_of(id)];
                (case.embed_into.take(), std::mem::take(&mut case.references))
            };
            if let Some(embed) = embed_into {
                if references.len() <= 1 {
                    self.cases[self.index_of(terminal)].embed_into.get_or_insert(embed);
                }
            }
            for &node in &references {
                rewrite_literal(arena, node, terminal as i64);
            }
            self.cases[self.index_of(terminal)].references.extend(references);
            log::trace!(target: "jscomp_genlower", "flattened jump chain: case {id} -> {terminal}");
            dropped.push(id);
        }

        self.drop_cases(&dropped);
    }

    /// Step 2: fold bodies of unreferenced fall-through cases into their predecessor, in source
    /// (creation) order.
    ///
    /// The program-end case sits at index 0 (created before the entry case in [`Self::new`]) but
    /// is not a real predecessor of anything in switch-fallthrough order — it is excluded from
    /// this walk entirely, otherwise an entry case with an empty body (extremely common: any
    /// function whose first marked statement immediately switches to a fresh case) would be
    /// folded into it and dropped, violating "the entry case is never dropped" (§3).
    fn merge_adjacent(&mut self, arena: &mut Arena) {
        let walk_ids: Vec<u32> =
            self.cases.iter().map(|c| c.id).filter(|&id| id != PROGRAM_END_ID).collect();
        let mut dropped: Vec<u32> = Vec::new();
        // `prev_idx` indexes into `walk_ids` and tracks the nearest still-surviving predecessor,
        // which may lag behind `i - 1` once a run of cases has already been folded away.
        let mut prev_idx = 0usize;

        for i in 1..walk_ids.len() {
            let d_id = walk_ids[i];
            let p_id = walk_ids[prev_idx];
            let d = self.index_of(d_id);
            let p = self.index_of(p_id);

            let d_empty_refs = self.cases[d].references.is_empty();
            let p_falls_through = self.cases[p].may_fall_through;
            let d_embed_single = self.cases[d].embed_into.is_some()
                && self.cases[d].references.len() == 1
                && !self.cases[d].may_fall_through;
            let p_jumps_to_d = self.cases[p].jump_to == Some(d_id);

            if d_empty_refs && p_falls_through {
                let body = std::mem::take(&mut self.cases[d].body);
                self.cases[p].body.extend(body);
                self.cases[p].may_fall_through = self.cases[d].may_fall_through;
                log::trace!(target: "jscomp_genlower", "merged unreferenced fall-through case {d_id} into {p_id}");
                dropped.push(d_id);
            } else if d_embed_single {
                if let Some(embed_block) = self.cases[d].embed_into {
                    let body = self.cases[d].body.clone();
                    replace_block_contents(arena, embed_block, &body);
                }
                log::trace!(target: "jscomp_genlower", "embedded case {d_id} into its sole reference site");
                dropped.push(d_id);
            } else if p_jumps_to_d {
                let body = std::mem::take(&mut self.cases[d].body);
                self.cases[p].body.extend(body);
                let refs = std::mem::take(&mut self.cases[d].references);
                for node in &refs {
                    rewrite_literal(arena, *node, p_id as i64);
                }
                self.cases[p].references.extend(refs);
                log::trace!(target: "jscomp_genlower", "folded pure jump successor {d_id} into {p_id}");
                dropped.push(d_id);
            } else {
                prev_idx = i;
            }
        }
        self.drop_cases(&dropped);
    }

    fn drop_cases(&mut self, dropped: &[u32]) {
        if dropped.is_empty() {
            return;
        }
        self.cases.retain(|c| !dropped.contains(&c.id));
        self.id_index.clear();
        for (idx, c) in self.cases.iter().enumerate() {
            self.id_index.insert(c.id, idx);
        }
    }
}

impl Default for TranspilationContext {
    fn default() -> Self {
        Self::new()
    }
}

fn rewrite_literal(arena: &mut Arena, node: NodeId, new_value: i64) {
    if let jscomp_genlower_ast::NodeKind::Literal(jscomp_genlower_ast::Literal::Number(n)) =
        arena.node_mut(node).kind.clone()
    {
        let _ = n;
        arena.node_mut(node).kind =
            jscomp_genlower_ast::NodeKind::Literal(jscomp_genlower_ast::Literal::Number(new_value));
    }
}

fn replace_block_contents(arena: &mut Arena, block: NodeId, stmts: &[NodeId]) {
    for child in arena.children(block) {
        arena.detach(child);
    }
    for &s in stmts {
        arena.add_child_to_back(block, s);
    }
}
