use cranelift_entity::PrimaryMap;
use smallvec::SmallVec;

use crate::node::{Children, Literal, Node, NodeKind, Span};
pub use crate::node::NodeId;

/// An arena of AST nodes addressed by [`NodeId`].
///
/// This stands in for the production AST the real pass is linked against (§3, §6.1): the core
/// never owns nodes directly, it only ever holds a `NodeId` and goes through the arena, exactly
/// the way this workspace's other IR crates address entities through a `Context`/`DataFlowGraph`
/// rather than through owned pointers. `detach`/`replaceWith`/clone are therefore O(1) pointer
/// (index) rewrites rather than tree surgery on owned allocations.
#[derive(Default)]
pub struct Arena {
    nodes: PrimaryMap<NodeId, Node>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node::new(kind))
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id].span
    }

    pub fn set_span(&mut self, id: NodeId, span: Span) {
        self.nodes[id].span = span;
    }

    // ---- navigation -------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> Children {
        self.nodes[id].children.clone()
    }

    /// Pops and returns the first remaining child, detaching it from `id`. Used by
    /// `FunctionTranspiler::drain_statements` (§4.4 step 5), which pops each top-level statement
    /// of the original body in source order.
    pub fn pop_front_child(&mut self, id: NodeId) -> Option<NodeId> {
        if self.nodes[id].children.is_empty() {
            return None;
        }
        let child = self.nodes[id].children.remove(0);
        self.nodes[child].parent = None;
        Some(child)
    }

    // ---- mutation -----------------------------------------------------------

    /// Detaches `id` from its parent, if any. `id` remains a valid, live node (its own subtree is
    /// untouched) but is no longer reachable from the tree root until reattached.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    pub fn add_child_to_back(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
    }

    pub fn add_child_to_front(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[parent].children.insert(0, child);
        self.nodes[child].parent = Some(parent);
    }

    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        let parent = self.nodes[sibling].parent.expect("insert_before requires an attached node");
        self.detach(new_node);
        let idx = self.nodes[parent].children.iter().position(|&c| c == sibling).unwrap();
        self.nodes[parent].children.insert(idx, new_node);
        self.nodes[new_node].parent = Some(parent);
    }

    pub fn insert_after(&mut self, sibling: NodeId, new_node: NodeId) {
        let parent = self.nodes[sibling].parent.expect("insert_after requires an attached node");
        self.detach(new_node);
        let idx = self.nodes[parent].children.iter().position(|&c| c == sibling).unwrap();
        self.nodes[parent].children.insert(idx + 1, new_node);
        self.nodes[new_node].parent = Some(parent);
    }

    /// Replaces `old` with `new` in-place: `new` takes `old`'s position among its parent's
    /// children, and any reference to `old` in the parent's [`NodeKind`] payload (e.g. `If::cond`,
    /// `Binary::right`) is updated to `new` as well, so accessors like `binary_parts`/`if_parts`
    /// stay consistent with the child list. `old` is detached (but remains a live, if orphaned,
    /// node).
    pub fn replace_with(&mut self, old: NodeId, new: NodeId) {
        let Some(parent) = self.nodes[old].parent else {
            return;
        };
        self.detach(new);
        let idx = self.nodes[parent].children.iter().position(|&c| c == old).unwrap();
        self.nodes[parent].children[idx] = new;
        self.nodes[old].parent = None;
        self.nodes[new].parent = Some(parent);

        let kind = self.nodes[parent].kind.clone();
        self.nodes[parent].kind = substitute_child_ref(&kind, old, new);
    }

    /// Shallow clone: a new node with the same kind but no children and no parent.
    ///
    /// Only meaningful for leaf-like kinds (`Name`, `This`, literals) where the kind payload is
    /// reproduced exactly; for everything else see [`Arena::clone_tree`].
    pub fn clone_node(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id].kind.clone();
        let span = self.nodes[id].span;
        let new = self.alloc(kind);
        self.nodes[new].span = span;
        new
    }

    /// Deep clone of `id` and all of its descendants, remapping child references in the kind
    /// payload (e.g. `Function::body`, `If::cond`) to the cloned copies.
    pub fn clone_tree(&mut self, id: NodeId) -> NodeId {
        let children: SmallVec<[NodeId; 4]> = self.nodes[id].children.clone();
        let cloned_children: SmallVec<[NodeId; 4]> =
            children.iter().map(|&c| self.clone_tree(c)).collect();

        let kind = self.nodes[id].kind.clone();
        let remapped = remap_kind(&kind, &children, &cloned_children);
        let span = self.nodes[id].span;

        let new = self.alloc(remapped);
        self.nodes[new].span = span;
        for &c in &cloned_children {
            self.add_child_to_back(new, c);
        }
        new
    }

    // ---- markers ------------------------------------------------------------

    pub fn generator_marker(&self, id: NodeId) -> bool {
        self.nodes[id].generator_marker
    }

    pub fn set_generator_marker(&mut self, id: NodeId, value: bool) {
        self.nodes[id].generator_marker = value;
    }

    pub fn generator_safe(&self, id: NodeId) -> bool {
        self.nodes[id].generator_safe
    }

    pub fn set_generator_safe(&mut self, id: NodeId, value: bool) {
        self.nodes[id].generator_safe = value;
    }

    /// Reads and clears the generator-safe bit in one step, matching the "single-use, cleared on
    /// encounter" invariant from §3.
    pub fn take_generator_safe(&mut self, id: NodeId) -> bool {
        let v = self.nodes[id].generator_safe;
        self.nodes[id].generator_safe = false;
        v
    }

    // ---- predicates (named to match §3's token-kind test predicates exactly) ------------------

    pub fn is_yield(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Yield { .. })
    }

    pub fn is_function(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Function { .. })
    }

    pub fn is_break(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Break { .. })
    }

    pub fn is_continue(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Continue { .. })
    }

    pub fn is_var(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::VarDecl)
    }

    pub fn is_switch(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Switch { .. })
    }

    pub fn is_try(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Try { .. })
    }

    pub fn is_label(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Label { .. })
    }

    /// True for any of `for`, `for-in`, `while`, `do-while`.
    pub fn is_loop_structure(&self, id: NodeId) -> bool {
        matches!(
            self.kind(id),
            NodeKind::For { .. } | NodeKind::ForIn { .. } | NodeKind::While { .. } | NodeKind::DoWhile { .. }
        )
    }

    pub fn is_this(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::This)
    }

    pub fn is_super(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Super)
    }

    pub fn is_arguments(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Arguments)
    }

    pub fn is_return(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Return { .. })
    }

    pub fn is_name(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Name { .. })
    }

    pub fn is_block(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Block)
    }

    pub fn is_expr_result(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::ExprStmt)
    }

    pub fn is_throw(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Throw { .. })
    }

    pub fn is_for(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::For { .. })
    }

    pub fn is_for_in(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::ForIn { .. })
    }

    pub fn is_while(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::While { .. })
    }

    pub fn is_do_while(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::DoWhile { .. })
    }

    pub fn is_if(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::If { .. })
    }

    // ---- builders -----------------------------------------------------------------------------
    //
    // These correspond to the "AST construction helpers" named as an external collaborator in
    // §1; they are included here only because this repository has no other AST to construct
    // fixtures and generated code with.

    pub fn make_program(&mut self) -> NodeId {
        self.alloc(NodeKind::Program)
    }

    pub fn make_block(&mut self) -> NodeId {
        self.alloc(NodeKind::Block)
    }

    pub fn make_function(
        &mut self,
        name: Option<&str>,
        params: &[&str],
        is_generator: bool,
    ) -> NodeId {
        let body = self.make_block();
        let f = self.alloc(NodeKind::Function {
            name: name.map(Into::into),
            params: params.iter().map(|s| (*s).into()).collect(),
            is_generator,
            body,
        });
        self.add_child_to_back(f, body);
        f
    }

    pub fn function_body(&self, id: NodeId) -> NodeId {
        match self.kind(id) {
            NodeKind::Function { body, .. } => *body,
            _ => panic!("function_body called on non-function node"),
        }
    }

    pub fn function_is_generator(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Function { is_generator: true, .. })
    }

    pub fn set_function_generator(&mut self, id: NodeId, value: bool) {
        if let NodeKind::Function { is_generator, .. } = &mut self.nodes[id].kind {
            *is_generator = value;
        }
    }

    pub fn function_name(&self, id: NodeId) -> Option<compact_str::CompactString> {
        match self.kind(id) {
            NodeKind::Function { name, .. } => name.clone(),
            _ => None,
        }
    }

    pub fn set_function_name(&mut self, id: NodeId, name: &str) {
        if let NodeKind::Function { name: slot, .. } = &mut self.nodes[id].kind {
            *slot = Some(name.into());
        }
    }

    /// Clears a function's body (detaching and discarding its statements) and replaces it with a
    /// single `return <expr>;` statement, used by `FunctionTranspiler` step 3 to rewrite
    /// `F`'s body to `return runtime.createGenerator(selfNameClone, programFn);`.
    pub fn replace_function_body_with_return(&mut self, function: NodeId, expr: NodeId) {
        let body = self.function_body(function);
        let children: SmallVec<[NodeId; 4]> = self.nodes[body].children.clone();
        for c in children {
            self.detach(c);
        }
        let ret = self.make_return(Some(expr));
        self.add_child_to_back(body, ret);
    }

    pub fn make_expr_stmt(&mut self, expr: NodeId) -> NodeId {
        let n = self.alloc(NodeKind::ExprStmt);
        self.add_child_to_back(n, expr);
        n
    }

    pub fn expr_stmt_expr(&self, id: NodeId) -> NodeId {
        self.nodes[id].children[0]
    }

    pub fn make_var_decl(&mut self, declarators: &[NodeId]) -> NodeId {
        let n = self.alloc(NodeKind::VarDecl);
        for &d in declarators {
            self.add_child_to_back(n, d);
        }
        n
    }

    pub fn make_var_declarator(&mut self, name: &str, init: Option<NodeId>) -> NodeId {
        let n = self.alloc(NodeKind::VarDeclarator {
            name: name.into(),
            init,
        });
        if let Some(init) = init {
            self.add_child_to_back(n, init);
        }
        n
    }

    pub fn var_declarator_name(&self, id: NodeId) -> compact_str::CompactString {
        match self.kind(id) {
            NodeKind::VarDeclarator { name, .. } => name.clone(),
            _ => panic!("not a var declarator"),
        }
    }

    pub fn var_declarator_init(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            NodeKind::VarDeclarator { init, .. } => *init,
            _ => panic!("not a var declarator"),
        }
    }

    pub fn set_var_declarator_init(&mut self, id: NodeId, init: Option<NodeId>) {
        if let Some(old) = self.var_declarator_init(id) {
            self.detach(old);
        }
        if let NodeKind::VarDeclarator { init: slot, .. } = &mut self.nodes[id].kind {
            *slot = init;
        }
        if let Some(init) = init {
            self.add_child_to_back(id, init);
        }
    }

    pub fn make_return(&mut self, value: Option<NodeId>) -> NodeId {
        let n = self.alloc(NodeKind::Return { value });
        if let Some(v) = value {
            self.add_child_to_back(n, v);
        }
        n
    }

    pub fn return_value(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            NodeKind::Return { value } => *value,
            _ => panic!("not a return"),
        }
    }

    /// Sets `id`'s return value, handling the case where `new_value` already owns (as one of its
    /// own descendants) whatever the old value was — e.g. wrapping a return expression in
    /// `context.return(...)` detaches the expression from `id` as a side effect of building the
    /// call, so by the time this runs `id`'s stale `value` field may no longer actually be
    /// parented under `id` at all.
    pub fn set_return_value(&mut self, id: NodeId, new_value: Option<NodeId>) {
        if let NodeKind::Return { value: Some(old) } = self.kind(id).clone() {
            if self.nodes[old].parent == Some(id) {
                self.detach(old);
            }
        }
        if let Some(new_value) = new_value {
            self.add_child_to_back(id, new_value);
        }
        if let NodeKind::Return { value } = &mut self.nodes[id].kind {
            *value = new_value;
        }
    }

    pub fn make_throw(&mut self, value: NodeId) -> NodeId {
        let n = self.alloc(NodeKind::Throw { value });
        self.add_child_to_back(n, value);
        n
    }

    pub fn throw_value(&self, id: NodeId) -> NodeId {
        match self.kind(id) {
            NodeKind::Throw { value } => *value,
            _ => panic!("not a throw"),
        }
    }

    pub fn set_throw_value(&mut self, id: NodeId, new_value: NodeId) {
        let old = self.throw_value(id);
        if old == new_value {
            return;
        }
        self.replace_with(old, new_value);
    }

    pub fn make_break(&mut self, label: Option<&str>) -> NodeId {
        self.alloc(NodeKind::Break {
            label: label.map(Into::into),
        })
    }

    pub fn make_continue(&mut self, label: Option<&str>) -> NodeId {
        self.alloc(NodeKind::Continue {
            label: label.map(Into::into),
        })
    }

    pub fn break_label(&self, id: NodeId) -> Option<compact_str::CompactString> {
        match self.kind(id) {
            NodeKind::Break { label } => label.clone(),
            _ => panic!("not a break"),
        }
    }

    pub fn continue_label(&self, id: NodeId) -> Option<compact_str::CompactString> {
        match self.kind(id) {
            NodeKind::Continue { label } => label.clone(),
            _ => panic!("not a continue"),
        }
    }

    pub fn make_label(&mut self, name: &str, body: NodeId) -> NodeId {
        let n = self.alloc(NodeKind::Label {
            name: name.into(),
            body,
        });
        self.add_child_to_back(n, body);
        n
    }

    pub fn label_name(&self, id: NodeId) -> compact_str::CompactString {
        match self.kind(id) {
            NodeKind::Label { name, .. } => name.clone(),
            _ => panic!("not a label"),
        }
    }

    pub fn label_body(&self, id: NodeId) -> NodeId {
        match self.kind(id) {
            NodeKind::Label { body, .. } => *body,
            _ => panic!("not a label"),
        }
    }

    pub fn make_if(&mut self, cond: NodeId, then_branch: NodeId, else_branch: Option<NodeId>) -> NodeId {
        let n = self.alloc(NodeKind::If {
            cond,
            then_branch,
            else_branch,
        });
        self.add_child_to_back(n, cond);
        self.add_child_to_back(n, then_branch);
        if let Some(e) = else_branch {
            self.add_child_to_back(n, e);
        }
        n
    }

    pub fn if_parts(&self, id: NodeId) -> (NodeId, NodeId, Option<NodeId>) {
        match self.kind(id) {
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => (*cond, *then_branch, *else_branch),
            _ => panic!("not an if"),
        }
    }

    pub fn make_for(
        &mut self,
        init: Option<NodeId>,
        cond: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    ) -> NodeId {
        let n = self.alloc(NodeKind::For {
            init,
            cond,
            update,
            body,
        });
        for c in [init, cond, update, Some(body)].into_iter().flatten() {
            self.add_child_to_back(n, c);
        }
        n
    }

    pub fn for_parts(&self, id: NodeId) -> (Option<NodeId>, Option<NodeId>, Option<NodeId>, NodeId) {
        match self.kind(id) {
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => (*init, *cond, *update, *body),
            _ => panic!("not a for"),
        }
    }

    pub fn make_while(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        let n = self.alloc(NodeKind::While { cond, body });
        self.add_child_to_back(n, cond);
        self.add_child_to_back(n, body);
        n
    }

    pub fn while_parts(&self, id: NodeId) -> (NodeId, NodeId) {
        match self.kind(id) {
            NodeKind::While { cond, body } => (*cond, *body),
            _ => panic!("not a while"),
        }
    }

    pub fn make_do_while(&mut self, body: NodeId, cond: NodeId) -> NodeId {
        let n = self.alloc(NodeKind::DoWhile { body, cond });
        self.add_child_to_back(n, body);
        self.add_child_to_back(n, cond);
        n
    }

    pub fn do_while_parts(&self, id: NodeId) -> (NodeId, NodeId) {
        match self.kind(id) {
            NodeKind::DoWhile { body, cond } => (*body, *cond),
            _ => panic!("not a do-while"),
        }
    }

    pub fn make_for_in(&mut self, var_name: &str, object: NodeId, body: NodeId) -> NodeId {
        let n = self.alloc(NodeKind::ForIn {
            var_name: var_name.into(),
            object,
            body,
        });
        self.add_child_to_back(n, object);
        self.add_child_to_back(n, body);
        n
    }

    pub fn for_in_parts(&self, id: NodeId) -> (compact_str::CompactString, NodeId, NodeId) {
        match self.kind(id) {
            NodeKind::ForIn {
                var_name,
                object,
                body,
            } => (var_name.clone(), *object, *body),
            _ => panic!("not a for-in"),
        }
    }

    pub fn make_try(
        &mut self,
        block: NodeId,
        catch: Option<(&str, NodeId)>,
        finally: Option<NodeId>,
    ) -> NodeId {
        let catch_owned = catch.map(|(n, b)| (compact_str::CompactString::from(n), b));
        let n = self.alloc(NodeKind::Try {
            block,
            catch: catch_owned,
            finally,
        });
        self.add_child_to_back(n, block);
        if let Some((_, b)) = catch {
            self.add_child_to_back(n, b);
        }
        if let Some(f) = finally {
            self.add_child_to_back(n, f);
        }
        n
    }

    pub fn try_parts(
        &self,
        id: NodeId,
    ) -> (NodeId, Option<(compact_str::CompactString, NodeId)>, Option<NodeId>) {
        match self.kind(id) {
            NodeKind::Try {
                block,
                catch,
                finally,
            } => (*block, catch.clone(), *finally),
            _ => panic!("not a try"),
        }
    }

    pub fn make_switch(&mut self, discriminant: NodeId, cases: &[NodeId]) -> NodeId {
        let n = self.alloc(NodeKind::Switch {
            discriminant,
            cases: cases.iter().copied().collect(),
        });
        self.add_child_to_back(n, discriminant);
        for &c in cases {
            self.add_child_to_back(n, c);
        }
        n
    }

    pub fn switch_parts(&self, id: NodeId) -> (NodeId, SmallVec<[NodeId; 4]>) {
        match self.kind(id) {
            NodeKind::Switch {
                discriminant,
                cases,
            } => (*discriminant, cases.clone()),
            _ => panic!("not a switch"),
        }
    }

    pub fn set_switch_cases(&mut self, id: NodeId, cases: &[NodeId]) {
        if let NodeKind::Switch { cases: slot, .. } = &mut self.nodes[id].kind {
            *slot = cases.iter().copied().collect();
        }
    }

    pub fn make_switch_case(&mut self, test: Option<NodeId>, body: NodeId) -> NodeId {
        let n = self.alloc(NodeKind::SwitchCase { test, body });
        if let Some(t) = test {
            self.add_child_to_back(n, t);
        }
        self.add_child_to_back(n, body);
        n
    }

    pub fn switch_case_parts(&self, id: NodeId) -> (Option<NodeId>, NodeId) {
        match self.kind(id) {
            NodeKind::SwitchCase { test, body } => (*test, *body),
            _ => panic!("not a switch case"),
        }
    }

    pub fn set_switch_case_body(&mut self, id: NodeId, new_body: NodeId) {
        let old = self.switch_case_parts(id).1;
        self.replace_with(old, new_body);
        if let NodeKind::SwitchCase { body, .. } = &mut self.nodes[id].kind {
            *body = new_body;
        }
    }

    pub fn make_yield(&mut self, argument: Option<NodeId>, delegate: bool) -> NodeId {
        let n = self.alloc(NodeKind::Yield { argument, delegate });
        if let Some(a) = argument {
            self.add_child_to_back(n, a);
        }
        n
    }

    pub fn yield_parts(&self, id: NodeId) -> (Option<NodeId>, bool) {
        match self.kind(id) {
            NodeKind::Yield { argument, delegate } => (*argument, *delegate),
            _ => panic!("not a yield"),
        }
    }

    pub fn make_assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        let n = self.alloc(NodeKind::Assign { target, value });
        self.add_child_to_back(n, target);
        self.add_child_to_back(n, value);
        n
    }

    pub fn assign_parts(&self, id: NodeId) -> (NodeId, NodeId) {
        match self.kind(id) {
            NodeKind::Assign { target, value } => (*target, *value),
            _ => panic!("not an assign"),
        }
    }

    pub fn make_binary(&mut self, op: &str, left: NodeId, right: NodeId) -> NodeId {
        let n = self.alloc(NodeKind::Binary {
            op: op.into(),
            left,
            right,
        });
        self.add_child_to_back(n, left);
        self.add_child_to_back(n, right);
        n
    }

    pub fn binary_parts(&self, id: NodeId) -> (compact_str::CompactString, NodeId, NodeId) {
        match self.kind(id) {
            NodeKind::Binary { op, left, right } => (op.clone(), *left, *right),
            _ => panic!("not a binary"),
        }
    }

    pub fn make_unary(&mut self, op: &str, argument: NodeId) -> NodeId {
        let n = self.alloc(NodeKind::Unary {
            op: op.into(),
            argument,
        });
        self.add_child_to_back(n, argument);
        n
    }

    pub fn unary_parts(&self, id: NodeId) -> (compact_str::CompactString, NodeId) {
        match self.kind(id) {
            NodeKind::Unary { op, argument } => (op.clone(), *argument),
            _ => panic!("not a unary"),
        }
    }

    pub fn make_comma(&mut self, exprs: &[NodeId]) -> NodeId {
        let n = self.alloc(NodeKind::Comma {
            exprs: exprs.iter().copied().collect(),
        });
        for &e in exprs {
            self.add_child_to_back(n, e);
        }
        n
    }

    pub fn make_name(&mut self, name: &str) -> NodeId {
        self.alloc(NodeKind::Name { name: name.into() })
    }

    pub fn name_of(&self, id: NodeId) -> compact_str::CompactString {
        match self.kind(id) {
            NodeKind::Name { name } => name.clone(),
            _ => panic!("not a name"),
        }
    }

    pub fn make_this(&mut self) -> NodeId {
        self.alloc(NodeKind::This)
    }

    pub fn make_super(&mut self) -> NodeId {
        self.alloc(NodeKind::Super)
    }

    pub fn make_arguments(&mut self) -> NodeId {
        self.alloc(NodeKind::Arguments)
    }

    pub fn make_call(&mut self, callee: NodeId, args: &[NodeId]) -> NodeId {
        let n = self.alloc(NodeKind::Call {
            callee,
            args: args.iter().copied().collect(),
        });
        self.add_child_to_back(n, callee);
        for &a in args {
            self.add_child_to_back(n, a);
        }
        n
    }

    pub fn call_parts(&self, id: NodeId) -> (NodeId, SmallVec<[NodeId; 4]>) {
        match self.kind(id) {
            NodeKind::Call { callee, args } => (*callee, args.clone()),
            _ => panic!("not a call"),
        }
    }

    pub fn make_member(&mut self, object: NodeId, property: &str) -> NodeId {
        let n = self.alloc(NodeKind::Member {
            object,
            property: property.into(),
        });
        self.add_child_to_back(n, object);
        n
    }

    pub fn member_parts(&self, id: NodeId) -> (NodeId, compact_str::CompactString) {
        match self.kind(id) {
            NodeKind::Member { object, property } => (*object, property.clone()),
            _ => panic!("not a member"),
        }
    }

    /// Convenience: `context.<method>(<args...>)` as a `Call` expression, the idiom used
    /// everywhere the pass emits a runtime invocation (§6).
    pub fn make_context_call(&mut self, context_name: &str, method: &str, args: &[NodeId]) -> NodeId {
        let ctx = self.make_name(context_name);
        let callee = self.make_member(ctx, method);
        self.make_call(callee, args)
    }

    pub fn make_number(&mut self, n: i64) -> NodeId {
        self.alloc(NodeKind::Literal(Literal::Number(n)))
    }

    pub fn make_string(&mut self, s: &str) -> NodeId {
        self.alloc(NodeKind::Literal(Literal::Str(s.into())))
    }

    pub fn make_bool(&mut self, b: bool) -> NodeId {
        self.alloc(NodeKind::Literal(Literal::Bool(b)))
    }

    pub fn make_null(&mut self) -> NodeId {
        self.alloc(NodeKind::Literal(Literal::Null))
    }

    pub fn make_undefined(&mut self) -> NodeId {
        self.alloc(NodeKind::Literal(Literal::Undefined))
    }

    pub fn as_number(&self, id: NodeId) -> Option<i64> {
        match self.kind(id) {
            NodeKind::Literal(Literal::Number(n)) => Some(*n),
            _ => None,
        }
    }
}

/// Replaces every occurrence of `old` with `new` in a single node's [`NodeKind`] payload. Used by
/// [`Arena::replace_with`] to keep the payload's named fields (`If::cond`, `Binary::right`, ...)
/// in sync with the `children` list after a single child is swapped.
fn substitute_child_ref(kind: &NodeKind, old: NodeId, new: NodeId) -> NodeKind {
    remap_kind(kind, std::slice::from_ref(&old), std::slice::from_ref(&new))
}

/// Remaps the child-id fields embedded in a cloned node's [`NodeKind`] payload from the
/// originals to their freshly cloned counterparts, by position (children are visited and cloned
/// in the same order `Arena::children` returns them, which matches insertion order).
fn remap_kind(kind: &NodeKind, originals: &[NodeId], clones: &[NodeId]) -> NodeKind {
    let map = |id: NodeId| -> NodeId {
        originals
            .iter()
            .position(|&o| o == id)
            .map(|i| clones[i])
            .unwrap_or(id)
    };
    let map_opt = |id: Option<NodeId>| id.map(map);

    match kind {
        NodeKind::Program | NodeKind::Block | NodeKind::This | NodeKind::Super | NodeKind::Arguments => {
            kind.clone()
        }
        NodeKind::Function {
            name,
            params,
            is_generator,
            body,
        } => NodeKind::Function {
            name: name.clone(),
            params: params.clone(),
            is_generator: *is_generator,
            body: map(*body),
        },
        NodeKind::ExprStmt => NodeKind::ExprStmt,
        NodeKind::VarDecl => NodeKind::VarDecl,
        NodeKind::VarDeclarator { name, init } => NodeKind::VarDeclarator {
            name: name.clone(),
            init: map_opt(*init),
        },
        NodeKind::Return { value } => NodeKind::Return {
            value: map_opt(*value),
        },
        NodeKind::Throw { value } => NodeKind::Throw { value: map(*value) },
        NodeKind::Break { label } => NodeKind::Break {
            label: label.clone(),
        },
        NodeKind::Continue { label } => NodeKind::Continue {
            label: label.clone(),
        },
        NodeKind::Label { name, body } => NodeKind::Label {
            name: name.clone(),
            body: map(*body),
        },
        NodeKind::If {
            cond,
            then_branch,
            else_branch,
        } => NodeKind::If {
            cond: map(*cond),
            then_branch: map(*then_branch),
            else_branch: map_opt(*else_branch),
        },
        NodeKind::For {
            init,
            cond,
            update,
            body,
        } => NodeKind::For {
            init: map_opt(*init),
            cond: map_opt(*cond),
            update: map_opt(*update),
            body: map(*body),
        },
        NodeKind::While { cond, body } => NodeKind::While {
            cond: map(*cond),
            body: map(*body),
        },
        NodeKind::DoWhile { body, cond } => NodeKind::DoWhile {
            body: map(*body),
            cond: map(*cond),
        },
        NodeKind::ForIn {
            var_name,
            object,
            body,
        } => NodeKind::ForIn {
            var_name: var_name.clone(),
            object: map(*object),
            body: map(*body),
        },
        NodeKind::Try {
            block,
            catch,
            finally,
        } => NodeKind::Try {
            block: map(*block),
            catch: catch.as_ref().map(|(n, b)| (n.clone(), map(*b))),
            finally: map_opt(*finally),
        },
        NodeKind::Switch {
            discriminant,
            cases,
        } => NodeKind::Switch {
            discriminant: map(*discriminant),
            cases: cases.iter().map(|&c| map(c)).collect(),
        },
        NodeKind::SwitchCase { test, body } => NodeKind::SwitchCase {
            test: map_opt(*test),
            body: map(*body),
        },
        NodeKind::Yield { argument, delegate } => NodeKind::Yield {
            argument: map_opt(*argument),
            delegate: *delegate,
        },
        NodeKind::Assign { target, value } => NodeKind::Assign {
            target: map(*target),
            value: map(*value),
        },
        NodeKind::Binary { op, left, right } => NodeKind::Binary {
            op: op.clone(),
            left: map(*left),
            right: map(*right),
        },
        NodeKind::Unary { op, argument } => NodeKind::Unary {
            op: op.clone(),
            argument: map(*argument),
        },
        NodeKind::Comma { exprs } => NodeKind::Comma {
            exprs: exprs.iter().map(|&e| map(e)).collect(),
        },
        NodeKind::Name { name } => NodeKind::Name { name: name.clone() },
        NodeKind::Call { callee, args } => NodeKind::Call {
            callee: map(*callee),
            args: args.iter().map(|&a| map(a)).collect(),
        },
        NodeKind::Member { object, property } => NodeKind::Member {
            object: map(*object),
            property: property.clone(),
        },
        NodeKind::Literal(lit) => NodeKind::Literal(lit.clone()),
    }
}

/// Helper used by tests and fixture construction: builds `{ stmt1; stmt2; ... }` from a list of
/// already-constructed statement ids.
pub fn block_of(arena: &mut Arena, stmts: &[NodeId]) -> NodeId {
    let b = arena.make_block();
    for &s in stmts {
        arena.add_child_to_back(b, s);
    }
    b
}
