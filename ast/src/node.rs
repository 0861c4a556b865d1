use cranelift_entity::entity_impl;
use smallvec::SmallVec;

/// A handle to a node in an [`crate::Arena`].
///
/// This plays the role of the opaque AST node reference described by the host compiler's real
/// AST: stable across `detach`/`replaceWith`, cheap to copy, and never dereferenced except
/// through the arena that created it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);
entity_impl!(NodeId, "node");

impl core::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Source-position stand-in. The real pass propagates source spans through every emitted node;
/// this repository only needs enough of a span to label diagnostics, so it is a single opaque
/// offset pair rather than a full file/line/column model.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

pub type Children = SmallVec<[NodeId; 4]>;

/// The tagged variant for a node's syntactic kind.
///
/// Per the Design Notes ("Deep statement dispatch"), lowering dispatches on this tag via a table
/// of lowering functions rather than via subclassing; the marked/unmarked dichotomy is a separate
/// precomputed bit (`Node::generator_marker`), not encoded here.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Program,
    Block,
    Function {
        name: Option<compact_str::CompactString>,
        params: SmallVec<[compact_str::CompactString; 4]>,
        is_generator: bool,
        /// body is always the node's sole child, a `Block`; kept for clarity at call sites.
        body: NodeId,
    },
    ExprStmt,
    VarDecl,
    VarDeclarator {
        name: compact_str::CompactString,
        /// `init`, if present, is the declarator's sole child.
        init: Option<NodeId>,
    },
    Return {
        value: Option<NodeId>,
    },
    Throw {
        value: NodeId,
    },
    Break {
        label: Option<compact_str::CompactString>,
    },
    Continue {
        label: Option<compact_str::CompactString>,
    },
    Label {
        name: compact_str::CompactString,
        body: NodeId,
    },
    If {
        cond: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    For {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    DoWhile {
        body: NodeId,
        cond: NodeId,
    },
    ForIn {
        var_name: compact_str::CompactString,
        object: NodeId,
        body: NodeId,
    },
    Try {
        block: NodeId,
        catch: Option<(compact_str::CompactString, NodeId)>,
        finally: Option<NodeId>,
    },
    Switch {
        discriminant: NodeId,
        cases: SmallVec<[NodeId; 4]>,
    },
    /// `test == None` means the `default:` arm.
    SwitchCase {
        test: Option<NodeId>,
        body: NodeId,
    },
    Yield {
        argument: Option<NodeId>,
        delegate: bool,
    },
    Assign {
        target: NodeId,
        value: NodeId,
    },
    Binary {
        op: compact_str::CompactString,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: compact_str::CompactString,
        argument: NodeId,
    },
    Comma {
        exprs: SmallVec<[NodeId; 2]>,
    },
    Name {
        name: compact_str::CompactString,
    },
    This,
    Super,
    Arguments,
    Call {
        callee: NodeId,
        args: SmallVec<[NodeId; 4]>,
    },
    Member {
        object: NodeId,
        property: compact_str::CompactString,
    },
    Literal(Literal),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(i64),
    Str(compact_str::CompactString),
    Bool(bool),
    Null,
    Undefined,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
    pub children: Children,
    /// Set by `MarkerPropagator`: this subtree (not crossing function boundaries) contains a
    /// `yield`. Cleared and recomputed whenever `YieldExposer` restructures a subtree (§4.2).
    pub generator_marker: bool,
    /// Single-use bit set by an emitter that has already lowered a subtree it produced, so that
    /// `UnmarkedSubtreeFixer` does not re-enter it. Cleared on first encounter (§3 invariant).
    pub generator_safe: bool,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            span: Span::default(),
            parent: None,
            children: Children::new(),
            generator_marker: false,
            generator_safe: false,
        }
    }
}
