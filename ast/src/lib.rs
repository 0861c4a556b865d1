//! A small arena-backed AST used by `jscomp-genlower` as a stand-in for the production AST the
//! real pass is linked against.
//!
//! The predicates, navigation, and mutation operations exposed here correspond one-to-one with
//! the "AST Node (external)" data model described for this pass: they are deliberately named to
//! match (`is_yield`, `is_function`, `detach`, `replace_with`, `add_child_to_back`, ...) so that
//! swapping in a real production AST only means re-implementing [`Arena`]'s inherent methods
//! against that AST's own node type.

mod arena;
mod node;

pub use arena::{block_of, Arena};
pub use node::{Children, Literal, Node, NodeId, NodeKind, Span};
