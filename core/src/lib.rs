//! Lowers ECMAScript generator functions (`function*`) into plain state-machine driver functions
//! over a small `$jscomp$generator$context` runtime object, the way a downlevel-targeting
//! transpiler rewrites `function*`/`yield` for engines that only support `function`/`return`.
//!
//! The six passes making up the transform are each their own module, run in the order
//! [`GeneratorLoweringPass`] drives them per function: [`marker`] tags every yield-containing
//! subtree, [`exposer`] hoists embedded yields into statements of their own, [`finder`] locates the
//! single yield left in an already-exposed statement, [`context`] owns the case/address graph,
//! [`unmarked_fixer`] rewrites `this`/`arguments` in any untouched subtree, and
//! [`function_transpiler`] drives all of the above over one function's body. [`cfg`] and the
//! `ExpressionDecomposer` trait in [`exposer`] are the two external seams this repository stands in
//! for with conservative reference implementations; a host compiler would supply its own.

pub mod cfg;
pub mod context;
pub mod exposer;
pub mod finder;
pub mod function_transpiler;
pub mod marker;
pub mod pass;
pub mod runtime;
pub mod unmarked_fixer;

pub use cfg::{CfgOracle, SimpleCfgOracle};
pub use context::{Case, LabelCases, TranspilationContext, ENTRY_ID, PROGRAM_END_ID};
pub use exposer::{DecomposeStep, DefaultExpressionDecomposer, ExpressionDecomposer};
pub use function_transpiler::{contains_super, EmitOptions, FunctionTranspiler};
pub use pass::GeneratorLoweringPass;
