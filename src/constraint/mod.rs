//! Schema-declared constraint expressions.
//!
//! A constraint is a small program attached to a schema node
//! (`update-constraints` / `delete-constraints`) that must evaluate
//! true for a candidate tree to be accepted. The pipeline is
//! lexer → memoized recursive-descent parser → evaluator with an
//! explicit per-call context.

pub mod eval;
pub mod lexer;
pub mod parser;

pub use eval::{validate, validate_all, EvalContext, EvalValue};
pub use parser::{Expr, PathFnKind};
