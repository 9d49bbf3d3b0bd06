//! The small expression language used inside configuration files.
//!
//! This module provides:
//! - A lexer and parser for expressions and `${ }` string templates
//! - Runtime values, including values unknown until apply
//! - Reference extraction, used to derive graph edges
//! - An evaluator with built-in and provider-defined functions

pub mod eval;
pub mod expr;
pub mod functions;
pub mod lexer;
pub mod refs;
pub mod traversal;
pub mod value;

pub use eval::{MapScope, Scope, evaluate};
pub use expr::{Expr, FunctionName, ParseError, parse_expression, parse_template};
pub use functions::{FunctionResults, call_hash};
pub use refs::{filter_self, references_in_expr, references_in_exprs, resolve_references};
pub use traversal::{Traversal, TraversalStep};
pub use value::{AttributePath, DynamicValue, PathStep, Value, ValueEncoding};
