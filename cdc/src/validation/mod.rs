//! Record validation against named rules.
//!
//! Rules are written in a small SQL-like expression language, compiled against the source
//! schema when a target is registered and evaluated with SQL three-valued logic.

mod ast;
mod lexer;
mod parser;
mod predicate;
mod rule;
mod validator;

pub use ast::{CompareOp, Expr, Literal};
pub use parser::parse_expression;
pub use predicate::{Predicate, Truth};
pub use rule::ValidationRule;
pub use validator::{Validation, ValidationReport, Validator};
