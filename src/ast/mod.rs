//! Abstract syntax tree produced by the parser and consumed by the compiler.

pub mod expr;
pub mod stmt;

pub use expr::Expr;
pub use stmt::{Program, Stmt};
