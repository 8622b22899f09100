//! Xray: a small dynamically-typed scripting language compiled to a
//! register-based bytecode and executed by a stack-of-frames VM.
//!
//! # Pipeline
//!
//! Source text flows through four stages: [`lexer`] produces a token
//! stream, [`parser`] builds an [`ast::Program`], [`vm::compile`] lowers
//! that program into a root [`vm::Proto`], and [`vm::Vm`] executes it.
//! [`run`] and [`run_with_trace`] wire all four together.

#![allow(clippy::module_inception)]
#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_arguments)]

pub mod ast;
pub mod error;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod span;
pub mod table;
pub mod value;
pub mod vm;

use error::XrayError;
use value::Value;

/// Compile and run a program from source, returning the value of the last
/// top-level `return` (or `null` if it falls off the end).
pub fn run(source: &str) -> Result<Value, XrayError> {
    run_with_trace(source, false)
}

/// Same as [`run`], optionally printing a disassembly trace of every
/// instruction as it executes (used by the `--trace` CLI flag).
pub fn run_with_trace(source: &str, trace_execution: bool) -> Result<Value, XrayError> {
    let proto = compile_source(source)?;
    let mut vm = vm::Vm::new().with_trace_execution(trace_execution);
    vm.execute(proto).map_err(XrayError::from)
}

/// Lex, parse, and compile source into a root prototype without running it
/// (used by `--dump` to print a disassembly and by tests).
pub fn compile_source(source: &str) -> Result<std::rc::Rc<vm::Proto>, XrayError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    let mut strings = object::Strings::new();
    vm::compile(&program, &mut strings).map_err(|mut errors| XrayError::from(errors.remove(0)))
}
