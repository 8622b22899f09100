//! The register-based bytecode core: single-pass compiler plus the VM that
//! runs its output (§4 of the core spec).

pub mod chunk;
pub mod closure;
pub mod compiler;
pub mod compiler_exprs;
pub mod compiler_stmts;
pub mod disassembler;
pub mod opcode;
#[allow(clippy::module_inception)]
pub mod vm;

pub use chunk::Proto;
pub use closure::{Closure, Upvalue, UpvalInfo};
pub use compiler::compile;
pub use disassembler::disassemble;
pub use opcode::{Instruction, OpCode};
pub use vm::Vm;
