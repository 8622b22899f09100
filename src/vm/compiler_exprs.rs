//! Expression lowering for `FunctionCompiler` (§4.2's expression rules).

use crate::ast::expr::{BinOp, Expr, UnaryOp};
use crate::error::CompileError;
use crate::object::Strings;
use crate::value::Value;

use super::compiler::{CompileResult, FunctionCompiler, VariableAccess};
use super::opcode::OpCode;

impl FunctionCompiler {
    /// Compile `expr`, returning the register holding its result. Local
    /// variable reads return their pinned register directly — no register
    /// is reserved and no MOVE is emitted.
    pub(super) fn compile_expr(&mut self, expr: &Expr, strings: &mut Strings) -> CompileResult<u8> {
        match expr {
            Expr::Int(n, span) => {
                let r = self.reserve_reg();
                if *n >= i32::from(i16::MIN) as i64 && *n <= i32::from(i16::MAX) as i64 {
                    self.emit_asbx(OpCode::LoadI, r, *n as i32, span.line);
                } else {
                    let k = self.add_constant(Value::Int(*n), *span)?;
                    self.emit_abx(OpCode::LoadK, r, k, span.line);
                }
                Ok(r)
            }
            Expr::Float(n, span) => {
                let r = self.reserve_reg();
                let k = self.add_constant(Value::Float(*n), *span)?;
                self.emit_abx(OpCode::LoadK, r, k, span.line);
                Ok(r)
            }
            Expr::Str(s, span) => {
                let r = self.reserve_reg();
                let interned = strings.intern(s);
                let k = self.add_constant(Value::Str(interned), *span)?;
                self.emit_abx(OpCode::LoadK, r, k, span.line);
                Ok(r)
            }
            Expr::Bool(b, span) => {
                let r = self.reserve_reg();
                let op = if *b { OpCode::LoadTrue } else { OpCode::LoadFalse };
                self.emit_abc(op, r, 0, 0, false, span.line);
                Ok(r)
            }
            Expr::Null(span) => {
                let r = self.reserve_reg();
                self.emit_abc(OpCode::LoadNil, r, 0, 0, false, span.line);
                Ok(r)
            }
            Expr::Variable(name, span) => match self.resolve_variable(name, *span)? {
                VariableAccess::Local(reg) => Ok(reg),
                VariableAccess::Upvalue(idx) => {
                    let r = self.reserve_reg();
                    self.emit_abc(OpCode::GetUpval, r, idx, 0, false, span.line);
                    Ok(r)
                }
                VariableAccess::Global(name) => {
                    let r = self.reserve_reg();
                    let key = self.global_key_constant(&name, *span, strings)?;
                    self.emit_abx(OpCode::GetGlobal, r, key, span.line);
                    Ok(r)
                }
            },
            Expr::Unary { op, operand, span } => {
                let operand_reg = self.compile_expr(operand, strings)?;
                let dest = self.reserve_reg();
                let opcode = match op {
                    UnaryOp::Neg => OpCode::Unm,
                    UnaryOp::Not => OpCode::Not,
                };
                self.emit_abc(opcode, dest, operand_reg, 0, false, span.line);
                Ok(dest)
            }
            Expr::Binary { op, left, right, span } => self.compile_binary(*op, left, right, *span, strings),
            Expr::Assign { name, value, span } => {
                let value_reg = self.compile_expr(value, strings)?;
                match self.resolve_variable(name, *span)? {
                    VariableAccess::Local(reg) => {
                        if reg != value_reg {
                            self.emit_abc(OpCode::Move, reg, value_reg, 0, false, span.line);
                        }
                        Ok(reg)
                    }
                    VariableAccess::Upvalue(idx) => {
                        self.emit_abc(OpCode::SetUpval, value_reg, idx, 0, false, span.line);
                        Ok(value_reg)
                    }
                    VariableAccess::Global(name) => {
                        let key = self.global_key_constant(&name, *span, strings)?;
                        self.emit_abx(OpCode::SetGlobal, value_reg, key, span.line);
                        Ok(value_reg)
                    }
                }
            }
            Expr::Call { callee, args, span } => {
                let base = self.freereg.max(self.nactvar);
                self.reserve_at_least(base);
                let callee_reg = self.reserve_reg();
                self.compile_expr_into(callee, callee_reg, strings)?;
                for arg in args {
                    let arg_reg = self.reserve_reg();
                    self.compile_expr_into(arg, arg_reg, strings)?;
                }
                self.emit_abc(OpCode::Call, callee_reg, args.len() as u8, 0, false, span.line);
                self.free_to((callee_reg + 1).max(self.nactvar));
                Ok(callee_reg)
            }
            Expr::Array { elements, span } => {
                let base = self.reserve_reg();
                self.emit_abx(OpCode::NewTable, base, elements.len() as u32, span.line);
                for (i, elem) in elements.iter().enumerate() {
                    let slot = self.reserve_reg();
                    self.compile_expr_into(elem, slot, strings)?;
                    let _ = i;
                }
                if !elements.is_empty() {
                    self.emit_abc(
                        OpCode::SetList,
                        base,
                        elements.len() as u8,
                        0,
                        false,
                        span.line,
                    );
                }
                self.free_to((base + 1).max(self.nactvar));
                Ok(base)
            }
            Expr::Index { object, index, span } => {
                let obj_reg = self.compile_expr(object, strings)?;
                let idx_reg = self.compile_expr(index, strings)?;
                let dest = self.reserve_reg();
                self.emit_abc(OpCode::GetI, dest, obj_reg, idx_reg, false, span.line);
                Ok(dest)
            }
            Expr::IndexAssign { object, index, value, span } => {
                let obj_reg = self.compile_expr(object, strings)?;
                let idx_reg = self.compile_expr(index, strings)?;
                let value_reg = self.compile_expr(value, strings)?;
                self.emit_abc(OpCode::SetI, obj_reg, idx_reg, value_reg, false, span.line);
                Ok(value_reg)
            }
        }
    }

    /// Compile `expr` directly into register `target` (used where the
    /// calling convention demands a specific, contiguous register — call
    /// arguments, array literal slots).
    pub(super) fn compile_expr_into(&mut self, expr: &Expr, target: u8, strings: &mut Strings) -> CompileResult<()> {
        self.reserve_at_least(target);
        let r = self.compile_expr(expr, strings)?;
        if r != target {
            self.emit_abc(OpCode::Move, target, r, 0, false, expr.span().line);
        }
        self.reserve_at_least(target + 1);
        Ok(())
    }

    fn compile_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        span: crate::span::Span,
        strings: &mut Strings,
    ) -> CompileResult<u8> {
        match op {
            BinOp::And | BinOp::Or => self.compile_short_circuit(op, left, right, span, strings),
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let lr = self.compile_expr(left, strings)?;
                let rr = self.compile_expr(right, strings)?;
                let dest = self.reserve_reg();
                self.emit_abc(arith_opcode(op), dest, lr, rr, false, span.line);
                Ok(dest)
            }
            BinOp::Eq | BinOp::NotEq | BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq => {
                let lr = self.compile_expr(left, strings)?;
                let rr = self.compile_expr(right, strings)?;
                let dest = self.reserve_reg();
                let (opcode, k) = compare_opcode(op);
                // Skip-next-if-true pattern: materialize the bool via two
                // LOADTRUE/LOADFALSE targets (§4.1's EQ/LT/.../k contract
                // has no destination register by itself).
                self.emit_abc(opcode, lr, rr, 0, k, span.line);
                let jump_to_false = self.emit_jump(OpCode::Jmp, span.line);
                self.emit_abc(OpCode::LoadTrue, dest, 0, 0, false, span.line);
                let jump_to_end = self.emit_jump(OpCode::Jmp, span.line);
                self.patch_jump_here(jump_to_false, span)?;
                self.emit_abc(OpCode::LoadFalse, dest, 0, 0, false, span.line);
                self.patch_jump_here(jump_to_end, span)?;
                Ok(dest)
            }
        }
    }

    /// `&&`/`||` short-circuit via `TEST`+`JMP` rather than unconditional
    /// evaluation of both sides; JS-style value semantics (the chosen
    /// operand's own value survives, not a coerced bool).
    fn compile_short_circuit(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        span: crate::span::Span,
        strings: &mut Strings,
    ) -> CompileResult<u8> {
        let before = self.freereg;
        let dest = before.max(self.nactvar);
        self.compile_expr_into(left, dest, strings)?;
        // TEST dest k: skip the next instruction (the short-circuit JMP)
        // when falsey(dest) == k. AND wants to evaluate the RHS exactly
        // when LHS is truthy, so k=false; OR wants to skip the JMP (and so
        // evaluate the RHS) when LHS is falsey, so k=true.
        let k = matches!(op, BinOp::Or);
        self.emit_abc(OpCode::Test, dest, 0, 0, k, span.line);
        let short_circuit_jump = self.emit_jump(OpCode::Jmp, span.line);
        self.free_to(dest + 1);
        self.compile_expr_into(right, dest, strings)?;
        self.patch_jump_here(short_circuit_jump, span)?;
        self.free_to((dest + 1).max(self.nactvar));
        Ok(dest)
    }

    pub(super) fn global_key_constant(
        &mut self,
        name: &str,
        span: crate::span::Span,
        strings: &mut Strings,
    ) -> CompileResult<u32> {
        let interned = strings.intern(name);
        self.add_constant(Value::Str(interned), span)
    }
}

fn arith_opcode(op: BinOp) -> OpCode {
    match op {
        BinOp::Add => OpCode::Add,
        BinOp::Sub => OpCode::Sub,
        BinOp::Mul => OpCode::Mul,
        BinOp::Div => OpCode::Div,
        BinOp::Mod => OpCode::Mod,
        _ => unreachable!("not an arithmetic op"),
    }
}

/// Maps a comparison `BinOp` to the `EQ`/`LT`/`LE`/`GT`/`GE` opcode that
/// computes it plus the `k` sense bit so that the skip-next-if-true pattern
/// in `compile_binary` materializes the correct boolean. `NotEq` reuses `EQ`
/// with the sense inverted rather than needing its own opcode.
fn compare_opcode(op: BinOp) -> (OpCode, bool) {
    match op {
        BinOp::Eq => (OpCode::Eq, false),
        BinOp::NotEq => (OpCode::Eq, true),
        BinOp::Less => (OpCode::Lt, false),
        BinOp::LessEq => (OpCode::Le, false),
        BinOp::Greater => (OpCode::Gt, false),
        BinOp::GreaterEq => (OpCode::Ge, false),
        _ => unreachable!("not a comparison op"),
    }
}
