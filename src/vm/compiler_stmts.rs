//! Statement lowering for `FunctionCompiler` (§4.2's per-statement rules).
//!
//! Every statement that leaves temporaries on the register stack resets
//! `freereg` back to `nactvar` once it's fully compiled — expression
//! lowering itself never reclaims (see `compiler_exprs.rs`), so this is the
//! only place register pressure is bounded.

use crate::ast::stmt::Stmt;
use crate::object::Strings;

use super::compiler::{CompileResult, FunctionCompiler, LoopContext};
use super::opcode::OpCode;

impl FunctionCompiler {
    pub(super) fn compile_stmt(&mut self, stmt: &Stmt, strings: &mut Strings) -> CompileResult<()> {
        match stmt {
            Stmt::Let { name, value, span } => {
                self.compile_binding(name.clone(), value, false, *span, strings)
            }
            Stmt::Const { name, value, span } => {
                self.compile_binding(name.clone(), value, true, *span, strings)
            }
            Stmt::Expression(expr) => {
                self.compile_expr(expr, strings)?;
                self.free_to(self.nactvar);
                Ok(())
            }
            Stmt::Print { expr, span } => {
                let r = self.compile_expr(expr, strings)?;
                self.emit_abc(OpCode::Print, r, 0, 0, false, span.line);
                self.free_to(self.nactvar);
                Ok(())
            }
            Stmt::Block { statements, span } => {
                self.begin_scope();
                for stmt in statements {
                    self.compile_stmt(stmt, strings)?;
                }
                self.end_scope(span.line);
                Ok(())
            }
            Stmt::If { condition, then_branch, else_branch, span } => {
                let cond_reg = self.compile_expr(condition, strings)?;
                // TEST k=false: skip the following JMP (fall into the
                // then-branch) exactly when the condition is truthy.
                self.emit_abc(OpCode::Test, cond_reg, 0, 0, false, span.line);
                let jump_to_else = self.emit_jump(OpCode::Jmp, span.line);
                self.free_to(self.nactvar);

                self.begin_scope();
                for stmt in then_branch {
                    self.compile_stmt(stmt, strings)?;
                }
                self.end_scope(span.line);

                if let Some(else_branch) = else_branch {
                    let jump_to_end = self.emit_jump(OpCode::Jmp, span.line);
                    self.patch_jump_here(jump_to_else, *span)?;
                    self.begin_scope();
                    for stmt in else_branch {
                        self.compile_stmt(stmt, strings)?;
                    }
                    self.end_scope(span.line);
                    self.patch_jump_here(jump_to_end, *span)?;
                } else {
                    self.patch_jump_here(jump_to_else, *span)?;
                }
                Ok(())
            }
            Stmt::While { condition, body, span } => {
                let loop_start = self.current_pc();
                let cond_reg = self.compile_expr(condition, strings)?;
                self.emit_abc(OpCode::Test, cond_reg, 0, 0, false, span.line);
                let exit_jump = self.emit_jump(OpCode::Jmp, span.line);
                self.free_to(self.nactvar);

                self.loops.push(LoopContext {
                    break_patches: Vec::new(),
                    continue_patches: Vec::new(),
                    scope_depth: self.scope_depth,
                });
                self.begin_scope();
                for stmt in body {
                    self.compile_stmt(stmt, strings)?;
                }
                self.end_scope(span.line);

                let ctx = self.loops.pop().expect("loop context pushed above");
                for site in ctx.continue_patches {
                    self.patch_jump_to(site, loop_start, *span)?;
                }
                self.emit_jump_back(loop_start, span.line, *span)?;
                self.patch_jump_here(exit_jump, *span)?;
                for site in ctx.break_patches {
                    self.patch_jump_here(site, *span)?;
                }
                Ok(())
            }
            Stmt::For { init, condition, increment, body, span } => {
                self.begin_scope();
                if let Some(init) = init {
                    self.compile_stmt(init, strings)?;
                }

                let loop_start = self.current_pc();
                let exit_jump = match condition {
                    Some(cond) => {
                        let cond_reg = self.compile_expr(cond, strings)?;
                        self.emit_abc(OpCode::Test, cond_reg, 0, 0, false, span.line);
                        let j = self.emit_jump(OpCode::Jmp, span.line);
                        self.free_to(self.nactvar);
                        Some(j)
                    }
                    None => None,
                };

                self.loops.push(LoopContext {
                    break_patches: Vec::new(),
                    continue_patches: Vec::new(),
                    scope_depth: self.scope_depth,
                });
                self.begin_scope();
                for stmt in body {
                    self.compile_stmt(stmt, strings)?;
                }
                self.end_scope(span.line);

                let increment_start = self.current_pc();
                let ctx = self.loops.pop().expect("loop context pushed above");
                for site in ctx.continue_patches {
                    self.patch_jump_to(site, increment_start, *span)?;
                }
                if let Some(incr) = increment {
                    self.compile_expr(incr, strings)?;
                    self.free_to(self.nactvar);
                }
                self.emit_jump_back(loop_start, span.line, *span)?;
                if let Some(exit_jump) = exit_jump {
                    self.patch_jump_here(exit_jump, *span)?;
                }
                for site in ctx.break_patches {
                    self.patch_jump_here(site, *span)?;
                }
                self.end_scope(span.line);
                Ok(())
            }
            Stmt::Break(span) => {
                if self.loops.is_empty() {
                    return Err(crate::error::CompileError::BreakOutsideLoop(*span));
                }
                let site = self.emit_jump(OpCode::Jmp, span.line);
                self.loops.last_mut().unwrap().break_patches.push(site);
                Ok(())
            }
            Stmt::Continue(span) => {
                if self.loops.is_empty() {
                    return Err(crate::error::CompileError::ContinueOutsideLoop(*span));
                }
                let site = self.emit_jump(OpCode::Jmp, span.line);
                self.loops.last_mut().unwrap().continue_patches.push(site);
                Ok(())
            }
            Stmt::Return { value, span } => {
                match value {
                    Some(expr) => {
                        let r = self.compile_expr(expr, strings)?;
                        self.emit_abc(OpCode::Return, r, 1, 0, false, span.line);
                    }
                    None => {
                        self.emit_abc(OpCode::Return, 0, 0, 0, false, span.line);
                    }
                }
                self.free_to(self.nactvar);
                Ok(())
            }
            Stmt::Function { name, params, body, span } => {
                self.compile_function_decl(name, params, body, *span, strings)
            }
        }
    }

    /// `let`/`const name = value`: compile the value straight into the
    /// register the new local will occupy, so no separate home register (and
    /// no MOVE) is needed for the common case.
    fn compile_binding(
        &mut self,
        name: String,
        value: &crate::ast::expr::Expr,
        is_const: bool,
        span: crate::span::Span,
        strings: &mut Strings,
    ) -> CompileResult<()> {
        let target = self.freereg.max(self.nactvar);
        self.compile_expr_into(value, target, strings)?;
        self.free_to(target);
        self.declare_local(name, is_const, span)?;
        Ok(())
    }

    /// Function declarations become locals everywhere except the true
    /// top level of the whole program (visible to the body itself via
    /// upvalue capture, enabling recursion); only a script-top-level
    /// declaration is installed as a global instead. Nested function
    /// bodies reset `scope_depth` to 0 just like the script does, so
    /// `enclosing.is_some()` is what actually distinguishes "inside some
    /// function" from "the program's own top level".
    fn compile_function_decl(
        &mut self,
        name: &str,
        params: &[String],
        body: &[Stmt],
        span: crate::span::Span,
        strings: &mut Strings,
    ) -> CompileResult<()> {
        if self.scope_depth > 0 || self.enclosing.is_some() {
            let reg = self.declare_local(name.to_string(), false, span)?;
            self.start_function(name.to_string(), params);
            for stmt in body {
                self.compile_stmt(stmt, strings)?;
            }
            let proto_idx = self.finish_function(span.line);
            let dest = self.reserve_reg();
            self.emit_abx(OpCode::Closure, dest, proto_idx, span.line);
            if dest != reg {
                self.emit_abc(OpCode::Move, reg, dest, 0, false, span.line);
            }
            self.free_to(self.nactvar);
        } else {
            self.start_function(name.to_string(), params);
            for stmt in body {
                self.compile_stmt(stmt, strings)?;
            }
            let proto_idx = self.finish_function(span.line);
            let dest = self.reserve_reg();
            self.emit_abx(OpCode::Closure, dest, proto_idx, span.line);
            let key = self.global_key_constant(name, span, strings)?;
            self.emit_abx(OpCode::SetGlobal, dest, key, span.line);
            self.free_to(self.nactvar);
        }
        Ok(())
    }
}
