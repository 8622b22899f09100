//! The register-based virtual machine (§4.5): fetch-decode-execute over
//! `Instruction`s, a flat register stack windowed per call frame, globals,
//! and the open/closed upvalue lifecycle (§4.4).

use std::cell::RefCell;
use std::cmp::Ordering;
use std::io::Write;
use std::rc::Rc;

use crate::error::{RuntimeError, TraceFrame, Traceback};
use crate::object::XArray;
use crate::table::Table;
use crate::value::Value;

use super::chunk::Proto;
use super::closure::{Closure, Upvalue};
use super::opcode::OpCode;

const FRAMES_MAX: usize = 64;
const STACK_MAX: usize = FRAMES_MAX * 256;

/// One activation record: which closure is running, where its registers
/// start in the flat stack, and its program counter.
struct CallFrame {
    closure: Rc<Closure>,
    pc: usize,
    base: usize,
}

/// The VM's execution state. Holds no globally shared mutable state of its
/// own — every field lives here, so running two `Vm`s concurrently (e.g. in
/// tests) needs no coordination.
pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table<Value>,
    open_upvalues: Vec<Rc<RefCell<Upvalue>>>,
    trace_execution: bool,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            trace_execution: false,
        }
    }

    pub fn with_trace_execution(mut self, enabled: bool) -> Self {
        self.trace_execution = enabled;
        self
    }

    /// Run a compiled top-level script to completion.
    pub fn execute(&mut self, proto: Rc<Proto>) -> Result<Value, Traceback> {
        let maxstack = proto.maxstacksize as usize;
        let closure = Rc::new(Closure::new(proto, Vec::new()));
        self.stack.resize(maxstack, Value::Null);
        self.frames.push(CallFrame { closure, pc: 0, base: 0 });
        self.run()
    }

    fn run(&mut self) -> Result<Value, Traceback> {
        loop {
            let frame_idx = self.frames.len() - 1;
            let proto = self.frames[frame_idx].closure.proto.clone();
            let base = self.frames[frame_idx].base;
            let pc = self.frames[frame_idx].pc;

            if pc >= proto.code.len() {
                return Ok(Value::Null);
            }
            let inst = proto.code[pc];
            self.frames[frame_idx].pc = pc + 1;

            if self.trace_execution {
                eprintln!("{}", super::disassembler::disassemble_instruction(&proto, pc));
            }

            match inst.opcode() {
                OpCode::LoadNil => self.set_reg(base, inst.a(), Value::Null),
                OpCode::LoadTrue => self.set_reg(base, inst.a(), Value::Bool(true)),
                OpCode::LoadFalse => self.set_reg(base, inst.a(), Value::Bool(false)),
                OpCode::LoadI => self.set_reg(base, inst.a(), Value::Int(inst.sbx() as i64)),
                OpCode::LoadF => self.set_reg(base, inst.a(), Value::Float(inst.sbx() as f64)),
                OpCode::LoadK => {
                    let k = proto.constants[inst.bx() as usize].clone();
                    self.set_reg(base, inst.a(), k);
                }
                OpCode::Move => {
                    let v = self.reg(base, inst.b()).clone();
                    self.set_reg(base, inst.a(), v);
                }

                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod => {
                    let lhs = self.reg(base, inst.b()).clone();
                    let rhs = self.reg(base, inst.c()).clone();
                    let result = self
                        .arith(inst.opcode(), &lhs, &rhs)
                        .map_err(|e| self.traceback(e))?;
                    self.set_reg(base, inst.a(), result);
                }
                OpCode::Unm => {
                    let v = self.reg(base, inst.b()).clone();
                    let result = match v {
                        Value::Int(n) => Value::Int(-n),
                        Value::Float(n) => Value::Float(-n),
                        other => {
                            return Err(self.traceback(RuntimeError::type_error(format!(
                                "cannot negate a {}",
                                other.type_name()
                            ))))
                        }
                    };
                    self.set_reg(base, inst.a(), result);
                }
                OpCode::Not => {
                    let v = self.reg(base, inst.b()).clone();
                    self.set_reg(base, inst.a(), Value::Bool(!v.is_truthy()));
                }

                OpCode::Eq => {
                    let lhs = self.reg(base, inst.a()).clone();
                    let rhs = self.reg(base, inst.b()).clone();
                    if lhs.values_equal(&rhs) != inst.k() {
                        self.frames[frame_idx].pc += 1;
                    }
                }
                OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge => {
                    let lhs = self.reg(base, inst.a()).clone();
                    let rhs = self.reg(base, inst.b()).clone();
                    let ordering = self.order(&lhs, &rhs).map_err(|e| self.traceback(e))?;
                    let result = match inst.opcode() {
                        OpCode::Lt => ordering == Ordering::Less,
                        OpCode::Le => ordering != Ordering::Greater,
                        OpCode::Gt => ordering == Ordering::Greater,
                        OpCode::Ge => ordering != Ordering::Less,
                        _ => unreachable!(),
                    };
                    if result != inst.k() {
                        self.frames[frame_idx].pc += 1;
                    }
                }

                OpCode::Jmp => {
                    let target = (self.frames[frame_idx].pc as i32 + inst.sj()) as usize;
                    self.frames[frame_idx].pc = target;
                }
                OpCode::Test => {
                    let v = self.reg(base, inst.a());
                    if !v.is_truthy() == inst.k() {
                        self.frames[frame_idx].pc += 1;
                    }
                }
                OpCode::TestSet => {
                    let v = self.reg(base, inst.b()).clone();
                    if !v.is_truthy() == inst.k() {
                        self.frames[frame_idx].pc += 1;
                    } else {
                        self.set_reg(base, inst.a(), v);
                    }
                }

                OpCode::Call => {
                    self.do_call(base, inst.a(), inst.b())
                        .map_err(|e| self.traceback(e))?;
                    continue;
                }
                OpCode::Return => {
                    let result = if inst.b() == 0 {
                        Value::Null
                    } else {
                        self.reg(base, inst.a()).clone()
                    };
                    self.close_upvalues_from(base);
                    let frame = self.frames.pop().expect("at least one frame");
                    if self.frames.is_empty() {
                        self.stack.truncate(frame.base);
                        return Ok(result);
                    }
                    let return_slot = frame.base - 1;
                    self.stack.truncate(return_slot + 1);
                    self.stack[return_slot] = result;
                    continue;
                }

                OpCode::Closure => {
                    let child = proto.protos[inst.bx() as usize].clone();
                    let mut upvalues = Vec::with_capacity(child.upvalues.len());
                    for info in &child.upvalues {
                        let uv = if info.is_local {
                            self.capture_upvalue(base + info.index as usize)
                        } else {
                            self.frames[frame_idx].closure.upvalues[info.index as usize].clone()
                        };
                        upvalues.push(uv);
                    }
                    self.set_reg(base, inst.a(), Value::Closure(Rc::new(Closure::new(child, upvalues))));
                }
                OpCode::GetUpval => {
                    let uv = self.frames[frame_idx].closure.upvalues[inst.b() as usize].clone();
                    let v = match &*uv.borrow() {
                        Upvalue::Open(addr) => self.stack[*addr].clone(),
                        Upvalue::Closed(v) => v.clone(),
                    };
                    self.set_reg(base, inst.a(), v);
                }
                OpCode::SetUpval => {
                    let v = self.reg(base, inst.a()).clone();
                    let uv = self.frames[frame_idx].closure.upvalues[inst.b() as usize].clone();
                    let mut uv = uv.borrow_mut();
                    match &mut *uv {
                        Upvalue::Open(addr) => self.stack[*addr] = v,
                        Upvalue::Closed(slot) => *slot = v,
                    }
                }
                OpCode::Close => {
                    self.close_upvalues_from(base + inst.a() as usize);
                }

                OpCode::GetGlobal => {
                    let key = self.global_key(&proto, inst.bx());
                    let v = self.globals.get(&key).cloned().unwrap_or(Value::Null);
                    self.set_reg(base, inst.a(), v);
                }
                OpCode::SetGlobal | OpCode::DefGlobal => {
                    let key = self.global_key(&proto, inst.bx());
                    let v = self.reg(base, inst.a()).clone();
                    self.globals.insert(key, v);
                }

                OpCode::NewTable => {
                    let arr = XArray::with_capacity(inst.bx() as usize);
                    self.set_reg(base, inst.a(), Value::Array(Rc::new(RefCell::new(arr))));
                }
                OpCode::GetI => {
                    let obj = self.reg(base, inst.b()).clone();
                    let idx = self.reg(base, inst.c()).clone();
                    let v = self.get_index(&obj, &idx).map_err(|e| self.traceback(e))?;
                    self.set_reg(base, inst.a(), v);
                }
                OpCode::SetI => {
                    let obj = self.reg(base, inst.a()).clone();
                    let idx = self.reg(base, inst.b()).clone();
                    let val = self.reg(base, inst.c()).clone();
                    self.set_index(&obj, &idx, val).map_err(|e| self.traceback(e))?;
                }
                OpCode::SetList => {
                    let array = self.reg(base, inst.a()).clone();
                    let Some(array) = array.as_array().cloned() else {
                        return Err(self.traceback(RuntimeError::type_error("SETLIST target is not an array")));
                    };
                    let count = inst.b();
                    for i in 1..=count {
                        let v = self.reg(base, inst.a() + i).clone();
                        array.borrow_mut().push(v);
                    }
                }

                OpCode::Print => {
                    let v = self.reg(base, inst.a()).clone();
                    println!("{v}");
                    // §4.5: print must flush before the next instruction executes, so
                    // output already written survives a later runtime error's process::exit.
                    let _ = std::io::stdout().flush();
                }
            }
        }
    }

    fn do_call(&mut self, base: usize, a: u8, nargs: u8) -> Result<(), RuntimeError> {
        let callee_reg = base + a as usize;
        let callee = self.stack[callee_reg].clone();
        let Value::Closure(closure) = callee else {
            return Err(RuntimeError::NotCallable);
        };
        let numparams = closure.proto.numparams as usize;
        if nargs as usize != numparams {
            return Err(RuntimeError::WrongArity {
                expected: numparams,
                got: nargs as usize,
            });
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        let new_base = callee_reg + 1;
        let needed = new_base + closure.proto.maxstacksize as usize;
        if needed > STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        if self.stack.len() < needed {
            self.stack.resize(needed, Value::Null);
        }
        self.frames.push(CallFrame { closure, pc: 0, base: new_base });
        Ok(())
    }

    // ===== Register access =====

    fn reg(&self, base: usize, idx: u8) -> &Value {
        &self.stack[base + idx as usize]
    }

    fn set_reg(&mut self, base: usize, idx: u8, value: Value) {
        self.stack[base + idx as usize] = value;
    }

    // ===== Arithmetic & comparison =====

    fn arith(&self, op: OpCode, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
        use Value::{Float, Int};
        if matches!(op, OpCode::Div) {
            let (a, b) = self.as_floats(lhs, rhs)?;
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            return Ok(Float(a / b));
        }
        match (lhs, rhs) {
            (Int(a), Int(b)) => match op {
                OpCode::Add => Ok(Int(a + b)),
                OpCode::Sub => Ok(Int(a - b)),
                OpCode::Mul => Ok(Int(a * b)),
                OpCode::Mod => {
                    if *b == 0 {
                        Err(RuntimeError::ModuloByZero)
                    } else {
                        Ok(Int(a % b))
                    }
                }
                _ => unreachable!(),
            },
            _ => {
                let (a, b) = self.as_floats(lhs, rhs)?;
                match op {
                    OpCode::Add => Ok(Float(a + b)),
                    OpCode::Sub => Ok(Float(a - b)),
                    OpCode::Mul => Ok(Float(a * b)),
                    OpCode::Mod => {
                        if b == 0.0 {
                            Err(RuntimeError::ModuloByZero)
                        } else {
                            Ok(Float(a % b))
                        }
                    }
                    _ => unreachable!(),
                }
            }
        }
    }

    fn as_floats(&self, lhs: &Value, rhs: &Value) -> Result<(f64, f64), RuntimeError> {
        let a = match lhs {
            Value::Int(n) => *n as f64,
            Value::Float(n) => *n,
            other => {
                return Err(RuntimeError::type_error(format!(
                    "expected a number, got {}",
                    other.type_name()
                )))
            }
        };
        let b = match rhs {
            Value::Int(n) => *n as f64,
            Value::Float(n) => *n,
            other => {
                return Err(RuntimeError::type_error(format!(
                    "expected a number, got {}",
                    other.type_name()
                )))
            }
        };
        Ok((a, b))
    }

    /// Ordering for `<`/`<=`/`>`/`>=`. Numbers compare numerically across
    /// Int/Float; strings compare byte-lexicographically (§9 open question:
    /// no locale-aware collation).
    fn order(&self, lhs: &Value, rhs: &Value) -> Result<Ordering, RuntimeError> {
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.value.as_bytes().cmp(b.value.as_bytes())),
            _ => {
                let (a, b) = self.as_floats(lhs, rhs)?;
                a.partial_cmp(&b).ok_or_else(|| RuntimeError::type_error("cannot order NaN"))
            }
        }
    }

    // ===== Arrays =====

    fn get_index(&self, obj: &Value, idx: &Value) -> Result<Value, RuntimeError> {
        let array = obj
            .as_array()
            .ok_or_else(|| RuntimeError::type_error(format!("cannot index a {}", obj.type_name())))?;
        let Value::Int(i) = idx else {
            return Err(RuntimeError::type_error(format!("array index must be an int, got {}", idx.type_name())));
        };
        let array = array.borrow();
        if *i < 0 || *i as usize >= array.len() {
            return Err(RuntimeError::IndexOutOfBounds {
                index: *i,
                length: array.len(),
            });
        }
        Ok(array.get(*i as usize).cloned().unwrap_or(Value::Null))
    }

    fn set_index(&self, obj: &Value, idx: &Value, value: Value) -> Result<(), RuntimeError> {
        let array = obj
            .as_array()
            .ok_or_else(|| RuntimeError::type_error(format!("cannot index a {}", obj.type_name())))?;
        let Value::Int(i) = idx else {
            return Err(RuntimeError::type_error(format!("array index must be an int, got {}", idx.type_name())));
        };
        if *i < 0 {
            return Err(RuntimeError::IndexOutOfBounds {
                index: *i,
                length: array.borrow().len(),
            });
        }
        array.borrow_mut().set(*i as usize, value);
        Ok(())
    }

    // ===== Globals =====

    fn global_key(&self, proto: &Proto, bx: u32) -> Rc<crate::object::XString> {
        match &proto.constants[bx as usize] {
            Value::Str(s) => s.clone(),
            _ => unreachable!("global key constant must be a string"),
        }
    }

    // ===== Upvalues (§4.4) =====

    /// Find or create the open upvalue for stack address `addr`. The list
    /// stays sorted by descending address so `close_upvalues_from` only
    /// walks the prefix that actually needs closing.
    fn capture_upvalue(&mut self, addr: usize) -> Rc<RefCell<Upvalue>> {
        for uv in &self.open_upvalues {
            if matches!(&*uv.borrow(), Upvalue::Open(a) if *a == addr) {
                return uv.clone();
            }
        }
        let uv = Rc::new(RefCell::new(Upvalue::Open(addr)));
        let pos = self
            .open_upvalues
            .iter()
            .position(|existing| matches!(&*existing.borrow(), Upvalue::Open(a) if *a < addr))
            .unwrap_or(self.open_upvalues.len());
        self.open_upvalues.insert(pos, uv.clone());
        uv
    }

    fn close_upvalues_from(&mut self, addr: usize) {
        while let Some(uv) = self.open_upvalues.first() {
            let should_close = matches!(&*uv.borrow(), Upvalue::Open(a) if *a >= addr);
            if !should_close {
                break;
            }
            let uv = self.open_upvalues.remove(0);
            let value = match &*uv.borrow() {
                Upvalue::Open(a) => self.stack[*a].clone(),
                Upvalue::Closed(_) => unreachable!(),
            };
            *uv.borrow_mut() = Upvalue::Closed(value);
        }
    }

    // ===== Errors =====

    fn traceback(&self, error: RuntimeError) -> Traceback {
        let frames = self
            .frames
            .iter()
            .rev()
            .map(|f| {
                let pc = f.pc.saturating_sub(1);
                let line = f.closure.proto.lineinfo.get(pc).copied().unwrap_or(0);
                TraceFrame {
                    line,
                    name: f.closure.proto.name.clone(),
                }
            })
            .collect();
        Traceback { error, frames }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::object::Strings;
    use crate::parser::Parser;

    fn eval(source: &str) -> Result<Value, Traceback> {
        let tokens = Scanner::new(source).scan_tokens().expect("lex error");
        let program = Parser::new(tokens).parse().expect("parse error");
        let mut strings = Strings::new();
        let proto = super::super::compile(&program, &mut strings).expect("compile error");
        Vm::new().execute(proto)
    }

    fn eval_int(source: &str) -> i64 {
        match eval(source).expect("runtime error") {
            Value::Int(n) => n,
            other => panic!("expected Int, got {other:?}"),
        }
    }

    #[test]
    fn arithmetic_and_ordering() {
        assert_eq!(eval_int("return 2 + 3 * 4;"), 14);
        assert_eq!(eval_int("return (2 + 3) * 4;"), 20);
        match eval("return 7 / 2;").unwrap() {
            Value::Float(f) => assert!((f - 3.5).abs() < 1e-9),
            other => panic!("expected Float, got {other:?}"),
        }
        assert!(matches!(eval("return 1 < 2;").unwrap(), Value::Bool(true)));
        assert!(matches!(eval("return \"ab\" < \"b\";").unwrap(), Value::Bool(true)));
        assert!(matches!(eval("return 1 == 1.0;").unwrap(), Value::Bool(true)));
    }

    #[test]
    fn division_and_modulo_by_zero_error() {
        assert!(matches!(
            eval("return 1 / 0;").unwrap_err().error,
            RuntimeError::DivisionByZero
        ));
        assert!(matches!(
            eval("return 1 % 0;").unwrap_err().error,
            RuntimeError::ModuloByZero
        ));
    }

    #[test]
    fn fibonacci_recursive() {
        let source = r#"
            function fib(n) {
                if (n <= 1) { return n; }
                return fib(n - 1) + fib(n - 2);
            }
            return fib(10);
        "#;
        assert_eq!(eval_int(source), 55);
    }

    #[test]
    fn counter_closure_keeps_private_state() {
        let source = r#"
            function makeCounter() {
                let count = 0;
                function increment() {
                    count = count + 1;
                    return count;
                }
                return increment;
            }
            let counter = makeCounter();
            counter();
            counter();
            return counter();
        "#;
        assert_eq!(eval_int(source), 3);
    }

    #[test]
    fn two_closures_share_one_upvalue() {
        let source = r#"
            function makePair() {
                let shared = 0;
                function set(n) { shared = n; }
                function get() { return shared; }
                set(41);
                return get() + 1;
            }
            return makePair();
        "#;
        assert_eq!(eval_int(source), 42);
    }

    #[test]
    fn array_mutation_through_function_parameter_is_visible_to_caller() {
        let source = r#"
            function zeroFirst(arr) {
                arr[0] = 0;
            }
            let xs = [1, 2, 3];
            zeroFirst(xs);
            return xs[0];
        "#;
        assert_eq!(eval_int(source), 0);
    }

    #[test]
    fn for_loop_skips_body_on_zero_iterations() {
        let source = r#"
            let ran = 0;
            for (let i = 0; i < 0; i = i + 1) {
                ran = 1;
            }
            return ran;
        "#;
        assert_eq!(eval_int(source), 0);
    }

    #[test]
    fn for_loop_continue_reaches_increment_not_body() {
        let source = r#"
            let sum = 0;
            for (let i = 0; i < 5; i = i + 1) {
                if (i == 2) { continue; }
                sum = sum + i;
            }
            return sum;
        "#;
        assert_eq!(eval_int(source), 8);
    }

    #[test]
    fn break_exits_loop_early() {
        let source = r#"
            let sum = 0;
            for (let i = 0; i < 100; i = i + 1) {
                if (i == 3) { break; }
                sum = sum + i;
            }
            return sum;
        "#;
        assert_eq!(eval_int(source), 3);
    }

    #[test]
    fn recursive_closure_factory_regression() {
        // A factory returning a recursive inner function must not crash or
        // capture a stale/self-referential upvalue.
        let source = r#"
            function makeFact() {
                function f(n) {
                    if (n <= 1) { return 1; }
                    return n * f(n - 1);
                }
                return f;
            }
            return makeFact()(5);
        "#;
        assert_eq!(eval_int(source), 120);
    }

    #[test]
    fn array_out_of_bounds_is_a_runtime_error() {
        let source = r#"
            let xs = [1, 2, 3];
            return xs[10];
        "#;
        assert!(matches!(
            eval(source).unwrap_err().error,
            RuntimeError::IndexOutOfBounds { index: 10, length: 3 }
        ));
    }

    #[test]
    fn wrong_arity_is_a_runtime_error() {
        let source = r#"
            function add(a, b) { return a + b; }
            return add(1);
        "#;
        assert!(matches!(
            eval(source).unwrap_err().error,
            RuntimeError::WrongArity { expected: 2, got: 1 }
        ));
    }
}
