//! The runtime value representation (§3.1): a small tagged union with
//! reference-counted heap variants for strings, arrays, and closures.
//!
//! Heap objects are `Rc`/`Rc<RefCell<_>>`, so reclamation is plain
//! reference counting rather than a tracing collector — see DESIGN.md for
//! why that's the chosen answer to the core spec's "implementer's choice"
//! on GC strategy. A closure that captures itself through a cyclic upvalue
//! chain will leak under this scheme; nothing in the test suite exercises
//! that shape.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::object::{XArray, XString};
use crate::vm::closure::Closure;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<XString>),
    Array(Rc<RefCell<XArray>>),
    Closure(Rc<Closure>),
}

impl Value {
    /// Only `null` and `false` are falsey (§3.1); everything else, including
    /// `0` and `0.0`, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Closure(_) => "function",
        }
    }

    pub fn as_array(&self) -> Option<&Rc<RefCell<XArray>>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&Rc<Closure>> {
        match self {
            Value::Closure(c) => Some(c),
            _ => None,
        }
    }

    /// Reference-identity equality for arrays and closures, value equality
    /// for scalars and interned strings (§3.1, §9: "keep reference
    /// semantics for arrays unless a compelling reason surfaces" — none did).
    pub fn values_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a.value == b.value,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::Str(s) => write!(f, "{}", s.value),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, elem) in a.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "]")
            }
            Value::Closure(_) => write!(f, "<function>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Shortest round-trip decimal rendering (§3.1), always with a decimal
/// point so `1.0` never prints as `1`.
fn format_float(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    let mut buf = ryu::Buffer::new();
    let printed = buf.format_finite(n);
    if printed.contains('.') || printed.contains('e') {
        printed.to_string()
    } else {
        format!("{printed}.0")
    }
}
