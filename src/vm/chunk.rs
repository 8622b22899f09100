//! Function prototypes (§3.4): the immutable, shareable compiled form of a
//! function or top-level script.

use crate::value::Value;

use super::closure::UpvalInfo;
use super::opcode::Instruction;

/// An immutable compiled function template. May be referenced by many
/// concurrent `Closure`s that each hold a different resolved-upvalue set.
#[derive(Debug)]
pub struct Proto {
    pub name: Option<String>,
    pub numparams: u8,
    pub maxstacksize: u8,
    pub code: Vec<Instruction>,
    pub lineinfo: Vec<u32>,
    pub constants: Vec<Value>,
    pub protos: Vec<std::rc::Rc<Proto>>,
    pub upvalues: Vec<UpvalInfo>,
}

impl Proto {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            numparams: 0,
            maxstacksize: 0,
            code: Vec::new(),
            lineinfo: Vec::new(),
            constants: Vec::new(),
            protos: Vec::new(),
            upvalues: Vec::new(),
        }
    }

    pub fn name_or_anonymous(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }

    pub fn is_script(&self) -> bool {
        self.name.is_none()
    }
}
