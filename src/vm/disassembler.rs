//! Human-readable bytecode listings, decoupled from the VM's hot dispatch
//! loop — used by `--trace` execution and test fixtures, never consulted by
//! `run()` itself beyond the one trace print site.

use super::chunk::Proto;
use super::opcode::{Instruction, OpCode};

/// Disassemble a prototype and, recursively, every nested function it owns.
pub fn disassemble(proto: &Proto) -> String {
    let mut out = String::new();
    disassemble_into(proto, &mut out);
    out
}

fn disassemble_into(proto: &Proto, out: &mut String) {
    out.push_str(&format!(
        "== {} (params={}, upvalues={}) ==\n",
        proto.name_or_anonymous(),
        proto.numparams,
        proto.upvalues.len()
    ));
    for offset in 0..proto.code.len() {
        out.push_str(&disassemble_instruction(proto, offset));
        out.push('\n');
    }
    for child in &proto.protos {
        out.push('\n');
        disassemble_into(child, out);
    }
}

/// One instruction's listing: offset, source line (or `|` when unchanged
/// from the previous instruction), mnemonic, and decoded operands.
pub fn disassemble_instruction(proto: &Proto, offset: usize) -> String {
    let inst = proto.code[offset];
    let line = proto.lineinfo.get(offset).copied().unwrap_or(0);
    let line_str = if offset > 0 && proto.lineinfo.get(offset - 1).copied() == Some(line) {
        "   |".to_string()
    } else {
        format!("{line:4}")
    };
    format!("{offset:04} {line_str} {}", format_operands(proto, inst))
}

fn format_operands(proto: &Proto, inst: Instruction) -> String {
    let op = inst.opcode();
    let mnemonic = op.mnemonic();
    match op {
        OpCode::LoadNil | OpCode::LoadTrue | OpCode::LoadFalse => {
            format!("{mnemonic:<10} R{}", inst.a())
        }
        OpCode::LoadI | OpCode::LoadF => {
            format!("{mnemonic:<10} R{} {}", inst.a(), inst.sbx())
        }
        OpCode::LoadK => format!(
            "{mnemonic:<10} R{} K{} ({})",
            inst.a(),
            inst.bx(),
            proto
                .constants
                .get(inst.bx() as usize)
                .map(|v| v.to_string())
                .unwrap_or_default()
        ),
        OpCode::Move | OpCode::Unm | OpCode::Not | OpCode::GetUpval | OpCode::SetUpval => {
            format!("{mnemonic:<10} R{} R{}", inst.a(), inst.b())
        }
        OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod | OpCode::GetI => {
            format!("{mnemonic:<10} R{} R{} R{}", inst.a(), inst.b(), inst.c())
        }
        OpCode::SetI => format!("{mnemonic:<10} R{} R{} R{}", inst.a(), inst.b(), inst.c()),
        OpCode::Eq | OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge => {
            format!("{mnemonic:<10} R{} R{} k={}", inst.a(), inst.b(), inst.k())
        }
        OpCode::Jmp => format!("{mnemonic:<10} {:+}", inst.sj()),
        OpCode::Test => format!("{mnemonic:<10} R{} k={}", inst.a(), inst.k()),
        OpCode::TestSet => format!("{mnemonic:<10} R{} R{} k={}", inst.a(), inst.b(), inst.k()),
        OpCode::Call => format!("{mnemonic:<10} R{} nargs={}", inst.a(), inst.b()),
        OpCode::Return => format!("{mnemonic:<10} R{} b={}", inst.a(), inst.b()),
        OpCode::Closure => format!("{mnemonic:<10} R{} proto#{}", inst.a(), inst.bx()),
        OpCode::Close => format!("{mnemonic:<10} R{}", inst.a()),
        OpCode::GetGlobal | OpCode::SetGlobal | OpCode::DefGlobal => format!(
            "{mnemonic:<10} R{} K{} ({})",
            inst.a(),
            inst.bx(),
            proto
                .constants
                .get(inst.bx() as usize)
                .map(|v| v.to_string())
                .unwrap_or_default()
        ),
        OpCode::NewTable => format!("{mnemonic:<10} R{} cap={}", inst.a(), inst.bx()),
        OpCode::SetList => format!("{mnemonic:<10} R{} count={}", inst.a(), inst.b()),
        OpCode::Print => format!("{mnemonic:<10} R{}", inst.a()),
    }
}
