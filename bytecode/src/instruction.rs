use crate::op::Op;

/// Width of every operand in bytes.
pub const OPERAND_SIZE: usize = 2;

/// Largest operand count of any instruction.
pub const MAX_OPERANDS: usize = 2;

/// How an operand is interpreted by the interpreter and the disassembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Index into the template's string pool.
    StringPoolRef,
    /// A plain integer: argument count, option ordinal, local slot.
    IntLiteral,
    /// An absolute byte address within the same template.
    CodeAddress,
}

/// Static description of one opcode.
#[derive(Debug)]
pub struct InstructionDescriptor {
    pub op: Op,
    pub mnemonic: &'static str,
    pub operands: &'static [OperandKind],
}

impl InstructionDescriptor {
    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Encoded size in bytes, opcode included.
    pub fn size(&self) -> usize {
        1 + self.operands.len() * OPERAND_SIZE
    }
}

use OperandKind::{CodeAddress as Addr, IntLiteral as Int, StringPoolRef as Str};

const fn desc(
    op: Op,
    mnemonic: &'static str,
    operands: &'static [OperandKind],
) -> InstructionDescriptor {
    InstructionDescriptor {
        op,
        mnemonic,
        operands,
    }
}

/// One entry per opcode, indexed by `opcode - 1`.
///
/// Shared by the code generator and the disassembler; any new opcode needs
/// an entry here in the same position as its discriminant.
pub static INSTRUCTIONS: [InstructionDescriptor; Op::COUNT] = [
    desc(Op::LoadStr, "load_str", &[Str]),
    desc(Op::LoadAttr, "load_attr", &[Str]),
    desc(Op::LoadLocal, "load_local", &[Int]),
    desc(Op::LoadProp, "load_prop", &[Str]),
    desc(Op::LoadPropInd, "load_prop_ind", &[]),
    desc(Op::StoreOption, "store_option", &[Int]),
    desc(Op::StoreArg, "store_arg", &[Str]),
    desc(Op::New, "new", &[Str, Int]),
    desc(Op::NewInd, "new_ind", &[Int]),
    desc(Op::NewBoxArgs, "new_box_args", &[Str]),
    desc(Op::SuperNew, "super_new", &[Str, Int]),
    desc(Op::SuperNewBoxArgs, "super_new_box_args", &[Str]),
    desc(Op::Write, "write", &[]),
    desc(Op::WriteOpt, "write_opt", &[]),
    desc(Op::Map, "map", &[]),
    desc(Op::RotMap, "rot_map", &[Int]),
    desc(Op::ZipMap, "zip_map", &[Int]),
    desc(Op::Br, "br", &[Addr]),
    desc(Op::Brf, "brf", &[Addr]),
    desc(Op::Options, "options", &[]),
    desc(Op::Args, "args", &[]),
    desc(Op::Passthru, "passthru", &[Str]),
    desc(Op::List, "list", &[]),
    desc(Op::Add, "add", &[]),
    desc(Op::ToStr, "tostr", &[]),
    desc(Op::First, "first", &[]),
    desc(Op::Last, "last", &[]),
    desc(Op::Rest, "rest", &[]),
    desc(Op::Trunc, "trunc", &[]),
    desc(Op::Strip, "strip", &[]),
    desc(Op::Trim, "trim", &[]),
    desc(Op::Length, "length", &[]),
    desc(Op::StrLen, "strlen", &[]),
    desc(Op::Reverse, "reverse", &[]),
    desc(Op::Not, "not", &[]),
    desc(Op::Or, "or", &[]),
    desc(Op::And, "and", &[]),
    desc(Op::Indent, "indent", &[Str]),
    desc(Op::Dedent, "dedent", &[]),
    desc(Op::Newline, "newline", &[]),
    desc(Op::Noop, "noop", &[]),
    desc(Op::Pop, "pop", &[]),
    desc(Op::Null, "null", &[]),
    desc(Op::True, "true", &[]),
    desc(Op::False, "false", &[]),
    desc(Op::WriteStr, "write_str", &[Str]),
    desc(Op::WriteLocal, "write_local", &[Int]),
];

// ── operand encoding ───────────────────────────────────────────────

/// Read the operand starting at `addr`, or `None` past the end of `code`.
pub fn read_operand(code: &[u8], addr: usize) -> Option<i16> {
    let bytes = code.get(addr..addr + OPERAND_SIZE)?;
    Some(i16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Overwrite the operand starting at `addr`.
///
/// The caller guarantees `addr..addr + OPERAND_SIZE` lies inside `code`.
pub fn write_operand(code: &mut [u8], addr: usize, value: i16) {
    code[addr..addr + OPERAND_SIZE].copy_from_slice(&value.to_le_bytes());
}
