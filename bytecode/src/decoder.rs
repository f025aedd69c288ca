use std::fmt;

use crate::instruction::{MAX_OPERANDS, OPERAND_SIZE, read_operand};
use crate::op::Op;

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Byte address of the opcode.
    pub addr: usize,
    pub op: Op,
    operands: [i16; MAX_OPERANDS],
}

impl Instruction {
    /// The operands, as many as the opcode declares.
    pub fn operands(&self) -> &[i16] {
        &self.operands[..self.op.descriptor().operand_count()]
    }

    /// Address of the instruction that follows this one.
    pub fn next_addr(&self) -> usize {
        self.addr + self.op.size()
    }
}

/// Compact `mnemonic operand operand` form.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op.mnemonic())?;
        for operand in self.operands() {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A byte that is not a known opcode.
    InvalidOpcode { addr: usize, byte: u8 },
    /// The instruction's operands run past the end of the code.
    Truncated { addr: usize, op: Op },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidOpcode { addr, byte } => {
                write!(f, "no such instruction {byte} at address {addr}")
            }
            DecodeError::Truncated { addr, op } => {
                write!(f, "truncated {} at address {addr}", op.mnemonic())
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes a bytecode slice into [`Instruction`]s.
///
/// Unlike the compiler, the decoder makes no assumption about the input: a
/// bad opcode or a truncated operand yields one `Err` and ends iteration.
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            failed: false,
        }
    }

    /// Current byte offset in the stream.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.failed || self.pos >= self.bytes.len()
    }

    fn decode(&mut self) -> Result<Instruction, DecodeError> {
        let addr = self.pos;
        let byte = self.bytes[addr];
        let op = Op::try_from(byte)
            .map_err(|byte| DecodeError::InvalidOpcode { addr, byte })?;

        let mut operands = [0i16; MAX_OPERANDS];
        let mut at = addr + 1;
        for slot in operands.iter_mut().take(op.descriptor().operand_count()) {
            *slot = read_operand(self.bytes, at)
                .ok_or(DecodeError::Truncated { addr, op })?;
            at += OPERAND_SIZE;
        }

        self.pos = at;
        Ok(Instruction { addr, op, operands })
    }
}

impl Iterator for BytecodeDecoder<'_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_at_end() {
            return None;
        }
        let result = self.decode();
        self.failed = result.is_err();
        Some(result)
    }
}
