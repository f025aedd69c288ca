//! Template bytecode: the contract between the compiler and the interpreter.
//!
//! A compiled template is a flat byte array. Each instruction is a one-byte
//! [`Op`] followed by zero, one or two 2-byte signed little-endian operands;
//! the [`INSTRUCTIONS`] table says how many and of which [`OperandKind`].
//!
//! ```text
//!  ┌────┬─────────┬─────────┐
//!  │ op │ operand │ operand │   new #name nargs
//!  └────┴─────────┴─────────┘
//!   1 B    2 B LE    2 B LE
//! ```

mod builder;
mod decoder;
mod instruction;
mod op;
pub mod source_map;
mod string_table;

pub use builder::{Assembled, CompilationState, INITIAL_CODE_SIZE, OperandSlot};
pub use decoder::{BytecodeDecoder, DecodeError, Instruction};
pub use instruction::{
    INSTRUCTIONS, InstructionDescriptor, MAX_OPERANDS, OPERAND_SIZE, OperandKind,
    read_operand, write_operand,
};
pub use op::Op;
pub use source_map::SourceSpan;
pub use string_table::StringTable;
