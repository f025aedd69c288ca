/// Template bytecode opcodes.
///
/// Every opcode is a single byte. Operands follow the opcode directly and
/// are always [`OPERAND_SIZE`](crate::OPERAND_SIZE) bytes wide (signed,
/// little-endian). The number and kind of operands is fixed per opcode and
/// recorded in the [`INSTRUCTIONS`](crate::INSTRUCTIONS) table; there is no
/// per-instruction length prefix.
///
/// Discriminants start at 1 so that a zeroed buffer never decodes as a
/// valid instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// Push a string constant.
    /// Operands: `str:pool`
    LoadStr = 1,

    /// Push an attribute looked up by name at run time.
    /// Operands: `name:pool`
    LoadAttr,

    /// Push a formal argument by slot.
    /// Operands: `index:int`
    LoadLocal,

    /// Pop an object, push one of its properties.
    /// Operands: `name:pool`
    LoadProp,

    /// Pop a property name and an object, push the property.
    LoadPropInd,

    /// Pop a value into the current option frame.
    /// Operands: `option:int`
    StoreOption,

    /// Pop a value into the current named-argument frame.
    /// Operands: `name:pool`
    StoreArg,

    /// Instantiate a template with positional arguments from the stack.
    /// Operands: `name:pool`, `nargs:int`
    New,

    /// Instantiate a template whose name is on the stack.
    /// Operands: `nargs:int`
    NewInd,

    /// Instantiate a template with the current named-argument frame.
    /// Operands: `name:pool`
    NewBoxArgs,

    /// Instantiate the overridden version of a template.
    /// Operands: `name:pool`, `nargs:int`
    SuperNew,

    /// Instantiate the overridden version of a template with named arguments.
    /// Operands: `name:pool`
    SuperNewBoxArgs,

    /// Pop a value and write it to the output.
    Write,

    /// Pop an option frame and a value, write the value with those options.
    WriteOpt,

    /// Apply a template to every element of a list.
    Map,

    /// Apply templates round-robin to the elements of a list.
    /// Operands: `ntemplates:int`
    RotMap,

    /// Apply a template to several lists in parallel.
    /// Operands: `nlists:int`
    ZipMap,

    /// Unconditional branch.
    /// Operands: `target:addr`
    Br,

    /// Pop a value, branch when it is false.
    /// Operands: `target:addr`
    Brf,

    /// Push a fresh option frame.
    Options,

    /// Push a fresh named-argument frame.
    Args,

    /// Pass the caller's arguments through to the named template.
    /// Operands: `name:pool`
    Passthru,

    List,
    Add,
    ToStr,

    First,
    Last,
    Rest,
    Trunc,
    Strip,
    Trim,
    Length,
    StrLen,
    Reverse,

    Not,
    Or,
    And,

    /// Push an indentation level onto the writer.
    /// Operands: `indent:pool`
    Indent,

    /// Pop an indentation level.
    Dedent,

    Newline,
    Noop,
    Pop,
    Null,
    True,
    False,

    /// Write a string constant.
    /// Operands: `str:pool`
    WriteStr,

    /// Write a formal argument by slot.
    /// Operands: `index:int`
    WriteLocal,
}

impl Op {
    /// Number of opcodes.
    pub const COUNT: usize = Op::WriteLocal as usize;

    /// The descriptor for this opcode.
    pub fn descriptor(self) -> &'static crate::InstructionDescriptor {
        &crate::INSTRUCTIONS[self as usize - 1]
    }

    /// Lower-case mnemonic used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        self.descriptor().mnemonic
    }

    /// Encoded size in bytes, opcode included.
    pub fn size(self) -> usize {
        self.descriptor().size()
    }
}

impl TryFrom<u8> for Op {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        usize::from(byte)
            .checked_sub(1)
            .and_then(|i| crate::INSTRUCTIONS.get(i))
            .map(|desc| desc.op)
            .ok_or(byte)
    }
}
