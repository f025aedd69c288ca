use log::{trace, warn};

use crate::instruction::{OPERAND_SIZE, write_operand};
use crate::op::Op;
use crate::source_map::SourceSpan;
use crate::string_table::StringTable;

/// Initial size of the code buffer, in bytes.
pub const INITIAL_CODE_SIZE: usize = 15;

/// A forward reference to an operand whose value is not yet known.
///
/// Returned by [`CompilationState::emit_branch`]; resolve it with
/// [`CompilationState::patch`].
#[derive(Debug)]
#[must_use = "an unpatched branch jumps to -1"]
pub struct OperandSlot {
    /// Address of the operand bytes in the buffer.
    addr: usize,
}

impl OperandSlot {
    pub fn addr(&self) -> usize {
        self.addr
    }
}

/// The finished output of one [`CompilationState`].
#[derive(Debug, Clone)]
pub struct Assembled {
    /// The code buffer; may be longer than `code_size`.
    pub code: Vec<u8>,
    pub code_size: usize,
    pub strings: Vec<String>,
    /// Parallel to `code`.
    pub source_map: Vec<Option<SourceSpan>>,
}

/// In-progress bytecode for a single template.
///
/// This is the only place the code buffer is written. The buffer and the
/// source map always have the same length and double together whenever the
/// next instruction would not fit.
#[derive(Debug)]
pub struct CompilationState {
    code: Vec<u8>,
    source_map: Vec<Option<SourceSpan>>,
    ip: usize,
    strings: StringTable,
    /// First operand that did not fit in the encoding.
    overflow: Option<i32>,
}

impl CompilationState {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CODE_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            code: vec![0; capacity],
            source_map: vec![None; capacity],
            ip: 0,
            strings: StringTable::new(),
            overflow: None,
        }
    }

    /// Next write address, also the current program length.
    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn capacity(&self) -> usize {
        self.code.len()
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// The first operand value that had to be truncated, if any.
    ///
    /// Once set the code is no longer faithful; the caller reports it.
    pub fn overflow(&self) -> Option<i32> {
        self.overflow
    }

    pub fn intern(&mut self, s: &str) -> usize {
        self.strings.intern(s)
    }

    /// Attach `span` to the instruction about to be emitted at `ip`.
    ///
    /// `None` leaves the slot empty.
    pub fn record_source_span(&mut self, span: Option<SourceSpan>) {
        self.ensure_capacity(1);
        self.source_map[self.ip] = span;
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn ensure_capacity(&mut self, n: usize) {
        while self.ip + n >= self.code.len() {
            let new_len = self.code.len() * 2;
            trace!("growing code buffer {} -> {new_len}", self.code.len());
            self.code.resize(new_len, 0);
            self.source_map.resize(new_len, None);
        }
    }

    fn put_op(&mut self, op: Op) {
        self.code[self.ip] = op as u8;
        self.ip += 1;
    }

    fn put_operand(&mut self, value: i32) {
        let operand = self.narrow(value);
        write_operand(&mut self.code, self.ip, operand);
        self.ip += OPERAND_SIZE;
    }

    /// Narrow to the 2-byte operand encoding, remembering the first value
    /// that does not fit.
    fn narrow(&mut self, value: i32) -> i16 {
        i16::try_from(value).unwrap_or_else(|_| {
            warn!("operand {value} does not fit in {OPERAND_SIZE} bytes; truncating");
            self.overflow.get_or_insert(value);
            value as i16
        })
    }

    fn expect_operands(op: Op, n: usize) {
        debug_assert_eq!(
            op.descriptor().operand_count(),
            n,
            "{} emitted with wrong operand count",
            op.mnemonic()
        );
    }

    pub fn emit(&mut self, op: Op) {
        Self::expect_operands(op, 0);
        self.ensure_capacity(1);
        self.put_op(op);
    }

    pub fn emit_with_int_operand(&mut self, op: Op, operand: i32) {
        Self::expect_operands(op, 1);
        self.ensure_capacity(1 + OPERAND_SIZE);
        self.put_op(op);
        self.put_operand(operand);
    }

    pub fn emit_with_two_operands(&mut self, op: Op, a: i32, b: i32) {
        Self::expect_operands(op, 2);
        self.ensure_capacity(1 + 2 * OPERAND_SIZE);
        self.put_op(op);
        self.put_operand(a);
        self.put_operand(b);
    }

    /// Intern `s` and emit its pool index as the operand.
    pub fn emit_with_string_operand(&mut self, op: Op, s: &str) {
        let index = self.pool_operand(s);
        self.emit_with_int_operand(op, index);
    }

    /// `op <pool(s)> <n>`, for the two-operand instantiation opcodes.
    pub fn emit_with_string_and_int(&mut self, op: Op, s: &str, n: i32) {
        let index = self.pool_operand(s);
        self.emit_with_two_operands(op, index, n);
    }

    fn pool_operand(&mut self, s: &str) -> i32 {
        i32::try_from(self.strings.intern(s)).unwrap_or(i32::MAX)
    }

    /// Emit a branch with a placeholder target.
    pub fn emit_branch(&mut self, op: Op) -> OperandSlot {
        let addr = self.ip + 1;
        self.emit_with_int_operand(op, -1);
        OperandSlot { addr }
    }

    /// Resolve a placeholder to `target`.
    pub fn patch(&mut self, slot: OperandSlot, target: usize) {
        let target = i32::try_from(target).unwrap_or(i32::MAX);
        self.write_operand_at(slot.addr, target);
    }

    /// Overwrite a previously emitted operand.
    pub fn write_operand_at(&mut self, addr: usize, value: i32) {
        debug_assert!(addr + OPERAND_SIZE <= self.ip, "patch past ip");
        let operand = self.narrow(value);
        write_operand(&mut self.code, addr, operand);
    }

    /// `indent <pool(text)>`
    pub fn indent(&mut self, text: &str) {
        self.emit_with_string_operand(Op::Indent, text);
    }

    pub fn dedent(&mut self) {
        self.emit(Op::Dedent);
    }

    pub fn finish(self) -> Assembled {
        Assembled {
            code: self.code,
            code_size: self.ip,
            strings: self.strings.into_vec(),
            source_map: self.source_map,
        }
    }
}

impl Default for CompilationState {
    fn default() -> Self {
        Self::new()
    }
}
