//! Text renderings of a [`CompiledTemplate`], for debugging and tests.

use std::fmt::Write;

use bytecode::{BytecodeDecoder, Instruction, OperandKind};

use crate::template::CompiledTemplate;

/// Width of the mnemonic column in [`Disassembler::disassemble`].
const MNEMONIC_WIDTH: usize = 14;

/// Make newlines, carriage returns and tabs visible.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

pub struct Disassembler<'a> {
    template: &'a CompiledTemplate,
}

impl<'a> Disassembler<'a> {
    pub fn new(template: &'a CompiledTemplate) -> Self {
        Self { template }
    }

    fn decode(&self) -> BytecodeDecoder<'a> {
        BytecodeDecoder::new(self.template.code())
    }

    /// `write_str 0, load_attr 1, write`
    pub fn instrs(&self) -> String {
        let mut buf = String::new();
        for (i, decoded) in self.decode().enumerate() {
            if i > 0 {
                buf.push_str(", ");
            }
            match decoded {
                Ok(instr) => {
                    let _ = write!(buf, "{instr}");
                }
                Err(err) => {
                    let _ = write!(buf, "<{err}>");
                }
            }
        }
        buf
    }

    /// One line per instruction:
    ///
    /// ```text
    /// 0000:	write_str     #0:"hi "
    /// 0003:	load_attr     #1:"name"
    /// 0006:	write
    /// ```
    pub fn disassemble(&self) -> String {
        let mut buf = String::new();
        for decoded in self.decode() {
            match decoded {
                Ok(instr) => self.disassemble_instruction(&mut buf, &instr),
                Err(err) => {
                    let _ = write!(buf, "{err}");
                }
            }
            buf.push('\n');
        }
        buf
    }

    pub fn disassemble_instruction(&self, buf: &mut String, instr: &Instruction) {
        let descriptor = instr.op.descriptor();
        let _ = write!(
            buf,
            "{:04}:\t{:<width$}",
            instr.addr,
            descriptor.mnemonic,
            width = MNEMONIC_WIDTH
        );
        if descriptor.operands.is_empty() {
            buf.push_str("  ");
            return;
        }
        for (i, (kind, &operand)) in descriptor.operands.iter().zip(instr.operands()).enumerate() {
            if i > 0 {
                buf.push_str(", ");
            }
            match kind {
                OperandKind::StringPoolRef => buf.push_str(&self.pool_operand(operand)),
                OperandKind::IntLiteral | OperandKind::CodeAddress => {
                    let _ = write!(buf, "{operand}");
                }
            }
        }
    }

    fn pool_operand(&self, index: i16) -> String {
        let entry = usize::try_from(index)
            .ok()
            .and_then(|i| self.template.strings.get(i));
        match entry {
            Some(s) => format!("#{index}:\"{}\"", escape(s)),
            None => format!("#{index}:<bad string index>"),
        }
    }

    /// `0000: "hi "` per pool entry.
    pub fn strings(&self) -> String {
        let mut buf = String::new();
        for (addr, s) in self.template.strings.iter().enumerate() {
            let _ = writeln!(buf, "{addr:04}: \"{}\"", escape(s));
        }
        buf
    }

    /// `0003: 4..10	"<name>"` per mapped address.
    pub fn source_map(&self) -> String {
        let mut buf = String::new();
        let text = &self.template.template;
        for (addr, span) in self.template.source_map.iter().enumerate() {
            if let Some(span) = span {
                let _ = writeln!(buf, "{addr:04}: {span}\t\"{}\"", span.slice(text));
            }
        }
        buf
    }
}
