//! Template compiler: text in, [`CompiledTemplate`] out.
//!
//! ```text
//!   text ──▶ Lexer ──▶ Parser ──▶ CodeGenerator ──▶ CompiledTemplate
//!                                       │                 │
//!                               CompilationState      Disassembler
//! ```
//!
//! Diagnostics never abort a compile; they go to the compiler's error
//! listener and the template is still produced.
//!
//! ```
//! use compiler::Compiler;
//!
//! let template = Compiler::default().compile("hi <name>").unwrap();
//! assert_eq!(template.instrs(), "write_str 0, load_attr 1, write");
//! ```

mod codegen;
mod compiler;
mod disasm;
mod names;
mod template;

pub use codegen::CodeGenerator;
pub use compiler::{
    CompileError, Compiler, CompilerSettings, DEFAULT_TEMPLATE_NAME, IMPLICIT_ATTRIBUTES,
    TemplateOption, function_op,
};
pub use disasm::{Disassembler, escape};
pub use names::{
    NameAllocator, SUBTEMPLATE_PREFIX, is_subtemplate_name, mangled_region_name, prefix_of,
    unmangled_template_name,
};
pub use template::{CompiledTemplate, DefaultValue, FormalArgument, RegionKind};
