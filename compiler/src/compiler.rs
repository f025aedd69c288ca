use std::sync::Arc;

use bytecode::{INITIAL_CODE_SIZE, Op};
use log::debug;
use parser::{
    DEFAULT_START_DELIMITER, DEFAULT_STOP_DELIMITER, ErrorListener, ErrorManager, Lexer, Parser,
    SyntaxError, Token, TokenKind,
};
use thiserror::Error;

use crate::codegen::CodeGenerator;
use crate::names::{self, NameAllocator};
use crate::template::{CompiledTemplate, DefaultValue, FormalArgument, RegionKind};

/// Name given to templates compiled without one.
pub const DEFAULT_TEMPLATE_NAME: &str = "anonymous";

/// Attributes every anonymous subtemplate defines: the 1-based and 0-based
/// iteration index.
pub const IMPLICIT_ATTRIBUTES: [&str; 2] = ["i", "i0"];

// ═══════════════════════════════════════════════════════════════════
// Options and functions
// ═══════════════════════════════════════════════════════════════════

/// An expression option, `<x; separator=", ">`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TemplateOption {
    Anchor = 0,
    Format = 1,
    Null = 2,
    Separator = 3,
    Wrap = 4,
}

impl TemplateOption {
    pub const ALL: [TemplateOption; 5] = [
        TemplateOption::Anchor,
        TemplateOption::Format,
        TemplateOption::Null,
        TemplateOption::Separator,
        TemplateOption::Wrap,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|option| option.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            TemplateOption::Anchor => "anchor",
            TemplateOption::Format => "format",
            TemplateOption::Null => "null",
            TemplateOption::Separator => "separator",
            TemplateOption::Wrap => "wrap",
        }
    }

    /// Operand of `store_option`.
    pub fn ordinal(self) -> i32 {
        self as i32
    }

    /// Value used when the option is given without `=value`.
    pub fn default_value(self) -> Option<&'static str> {
        match self {
            TemplateOption::Anchor => Some("true"),
            TemplateOption::Wrap => Some("\n"),
            _ => None,
        }
    }
}

/// Opcode of a built-in function.
pub fn function_op(name: &str) -> Option<Op> {
    let op = match name {
        "first" => Op::First,
        "last" => Op::Last,
        "rest" => Op::Rest,
        "trunc" => Op::Trunc,
        "strip" => Op::Strip,
        "trim" => Op::Trim,
        "length" => Op::Length,
        "strlen" => Op::StrLen,
        "reverse" => Op::Reverse,
        _ => return None,
    };
    Some(op)
}

// ═══════════════════════════════════════════════════════════════════
// Compiler
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum CompileError {
    /// The parser gave up before producing a tree.
    #[error("cannot compile template {template}: {source}")]
    Aborted {
        template: String,
        source: SyntaxError,
    },
    #[error("unsupported default value {token} for argument {arg}")]
    UnsupportedDefaultValue { arg: String, token: TokenKind },
}

#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub delimiter_start: char,
    pub delimiter_stop: char,
    /// Starting size of each template's code buffer, in bytes.
    pub initial_code_size: usize,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            delimiter_start: DEFAULT_START_DELIMITER,
            delimiter_stop: DEFAULT_STOP_DELIMITER,
            initial_code_size: INITIAL_CODE_SIZE,
        }
    }
}

/// Compiles template text to [`CompiledTemplate`]s.
///
/// Diagnostics go to the error listener; only a parse the parser could not
/// recover from is returned as an `Err`.
#[derive(Debug)]
pub struct Compiler {
    settings: CompilerSettings,
    errors: ErrorManager,
    names: Arc<NameAllocator>,
}

impl Compiler {
    /// A compiler that logs its diagnostics.
    pub fn new(settings: CompilerSettings) -> Self {
        Self {
            settings,
            errors: ErrorManager::default(),
            names: Arc::new(NameAllocator::new()),
        }
    }

    pub fn with_listener(settings: CompilerSettings, listener: Arc<dyn ErrorListener>) -> Self {
        Self {
            errors: ErrorManager::new(listener),
            ..Self::new(settings)
        }
    }

    /// Share subtemplate numbering with other compilers.
    pub fn with_name_allocator(mut self, names: Arc<NameAllocator>) -> Self {
        self.names = names;
        self
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    pub fn errors(&self) -> &ErrorManager {
        &self.errors
    }

    pub fn names(&self) -> &NameAllocator {
        &self.names
    }

    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        self.lexer(text, None).tokenize()
    }

    fn lexer(&self, text: &str, name: Option<&str>) -> Lexer {
        let lexer = Lexer::new(text, self.errors.clone())
            .with_delimiters(self.settings.delimiter_start, self.settings.delimiter_stop);
        match name {
            Some(name) => lexer.with_source_name(name),
            None => lexer,
        }
    }

    pub fn compile(&self, text: &str) -> Result<CompiledTemplate, CompileError> {
        self.compile_named(DEFAULT_TEMPLATE_NAME, text)
    }

    /// Compile a template whose arguments are not declared.
    pub fn compile_named(&self, name: &str, text: &str) -> Result<CompiledTemplate, CompileError> {
        let mut template = self.compile_template(name, None, text)?;
        template.has_formal_args = false;
        Ok(template)
    }

    /// Compile a template with declared arguments; references to them
    /// become `load_local`.
    pub fn compile_with_args(
        &self,
        name: &str,
        args: Vec<FormalArgument>,
        text: &str,
    ) -> Result<CompiledTemplate, CompileError> {
        self.compile_template(name, Some(args), text)
    }

    /// Compile a region defined outside its enclosing template.
    pub fn compile_region(
        &self,
        enclosing: &str,
        region: &str,
        text: &str,
    ) -> Result<CompiledTemplate, CompileError> {
        let name = names::mangled_region_name(enclosing, region);
        let mut template = self.compile_template(&name, None, text)?;
        template.is_region = true;
        template.region_kind = RegionKind::Explicit;
        Ok(template)
    }

    fn compile_template(
        &self,
        name: &str,
        args: Option<Vec<FormalArgument>>,
        text: &str,
    ) -> Result<CompiledTemplate, CompileError> {
        let tokens = self.lexer(text, Some(name)).tokenize();
        let mut parser = Parser::new(&tokens, self.errors.clone()).with_source_name(name);
        let ast = parser
            .template_and_eof()
            .map_err(|source| CompileError::Aborted {
                template: name.to_owned(),
                source,
            })?;

        if parser.syntax_errors() > 0 {
            debug!(
                "{name}: {} syntax error(s), skipping code generation",
                parser.syntax_errors()
            );
            let mut stub = CompiledTemplate::new(name);
            stub.prefix = names::prefix_of(name);
            stub.template = Arc::from(text);
            stub.define_formal_args(args);
            return Ok(stub);
        }

        let generator = CodeGenerator::new(self, &tokens, Arc::from(text), name, args);
        Ok(generator.generate(&ast))
    }

    /// Resolve the default value of every formal argument that has one.
    ///
    /// `{...}` defaults compile to a nested template named
    /// `<arg>_default_value`, which is also registered with `template`.
    /// The count of defaulted arguments is set before any is resolved, so it
    /// holds even when one of them fails.
    pub fn define_arg_default_values(
        &self,
        template: &mut CompiledTemplate,
    ) -> Result<(), CompileError> {
        let Some(args) = template.formal_arguments.as_ref() else {
            return Ok(());
        };
        let sources: Vec<(usize, Token)> = args
            .iter()
            .enumerate()
            .filter_map(|(index, arg)| Some((index, arg.default_value_source.clone()?)))
            .collect();
        template.number_of_args_with_default_values = sources.len();

        for (index, token) in sources {
            let Some(arg) = template
                .formal_arguments
                .as_mut()
                .and_then(|args| args.get_mut(index))
            else {
                continue;
            };
            match token.kind {
                TokenKind::LCurly => {
                    let name = format!("{}_default_value", arg.name);
                    let compiled = self.compile_named(&name, strip_braces(&token.text))?;
                    arg.compiled_default_value = Some(Arc::new(compiled.clone()));
                    template.add_implicitly_defined_template(compiled);
                }
                TokenKind::String => {
                    arg.default_value = Some(DefaultValue::Str(token.text));
                }
                TokenKind::LBrack => arg.default_value = Some(DefaultValue::EmptyList),
                TokenKind::True | TokenKind::False => {
                    arg.default_value = Some(DefaultValue::Bool(token.kind == TokenKind::True));
                }
                kind => {
                    return Err(CompileError::UnsupportedDefaultValue {
                        arg: arg.name.clone(),
                        token: kind,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerSettings::default())
    }
}

fn strip_braces(text: &str) -> &str {
    text.strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .unwrap_or(text)
}
