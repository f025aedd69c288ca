use std::sync::Arc;

use bytecode::SourceSpan;
use bytecode::source_map;
use parser::Token;

use crate::disasm::Disassembler;

/// How a region template came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionKind {
    /// Not a region.
    #[default]
    None,
    /// Referenced with `<@r()>` but never given a body.
    Implicit,
    /// `<@r>...<@end>` inside another template.
    Embedded,
    /// Defined on its own, outside the enclosing template.
    Explicit,
}

/// A constant default value of a formal argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Str(String),
    Bool(bool),
    EmptyList,
}

/// A named, positionally indexed parameter of a template.
#[derive(Debug, Clone)]
pub struct FormalArgument {
    pub name: String,
    /// Local slot used by `load_local`; assigned by [`CompiledTemplate::add_arg`].
    pub index: usize,
    /// Token the default value was written as, if there is one.
    pub default_value_source: Option<Token>,
    pub default_value: Option<DefaultValue>,
    pub compiled_default_value: Option<Arc<CompiledTemplate>>,
}

impl FormalArgument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: 0,
            default_value_source: None,
            default_value: None,
            compiled_default_value: None,
        }
    }

    pub fn with_default(name: impl Into<String>, source: Token) -> Self {
        Self {
            default_value_source: Some(source),
            ..Self::new(name)
        }
    }

    pub fn has_default(&self) -> bool {
        self.default_value_source.is_some()
    }
}

/// Equal when the names match and both or neither carry a default; the
/// default itself is not compared.
impl PartialEq for FormalArgument {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.has_default() == other.has_default()
    }
}

impl Eq for FormalArgument {}

/// One compiled template: bytecode, string pool, source map and argument
/// metadata.
///
/// Code, strings, source map, source text and nested templates sit behind
/// `Arc`s; cloning shares them and copies only the formal argument list,
/// so each instance can grow its own arguments.
#[derive(Debug, Default)]
pub struct CompiledTemplate {
    pub name: String,
    /// Namespace, always ending in `/`.
    pub prefix: String,
    /// Raw text this template was compiled from. Anonymous subtemplates
    /// share the text of the template enclosing them.
    pub template: Arc<str>,
    pub instructions: Arc<[u8]>,
    /// Logical length of `instructions`.
    pub code_size: usize,
    pub strings: Arc<[String]>,
    /// Parallel to `instructions`; set only at opcode addresses.
    pub source_map: Arc<[Option<SourceSpan>]>,
    /// `None` when the arguments are unknown, as opposed to known empty.
    pub formal_arguments: Option<Vec<FormalArgument>>,
    pub has_formal_args: bool,
    pub number_of_args_with_default_values: usize,
    /// Subtemplates and regions found while compiling this template.
    pub implicitly_defined_templates: Arc<Vec<CompiledTemplate>>,
    pub is_anonymous_subtemplate: bool,
    pub is_region: bool,
    pub region_kind: RegionKind,
}

impl Clone for CompiledTemplate {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            prefix: self.prefix.clone(),
            template: Arc::clone(&self.template),
            instructions: Arc::clone(&self.instructions),
            code_size: self.code_size,
            strings: Arc::clone(&self.strings),
            source_map: Arc::clone(&self.source_map),
            formal_arguments: self.formal_arguments.clone(),
            has_formal_args: self.has_formal_args,
            number_of_args_with_default_values: self.number_of_args_with_default_values,
            implicitly_defined_templates: Arc::clone(&self.implicitly_defined_templates),
            is_anonymous_subtemplate: self.is_anonymous_subtemplate,
            is_region: self.is_region,
            region_kind: self.region_kind,
        }
    }
}

impl CompiledTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: "/".to_owned(),
            ..Self::default()
        }
    }

    /// The live part of the code buffer.
    pub fn code(&self) -> &[u8] {
        let end = self.code_size.min(self.instructions.len());
        &self.instructions[..end]
    }

    pub fn formal_argument(&self, name: &str) -> Option<&FormalArgument> {
        self.formal_arguments
            .as_ref()?
            .iter()
            .find(|arg| arg.name == name)
    }

    /// Append `arg` at the next index, creating the list if needed.
    pub fn add_arg(&mut self, mut arg: FormalArgument) {
        let args = self.formal_arguments.get_or_insert_with(Vec::new);
        arg.index = args.len();
        args.push(arg);
    }

    /// Declare the argument list; `None` means it is not known.
    pub fn define_formal_args(&mut self, args: Option<Vec<FormalArgument>>) {
        self.has_formal_args = true;
        match args {
            None => self.formal_arguments = None,
            Some(args) => {
                for arg in args {
                    self.add_arg(arg);
                }
            }
        }
    }

    /// Register a nested template in this template's namespace.
    pub fn add_implicitly_defined_template(&mut self, mut sub: CompiledTemplate) {
        sub.prefix = self.prefix.clone();
        if !sub.name.starts_with('/') {
            sub.name = format!("{}{}", sub.prefix, sub.name);
        }
        Arc::make_mut(&mut self.implicitly_defined_templates).push(sub);
    }

    /// Span of the raw text this template covers.
    ///
    /// For an anonymous subtemplate that is the range its instructions map
    /// to; otherwise the whole text.
    pub fn template_range(&self) -> SourceSpan {
        let whole = SourceSpan::new(0, self.template.chars().count());
        if !self.is_anonymous_subtemplate {
            return whole;
        }
        self.source_map[..self.code_size.min(self.source_map.len())]
            .iter()
            .flatten()
            .copied()
            .reduce(SourceSpan::merge)
            .unwrap_or(whole)
    }

    pub fn template_source(&self) -> String {
        self.template_range().slice(&self.template)
    }

    /// Span of the instruction at or before `addr`.
    pub fn source_span_at(&self, addr: usize) -> Option<SourceSpan> {
        source_map::lookup(&self.source_map[..self.code_size.min(self.source_map.len())], addr)
    }

    /// The source map in its compact stored form.
    pub fn encoded_source_map(&self) -> Vec<u8> {
        source_map::encode(&self.source_map[..self.code_size.min(self.source_map.len())])
    }

    /// Full listing: instructions, string pool and source map.
    pub fn disasm(&self) -> String {
        let dis = Disassembler::new(self);
        format!(
            "{}\nStrings:\n{}\nBytecode to template map:\n{}\n",
            dis.disassemble(),
            dis.strings(),
            dis.source_map()
        )
    }

    /// Compact single-line assembly, e.g. `write_str 0, load_attr 1, write`.
    pub fn instrs(&self) -> String {
        Disassembler::new(self).instrs()
    }
}
