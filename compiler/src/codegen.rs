//! Syntax tree to bytecode.
//!
//! One [`CodeGenerator`] compiles one top-level template. Every nested
//! template it meets (anonymous subtemplates, embedded regions, blank
//! region stubs) gets its own frame and [`CompilationState`], and once
//! finished is registered with the top-level template.

use std::mem;
use std::sync::Arc;

use bytecode::{CompilationState, Op, OperandSlot, SourceSpan};
use log::debug;
use parser::ast::{
    Args, Element, Expr, ExprKind, ExprTag, IfStat, MapTemplateRef, OptionSetting, Region,
    SubTemplate, Template, TokenRange,
};
use parser::{ErrorKind, ErrorManager, Pos, Token};

use crate::compiler::{Compiler, IMPLICIT_ATTRIBUTES, TemplateOption, function_op};
use crate::names::{self, NameAllocator};
use crate::template::{CompiledTemplate, FormalArgument, RegionKind};

/// What an argument list left on the stack.
struct ArgsInfo {
    count: usize,
    named: bool,
    pass_through: bool,
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn merge(a: Option<TokenRange>, b: Option<TokenRange>) -> Option<TokenRange> {
    match (a, b) {
        (Some(a), Some(b)) => Some(TokenRange::new(a.start.min(b.start), a.stop.max(b.stop))),
        (a, b) => a.or(b),
    }
}

// ── Frame ───────────────────────────────────────────────────────────

/// The template being generated and its bytecode.
struct Frame {
    template: CompiledTemplate,
    state: CompilationState,
}

impl Frame {
    fn finish(self) -> CompiledTemplate {
        let Frame {
            mut template,
            state,
        } = self;
        let out = state.finish();
        template.instructions = out.code.into();
        template.code_size = out.code_size;
        template.strings = out.strings.into();
        template.source_map = out.source_map.into();
        debug!(
            "compiled {}: {} bytes, {} strings",
            template.name,
            template.code_size,
            template.strings.len()
        );
        template
    }
}

// ── CodeGenerator ───────────────────────────────────────────────────

pub struct CodeGenerator<'a> {
    tokens: &'a [Token],
    text: Arc<str>,
    errors: &'a ErrorManager,
    names: &'a NameAllocator,
    initial_code_size: usize,
    outermost_name: String,
    frame: Frame,
    /// Nested templates found so far, in completion order.
    implicit: Vec<CompiledTemplate>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(
        compiler: &'a Compiler,
        tokens: &'a [Token],
        text: Arc<str>,
        name: &str,
        args: Option<Vec<FormalArgument>>,
    ) -> Self {
        let mut generator = Self {
            tokens,
            text,
            errors: compiler.errors(),
            names: compiler.names(),
            initial_code_size: compiler.settings().initial_code_size,
            outermost_name: name.to_owned(),
            frame: Frame {
                template: CompiledTemplate::default(),
                state: CompilationState::with_capacity(0),
            },
            implicit: Vec::new(),
        };
        generator.frame = generator.new_frame(name.to_owned(), args);
        generator.frame.template.prefix = names::prefix_of(name);
        generator
    }

    /// Compile `ast` as the body of the top-level template.
    pub fn generate(mut self, ast: &Template) -> CompiledTemplate {
        self.template(ast);
        self.check_operands();
        let mut outermost = self.frame.finish();
        for sub in self.implicit {
            outermost.add_implicitly_defined_template(sub);
        }
        debug!(
            "{}: {} implicit template(s)",
            outermost.name,
            outermost.implicitly_defined_templates.len()
        );
        outermost
    }

    // ── frames ─────────────────────────────────────────────────────

    fn new_frame(&self, name: String, args: Option<Vec<FormalArgument>>) -> Frame {
        let mut template = CompiledTemplate::new(name);
        template.template = Arc::clone(&self.text);
        template.define_formal_args(args);
        if names::is_subtemplate_name(&template.name) {
            add_implicit_args(&mut template);
        }
        Frame {
            template,
            state: CompilationState::with_capacity(self.initial_code_size),
        }
    }

    /// Compile `body` as a separate template.
    fn nested(
        &mut self,
        name: String,
        args: Option<Vec<FormalArgument>>,
        body: &Template,
    ) -> CompiledTemplate {
        let frame = self.new_frame(name, args);
        let parent = mem::replace(&mut self.frame, frame);
        self.template(body);
        self.check_operands();
        mem::replace(&mut self.frame, parent).finish()
    }

    /// Report a current frame whose code no longer fits the operand width.
    fn check_operands(&self) {
        if let Some(operand) = self.frame.state.overflow() {
            self.error(
                None,
                ErrorKind::CodeTooLarge {
                    template: self.frame.template.name.clone(),
                    operand,
                },
            );
        }
    }

    fn register(&mut self, sub: CompiledTemplate) {
        debug!("{}: defined {}", self.outermost_name, sub.name);
        self.implicit.push(sub);
    }

    // ── source positions and errors ────────────────────────────────

    fn span(&self, range: Option<TokenRange>) -> Option<SourceSpan> {
        let range = range?;
        if range.start > range.stop {
            return None;
        }
        let start = self.tokens.get(range.start)?;
        let stop = self.tokens.get(range.stop)?;
        Some(SourceSpan::new(start.start_index(), stop.stop_index()))
    }

    fn error(&self, at: Option<TokenRange>, kind: ErrorKind) {
        let pos = at
            .and_then(|r| self.tokens.get(r.start))
            .map(|t| t.span.start)
            .unwrap_or_else(Pos::origin);
        self.errors.error(Some(&self.outermost_name), pos, kind);
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn state(&mut self, at: Option<TokenRange>) -> &mut CompilationState {
        let span = self.span(at);
        let state = &mut self.frame.state;
        state.record_source_span(span);
        state
    }

    fn emit(&mut self, at: Option<TokenRange>, op: Op) {
        self.state(at).emit(op);
    }

    fn emit1(&mut self, at: Option<TokenRange>, op: Op, operand: i32) {
        self.state(at).emit_with_int_operand(op, operand);
    }

    fn emit_str(&mut self, at: Option<TokenRange>, op: Op, s: &str) {
        self.state(at).emit_with_string_operand(op, s);
    }

    fn emit2(&mut self, at: Option<TokenRange>, op: Op, s: &str, n: usize) {
        self.state(at).emit_with_string_and_int(op, s, count(n));
    }

    fn branch(&mut self, at: Option<TokenRange>, op: Op) -> OperandSlot {
        self.state(at).emit_branch(op)
    }

    /// Point `slot` at the next instruction.
    fn patch_here(&mut self, slot: OperandSlot) {
        let ip = self.frame.state.ip();
        self.frame.state.patch(slot, ip);
    }

    fn nulls(&mut self, n: usize) {
        for _ in 0..n {
            self.emit(None, Op::Null);
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Elements
    // ═══════════════════════════════════════════════════════════════

    fn template(&mut self, body: &Template) {
        let mut elements = body.elements.iter().peekable();
        while let Some(element) = elements.next() {
            let Element::Text(first) = element else {
                self.element(element);
                continue;
            };
            // adjacent text becomes one write_str
            let mut text = first.text.clone();
            let mut range = first.range;
            while let Some(Element::Text(next)) =
                elements.next_if(|e| matches!(e, Element::Text(_)))
            {
                text.push_str(&next.text);
                range = merge(range, next.range);
            }
            self.text(&text, range);
        }
    }

    fn element(&mut self, element: &Element) {
        match element {
            Element::Text(text) => self.text(&text.text, text.range),
            Element::Newline(range) => self.emit(*range, Op::Newline),
            Element::Expr(tag) => self.expr_tag(tag),
            Element::Indented { indent, element } => {
                self.state(indent.range).indent(&indent.text);
                self.element(element);
                self.frame.state.dedent();
            }
            Element::If(ifstat) => self.ifstat(ifstat),
            Element::Region(region) => self.region(region),
        }
    }

    fn text(&mut self, text: &str, at: Option<TokenRange>) {
        if !text.is_empty() {
            self.emit_str(at, Op::WriteStr, text);
        }
    }

    fn expr_tag(&mut self, tag: &ExprTag) {
        self.expr(&tag.expr);
        match &tag.options {
            Some(options) => {
                self.options(options);
                self.emit(tag.range, Op::WriteOpt);
            }
            None => self.emit(tag.range, Op::Write),
        }
    }

    fn options(&mut self, options: &[OptionSetting]) {
        self.emit(None, Op::Options);
        for option in options {
            let Some(known) = TemplateOption::from_name(&option.name) else {
                self.error(option.range, ErrorKind::NoSuchOption(option.name.clone()));
                continue;
            };
            match (&option.value, known.default_value()) {
                (Some(value), _) => self.expr(value),
                (None, Some(default)) => self.emit_str(option.range, Op::LoadStr, default),
                (None, None) => {
                    self.error(option.range, ErrorKind::NoDefaultValue(option.name.clone()));
                    continue;
                }
            }
            self.emit1(option.range, Op::StoreOption, known.ordinal());
        }
    }

    /// Each `brf` jumps past its own branch body; each `br` at the end of
    /// a body jumps past the whole statement.
    fn ifstat(&mut self, ifstat: &IfStat) {
        let mut pending: Option<OperandSlot> = None;
        let mut end_refs = Vec::new();

        for (i, branch) in ifstat.branches.iter().enumerate() {
            if i > 0 {
                end_refs.push(self.branch(branch.keyword, Op::Br));
                if let Some(slot) = pending.take() {
                    self.patch_here(slot);
                }
            }
            self.expr(&branch.condition);
            let at = if i == 0 {
                branch.keyword
            } else {
                branch.condition.range
            };
            pending = Some(self.branch(at, Op::Brf));
            self.template(&branch.body);
        }

        if let Some(else_branch) = &ifstat.else_branch {
            end_refs.push(self.branch(else_branch.keyword, Op::Br));
            if let Some(slot) = pending.take() {
                self.patch_here(slot);
            }
            self.template(&else_branch.body);
        }

        if let Some(slot) = pending {
            self.patch_here(slot);
        }
        for slot in end_refs {
            self.patch_here(slot);
        }
    }

    fn region(&mut self, region: &Region) {
        let name = names::mangled_region_name(&self.outermost_name, &region.name);
        let mut sub = self.nested(name.clone(), None, &region.body);
        sub.is_region = true;
        sub.region_kind = RegionKind::Embedded;
        self.register(sub);
        self.emit2(region.range, Op::New, &name, 0);
        self.emit(region.range, Op::Write);
    }

    // ═══════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════

    fn expr(&mut self, expr: &Expr) {
        let at = expr.range;
        match &expr.kind {
            ExprKind::Attr(name) => self.ref_attr(name, at),
            ExprKind::Str(s) => self.emit_str(at, Op::LoadStr, s),
            ExprKind::Bool(true) => self.emit(at, Op::True),
            ExprKind::Bool(false) => self.emit(at, Op::False),
            ExprKind::SubTemplate(sub) => {
                let (name, _) = self.subtemplate(sub);
                self.emit2(at, Op::New, &name, 0);
            }
            ExprKind::List(items) => {
                self.emit(at, Op::List);
                for item in items {
                    match item {
                        Some(item) => {
                            self.expr(item);
                            self.emit(item.range, Op::Add);
                        }
                        None => {
                            self.emit(None, Op::Null);
                            self.emit(None, Op::Add);
                        }
                    }
                }
            }
            ExprKind::ToStr(inner) => {
                self.expr(inner);
                self.emit(at, Op::ToStr);
            }
            ExprKind::IncludeIndirect { template, args } => {
                self.expr(template);
                self.emit(at, Op::ToStr);
                for arg in args {
                    self.expr(arg);
                }
                self.emit1(at, Op::NewInd, count(args.len()));
            }
            ExprKind::Prop { target, name } => {
                self.expr(target);
                self.emit_str(at, Op::LoadProp, name);
            }
            ExprKind::PropIndirect { target, property } => {
                self.expr(target);
                self.expr(property);
                self.emit(at, Op::LoadPropInd);
            }
            ExprKind::Func { name, arg } => {
                if let Some(arg) = arg {
                    self.expr(arg);
                }
                match function_op(name) {
                    Some(op) => self.emit(at, op),
                    None => {
                        self.error(at, ErrorKind::NoSuchFunction(name.clone()));
                        self.emit(at, Op::Pop);
                    }
                }
            }
            ExprKind::Include { name, args } => {
                self.include(at, name, args, Op::New, Op::NewBoxArgs);
            }
            ExprKind::IncludeSuper { name, args } => {
                self.include(at, name, args, Op::SuperNew, Op::SuperNewBoxArgs);
            }
            ExprKind::IncludeRegion { name } => {
                let blank = self.define_blank_region(name);
                self.emit2(at, Op::New, &blank, 0);
            }
            ExprKind::IncludeSuperRegion { name } => {
                let mangled = names::mangled_region_name(&self.outermost_name, name);
                self.emit2(at, Op::SuperNew, &mangled, 0);
            }
            ExprKind::Map { source, templates } => {
                self.expr(source);
                for template in templates {
                    self.map_template_ref(template, 1);
                }
                if templates.len() > 1 {
                    self.emit1(at, Op::RotMap, count(templates.len()));
                } else {
                    self.emit(at, Op::Map);
                }
            }
            ExprKind::Zip { sources, template } => {
                for source in sources {
                    self.expr(source);
                }
                self.map_template_ref(template, sources.len());
                self.emit1(at, Op::ZipMap, count(sources.len()));
            }
            ExprKind::Not(inner) => {
                self.expr(inner);
                self.emit(at, Op::Not);
            }
            ExprKind::And(left, right) => {
                self.expr(left);
                self.expr(right);
                self.emit(at, Op::And);
            }
            ExprKind::Or(left, right) => {
                self.expr(left);
                self.expr(right);
                self.emit(at, Op::Or);
            }
        }
    }

    /// Declared arguments load by slot, anything else by name.
    fn ref_attr(&mut self, name: &str, at: Option<TokenRange>) {
        if let Some(arg) = self.frame.template.formal_argument(name) {
            let index = count(arg.index);
            self.emit1(at, Op::LoadLocal, index);
        } else if IMPLICIT_ATTRIBUTES.contains(&name) {
            self.error(at, ErrorKind::ImplicitAttributeOutOfScope(name.to_owned()));
            self.emit(at, Op::Null);
        } else {
            self.emit_str(at, Op::LoadAttr, name);
        }
    }

    fn args(&mut self, args: &Args) -> ArgsInfo {
        match args {
            Args::Positional(exprs) => {
                for expr in exprs {
                    self.expr(expr);
                }
                ArgsInfo {
                    count: exprs.len(),
                    named: false,
                    pass_through: false,
                }
            }
            Args::Named {
                bindings,
                pass_through,
            } => {
                self.emit(None, Op::Args);
                for binding in bindings {
                    self.expr(&binding.value);
                    self.emit_str(binding.range, Op::StoreArg, &binding.name);
                }
                ArgsInfo {
                    count: bindings.len(),
                    named: true,
                    pass_through: *pass_through,
                }
            }
        }
    }

    /// `new`/`super_new` with positional arguments, the boxed form with
    /// named ones.
    fn include(&mut self, at: Option<TokenRange>, name: &str, args: &Args, op: Op, boxed: Op) {
        let info = self.args(args);
        self.finish_include(at, name, info, 0, op, boxed);
    }

    fn finish_include(
        &mut self,
        at: Option<TokenRange>,
        name: &str,
        info: ArgsInfo,
        extra: usize,
        op: Op,
        boxed: Op,
    ) {
        if info.pass_through {
            self.emit_str(at, Op::Passthru, name);
        }
        if info.named {
            self.emit_str(at, boxed, name);
        } else {
            self.emit2(at, op, name, info.count + extra);
        }
    }

    /// The template applied by a map: a `null` placeholder per mapped
    /// value, then the call that the interpreter completes per element.
    fn map_template_ref(&mut self, template: &MapTemplateRef, num_exprs: usize) {
        match template {
            MapTemplateRef::Include { name, args, range } => {
                self.nulls(num_exprs);
                let info = self.args(args);
                self.finish_include(*range, name, info, num_exprs, Op::New, Op::NewBoxArgs);
            }
            MapTemplateRef::SubTemplate(sub) => {
                let (name, nargs) = self.subtemplate(sub);
                if nargs != num_exprs {
                    self.error(
                        sub.range,
                        ErrorKind::AnonArgumentMismatch {
                            params: nargs,
                            values: num_exprs,
                        },
                    );
                }
                self.nulls(num_exprs);
                self.emit2(sub.range, Op::New, &name, num_exprs);
            }
            MapTemplateRef::Indirect {
                template,
                args,
                range,
            } => {
                self.expr(template);
                self.emit(*range, Op::ToStr);
                self.nulls(num_exprs);
                for arg in args {
                    self.expr(arg);
                }
                self.emit1(*range, Op::NewInd, count(args.len() + num_exprs));
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Nested templates
    // ═══════════════════════════════════════════════════════════════

    /// Compile an anonymous subtemplate, returning its name and parameter
    /// count.
    fn subtemplate(&mut self, sub: &SubTemplate) -> (String, usize) {
        let name = self.names.next_subtemplate_name();
        let nargs = sub.params.len();
        let mut compiled = if sub.is_blank() {
            let mut blank = CompiledTemplate::new(name.clone());
            blank.define_formal_args(Some(Vec::new()));
            add_implicit_args(&mut blank);
            blank
        } else {
            let args = sub.params.iter().map(FormalArgument::new).collect();
            self.nested(name.clone(), Some(args), &sub.body)
        };
        compiled.is_anonymous_subtemplate = true;
        self.register(compiled);
        (name, nargs)
    }

    /// `<@r()>` without an embedded body: an empty region the enclosing
    /// group may override.
    fn define_blank_region(&mut self, region: &str) -> String {
        let mangled = names::mangled_region_name(&self.outermost_name, region);
        let mut blank = CompiledTemplate::new(mangled.clone());
        blank.is_region = true;
        blank.region_kind = RegionKind::Implicit;
        self.register(blank);
        mangled
    }
}

fn add_implicit_args(template: &mut CompiledTemplate) {
    for name in IMPLICIT_ATTRIBUTES {
        template.add_arg(FormalArgument::new(name));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parser::ErrorBuffer;

    use super::*;
    use crate::compiler::CompilerSettings;

    fn compile(text: &str) -> (CompiledTemplate, Arc<ErrorBuffer>) {
        let buffer = Arc::new(ErrorBuffer::new());
        let compiler = Compiler::with_listener(CompilerSettings::default(), buffer.clone());
        let template = compiler.compile_named("t", text).unwrap();
        (template, buffer)
    }

    #[test]
    fn adjacent_text_is_merged() {
        // an escape splits literal text into separate tokens
        let (t, _) = compile("a<\\n>b");
        assert_eq!(t.instrs(), "write_str 0");
        assert_eq!(&*t.strings, ["a\nb".to_owned()]);
    }

    #[test]
    fn empty_template() {
        let (t, errors) = compile("");
        assert_eq!(t.code_size, 0);
        assert!(t.strings.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn source_map_points_at_opcodes() {
        let (t, _) = compile("hi <name>");
        assert_eq!(t.source_map[0], Some(SourceSpan::new(0, 3)));
        assert_eq!(t.source_map[1], None);
        assert_eq!(t.source_map[3], Some(SourceSpan::new(4, 8)));
        assert_eq!(t.source_map[6], Some(SourceSpan::new(3, 9)));
        assert_eq!(t.source_span_at(7), Some(SourceSpan::new(3, 9)));
    }

    #[test]
    fn indented_expression() {
        let (t, _) = compile("  <a>\n");
        assert_eq!(t.instrs(), "indent 0, load_attr 1, write, dedent, newline");
    }

    #[test]
    fn indented_if_brackets_whole_statement() {
        let (t, _) = compile("  <if(a)>x<endif>");
        assert_eq!(
            t.instrs(),
            "indent 0, load_attr 1, brf 12, write_str 2, dedent"
        );
    }

    #[test]
    fn implicit_attribute_outside_subtemplate() {
        let (t, errors) = compile("<i>");
        assert_eq!(t.instrs(), "null, write");
        assert_eq!(
            errors.messages()[0].kind,
            ErrorKind::ImplicitAttributeOutOfScope("i".into())
        );
    }

    #[test]
    fn subtemplate_sees_its_parameters_and_indices() {
        let (t, errors) = compile("<names:{n | <i>. <n>}>");
        assert!(errors.is_empty(), "{errors}");
        assert_eq!(t.instrs(), "load_attr 0, null, new 1 1, map, write");
        let sub = &t.implicitly_defined_templates[0];
        assert_eq!(sub.name, "/_sub1");
        assert!(sub.is_anonymous_subtemplate);
        let args: Vec<_> = sub
            .formal_arguments
            .iter()
            .flatten()
            .map(|a| (a.name.as_str(), a.index))
            .collect();
        assert_eq!(args, vec![("n", 0), ("i", 1), ("i0", 2)]);
        assert_eq!(
            sub.instrs(),
            "load_local 1, write, write_str 0, load_local 0, write"
        );
        assert_eq!(sub.template_source(), "<i>. <n>");
    }

    #[test]
    fn argument_count_mismatch_is_reported() {
        let (t, errors) = compile("<a,b:{x | <x>}>");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.messages()[0].kind,
            ErrorKind::AnonArgumentMismatch {
                params: 1,
                values: 2
            }
        );
        assert_eq!(
            t.instrs(),
            "load_attr 0, load_attr 1, null, null, new 2 2, zip_map 2, write"
        );
    }

    #[test]
    fn unknown_function_in_hand_built_tree() {
        let compiler = Compiler::default();
        let tokens = compiler.tokenize("");
        let generator = CodeGenerator::new(&compiler, &tokens, Arc::from(""), "t", None);
        let ast = Template {
            elements: vec![Element::Expr(ExprTag {
                expr: Expr::new(
                    ExprKind::Func {
                        name: "shout".into(),
                        arg: None,
                    },
                    None,
                ),
                options: None,
                range: None,
            })],
        };
        let t = generator.generate(&ast);
        assert_eq!(t.instrs(), "pop, write");
        assert!(t.source_map.iter().all(Option::is_none));
    }
}
