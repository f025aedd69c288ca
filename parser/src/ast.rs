//! Template syntax tree.
//!
//! Each node records the inclusive range of token indices it was parsed
//! from, so the code generator can map instructions back to source text.
//! Nodes synthesized rather than parsed carry `None`.

/// Inclusive range of indices into the token vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRange {
    pub start: usize,
    pub stop: usize,
}

impl TokenRange {
    pub const fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    pub const fn single(index: usize) -> Self {
        Self {
            start: index,
            stop: index,
        }
    }
}

/// A sequence of elements: a whole template, a branch body, a subtemplate
/// body, or a region body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub elements: Vec<Element>,
}

impl Template {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub text: String,
    pub range: Option<TokenRange>,
}

/// Leading whitespace of a line.
#[derive(Debug, Clone, PartialEq)]
pub struct Indent {
    pub text: String,
    pub range: Option<TokenRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text(Text),
    Newline(Option<TokenRange>),
    Expr(ExprTag),
    /// An element preceded by indentation on its line.
    Indented { indent: Indent, element: Box<Element> },
    If(IfStat),
    Region(Region),
}

/// `<expr; options>`
#[derive(Debug, Clone, PartialEq)]
pub struct ExprTag {
    pub expr: Expr,
    /// `None` without `;`.
    pub options: Option<Vec<OptionSetting>>,
    pub range: Option<TokenRange>,
}

/// `name=value` or a bare `name` inside an option list.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSetting {
    pub name: String,
    pub value: Option<Expr>,
    pub range: Option<TokenRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStat {
    /// The `if` branch followed by every `elseif`.
    pub branches: Vec<Branch>,
    pub else_branch: Option<ElseBranch>,
    pub range: Option<TokenRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Expr,
    pub body: Template,
    /// The `if`/`elseif` keyword.
    pub keyword: Option<TokenRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseBranch {
    pub body: Template,
    /// The `else` keyword.
    pub keyword: Option<TokenRange>,
}

/// `<@name>...<@end>`
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub body: Template,
    pub range: Option<TokenRange>,
}

/// `{a, b | body}`
#[derive(Debug, Clone, PartialEq)]
pub struct SubTemplate {
    pub params: Vec<String>,
    pub body: Template,
    pub range: Option<TokenRange>,
}

impl SubTemplate {
    /// `{}`: no parameters and no body.
    pub fn is_blank(&self) -> bool {
        self.params.is_empty() && self.body.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: Option<TokenRange>,
}

impl Expr {
    pub fn new(kind: ExprKind, range: Option<TokenRange>) -> Self {
        Self { kind, range }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// An attribute reference.
    Attr(String),
    Str(String),
    Bool(bool),
    SubTemplate(SubTemplate),
    /// `[a, , b]`; `None` marks an empty slot.
    List(Vec<Option<Expr>>),
    /// `(expr)`
    ToStr(Box<Expr>),
    /// `(expr)(args)`
    IncludeIndirect { template: Box<Expr>, args: Vec<Expr> },
    /// `target.name`
    Prop { target: Box<Expr>, name: String },
    /// `target.(expr)`
    PropIndirect { target: Box<Expr>, property: Box<Expr> },
    /// A built-in function such as `first(x)`.
    Func { name: String, arg: Option<Box<Expr>> },
    Include { name: String, args: Args },
    /// `super.name(args)`
    IncludeSuper { name: String, args: Args },
    /// `@name()`
    IncludeRegion { name: String },
    /// `@super.name()`
    IncludeSuperRegion { name: String },
    /// `source:t1():t2()` is two nested maps; `source:t1(),t2()` one map
    /// with two templates applied round-robin.
    Map { source: Box<Expr>, templates: Vec<MapTemplateRef> },
    /// `a, b : t()`
    Zip { sources: Vec<Expr>, template: Box<MapTemplateRef> },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Arguments of a template include.
#[derive(Debug, Clone, PartialEq)]
pub enum Args {
    Positional(Vec<Expr>),
    /// `a=x, b=y` optionally followed by `...`, or just `...`.
    Named {
        bindings: Vec<NamedArg>,
        pass_through: bool,
    },
}

impl Args {
    pub fn none() -> Self {
        Args::Positional(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedArg {
    pub name: String,
    pub value: Expr,
    /// The `=` token.
    pub range: Option<TokenRange>,
}

/// The template applied by a map operator.
#[derive(Debug, Clone, PartialEq)]
pub enum MapTemplateRef {
    /// `name(args)`
    Include {
        name: String,
        args: Args,
        range: Option<TokenRange>,
    },
    SubTemplate(SubTemplate),
    /// `(expr)(args)`
    Indirect {
        template: Box<Expr>,
        args: Vec<Expr>,
        range: Option<TokenRange>,
    },
}

impl MapTemplateRef {
    pub fn range(&self) -> Option<TokenRange> {
        match self {
            MapTemplateRef::Include { range, .. } | MapTemplateRef::Indirect { range, .. } => {
                *range
            }
            MapTemplateRef::SubTemplate(sub) => sub.range,
        }
    }
}
