//! Diagnostics for template compilation.
//!
//! Lexical, syntax and compile-time problems are all reported as
//! [`TemplateMessage`]s through one [`ErrorManager`]. The manager forwards
//! to an [`ErrorListener`], so a host can log them ([`LogListener`]),
//! collect them ([`ErrorBuffer`]) or fail a build on the first one.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::span::Pos;

/// Broad class of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Lexical,
    Syntax,
    Compile,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    // ── lexical ────────────────────────────────────────────────────
    #[error("invalid character '{0}'")]
    InvalidCharacter(String),
    #[error("expecting '{expected}', found '{found}'")]
    Expecting { expected: String, found: String },
    #[error("EOF in string")]
    EofInString,
    #[error("Nonterminated comment starting at {start}: '!{stop}' missing")]
    UnterminatedComment { start: Pos, stop: char },
    #[error("invalid escaped char: '{0}'")]
    InvalidEscape(String),
    #[error("invalid unicode char: '{0}'")]
    InvalidUnicode(String),
    #[error("Missing newline after newline escape <\\\\>")]
    MissingNewlineAfterEscape,

    // ── syntax ─────────────────────────────────────────────────────
    #[error("{0}")]
    Syntax(String),

    // ── compile time ───────────────────────────────────────────────
    #[error("no such function: {0}")]
    NoSuchFunction(String),
    #[error("no such option: {0}")]
    NoSuchOption(String),
    #[error("no default value for {0}")]
    NoDefaultValue(String),
    #[error("anonymous template has {params} arg(s) but mapped across {values} value(s)")]
    AnonArgumentMismatch { params: usize, values: usize },
    #[error("implicitly-defined attribute {0} not visible")]
    ImplicitAttributeOutOfScope(String),
    #[error("code too large: operand {operand} in {template} does not fit in 16 bits")]
    CodeTooLarge { template: String, operand: i32 },
}

impl ErrorKind {
    pub fn category(&self) -> Category {
        match self {
            ErrorKind::InvalidCharacter(_)
            | ErrorKind::Expecting { .. }
            | ErrorKind::EofInString
            | ErrorKind::UnterminatedComment { .. }
            | ErrorKind::InvalidEscape(_)
            | ErrorKind::InvalidUnicode(_)
            | ErrorKind::MissingNewlineAfterEscape => Category::Lexical,
            ErrorKind::Syntax(_) => Category::Syntax,
            ErrorKind::NoSuchFunction(_)
            | ErrorKind::NoSuchOption(_)
            | ErrorKind::NoDefaultValue(_)
            | ErrorKind::AnonArgumentMismatch { .. }
            | ErrorKind::ImplicitAttributeOutOfScope(_)
            | ErrorKind::CodeTooLarge { .. } => Category::Compile,
        }
    }
}

/// One diagnostic, located in a named template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMessage {
    pub source_name: Option<String>,
    pub pos: Pos,
    pub kind: ErrorKind,
}

impl TemplateMessage {
    pub fn new(source_name: Option<&str>, pos: Pos, kind: ErrorKind) -> Self {
        Self {
            source_name: source_name.map(str::to_owned),
            pos,
            kind,
        }
    }
}

impl fmt::Display for TemplateMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.source_name {
            write!(f, "{name} ")?;
        }
        write!(f, "{}: {}", self.pos, self.kind)
    }
}

/// Receives every diagnostic produced while compiling.
pub trait ErrorListener: Send + Sync {
    fn report(&self, message: TemplateMessage);
}

/// Forwards diagnostics to the `log` facade at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl ErrorListener for LogListener {
    fn report(&self, message: TemplateMessage) {
        log::error!("{message}");
    }
}

/// Collects diagnostics for later inspection.
#[derive(Debug, Default)]
pub struct ErrorBuffer {
    messages: Mutex<Vec<TemplateMessage>>,
}

impl ErrorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<TemplateMessage> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl ErrorListener for ErrorBuffer {
    fn report(&self, message: TemplateMessage) {
        self.messages.lock().push(message);
    }
}

impl fmt::Display for ErrorBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in self.messages.lock().iter() {
            writeln!(f, "{message}")?;
        }
        Ok(())
    }
}

/// The single reporting channel shared by lexer, parser and code generator.
#[derive(Clone)]
pub struct ErrorManager {
    listener: Arc<dyn ErrorListener>,
}

impl ErrorManager {
    pub fn new(listener: Arc<dyn ErrorListener>) -> Self {
        Self { listener }
    }

    pub fn report(&self, message: TemplateMessage) {
        self.listener.report(message);
    }

    pub fn error(&self, source_name: Option<&str>, pos: Pos, kind: ErrorKind) {
        self.report(TemplateMessage::new(source_name, pos, kind));
    }
}

impl Default for ErrorManager {
    fn default() -> Self {
        Self::new(Arc::new(LogListener))
    }
}

impl fmt::Debug for ErrorManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorManager").finish_non_exhaustive()
    }
}
