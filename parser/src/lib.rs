//! # Parser
//!
//! Lexer and recursive-descent parser for `<expr>`-style text templates.
//!
//! ## Architecture
//!
//! ```text
//!  template text
//!      │
//!      ▼
//!  ┌────────┐    Vec<Token>     ┌────────┐    ast::Template
//!  │ Lexer  │ ────────────────▶ │ Parser │ ──────────────────▶ code generator
//!  └────────┘                   └────────┘
//!      │                            │
//!      └──────── ErrorManager ◀─────┘
//! ```
//!
//! The lexer switches between literal text and expression scanning at the
//! delimiters and materializes every token up front; the parser addresses
//! tokens by index so syntax nodes can point back into the source.
//!
//! ```rust
//! use parser::{ErrorManager, Lexer, Parser};
//!
//! let errors = ErrorManager::default();
//! let tokens = Lexer::new("hi <name>!", errors.clone()).tokenize();
//! let mut parser = Parser::new(&tokens, errors);
//! let template = parser.template_and_eof().unwrap();
//! assert_eq!(template.elements.len(), 3);
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;

pub use error::{
    Category, ErrorBuffer, ErrorKind, ErrorListener, ErrorManager, LogListener, TemplateMessage,
};
pub use lexer::{DEFAULT_START_DELIMITER, DEFAULT_STOP_DELIMITER, Lexer};
pub use parser::{BUILTIN_FUNCTIONS, Parser, SyntaxError, is_builtin_function};
pub use span::{Pos, Span};
pub use token::{Token, TokenKind};
