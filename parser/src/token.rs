/// Token types produced by the template lexer.
use crate::span::Span;

/// The kind of a lexical token.
///
/// Kinds before [`LDelim`](TokenKind::LDelim) come from outside-expression
/// scanning; the rest from inside an expression or subtemplate header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// End of input.
    Eof,

    /// A run of literal text, or the character an escape produces.
    Text,
    /// Spaces and tabs at the start of a line.
    Indent,
    /// `\n`, `\r\n` or a lone `\r`.
    Newline,
    /// A whole `<! ... !>` comment.
    Comment,
    /// `}` closing a subtemplate body.
    RCurly,

    /// The start delimiter, `<` by default.
    LDelim,
    /// The stop delimiter, `>` by default.
    RDelim,

    Id,
    If,
    ElseIf,
    Else,
    EndIf,
    Super,
    True,
    False,
    /// String literal (contents without surrounding quotes, escapes applied).
    String,

    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `;`
    Semi,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBrack,
    /// `]`
    RBrack,
    /// `{`, opening a subtemplate.
    LCurly,
    /// `=`
    Equals,
    /// `!`
    Bang,
    /// `@`
    At,
    /// `@end`
    RegionEnd,
    /// `...`
    Ellipsis,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `|` ending a subtemplate argument list.
    Pipe,
    /// `/` in a qualified template name.
    Slash,
}

impl TokenKind {
    /// Human-readable name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Eof => "<EOF>",
            TokenKind::Text => "TEXT",
            TokenKind::Indent => "INDENT",
            TokenKind::Newline => "NEWLINE",
            TokenKind::Comment => "COMMENT",
            TokenKind::RCurly => "'}'",
            TokenKind::LDelim => "LDELIM",
            TokenKind::RDelim => "RDELIM",
            TokenKind::Id => "ID",
            TokenKind::If => "'if'",
            TokenKind::ElseIf => "'elseif'",
            TokenKind::Else => "'else'",
            TokenKind::EndIf => "'endif'",
            TokenKind::Super => "'super'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::String => "STRING",
            TokenKind::Dot => "'.'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Semi => "';'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrack => "'['",
            TokenKind::RBrack => "']'",
            TokenKind::LCurly => "'{'",
            TokenKind::Equals => "'='",
            TokenKind::Bang => "'!'",
            TokenKind::At => "'@'",
            TokenKind::RegionEnd => "'@end'",
            TokenKind::Ellipsis => "'...'",
            TokenKind::And => "'&&'",
            TokenKind::Or => "'||'",
            TokenKind::Pipe => "'|'",
            TokenKind::Slash => "'/'",
        }
    }

    /// Keyword for an identifier, if it is one.
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        match ident {
            "if" => Some(TokenKind::If),
            "elseif" => Some(TokenKind::ElseIf),
            "else" => Some(TokenKind::Else),
            "endif" => Some(TokenKind::EndIf),
            "super" => Some(TokenKind::Super),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A token with its text and location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text, or the processed value for strings and escapes.
    pub text: std::string::String,
    pub span: Span,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        text: impl Into<std::string::String>,
        span: Span,
    ) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    /// Character offset of the first character.
    pub fn start_index(&self) -> usize {
        self.span.start.offset
    }

    /// Character offset one past the last character.
    pub fn stop_index(&self) -> usize {
        self.span.end.offset
    }

    pub fn line(&self) -> usize {
        self.span.start.line
    }

    pub fn column(&self) -> usize {
        self.span.start.column
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}..{}='{}',<{}>,{}]",
            self.start_index(),
            self.stop_index(),
            self.text.escape_debug(),
            self.kind,
            self.span.start
        )
    }
}
