/// Dual-mode lexer for template text.
///
/// The [`Lexer`] turns a template into [`Token`]s. It alternates between two
/// scanning modes:
///
/// | Mode    | Entered at                     | Produces                          |
/// |---------|--------------------------------|-----------------------------------|
/// | outside | start, `>`, subtemplate body   | text, indent, newline, comments   |
/// | inside  | `<`, `}` closing a subtemplate | identifiers, punctuation, strings |
///
/// Every token records its character offset, line, and column.
///
/// # Subtemplate arguments
///
/// On `{` the lexer cannot know whether an argument list `a, b |` follows.
/// It marks the input, scans speculatively, and either keeps the argument
/// tokens (releasing the mark) or rewinds and emits a bare `{`. Rewinding
/// restores the line and column as well as the cursor.
///
/// # Errors
///
/// Lexical errors are reported through the [`ErrorManager`] and scanning
/// continues, so one pass can report several problems.
use std::collections::VecDeque;

use crate::error::{ErrorKind, ErrorManager};
use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

pub const DEFAULT_START_DELIMITER: char = '<';
pub const DEFAULT_STOP_DELIMITER: char = '>';

fn is_id_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic() || (!c.is_ascii() && c.is_alphabetic())
}

fn is_id_letter(c: char) -> bool {
    is_id_start(c) || c.is_ascii_digit() || (!c.is_ascii() && c.is_numeric())
}

fn is_ws(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Printable form of a lookahead character for diagnostics.
fn show(c: Option<char>) -> String {
    match c {
        Some(c) => c.to_string(),
        None => "<EOF>".to_owned(),
    }
}

// ═══════════════════════════════════════════════════════════════════
// Character stream with backtracking
// ═══════════════════════════════════════════════════════════════════

/// A saved input position. Pass it back to [`CharStream::rewind`] or
/// [`CharStream::release`]; either consumes it.
#[derive(Debug)]
#[must_use = "a checkpoint must be rewound or released"]
pub struct Checkpoint {
    index: usize,
    line: usize,
    column: usize,
}

/// Fully materialized template text with `peek` / `advance` and position
/// tracking.
#[derive(Debug, Clone)]
pub struct CharStream {
    chars: Vec<char>,
    index: usize,
    /// Current line (1-based).
    line: usize,
    /// Current column (0-based).
    column: usize,
}

impl CharStream {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            index: 0,
            line: 1,
            column: 0,
        }
    }

    pub fn pos(&self) -> Pos {
        Pos::new(self.index, self.line, self.column)
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    /// Peek `n` characters ahead (`peek_ahead(0) == peek()`).
    pub fn peek_ahead(&self, n: usize) -> Option<char> {
        self.chars.get(self.index + n).copied()
    }

    pub fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        let line_break = match c {
            '\n' => true,
            '\r' => self.peek() != Some('\n'),
            _ => false,
        };
        if line_break {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    pub fn mark(&self) -> Checkpoint {
        Checkpoint {
            index: self.index,
            line: self.line,
            column: self.column,
        }
    }

    pub fn rewind(&mut self, checkpoint: Checkpoint) {
        self.index = checkpoint.index;
        self.line = checkpoint.line;
        self.column = checkpoint.column;
    }

    /// Commit to everything consumed since `checkpoint`.
    pub fn release(&mut self, checkpoint: Checkpoint) {
        debug_assert!(checkpoint.index <= self.index);
    }

    /// Characters in `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.chars.len());
        self.chars[start.min(end)..end].iter().collect()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Lexer
// ═══════════════════════════════════════════════════════════════════

/// Lexer state saved across speculative scanning.
struct LexerCheckpoint {
    input: Checkpoint,
    start: Pos,
}

pub struct Lexer {
    input: CharStream,
    delimiter_start: char,
    delimiter_stop: char,
    scan_inside: bool,
    /// Open `{` whose `}` has not been seen.
    subtemplate_depth: usize,
    /// Start of the token being scanned.
    start: Pos,
    /// Tokens already scanned but not yet returned.
    pending: VecDeque<Token>,
    errors: ErrorManager,
    source_name: Option<String>,
    done: bool,
}

impl Lexer {
    pub fn new(text: &str, errors: ErrorManager) -> Self {
        Self {
            input: CharStream::new(text),
            delimiter_start: DEFAULT_START_DELIMITER,
            delimiter_stop: DEFAULT_STOP_DELIMITER,
            scan_inside: false,
            subtemplate_depth: 0,
            start: Pos::origin(),
            pending: VecDeque::new(),
            errors,
            source_name: None,
            done: false,
        }
    }

    /// Lex a string, logging any errors.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Self {
        Self::new(text, ErrorManager::default())
    }

    pub fn with_delimiters(mut self, start: char, stop: char) -> Self {
        self.delimiter_start = start;
        self.delimiter_stop = stop;
        self
    }

    /// Name reported with diagnostics.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// All remaining tokens, ending with a single [`TokenKind::Eof`].
    pub fn tokenize(self) -> Vec<Token> {
        self.collect()
    }

    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.pending.pop_front() {
            return token;
        }
        loop {
            self.start = self.input.pos();
            let Some(c) = self.input.peek() else {
                return self.token(TokenKind::Eof);
            };
            let token = if self.scan_inside {
                self.inside(c)
            } else {
                self.outside(c)
            };
            if let Some(token) = token {
                return token;
            }
        }
    }

    // ── helpers ────────────────────────────────────────────────────

    fn token(&self, kind: TokenKind) -> Token {
        let end = self.input.pos();
        let text = self.input.slice(self.start.offset, end.offset);
        Token::new(kind, text, Span::new(self.start, end))
    }

    fn token_with_text(&self, kind: TokenKind, text: String) -> Token {
        Token::new(kind, text, Span::new(self.start, self.input.pos()))
    }

    /// Consume one character and make a token of it.
    fn single(&mut self, kind: TokenKind) -> Token {
        self.start = self.input.pos();
        self.input.advance();
        self.token(kind)
    }

    fn error(&self, pos: Pos, kind: ErrorKind) {
        self.errors.error(self.source_name.as_deref(), pos, kind);
    }

    /// Consume the next character, reporting an error if it is not `c`.
    fn match_char(&mut self, c: char) {
        let found = self.input.peek();
        if found != Some(c) {
            self.error(
                self.input.pos(),
                ErrorKind::Expecting {
                    expected: c.to_string(),
                    found: show(found),
                },
            );
        }
        self.input.advance();
    }

    fn skip_ws(&mut self) {
        while self.input.peek().is_some_and(is_ws) {
            self.input.advance();
        }
    }

    fn skip_blanks(&mut self) {
        while matches!(self.input.peek(), Some(' ' | '\t')) {
            self.input.advance();
        }
    }

    fn mark(&self) -> LexerCheckpoint {
        LexerCheckpoint {
            input: self.input.mark(),
            start: self.start,
        }
    }

    fn rewind(&mut self, checkpoint: LexerCheckpoint) {
        self.input.rewind(checkpoint.input);
        self.start = checkpoint.start;
    }

    fn release(&mut self, checkpoint: LexerCheckpoint) {
        self.input.release(checkpoint.input);
        self.start = checkpoint.start;
    }

    // ── outside an expression ──────────────────────────────────────

    fn outside(&mut self, c: char) -> Option<Token> {
        if self.input.column() == 0 && (c == ' ' || c == '\t') {
            self.skip_blanks();
            // trailing whitespace at EOF is just text
            let kind = if self.input.peek().is_some() {
                TokenKind::Indent
            } else {
                TokenKind::Text
            };
            return Some(self.token(kind));
        }

        if c == self.delimiter_start {
            self.input.advance();
            match self.input.peek() {
                Some('!') => return Some(self.comment()),
                Some('\\') => return self.escape(),
                _ => {}
            }
            self.scan_inside = true;
            return Some(self.token(TokenKind::LDelim));
        }

        match c {
            '\r' => {
                self.input.advance();
                if self.input.peek() == Some('\n') {
                    self.input.advance();
                }
                Some(self.token(TokenKind::Newline))
            }
            '\n' => {
                self.input.advance();
                Some(self.token(TokenKind::Newline))
            }
            '}' if self.subtemplate_depth > 0 => {
                self.input.advance();
                self.scan_inside = true;
                self.subtemplate_depth -= 1;
                Some(self.token(TokenKind::RCurly))
            }
            _ => Some(self.text()),
        }
    }

    fn text(&mut self) -> Token {
        let mut buf = String::new();
        while let Some(c) = self.input.peek() {
            if c == self.delimiter_start || c == '\r' || c == '\n' {
                break;
            }
            if c == '}' && self.subtemplate_depth > 0 {
                break;
            }
            if c == '\\' {
                match self.input.peek_ahead(1) {
                    Some('\\') => {
                        self.input.advance();
                        self.input.advance();
                        buf.push('\\');
                    }
                    Some(next) if next == self.delimiter_start || next == '}' => {
                        self.input.advance();
                        self.input.advance();
                        buf.push(next);
                    }
                    _ => {
                        self.input.advance();
                        buf.push(c);
                    }
                }
                continue;
            }
            self.input.advance();
            buf.push(c);
        }
        self.token_with_text(TokenKind::Text, buf)
    }

    /// `<! ... !>`, positioned at the `!`.
    fn comment(&mut self) -> Token {
        self.input.advance();
        loop {
            match self.input.peek() {
                None => {
                    self.error(
                        self.start,
                        ErrorKind::UnterminatedComment {
                            start: self.start,
                            stop: self.delimiter_stop,
                        },
                    );
                    break;
                }
                Some('!') if self.input.peek_ahead(1) == Some(self.delimiter_stop) => {
                    self.input.advance();
                    self.input.advance();
                    break;
                }
                Some(_) => {
                    self.input.advance();
                }
            }
        }
        self.token(TokenKind::Comment)
    }

    /// `<\x>`, positioned at the backslash.
    fn escape(&mut self) -> Option<Token> {
        self.input.advance();
        let text = match self.input.peek() {
            Some('u') => return self.unicode(),
            Some('\\') => {
                self.line_break();
                return None;
            }
            Some('n') => "\n",
            Some('t') => "\t",
            Some(' ') => " ",
            other => {
                self.error(self.input.pos(), ErrorKind::InvalidEscape(show(other)));
                if other.is_none() {
                    return None;
                }
                self.input.advance();
                self.match_char(self.delimiter_stop);
                return None;
            }
        };
        self.input.advance();
        self.match_char(self.delimiter_stop);
        Some(self.token_with_text(TokenKind::Text, text.to_owned()))
    }

    /// `<\uXXXX>`, positioned at the `u`.
    fn unicode(&mut self) -> Option<Token> {
        self.input.advance();
        let mut digits = String::with_capacity(4);
        for _ in 0..4 {
            match self.input.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    digits.push(c);
                    self.input.advance();
                }
                other => {
                    self.error(self.input.pos(), ErrorKind::InvalidUnicode(show(other)));
                    while self
                        .input
                        .peek()
                        .is_some_and(|c| c != self.delimiter_stop)
                    {
                        self.input.advance();
                    }
                    self.match_char(self.delimiter_stop);
                    return None;
                }
            }
        }
        let decoded = u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32);
        self.match_char(self.delimiter_stop);
        match decoded {
            Some(c) => Some(self.token_with_text(TokenKind::Text, c.to_string())),
            None => {
                self.error(self.start, ErrorKind::InvalidUnicode(digits));
                None
            }
        }
    }

    /// `<\\>` followed by a line break: both vanish, along with the
    /// indentation of the next line.
    fn line_break(&mut self) {
        self.match_char('\\');
        self.match_char(self.delimiter_stop);
        self.skip_blanks();
        match self.input.peek() {
            Some('\r') => {
                self.input.advance();
                if self.input.peek() == Some('\n') {
                    self.input.advance();
                }
            }
            Some('\n') => {
                self.input.advance();
            }
            _ => {
                self.error(self.input.pos(), ErrorKind::MissingNewlineAfterEscape);
                return;
            }
        }
        self.skip_blanks();
    }

    // ── inside an expression ───────────────────────────────────────

    fn inside(&mut self, c: char) -> Option<Token> {
        if c == self.delimiter_stop {
            self.input.advance();
            self.scan_inside = false;
            return Some(self.token(TokenKind::RDelim));
        }

        let kind = match c {
            c if is_ws(c) => {
                self.input.advance();
                return None;
            }
            '.' => {
                self.input.advance();
                if self.input.peek() == Some('.') && self.input.peek_ahead(1) == Some('.') {
                    self.input.advance();
                    self.input.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            ',' => self.punct(TokenKind::Comma),
            ':' => self.punct(TokenKind::Colon),
            ';' => self.punct(TokenKind::Semi),
            '(' => self.punct(TokenKind::LParen),
            ')' => self.punct(TokenKind::RParen),
            '[' => self.punct(TokenKind::LBrack),
            ']' => self.punct(TokenKind::RBrack),
            '=' => self.punct(TokenKind::Equals),
            '!' => self.punct(TokenKind::Bang),
            '/' => self.punct(TokenKind::Slash),
            '@' => {
                self.input.advance();
                if self.at_region_end() {
                    for _ in 0..3 {
                        self.input.advance();
                    }
                    TokenKind::RegionEnd
                } else {
                    TokenKind::At
                }
            }
            '&' => {
                self.input.advance();
                self.match_char('&');
                TokenKind::And
            }
            '|' => {
                self.input.advance();
                self.match_char('|');
                TokenKind::Or
            }
            '"' => return Some(self.string()),
            '{' => return Some(self.subtemplate()),
            c if is_id_start(c) => return Some(self.ident()),
            _ => {
                self.error(self.input.pos(), ErrorKind::InvalidCharacter(c.to_string()));
                self.input.advance();
                return None;
            }
        };
        Some(self.token(kind))
    }

    fn punct(&mut self, kind: TokenKind) -> TokenKind {
        self.input.advance();
        kind
    }

    fn at_region_end(&self) -> bool {
        self.input.peek() == Some('e')
            && self.input.peek_ahead(1) == Some('n')
            && self.input.peek_ahead(2) == Some('d')
            && !self.input.peek_ahead(3).is_some_and(is_id_letter)
    }

    fn ident(&mut self) -> Token {
        while self.input.peek().is_some_and(is_id_letter) {
            self.input.advance();
        }
        let mut token = self.token(TokenKind::Id);
        if let Some(keyword) = TokenKind::keyword(&token.text) {
            token.kind = keyword;
        }
        token
    }

    fn string(&mut self) -> Token {
        self.input.advance();
        let mut buf = String::new();
        loop {
            match self.input.peek() {
                None => {
                    self.error(self.input.pos(), ErrorKind::EofInString);
                    break;
                }
                Some('"') => {
                    self.input.advance();
                    break;
                }
                Some('\\') => {
                    self.input.advance();
                    let Some(escaped) = self.input.advance() else {
                        continue;
                    };
                    buf.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                }
                Some(c) => {
                    self.input.advance();
                    buf.push(c);
                }
            }
        }
        self.token_with_text(TokenKind::String, buf)
    }

    /// `{`, with an optional `a, b |` argument list.
    fn subtemplate(&mut self) -> Token {
        self.subtemplate_depth += 1;
        let checkpoint = self.mark();
        self.input.advance();
        let curly = self.token(TokenKind::LCurly);

        match self.subtemplate_args() {
            Some(args) => {
                self.release(checkpoint);
                self.pending.extend(args);
            }
            None => {
                self.rewind(checkpoint);
                self.input.advance();
            }
        }
        self.scan_inside = false;
        curly
    }

    /// Speculatively scan `ID (, ID)* |`.
    fn subtemplate_args(&mut self) -> Option<Vec<Token>> {
        let mut tokens = Vec::new();
        self.skip_ws();
        tokens.push(self.arg_name()?);
        self.skip_ws();
        while self.input.peek() == Some(',') {
            tokens.push(self.single(TokenKind::Comma));
            self.skip_ws();
            tokens.push(self.arg_name()?);
            self.skip_ws();
        }
        if self.input.peek() != Some('|') {
            return None;
        }
        tokens.push(self.single(TokenKind::Pipe));
        // one whitespace character after `|` is not part of the body
        match self.input.peek() {
            Some('\r') => {
                self.input.advance();
                if self.input.peek() == Some('\n') {
                    self.input.advance();
                }
            }
            Some(c) if is_ws(c) => {
                self.input.advance();
            }
            _ => {}
        }
        Some(tokens)
    }

    fn arg_name(&mut self) -> Option<Token> {
        self.start = self.input.pos();
        if !self.input.peek().is_some_and(is_id_start) {
            return None;
        }
        while self.input.peek().is_some_and(is_id_letter) {
            self.input.advance();
        }
        Some(self.token(TokenKind::Id))
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        self.done = token.kind == TokenKind::Eof;
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorBuffer;
    use TokenKind::*;

    fn tokens(src: &str) -> Vec<Token> {
        Lexer::from_str(src).tokenize()
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokens(src).into_iter().map(|t| t.kind).collect()
    }

    fn texts(src: &str) -> Vec<std::string::String> {
        tokens(src).into_iter().map(|t| t.text).collect()
    }

    fn lex_with_errors(src: &str) -> (Vec<Token>, Vec<std::string::String>) {
        let buffer = Arc::new(ErrorBuffer::new());
        let toks = Lexer::new(src, ErrorManager::new(buffer.clone())).tokenize();
        let errors = buffer.messages().iter().map(|m| m.to_string()).collect();
        (toks, errors)
    }

    #[test]
    fn text_and_attribute() {
        assert_eq!(kinds("hi <name>"), vec![Text, LDelim, Id, RDelim, Eof]);
        assert_eq!(texts("hi <name>"), vec!["hi ", "<", "name", ">", ""]);
    }

    #[test]
    fn empty_input() {
        assert_eq!(kinds(""), vec![Eof]);
    }

    #[test]
    fn keywords() {
        assert_eq!(
            kinds("<if(a)>x<elseif(b)>y<else>z<endif>"),
            vec![
                LDelim, If, LParen, Id, RParen, RDelim, Text, LDelim, ElseIf, LParen, Id,
                RParen, RDelim, Text, LDelim, Else, RDelim, Text, LDelim, EndIf, RDelim, Eof
            ]
        );
        assert_eq!(
            kinds("<super.foo() true false>"),
            vec![LDelim, Super, Dot, Id, LParen, RParen, True, False, RDelim, Eof]
        );
    }

    #[test]
    fn punctuation() {
        assert_eq!(
            kinds("<a,b:c;d=[e](...)!f&&g||h/i>"),
            vec![
                LDelim, Id, Comma, Id, Colon, Id, Semi, Id, Equals, LBrack, Id, RBrack,
                LParen, Ellipsis, RParen, Bang, Id, And, Id, Or, Id, Slash, Id, RDelim, Eof
            ]
        );
    }

    #[test]
    fn subtemplate_with_args() {
        assert_eq!(
            kinds("<names:{n | <n>}>"),
            vec![LDelim, Id, Colon, LCurly, Id, Pipe, LDelim, Id, RDelim, RCurly, RDelim, Eof]
        );
        assert_eq!(
            kinds("<a,b:{x,y|<x><y>}>"),
            vec![
                LDelim, Id, Comma, Id, Colon, LCurly, Id, Comma, Id, Pipe, LDelim, Id, RDelim,
                LDelim, Id, RDelim, RCurly, RDelim, Eof
            ]
        );
    }

    #[test]
    fn subtemplate_args_positions() {
        let toks = tokens("<{ab, c|x}>");
        assert_eq!(toks[1].kind, LCurly);
        assert_eq!((toks[1].start_index(), toks[1].stop_index()), (1, 2));
        assert_eq!(toks[2].text, "ab");
        assert_eq!((toks[2].start_index(), toks[2].column()), (2, 2));
        assert_eq!(toks[4].text, "c");
        assert_eq!(toks[5].kind, Pipe);
        assert_eq!(toks[5].start_index(), 7);
        assert_eq!(toks[6].text, "x");
    }

    #[test]
    fn subtemplate_without_args_rewinds() {
        let toks = tokens("<{ a b }>");
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![LDelim, LCurly, Text, RCurly, RDelim, Eof]
        );
        assert_eq!(toks[1].start_index(), 1);
        assert_eq!(toks[2].text, " a b ");
        assert_eq!(toks[2].start_index(), 2);
        assert_eq!(toks[2].column(), 2);
    }

    #[test]
    fn rewind_restores_line_tracking() {
        // the speculative scan crosses a newline before giving up
        let toks = tokens("<{a\nb}>");
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![LDelim, LCurly, Text, Newline, Text, RCurly, RDelim, Eof]
        );
        assert_eq!(toks[2].line(), 1);
        assert_eq!(toks[4].line(), 2);
        assert_eq!(toks[4].column(), 0);
    }

    #[test]
    fn indentation_only_at_line_start() {
        assert_eq!(
            kinds("  foo\n\t<x>"),
            vec![Indent, Text, Newline, Indent, LDelim, Id, RDelim, Eof]
        );
        assert_eq!(kinds("a  b"), vec![Text, Eof]);
        assert_eq!(kinds("a\n  "), vec![Text, Newline, Text, Eof]);
    }

    #[test]
    fn newline_forms() {
        let toks = tokens("a\r\nb\rc\nd");
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![Text, Newline, Text, Newline, Text, Newline, Text, Eof]
        );
        assert_eq!(toks[1].text, "\r\n");
        assert_eq!(
            toks.iter().filter(|t| t.kind == Text).map(|t| t.line()).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn comments() {
        assert_eq!(kinds("<! hi !>x"), vec![Comment, Text, Eof]);
        assert_eq!(texts("<! a > b !>")[0], "<! a > b !>");
    }

    #[test]
    fn unterminated_comment() {
        let (toks, errors) = lex_with_errors("x\n<! oops");
        assert_eq!(toks.last().unwrap().kind, Eof);
        assert_eq!(
            errors,
            vec!["2:0: Nonterminated comment starting at 2:0: '!>' missing"]
        );
    }

    #[test]
    fn escapes() {
        assert_eq!(texts("a<\\n>b<\\t><\\ >"), vec!["a", "\n", "b", "\t", " ", ""]);
        assert_eq!(texts("<\\u0041><\\u00e9>"), vec!["A", "é", ""]);
    }

    #[test]
    fn escape_token_covers_whole_tag() {
        let toks = tokens("a<\\n>");
        assert_eq!((toks[1].start_index(), toks[1].stop_index()), (1, 5));
    }

    #[test]
    fn bad_escapes_are_reported() {
        let (toks, errors) = lex_with_errors("<\\q>x");
        assert_eq!(toks.iter().map(|t| t.kind).collect::<Vec<_>>(), vec![Text, Eof]);
        assert_eq!(errors, vec!["1:2: invalid escaped char: 'q'"]);

        let (_, errors) = lex_with_errors("<\\u00zz>");
        assert_eq!(errors, vec!["1:5: invalid unicode char: 'z'"]);
    }

    #[test]
    fn escape_cut_off_by_eof_is_one_error() {
        let (toks, errors) = lex_with_errors("a<\\");
        assert_eq!(toks.last().unwrap().kind, Eof);
        assert_eq!(errors, vec!["1:3: invalid escaped char: '<EOF>'"]);
    }

    #[test]
    fn line_continuation() {
        assert_eq!(texts("a<\\\\>\n    b"), vec!["a", "b", ""]);
        assert_eq!(texts("a<\\\\>  \r\nb"), vec!["a", "b", ""]);
    }

    #[test]
    fn line_continuation_requires_newline() {
        let (toks, errors) = lex_with_errors("a<\\\\>b");
        assert_eq!(
            toks.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", ""]
        );
        assert_eq!(errors, vec!["1:5: Missing newline after newline escape <\\\\>"]);
    }

    #[test]
    fn escaped_text() {
        assert_eq!(texts("a\\<b"), vec!["a<b", ""]);
        assert_eq!(texts("a\\\\b\\c"), vec!["a\\b\\c", ""]);
        assert_eq!(texts("<{x\\}y}>")[2], "x}y");
    }

    #[test]
    fn strings() {
        let toks = tokens(r#"<"a\"b\n\q">"#);
        assert_eq!(toks[1].kind, String);
        assert_eq!(toks[1].text, "a\"b\nq");
        assert_eq!(toks[2].kind, RDelim);
    }

    #[test]
    fn eof_in_string() {
        let (toks, errors) = lex_with_errors("<\"abc");
        assert_eq!(toks[1].kind, String);
        assert_eq!(toks[1].text, "abc");
        assert_eq!(errors, vec!["1:5: EOF in string"]);
    }

    #[test]
    fn invalid_character() {
        let (toks, errors) = lex_with_errors("<a # b>");
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![LDelim, Id, Id, RDelim, Eof]
        );
        assert_eq!(errors, vec!["1:3: invalid character '#'"]);
    }

    #[test]
    fn single_ampersand() {
        let (toks, errors) = lex_with_errors("<a&b>");
        assert_eq!(toks[2].kind, And);
        assert_eq!(errors, vec!["1:3: expecting '&', found 'b'"]);
    }

    #[test]
    fn regions() {
        assert_eq!(
            kinds("<@r>x<@end>"),
            vec![LDelim, At, Id, RDelim, Text, LDelim, RegionEnd, RDelim, Eof]
        );
        assert_eq!(
            kinds("<@ending()>"),
            vec![LDelim, At, Id, LParen, RParen, RDelim, Eof]
        );
    }

    #[test]
    fn custom_delimiters() {
        let toks = Lexer::from_str("hi $name$ <b>")
            .with_delimiters('$', '$')
            .tokenize();
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![Text, LDelim, Id, RDelim, Text, Eof]
        );
        assert_eq!(toks[4].text, " <b>");
    }

    #[test]
    fn span_tracking() {
        let toks = tokens("ab\n <x>");
        let x = toks.iter().find(|t| t.kind == Id).unwrap();
        assert_eq!(x.span.start, Pos::new(5, 2, 2));
        assert_eq!(x.span.end, Pos::new(6, 2, 3));
    }

    #[test]
    fn unicode_identifiers() {
        let toks = tokens("<größe>");
        assert_eq!(toks[1].kind, Id);
        assert_eq!(toks[1].text, "größe");
        assert_eq!(toks[2].start_index(), 6);
    }

    #[test]
    fn source_name_in_errors() {
        let buffer = Arc::new(ErrorBuffer::new());
        Lexer::new("<#>", ErrorManager::new(buffer.clone()))
            .with_source_name("page")
            .tokenize();
        assert_eq!(buffer.messages()[0].to_string(), "page 1:1: invalid character '#'");
    }

    #[test]
    fn checkpoint_rewind() {
        let mut s = CharStream::new("ab\ncd");
        s.advance();
        let cp = s.mark();
        s.advance();
        s.advance();
        assert_eq!(s.pos(), Pos::new(3, 2, 0));
        s.rewind(cp);
        assert_eq!(s.pos(), Pos::new(1, 1, 1));
        assert_eq!(s.peek(), Some('b'));
        let cp = s.mark();
        s.advance();
        s.release(cp);
        assert_eq!(s.peek(), Some('\n'));
    }
}
