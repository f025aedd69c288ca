use thiserror::Error;

use crate::ast::{
    Args, Branch, Element, ElseBranch, Expr, ExprKind, ExprTag, IfStat, Indent, MapTemplateRef,
    NamedArg, OptionSetting, Region, SubTemplate, Template, Text, TokenRange,
};
use crate::error::{ErrorKind, ErrorManager};
use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

/// Names parsed as built-in function calls rather than template includes.
pub const BUILTIN_FUNCTIONS: [&str; 9] = [
    "first", "last", "rest", "trunc", "strip", "trim", "length", "strlen", "reverse",
];

pub fn is_builtin_function(name: &str) -> bool {
    BUILTIN_FUNCTIONS.contains(&name)
}

/// A syntax error the parser could not recover from.
///
/// It has already been reported through the [`ErrorManager`] by the time it
/// is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{pos}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub pos: Pos,
}

type PResult<T> = Result<T, SyntaxError>;

fn range(start: usize, stop: usize) -> Option<TokenRange> {
    Some(TokenRange::new(start, stop))
}

fn merge(a: Option<TokenRange>, b: Option<TokenRange>) -> Option<TokenRange> {
    match (a, b) {
        (Some(a), Some(b)) => range(a.start.min(b.start), a.stop.max(b.stop)),
        (a, b) => a.or(b),
    }
}

/// Recursive-descent parser over a materialized token vector.
///
/// A missing or single extraneous token is reported and repaired so parsing
/// can continue; [`syntax_errors`](Parser::syntax_errors) counts these. Any
/// other error stops the parse with a [`SyntaxError`].
pub struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    errors: ErrorManager,
    source_name: Option<String>,
    syntax_errors: usize,
    /// Nesting depth of `if (...)` conditions; parentheses group
    /// conditions while it is non-zero.
    conditional_depth: usize,
    eof: Token,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token], errors: ErrorManager) -> Self {
        let end = tokens
            .last()
            .map(|t| t.span.end)
            .unwrap_or_else(Pos::origin);
        Self {
            tokens,
            pos: 0,
            errors,
            source_name: None,
            syntax_errors: 0,
            conditional_depth: 0,
            eof: Token::new(TokenKind::Eof, "", Span::point(end)),
        }
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Number of errors repaired so far.
    pub fn syntax_errors(&self) -> usize {
        self.syntax_errors
    }

    /// Parse a whole template; all input must be consumed.
    pub fn template_and_eof(&mut self) -> PResult<Template> {
        let template = self.template()?;
        if self.la(1) != TokenKind::Eof {
            return Err(self.mismatch());
        }
        Ok(template)
    }

    // ── token access ───────────────────────────────────────────────

    fn lt(&self, i: usize) -> &Token {
        self.tokens.get(self.pos + i - 1).unwrap_or(&self.eof)
    }

    fn la(&self, i: usize) -> TokenKind {
        self.lt(i).kind
    }

    fn text_at(&self, index: usize) -> String {
        self.tokens
            .get(index)
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    /// Consume one token, returning its index.
    fn consume(&mut self) -> usize {
        let index = self.pos;
        if index < self.tokens.len() {
            self.pos += 1;
        }
        index
    }

    fn last(&self) -> usize {
        self.pos.saturating_sub(1)
    }

    // ── errors ─────────────────────────────────────────────────────

    fn report(&mut self, pos: Pos, message: String) {
        self.errors
            .error(self.source_name.as_deref(), pos, ErrorKind::Syntax(message));
    }

    fn fail(&mut self, message: String) -> SyntaxError {
        let pos = self.lt(1).span.start;
        self.report(pos, message.clone());
        SyntaxError { message, pos }
    }

    fn quoted(token: &Token) -> String {
        match token.kind {
            TokenKind::Eof => "<EOF>".to_owned(),
            _ => token.text.escape_debug().to_string(),
        }
    }

    /// No rule can start with the lookahead token.
    fn no_viable(&mut self) -> SyntaxError {
        if self.la(1) == TokenKind::Eof {
            return self.fail("premature EOF".to_owned());
        }
        let text = Self::quoted(self.lt(1));
        self.fail(format!("'{text}' came as a complete surprise to me"))
    }

    /// Input left over after the template.
    fn mismatch(&mut self) -> SyntaxError {
        if self.pos == 0 {
            let text: String = self.tokens.iter().map(|t| t.text.as_str()).collect();
            self.fail(format!("this doesn't look like a template: \"{}\"", text.escape_debug()))
        } else if self.la(1) == TokenKind::LDelim {
            self.fail("doesn't look like an expression".to_owned())
        } else {
            self.no_viable()
        }
    }

    /// Match `kind`, repairing a single missing or extraneous token.
    fn expect(&mut self, kind: TokenKind) -> PResult<usize> {
        if self.la(1) == kind {
            return Ok(self.consume());
        }
        if self.la(1) == TokenKind::Eof {
            return Err(self.fail("premature EOF".to_owned()));
        }
        let found = Self::quoted(self.lt(1));
        let pos = self.lt(1).span.start;
        self.syntax_errors += 1;
        if self.la(2) == kind {
            self.report(pos, format!("extraneous input '{found}' expecting {kind}"));
            self.consume();
            return Ok(self.consume());
        }
        self.report(pos, format!("missing {kind} at '{found}'"));
        Ok(self.last())
    }

    fn ident(&mut self) -> PResult<(usize, String)> {
        if self.la(1) == TokenKind::Id {
            let index = self.consume();
            return Ok((index, self.text_at(index)));
        }
        let index = self.expect(TokenKind::Id)?;
        Ok((index, "<missing ID>".to_owned()))
    }

    // ── template structure ─────────────────────────────────────────

    /// `element*`, stopping before anything that closes an enclosing block.
    fn template(&mut self) -> PResult<Template> {
        let mut elements = Vec::new();
        loop {
            let at = if self.la(1) == TokenKind::Indent { 2 } else { 1 };
            match self.la(at) {
                TokenKind::Eof | TokenKind::RCurly => break,
                TokenKind::LDelim if self.at_block_end(at) => break,
                _ => {}
            }
            if let Some(element) = self.element()? {
                elements.push(element);
            }
        }
        Ok(Template { elements })
    }

    fn at_block_end(&self, ldelim: usize) -> bool {
        matches!(
            self.la(ldelim + 1),
            TokenKind::ElseIf | TokenKind::Else | TokenKind::EndIf | TokenKind::RegionEnd
        )
    }

    fn at_compound(&self, ldelim: usize) -> bool {
        match self.la(ldelim + 1) {
            TokenKind::If => true,
            TokenKind::At => {
                self.la(ldelim + 2) == TokenKind::Id && self.la(ldelim + 3) == TokenKind::RDelim
            }
            _ => false,
        }
    }

    fn element(&mut self) -> PResult<Option<Element>> {
        // a comment alone on its line vanishes with its newline
        if self.lt(1).column() == 0 {
            let at = if self.la(1) == TokenKind::Indent { 2 } else { 1 };
            if self.la(at) == TokenKind::Comment && self.la(at + 1) == TokenKind::Newline {
                for _ in 0..=at {
                    self.consume();
                }
                return Ok(None);
            }
        }

        match self.la(1) {
            TokenKind::Indent if self.la(2) == TokenKind::LDelim && self.at_compound(2) => {
                self.compound_element().map(Some)
            }
            TokenKind::Indent => {
                let index = self.consume();
                let indent = Indent {
                    text: self.text_at(index),
                    range: range(index, index),
                };
                if self.la(1) == TokenKind::Comment {
                    self.consume();
                    return Ok(Some(Element::Text(Text {
                        text: indent.text,
                        range: indent.range,
                    })));
                }
                Ok(self.single_element()?.map(|element| Element::Indented {
                    indent,
                    element: Box::new(element),
                }))
            }
            TokenKind::LDelim if self.at_compound(1) => self.compound_element().map(Some),
            _ => self.single_element(),
        }
    }

    fn single_element(&mut self) -> PResult<Option<Element>> {
        match self.la(1) {
            TokenKind::LDelim => self.expr_tag().map(Some),
            TokenKind::Text => {
                let index = self.consume();
                Ok(Some(Element::Text(Text {
                    text: self.text_at(index),
                    range: range(index, index),
                })))
            }
            TokenKind::Newline => {
                let index = self.consume();
                Ok(Some(Element::Newline(range(index, index))))
            }
            TokenKind::Comment => {
                self.consume();
                Ok(None)
            }
            _ => Err(self.no_viable()),
        }
    }

    fn compound_element(&mut self) -> PResult<Element> {
        let at = if self.la(1) == TokenKind::Indent { 2 } else { 1 };
        if self.la(at + 1) == TokenKind::If {
            self.ifstat()
        } else {
            self.region()
        }
    }

    /// Optional leading indentation of a block tag.
    fn block_indent(&mut self) -> Option<usize> {
        (self.la(1) == TokenKind::Indent).then(|| self.consume())
    }

    /// Indentation survives only when the tag is not alone on its line.
    fn keep_indent(&self, index: Option<usize>) -> Option<Indent> {
        let index = index?;
        (self.la(1) != TokenKind::Newline).then(|| Indent {
            text: self.text_at(index),
            range: range(index, index),
        })
    }

    /// Swallow the newline after a closing tag if the block spans lines.
    fn kill_trailing_newline(&mut self, start: usize) {
        let start_line = self.tokens.get(start).map(Token::line);
        if self.la(1) == TokenKind::Newline && start_line != Some(self.lt(1).line()) {
            self.consume();
        }
    }

    fn wrap_indent(indent: Option<Indent>, element: Element) -> Element {
        match indent {
            Some(indent) => Element::Indented {
                indent,
                element: Box::new(element),
            },
            None => element,
        }
    }

    fn at_branch(&self, kind: TokenKind) -> bool {
        let at = if self.la(1) == TokenKind::Indent { 2 } else { 1 };
        self.la(at) == TokenKind::LDelim && self.la(at + 1) == kind
    }

    fn ifstat(&mut self) -> PResult<Element> {
        let start = self.pos;
        let indent = self.block_indent();
        self.expect(TokenKind::LDelim)?;
        let keyword = self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let condition = self.conditional()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::RDelim)?;
        let indent = self.keep_indent(indent);
        let body = self.template()?;

        let mut branches = vec![Branch {
            condition,
            body,
            keyword: range(keyword, keyword),
        }];

        while self.at_branch(TokenKind::ElseIf) {
            self.block_indent();
            self.consume();
            let keyword = self.consume();
            self.expect(TokenKind::LParen)?;
            let condition = self.conditional()?;
            self.expect(TokenKind::RParen)?;
            self.expect(TokenKind::RDelim)?;
            let body = self.template()?;
            branches.push(Branch {
                condition,
                body,
                keyword: range(keyword, keyword),
            });
        }

        let mut else_branch = None;
        if self.at_branch(TokenKind::Else) {
            self.block_indent();
            self.consume();
            let keyword = self.consume();
            self.expect(TokenKind::RDelim)?;
            let body = self.template()?;
            else_branch = Some(ElseBranch {
                body,
                keyword: range(keyword, keyword),
            });
        }

        self.block_indent();
        self.expect(TokenKind::LDelim)?;
        self.expect(TokenKind::EndIf)?;
        let stop = self.expect(TokenKind::RDelim)?;
        self.kill_trailing_newline(start);

        let ifstat = Element::If(IfStat {
            branches,
            else_branch,
            range: range(start, stop),
        });
        Ok(Self::wrap_indent(indent, ifstat))
    }

    fn region(&mut self) -> PResult<Element> {
        let start = self.pos;
        let indent = self.block_indent();
        let ldelim = self.expect(TokenKind::LDelim)?;
        self.expect(TokenKind::At)?;
        let (_, name) = self.ident()?;
        self.expect(TokenKind::RDelim)?;
        let indent = self.keep_indent(indent);
        let body = self.template()?;

        self.block_indent();
        self.expect(TokenKind::LDelim)?;
        self.expect(TokenKind::RegionEnd)?;
        let stop = self.expect(TokenKind::RDelim)?;
        self.kill_trailing_newline(start);

        let region = Element::Region(Region {
            name,
            body,
            range: range(ldelim, stop),
        });
        Ok(Self::wrap_indent(indent, region))
    }

    fn expr_tag(&mut self) -> PResult<Element> {
        let start = self.expect(TokenKind::LDelim)?;
        let expr = self.map_expr()?;
        let options = if self.la(1) == TokenKind::Semi {
            self.consume();
            Some(self.options()?)
        } else {
            None
        };
        let stop = self.expect(TokenKind::RDelim)?;
        Ok(Element::Expr(ExprTag {
            expr,
            options,
            range: range(start, stop),
        }))
    }

    fn options(&mut self) -> PResult<Vec<OptionSetting>> {
        let mut options = vec![self.option()?];
        while self.la(1) == TokenKind::Comma {
            self.consume();
            options.push(self.option()?);
        }
        Ok(options)
    }

    fn option(&mut self) -> PResult<OptionSetting> {
        let (index, name) = self.ident()?;
        let value = if self.la(1) == TokenKind::Equals {
            self.consume();
            Some(self.expr_no_comma()?)
        } else {
            None
        };
        Ok(OptionSetting {
            name,
            value,
            range: range(index, index),
        })
    }

    /// `{ (ID (, ID)* |)? template }`
    fn subtemplate(&mut self) -> PResult<SubTemplate> {
        let start = self.expect(TokenKind::LCurly)?;
        let mut params = Vec::new();
        if self.la(1) == TokenKind::Id {
            params.push(self.ident()?.1);
            while self.la(1) == TokenKind::Comma {
                self.consume();
                params.push(self.ident()?.1);
            }
            self.expect(TokenKind::Pipe)?;
        }
        let body = self.template()?;
        // indentation before `}` belongs to no line of the body
        if self.la(1) == TokenKind::Indent {
            self.consume();
        }
        let stop = self.expect(TokenKind::RCurly)?;
        Ok(SubTemplate {
            params,
            body,
            range: range(start, stop),
        })
    }

    // ── conditions ─────────────────────────────────────────────────

    fn conditional(&mut self) -> PResult<Expr> {
        self.conditional_depth += 1;
        let result = self.or_conditional();
        self.conditional_depth -= 1;
        result
    }

    fn or_conditional(&mut self) -> PResult<Expr> {
        let mut left = self.and_conditional()?;
        while self.la(1) == TokenKind::Or {
            self.consume();
            let right = self.and_conditional()?;
            let range = merge(left.range, right.range);
            left = Expr::new(ExprKind::Or(Box::new(left), Box::new(right)), range);
        }
        Ok(left)
    }

    fn and_conditional(&mut self) -> PResult<Expr> {
        let mut left = self.not_conditional()?;
        while self.la(1) == TokenKind::And {
            self.consume();
            let right = self.not_conditional()?;
            let range = merge(left.range, right.range);
            left = Expr::new(ExprKind::And(Box::new(left), Box::new(right)), range);
        }
        Ok(left)
    }

    fn not_conditional(&mut self) -> PResult<Expr> {
        if self.la(1) == TokenKind::Bang {
            let bang = self.consume();
            let inner = self.not_conditional()?;
            let range = merge(range(bang, bang), inner.range);
            return Ok(Expr::new(ExprKind::Not(Box::new(inner)), range));
        }
        self.member_expr()
    }

    // ── expressions ────────────────────────────────────────────────

    fn expr(&mut self) -> PResult<Expr> {
        self.map_expr()
    }

    /// `a:t()`, `a:t():u()`, `a:t(),u()` or `a,b:t()`.
    fn map_expr(&mut self) -> PResult<Expr> {
        let first = self.member_expr()?;
        let mut zipped = false;
        let mut expr = if self.la(1) == TokenKind::Comma {
            zipped = true;
            let mut sources = vec![first];
            while self.la(1) == TokenKind::Comma {
                self.consume();
                sources.push(self.member_expr()?);
            }
            self.expect(TokenKind::Colon)?;
            let template = self.map_template_ref()?;
            let range = merge(sources[0].range, template.range());
            Expr::new(
                ExprKind::Zip {
                    sources,
                    template: Box::new(template),
                },
                range,
            )
        } else {
            first
        };

        while self.la(1) == TokenKind::Colon {
            self.consume();
            let mut templates = vec![self.map_template_ref()?];
            if !zipped {
                while self.la(1) == TokenKind::Comma {
                    self.consume();
                    templates.push(self.map_template_ref()?);
                }
            }
            let last = templates.last().and_then(MapTemplateRef::range);
            let range = merge(expr.range, last);
            expr = Expr::new(
                ExprKind::Map {
                    source: Box::new(expr),
                    templates,
                },
                range,
            );
        }
        Ok(expr)
    }

    fn expr_no_comma(&mut self) -> PResult<Expr> {
        let expr = self.member_expr()?;
        if self.la(1) != TokenKind::Colon {
            return Ok(expr);
        }
        self.consume();
        let template = self.map_template_ref()?;
        let range = merge(expr.range, template.range());
        Ok(Expr::new(
            ExprKind::Map {
                source: Box::new(expr),
                templates: vec![template],
            },
            range,
        ))
    }

    fn map_template_ref(&mut self) -> PResult<MapTemplateRef> {
        match self.la(1) {
            TokenKind::Id | TokenKind::Slash => {
                let start = self.pos;
                let name = self.qualified_name()?;
                self.expect(TokenKind::LParen)?;
                let args = self.args()?;
                let stop = self.expect(TokenKind::RParen)?;
                Ok(MapTemplateRef::Include {
                    name,
                    args,
                    range: range(start, stop),
                })
            }
            TokenKind::LCurly => Ok(MapTemplateRef::SubTemplate(self.subtemplate()?)),
            TokenKind::LParen => {
                let start = self.consume();
                let template = self.map_expr()?;
                self.expect(TokenKind::RParen)?;
                self.expect(TokenKind::LParen)?;
                let args = self.optional_arg_list()?;
                let stop = self.expect(TokenKind::RParen)?;
                Ok(MapTemplateRef::Indirect {
                    template: Box::new(template),
                    args,
                    range: range(start, stop),
                })
            }
            _ => Err(self.no_viable()),
        }
    }

    fn member_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.include_expr()?;
        while self.la(1) == TokenKind::Dot {
            match self.la(2) {
                TokenKind::Id => {
                    self.consume();
                    let index = self.consume();
                    let range = merge(expr.range, range(index, index));
                    expr = Expr::new(
                        ExprKind::Prop {
                            target: Box::new(expr),
                            name: self.text_at(index),
                        },
                        range,
                    );
                }
                TokenKind::LParen => {
                    self.consume();
                    self.consume();
                    let property = self.map_expr()?;
                    let stop = self.expect(TokenKind::RParen)?;
                    let range = merge(expr.range, range(stop, stop));
                    expr = Expr::new(
                        ExprKind::PropIndirect {
                            target: Box::new(expr),
                            property: Box::new(property),
                        },
                        range,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn include_expr(&mut self) -> PResult<Expr> {
        let start = self.pos;
        match self.la(1) {
            TokenKind::Id
                if self.la(2) == TokenKind::LParen
                    && is_builtin_function(&self.lt(1).text) =>
            {
                let (_, name) = self.ident()?;
                self.consume();
                let arg = if self.la(1) != TokenKind::RParen {
                    Some(Box::new(self.expr()?))
                } else {
                    None
                };
                let stop = self.expect(TokenKind::RParen)?;
                Ok(Expr::new(ExprKind::Func { name, arg }, range(start, stop)))
            }
            TokenKind::Super => {
                self.consume();
                self.expect(TokenKind::Dot)?;
                let (_, name) = self.ident()?;
                self.expect(TokenKind::LParen)?;
                let args = self.args()?;
                let stop = self.expect(TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::IncludeSuper { name, args },
                    range(start, stop),
                ))
            }
            TokenKind::Id if matches!(self.la(2), TokenKind::LParen | TokenKind::Slash) => {
                self.include(start)
            }
            TokenKind::Slash => self.include(start),
            TokenKind::At => {
                self.consume();
                let is_super = self.la(1) == TokenKind::Super;
                if is_super {
                    self.consume();
                    self.expect(TokenKind::Dot)?;
                }
                let (_, name) = self.ident()?;
                self.expect(TokenKind::LParen)?;
                let stop = self.expect(TokenKind::RParen)?;
                let kind = if is_super {
                    ExprKind::IncludeSuperRegion { name }
                } else {
                    ExprKind::IncludeRegion { name }
                };
                Ok(Expr::new(kind, range(start, stop)))
            }
            _ => self.primary(),
        }
    }

    fn include(&mut self, start: usize) -> PResult<Expr> {
        let name = self.qualified_name()?;
        self.expect(TokenKind::LParen)?;
        let args = self.args()?;
        let stop = self.expect(TokenKind::RParen)?;
        Ok(Expr::new(ExprKind::Include { name, args }, range(start, stop)))
    }

    /// `ID (/ ID)*` or `/ID (/ ID)*`
    fn qualified_name(&mut self) -> PResult<String> {
        let mut name = String::new();
        if self.la(1) == TokenKind::Slash {
            self.consume();
            name.push('/');
        }
        name.push_str(&self.ident()?.1);
        while self.la(1) == TokenKind::Slash {
            self.consume();
            name.push('/');
            name.push_str(&self.ident()?.1);
        }
        Ok(name)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let start = self.pos;
        match self.la(1) {
            TokenKind::Id => {
                let (index, name) = self.ident()?;
                Ok(Expr::new(ExprKind::Attr(name), range(index, index)))
            }
            TokenKind::String => {
                let index = self.consume();
                Ok(Expr::new(ExprKind::Str(self.text_at(index)), range(index, index)))
            }
            TokenKind::True | TokenKind::False => {
                let value = self.la(1) == TokenKind::True;
                let index = self.consume();
                Ok(Expr::new(ExprKind::Bool(value), range(index, index)))
            }
            TokenKind::LCurly => {
                let sub = self.subtemplate()?;
                let range = sub.range;
                Ok(Expr::new(ExprKind::SubTemplate(sub), range))
            }
            TokenKind::LBrack => self.list(),
            TokenKind::LParen if self.conditional_depth > 0 => {
                self.consume();
                let condition = self.conditional()?;
                self.expect(TokenKind::RParen)?;
                Ok(condition)
            }
            TokenKind::LParen => {
                self.consume();
                let inner = self.expr()?;
                let stop = self.expect(TokenKind::RParen)?;
                if self.la(1) != TokenKind::LParen {
                    return Ok(Expr::new(ExprKind::ToStr(Box::new(inner)), range(start, stop)));
                }
                self.consume();
                let args = self.optional_arg_list()?;
                let stop = self.expect(TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::IncludeIndirect {
                        template: Box::new(inner),
                        args,
                    },
                    range(start, stop),
                ))
            }
            _ => Err(self.no_viable()),
        }
    }

    fn list(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::LBrack)?;
        let mut elements = Vec::new();
        if self.la(1) != TokenKind::RBrack {
            elements.push(self.list_element()?);
            while self.la(1) == TokenKind::Comma {
                self.consume();
                elements.push(self.list_element()?);
            }
        }
        let stop = self.expect(TokenKind::RBrack)?;
        Ok(Expr::new(ExprKind::List(elements), range(start, stop)))
    }

    fn list_element(&mut self) -> PResult<Option<Expr>> {
        match self.la(1) {
            TokenKind::Comma | TokenKind::RBrack => Ok(None),
            _ => self.expr_no_comma().map(Some),
        }
    }

    // ── arguments ──────────────────────────────────────────────────

    fn args(&mut self) -> PResult<Args> {
        match self.la(1) {
            TokenKind::RParen => Ok(Args::none()),
            TokenKind::Ellipsis => {
                self.consume();
                Ok(Args::Named {
                    bindings: Vec::new(),
                    pass_through: true,
                })
            }
            TokenKind::Id if self.la(2) == TokenKind::Equals => {
                let mut bindings = vec![self.named_arg()?];
                let mut pass_through = false;
                while self.la(1) == TokenKind::Comma {
                    self.consume();
                    if self.la(1) == TokenKind::Ellipsis {
                        self.consume();
                        pass_through = true;
                        break;
                    }
                    bindings.push(self.named_arg()?);
                }
                Ok(Args::Named {
                    bindings,
                    pass_through,
                })
            }
            _ => Ok(Args::Positional(self.arg_list()?)),
        }
    }

    fn named_arg(&mut self) -> PResult<NamedArg> {
        let (_, name) = self.ident()?;
        let eq = self.expect(TokenKind::Equals)?;
        let value = self.expr_no_comma()?;
        Ok(NamedArg {
            name,
            value,
            range: range(eq, eq),
        })
    }

    fn arg_list(&mut self) -> PResult<Vec<Expr>> {
        let mut args = vec![self.expr_no_comma()?];
        while self.la(1) == TokenKind::Comma {
            self.consume();
            args.push(self.expr_no_comma()?);
        }
        Ok(args)
    }

    fn optional_arg_list(&mut self) -> PResult<Vec<Expr>> {
        if self.la(1) == TokenKind::RParen {
            Ok(Vec::new())
        } else {
            self.arg_list()
        }
    }
}
