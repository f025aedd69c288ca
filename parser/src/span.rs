//! Locations in template text.

/// A character position. Offsets count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pos {
    pub offset: usize,
    /// 1-based.
    pub line: usize,
    /// 0-based, in characters from the start of the line.
    pub column: usize,
}

impl Pos {
    pub const fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// Line 1, column 0.
    pub const fn origin() -> Self {
        Self::new(0, 1, 0)
    }
}

/// `line:column`, the form every diagnostic uses.
impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The text a token covers; `end` is one past its last character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub const fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    /// Empty span at `pos`, for tokens that consume no input such as EOF.
    pub const fn point(pos: Pos) -> Self {
        Self::new(pos, pos)
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start.offset, self.end.offset)
    }
}
