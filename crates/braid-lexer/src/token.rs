use serde::Serialize;

/// A position in source text. Lines are 1-indexed, columns are 0-indexed,
/// `offset` is a character index into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// The position before the first character of a source.
    pub fn start() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 0,
        }
    }
}

/// A source range from a start position to an end position.
/// The end position is the position *after* the last character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// Whitespace-strip markers (`~`) found immediately inside the delimiters
/// of a mustache, comment, or block boundary tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StripFlags {
    pub open: bool,
    pub close: bool,
}

/// The raw interior of a `{{…}}` / `{{{…}}}` expression, collected by the
/// scanner and handed to the expression parser untouched.
///
/// `content` is the verbatim source between the delimiters with strip
/// markers excluded, so `content_start` + relative scanning reproduces
/// exact source positions for expression-level diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMustache {
    pub content: String,
    pub content_start: Position,
    /// `true` for `{{…}}`, `false` for the triple-delimiter `{{{…}}}` form.
    pub escaped: bool,
    pub strip: StripFlags,
    pub span: Span,
}

impl RawMustache {
    /// The source fragment from the opening delimiter through the content,
    /// as quoted in diagnostics (e.g. `{{> foo`).
    pub fn fragment(&self) -> String {
        let marker = if self.strip.open { "~" } else { "" };
        format!("{{{{{marker}{}", self.content)
    }
}

/// The raw interior of a `{{! … }}` / `{{!-- … --}}` expression-language
/// comment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawComment {
    pub value: String,
    pub strip: StripFlags,
    pub span: Span,
}

/// An attribute collected inside a start tag. The value is an ordered
/// sequence of literal text runs and mustache parts; a bare attribute or an
/// empty quoted value has no parts.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrToken {
    pub name: String,
    pub parts: Vec<AttrPart>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrPart {
    Text { chars: String, span: Span },
    Mustache(RawMustache),
}

/// A fully assembled start tag. Attributes, modifiers (mustaches in
/// attribute space), and comments are independent ordered sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct StartTag {
    pub name: String,
    pub attributes: Vec<AttrToken>,
    pub modifiers: Vec<RawMustache>,
    pub comments: Vec<RawComment>,
    pub self_closing: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndTag {
    pub name: String,
    pub span: Span,
}

/// Tokens produced by the scanner.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal character run (entities already decoded).
    Text { chars: String, span: Span },
    /// HTML comment body, opaque — may contain raw `{{…}}` text.
    Comment { value: String, span: Span },
    /// A mustache encountered in content position.
    Mustache(RawMustache),
    /// An expression-language comment encountered in content position.
    MustacheComment(RawComment),
    StartTag(StartTag),
    EndTag(EndTag),
    Eof { position: Position },
}

impl Token {
    pub fn span(&self) -> Span {
        match self {
            Token::Text { span, .. } => *span,
            Token::Comment { span, .. } => *span,
            Token::Mustache(m) => m.span,
            Token::MustacheComment(c) => c.span,
            Token::StartTag(t) => t.span,
            Token::EndTag(t) => t.span,
            Token::Eof { position } => Span::new(*position, *position),
        }
    }
}

/// HTML5 void elements (no children, no end tag).
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Check if a tag name is an HTML5 void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}
