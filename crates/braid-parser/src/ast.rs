//! Abstract Syntax Tree for Braid templates.
//!
//! Contains both document-level statements (text, elements, blocks,
//! comments) and expression-level nodes (paths, sub-expressions, literals).
//! Every node carries a `loc` span; lines are 1-indexed, columns 0-indexed.
//!
//! All nodes derive `Serialize` so tooling can dump a parsed tree as JSON.

use serde::Serialize;

pub use braid_lexer::{Position, Span, StripFlags};

// ---------------------------------------------------------------------------
// Document-level AST
// ---------------------------------------------------------------------------

/// A parsed template, or the body of a block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub body: Vec<Statement>,
    pub loc: Span,
}

/// A statement in a program body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Statement {
    Text(TextNode),
    Element(ElementNode),
    Mustache(MustacheStatement),
    Block(BlockStatement),
    Comment(CommentNode),
    MustacheComment(MustacheCommentNode),
}

impl Statement {
    pub fn loc(&self) -> Span {
        match self {
            Statement::Text(n) => n.loc,
            Statement::Element(n) => n.loc,
            Statement::Mustache(n) => n.loc,
            Statement::Block(n) => n.loc,
            Statement::Comment(n) => n.loc,
            Statement::MustacheComment(n) => n.loc,
        }
    }
}

/// Literal character run. `loc` keeps the original source span even after
/// the whitespace-control pass shrinks `chars`.
///
/// `left_stripped`/`right_stripped` record that a side has already been
/// trimmed by the standalone heuristic, which keeps the pass idempotent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextNode {
    pub chars: String,
    pub loc: Span,
    #[serde(skip)]
    pub left_stripped: bool,
    #[serde(skip)]
    pub right_stripped: bool,
}

impl TextNode {
    pub fn new(chars: String, loc: Span) -> Self {
        Self {
            chars,
            loc,
            left_stripped: false,
            right_stripped: false,
        }
    }
}

/// HTML comment body, opaque — `{{…}}` inside it stays raw text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentNode {
    pub value: String,
    pub loc: Span,
}

/// Expression-language comment (`{{! … }}` / `{{!-- … --}}`), never
/// rendered. May appear in an element's attribute space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MustacheCommentNode {
    pub value: String,
    pub strip: StripFlags,
    pub loc: Span,
}

/// An interpolation: `{{path params… key=value…}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MustacheStatement {
    pub path: Expression,
    pub params: Vec<Expression>,
    pub hash: Hash,
    /// `false` for the triple-delimiter `{{{…}}}` form.
    pub escaped: bool,
    pub strip: StripFlags,
    pub loc: Span,
}

/// A block: `{{#path …}} body {{else}} inverse {{/path}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStatement {
    pub path: Expression,
    pub params: Vec<Expression>,
    pub hash: Hash,
    pub program: Program,
    pub inverse: Option<Program>,
    pub block_params: Vec<String>,
    pub open_strip: StripFlags,
    pub inverse_strip: StripFlags,
    pub close_strip: StripFlags,
    pub loc: Span,
}

/// An HTML element. `attributes`, `modifiers`, and `comments` each preserve
/// source order as independent sequences. A tag name starting with `:`
/// denotes a named block child.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<AttrNode>,
    pub modifiers: Vec<ElementModifierNode>,
    pub comments: Vec<MustacheCommentNode>,
    pub children: Vec<Statement>,
    pub block_params: Vec<String>,
    pub self_closing: bool,
    pub loc: Span,
}

/// An expression-language call attached directly to a tag:
/// `<p {{action 'boom'}}>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementModifierNode {
    pub path: Expression,
    pub params: Vec<Expression>,
    pub hash: Hash,
    pub loc: Span,
}

/// An attribute on an element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttrNode {
    pub name: String,
    pub value: AttrValue,
    pub loc: Span,
}

/// An attribute value. A quoted value with literal text mixed with
/// interpolation (or more than one part) is a concat; a single
/// interpolation with no literal text collapses to a bare mustache; all
/// other values, including empty and bare attributes, are text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum AttrValue {
    Text(TextNode),
    Mustache(MustacheStatement),
    Concat(ConcatStatement),
}

/// A quoted attribute value mixing text and interpolations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcatStatement {
    pub parts: Vec<ConcatPart>,
    pub loc: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ConcatPart {
    Text(TextNode),
    Mustache(MustacheStatement),
}

// ---------------------------------------------------------------------------
// Expression-level AST
// ---------------------------------------------------------------------------

/// A complete expression node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    pub kind: ExprKind,
    pub loc: Span,
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    /// Dotted reference: `user.name`, `this.foo`, `@arg`
    Path(PathExpression),

    /// Nested call usable as a param or hash value: `(helper arg)`
    SubExpr(SubExpression),

    /// String literal: `"hello"`, `'world'`
    String(String),

    /// Numeric literal: `42`, `3.14`, `-1`
    Number(f64),

    /// Boolean literal
    Boolean(bool),

    /// Null literal
    Null,

    /// Undefined literal
    Undefined,
}

/// A dotted/sigil-qualified reference name.
///
/// `original` is the name as written; `parts` are the dot-separated
/// segments with the `this`/`@` head factored out into flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathExpression {
    pub parts: Vec<String>,
    pub this_head: bool,
    pub data: bool,
    pub original: String,
}

/// A parenthesized sub-expression: `(path params… key=value…)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubExpression {
    pub path: Box<Expression>,
    pub params: Vec<Expression>,
    pub hash: Hash,
}

/// Ordered `key=value` pairs trailing a call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hash {
    pub pairs: Vec<HashPair>,
    pub loc: Span,
}

impl Hash {
    /// An empty hash anchored at a position.
    pub fn empty(at: Position) -> Self {
        Self {
            pairs: Vec::new(),
            loc: Span::new(at, at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HashPair {
    pub key: String,
    pub value: Expression,
    pub loc: Span,
}
