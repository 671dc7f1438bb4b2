//! AST builder for Braid templates.
//!
//! Consumes the token stream from `braid-lexer` and assembles the final
//! tree: elements with attributes/modifiers/comments/children, block
//! statements with main and else bodies, named blocks, and attribute-value
//! assembly. Runs the whitespace-control pass before returning.
//!
//! Unsupported mustache constructs (partials, decorators) and structural
//! mismatches are fatal, positioned diagnostics.

use braid_lexer::{
    is_void_element, AttrPart, AttrToken, EndTag, Position, RawComment, RawMustache, Span,
    StartTag, StripFlags, Token, Tokenizer,
};

use crate::ast::{
    AttrNode, AttrValue, BlockStatement, CommentNode, ConcatPart, ConcatStatement, ElementModifierNode,
    ElementNode, Expression, Hash, MustacheCommentNode, MustacheStatement, Program, Statement,
    TextNode,
};
use crate::expr::{head_name, CallParts, ExprParser};
use crate::{strip, ParseError, ParseOptions};

/// What a raw mustache's content begins with.
enum MustacheKind {
    Expr,
    BlockOpen,
    BlockClose,
    Else,
    ElseChained,
    Partial,
    PartialBlock,
    Decorator,
    DecoratorBlock,
}

fn classify(raw: &RawMustache) -> MustacheKind {
    let content = raw.content.as_str();
    if content.starts_with("#>") {
        MustacheKind::PartialBlock
    } else if content.starts_with("#*") {
        MustacheKind::DecoratorBlock
    } else if content.starts_with('#') {
        MustacheKind::BlockOpen
    } else if content.starts_with('/') {
        MustacheKind::BlockClose
    } else if content.starts_with('>') {
        MustacheKind::Partial
    } else if content.starts_with('*') {
        MustacheKind::Decorator
    } else {
        let trimmed = content.trim();
        if trimmed == "else" {
            MustacheKind::Else
        } else if trimmed
            .strip_prefix("else")
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_whitespace()))
        {
            MustacheKind::ElseChained
        } else {
            MustacheKind::Expr
        }
    }
}

fn unsupported(raw: &RawMustache, what: &str) -> ParseError {
    let pos = raw.span.start;
    ParseError {
        message: format!(
            "{what} are not supported: \"{}\" at L{}:C{}",
            raw.fragment(),
            pos.line,
            pos.column
        ),
        line: pos.line,
        column: pos.column,
    }
}

/// Position one character past a `#` or `/` sigil. Sigils never span lines.
fn after_sigil(p: Position) -> Position {
    Position {
        offset: p.offset + 1,
        line: p.line,
        column: p.column + 1,
    }
}

fn comment_node(raw: RawComment) -> MustacheCommentNode {
    MustacheCommentNode {
        value: raw.value,
        strip: raw.strip,
        loc: raw.span,
    }
}

/// An open construct on the builder stack.
enum Frame {
    Element {
        tag: String,
        attributes: Vec<AttrNode>,
        modifiers: Vec<ElementModifierNode>,
        comments: Vec<MustacheCommentNode>,
        block_params: Vec<String>,
        start: Position,
        children: Vec<Statement>,
    },
    Block {
        path: Expression,
        params: Vec<Expression>,
        hash: Hash,
        name: String,
        block_params: Vec<String>,
        open_strip: StripFlags,
        start: Position,
        body: Vec<Statement>,
        body_start: Position,
        /// Main body and its span, once `{{else}}` has been seen; `body`
        /// then accumulates the inverse.
        main: Option<(Vec<Statement>, Span)>,
        inverse_strip: StripFlags,
        inverse_start: Position,
    },
}

/// Braid template parser.
///
/// Converts the flat token stream from the scanner into a `Program` using
/// an explicit stack of open elements and blocks.
pub struct Parser {
    stack: Vec<Frame>,
    root: Vec<Statement>,
}

impl Parser {
    /// Parse source text into a program AST with default options.
    pub fn parse(source: &str) -> Result<Program, ParseError> {
        Self::parse_with_options(source, ParseOptions::default())
    }

    /// Parse source text into a program AST.
    pub fn parse_with_options(
        source: &str,
        options: ParseOptions,
    ) -> Result<Program, ParseError> {
        let tokens = Tokenizer::tokenize(source)?;

        let mut parser = Parser {
            stack: Vec::new(),
            root: Vec::new(),
        };
        let mut eof = Position::start();
        for token in tokens {
            match token {
                Token::Eof { position } => eof = position,
                other => parser.handle(other)?,
            }
        }
        parser.finish(eof, &options)
    }

    fn handle(&mut self, token: Token) -> Result<(), ParseError> {
        match token {
            Token::Text { chars, span } => {
                self.push_statement(Statement::Text(TextNode::new(chars, span)));
            }
            Token::Comment { value, span } => {
                self.push_statement(Statement::Comment(CommentNode { value, loc: span }));
            }
            Token::MustacheComment(raw) => {
                self.push_statement(Statement::MustacheComment(comment_node(raw)));
            }
            Token::Mustache(raw) => self.handle_mustache(raw)?,
            Token::StartTag(tag) => self.handle_start_tag(tag)?,
            Token::EndTag(tag) => self.handle_end_tag(tag)?,
            Token::Eof { .. } => {}
        }
        Ok(())
    }

    fn finish(mut self, eof: Position, options: &ParseOptions) -> Result<Program, ParseError> {
        if let Some(frame) = self.stack.last() {
            return Err(match frame {
                Frame::Element { tag, start, .. } => {
                    ParseError::syntax(*start, format!("unclosed element <{tag}>"))
                }
                Frame::Block { name, start, .. } => {
                    ParseError::syntax(*start, format!("unclosed block {{{{#{name}}}}}"))
                }
            });
        }

        let mut program = Program {
            body: std::mem::take(&mut self.root),
            loc: Span::new(Position::start(), eof),
        };
        strip::process(&mut program, options);
        Ok(program)
    }

    // --- Statement assembly ---

    fn body_mut(&mut self) -> &mut Vec<Statement> {
        match self.stack.last_mut() {
            Some(Frame::Element { children, .. }) => children,
            Some(Frame::Block { body, .. }) => body,
            None => &mut self.root,
        }
    }

    fn push_statement(&mut self, stmt: Statement) {
        // Adjacent text runs merge into one node.
        if let Statement::Text(new) = &stmt {
            if let Some(Statement::Text(prev)) = self.body_mut().last_mut() {
                prev.chars.push_str(&new.chars);
                prev.loc.end = new.loc.end;
                return;
            }
        }
        self.body_mut().push(stmt);
    }

    fn handle_mustache(&mut self, raw: RawMustache) -> Result<(), ParseError> {
        match classify(&raw) {
            MustacheKind::Expr => {
                let mustache = self.mustache_statement(raw)?;
                self.push_statement(Statement::Mustache(mustache));
            }
            MustacheKind::BlockOpen => {
                let (call, block_params) = ExprParser::block_open(
                    &raw.content[1..],
                    after_sigil(raw.content_start),
                )?;
                let name = head_name(&call.path);
                self.stack.push(Frame::Block {
                    path: call.path,
                    params: call.params,
                    hash: call.hash,
                    name,
                    block_params,
                    open_strip: raw.strip,
                    start: raw.span.start,
                    body: Vec::new(),
                    body_start: raw.span.end,
                    main: None,
                    inverse_strip: StripFlags::default(),
                    inverse_start: raw.span.end,
                });
            }
            MustacheKind::Else => match self.stack.last_mut() {
                Some(Frame::Block {
                    body,
                    body_start,
                    main,
                    inverse_strip,
                    inverse_start,
                    ..
                }) => {
                    if main.is_some() {
                        return Err(ParseError::syntax(
                            raw.span.start,
                            "unexpected second {{else}} in a block".into(),
                        ));
                    }
                    let main_body = std::mem::take(body);
                    *main = Some((main_body, Span::new(*body_start, raw.span.start)));
                    *inverse_strip = raw.strip;
                    *inverse_start = raw.span.end;
                }
                _ => {
                    return Err(ParseError::syntax(
                        raw.span.start,
                        "unexpected {{else}} outside of a block".into(),
                    ));
                }
            },
            MustacheKind::ElseChained => {
                return Err(ParseError::syntax(
                    raw.span.start,
                    "chained else blocks are not supported".into(),
                ));
            }
            MustacheKind::BlockClose => {
                let close_name = ExprParser::close_name(
                    &raw.content[1..],
                    after_sigil(raw.content_start),
                )?;
                match self.stack.pop() {
                    Some(Frame::Block {
                        path,
                        params,
                        hash,
                        name,
                        block_params,
                        open_strip,
                        start,
                        body,
                        body_start,
                        main,
                        inverse_strip,
                        inverse_start,
                    }) => {
                        if close_name != name {
                            return Err(ParseError::syntax(
                                raw.span.start,
                                format!(
                                    "closing block tag {{{{/{close_name}}}}} does not match open block {{{{#{name}}}}}"
                                ),
                            ));
                        }
                        let (program, inverse) = match main {
                            Some((main_body, main_loc)) => (
                                Program {
                                    body: main_body,
                                    loc: main_loc,
                                },
                                Some(Program {
                                    body,
                                    loc: Span::new(inverse_start, raw.span.start),
                                }),
                            ),
                            None => (
                                Program {
                                    body,
                                    loc: Span::new(body_start, raw.span.start),
                                },
                                None,
                            ),
                        };
                        self.push_statement(Statement::Block(BlockStatement {
                            path,
                            params,
                            hash,
                            program,
                            inverse,
                            block_params,
                            open_strip,
                            inverse_strip,
                            close_strip: raw.strip,
                            loc: Span::new(start, raw.span.end),
                        }));
                    }
                    _ => {
                        return Err(ParseError::syntax(
                            raw.span.start,
                            format!("closing block tag {{{{/{close_name}}}}} without an open block"),
                        ));
                    }
                }
            }
            MustacheKind::Partial => return Err(unsupported(&raw, "Partials")),
            MustacheKind::PartialBlock => return Err(unsupported(&raw, "Partial blocks")),
            MustacheKind::Decorator => return Err(unsupported(&raw, "Decorators")),
            MustacheKind::DecoratorBlock => return Err(unsupported(&raw, "Decorator blocks")),
        }
        Ok(())
    }

    fn handle_start_tag(&mut self, tag: StartTag) -> Result<(), ParseError> {
        let mut attr_tokens = tag.attributes;
        let block_params = extract_block_params(&mut attr_tokens)?;

        let attributes = attr_tokens
            .into_iter()
            .map(|a| self.attr_node(a))
            .collect::<Result<Vec<_>, _>>()?;
        let modifiers = tag
            .modifiers
            .into_iter()
            .map(|m| self.modifier_node(m))
            .collect::<Result<Vec<_>, _>>()?;
        let comments = tag.comments.into_iter().map(comment_node).collect();

        if tag.self_closing || is_void_element(&tag.name) {
            self.push_statement(Statement::Element(ElementNode {
                tag: tag.name,
                attributes,
                modifiers,
                comments,
                children: Vec::new(),
                block_params,
                self_closing: tag.self_closing,
                loc: tag.span,
            }));
        } else {
            self.stack.push(Frame::Element {
                tag: tag.name,
                attributes,
                modifiers,
                comments,
                block_params,
                start: tag.span.start,
                children: Vec::new(),
            });
        }
        Ok(())
    }

    fn handle_end_tag(&mut self, tag: EndTag) -> Result<(), ParseError> {
        match self.stack.pop() {
            Some(Frame::Element {
                tag: open_name,
                attributes,
                modifiers,
                comments,
                block_params,
                start,
                children,
            }) => {
                if open_name != tag.name {
                    return Err(ParseError::syntax(
                        tag.span.start,
                        format!(
                            "closing tag </{}> does not match last open tag <{open_name}>",
                            tag.name
                        ),
                    ));
                }
                self.push_statement(Statement::Element(ElementNode {
                    tag: open_name,
                    attributes,
                    modifiers,
                    comments,
                    children,
                    block_params,
                    self_closing: false,
                    loc: Span::new(start, tag.span.end),
                }));
                Ok(())
            }
            Some(Frame::Block { name, start, .. }) => Err(ParseError::syntax(
                start,
                format!("unclosed block {{{{#{name}}}}}"),
            )),
            None => Err(ParseError::syntax(
                tag.span.start,
                format!("closing tag </{}> without an open element", tag.name),
            )),
        }
    }

    // --- Node conversion ---

    fn mustache_statement(&self, raw: RawMustache) -> Result<MustacheStatement, ParseError> {
        let call = ExprParser::call_parts(&raw.content, raw.content_start)?;
        Ok(MustacheStatement {
            path: call.path,
            params: call.params,
            hash: call.hash,
            escaped: raw.escaped,
            strip: raw.strip,
            loc: raw.span,
        })
    }

    fn modifier_node(&self, raw: RawMustache) -> Result<ElementModifierNode, ParseError> {
        match classify(&raw) {
            MustacheKind::Expr => {
                let CallParts { path, params, hash } =
                    ExprParser::call_parts(&raw.content, raw.content_start)?;
                Ok(ElementModifierNode {
                    path,
                    params,
                    hash,
                    loc: raw.span,
                })
            }
            MustacheKind::Partial => Err(unsupported(&raw, "Partials")),
            MustacheKind::PartialBlock => Err(unsupported(&raw, "Partial blocks")),
            MustacheKind::Decorator => Err(unsupported(&raw, "Decorators")),
            MustacheKind::DecoratorBlock => Err(unsupported(&raw, "Decorator blocks")),
            _ => Err(ParseError::syntax(
                raw.span.start,
                "a block may not be used as an element modifier".into(),
            )),
        }
    }

    fn attr_node(&self, token: AttrToken) -> Result<AttrNode, ParseError> {
        let mut parts = Vec::with_capacity(token.parts.len());
        for part in token.parts {
            match part {
                AttrPart::Text { chars, span } => {
                    parts.push(ConcatPart::Text(TextNode::new(chars, span)));
                }
                AttrPart::Mustache(raw) => match classify(&raw) {
                    MustacheKind::Expr => {
                        parts.push(ConcatPart::Mustache(self.mustache_statement(raw)?));
                    }
                    MustacheKind::Partial => return Err(unsupported(&raw, "Partials")),
                    MustacheKind::PartialBlock => {
                        return Err(unsupported(&raw, "Partial blocks"))
                    }
                    MustacheKind::Decorator => return Err(unsupported(&raw, "Decorators")),
                    MustacheKind::DecoratorBlock => {
                        return Err(unsupported(&raw, "Decorator blocks"))
                    }
                    _ => {
                        return Err(ParseError::syntax(
                            raw.span.start,
                            "a block may not be used inside an attribute value".into(),
                        ));
                    }
                },
            }
        }

        // Collapsing rule: a single interpolation with no literal text is a
        // bare mustache; any mix (or multiple parts) is a concat; everything
        // else, including empty and bare values, is text.
        let value = if parts.is_empty() {
            AttrValue::Text(TextNode::new(
                String::new(),
                Span::new(token.span.end, token.span.end),
            ))
        } else if parts.len() == 1 {
            match parts.remove(0) {
                ConcatPart::Text(t) => AttrValue::Text(t),
                ConcatPart::Mustache(m) => AttrValue::Mustache(m),
            }
        } else {
            let loc = Span::new(part_loc(&parts[0]).start, part_loc(&parts[parts.len() - 1]).end);
            AttrValue::Concat(ConcatStatement { parts, loc })
        };

        Ok(AttrNode {
            name: token.name,
            value,
            loc: token.span,
        })
    }
}

fn part_loc(part: &ConcatPart) -> Span {
    match part {
        ConcatPart::Text(t) => t.loc,
        ConcatPart::Mustache(m) => m.loc,
    }
}

/// Extract element block params (`as |a b|`) from the attribute token list.
/// The clause must be the final run of attributes: a bare `as` followed by
/// pipe-delimited bare names.
fn extract_block_params(attrs: &mut Vec<AttrToken>) -> Result<Vec<String>, ParseError> {
    let Some(as_index) = attrs
        .iter()
        .position(|a| a.name == "as" && a.parts.is_empty())
    else {
        return Ok(Vec::new());
    };
    let error_at = attrs[as_index].span.start;
    let invalid =
        || ParseError::syntax(error_at, "invalid block parameters syntax".into());

    let rest = &attrs[as_index + 1..];
    if rest.is_empty() || rest.iter().any(|a| !a.parts.is_empty()) {
        return Err(invalid());
    }

    let joined = rest
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let inner = joined
        .strip_prefix('|')
        .and_then(|j| j.strip_suffix('|'))
        .ok_or_else(invalid)?;
    if inner.contains('|') {
        return Err(invalid());
    }

    let params: Vec<String> = inner.split_whitespace().map(str::to_string).collect();
    if params.is_empty()
        || params.iter().any(|p| {
            !p.chars()
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_')
        })
    {
        return Err(invalid());
    }

    attrs.truncate(as_index);
    Ok(params)
}
