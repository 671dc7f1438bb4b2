//! Expression parser for Braid mustache interiors.
//!
//! Parses the raw content collected by the scanner between `{{` and `}}`:
//! call parts (head, positional params, hash pairs), paths with `this`/`@`
//! heads, literals, sub-expressions, and the `as |a b|` block-parameter
//! clause of block openers.
//!
//! The parser tracks absolute source positions, seeded from the mustache's
//! content start, so expression-level diagnostics point into the template.

use crate::ast::{
    ExprKind, Expression, Hash, HashPair, PathExpression, Position, Span, SubExpression,
};
use crate::ParseError;

/// The parsed interior of a mustache, modifier, or block opener.
#[derive(Debug, Clone, PartialEq)]
pub struct CallParts {
    pub path: Expression,
    pub params: Vec<Expression>,
    pub hash: Hash,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// The name a block closer must match: the head's source text.
pub fn head_name(expr: &Expression) -> String {
    match &expr.kind {
        ExprKind::Path(p) => p.original.clone(),
        ExprKind::String(s) => s.clone(),
        ExprKind::Number(n) => n.to_string(),
        ExprKind::Boolean(b) => b.to_string(),
        ExprKind::Null => "null".to_string(),
        ExprKind::Undefined => "undefined".to_string(),
        ExprKind::SubExpr(s) => head_name(&s.path),
    }
}

/// Braid expression parser.
///
/// Operates on a single mustache interior (e.g. the content of
/// `{{foo bar x=1}}`).
pub struct ExprParser {
    chars: Vec<char>,
    pos: usize,
    offset: usize,
    line: usize,
    column: usize,
}

impl ExprParser {
    fn new(content: &str, start: Position) -> Self {
        Self {
            chars: content.chars().collect(),
            pos: 0,
            offset: start.offset,
            line: start.line,
            column: start.column,
        }
    }

    /// Parse a complete mustache/modifier interior.
    pub fn call_parts(content: &str, start: Position) -> Result<CallParts, ParseError> {
        let mut parser = ExprParser::new(content, start);
        parser.skip_whitespace();
        let path = parser.parse_expression()?;
        let (params, hash) = parser.parse_call_tail(None, false)?;
        Ok(CallParts { path, params, hash })
    }

    /// Parse a block opener interior (without the leading `#`), including an
    /// optional trailing `as |a b|` clause.
    pub fn block_open(
        content: &str,
        start: Position,
    ) -> Result<(CallParts, Vec<String>), ParseError> {
        let mut parser = ExprParser::new(content, start);
        parser.skip_whitespace();
        let path = parser.parse_expression()?;
        let (params, hash) = parser.parse_call_tail(None, true)?;
        let block_params = parser.parse_block_params()?;
        Ok((CallParts { path, params, hash }, block_params))
    }

    /// Parse a block closer interior (without the leading `/`) down to the
    /// name the opener must match.
    pub fn close_name(content: &str, start: Position) -> Result<String, ParseError> {
        let mut parser = ExprParser::new(content, start);
        parser.skip_whitespace();
        let expr = parser.parse_expression()?;
        parser.skip_whitespace();
        if !parser.is_at_end() {
            return Err(parser.syntax_error(
                parser.position(),
                "unexpected content in block closing tag".into(),
            ));
        }
        Ok(head_name(&expr))
    }

    // --- Call structure ---

    /// Parse params and hash pairs up to the end of input, a closing `)`
    /// (for sub-expressions), or an `as |…|` clause.
    fn parse_call_tail(
        &mut self,
        terminator: Option<(char, Position)>,
        stop_at_block_params: bool,
    ) -> Result<(Vec<Expression>, Hash), ParseError> {
        let mut params = Vec::new();
        let mut pairs: Vec<HashPair> = Vec::new();

        loop {
            self.skip_whitespace();
            match terminator {
                Some((t, opened_at)) => {
                    if self.is_at_end() {
                        return Err(
                            self.syntax_error(opened_at, "unclosed sub-expression".into())
                        );
                    }
                    if self.peek() == t {
                        self.advance();
                        break;
                    }
                }
                None => {
                    if self.is_at_end() {
                        break;
                    }
                    if stop_at_block_params && self.at_block_params() {
                        break;
                    }
                }
            }

            if let Some(key_len) = self.peek_hash_key() {
                let start = self.position();
                let mut key = String::new();
                for _ in 0..key_len {
                    key.push(self.peek());
                    self.advance();
                }
                self.advance(); // consume `=`
                let value = self.parse_expression()?;
                let loc = Span::new(start, value.loc.end);
                pairs.push(HashPair { key, value, loc });
            } else if !pairs.is_empty() {
                return Err(self.syntax_error(
                    self.position(),
                    "parameters must precede hash arguments".into(),
                ));
            } else {
                params.push(self.parse_expression()?);
            }
        }

        let hash = if pairs.is_empty() {
            Hash::empty(self.position())
        } else {
            let loc = Span::new(pairs[0].loc.start, pairs[pairs.len() - 1].loc.end);
            Hash { pairs, loc }
        };
        Ok((params, hash))
    }

    /// A run of identifier characters directly followed by `=` is a hash
    /// key; returns its length in characters.
    fn peek_hash_key(&self) -> Option<usize> {
        let mut n = 0;
        while is_ident_char(self.peek_at(n)) {
            n += 1;
        }
        if n > 0 && self.peek_at(n) == '=' {
            Some(n)
        } else {
            None
        }
    }

    /// True when the remaining input starts an `as |…|` clause.
    fn at_block_params(&self) -> bool {
        if self.peek_at(0) != 'a' || self.peek_at(1) != 's' || is_ident_char(self.peek_at(2)) {
            return false;
        }
        let mut n = 2;
        while self.peek_at(n) != '\0' && self.peek_at(n).is_whitespace() {
            n += 1;
        }
        self.peek_at(n) == '|'
    }

    fn parse_block_params(&mut self) -> Result<Vec<String>, ParseError> {
        self.skip_whitespace();
        if self.is_at_end() {
            return Ok(Vec::new());
        }

        let clause_start = self.position();
        self.advance(); // `a`
        self.advance(); // `s`
        self.skip_whitespace();
        self.advance(); // `|`

        let mut names = Vec::new();
        loop {
            self.skip_whitespace();
            if self.is_at_end() {
                return Err(self.syntax_error(clause_start, "unclosed block parameters".into()));
            }
            let c = self.peek();
            if c == '|' {
                self.advance();
                break;
            }
            if !is_ident_start(c) {
                return Err(self.syntax_error(
                    self.position(),
                    format!("invalid block parameter name starting with '{c}'"),
                ));
            }
            let mut name = String::new();
            while is_ident_char(self.peek()) {
                name.push(self.peek());
                self.advance();
            }
            names.push(name);
        }
        if names.is_empty() {
            return Err(
                self.syntax_error(clause_start, "expected at least one block parameter".into())
            );
        }

        self.skip_whitespace();
        if !self.is_at_end() {
            return Err(self.syntax_error(
                self.position(),
                "unexpected content after block parameters".into(),
            ));
        }
        Ok(names)
    }

    // --- Expressions ---

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.skip_whitespace();
        if self.is_at_end() {
            return Err(
                self.syntax_error(self.position(), "unexpected end of expression".into())
            );
        }
        let c = self.peek();
        match c {
            '(' => self.parse_sub_expression(),
            '"' | '\'' => self.parse_string(),
            c if c.is_ascii_digit() => self.parse_number(),
            '-' if self.peek_at(1).is_ascii_digit() => self.parse_number(),
            c if is_ident_start(c) || c == '@' => self.parse_path_or_keyword(),
            _ => Err(self.syntax_error(
                self.position(),
                format!("unexpected character '{c}' in expression"),
            )),
        }
    }

    fn parse_sub_expression(&mut self) -> Result<Expression, ParseError> {
        let start = self.position();
        self.advance(); // `(`
        self.skip_whitespace();
        let path = self.parse_expression()?;
        let (params, hash) = self.parse_call_tail(Some((')', start)), false)?;
        let loc = Span::new(start, self.position());
        Ok(Expression {
            kind: ExprKind::SubExpr(SubExpression {
                path: Box::new(path),
                params,
                hash,
            }),
            loc,
        })
    }

    fn parse_string(&mut self) -> Result<Expression, ParseError> {
        let start = self.position();
        let quote = self.peek();
        self.advance();

        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(self.syntax_error(start, "unterminated string literal".into()));
            }
            let c = self.peek();
            if c == quote {
                self.advance();
                break;
            }
            if c == '\\' {
                self.advance();
                if self.is_at_end() {
                    return Err(self.syntax_error(start, "unterminated string literal".into()));
                }
                let e = self.peek();
                match e {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    e if e == quote => value.push(e),
                    e => {
                        value.push('\\');
                        value.push(e);
                    }
                }
                self.advance();
            } else {
                value.push(c);
                self.advance();
            }
        }

        Ok(Expression {
            kind: ExprKind::String(value),
            loc: Span::new(start, self.position()),
        })
    }

    fn parse_number(&mut self) -> Result<Expression, ParseError> {
        let start = self.position();
        let mut text = String::new();
        if self.peek() == '-' {
            text.push('-');
            self.advance();
        }
        while self.peek().is_ascii_digit() || self.peek() == '.' {
            text.push(self.peek());
            self.advance();
        }

        let value: f64 = text
            .parse()
            .map_err(|_| self.syntax_error(start, format!("invalid number '{text}'")))?;
        Ok(Expression {
            kind: ExprKind::Number(value),
            loc: Span::new(start, self.position()),
        })
    }

    fn parse_path_or_keyword(&mut self) -> Result<Expression, ParseError> {
        let start = self.position();
        let data = self.peek() == '@';
        if data {
            self.advance();
            if !is_ident_start(self.peek()) {
                return Err(self.syntax_error(
                    start,
                    "expected a name after the '@' sigil".into(),
                ));
            }
        }

        let first = self.parse_segment();

        // Literal keywords, only as a bare undotted head.
        if !data && self.peek() != '.' {
            let kind = match first.as_str() {
                "true" => Some(ExprKind::Boolean(true)),
                "false" => Some(ExprKind::Boolean(false)),
                "null" => Some(ExprKind::Null),
                "undefined" => Some(ExprKind::Undefined),
                _ => None,
            };
            if let Some(kind) = kind {
                return Ok(Expression {
                    kind,
                    loc: Span::new(start, self.position()),
                });
            }
        }

        let this_head = !data && first == "this";
        let mut parts = Vec::new();
        if !this_head {
            parts.push(first);
        }

        while self.peek() == '.' {
            let dot = self.position();
            self.advance();
            // Numeric segments (`items.0`) are allowed; a dot followed by
            // anything else is a dangling dot.
            if !is_ident_char(self.peek()) {
                return Err(self.dangling_dot(dot));
            }
            parts.push(self.parse_segment());
        }

        let mut original = String::new();
        if data {
            original.push('@');
        }
        if this_head {
            original.push_str("this");
            for part in &parts {
                original.push('.');
                original.push_str(part);
            }
        } else {
            original.push_str(&parts.join("."));
        }

        Ok(Expression {
            kind: ExprKind::Path(PathExpression {
                parts,
                this_head,
                data,
                original,
            }),
            loc: Span::new(start, self.position()),
        })
    }

    fn parse_segment(&mut self) -> String {
        let mut segment = String::new();
        while is_ident_char(self.peek()) {
            segment.push(self.peek());
            self.advance();
        }
        segment
    }

    // --- Errors ---

    fn syntax_error(&self, pos: Position, message: String) -> ParseError {
        ParseError::syntax(pos, message)
    }

    fn dangling_dot(&self, at: Position) -> ParseError {
        ParseError {
            message: format!(
                "'.' is not a supported path; check for a path with a trailing '.' at L{}:C{}",
                at.line, at.column
            ),
            line: at.line,
            column: at.column,
        }
    }

    // --- Helpers ---

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn peek(&self) -> char {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> char {
        self.chars.get(self.pos + n).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if let Some(&c) = self.chars.get(self.pos) {
            self.pos += 1;
            self.offset += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn position(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(content: &str) -> CallParts {
        ExprParser::call_parts(content, Position::new(2, 1, 2)).unwrap()
    }

    fn path_original(expr: &Expression) -> &str {
        match &expr.kind {
            ExprKind::Path(p) => &p.original,
            other => panic!("Expected Path, got {other:?}"),
        }
    }

    // =========================================================================
    // Heads and literals
    // =========================================================================

    #[test]
    fn test_bare_path() {
        let call = parts("content");
        assert_eq!(path_original(&call.path), "content");
        assert!(call.params.is_empty());
        assert!(call.hash.pairs.is_empty());
    }

    #[test]
    fn test_dotted_path() {
        let call = parts("user.name.first");
        match &call.path.kind {
            ExprKind::Path(p) => {
                assert_eq!(p.parts, vec!["user", "name", "first"]);
                assert!(!p.this_head);
                assert!(!p.data);
                assert_eq!(p.original, "user.name.first");
            }
            other => panic!("Expected Path, got {other:?}"),
        }
    }

    #[test]
    fn test_this_path() {
        let call = parts("this.foo");
        match &call.path.kind {
            ExprKind::Path(p) => {
                assert_eq!(p.parts, vec!["foo"]);
                assert!(p.this_head);
                assert_eq!(p.original, "this.foo");
            }
            other => panic!("Expected Path, got {other:?}"),
        }
    }

    #[test]
    fn test_at_name_path() {
        let call = parts("@arg.inner");
        match &call.path.kind {
            ExprKind::Path(p) => {
                assert_eq!(p.parts, vec!["arg", "inner"]);
                assert!(p.data);
                assert_eq!(p.original, "@arg.inner");
            }
            other => panic!("Expected Path, got {other:?}"),
        }
    }

    #[test]
    fn test_numeric_path_segment() {
        let call = parts("items.0.name");
        match &call.path.kind {
            ExprKind::Path(p) => assert_eq!(p.parts, vec!["items", "0", "name"]),
            other => panic!("Expected Path, got {other:?}"),
        }
    }

    #[test]
    fn test_null_head() {
        let call = parts("null");
        assert!(matches!(call.path.kind, ExprKind::Null));
    }

    #[test]
    fn test_undefined_param() {
        let call = parts("foo undefined");
        assert!(matches!(call.params[0].kind, ExprKind::Undefined));
    }

    #[test]
    fn test_literal_params() {
        let call = parts("foo 'content' -2.5 true");
        assert!(matches!(&call.params[0].kind, ExprKind::String(s) if s == "content"));
        assert!(matches!(call.params[1].kind, ExprKind::Number(n) if n == -2.5));
        assert!(matches!(call.params[2].kind, ExprKind::Boolean(true)));
    }

    // =========================================================================
    // Hash and sub-expressions
    // =========================================================================

    #[test]
    fn test_hash_pairs() {
        let call = parts("bind-class isEnabled truthy='enabled'");
        assert_eq!(path_original(&call.path), "bind-class");
        assert_eq!(call.params.len(), 1);
        assert_eq!(call.hash.pairs.len(), 1);
        assert_eq!(call.hash.pairs[0].key, "truthy");
        assert!(
            matches!(&call.hash.pairs[0].value.kind, ExprKind::String(s) if s == "enabled")
        );
    }

    #[test]
    fn test_sub_expression() {
        let call = parts("foo (bar baz x=1)");
        match &call.params[0].kind {
            ExprKind::SubExpr(s) => {
                assert_eq!(path_original(&s.path), "bar");
                assert_eq!(s.params.len(), 1);
                assert_eq!(s.hash.pairs.len(), 1);
            }
            other => panic!("Expected SubExpr, got {other:?}"),
        }
    }

    #[test]
    fn test_param_after_hash_rejected() {
        let err = ExprParser::call_parts("foo a=1 b", Position::new(2, 1, 2)).unwrap_err();
        assert!(err.message.contains("parameters must precede hash arguments"));
    }

    #[test]
    fn test_unclosed_sub_expression() {
        let err = ExprParser::call_parts("foo (bar", Position::new(2, 1, 2)).unwrap_err();
        assert!(err.message.contains("unclosed sub-expression"));
    }

    // =========================================================================
    // Dangling dots
    // =========================================================================

    #[test]
    fn test_dangling_dot_position() {
        // As inside `{{if foo. bar baz}}`: content starts at column 2.
        let err = ExprParser::call_parts("if foo. bar baz", Position::new(2, 1, 2)).unwrap_err();
        assert_eq!(
            err.message,
            "'.' is not a supported path; check for a path with a trailing '.' at L1:C8"
        );
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 8);
    }

    #[test]
    fn test_double_dot_is_dangling() {
        let err = ExprParser::call_parts("foo..bar", Position::new(2, 1, 2)).unwrap_err();
        assert!(err.message.contains("trailing '.'"));
    }

    // =========================================================================
    // Block openers
    // =========================================================================

    #[test]
    fn test_block_open_plain() {
        let (call, block_params) =
            ExprParser::block_open("each items", Position::new(3, 1, 3)).unwrap();
        assert_eq!(path_original(&call.path), "each");
        assert_eq!(call.params.len(), 1);
        assert!(block_params.is_empty());
    }

    #[test]
    fn test_block_open_with_params() {
        let (call, block_params) =
            ExprParser::block_open("each items as |item index|", Position::new(3, 1, 3)).unwrap();
        assert_eq!(path_original(&call.path), "each");
        assert_eq!(block_params, vec!["item", "index"]);
    }

    #[test]
    fn test_as_without_pipes_is_a_param() {
        let (call, block_params) =
            ExprParser::block_open("each items as", Position::new(3, 1, 3)).unwrap();
        assert_eq!(call.params.len(), 2);
        assert!(block_params.is_empty());
    }

    #[test]
    fn test_empty_block_params_rejected() {
        let err = ExprParser::block_open("each as ||", Position::new(3, 1, 3)).unwrap_err();
        assert!(err.message.contains("expected at least one block parameter"));
    }

    // =========================================================================
    // Close names
    // =========================================================================

    #[test]
    fn test_close_name() {
        assert_eq!(
            ExprParser::close_name("if", Position::new(3, 1, 3)).unwrap(),
            "if"
        );
        assert_eq!(
            ExprParser::close_name(" each ", Position::new(3, 1, 3)).unwrap(),
            "each"
        );
    }

    #[test]
    fn test_close_name_rejects_extra_content() {
        let err = ExprParser::close_name("if foo", Position::new(3, 1, 3)).unwrap_err();
        assert!(err.message.contains("unexpected content in block closing tag"));
    }
}
