use crate::token::{
    AttrPart, AttrToken, EndTag, Position, RawComment, RawMustache, Span, StartTag, StripFlags,
    Token,
};
use crate::LexerError;

/// Tokenizer states, a restricted HTML5-tokenizer subset.
///
/// Mustache delimiters can interrupt every state; the interpretation of the
/// interruption (content token, element modifier, attribute value part,
/// element comment, or a fatal diagnostic) depends on the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    TagOpen,
    TagName,
    EndTagOpen,
    EndTagName,
    AfterEndTagName,
    BeforeAttributeName,
    AttributeName,
    AfterAttributeName,
    BeforeAttributeValue,
    AttributeValueDoubleQuoted,
    AttributeValueSingleQuoted,
    AttributeValueUnquoted,
    AfterAttributeValueQuoted,
    SelfClosingStartTag,
}

/// Common named character references. Unknown or malformed references pass
/// through as literal text.
const ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("copy", '\u{a9}'),
    ("reg", '\u{ae}'),
    ("trade", '\u{2122}'),
    ("mdash", '\u{2014}'),
    ("ndash", '\u{2013}'),
    ("hellip", '\u{2026}'),
    ("laquo", '\u{ab}'),
    ("raquo", '\u{bb}'),
    ("middot", '\u{b7}'),
    ("times", '\u{d7}'),
];

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = if let Some(hex) = num.strip_prefix(['x', 'X']) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            num.parse::<u32>().ok()?
        };
        return char::from_u32(code);
    }
    ENTITIES.iter().find(|(n, _)| *n == name).map(|(_, c)| *c)
}

/// A start or end tag under construction.
struct PendingTag {
    name: String,
    start: Position,
    attributes: Vec<AttrToken>,
    modifiers: Vec<RawMustache>,
    comments: Vec<RawComment>,
    is_end: bool,
}

impl PendingTag {
    fn new(start: Position, is_end: bool) -> Self {
        Self {
            name: String::new(),
            start,
            attributes: Vec::new(),
            modifiers: Vec::new(),
            comments: Vec::new(),
            is_end,
        }
    }
}

/// An attribute under construction. `text`/`text_start`/`text_end` buffer the
/// current literal run of the value; mustache parts flush it.
struct PendingAttr {
    name: String,
    parts: Vec<AttrPart>,
    start: Position,
    name_end: Position,
    text: String,
    text_start: Position,
    text_end: Position,
}

impl PendingAttr {
    fn new(start: Position) -> Self {
        Self {
            name: String::new(),
            parts: Vec::new(),
            start,
            name_end: start,
            text: String::new(),
            text_start: start,
            text_end: start,
        }
    }
}

/// A collected `{{…}}` construct: either expression content or an
/// expression-language comment.
enum Mustached {
    Expr(RawMustache),
    Comment(RawComment),
}

/// Braid source scanner.
///
/// Tokenizes template source into a stream of structural tokens: text runs,
/// HTML comments, assembled start/end tags, and raw mustache payloads.
/// Mustache interiors are collected verbatim (quote-aware) and parsed by the
/// downstream expression parser; the scanner only distinguishes comments
/// from expression content, which it needs for state-dependent dispatch.
pub struct Tokenizer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    state: State,
    tag_start: Position,
    pending_tag: Option<PendingTag>,
    pending_attr: Option<PendingAttr>,
    text: String,
    text_start: Position,
    text_end: Position,
}

impl Tokenizer {
    /// Create a new tokenizer for the given source.
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 0,
            tokens: Vec::new(),
            state: State::Data,
            tag_start: Position::start(),
            pending_tag: None,
            pending_attr: None,
            text: String::new(),
            text_start: Position::start(),
            text_end: Position::start(),
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, LexerError> {
        let mut tokenizer = Tokenizer::new(source);
        tokenizer.scan_tokens()?;
        Ok(tokenizer.tokens)
    }

    fn scan_tokens(&mut self) -> Result<(), LexerError> {
        while !self.is_at_end() {
            match self.state {
                State::Data => self.scan_data()?,
                State::TagOpen => self.scan_tag_open()?,
                State::TagName => self.scan_tag_name()?,
                State::EndTagOpen => self.scan_end_tag_open()?,
                State::EndTagName => self.scan_end_tag_name()?,
                State::AfterEndTagName => self.scan_after_end_tag_name()?,
                State::BeforeAttributeName => self.scan_before_attribute_name()?,
                State::AttributeName => self.scan_attribute_name()?,
                State::AfterAttributeName => self.scan_after_attribute_name()?,
                State::BeforeAttributeValue => self.scan_before_attribute_value()?,
                State::AttributeValueDoubleQuoted => self.scan_attribute_value_quoted('"')?,
                State::AttributeValueSingleQuoted => self.scan_attribute_value_quoted('\'')?,
                State::AttributeValueUnquoted => self.scan_attribute_value_unquoted()?,
                State::AfterAttributeValueQuoted => self.scan_after_attribute_value_quoted()?,
                State::SelfClosingStartTag => self.scan_self_closing_start_tag()?,
            }
        }

        if self.state != State::Data {
            return Err(self.syntax_error(self.position(), "unexpected end of file in tag".into()));
        }
        self.flush_text();
        self.tokens.push(Token::Eof {
            position: self.position(),
        });
        Ok(())
    }

    // --- States ---

    fn scan_data(&mut self) -> Result<(), LexerError> {
        if self.at_mustache() {
            match self.collect_mustache()? {
                Mustached::Expr(m) => self.push_token(Token::Mustache(m)),
                Mustached::Comment(c) => self.push_token(Token::MustacheComment(c)),
            }
            return Ok(());
        }

        let c = self.peek();
        match c {
            '<' => {
                self.tag_start = self.position();
                self.advance();
                self.state = State::TagOpen;
            }
            '&' => self.scan_text_entity(),
            _ => {
                let start = self.position();
                self.advance();
                self.text_push(c, start);
            }
        }
        Ok(())
    }

    fn scan_tag_open(&mut self) -> Result<(), LexerError> {
        if self.at_mustache() {
            return self.mustache_in_tag_name();
        }

        let c = self.peek();
        match c {
            '!' => {
                if self.peek_at(1) == '-' && self.peek_at(2) == '-' {
                    self.advance();
                    self.advance();
                    self.advance();
                    self.scan_comment_body()
                } else {
                    Err(self.syntax_error(
                        self.tag_start,
                        "invalid markup declaration, expected '<!--'".into(),
                    ))
                }
            }
            '/' => {
                self.advance();
                self.state = State::EndTagOpen;
                Ok(())
            }
            c if c.is_ascii_alphabetic() || c == ':' => {
                self.pending_tag = Some(PendingTag::new(self.tag_start, false));
                self.state = State::TagName;
                Ok(())
            }
            _ => {
                // A `<` that begins no construct is literal text.
                self.text_push('<', self.tag_start);
                self.state = State::Data;
                Ok(())
            }
        }
    }

    fn scan_tag_name(&mut self) -> Result<(), LexerError> {
        if self.at_mustache() {
            return self.mustache_in_tag_name();
        }

        let c = self.peek();
        match c {
            c if c.is_whitespace() => {
                self.advance();
                self.state = State::BeforeAttributeName;
            }
            '/' => {
                self.advance();
                self.state = State::SelfClosingStartTag;
            }
            '>' => {
                self.advance();
                self.finish_tag(false);
            }
            _ => {
                self.tag_mut().name.push(c);
                self.advance();
            }
        }
        Ok(())
    }

    fn scan_end_tag_open(&mut self) -> Result<(), LexerError> {
        if self.at_mustache() {
            return self.mustache_in_tag_name();
        }

        let c = self.peek();
        if c.is_ascii_alphabetic() || c == ':' {
            self.pending_tag = Some(PendingTag::new(self.tag_start, true));
            self.state = State::EndTagName;
            Ok(())
        } else {
            Err(self.syntax_error(
                self.position(),
                format!("unexpected character '{c}' after '</'"),
            ))
        }
    }

    fn scan_end_tag_name(&mut self) -> Result<(), LexerError> {
        if self.at_mustache() {
            return self.mustache_in_tag_name();
        }

        let c = self.peek();
        match c {
            c if c.is_whitespace() => {
                self.advance();
                self.state = State::AfterEndTagName;
            }
            '>' => {
                self.advance();
                self.finish_tag(false);
            }
            _ => {
                self.tag_mut().name.push(c);
                self.advance();
            }
        }
        Ok(())
    }

    fn scan_after_end_tag_name(&mut self) -> Result<(), LexerError> {
        let c = self.peek();
        match c {
            c if c.is_whitespace() => {
                self.advance();
                Ok(())
            }
            '>' => {
                self.advance();
                self.finish_tag(false);
                Ok(())
            }
            _ => Err(self.syntax_error(
                self.position(),
                format!("unexpected character '{c}' in end tag"),
            )),
        }
    }

    fn scan_before_attribute_name(&mut self) -> Result<(), LexerError> {
        if self.at_mustache() {
            return self.attr_space_mustache();
        }

        let c = self.peek();
        match c {
            c if c.is_whitespace() => {
                self.advance();
            }
            '/' => {
                self.advance();
                self.state = State::SelfClosingStartTag;
            }
            '>' => {
                self.advance();
                self.finish_tag(false);
            }
            '"' | '\'' | '<' => {
                return Err(self.invalid_attribute_name_char(c));
            }
            '=' => {
                return Err(self.syntax_error(
                    self.position(),
                    "attribute name cannot start with equals sign".into(),
                ));
            }
            _ => {
                self.pending_attr = Some(PendingAttr::new(self.position()));
                self.state = State::AttributeName;
            }
        }
        Ok(())
    }

    fn scan_attribute_name(&mut self) -> Result<(), LexerError> {
        if self.at_mustache() {
            // The mustache finishes the attribute with an empty value and
            // becomes an element modifier.
            let end = self.position();
            match self.collect_mustache()? {
                Mustached::Expr(m) => {
                    self.finish_attr(end);
                    self.tag_mut().modifiers.push(m);
                    self.state = State::BeforeAttributeName;
                    return Ok(());
                }
                Mustached::Comment(c) => {
                    return Err(self.comment_in_state(&c, "attributeName"));
                }
            }
        }

        let c = self.peek();
        match c {
            c if c.is_whitespace() => {
                self.attr_mut().name_end = self.position();
                self.advance();
                self.state = State::AfterAttributeName;
            }
            '=' => {
                self.attr_mut().name_end = self.position();
                self.advance();
                self.state = State::BeforeAttributeValue;
            }
            '/' => {
                let end = self.position();
                self.finish_attr(end);
                self.advance();
                self.state = State::SelfClosingStartTag;
            }
            '>' => {
                let end = self.position();
                self.finish_attr(end);
                self.advance();
                self.finish_tag(false);
            }
            '"' | '\'' | '<' => {
                return Err(self.invalid_attribute_name_char(c));
            }
            _ => {
                self.attr_mut().name.push(c);
                self.advance();
            }
        }
        Ok(())
    }

    fn scan_after_attribute_name(&mut self) -> Result<(), LexerError> {
        if self.at_mustache() {
            let end = self.attr_mut().name_end;
            self.finish_attr(end);
            return self.attr_space_mustache();
        }

        let c = self.peek();
        match c {
            c if c.is_whitespace() => {
                self.advance();
            }
            '=' => {
                self.advance();
                self.state = State::BeforeAttributeValue;
            }
            '/' => {
                let end = self.attr_mut().name_end;
                self.finish_attr(end);
                self.advance();
                self.state = State::SelfClosingStartTag;
            }
            '>' => {
                let end = self.attr_mut().name_end;
                self.finish_attr(end);
                self.advance();
                self.finish_tag(false);
            }
            '"' | '\'' | '<' => {
                return Err(self.invalid_attribute_name_char(c));
            }
            _ => {
                // A bare attribute followed by the start of another.
                let end = self.attr_mut().name_end;
                self.finish_attr(end);
                self.pending_attr = Some(PendingAttr::new(self.position()));
                self.state = State::AttributeName;
            }
        }
        Ok(())
    }

    fn scan_before_attribute_value(&mut self) -> Result<(), LexerError> {
        if self.at_mustache() {
            match self.collect_mustache()? {
                Mustached::Expr(m) => {
                    self.attr_mut().parts.push(AttrPart::Mustache(m));
                    self.state = State::AttributeValueUnquoted;
                    return Ok(());
                }
                Mustached::Comment(c) => {
                    return Err(self.comment_in_state(&c, "beforeAttributeValue"));
                }
            }
        }

        let c = self.peek();
        match c {
            c if c.is_whitespace() => {
                self.advance();
            }
            '"' => {
                self.advance();
                self.state = State::AttributeValueDoubleQuoted;
            }
            '\'' => {
                self.advance();
                self.state = State::AttributeValueSingleQuoted;
            }
            '>' => {
                let end = self.position();
                self.finish_attr(end);
                self.advance();
                self.finish_tag(false);
            }
            _ => {
                self.state = State::AttributeValueUnquoted;
            }
        }
        Ok(())
    }

    fn scan_attribute_value_quoted(&mut self, quote: char) -> Result<(), LexerError> {
        if self.at_mustache() {
            let state_name = if quote == '"' {
                "attributeValueDoubleQuoted"
            } else {
                "attributeValueSingleQuoted"
            };
            match self.collect_mustache()? {
                Mustached::Expr(m) => {
                    self.flush_attr_text();
                    self.attr_mut().parts.push(AttrPart::Mustache(m));
                    return Ok(());
                }
                Mustached::Comment(c) => {
                    return Err(self.comment_in_state(&c, state_name));
                }
            }
        }

        let c = self.peek();
        if c == quote {
            self.flush_attr_text();
            self.advance();
            let end = self.position();
            self.finish_attr(end);
            self.state = State::AfterAttributeValueQuoted;
        } else if c == '&' {
            self.scan_attr_entity();
        } else {
            let start = self.position();
            self.advance();
            self.attr_text_push(c, start);
        }
        Ok(())
    }

    fn scan_attribute_value_unquoted(&mut self) -> Result<(), LexerError> {
        if self.at_mustache() {
            match self.collect_mustache()? {
                Mustached::Expr(m) => {
                    self.flush_attr_text();
                    self.attr_mut().parts.push(AttrPart::Mustache(m));
                    return Ok(());
                }
                Mustached::Comment(c) => {
                    return Err(self.comment_in_state(&c, "attributeValueUnquoted"));
                }
            }
        }

        let c = self.peek();
        match c {
            c if c.is_whitespace() => {
                self.flush_attr_text();
                let end = self.position();
                self.finish_attr(end);
                self.advance();
                self.state = State::BeforeAttributeName;
            }
            '>' => {
                self.flush_attr_text();
                let end = self.position();
                self.finish_attr(end);
                self.advance();
                self.finish_tag(false);
            }
            '/' if self.peek_at(1) == '>' => {
                self.flush_attr_text();
                let end = self.position();
                self.finish_attr(end);
                self.advance();
                self.state = State::SelfClosingStartTag;
            }
            '&' => self.scan_attr_entity(),
            _ => {
                let start = self.position();
                self.advance();
                self.attr_text_push(c, start);
            }
        }
        Ok(())
    }

    fn scan_after_attribute_value_quoted(&mut self) -> Result<(), LexerError> {
        if self.at_mustache() {
            match self.collect_mustache()? {
                Mustached::Expr(m) => {
                    self.tag_mut().modifiers.push(m);
                    self.state = State::BeforeAttributeName;
                    return Ok(());
                }
                Mustached::Comment(c) => {
                    return Err(self.comment_in_state(&c, "afterAttributeValueQuoted"));
                }
            }
        }

        let c = self.peek();
        match c {
            c if c.is_whitespace() => {
                self.advance();
                self.state = State::BeforeAttributeName;
            }
            '/' => {
                self.advance();
                self.state = State::SelfClosingStartTag;
            }
            '>' => {
                self.advance();
                self.finish_tag(false);
            }
            _ => {
                // Reconsume; invalid characters are rejected there.
                self.state = State::BeforeAttributeName;
            }
        }
        Ok(())
    }

    fn scan_self_closing_start_tag(&mut self) -> Result<(), LexerError> {
        if self.peek() == '>' {
            self.advance();
            self.finish_tag(true);
        } else {
            // Stray solidus; reconsume in attribute space.
            self.state = State::BeforeAttributeName;
        }
        Ok(())
    }

    // --- Mustache collection ---

    /// Collect a `{{…}}`, `{{{…}}}`, `{{! … }}`, or `{{!-- … --}}` construct
    /// starting at the opening delimiter. String literals inside expression
    /// content are skipped verbatim, so a `}}` inside quotes does not close
    /// the mustache.
    fn collect_mustache(&mut self) -> Result<Mustached, LexerError> {
        let start = self.position();
        self.advance();
        self.advance();

        let mut escaped = true;
        if self.peek() == '{' {
            escaped = false;
            self.advance();
        }

        let mut strip = StripFlags::default();
        if self.peek() == '~' {
            strip.open = true;
            self.advance();
        }

        if escaped && self.peek() == '!' {
            return self.collect_mustache_comment(start, strip);
        }

        let close: &[char] = if escaped {
            &['}', '}']
        } else {
            &['}', '}', '}']
        };

        let content_start = self.position();
        let mut content = String::new();
        loop {
            if self.is_at_end() {
                return Err(self.syntax_error(start, "unterminated mustache expression".into()));
            }
            let c = self.peek();
            if c == '"' || c == '\'' {
                content.push(c);
                self.advance();
                while !self.is_at_end() && self.peek() != c {
                    if self.peek() == '\\' {
                        content.push('\\');
                        self.advance();
                        if self.is_at_end() {
                            break;
                        }
                    }
                    content.push(self.peek());
                    self.advance();
                }
                if self.is_at_end() {
                    return Err(
                        self.syntax_error(start, "unterminated mustache expression".into())
                    );
                }
                content.push(c);
                self.advance();
            } else if c == '~' && self.peek_chars_at(1, close) {
                strip.close = true;
                self.advance();
                for _ in 0..close.len() {
                    self.advance();
                }
                break;
            } else if self.peek_chars_at(0, close) {
                for _ in 0..close.len() {
                    self.advance();
                }
                break;
            } else {
                content.push(c);
                self.advance();
            }
        }

        Ok(Mustached::Expr(RawMustache {
            content,
            content_start,
            escaped,
            strip,
            span: Span::new(start, self.position()),
        }))
    }

    fn collect_mustache_comment(
        &mut self,
        start: Position,
        mut strip: StripFlags,
    ) -> Result<Mustached, LexerError> {
        self.advance(); // consume `!`
        let long = self.peek() == '-' && self.peek_at(1) == '-';
        if long {
            self.advance();
            self.advance();
        }

        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(self.syntax_error(start, "unterminated mustache comment".into()));
            }
            let closed = if long {
                if self.peek_str("--}}") {
                    self.advance_by(4);
                    true
                } else if self.peek_str("--~}}") {
                    strip.close = true;
                    self.advance_by(5);
                    true
                } else {
                    false
                }
            } else if self.peek_str("}}") {
                self.advance_by(2);
                true
            } else if self.peek_str("~}}") {
                strip.close = true;
                self.advance_by(3);
                true
            } else {
                false
            };
            if closed {
                break;
            }
            value.push(self.peek());
            self.advance();
        }

        Ok(Mustached::Comment(RawComment {
            value,
            strip,
            span: Span::new(start, self.position()),
        }))
    }

    /// Mustache or comment in attribute space: the former is an element
    /// modifier, the latter an element comment.
    fn attr_space_mustache(&mut self) -> Result<(), LexerError> {
        match self.collect_mustache()? {
            Mustached::Expr(m) => self.tag_mut().modifiers.push(m),
            Mustached::Comment(c) => self.tag_mut().comments.push(c),
        }
        self.state = State::BeforeAttributeName;
        Ok(())
    }

    // --- HTML comments ---

    fn scan_comment_body(&mut self) -> Result<(), LexerError> {
        let start = self.tag_start;
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(self.syntax_error(start, "unterminated comment".into()));
            }
            if self.peek_str("-->") {
                self.advance_by(3);
                break;
            }
            value.push(self.peek());
            self.advance();
        }
        self.push_token(Token::Comment {
            value,
            span: Span::new(start, self.position()),
        });
        self.state = State::Data;
        Ok(())
    }

    // --- Entities ---

    fn scan_text_entity(&mut self) {
        let start = self.position();
        if let Some(decoded) = self.scan_entity() {
            self.text_push(decoded, start);
        } else {
            self.advance();
            self.text_push('&', start);
        }
    }

    fn scan_attr_entity(&mut self) {
        let start = self.position();
        if let Some(decoded) = self.scan_entity() {
            self.attr_text_push(decoded, start);
        } else {
            self.advance();
            self.attr_text_push('&', start);
        }
    }

    /// Try to consume a character reference at the current `&`. Returns the
    /// decoded character, or `None` (nothing consumed) when the reference is
    /// unknown or malformed.
    fn scan_entity(&mut self) -> Option<char> {
        let mut j = self.pos + 1;
        let mut name = String::new();
        while j < self.chars.len() && name.len() < 24 {
            let c = self.chars[j];
            if c == ';' {
                let decoded = decode_entity(&name)?;
                self.advance_by(name.len() + 2);
                return Some(decoded);
            }
            if c.is_ascii_alphanumeric() || c == '#' {
                name.push(c);
                j += 1;
            } else {
                return None;
            }
        }
        None
    }

    // --- Token assembly ---

    /// Flush buffered text and push a structural token.
    fn push_token(&mut self, token: Token) {
        self.flush_text();
        self.tokens.push(token);
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let chars = std::mem::take(&mut self.text);
            self.tokens.push(Token::Text {
                chars,
                span: Span::new(self.text_start, self.text_end),
            });
        }
    }

    fn text_push(&mut self, c: char, start: Position) {
        if self.text.is_empty() {
            self.text_start = start;
        }
        self.text.push(c);
        self.text_end = self.position();
    }

    fn attr_text_push(&mut self, c: char, start: Position) {
        let end = self.position();
        let attr = self.attr_mut();
        if attr.text.is_empty() {
            attr.text_start = start;
        }
        attr.text.push(c);
        attr.text_end = end;
    }

    fn flush_attr_text(&mut self) {
        let attr = self.attr_mut();
        if !attr.text.is_empty() {
            let chars = std::mem::take(&mut attr.text);
            let span = Span::new(attr.text_start, attr.text_end);
            attr.parts.push(AttrPart::Text { chars, span });
        }
    }

    fn finish_attr(&mut self, end: Position) {
        let attr = self
            .pending_attr
            .take()
            .expect("no attribute in progress");
        self.tag_mut().attributes.push(AttrToken {
            name: attr.name,
            parts: attr.parts,
            span: Span::new(attr.start, end),
        });
    }

    fn finish_tag(&mut self, self_closing: bool) {
        let tag = self.pending_tag.take().expect("no tag in progress");
        let span = Span::new(tag.start, self.position());
        if tag.is_end {
            self.push_token(Token::EndTag(EndTag {
                name: tag.name,
                span,
            }));
        } else {
            self.push_token(Token::StartTag(StartTag {
                name: tag.name,
                attributes: tag.attributes,
                modifiers: tag.modifiers,
                comments: tag.comments,
                self_closing,
                span,
            }));
        }
        self.state = State::Data;
    }

    // --- Errors ---

    fn syntax_error(&self, pos: Position, message: String) -> LexerError {
        LexerError {
            message: format!(
                "Syntax error at line {} col {}: {message}",
                pos.line, pos.column
            ),
            line: pos.line,
            column: pos.column,
        }
    }

    fn invalid_attribute_name_char(&self, c: char) -> LexerError {
        self.syntax_error(
            self.position(),
            format!("{c} is not a valid character within attribute names"),
        )
    }

    fn comment_in_state(&self, comment: &RawComment, state_name: &str) -> LexerError {
        let pos = comment.span.start;
        LexerError {
            message: format!(
                "Using a mustache comment when in the `{state_name}` state is not supported: \"{}\" on line {}:{}",
                comment.value, pos.line, pos.column
            ),
            line: pos.line,
            column: pos.column,
        }
    }

    /// Always fails: a mustache was reached while scanning a tag name.
    fn mustache_in_tag_name(&mut self) -> Result<(), LexerError> {
        let (fragment, pos) = match self.collect_mustache()? {
            Mustached::Expr(m) => (m.fragment(), m.span.start),
            Mustached::Comment(c) => (format!("{{{{!{}", c.value), c.span.start),
        };
        Err(LexerError {
            message: format!(
                "Cannot use mustaches in an element's tag name: `{fragment}` at L{}:C{}",
                pos.line, pos.column
            ),
            line: pos.line,
            column: pos.column,
        })
    }

    // --- Helpers ---

    fn tag_mut(&mut self) -> &mut PendingTag {
        self.pending_tag.as_mut().expect("no tag in progress")
    }

    fn attr_mut(&mut self) -> &mut PendingAttr {
        self.pending_attr.as_mut().expect("no attribute in progress")
    }

    fn at_mustache(&self) -> bool {
        self.peek() == '{' && self.peek_at(1) == '{'
    }

    fn peek(&self) -> char {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> char {
        self.chars.get(self.pos + n).copied().unwrap_or('\0')
    }

    fn peek_str(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == c)
    }

    fn peek_chars_at(&self, offset: usize, cs: &[char]) -> bool {
        cs.iter()
            .enumerate()
            .all(|(i, &c)| self.peek_at(offset + i) == c)
    }

    fn advance(&mut self) {
        if let Some(&c) = self.chars.get(self.pos) {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn position(&self) -> Position {
        Position {
            offset: self.pos,
            line: self.line,
            column: self.column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Helper: tokenize and panic on error.
    fn tokens(source: &str) -> Vec<Token> {
        Tokenizer::tokenize(source).unwrap()
    }

    /// Helper: tokenize and return the error message.
    fn error(source: &str) -> String {
        Tokenizer::tokenize(source).unwrap_err().message
    }

    fn first_start_tag(toks: &[Token]) -> &StartTag {
        match &toks[0] {
            Token::StartTag(t) => t,
            other => panic!("Expected StartTag, got {other:?}"),
        }
    }

    // =========================================================================
    // Text and structure
    // =========================================================================

    #[test]
    fn test_empty_source() {
        let toks = tokens("");
        assert_eq!(toks.len(), 1);
        assert!(matches!(toks[0], Token::Eof { .. }));
    }

    #[test]
    fn test_plain_text() {
        let toks = tokens("some content");
        assert!(matches!(&toks[0], Token::Text { chars, .. } if chars == "some content"));
        assert_eq!(toks.len(), 2);
    }

    #[test]
    fn test_text_spans() {
        let toks = tokens("ab\ncd");
        let span = toks[0].span();
        assert_eq!(span.start, Position::new(0, 1, 0));
        assert_eq!(span.end, Position::new(5, 2, 2));
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        let toks = tokens("a < b");
        assert!(matches!(&toks[0], Token::Text { chars, .. } if chars == "a < b"));
    }

    // =========================================================================
    // Tags and attributes
    // =========================================================================

    #[test]
    fn test_simple_element_tags() {
        let toks = tokens("<div></div>");
        assert!(matches!(&toks[0], Token::StartTag(t) if t.name == "div" && !t.self_closing));
        assert!(matches!(&toks[1], Token::EndTag(t) if t.name == "div"));
    }

    #[test]
    fn test_self_closing_tag() {
        let toks = tokens("<g />");
        let tag = first_start_tag(&toks);
        assert_eq!(tag.name, "g");
        assert!(tag.self_closing);
    }

    #[test]
    fn test_quoted_attribute() {
        let toks = tokens("<a href=\"/about\">");
        let tag = first_start_tag(&toks);
        assert_eq!(tag.attributes.len(), 1);
        assert_eq!(tag.attributes[0].name, "href");
        assert!(matches!(
            &tag.attributes[0].parts[0],
            AttrPart::Text { chars, .. } if chars == "/about"
        ));
    }

    #[test]
    fn test_empty_quoted_attribute() {
        let toks = tokens("<img id=\"\">");
        let tag = first_start_tag(&toks);
        assert_eq!(tag.attributes[0].name, "id");
        assert!(tag.attributes[0].parts.is_empty());
    }

    #[test]
    fn test_bare_attribute() {
        let toks = tokens("<input disabled>");
        let tag = first_start_tag(&toks);
        assert_eq!(tag.attributes[0].name, "disabled");
        assert!(tag.attributes[0].parts.is_empty());
    }

    #[test]
    fn test_unquoted_attribute() {
        let toks = tokens("<input foo=1 >");
        let tag = first_start_tag(&toks);
        assert!(matches!(
            &tag.attributes[0].parts[0],
            AttrPart::Text { chars, .. } if chars == "1"
        ));
    }

    #[test]
    fn test_single_quoted_attribute() {
        let toks = tokens("<p class='bar'>");
        let tag = first_start_tag(&toks);
        assert_eq!(tag.attributes[0].name, "class");
        assert!(matches!(
            &tag.attributes[0].parts[0],
            AttrPart::Text { chars, .. } if chars == "bar"
        ));
    }

    #[test]
    fn test_end_tag_with_whitespace() {
        let toks = tokens("<div></div >");
        assert!(matches!(&toks[1], Token::EndTag(t) if t.name == "div"));
    }

    #[test]
    fn test_named_block_tags() {
        let toks = tokens("<:header></:header>");
        assert!(matches!(&toks[0], Token::StartTag(t) if t.name == ":header"));
        assert!(matches!(&toks[1], Token::EndTag(t) if t.name == ":header"));
    }

    // =========================================================================
    // Mustaches in content
    // =========================================================================

    #[test]
    fn test_content_mustache() {
        let toks = tokens("{{content}}");
        match &toks[0] {
            Token::Mustache(m) => {
                assert_eq!(m.content, "content");
                assert!(m.escaped);
                assert_eq!(m.span.start, Position::new(0, 1, 0));
                assert_eq!(m.span.end, Position::new(11, 1, 11));
                assert_eq!(m.content_start, Position::new(2, 1, 2));
            }
            other => panic!("Expected Mustache, got {other:?}"),
        }
    }

    #[test]
    fn test_triple_mustache_unescaped() {
        let toks = tokens("{{{body}}}");
        match &toks[0] {
            Token::Mustache(m) => {
                assert_eq!(m.content, "body");
                assert!(!m.escaped);
            }
            other => panic!("Expected Mustache, got {other:?}"),
        }
    }

    #[test]
    fn test_strip_markers() {
        let toks = tokens("{{~content~}}");
        match &toks[0] {
            Token::Mustache(m) => {
                assert_eq!(m.content, "content");
                assert!(m.strip.open);
                assert!(m.strip.close);
            }
            other => panic!("Expected Mustache, got {other:?}"),
        }
    }

    #[test]
    fn test_quoted_close_delimiter_in_expression() {
        let toks = tokens(r#"{{foo "}}"}}"#);
        match &toks[0] {
            Token::Mustache(m) => assert_eq!(m.content, r#"foo "}}""#),
            other => panic!("Expected Mustache, got {other:?}"),
        }
    }

    #[test]
    fn test_mustache_comment() {
        let toks = tokens("{{! some comment }}");
        match &toks[0] {
            Token::MustacheComment(c) => assert_eq!(c.value, " some comment "),
            other => panic!("Expected MustacheComment, got {other:?}"),
        }
    }

    #[test]
    fn test_long_mustache_comment() {
        let toks = tokens("{{!-- has }} inside --}}");
        match &toks[0] {
            Token::MustacheComment(c) => assert_eq!(c.value, " has }} inside "),
            other => panic!("Expected MustacheComment, got {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_mustache() {
        assert_eq!(
            error("{{foo"),
            "Syntax error at line 1 col 0: unterminated mustache expression"
        );
    }

    // =========================================================================
    // Mustaches in tag space
    // =========================================================================

    #[test]
    fn test_modifier_before_attribute_name() {
        let toks = tokens("<input {{bar}}>");
        let tag = first_start_tag(&toks);
        assert!(tag.attributes.is_empty());
        assert_eq!(tag.modifiers.len(), 1);
        assert_eq!(tag.modifiers[0].content, "bar");
    }

    #[test]
    fn test_modifier_in_attribute_name_state() {
        let toks = tokens("<input foo{{bar}}>");
        let tag = first_start_tag(&toks);
        assert_eq!(tag.attributes.len(), 1);
        assert_eq!(tag.attributes[0].name, "foo");
        assert!(tag.attributes[0].parts.is_empty());
        assert_eq!(tag.modifiers[0].content, "bar");
    }

    #[test]
    fn test_modifier_after_quoted_value() {
        let toks = tokens("<input foo='1'{{bar}}>");
        let tag = first_start_tag(&toks);
        assert_eq!(tag.attributes.len(), 1);
        assert_eq!(tag.modifiers.len(), 1);
    }

    #[test]
    fn test_comments_in_element_space() {
        let toks = tokens("<div {{! a }} data-foo=\"bar\" {{! b }}></div>");
        let tag = first_start_tag(&toks);
        assert_eq!(tag.attributes.len(), 1);
        assert_eq!(tag.comments.len(), 2);
        assert_eq!(tag.comments[0].value, " a ");
        assert_eq!(tag.comments[1].value, " b ");
    }

    #[test]
    fn test_mustache_as_attribute_value() {
        let toks = tokens("<div class={{foo}}>");
        let tag = first_start_tag(&toks);
        assert_eq!(tag.attributes.len(), 1);
        assert!(matches!(
            &tag.attributes[0].parts[0],
            AttrPart::Mustache(m) if m.content == "foo"
        ));
    }

    #[test]
    fn test_mustache_value_then_self_closing() {
        let toks = tokens("<FooBar data-foo={{blah}}/>");
        let tag = first_start_tag(&toks);
        assert!(tag.self_closing);
        assert_eq!(tag.attributes.len(), 1);
        assert!(matches!(
            &tag.attributes[0].parts[0],
            AttrPart::Mustache(m) if m.content == "blah"
        ));
    }

    #[test]
    fn test_mixed_quoted_value_parts() {
        let toks = tokens("<a href=\"http://{{link}}/\">");
        let tag = first_start_tag(&toks);
        let parts = &tag.attributes[0].parts;
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], AttrPart::Text { chars, .. } if chars == "http://"));
        assert!(matches!(&parts[1], AttrPart::Mustache(m) if m.content == "link"));
        assert!(matches!(&parts[2], AttrPart::Text { chars, .. } if chars == "/"));
    }

    // =========================================================================
    // Rejected inputs
    // =========================================================================

    #[test]
    fn test_quote_in_attribute_space() {
        assert_eq!(
            error("<img foo=\"bar\"\" >"),
            "Syntax error at line 1 col 14: \" is not a valid character within attribute names"
        );
    }

    #[test]
    fn test_equals_at_attribute_name_start() {
        assert_eq!(
            error("<img =foo >"),
            "Syntax error at line 1 col 5: attribute name cannot start with equals sign"
        );
    }

    #[test]
    fn test_mustache_in_tag_open() {
        assert_eq!(
            error("<{{\"asdf\"}}></{{\"asdf\"}}>"),
            "Cannot use mustaches in an element's tag name: `{{\"asdf\"` at L1:C1"
        );
    }

    #[test]
    fn test_mustache_in_tag_name() {
        assert_eq!(
            error("<input{{bar}}>"),
            "Cannot use mustaches in an element's tag name: `{{bar` at L1:C6"
        );
    }

    #[test]
    fn test_comment_in_attribute_name_state() {
        assert_eq!(
            error("\nbefore <div \n  a{{! some comment }} data-foo=\"bar\"></div> after"),
            "Using a mustache comment when in the `attributeName` state is not supported: \" some comment \" on line 3:3"
        );
    }

    #[test]
    fn test_comment_in_before_attribute_value_state() {
        assert_eq!(
            error("\nbefore <div \n  a={{! some comment }} data-foo=\"bar\"></div> after"),
            "Using a mustache comment when in the `beforeAttributeValue` state is not supported: \" some comment \" on line 3:4"
        );
    }

    #[test]
    fn test_comment_in_double_quoted_value_state() {
        assert_eq!(
            error("\nbefore <div \n  a=\"{{! some comment }}\" data-foo=\"bar\"></div> after"),
            "Using a mustache comment when in the `attributeValueDoubleQuoted` state is not supported: \" some comment \" on line 3:5"
        );
    }

    #[test]
    fn test_unexpected_eof_in_tag() {
        assert_eq!(
            error("<div foo=\"bar"),
            "Syntax error at line 1 col 13: unexpected end of file in tag"
        );
    }

    #[test]
    fn test_unterminated_comment() {
        assert_eq!(
            error("<!-- nope"),
            "Syntax error at line 1 col 0: unterminated comment"
        );
    }

    // =========================================================================
    // HTML comments
    // =========================================================================

    #[test]
    fn test_html_comment() {
        let toks = tokens("before <!-- some comment --> after");
        assert!(matches!(&toks[0], Token::Text { chars, .. } if chars == "before "));
        assert!(matches!(&toks[1], Token::Comment { value, .. } if value == " some comment "));
        assert!(matches!(&toks[2], Token::Text { chars, .. } if chars == " after"));
    }

    #[test]
    fn test_html_comment_keeps_mustaches_raw() {
        let toks = tokens("<!-- some {{! nested thing }} comment -->");
        assert!(matches!(
            &toks[0],
            Token::Comment { value, .. } if value == " some {{! nested thing }} comment "
        ));
    }

    // =========================================================================
    // Entities
    // =========================================================================

    #[test]
    fn test_named_entity() {
        let toks = tokens("fish &amp; chips");
        assert!(matches!(&toks[0], Token::Text { chars, .. } if chars == "fish & chips"));
    }

    #[test]
    fn test_numeric_entities() {
        let toks = tokens("&#65;&#x41;");
        assert!(matches!(&toks[0], Token::Text { chars, .. } if chars == "AA"));
    }

    #[test]
    fn test_unknown_entity_passes_through() {
        let toks = tokens("&bogus; &;");
        assert!(matches!(&toks[0], Token::Text { chars, .. } if chars == "&bogus; &;"));
    }

    #[test]
    fn test_entity_in_attribute_value() {
        let toks = tokens("<a title=\"a &amp; b\">");
        let tag = first_start_tag(&toks);
        assert!(matches!(
            &tag.attributes[0].parts[0],
            AttrPart::Text { chars, .. } if chars == "a & b"
        ));
    }
}
