//! Braid Lexer
//!
//! Tokenizes Braid template source into a stream of structural tokens.
//! A single character-level scanner interleaves two grammars: an HTML-like
//! tag/attribute state machine and the mustache expression delimiters.
//! Mustache interiors are collected verbatim and handed to the parser crate;
//! every token carries an exact source span.
//!
//! # Example
//!
//! ```
//! use braid_lexer::Tokenizer;
//!
//! let tokens = Tokenizer::tokenize("").unwrap();
//! assert_eq!(tokens.len(), 1); // Just EOF
//! ```

pub mod scanner;
pub mod token;

pub use scanner::Tokenizer;
pub use token::{
    is_void_element, AttrPart, AttrToken, EndTag, Position, RawComment, RawMustache, Span,
    StartTag, StripFlags, Token, VOID_ELEMENTS,
};

/// Lexer error with position information.
///
/// The message already embeds the human-readable position in the format the
/// diagnostic was specified with; `line`/`column` carry the same data
/// structurally for tooling. Lines are 1-indexed, columns 0-indexed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}
