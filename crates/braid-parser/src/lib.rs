//! Braid Parser
//!
//! Parses Braid template source — HTML markup interleaved with mustache
//! expressions — into a position-annotated AST for downstream compilers,
//! editors, and linters. Includes the expression parser (for mustache
//! interiors like `user.name` or `(helper arg key=value)`) and the
//! whitespace-control pass.
//!
//! Parsing either produces a [`Program`] or aborts at the first error with
//! a positioned [`ParseError`]; there is no recovery mode.
//!
//! # Example
//!
//! ```
//! use braid_parser::{ast::Statement, Parser};
//!
//! let program = Parser::parse("<p>{{greeting}}</p>").unwrap();
//! assert_eq!(program.body.len(), 1);
//! assert!(matches!(program.body[0], Statement::Element(_)));
//! ```
//!
//! # Whitespace control
//!
//! By default, block boundary tags that stand alone on a line have the
//! line's indentation and trailing newline removed. Set
//! [`ParseOptions::preserve_whitespace`] to keep every text run verbatim:
//!
//! ```
//! use braid_parser::{ParseOptions, Parser};
//!
//! let options = ParseOptions {
//!     preserve_whitespace: true,
//! };
//! let program = Parser::parse_with_options("{{#if a}}\nx\n{{/if}}", options).unwrap();
//! assert_eq!(program.body.len(), 1);
//! ```

pub mod ast;
pub mod expr;
pub mod parser;
pub mod strip;

pub use ast::Program;
pub use parser::Parser;

use braid_lexer::Position;

/// Options recognized by the parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Disable the standalone-line heuristic of the whitespace-control
    /// pass; explicit `~` strip markers still apply.
    pub preserve_whitespace: bool,
}

/// Parser error with position information.
///
/// The message already embeds the human-readable position in the format the
/// diagnostic was specified with; `line`/`column` carry the same data
/// structurally for tooling. Lines are 1-indexed, columns 0-indexed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    /// A generic positioned syntax error.
    pub(crate) fn syntax(pos: Position, message: String) -> Self {
        Self {
            message: format!(
                "Syntax error at line {} col {}: {message}",
                pos.line, pos.column
            ),
            line: pos.line,
            column: pos.column,
        }
    }
}

impl From<braid_lexer::LexerError> for ParseError {
    fn from(e: braid_lexer::LexerError) -> Self {
        Self {
            message: e.message,
            line: e.line,
            column: e.column,
        }
    }
}
