//! Caller-visible failures.
//!
//! Malformed *input text* never shows up here: lexical and syntax errors are
//! absorbed into the tree as `ERROR` and `MISSING` nodes. Only misuse of the
//! API and exhausted resource limits are reported as `Err`.

use std::fmt;

use thiserror::Error;

use crate::language::{StateId, Symbol};

/// Errors returned by [`Parser::parse`](crate::Parser::parse) and
/// [`Parser::reparse`](crate::Parser::reparse).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no language has been assigned to the parser")]
    NoLanguage,

    #[error("invalid edit at index {index}: {reason}")]
    InvalidEdit {
        index: usize,
        reason: InvalidEditReason,
    },

    /// The parse stack outgrew its depth limit, or the input is longer than
    /// the `u32` offsets trees are stored in.
    #[error("resource limit of {limit} exceeded")]
    ResourceExhausted { limit: usize },
}

/// Why an edit list was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidEditReason {
    /// The edit starts before the end of the previous edit's replacement.
    OutOfOrder,
    /// The edit's replaced range intersects the previous edit.
    Overlapping,
    /// `start_byte` is past `old_end_byte` or `new_end_byte`.
    Inverted,
    /// The replaced range runs past the end of the text being edited.
    OutOfBounds,
    /// After all edits the tree length does not match the new text.
    LengthMismatch { expected: usize, actual: usize },
}

impl fmt::Display for InvalidEditReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrder => write!(f, "edits must be sorted by ascending start byte"),
            Self::Overlapping => write!(f, "edit overlaps the previous edit"),
            Self::Inverted => write!(f, "start byte is after an end byte"),
            Self::OutOfBounds => write!(f, "edited range is outside the text"),
            Self::LengthMismatch { expected, actual } => write!(
                f,
                "edited tree covers {expected} bytes but the new text has {actual}"
            ),
        }
    }
}

/// An error that occurred when assigning a table to a parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LanguageError {
    #[error("incompatible language version {0}")]
    Version(u32),

    #[error("invalid parse table: {0}")]
    InvalidTable(String),
}

/// An error that occurred while building a table from grammar rules.
#[derive(Debug, Clone, Error)]
pub enum GrammarError {
    #[error("grammar has no rules")]
    NoRules,

    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),

    #[error("symbol `{0}` is defined more than once")]
    DuplicateSymbol(String),

    #[error("rule `{0}` has no alternatives")]
    EmptyRule(String),

    #[error("cannot parse rule item `{0}`")]
    InvalidItem(String),

    #[error("invalid pattern for `{name}`: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("pattern for `{0}` can match the empty string")]
    EmptyPattern(String),

    #[error("grammar has too many {0} for a 16-bit table")]
    TooLarge(&'static str),

    #[error("conflict in state {state} on `{symbol_name}`: {detail}")]
    Conflict {
        state: StateId,
        symbol: Symbol,
        symbol_name: String,
        detail: String,
    },
}
