//! An incremental, error-tolerant LR parsing runtime.
//!
//! A [`Language`] wraps an immutable parse table. A [`Parser`] turns text into
//! a [`Tree`] of concrete syntax, recording syntax errors as `ERROR` and
//! `MISSING` nodes instead of failing. After the text changes, the old tree is
//! [edited](Tree::edit) to match and handed back to the parser, which reuses
//! every subtree it can prove unaffected. Trees are immutable and share
//! unchanged subtrees, so old and new versions stay cheap to keep around and
//! can be read from many threads at once.
//!
//! Tables can be built at runtime with [`GrammarBuilder`], supplied as a
//! [`LanguageTable`], or provided by any type implementing [`ParseTable`].

// Tier 0: Pure leaf utilities
mod error_costs;
mod length;
mod point;
mod unicode;

// Tier 1: Core data structure
mod subtree;

// Tier 2: Components depending on subtree
mod error;
mod language;
mod lex_table;
mod lexer;
mod stack;

// Tier 3: Tree navigation
mod get_changed_ranges;
mod node;
mod tree;
mod tree_cursor;

// Tier 4: The engine
mod grammar;
mod parser;

// Internal helpers
mod reduce_action;
mod reusable_node;

pub use error::{GrammarError, InvalidEditReason, LanguageError, ParseError};
pub use grammar::GrammarBuilder;
pub use language::{
    ExternalScanner, FieldId, FieldMapEntry, Language, LanguageTable, LexMode, ParseAction,
    ParseTable, StateId, Symbol, SymbolMetadata, BUILTIN_SYM_END, BUILTIN_SYM_ERROR,
    LANGUAGE_VERSION, MIN_COMPATIBLE_LANGUAGE_VERSION, START_STATE,
};
pub use length::Length;
pub use lex_table::{LexTable, DEFAULT_SKIP_PATTERN};
pub use lexer::{next_token, ExternalScannerState, Lexer, Token, Tokens};
pub use node::{Descendants, Node};
pub use parser::{LogType, Logger, ParseOptions, Parser, MAX_INPUT_LENGTH};
pub use point::Point;
pub use streaming_iterator::StreamingIterator;
pub use tree::{InputEdit, Range, Tree};
pub use tree_cursor::TreeCursor;

pub use error_costs::ERROR_STATE;
