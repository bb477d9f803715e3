//! The incremental LR parse loop.
//!
//! A parse walks the input once, token by token. At each position it first
//! tries to take a whole subtree from the previous tree; if none fits it lexes
//! a fresh token. A subtree is only taken when lexing and parsing at that spot
//! would provably rebuild it unchanged, so an incremental parse yields the
//! same tree as parsing the new text from scratch.
//!
//! Syntax errors never abort. When no action applies, a bounded, deterministic
//! search compares assuming a missing token against skipping the offending
//! one, and the choice is recorded in the tree as a `MISSING` leaf or an
//! `ERROR` node.

use std::fmt;

use tracing::trace;

use crate::error::{InvalidEditReason, LanguageError, ParseError};
use crate::error_costs::{
    ERROR_COST_PER_MISSING_TREE, ERROR_COST_PER_SKIPPED_CHAR, ERROR_COST_PER_SKIPPED_LINE,
    ERROR_COST_PER_SKIPPED_TREE,
};
use crate::language::{
    Language, ParseAction, StateId, Symbol, BUILTIN_SYM_END, BUILTIN_SYM_ERROR, START_STATE,
};
use crate::length::Length;
use crate::lexer::{next_token, ExternalScannerState, Lexer};
use crate::reusable_node::ReusableNode;
use crate::stack::{remove_trailing_extras, Stack};
use crate::subtree::Subtree;
use crate::tree::{InputEdit, Tree};

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogType {
    Parse,
    Lex,
}

/// Receives one line per parser decision. Without a logger the same lines go
/// to `tracing` at `TRACE` level.
pub type Logger = Box<dyn FnMut(LogType, &str) + Send>;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Tuning knobs for a parse. The defaults suit editor-sized inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseOptions {
    /// How many tokens a repair must let the parser consume before it is
    /// accepted without looking further. Also bounds how many tokens may be
    /// invented to complete a truncated input.
    pub recovery_window: usize,
    /// Maximum number of stack entries, and of consecutive reductions
    /// without a shift.
    pub max_stack_depth: usize,
    /// Set to `false` to ignore the old tree and parse from scratch.
    pub reuse_nodes: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            recovery_window: 3,
            max_stack_depth: 1 << 16,
            reuse_nodes: true,
        }
    }
}

impl ParseOptions {
    #[must_use]
    pub fn with_recovery_window(mut self, recovery_window: usize) -> Self {
        self.recovery_window = recovery_window;
        self
    }

    #[must_use]
    pub fn with_max_stack_depth(mut self, max_stack_depth: usize) -> Self {
        self.max_stack_depth = max_stack_depth;
        self
    }

    #[must_use]
    pub fn with_reuse_nodes(mut self, reuse_nodes: bool) -> Self {
        self.reuse_nodes = reuse_nodes;
        self
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Longest input a tree can describe; offsets are stored as `u32`.
pub const MAX_INPUT_LENGTH: usize = u32::MAX as usize;

fn check_input_length(length: usize) -> Result<(), ParseError> {
    if length > MAX_INPUT_LENGTH {
        return Err(ParseError::ResourceExhausted {
            limit: MAX_INPUT_LENGTH,
        });
    }
    Ok(())
}

/// Produces [`Tree`]s from text with a given [`Language`].
///
/// A parser holds no state between parses other than its configuration, so
/// one parser can serve any number of documents. It is `Send` but not meant
/// to be shared; use one per thread.
#[derive(Default)]
pub struct Parser {
    language: Option<Language>,
    logger: Option<Logger>,
    options: ParseOptions,
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("language", &self.language)
            .field("logger", &self.logger.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(language: &Language) -> Result<Self, LanguageError> {
        let mut parser = Self::new();
        parser.set_language(language)?;
        Ok(parser)
    }

    /// Set the language used for parsing.
    ///
    /// Returns an error if the table's version is outside the supported
    /// range or its shape is inconsistent.
    pub fn set_language(&mut self, language: &Language) -> Result<(), LanguageError> {
        language.validate()?;
        self.language = Some(language.clone());
        Ok(())
    }

    pub fn language(&self) -> Option<&Language> {
        self.language.as_ref()
    }

    pub fn set_logger(&mut self, logger: Option<Logger>) {
        self.logger = logger;
    }

    pub fn logger(&self) -> Option<&Logger> {
        self.logger.as_ref()
    }

    pub fn set_options(&mut self, options: ParseOptions) {
        self.options = options;
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Parse `text`, reusing subtrees from `old_tree` where possible.
    ///
    /// `old_tree` must already reflect every edit made to the text since it
    /// was produced (see [`Tree::edit`]). A tree from a different language
    /// is ignored. Inputs longer than [`MAX_INPUT_LENGTH`] are rejected with
    /// [`ParseError::ResourceExhausted`].
    pub fn parse(
        &mut self,
        text: impl AsRef<[u8]>,
        old_tree: Option<&Tree>,
    ) -> Result<Tree, ParseError> {
        let language = self.language.clone().ok_or(ParseError::NoLanguage)?;
        let input = text.as_ref();
        check_input_length(input.len())?;
        let old_root = old_tree
            .filter(|tree| tree.language().ptr_eq(&language))
            .filter(|_| self.options.reuse_nodes)
            .map(Tree::root);

        let root =
            ParseRun::new(&language, &self.options, &mut self.logger, input, old_root).run()?;
        Ok(Tree::new(root, language))
    }

    /// Apply `edits` to `old_tree` in order and parse `text` incrementally.
    ///
    /// Each edit is expressed in the coordinates produced by the edits before
    /// it, so edits must be sorted by start byte and must not overlap. After
    /// the last edit the tree must be exactly as long as `text`.
    pub fn reparse(
        &mut self,
        old_tree: &Tree,
        edits: &[InputEdit],
        text: impl AsRef<[u8]>,
    ) -> Result<Tree, ParseError> {
        let text = text.as_ref();
        check_input_length(text.len())?;
        validate_edits(old_tree.source_length(), edits, text.len())?;
        let mut tree = old_tree.clone();
        for edit in edits {
            tree = tree.edit(edit);
        }
        self.parse(text, Some(&tree))
    }
}

fn validate_edits(
    old_length: usize,
    edits: &[InputEdit],
    new_length: usize,
) -> Result<(), ParseError> {
    let invalid = |index, reason| ParseError::InvalidEdit { index, reason };
    let mut length = old_length;
    let mut previous: Option<&InputEdit> = None;
    for (index, edit) in edits.iter().enumerate() {
        if edit.start_byte > edit.old_end_byte || edit.start_byte > edit.new_end_byte {
            return Err(invalid(index, InvalidEditReason::Inverted));
        }
        if let Some(previous) = previous {
            if edit.start_byte < previous.start_byte {
                return Err(invalid(index, InvalidEditReason::OutOfOrder));
            }
            if edit.start_byte < previous.new_end_byte {
                return Err(invalid(index, InvalidEditReason::Overlapping));
            }
        }
        if edit.old_end_byte > length {
            return Err(invalid(index, InvalidEditReason::OutOfBounds));
        }
        length = length - (edit.old_end_byte - edit.start_byte)
            + (edit.new_end_byte - edit.start_byte);
        previous = Some(edit);
    }
    if length != new_length {
        return Err(invalid(
            edits.len().saturating_sub(1),
            InvalidEditReason::LengthMismatch {
                expected: length,
                actual: new_length,
            },
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parse run
// ---------------------------------------------------------------------------

fn symbol_name(language: &Language, symbol: Symbol) -> String {
    language.symbol_name(symbol).escape_default().to_string()
}

/// The next token to feed the table: a fresh leaf or a subtree from the old tree.
struct Lookahead {
    tree: Subtree,
    reused: bool,
}

/// Outcome of feeding one symbol to a simulated state stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SimStep {
    Shifted { extra: bool },
    Accepted,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Repair {
    Insert(Symbol),
    Delete,
}

/// How far a simulated parse got after a repair, and the absolute end of
/// the text its lexing examined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Trial {
    accepted: bool,
    consumed: usize,
    examined_end: u32,
}

impl Trial {
    fn failed() -> Self {
        Self {
            accepted: false,
            consumed: 0,
            examined_end: 0,
        }
    }
}

struct ParseRun<'p> {
    language: &'p Language,
    options: &'p ParseOptions,
    logger: &'p mut Option<Logger>,
    input: &'p [u8],
    total: Length,
    stack: Stack,
    reusable_node: ReusableNode,
    is_incremental: bool,
    external_state: ExternalScannerState,
    reductions_since_shift: usize,
    /// While a `MISSING` token is being inserted, the absolute end of the
    /// text that chose the repair. Reductions it triggers cover this text.
    repair_lookahead_end: u32,
}

impl<'p> ParseRun<'p> {
    fn new(
        language: &'p Language,
        options: &'p ParseOptions,
        logger: &'p mut Option<Logger>,
        input: &'p [u8],
        old_root: Option<&Subtree>,
    ) -> Self {
        let mut reusable_node = ReusableNode::new();
        if let Some(old_root) = old_root {
            reusable_node.reset(old_root);
        }
        Self {
            language,
            options,
            logger,
            input,
            total: Length::of(input),
            stack: Stack::new(START_STATE, options.max_stack_depth.max(2)),
            reusable_node,
            is_incremental: old_root.is_some(),
            external_state: ExternalScannerState::default(),
            reductions_since_shift: 0,
            repair_lookahead_end: 0,
        }
    }

    fn log(&mut self, log_type: LogType, message: impl FnOnce(&Language) -> String) {
        let language = self.language;
        match self.logger.as_mut() {
            Some(logger) => logger(log_type, &message(language)),
            None => match log_type {
                LogType::Parse => trace!(target: "sitter_runtime::parse", "{}", message(language)),
                LogType::Lex => trace!(target: "sitter_runtime::lex", "{}", message(language)),
            },
        }
    }

    fn run(mut self) -> Result<Subtree, ParseError> {
        let is_incremental = self.is_incremental;
        self.log(LogType::Parse, |_| {
            if is_incremental {
                "parse_after_edit".to_string()
            } else {
                "new_parse".to_string()
            }
        });
        loop {
            let lookahead = self.next_lookahead();
            if let Some(root) = self.advance(lookahead)? {
                self.log(LogType::Parse, |_| "done".to_string());
                return Ok(root);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lookahead
    // -----------------------------------------------------------------------

    fn next_lookahead(&mut self) -> Lookahead {
        let state = self.stack.state();
        let position = self.stack.position();
        if let Some(tree) = self.reuse_node(state, position) {
            return Lookahead { tree, reused: true };
        }
        Lookahead {
            tree: self.lex(state, position),
            reused: false,
        }
    }

    fn lex(&mut self, state: StateId, position: Length) -> Subtree {
        self.log(LogType::Lex, |_| {
            format!(
                "lex_internal state:{state}, row:{}, column:{}",
                position.extent.row, position.extent.column
            )
        });
        let mut lexer = Lexer::new(self.input);
        lexer.reset(position);
        let token = next_token(self.language, &mut lexer, state, &self.external_state);
        let tree = Subtree::new_leaf(&token, state, self.language);
        self.log(LogType::Lex, |language| {
            format!(
                "lexed_lookahead sym:{}, size:{}",
                symbol_name(language, token.symbol()),
                token.size().bytes
            )
        });
        tree
    }

    /// Find a subtree of the old tree that starts at `position` and would
    /// be rebuilt unchanged in `state`.
    fn reuse_node(&mut self, state: StateId, position: Length) -> Option<Subtree> {
        loop {
            let tree = self.reusable_node.tree()?.clone();
            let byte_offset = self.reusable_node.byte_offset();
            let end_byte_offset = byte_offset + tree.total_bytes();

            if byte_offset > position.bytes {
                self.log(LogType::Parse, |language| {
                    format!("before_reusable_node symbol:{}", symbol_name(language, tree.symbol()))
                });
                return None;
            }

            if byte_offset < position.bytes {
                self.log(LogType::Parse, |language| {
                    format!("past_reusable_node symbol:{}", symbol_name(language, tree.symbol()))
                });
                if end_byte_offset <= position.bytes || !self.reusable_node.descend() {
                    self.reusable_node.advance();
                }
                continue;
            }

            if self.reusable_node.external_scanner_state() != self.external_state {
                self.log(LogType::Parse, |language| {
                    format!(
                        "cant_reuse_node_external_scanner_state symbol:{}",
                        symbol_name(language, tree.symbol())
                    )
                });
                self.reusable_node.advance();
                continue;
            }

            let reason = if tree.has_changes() {
                Some("has_changes")
            } else if tree.is_error() {
                Some("is_error")
            } else if tree.is_missing() {
                Some("is_missing")
            } else if tree.error_cost() > 0 {
                Some("contains_error")
            } else if tree.total_bytes() == 0 || tree.first_leaf().is_none() {
                Some("is_empty")
            } else if end_byte_offset as usize > self.input.len() {
                Some("past_end")
            } else {
                None
            };
            if let Some(reason) = reason {
                self.log(LogType::Parse, |language| {
                    format!("cant_reuse_node_{reason} tree:{}", symbol_name(language, tree.symbol()))
                });
                if !self.reusable_node.descend() {
                    self.reusable_node.advance();
                }
                continue;
            }

            let lex_mode = self.language.lex_mode(state);
            if tree.first_leaf().map(|leaf| leaf.lex_mode) != Some(lex_mode) {
                self.log(LogType::Parse, |language| {
                    format!("cant_reuse_node symbol:{}", symbol_name(language, tree.symbol()))
                });
                self.reusable_node.advance_past_leaf();
                return None;
            }

            self.log(LogType::Parse, |language| {
                format!("reuse_node symbol:{}", symbol_name(language, tree.symbol()))
            });
            return Some(tree);
        }
    }

    /// Replace a reused lookahead with the part of it that can be shifted in
    /// `state`, descending through first children.
    fn breakdown_lookahead(&mut self, state: StateId) -> Option<Subtree> {
        loop {
            let tree = self.reusable_node.tree()?.clone();
            let fits = tree.child_count() == 0
                || (tree.parse_state() == state
                    && self.language.next_state(state, tree.symbol()) != 0);
            if fits {
                return Some(tree);
            }
            self.log(LogType::Parse, |language| {
                format!("state_mismatch sym:{}", symbol_name(language, tree.symbol()))
            });
            if !self.reusable_node.descend() {
                return None;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Feed one lookahead to the table until it is shifted, the parse is
    /// accepted, or recovery has dealt with it.
    fn advance(&mut self, mut lookahead: Lookahead) -> Result<Option<Subtree>, ParseError> {
        loop {
            let state = self.stack.state();
            let action = self
                .language
                .actions(state, lookahead.tree.leaf_symbol())
                .first()
                .copied();

            match action {
                Some(ParseAction::Shift { state: next_state, extra }) => {
                    if lookahead.tree.child_count() > 0 {
                        // A reused node is only valid in the state that built it.
                        let goto = self.language.next_state(state, lookahead.tree.symbol());
                        if extra || lookahead.tree.parse_state() != state || goto == 0 {
                            match self.breakdown_lookahead(state) {
                                Some(tree) => lookahead.tree = tree,
                                None => lookahead = self.relex(state),
                            }
                            continue;
                        }
                        self.shift(goto, lookahead, false)?;
                    } else if extra {
                        self.shift(state, lookahead, true)?;
                    } else {
                        self.shift(next_state, lookahead, false)?;
                    }
                    return Ok(None);
                }

                Some(ParseAction::Reduce {
                    symbol,
                    child_count,
                    production_id,
                }) => {
                    self.reduce(symbol, child_count, production_id, &lookahead.tree)?;
                }

                Some(ParseAction::Accept) => {
                    return Ok(Some(self.accept()));
                }

                Some(ParseAction::Recover) | None => {
                    // Recovery always works on freshly lexed tokens.
                    if lookahead.reused {
                        lookahead = self.relex(state);
                        continue;
                    }
                    return self.recover(lookahead.tree);
                }
            }
        }
    }

    fn relex(&mut self, state: StateId) -> Lookahead {
        let position = self.stack.position();
        Lookahead {
            tree: self.lex(state, position),
            reused: false,
        }
    }

    fn shift(&mut self, state: StateId, lookahead: Lookahead, extra: bool) -> Result<(), ParseError> {
        let tree = if lookahead.tree.child_count() == 0 {
            lookahead.tree.with_extra(extra)
        } else {
            lookahead.tree
        };
        if let Some(token) = tree.last_external_token() {
            self.external_state = token.external_scanner_state().cloned().unwrap_or_default();
        }
        self.log(LogType::Parse, |_| {
            if extra {
                "shift_extra".to_string()
            } else {
                format!("shift state:{state}")
            }
        });
        self.stack.push(state, tree)?;
        if lookahead.reused {
            self.reusable_node.advance();
        }
        self.reductions_since_shift = 0;
        Ok(())
    }

    fn reduce(
        &mut self,
        symbol: Symbol,
        child_count: u16,
        production_id: u16,
        lookahead: &Subtree,
    ) -> Result<(), ParseError> {
        self.reductions_since_shift += 1;
        if self.reductions_since_shift > self.options.max_stack_depth {
            return Err(ParseError::ResourceExhausted {
                limit: self.options.max_stack_depth,
            });
        }

        // Absolute end of the text examined to decide on this reduction.
        let lookahead_end = (self.stack.position().bytes + lookahead.first_leaf_end())
            .max(self.repair_lookahead_end);

        let mut children = self.stack.pop_count(usize::from(child_count));
        let trailing_extras = remove_trailing_extras(&mut children);
        let state = self.stack.state();
        let next_state = self.language.next_state(state, symbol);
        let start = self.stack.position().bytes;

        let mut node = Subtree::new_node(symbol, children, production_id, state, self.language);
        node.extend_lookahead(lookahead_end.saturating_sub(start));

        self.log(LogType::Parse, |language| {
            format!(
                "reduce sym:{}, child_count:{child_count}",
                symbol_name(language, symbol)
            )
        });
        self.stack.push(next_state, node)?;
        for extra in trailing_extras {
            self.stack.push(next_state, extra)?;
        }
        Ok(())
    }

    fn accept(&mut self) -> Subtree {
        self.log(LogType::Parse, |_| "accept".to_string());
        let mut subtrees = self.stack.pop_all();

        let root_index = subtrees.iter().rposition(|tree| !tree.is_extra());
        let root = root_index.and_then(|index| {
            let tree = &subtrees[index];
            let is_node = usize::from(tree.symbol()) >= self.language.token_count();
            (is_node && !tree.is_error()).then(|| (index, tree.clone()))
        });

        let (symbol, production_id, children) = match root {
            Some((index, root)) => {
                let trailing = subtrees.split_off(index + 1);
                subtrees.pop();
                subtrees.extend(root.children().iter().cloned());
                subtrees.extend(trailing);
                (root.symbol(), root.production_id(), subtrees)
            }
            None => (BUILTIN_SYM_ERROR, 0, subtrees),
        };
        Subtree::new_root(symbol, production_id, children, self.total, self.language)
    }

    // -----------------------------------------------------------------------
    // Error recovery
    // -----------------------------------------------------------------------

    fn recover(&mut self, lookahead: Subtree) -> Result<Option<Subtree>, ParseError> {
        let state = self.stack.state();
        let cost = self.stack.error_cost();
        self.log(LogType::Parse, |language| {
            format!(
                "detect_error state:{state}, lookahead:{}, cost:{cost}",
                symbol_name(language, lookahead.symbol()),
            )
        });

        if lookahead.is_error() {
            self.skip_token(lookahead)?;
            return Ok(None);
        }

        let is_eof = lookahead.is_eof();
        let window = self.options.recovery_window.max(1);
        let states = self.stack.states();
        let resume = self.stack.position().add(lookahead.total_size());
        let mut examined_end = self.stack.position().bytes + lookahead.first_leaf_end();

        let mut best: Option<(Repair, Trial, u32)> = None;
        let mut consider = |repair: Repair, trial: Trial, cost: u32| {
            let better = match best {
                None => true,
                Some((_, best_trial, best_cost)) => {
                    (trial.accepted, trial.consumed) > (best_trial.accepted, best_trial.consumed)
                        || ((trial.accepted, trial.consumed)
                            == (best_trial.accepted, best_trial.consumed)
                            && cost < best_cost)
                }
            };
            if better {
                best = Some((repair, trial, cost));
            }
        };

        for symbol in 1..self.language.token_count() as Symbol {
            if self.language.actions(state, symbol).is_empty()
                || self.language.is_extra_only(state, symbol)
            {
                continue;
            }
            let trial = self.simulate(&states, Some(symbol), lookahead.symbol(), resume, window);
            examined_end = examined_end.max(trial.examined_end);
            consider(Repair::Insert(symbol), trial, ERROR_COST_PER_MISSING_TREE);
        }
        if !is_eof {
            let trial = self.simulate_after(&states, resume, window);
            examined_end = examined_end.max(trial.examined_end);
            let size = lookahead.size();
            let cost = ERROR_COST_PER_SKIPPED_TREE
                + ERROR_COST_PER_SKIPPED_CHAR * size.bytes
                + ERROR_COST_PER_SKIPPED_LINE * size.extent.row;
            consider(Repair::Delete, trial, cost);
        }

        let chosen = match best {
            Some((repair, trial, _))
                if trial.accepted
                    || trial.consumed >= window
                    || (matches!(repair, Repair::Insert(_)) && trial.consumed > 0) =>
            {
                Some(repair)
            }
            _ if !is_eof => Some(Repair::Delete),
            _ => None,
        };

        match chosen {
            Some(Repair::Insert(symbol)) => {
                self.insert_missing(symbol, examined_end)?;
                self.advance(Lookahead {
                    tree: lookahead,
                    reused: false,
                })
            }
            Some(Repair::Delete) => {
                self.skip_token(lookahead)?;
                Ok(None)
            }
            None => self.complete_at_eof(&states, lookahead, window),
        }
    }

    /// Shift a zero-width `MISSING` token. `examined_end` is the end of the
    /// text that was looked at to choose this repair.
    fn insert_missing(&mut self, symbol: Symbol, examined_end: u32) -> Result<(), ParseError> {
        self.log(LogType::Parse, |language| {
            format!("recover_with_missing symbol:{}", symbol_name(language, symbol))
        });
        let state = self.stack.state();
        let missing = Subtree::new_missing_leaf(symbol, state, self.language);
        self.repair_lookahead_end = examined_end;
        // Only END can trigger Accept, so this always ends with a shift.
        let result = self.advance(Lookahead {
            tree: missing,
            reused: false,
        });
        self.repair_lookahead_end = 0;
        result.map(|_| ())
    }

    /// Wrap `token` in an extra `ERROR` node, merging with an error node
    /// directly below it.
    fn skip_token(&mut self, token: Subtree) -> Result<(), ParseError> {
        self.log(LogType::Parse, |language| {
            format!("skip_token symbol:{}", symbol_name(language, token.symbol()))
        });
        let state = self.stack.state();
        if let Some(external) = token.last_external_token() {
            self.external_state = external.external_scanner_state().cloned().unwrap_or_default();
        }

        let mergeable = self
            .stack
            .top_subtree()
            .is_some_and(|top| top.is_error() && top.is_extra());
        let error = if mergeable {
            let mut children = match self.stack.pop().and_then(|entry| entry.subtree) {
                Some(top) if top.child_count() > 0 => top.children().to_vec(),
                Some(top) => vec![top.with_extra(false)],
                None => Vec::new(),
            };
            children.push(token);
            Subtree::new_error_node(children, true, state, self.language)
        } else if token.is_error() {
            token.with_extra(true)
        } else {
            Subtree::new_error_node(vec![token], true, state, self.language)
        };
        self.stack.push(state, error)?;
        self.reductions_since_shift = 0;
        Ok(())
    }

    /// At the end of input: invent up to `window` tokens to reach Accept,
    /// or wrap everything parsed so far in an `ERROR` root.
    fn complete_at_eof(
        &mut self,
        states: &[StateId],
        lookahead: Subtree,
        window: usize,
    ) -> Result<Option<Subtree>, ParseError> {
        for depth in 1..=window {
            let mut path = Vec::with_capacity(depth);
            if self.search_completion(states.to_vec(), depth, &mut path) {
                let examined_end = self.stack.position().bytes + lookahead.first_leaf_end();
                for symbol in path {
                    self.insert_missing(symbol, examined_end)?;
                }
                return self.advance(Lookahead {
                    tree: lookahead,
                    reused: false,
                });
            }
        }

        self.log(LogType::Parse, |_| "recover_eof".to_string());
        let children = self.stack.pop_all();
        Ok(Some(Subtree::new_root(
            BUILTIN_SYM_ERROR,
            0,
            children,
            self.total,
            self.language,
        )))
    }

    fn search_completion(&self, states: Vec<StateId>, depth: usize, path: &mut Vec<Symbol>) -> bool {
        if depth == 0 {
            let mut states = states;
            return self.simulate_token(&mut states, BUILTIN_SYM_END) == SimStep::Accepted;
        }
        let Some(&state) = states.last() else {
            return false;
        };
        for symbol in 1..self.language.token_count() as Symbol {
            if self.language.actions(state, symbol).is_empty()
                || self.language.is_extra_only(state, symbol)
            {
                continue;
            }
            let mut next = states.clone();
            if self.simulate_token(&mut next, symbol) == (SimStep::Shifted { extra: false }) {
                path.push(symbol);
                if self.search_completion(next, depth - 1, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    // -----------------------------------------------------------------------
    // Simulation
    // -----------------------------------------------------------------------

    /// Simulate inserting `inserted` and then feeding `first` followed by
    /// freshly lexed tokens from `resume`.
    fn simulate(
        &self,
        states: &[StateId],
        inserted: Option<Symbol>,
        first: Symbol,
        resume: Length,
        window: usize,
    ) -> Trial {
        let mut states = states.to_vec();
        if let Some(symbol) = inserted {
            if self.simulate_token(&mut states, symbol) != (SimStep::Shifted { extra: false }) {
                return Trial::failed();
            }
        }
        match self.simulate_token(&mut states, first) {
            SimStep::Accepted => Trial {
                accepted: true,
                ..Trial::failed()
            },
            SimStep::Failed => Trial::failed(),
            SimStep::Shifted { extra } => {
                let consumed = usize::from(!extra);
                self.simulate_tokens(states, resume, consumed, window)
            }
        }
    }

    /// Simulate skipping the lookahead: feed tokens lexed from `resume`.
    fn simulate_after(&self, states: &[StateId], resume: Length, window: usize) -> Trial {
        self.simulate_tokens(states.to_vec(), resume, 0, window)
    }

    fn simulate_tokens(
        &self,
        mut states: Vec<StateId>,
        resume: Length,
        mut consumed: usize,
        window: usize,
    ) -> Trial {
        let mut lexer = Lexer::new(self.input);
        let mut position = resume;
        let mut examined_end = 0;
        let mut external_state = self.external_state.clone();
        while consumed < window {
            let Some(&state) = states.last() else {
                break;
            };
            lexer.reset(position);
            let token = next_token(self.language, &mut lexer, state, &external_state);
            examined_end = examined_end.max(token.lookahead_end_byte);
            if token.is_error() {
                break;
            }
            position = token.end;
            if let Some(scanner_state) = token.external_scanner_state() {
                external_state = scanner_state.clone();
            }
            match self.simulate_token(&mut states, token.symbol()) {
                SimStep::Accepted => {
                    return Trial {
                        accepted: true,
                        consumed,
                        examined_end,
                    }
                }
                SimStep::Failed => break,
                SimStep::Shifted { extra } => {
                    if !extra {
                        consumed += 1;
                    }
                }
            }
        }
        Trial {
            accepted: false,
            consumed,
            examined_end,
        }
    }

    /// Run reductions for `symbol` on a bare state stack, then shift or accept it.
    fn simulate_token(&self, states: &mut Vec<StateId>, symbol: Symbol) -> SimStep {
        for _ in 0..=self.options.max_stack_depth {
            let Some(&state) = states.last() else {
                return SimStep::Failed;
            };
            match self.language.actions(state, symbol).first() {
                Some(&ParseAction::Shift { state: next, extra }) => {
                    if !extra {
                        states.push(next);
                    }
                    return SimStep::Shifted { extra };
                }
                Some(&ParseAction::Reduce {
                    symbol: lhs,
                    child_count,
                    ..
                }) => {
                    let count = usize::from(child_count);
                    if count >= states.len() {
                        return SimStep::Failed;
                    }
                    states.truncate(states.len() - count);
                    let Some(&below) = states.last() else {
                        return SimStep::Failed;
                    };
                    let goto = self.language.next_state(below, lhs);
                    if goto == 0 {
                        return SimStep::Failed;
                    }
                    states.push(goto);
                }
                Some(&ParseAction::Accept) => return SimStep::Accepted,
                Some(&ParseAction::Recover) | None => return SimStep::Failed,
            }
        }
        SimStep::Failed
    }
}
