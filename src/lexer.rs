//! Character-level scanning over an in-memory UTF-8 buffer.
//!
//! [`Lexer`] is the cursor handed to a table's lex function and to external
//! scanners. It decodes one code point of lookahead at a time, tracks rows and
//! columns, and records how far past the token any scanner looked. That
//! examined extent becomes the token's lookahead bytes, which is what edits
//! are compared against to decide whether a token is still valid.
//!
//! [`next_token`] runs the full per-state lexing procedure, including the
//! fallbacks that turn unrecognizable text into `ERROR` tokens.

use std::fmt;
use std::ops::Range;

use tracing::trace;

use crate::error_costs::ERROR_STATE;
use crate::language::{Language, LexMode, StateId, Symbol, BUILTIN_SYM_END, BUILTIN_SYM_ERROR};
use crate::length::{saturating_u32, Length, LENGTH_ZERO};
use crate::point::Point;
use crate::unicode::{utf8_next, Decoded};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const BYTE_ORDER_MARK: char = '\u{FEFF}';

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Cached character column of the current position.
#[derive(Clone, Copy, Debug, Default)]
struct ColumnData {
    value: u32,
    valid: bool,
}

/// Opaque bytes an external scanner carries from one token to the next.
///
/// The runtime stores a copy with every externally scanned token. Reuse of
/// an old subtree is only allowed when the state in effect before it equals
/// the current one.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ExternalScannerState(Vec<u8>);

impl ExternalScannerState {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn set(&mut self, bytes: &[u8]) {
        self.0.clear();
        self.0.extend_from_slice(bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ExternalScannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalScannerState({:?})", self.0)
    }
}

/// A cursor over the source text, driven by lex functions.
pub struct Lexer<'a> {
    input: &'a [u8],
    current_position: Length,
    token_start_position: Length,
    token_end_position: Option<Length>,
    lookahead: Decoded,
    result_symbol: Symbol,
    did_get_column: bool,
    column_data: ColumnData,
    /// One past the furthest byte any scanner has inspected.
    pub(crate) lookahead_end_byte: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        let mut lexer = Self {
            input,
            current_position: LENGTH_ZERO,
            token_start_position: LENGTH_ZERO,
            token_end_position: None,
            lookahead: Decoded { char: None, size: 0 },
            result_symbol: BUILTIN_SYM_END,
            did_get_column: false,
            column_data: ColumnData::default(),
            lookahead_end_byte: 0,
        };
        lexer.get_lookahead();
        lexer
    }

    // -----------------------------------------------------------------------
    // Scanner-facing API
    // -----------------------------------------------------------------------

    /// The next character, or `None` at the end of input.
    ///
    /// Invalid UTF-8 reads as `U+FFFD` and is one byte wide.
    #[inline]
    pub fn lookahead(&self) -> Option<char> {
        if self.eof() {
            None
        } else {
            Some(self.lookahead.char.unwrap_or(char::REPLACEMENT_CHARACTER))
        }
    }

    #[inline]
    pub fn eof(&self) -> bool {
        self.current_position.bytes as usize >= self.input.len()
    }

    /// Consume the lookahead character as part of the token.
    pub fn advance(&mut self) {
        self.do_advance(false);
    }

    /// Consume the lookahead character as padding before the token.
    pub fn skip(&mut self) {
        self.do_advance(true);
    }

    /// Consume at least `count` bytes, stopping early at the end of input.
    pub fn advance_bytes(&mut self, count: usize) {
        let goal = self.current_position.bytes as usize + count;
        while (self.current_position.bytes as usize) < goal && !self.eof() {
            self.do_advance(false);
        }
    }

    pub fn skip_bytes(&mut self, count: usize) {
        let goal = self.current_position.bytes as usize + count;
        while (self.current_position.bytes as usize) < goal && !self.eof() {
            self.do_advance(true);
        }
    }

    /// Mark the current position as the end of the token.
    ///
    /// Scanners may keep advancing afterwards to look ahead; the extra text
    /// is not part of the token but is recorded as examined.
    pub fn mark_end(&mut self) {
        self.token_end_position = Some(self.current_position);
    }

    /// Character column of the current position.
    ///
    /// A token whose scan asked for the column is re-lexed whenever an edit
    /// shifts the start of its row.
    pub fn column(&mut self) -> u32 {
        self.did_get_column = true;
        if !self.column_data.valid {
            let position = self.current_position;
            let line_start = (position.bytes - position.extent.column) as usize;
            let line = &self.input[line_start..position.bytes as usize];
            let mut column = 0;
            let mut offset = 0;
            while offset < line.len() {
                let decoded = utf8_next(&line[offset..]);
                let is_bom = line_start + offset == 0 && decoded.char == Some(BYTE_ORDER_MARK);
                if !is_bom {
                    column += 1;
                }
                offset += decoded.size.max(1) as usize;
            }
            self.column_data = ColumnData {
                value: column,
                valid: true,
            };
        }
        self.column_data.value
    }

    /// The unread input from the current position on.
    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        let start = (self.current_position.bytes as usize).min(self.input.len());
        &self.input[start..]
    }

    /// Record that the scanner inspected input up to (but excluding) `end_byte`.
    ///
    /// Scanners that examine input without going through [`Lexer::advance`],
    /// such as regex matchers, must report it here so that edits inside the
    /// examined text invalidate the token.
    pub fn note_lookahead(&mut self, end_byte: usize) {
        let end = saturating_u32(end_byte.min(self.input.len() + 1));
        self.lookahead_end_byte = self.lookahead_end_byte.max(end);
    }

    pub fn set_result_symbol(&mut self, symbol: Symbol) {
        self.result_symbol = symbol;
    }

    pub fn result_symbol(&self) -> Symbol {
        self.result_symbol
    }

    pub fn position(&self) -> Length {
        self.current_position
    }

    pub fn token_start(&self) -> Length {
        self.token_start_position
    }

    // -----------------------------------------------------------------------
    // Engine-facing API
    // -----------------------------------------------------------------------

    /// Move to `position` without resetting the examined extent.
    pub(crate) fn reset(&mut self, position: Length) {
        if position.bytes != self.current_position.bytes {
            self.column_data = ColumnData::default();
        }
        self.current_position = position;
        self.get_lookahead();
    }

    /// Begin a new token at the current position.
    pub(crate) fn start(&mut self) {
        self.token_start_position = self.current_position;
        self.token_end_position = None;
        self.result_symbol = BUILTIN_SYM_END;
        self.did_get_column = false;
        if self.current_position.bytes == 0 && self.lookahead.char == Some(BYTE_ORDER_MARK) {
            self.skip();
        }
    }

    /// Close the current token and return its `(start, end)`.
    pub(crate) fn finish(&mut self) -> (Length, Length) {
        let end = self.token_end_position.unwrap_or(self.current_position);
        let start = if end.bytes < self.token_start_position.bytes {
            end
        } else {
            self.token_start_position
        };
        (start, end)
    }

    pub(crate) fn did_get_column(&self) -> bool {
        self.did_get_column
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn get_lookahead(&mut self) {
        self.lookahead = utf8_next(self.remaining());
        let end = self.current_position.bytes as usize + self.lookahead.size.max(1) as usize;
        self.note_lookahead(end);
    }

    fn do_advance(&mut self, skip: bool) {
        if self.eof() {
            return;
        }
        let size = self.lookahead.size.max(1);
        if self.lookahead.char == Some('\n') {
            self.current_position.extent.row += 1;
            self.current_position.extent.column = 0;
            self.column_data = ColumnData {
                value: 0,
                valid: true,
            };
        } else {
            let is_bom =
                self.current_position.bytes == 0 && self.lookahead.char == Some(BYTE_ORDER_MARK);
            if !is_bom && self.column_data.valid {
                self.column_data.value += 1;
            }
            self.current_position.extent.column += size;
        }
        self.current_position.bytes += size;
        if skip {
            self.token_start_position = self.current_position;
        }
        self.get_lookahead();
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// One lexed token, with absolute positions.
#[derive(Clone, Debug)]
pub struct Token {
    pub(crate) symbol: Symbol,
    pub(crate) padding_start: Length,
    pub(crate) start: Length,
    pub(crate) end: Length,
    pub(crate) lookahead_end_byte: u32,
    pub(crate) lex_mode: LexMode,
    pub(crate) depends_on_column: bool,
    pub(crate) external_scanner_state: Option<ExternalScannerState>,
}

impl Token {
    /// The terminal symbol; `BUILTIN_SYM_ERROR` for unrecognized text.
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn is_error(&self) -> bool {
        self.symbol == BUILTIN_SYM_ERROR
    }

    pub fn is_eof(&self) -> bool {
        self.symbol == BUILTIN_SYM_END
    }

    pub fn byte_range(&self) -> Range<usize> {
        self.start.bytes as usize..self.end.bytes as usize
    }

    pub fn start_point(&self) -> Point {
        self.start.extent
    }

    pub fn end_point(&self) -> Point {
        self.end.extent
    }

    /// Skipped text between the previous token and this one.
    pub fn padding(&self) -> Length {
        self.start.sub(self.padding_start)
    }

    pub fn size(&self) -> Length {
        self.end.sub(self.start)
    }

    /// How many bytes past the token's end were examined to produce it.
    pub fn lookahead_bytes(&self) -> u32 {
        self.lookahead_end_byte.saturating_sub(self.end.bytes)
    }

    pub fn external_scanner_state(&self) -> Option<&ExternalScannerState> {
        self.external_scanner_state.as_ref()
    }

    /// The token's text.
    pub fn text<'a>(&self, source: &'a [u8]) -> &'a [u8] {
        &source[self.byte_range()]
    }
}

/// Scan the token at the lexer's position using the lex mode of `parse_state`.
///
/// The attempts, in order:
/// 1. the external scanner, when the lex mode enables it;
/// 2. the internal lex function for the state;
/// 3. the internal lex function for the error state, which accepts every token;
/// 4. an `ERROR` token that grows one character at a time until some token
///    could start, or the input ends.
///
/// Zero-width tokens are only accepted for the end of input, so every token
/// except `END` consumes at least one byte.
pub fn next_token(
    language: &Language,
    lexer: &mut Lexer<'_>,
    parse_state: StateId,
    external_state: &ExternalScannerState,
) -> Token {
    let start_position = lexer.position();
    let lex_mode = language.lex_mode(parse_state);
    lexer.lookahead_end_byte = start_position.bytes;

    let mut depends_on_column = false;
    let mut found: Option<(Symbol, Length, Length)> = None;
    let mut scanner_state = None;

    if lex_mode.external_lex_state != 0 {
        if let Some(scanner) = language.table().external_scanner() {
            let valid_symbols = language.external_valid_symbols(parse_state);
            let mut state = external_state.clone();
            lexer.reset(start_position);
            lexer.start();
            trace!(target: "sitter_runtime::lex", state = parse_state, "lex_external");
            let scanned = scanner.scan(lexer, &mut state, &valid_symbols);
            depends_on_column |= lexer.did_get_column();
            if scanned {
                let (start, end) = lexer.finish();
                let index = usize::from(lexer.result_symbol());
                let is_valid = valid_symbols.get(index).copied().unwrap_or(false);
                let symbol = language.table().external_symbols().get(index).copied();
                match symbol {
                    Some(symbol) if is_valid && end.bytes > start.bytes => {
                        found = Some((symbol, start, end));
                        scanner_state = Some(state);
                    }
                    _ => {}
                }
            }
        }
    }

    let error_mode = language.lex_mode(ERROR_STATE).lex_state;
    let fallback =
        (parse_state != ERROR_STATE && error_mode != lex_mode.lex_state).then_some(error_mode);

    let mut error_start = start_position;
    for mode in std::iter::once(lex_mode.lex_state).chain(fallback) {
        if found.is_some() {
            break;
        }
        found = lex_internal(language, lexer, start_position, mode, &mut depends_on_column);
        if found.is_none() {
            error_start = error_start.max(lexer.token_start());
        }
    }

    let (symbol, start, end) = match found {
        Some(token) => token,
        None => lex_error(language, lexer, error_start),
    };

    Token {
        symbol,
        padding_start: start_position,
        start,
        end,
        lookahead_end_byte: lexer.lookahead_end_byte.max(end.bytes + 1),
        lex_mode,
        depends_on_column,
        external_scanner_state: scanner_state,
    }
}

/// Run one internal lex function from `position`.
fn lex_internal(
    language: &Language,
    lexer: &mut Lexer<'_>,
    position: Length,
    lex_state: StateId,
    depends_on_column: &mut bool,
) -> Option<(Symbol, Length, Length)> {
    lexer.reset(position);
    lexer.start();
    trace!(target: "sitter_runtime::lex", lex_state, "lex_internal");
    let matched = language.table().lex(lexer, lex_state);
    *depends_on_column |= lexer.did_get_column();
    if !matched {
        return None;
    }
    let (start, end) = lexer.finish();
    let symbol = lexer.result_symbol();
    if end.bytes > start.bytes && symbol != BUILTIN_SYM_END {
        Some((symbol, start, end))
    } else if symbol == BUILTIN_SYM_END && end.bytes as usize >= lexer.input.len() {
        Some((symbol, start, end))
    } else {
        None
    }
}

/// Build an `ERROR` token starting at `error_start`, or `END` if only
/// skippable text remains.
fn lex_error(
    language: &Language,
    lexer: &mut Lexer<'_>,
    error_start: Length,
) -> (Symbol, Length, Length) {
    let error_mode = language.lex_mode(ERROR_STATE).lex_state;
    let mut ignored = false;

    if error_start.bytes as usize >= lexer.input.len() {
        lexer.reset(error_start);
        return (BUILTIN_SYM_END, error_start, error_start);
    }

    let mut error_end = error_start;
    loop {
        lexer.reset(error_end);
        lexer.start();
        lexer.advance();
        error_end = lexer.position();
        if lexer.eof() {
            break;
        }
        if lex_internal(language, lexer, error_end, error_mode, &mut ignored).is_some() {
            break;
        }
    }
    trace!(
        target: "sitter_runtime::lex",
        start = error_start.bytes,
        end = error_end.bytes,
        "skip_unrecognized_characters"
    );
    (BUILTIN_SYM_ERROR, error_start, error_end)
}

/// Iterates the tokens of a text in the error lex mode, ending after `END`.
pub struct Tokens<'a> {
    language: &'a Language,
    lexer: Lexer<'a>,
    external_state: ExternalScannerState,
    done: bool,
}

impl<'a> Tokens<'a> {
    pub fn new(language: &'a Language, input: &'a [u8]) -> Self {
        Self {
            language,
            lexer: Lexer::new(input),
            external_state: ExternalScannerState::default(),
            done: false,
        }
    }
}

impl Iterator for Tokens<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let token = next_token(
            self.language,
            &mut self.lexer,
            ERROR_STATE,
            &self.external_state,
        );
        if let Some(state) = &token.external_scanner_state {
            self.external_state = state.clone();
        }
        self.lexer.reset(token.end);
        self.done = token.is_eof();
        Some(token)
    }
}
