//! Parse tables and the [`Language`] handle that wraps them.
//!
//! The engine never looks inside a grammar. Everything it needs is asked
//! through [`ParseTable`]: which actions are legal for a `(state, terminal)`
//! pair, where a reduction leads, which lex mode applies in a state, and how to
//! scan a token. [`LanguageTable`] is the plain-data form a generator emits.
//! Tables are immutable once built and safe to share between threads.

use std::fmt;
use std::sync::Arc;

use tree_sitter_language::LanguageFn;

use crate::error::LanguageError;
use crate::error_costs::ERROR_STATE;
use crate::lex_table::LexTable;
use crate::lexer::{ExternalScannerState, Lexer};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub type Symbol = u16;
pub type StateId = u16;
pub type FieldId = u16;

/// The table layout version this runtime reads.
pub const LANGUAGE_VERSION: u32 = 2;
pub const MIN_COMPATIBLE_LANGUAGE_VERSION: u32 = 1;

/// Terminal `0` is always the end of input.
pub const BUILTIN_SYM_END: Symbol = 0;
/// Symbol of `ERROR` leaves and nodes. It never appears in a table.
pub const BUILTIN_SYM_ERROR: Symbol = u16::MAX;

/// Parsing starts here. State `0` is reserved for [`ERROR_STATE`].
pub const START_STATE: StateId = 1;

// ---------------------------------------------------------------------------
// Table entries
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParseAction {
    /// Push the lookahead and move to `state`. Extra tokens keep the current state.
    Shift { state: StateId, extra: bool },
    /// Pop `child_count` non-extra subtrees and wrap them in a `symbol` node.
    Reduce {
        symbol: Symbol,
        child_count: u16,
        production_id: u16,
    },
    Accept,
    Recover,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SymbolMetadata {
    pub visible: bool,
    pub named: bool,
}

/// How to lex in a given parse state.
///
/// Two states with equal lex modes produce identical tokens from identical
/// text, which is what allows a previously lexed token to be reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LexMode {
    pub lex_state: StateId,
    /// Non-zero when the external scanner should run first. Each distinct set
    /// of valid external tokens gets its own id.
    pub external_lex_state: StateId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldMapEntry {
    pub field_id: FieldId,
    /// Index among the production's non-extra children.
    pub child_index: u16,
}

/// A grammar-supplied tokenizer for constructs that a token table cannot
/// express, such as nested comments or indentation.
///
/// The scanner itself is immutable and shared by every parse. All of its
/// state lives in the [`ExternalScannerState`] passed in, which the runtime
/// stores with each token so that reparsing can resume from any point.
pub trait ExternalScanner: Send + Sync {
    /// Try to recognize one token at the lexer's position.
    ///
    /// `valid_symbols[i]` tells whether external token `i` is acceptable in
    /// the current parse state. On success, set the result symbol to the
    /// external token's index with [`Lexer::set_result_symbol`] and return
    /// `true`.
    fn scan(
        &self,
        lexer: &mut Lexer<'_>,
        state: &mut ExternalScannerState,
        valid_symbols: &[bool],
    ) -> bool;
}

// ---------------------------------------------------------------------------
// ParseTable
// ---------------------------------------------------------------------------

/// Everything the engine asks of a grammar.
///
/// Terminals are the symbols `0..token_count()`, with `0` being the end of
/// input. Non-terminals follow up to `symbol_count()`.
pub trait ParseTable: Send + Sync {
    fn abi_version(&self) -> u32 {
        LANGUAGE_VERSION
    }

    fn name(&self) -> &str;

    fn symbol_count(&self) -> usize;

    fn token_count(&self) -> usize;

    fn state_count(&self) -> usize;

    fn symbol_name(&self, symbol: Symbol) -> Option<&str>;

    fn symbol_metadata(&self, symbol: Symbol) -> SymbolMetadata;

    /// Legal actions for a terminal lookahead. Empty means a syntax error.
    fn actions(&self, state: StateId, symbol: Symbol) -> &[ParseAction];

    /// The goto entry for a non-terminal, or `0` if there is none.
    fn next_state(&self, state: StateId, symbol: Symbol) -> StateId;

    fn lex_mode(&self, state: StateId) -> LexMode;

    /// Scan one token using the internal lexer for `lex_state`.
    fn lex(&self, lexer: &mut Lexer<'_>, lex_state: StateId) -> bool;

    fn external_scanner(&self) -> Option<&dyn ExternalScanner> {
        None
    }

    /// Grammar symbols of the external tokens, by external index.
    fn external_symbols(&self) -> &[Symbol] {
        &[]
    }

    fn field_count(&self) -> usize {
        0
    }

    /// Field names are numbered from `1`; `0` means "no field".
    fn field_name(&self, _field_id: FieldId) -> Option<&str> {
        None
    }

    fn field_map(&self, _production_id: u16) -> &[FieldMapEntry] {
        &[]
    }
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum TableRef {
    Shared(Arc<dyn ParseTable>),
    Static(&'static dyn ParseTable),
}

/// A cheap, cloneable handle to an immutable parse table.
#[derive(Clone)]
pub struct Language(TableRef);

impl Language {
    pub fn new(table: impl ParseTable + 'static) -> Self {
        Self(TableRef::Shared(Arc::new(table)))
    }

    pub fn from_arc(table: Arc<dyn ParseTable>) -> Self {
        Self(TableRef::Shared(table))
    }

    /// Wrap a table that lives for the rest of the process.
    pub fn from_static(table: &'static dyn ParseTable) -> Self {
        Self(TableRef::Static(table))
    }

    #[inline]
    pub(crate) fn table(&self) -> &dyn ParseTable {
        match &self.0 {
            TableRef::Shared(table) => table.as_ref(),
            TableRef::Static(table) => *table,
        }
    }

    /// Whether two handles refer to the same table.
    pub fn ptr_eq(&self, other: &Language) -> bool {
        std::ptr::addr_eq(
            self.table() as *const dyn ParseTable,
            other.table() as *const dyn ParseTable,
        )
    }

    pub(crate) fn validate(&self) -> Result<(), LanguageError> {
        let table = self.table();
        let version = table.abi_version();
        if !(MIN_COMPATIBLE_LANGUAGE_VERSION..=LANGUAGE_VERSION).contains(&version) {
            return Err(LanguageError::Version(version));
        }
        if table.state_count() <= usize::from(START_STATE) {
            return Err(LanguageError::InvalidTable(format!(
                "expected at least {} states, found {}",
                START_STATE + 1,
                table.state_count()
            )));
        }
        if table.token_count() == 0 || table.token_count() > table.symbol_count() {
            return Err(LanguageError::InvalidTable(format!(
                "{} tokens do not fit in {} symbols",
                table.token_count(),
                table.symbol_count()
            )));
        }
        if table.symbol_count() >= usize::from(BUILTIN_SYM_ERROR) {
            return Err(LanguageError::InvalidTable(format!(
                "{} symbols overflow the symbol space",
                table.symbol_count()
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.table().name()
    }

    pub fn abi_version(&self) -> u32 {
        self.table().abi_version()
    }

    pub fn node_kind_count(&self) -> usize {
        self.table().symbol_count()
    }

    pub fn state_count(&self) -> usize {
        self.table().state_count()
    }

    pub fn node_kind_for_id(&self, id: Symbol) -> Option<&str> {
        if id == BUILTIN_SYM_ERROR {
            Some("ERROR")
        } else {
            self.table().symbol_name(id)
        }
    }

    /// Look up a symbol by name. Returns `0` when nothing matches.
    pub fn id_for_node_kind(&self, kind: &str, named: bool) -> Symbol {
        if kind == "ERROR" && named {
            return BUILTIN_SYM_ERROR;
        }
        let table = self.table();
        (0..table.symbol_count() as Symbol)
            .find(|&symbol| {
                table.symbol_name(symbol) == Some(kind)
                    && table.symbol_metadata(symbol).named == named
            })
            .unwrap_or(0)
    }

    pub fn node_kind_is_named(&self, id: Symbol) -> bool {
        self.symbol_metadata(id).named
    }

    pub fn node_kind_is_visible(&self, id: Symbol) -> bool {
        self.symbol_metadata(id).visible
    }

    pub fn field_count(&self) -> usize {
        self.table().field_count()
    }

    pub fn field_name_for_id(&self, field_id: FieldId) -> Option<&str> {
        if field_id == 0 {
            return None;
        }
        self.table().field_name(field_id)
    }

    pub fn field_id_for_name(&self, name: &str) -> Option<FieldId> {
        let count = self.table().field_count() as FieldId;
        (1..=count).find(|&id| self.table().field_name(id) == Some(name))
    }

    // -----------------------------------------------------------------------
    // Engine-facing lookups
    // -----------------------------------------------------------------------

    #[inline]
    pub(crate) fn symbol_metadata(&self, symbol: Symbol) -> SymbolMetadata {
        if symbol == BUILTIN_SYM_ERROR {
            SymbolMetadata {
                visible: true,
                named: true,
            }
        } else {
            self.table().symbol_metadata(symbol)
        }
    }

    #[inline]
    pub(crate) fn token_count(&self) -> usize {
        self.table().token_count()
    }

    #[inline]
    pub(crate) fn actions(&self, state: StateId, symbol: Symbol) -> &[ParseAction] {
        if symbol == BUILTIN_SYM_ERROR || usize::from(symbol) >= self.table().token_count() {
            return &[];
        }
        self.table().actions(state, symbol)
    }

    #[inline]
    pub(crate) fn next_state(&self, state: StateId, symbol: Symbol) -> StateId {
        if symbol == BUILTIN_SYM_ERROR {
            return 0;
        }
        self.table().next_state(state, symbol)
    }

    #[inline]
    pub(crate) fn lex_mode(&self, state: StateId) -> LexMode {
        self.table().lex_mode(state)
    }

    /// Whether the only thing a state can do with `symbol` is skip it as an extra.
    pub(crate) fn is_extra_only(&self, state: StateId, symbol: Symbol) -> bool {
        matches!(
            self.actions(state, symbol),
            [ParseAction::Shift { extra: true, .. }]
        )
    }

    pub(crate) fn external_valid_symbols(&self, state: StateId) -> Vec<bool> {
        let externals = self.table().external_symbols();
        if state == ERROR_STATE {
            return vec![true; externals.len()];
        }
        externals
            .iter()
            .map(|&symbol| !self.actions(state, symbol).is_empty())
            .collect()
    }

    pub(crate) fn symbol_name(&self, symbol: Symbol) -> &str {
        self.node_kind_for_id(symbol).unwrap_or("?")
    }
}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.name())
            .field("symbols", &self.node_kind_count())
            .field("states", &self.state_count())
            .finish()
    }
}

/// Accepts the accessor exported by a compiled grammar, in the style of
/// `const TSLanguage *tree_sitter_cil(void)`.
///
/// The accessor must return a pointer to a [`LanguageTable`] that stays
/// valid for the whole process and is never freed. `LanguageFn::from_raw`
/// is `unsafe` for exactly that reason.
impl From<LanguageFn> for Language {
    fn from(value: LanguageFn) -> Self {
        // SAFETY: the `LanguageFn` contract guarantees a pointer to a
        // process-lifetime `LanguageTable`.
        let table: &'static LanguageTable =
            unsafe { &*(value.into_raw())().cast::<LanguageTable>() };
        Self::from_static(table)
    }
}

// ---------------------------------------------------------------------------
// LanguageTable
// ---------------------------------------------------------------------------

/// Plain-data parse table, the shape a grammar generator emits.
///
/// `parse_actions` is dense over `state * token_count + terminal`; the goto
/// table is dense over `state * nonterminal_count + (symbol - token_count)`.
pub struct LanguageTable {
    pub name: String,
    pub symbol_names: Vec<String>,
    pub symbol_metadata: Vec<SymbolMetadata>,
    pub token_count: usize,
    pub state_count: usize,
    pub parse_actions: Vec<Vec<ParseAction>>,
    pub goto_table: Vec<StateId>,
    pub lex_modes: Vec<LexMode>,
    pub lex_table: LexTable,
    pub field_names: Vec<String>,
    pub field_maps: Vec<Vec<FieldMapEntry>>,
    pub external_symbols: Vec<Symbol>,
    pub external_scanner: Option<Box<dyn ExternalScanner>>,
}

impl LanguageTable {
    fn nonterminal_count(&self) -> usize {
        self.symbol_names.len() - self.token_count
    }
}

impl ParseTable for LanguageTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol_count(&self) -> usize {
        self.symbol_names.len()
    }

    fn token_count(&self) -> usize {
        self.token_count
    }

    fn state_count(&self) -> usize {
        self.state_count
    }

    fn symbol_name(&self, symbol: Symbol) -> Option<&str> {
        self.symbol_names.get(usize::from(symbol)).map(String::as_str)
    }

    fn symbol_metadata(&self, symbol: Symbol) -> SymbolMetadata {
        self.symbol_metadata
            .get(usize::from(symbol))
            .copied()
            .unwrap_or_default()
    }

    fn actions(&self, state: StateId, symbol: Symbol) -> &[ParseAction] {
        let index = usize::from(state) * self.token_count + usize::from(symbol);
        self.parse_actions
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn next_state(&self, state: StateId, symbol: Symbol) -> StateId {
        let Some(offset) = usize::from(symbol).checked_sub(self.token_count) else {
            return 0;
        };
        let index = usize::from(state) * self.nonterminal_count() + offset;
        self.goto_table.get(index).copied().unwrap_or(0)
    }

    fn lex_mode(&self, state: StateId) -> LexMode {
        self.lex_modes
            .get(usize::from(state))
            .copied()
            .unwrap_or_default()
    }

    fn lex(&self, lexer: &mut Lexer<'_>, lex_state: StateId) -> bool {
        self.lex_table.lex(lexer, lex_state)
    }

    fn external_scanner(&self) -> Option<&dyn ExternalScanner> {
        self.external_scanner.as_deref()
    }

    fn external_symbols(&self) -> &[Symbol] {
        &self.external_symbols
    }

    fn field_count(&self) -> usize {
        self.field_names.len()
    }

    fn field_name(&self, field_id: FieldId) -> Option<&str> {
        let index = usize::from(field_id).checked_sub(1)?;
        self.field_names.get(index).map(String::as_str)
    }

    fn field_map(&self, production_id: u16) -> &[FieldMapEntry] {
        self.field_maps
            .get(usize::from(production_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
