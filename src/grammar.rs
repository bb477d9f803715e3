//! Build a [`LanguageTable`] from grammar rules written as data.
//!
//! This is a small SLR(1) generator. It exists so that grammars can be
//! supplied at runtime and so the engine can be exercised without a separate
//! code generator; the tables it emits have exactly the shape a generator
//! would write out ahead of time.
//!
//! Rules are written as alternatives of whitespace-separated items:
//!
//! - `name` refers to a token or another rule;
//! - `'text'` or `"text"` is a literal token, registered on first use;
//! - `field:item` labels the child with a field name;
//! - `item?`, `item*` and `item+` make an item optional or repeated;
//! - an empty alternative matches nothing.
//!
//! Rules whose names start with `_` are hidden: their children are shown in
//! place of them. The first rule is the start rule.
//!
//! ```
//! use sitter_runtime::{GrammarBuilder, Parser};
//!
//! let language = GrammarBuilder::new("sum")
//!     .token("number", "[0-9]+")
//!     .rule("sum", ["left:number '+' right:number"])
//!     .build_language()
//!     .unwrap();
//! let mut parser = Parser::with_language(&language).unwrap();
//! let tree = parser.parse("1 + 2", None).unwrap();
//! assert_eq!(
//!     tree.root_node().to_sexp(),
//!     "(sum left: (number) right: (number))"
//! );
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use tracing::debug;

use crate::error::GrammarError;
use crate::language::{
    FieldMapEntry, Language, LanguageTable, LexMode, ParseAction, StateId, Symbol,
    SymbolMetadata, BUILTIN_SYM_END, BUILTIN_SYM_ERROR,
};
use crate::lex_table::{LexTable, DEFAULT_SKIP_PATTERN};
use crate::language::ExternalScanner;
use crate::reduce_action::{ReduceAction, ReduceActionSet};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum TokenKind {
    Pattern(String),
    External,
}

#[derive(Clone, Debug)]
struct TokenDef {
    name: String,
    kind: TokenKind,
    extra: bool,
}

#[derive(Clone, Debug)]
struct RuleDef {
    name: String,
    alternatives: Vec<String>,
}

/// Collects grammar rules and builds a parse table from them.
///
/// Every method takes and returns the builder so that a grammar reads as one
/// expression. Problems are reported by [`build`](Self::build).
pub struct GrammarBuilder {
    name: String,
    tokens: Vec<TokenDef>,
    literals: Vec<String>,
    extra_names: Vec<String>,
    rules: Vec<RuleDef>,
    skip: Option<String>,
    external_scanner: Option<Box<dyn ExternalScanner>>,
}

impl fmt::Debug for GrammarBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrammarBuilder")
            .field("name", &self.name)
            .field("tokens", &self.tokens)
            .field("literals", &self.literals)
            .field("rules", &self.rules)
            .field("skip", &self.skip)
            .field("external_scanner", &self.external_scanner.is_some())
            .finish()
    }
}

impl GrammarBuilder {
    /// A new grammar that skips whitespace between tokens.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tokens: Vec::new(),
            literals: Vec::new(),
            extra_names: Vec::new(),
            rules: Vec::new(),
            skip: Some(DEFAULT_SKIP_PATTERN.to_string()),
            external_scanner: None,
        }
    }

    /// A named token matched by a regular expression.
    #[must_use]
    pub fn token(mut self, name: &str, pattern: &str) -> Self {
        self.tokens.push(TokenDef {
            name: name.to_string(),
            kind: TokenKind::Pattern(pattern.to_string()),
            extra: false,
        });
        self
    }

    /// An anonymous token matching `text` exactly. Literals used in rules
    /// are registered automatically; this only fixes their order.
    #[must_use]
    pub fn literal(mut self, text: &str) -> Self {
        if !self.literals.iter().any(|literal| literal == text) {
            self.literals.push(text.to_string());
        }
        self
    }

    /// A named token that may appear between any two tokens, like a comment.
    #[must_use]
    pub fn extra(mut self, name: &str, pattern: &str) -> Self {
        self.tokens.push(TokenDef {
            name: name.to_string(),
            kind: TokenKind::Pattern(pattern.to_string()),
            extra: true,
        });
        self
    }

    /// A token recognized by the external scanner. External tokens are
    /// numbered in the order they are declared.
    #[must_use]
    pub fn external(mut self, name: &str) -> Self {
        self.tokens.push(TokenDef {
            name: name.to_string(),
            kind: TokenKind::External,
            extra: false,
        });
        self
    }

    /// Mark an already declared token, for example an external one, as an extra.
    #[must_use]
    pub fn extra_token(mut self, name: &str) -> Self {
        self.extra_names.push(name.to_string());
        self
    }

    #[must_use]
    pub fn external_scanner(mut self, scanner: impl ExternalScanner + 'static) -> Self {
        self.external_scanner = Some(Box::new(scanner));
        self
    }

    /// Set the text skipped before every token, or `None` to skip nothing.
    #[must_use]
    pub fn skip(mut self, pattern: Option<&str>) -> Self {
        self.skip = pattern.map(str::to_string);
        self
    }

    /// Add a rule with one or more alternatives.
    #[must_use]
    pub fn rule<I>(mut self, name: &str, alternatives: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.rules.push(RuleDef {
            name: name.to_string(),
            alternatives: alternatives
                .into_iter()
                .map(|alternative| alternative.as_ref().to_string())
                .collect(),
        });
        self
    }

    pub fn build_language(self) -> Result<Language, GrammarError> {
        Ok(Language::new(self.build()?))
    }

    pub fn build(self) -> Result<LanguageTable, GrammarError> {
        let grammar = Grammar::new(self)?;
        let automaton = Automaton::new(&grammar)?;
        let sets = FirstFollow::new(&grammar);
        grammar.into_table(&automaton, &sets)
    }
}

// ---------------------------------------------------------------------------
// Rule items
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
enum ItemKind {
    Name(String),
    Literal(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Item {
    field: Option<String>,
    kind: ItemKind,
    suffix: Option<char>,
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn parse_literal(text: &str) -> Option<&str> {
    let quote = text.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let inner = text.strip_prefix(quote)?.strip_suffix(quote)?;
    (!inner.is_empty()).then_some(inner)
}

fn parse_item(text: &str) -> Result<Item, GrammarError> {
    let invalid = || GrammarError::InvalidItem(text.to_string());

    let (field, rest) = match text.split_once(':') {
        Some((field, rest))
            if !text.starts_with(['\'', '"']) && is_identifier(field) && !rest.is_empty() =>
        {
            (Some(field.to_string()), rest)
        }
        _ => (None, text),
    };

    let (body, suffix) = match rest.char_indices().last() {
        Some((index, c @ ('*' | '+' | '?'))) if index > 0 => {
            let body = &rest[..index];
            if is_identifier(body) || parse_literal(body).is_some() {
                (body, Some(c))
            } else {
                (rest, None)
            }
        }
        _ => (rest, None),
    };

    let kind = if let Some(literal) = parse_literal(body) {
        ItemKind::Literal(literal.to_string())
    } else if is_identifier(body) {
        ItemKind::Name(body.to_string())
    } else {
        return Err(invalid());
    };
    Ok(Item { field, kind, suffix })
}

// ---------------------------------------------------------------------------
// Grammar
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Production {
    lhs: Symbol,
    rhs: Vec<Symbol>,
    /// `(child_index, field_name)` pairs.
    fields: Vec<(u16, String)>,
}

/// Production `0` is the augmented start `S' -> start`.
const AUGMENTED_PRODUCTION: usize = 0;

struct Grammar {
    name: String,
    symbol_names: Vec<String>,
    symbol_metadata: Vec<SymbolMetadata>,
    token_count: usize,
    start_symbol: Symbol,
    productions: Vec<Production>,
    productions_by_lhs: Vec<Vec<usize>>,
    extras: Vec<Symbol>,
    external_symbols: Vec<Symbol>,
    lex_table: LexTable,
    external_scanner: Option<Box<dyn ExternalScanner>>,
}

fn to_symbol(index: usize) -> Result<Symbol, GrammarError> {
    Symbol::try_from(index)
        .ok()
        .filter(|&symbol| symbol < BUILTIN_SYM_ERROR)
        .ok_or(GrammarError::TooLarge("symbols"))
}

impl Grammar {
    fn new(builder: GrammarBuilder) -> Result<Self, GrammarError> {
        let GrammarBuilder {
            name,
            tokens,
            mut literals,
            extra_names,
            rules,
            skip,
            external_scanner,
        } = builder;
        if rules.is_empty() {
            return Err(GrammarError::NoRules);
        }

        // Parse every item first so that literals can be numbered with the
        // other terminals.
        let mut parsed_rules = Vec::with_capacity(rules.len());
        for rule in &rules {
            if rule.alternatives.is_empty() {
                return Err(GrammarError::EmptyRule(rule.name.clone()));
            }
            let mut alternatives = Vec::with_capacity(rule.alternatives.len());
            for alternative in &rule.alternatives {
                let items = alternative
                    .split_whitespace()
                    .map(parse_item)
                    .collect::<Result<Vec<_>, _>>()?;
                for item in &items {
                    if let ItemKind::Literal(text) = &item.kind {
                        if !literals.contains(text) {
                            literals.push(text.clone());
                        }
                    }
                }
                alternatives.push(items);
            }
            parsed_rules.push(alternatives);
        }

        let mut symbol_names = vec!["end".to_string()];
        let mut symbol_metadata = vec![SymbolMetadata {
            visible: false,
            named: true,
        }];
        let mut named_symbols: HashMap<String, Symbol> = HashMap::new();
        let mut literal_symbols: HashMap<String, Symbol> = HashMap::new();
        let mut lex_table = LexTable::new();
        lex_table.set_skip(skip.as_deref())?;
        let mut extras = Vec::new();
        let mut external_symbols = Vec::new();

        for token in &tokens {
            let symbol = to_symbol(symbol_names.len())?;
            if named_symbols.insert(token.name.clone(), symbol).is_some() {
                return Err(GrammarError::DuplicateSymbol(token.name.clone()));
            }
            match &token.kind {
                TokenKind::Pattern(pattern) => lex_table.add_pattern(symbol, &token.name, pattern)?,
                TokenKind::External => external_symbols.push(symbol),
            }
            if token.extra {
                extras.push(symbol);
            }
            symbol_names.push(token.name.clone());
            symbol_metadata.push(SymbolMetadata {
                visible: !token.name.starts_with('_'),
                named: true,
            });
        }
        for literal in &literals {
            let symbol = to_symbol(symbol_names.len())?;
            lex_table.add_literal(symbol, literal);
            literal_symbols.insert(literal.clone(), symbol);
            symbol_names.push(literal.clone());
            symbol_metadata.push(SymbolMetadata {
                visible: true,
                named: false,
            });
        }
        for name in &extra_names {
            let symbol = *named_symbols
                .get(name)
                .ok_or_else(|| GrammarError::UnknownSymbol(name.clone()))?;
            if !extras.contains(&symbol) {
                extras.push(symbol);
            }
        }
        let token_count = symbol_names.len();

        for rule in &rules {
            let symbol = to_symbol(symbol_names.len())?;
            if named_symbols.insert(rule.name.clone(), symbol).is_some() {
                return Err(GrammarError::DuplicateSymbol(rule.name.clone()));
            }
            symbol_names.push(rule.name.clone());
            symbol_metadata.push(SymbolMetadata {
                visible: !rule.name.starts_with('_'),
                named: true,
            });
        }
        let start_symbol = to_symbol(token_count)?;

        let mut grammar = Self {
            name,
            symbol_names,
            symbol_metadata,
            token_count,
            start_symbol,
            productions: vec![Production {
                lhs: start_symbol,
                rhs: vec![start_symbol],
                fields: Vec::new(),
            }],
            productions_by_lhs: Vec::new(),
            extras,
            external_symbols,
            lex_table,
            external_scanner,
        };

        let mut expander = Expander {
            named_symbols: &named_symbols,
            literal_symbols: &literal_symbols,
            repeats: HashMap::new(),
            repeat_count: 0,
        };
        for (index, alternatives) in parsed_rules.iter().enumerate() {
            let lhs = to_symbol(token_count + index)?;
            for items in alternatives {
                for (rhs, fields) in expander.expand(&mut grammar, &rules[index].name, items)? {
                    grammar.productions.push(Production { lhs, rhs, fields });
                }
            }
        }

        let mut productions_by_lhs = vec![Vec::new(); grammar.symbol_names.len() - token_count];
        for (index, production) in grammar.productions.iter().enumerate().skip(1) {
            productions_by_lhs[usize::from(production.lhs) - token_count].push(index);
        }
        grammar.productions_by_lhs = productions_by_lhs;
        Ok(grammar)
    }

    fn is_terminal(&self, symbol: Symbol) -> bool {
        usize::from(symbol) < self.token_count
    }

    fn nonterminal_count(&self) -> usize {
        self.symbol_names.len() - self.token_count
    }

    fn add_repeat_symbol(&mut self, rule_name: &str, number: usize) -> Result<Symbol, GrammarError> {
        let symbol = to_symbol(self.symbol_names.len())?;
        self.symbol_names.push(format!("{rule_name}_repeat{number}"));
        self.symbol_metadata.push(SymbolMetadata {
            visible: false,
            named: false,
        });
        Ok(symbol)
    }

    /// The LR(0) closure of a kernel item set.
    fn closure(&self, kernel: &BTreeSet<LrItem>) -> Vec<LrItem> {
        let mut items: Vec<LrItem> = kernel.iter().copied().collect();
        let mut expanded = BTreeSet::new();
        let mut index = 0;
        while index < items.len() {
            let (production, dot) = items[index];
            if let Some(&symbol) = self.productions[production].rhs.get(dot) {
                if !self.is_terminal(symbol) && expanded.insert(symbol) {
                    for &next in &self.productions_by_lhs[usize::from(symbol) - self.token_count] {
                        items.push((next, 0));
                    }
                }
            }
            index += 1;
        }
        items
    }

    fn describe_production(&self, production: usize) -> String {
        let production = &self.productions[production];
        let mut out = format!("{} ->", self.symbol_names[usize::from(production.lhs)]);
        for &symbol in &production.rhs {
            out.push(' ');
            if self.symbol_metadata[usize::from(symbol)].named {
                out.push_str(&self.symbol_names[usize::from(symbol)]);
            } else {
                out.push('\'');
                out.push_str(&self.symbol_names[usize::from(symbol)]);
                out.push('\'');
            }
        }
        out
    }

    fn into_table(self, automaton: &Automaton, sets: &FirstFollow) -> Result<LanguageTable, GrammarError> {
        let token_count = self.token_count;
        let nonterminal_count = self.nonterminal_count();
        let state_count = automaton.states.len() + 1;

        // Fields are numbered from 1 in alphabetical order.
        let field_names: Vec<String> = self
            .productions
            .iter()
            .flat_map(|production| production.fields.iter().map(|(_, name)| name.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let field_id = |name: &str| {
            field_names
                .iter()
                .position(|field| field == name)
                .map_or(0, |index| index as u16 + 1)
        };
        let mut field_maps: Vec<Vec<FieldMapEntry>> = vec![Vec::new()];
        let mut production_ids = Vec::with_capacity(self.productions.len());
        for production in &self.productions {
            let mut map: Vec<FieldMapEntry> = production
                .fields
                .iter()
                .map(|(child_index, name)| FieldMapEntry {
                    field_id: field_id(name),
                    child_index: *child_index,
                })
                .collect();
            map.sort_by_key(|entry| (entry.field_id, entry.child_index));
            let id = match field_maps.iter().position(|existing| *existing == map) {
                Some(id) => id,
                None => {
                    field_maps.push(map);
                    field_maps.len() - 1
                }
            };
            production_ids.push(u16::try_from(id).map_err(|_| GrammarError::TooLarge("productions"))?);
        }

        let mut parse_actions = vec![Vec::new(); state_count * token_count];
        let mut goto_table = vec![0; state_count * nonterminal_count];

        for (index, items) in automaton.states.iter().enumerate() {
            let state = (index + 1) as StateId;
            let transitions = &automaton.transitions[index];
            let mut shifts: BTreeMap<Symbol, StateId> = BTreeMap::new();
            let mut reduces: BTreeMap<Symbol, ReduceActionSet> = BTreeMap::new();
            let mut accepts = false;

            for &(production_index, dot) in items {
                let production = &self.productions[production_index];
                match production.rhs.get(dot) {
                    Some(&symbol) if self.is_terminal(symbol) => {
                        if let Some(&target) = transitions.get(&symbol) {
                            shifts.insert(symbol, (target + 1) as StateId);
                        }
                    }
                    Some(_) => {}
                    None if production_index == AUGMENTED_PRODUCTION => accepts = true,
                    None => {
                        let action = ReduceAction {
                            count: production.rhs.len() as u16,
                            symbol: production.lhs,
                            production_id: production_ids[production_index],
                            production: production_index,
                        };
                        for &lookahead in &sets.follow[usize::from(production.lhs) - token_count] {
                            reduces.entry(lookahead).or_default().add(action);
                        }
                    }
                }
            }

            for (&symbol, &target) in transitions {
                if !self.is_terminal(symbol) {
                    let offset = usize::from(symbol) - token_count;
                    goto_table[usize::from(state) * nonterminal_count + offset] = (target + 1) as StateId;
                }
            }

            for symbol in 0..token_count as Symbol {
                let shift = shifts.get(&symbol).copied();
                let reduce = reduces.get(&symbol).filter(|set| !set.is_empty());
                let accept = accepts && symbol == BUILTIN_SYM_END;
                let conflict = |detail: String| GrammarError::Conflict {
                    state,
                    symbol,
                    symbol_name: self.symbol_names[usize::from(symbol)].clone(),
                    detail,
                };

                let action = match (shift, reduce, accept) {
                    (Some(_), Some(set), _) => {
                        return Err(conflict(format!(
                            "shift/reduce with `{}`",
                            self.describe_production(set.actions[0].production)
                        )));
                    }
                    (_, Some(set), _) if set.actions.len() > 1 || accept => {
                        let productions: Vec<String> = set
                            .actions
                            .iter()
                            .map(|action| format!("`{}`", self.describe_production(action.production)))
                            .collect();
                        return Err(conflict(format!("reduce/reduce between {}", productions.join(" and "))));
                    }
                    (Some(target), None, _) => Some(ParseAction::Shift {
                        state: target,
                        extra: false,
                    }),
                    (None, Some(set), false) => {
                        let action = set.actions[0];
                        Some(ParseAction::Reduce {
                            symbol: action.symbol,
                            child_count: action.count,
                            production_id: action.production_id,
                        })
                    }
                    (None, None, true) => Some(ParseAction::Accept),
                    _ => None,
                };

                let cell = &mut parse_actions[usize::from(state) * token_count + usize::from(symbol)];
                match action {
                    Some(action) => cell.push(action),
                    None if self.extras.contains(&symbol) => cell.push(ParseAction::Shift {
                        state,
                        extra: true,
                    }),
                    None => {}
                }
            }
        }

        // Lex modes: one lex state per distinct set of valid internal
        // tokens, one external lex state per distinct set of valid external
        // tokens.
        let mut lex_table = self.lex_table;
        let mut lex_states: BTreeMap<Vec<Symbol>, StateId> = BTreeMap::new();
        let mut external_lex_states: BTreeMap<Vec<Symbol>, StateId> = BTreeMap::new();
        let internal_tokens: Vec<Symbol> = (1..token_count as Symbol)
            .filter(|symbol| !self.external_symbols.contains(symbol))
            .collect();

        let mut lex_modes = Vec::with_capacity(state_count);
        for state in 0..state_count {
            let (internal, external): (Vec<Symbol>, Vec<Symbol>) = if state == 0 {
                (internal_tokens.clone(), self.external_symbols.clone())
            } else {
                (1..token_count as Symbol)
                    .filter(|&symbol| !parse_actions[state * token_count + usize::from(symbol)].is_empty())
                    .partition(|symbol| !self.external_symbols.contains(symbol))
            };
            let lex_state = match lex_states.get(&internal) {
                Some(&id) => id,
                None => {
                    let id = lex_table.add_state(internal.clone());
                    lex_states.insert(internal, id);
                    id
                }
            };
            let external_lex_state = if external.is_empty() {
                0
            } else {
                let next_id = external_lex_states.len() as StateId + 1;
                *external_lex_states.entry(external).or_insert(next_id)
            };
            lex_modes.push(LexMode {
                lex_state,
                external_lex_state,
            });
        }

        debug!(
            target: "sitter_runtime::grammar",
            name = %self.name,
            symbols = self.symbol_names.len(),
            tokens = token_count,
            states = state_count,
            lex_states = lex_table.state_count(),
            "built parse table"
        );

        Ok(LanguageTable {
            name: self.name,
            symbol_names: self.symbol_names,
            symbol_metadata: self.symbol_metadata,
            token_count,
            state_count,
            parse_actions,
            goto_table,
            lex_modes,
            lex_table,
            field_names,
            field_maps,
            external_symbols: self.external_symbols,
            external_scanner: self.external_scanner,
        })
    }
}

/// Resolves parsed items into symbol sequences, expanding `?`, `*` and `+`.
struct Expander<'a> {
    named_symbols: &'a HashMap<String, Symbol>,
    literal_symbols: &'a HashMap<String, Symbol>,
    /// Repetition rules already created, keyed by item and field.
    repeats: HashMap<(Symbol, Option<String>), Symbol>,
    repeat_count: usize,
}

type Sequence = (Vec<Symbol>, Vec<(u16, String)>);

impl Expander<'_> {
    fn resolve(&self, item: &Item) -> Result<Symbol, GrammarError> {
        match &item.kind {
            ItemKind::Name(name) => self
                .named_symbols
                .get(name)
                .copied()
                .ok_or_else(|| GrammarError::UnknownSymbol(name.clone())),
            ItemKind::Literal(text) => self
                .literal_symbols
                .get(text)
                .copied()
                .ok_or_else(|| GrammarError::UnknownSymbol(text.clone())),
        }
    }

    fn expand(
        &mut self,
        grammar: &mut Grammar,
        rule_name: &str,
        items: &[Item],
    ) -> Result<Vec<Sequence>, GrammarError> {
        let mut sequences: Vec<Sequence> = vec![(Vec::new(), Vec::new())];
        for item in items {
            let symbol = self.resolve(item)?;
            let (symbol, field, optional) = match item.suffix {
                None => (symbol, item.field.clone(), false),
                Some('?') => (symbol, item.field.clone(), true),
                Some(suffix) => {
                    let repeat = self.repeat(grammar, rule_name, symbol, item.field.clone())?;
                    (repeat, None, suffix == '*')
                }
            };

            let mut next = Vec::with_capacity(sequences.len() * 2);
            for (rhs, fields) in sequences {
                if optional {
                    next.push((rhs.clone(), fields.clone()));
                }
                let mut rhs = rhs;
                let mut fields = fields;
                if let Some(field) = &field {
                    fields.push((rhs.len() as u16, field.clone()));
                }
                rhs.push(symbol);
                next.push((rhs, fields));
            }
            sequences = next;
        }
        Ok(sequences)
    }

    /// A hidden left-recursive rule matching one or more `symbol`s.
    fn repeat(
        &mut self,
        grammar: &mut Grammar,
        rule_name: &str,
        symbol: Symbol,
        field: Option<String>,
    ) -> Result<Symbol, GrammarError> {
        let key = (symbol, field.clone());
        if let Some(&repeat) = self.repeats.get(&key) {
            return Ok(repeat);
        }
        self.repeat_count += 1;
        let repeat = grammar.add_repeat_symbol(rule_name, self.repeat_count)?;
        let field_at = |index: u16| {
            field
                .iter()
                .map(|field| (index, field.clone()))
                .collect::<Vec<_>>()
        };
        grammar.productions.push(Production {
            lhs: repeat,
            rhs: vec![repeat, symbol],
            fields: field_at(1),
        });
        grammar.productions.push(Production {
            lhs: repeat,
            rhs: vec![symbol],
            fields: field_at(0),
        });
        self.repeats.insert(key, repeat);
        Ok(repeat)
    }
}

// ---------------------------------------------------------------------------
// LR(0) automaton
// ---------------------------------------------------------------------------

/// `(production, dot position)`
type LrItem = (usize, usize);

struct Automaton {
    /// Closed item sets. Set `i` becomes table state `i + 1`.
    states: Vec<Vec<LrItem>>,
    transitions: Vec<BTreeMap<Symbol, usize>>,
}

impl Automaton {
    fn new(grammar: &Grammar) -> Result<Self, GrammarError> {
        let start: BTreeSet<LrItem> = BTreeSet::from([(AUGMENTED_PRODUCTION, 0)]);
        let mut kernels: HashMap<BTreeSet<LrItem>, usize> = HashMap::from([(start.clone(), 0)]);
        let mut queue = vec![start];
        let mut states = Vec::new();
        let mut transitions = Vec::new();

        let mut index = 0;
        while index < queue.len() {
            let items = grammar.closure(&queue[index]);
            let mut next: BTreeMap<Symbol, BTreeSet<LrItem>> = BTreeMap::new();
            for &(production, dot) in &items {
                if let Some(&symbol) = grammar.productions[production].rhs.get(dot) {
                    next.entry(symbol).or_default().insert((production, dot + 1));
                }
            }

            let mut edges = BTreeMap::new();
            for (symbol, kernel) in next {
                let target = match kernels.get(&kernel) {
                    Some(&target) => target,
                    None => {
                        let target = queue.len();
                        kernels.insert(kernel.clone(), target);
                        queue.push(kernel);
                        target
                    }
                };
                edges.insert(symbol, target);
            }
            states.push(items);
            transitions.push(edges);

            if queue.len() >= usize::from(StateId::MAX) {
                return Err(GrammarError::TooLarge("states"));
            }
            index += 1;
        }
        Ok(Self { states, transitions })
    }
}

// ---------------------------------------------------------------------------
// FIRST and FOLLOW sets
// ---------------------------------------------------------------------------

struct FirstFollow {
    /// Indexed by non-terminal offset.
    follow: Vec<BTreeSet<Symbol>>,
}

impl FirstFollow {
    fn new(grammar: &Grammar) -> Self {
        let count = grammar.nonterminal_count();
        let offset = |symbol: Symbol| usize::from(symbol) - grammar.token_count;
        let mut nullable = vec![false; count];
        let mut first: Vec<BTreeSet<Symbol>> = vec![BTreeSet::new(); count];

        let mut changed = true;
        while changed {
            changed = false;
            for production in grammar.productions.iter().skip(1) {
                let lhs = offset(production.lhs);
                let mut all_nullable = true;
                for &symbol in &production.rhs {
                    if grammar.is_terminal(symbol) {
                        changed |= first[lhs].insert(symbol);
                        all_nullable = false;
                        break;
                    }
                    let symbol_first = first[offset(symbol)].clone();
                    for terminal in symbol_first {
                        changed |= first[lhs].insert(terminal);
                    }
                    if !nullable[offset(symbol)] {
                        all_nullable = false;
                        break;
                    }
                }
                if all_nullable && !nullable[lhs] {
                    nullable[lhs] = true;
                    changed = true;
                }
            }
        }

        let mut follow: Vec<BTreeSet<Symbol>> = vec![BTreeSet::new(); count];
        follow[offset(grammar.start_symbol)].insert(BUILTIN_SYM_END);
        let mut changed = true;
        while changed {
            changed = false;
            for production in grammar.productions.iter().skip(1) {
                let lhs = offset(production.lhs);
                for (index, &symbol) in production.rhs.iter().enumerate() {
                    if grammar.is_terminal(symbol) {
                        continue;
                    }
                    let target = offset(symbol);
                    let mut rest_nullable = true;
                    let mut additions = BTreeSet::new();
                    for &next in &production.rhs[index + 1..] {
                        if grammar.is_terminal(next) {
                            additions.insert(next);
                            rest_nullable = false;
                            break;
                        }
                        additions.extend(first[offset(next)].iter().copied());
                        if !nullable[offset(next)] {
                            rest_nullable = false;
                            break;
                        }
                    }
                    if rest_nullable {
                        additions.extend(follow[lhs].iter().copied());
                    }
                    for terminal in additions {
                        changed |= follow[target].insert(terminal);
                    }
                }
            }
        }
        Self { follow }
    }
}
