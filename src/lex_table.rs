//! A table-driven internal lexer built from literals and regular expressions.
//!
//! Each terminal gets one anchored matcher. A lex state is just the set of
//! terminals that are valid in it. Matching picks the longest token; on a tie
//! a literal beats a pattern, then the lower symbol wins. Because matching
//! happens inside the regex engine rather than through [`Lexer::advance`],
//! the examined extent is reported with [`Lexer::note_lookahead`]. For a
//! pattern that extent is measured by running an anchored DFA until no match
//! is possible any more, which can be well past the end of the match.

use regex::bytes::Regex;
use regex_automata::dfa::{dense, Automaton, StartKind};
use regex_automata::util::syntax;
use regex_automata::{Anchored, Input};
use regex_syntax::ParserBuilder;

use crate::error::GrammarError;
use crate::language::{StateId, Symbol, BUILTIN_SYM_END};
use crate::lexer::Lexer;

pub const DEFAULT_SKIP_PATTERN: &str = r"\s+";

/// Larger DFAs are not built; such patterns count as examining the rest of
/// the input.
const DFA_SIZE_LIMIT: usize = 1 << 20;

#[derive(Clone, Debug)]
enum Matcher {
    Literal(Vec<u8>),
    Pattern(Pattern),
}

#[derive(Clone, Debug)]
struct Pattern {
    regex: Regex,
    dfa: Option<dense::DFA<Vec<u32>>>,
    max_len: Option<usize>,
}

impl Pattern {
    fn match_len(&self, rest: &[u8]) -> usize {
        self.regex.find(rest).map_or(0, |m| m.end())
    }

    /// Number of bytes of `rest` a match attempt reads, including the byte
    /// that rules out a longer match. Reaching the end of `rest` counts one
    /// byte past it.
    fn examined_len(&self, rest: &[u8]) -> usize {
        let Some(dfa) = &self.dfa else {
            return self.max_len.map_or(rest.len(), |max| max.min(rest.len())) + 1;
        };
        let input = Input::new(rest).anchored(Anchored::Yes);
        let Ok(mut state) = dfa.start_state_forward(&input) else {
            return rest.len() + 1;
        };
        for (index, &byte) in rest.iter().enumerate() {
            state = dfa.next_state(state, byte);
            if dfa.is_dead_state(state) {
                return index + 1;
            }
            if dfa.is_quit_state(state) {
                return rest.len() + 1;
            }
        }
        rest.len() + 1
    }
}

#[derive(Clone, Debug, Default)]
pub struct LexTable {
    tokens: Vec<Option<Matcher>>,
    states: Vec<Vec<Symbol>>,
    skip: Option<Pattern>,
}

impl LexTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table that skips whitespace matching [`DEFAULT_SKIP_PATTERN`].
    pub fn with_default_skip() -> Result<Self, GrammarError> {
        let mut table = Self::new();
        table.set_skip(Some(DEFAULT_SKIP_PATTERN))?;
        Ok(table)
    }

    pub fn add_literal(&mut self, symbol: Symbol, literal: &str) {
        self.set_matcher(symbol, Matcher::Literal(literal.as_bytes().to_vec()));
    }

    pub fn add_pattern(
        &mut self,
        symbol: Symbol,
        name: &str,
        pattern: &str,
    ) -> Result<(), GrammarError> {
        let pattern = compile(name, pattern)?;
        self.set_matcher(symbol, Matcher::Pattern(pattern));
        Ok(())
    }

    /// Set the text skipped before every token, or `None` to skip nothing.
    pub fn set_skip(&mut self, pattern: Option<&str>) -> Result<(), GrammarError> {
        self.skip = match pattern {
            Some(pattern) => Some(compile("<skip>", pattern)?),
            None => None,
        };
        Ok(())
    }

    /// Register a lex state accepting `symbols` and return its id.
    pub fn add_state(&mut self, symbols: Vec<Symbol>) -> StateId {
        self.states.push(symbols);
        (self.states.len() - 1) as StateId
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    fn set_matcher(&mut self, symbol: Symbol, matcher: Matcher) {
        let index = usize::from(symbol);
        if self.tokens.len() <= index {
            self.tokens.resize(index + 1, None);
        }
        self.tokens[index] = Some(matcher);
    }

    /// Scan one token. At the end of input this always yields `END`.
    pub fn lex(&self, lexer: &mut Lexer<'_>, lex_state: StateId) -> bool {
        let Some(valid) = self.states.get(usize::from(lex_state)) else {
            return false;
        };

        if let Some(skip) = &self.skip {
            let position = lexer.position().bytes as usize;
            let rest = lexer.remaining();
            let len = skip.match_len(rest);
            lexer.note_lookahead(position + skip.examined_len(rest));
            if len > 0 {
                lexer.skip_bytes(len);
            }
        }

        if lexer.eof() {
            lexer.set_result_symbol(BUILTIN_SYM_END);
            lexer.mark_end();
            return true;
        }

        let position = lexer.position().bytes as usize;
        let rest = lexer.remaining();
        let mut examined = 1;
        // (length, is_literal, symbol)
        let mut best: Option<(usize, bool, Symbol)> = None;

        for &symbol in valid {
            let Some(Some(matcher)) = self.tokens.get(usize::from(symbol)) else {
                continue;
            };
            let (len, is_literal) = match matcher {
                Matcher::Literal(literal) => {
                    let common = literal
                        .iter()
                        .zip(rest)
                        .take_while(|(a, b)| a == b)
                        .count();
                    examined = examined.max(common + 1);
                    let len = if common == literal.len() { common } else { 0 };
                    (len, true)
                }
                Matcher::Pattern(pattern) => {
                    examined = examined.max(pattern.examined_len(rest));
                    (pattern.match_len(rest), false)
                }
            };
            if len == 0 {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_len, best_literal, _)) => {
                    len > best_len || (len == best_len && is_literal && !best_literal)
                }
            };
            if better {
                best = Some((len, is_literal, symbol));
            }
        }

        lexer.note_lookahead(position + examined);
        match best {
            Some((len, _, symbol)) => {
                lexer.advance_bytes(len);
                lexer.mark_end();
                lexer.set_result_symbol(symbol);
                true
            }
            None => false,
        }
    }
}

/// Compile an anchored matcher, rejecting patterns that can match nothing.
fn compile(name: &str, pattern: &str) -> Result<Pattern, GrammarError> {
    let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|source| {
        GrammarError::InvalidPattern {
            name: name.to_string(),
            source: Box::new(source),
        }
    })?;
    let hir = ParserBuilder::new()
        .utf8(false)
        .build()
        .parse(pattern)
        .ok();
    let properties = hir.as_ref().map(|hir| hir.properties());
    if properties.and_then(|p| p.minimum_len()) == Some(0) {
        return Err(GrammarError::EmptyPattern(name.to_string()));
    }
    let dfa = dense::Builder::new()
        .configure(
            dense::Config::new()
                .start_kind(StartKind::Anchored)
                .dfa_size_limit(Some(DFA_SIZE_LIMIT)),
        )
        .syntax(syntax::Config::new().utf8(false))
        .build(pattern)
        .ok();
    Ok(Pattern {
        regex,
        dfa,
        max_len: properties.and_then(|p| p.maximum_len()),
    })
}
