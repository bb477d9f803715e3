#![allow(dead_code)]

use sitter_runtime::{
    ExternalScanner, ExternalScannerState, GrammarBuilder, InputEdit, Language, Lexer, Node,
    Parser, StreamingIterator, Tree,
};

/// `expr := num '+' num`
pub fn sum_language() -> Language {
    GrammarBuilder::new("sum")
        .token("num", "[a-z0-9]+")
        .rule("expr", ["num '+' num"])
        .build_language()
        .expect("sum grammar")
}

/// Assignments of left-associative sums, with `#` comments.
pub fn calc_language() -> Language {
    GrammarBuilder::new("calc")
        .token("number", "[0-9]+")
        .token("identifier", "[a-z_]+")
        .extra("comment", "#[^\n]*")
        .rule("program", ["statement*"])
        .rule("statement", ["name:identifier '=' value:_expression ';'"])
        .rule("_expression", ["binary", "_term"])
        .rule("binary", ["left:_expression '+' right:_term"])
        .rule("_term", ["number", "identifier", "'(' _expression ')'"])
        .build_language()
        .expect("calc grammar")
}

/// Words separated by nestable `/* ... */` comments.
pub fn nested_comment_language() -> Language {
    GrammarBuilder::new("nested")
        .token("identifier", "[a-z]+")
        .external("block_comment")
        .extra_token("block_comment")
        .external_scanner(NestedCommentScanner)
        .rule("program", ["identifier*"])
        .build_language()
        .expect("nested comment grammar")
}

/// Scans `/* ... */` comments, counting nesting depth.
pub struct NestedCommentScanner;

impl ExternalScanner for NestedCommentScanner {
    fn scan(
        &self,
        lexer: &mut Lexer<'_>,
        _state: &mut ExternalScannerState,
        valid_symbols: &[bool],
    ) -> bool {
        if !valid_symbols.first().copied().unwrap_or(false) {
            return false;
        }
        while lexer.lookahead().is_some_and(char::is_whitespace) {
            lexer.skip();
        }
        if lexer.lookahead() != Some('/') {
            return false;
        }
        lexer.advance();
        if lexer.lookahead() != Some('*') {
            return false;
        }
        lexer.advance();

        let mut depth = 1;
        loop {
            match lexer.lookahead() {
                None => return false,
                Some('*') => {
                    lexer.advance();
                    if lexer.lookahead() == Some('/') {
                        lexer.advance();
                        depth -= 1;
                        if depth == 0 {
                            lexer.mark_end();
                            lexer.set_result_symbol(0);
                            return true;
                        }
                    }
                }
                Some('/') => {
                    lexer.advance();
                    if lexer.lookahead() == Some('*') {
                        lexer.advance();
                        depth += 1;
                    }
                }
                Some(_) => lexer.advance(),
            }
        }
    }
}

/// Replace `text[start..end]` with `replacement`, returning the new text
/// and the matching edit.
pub fn splice(text: &str, start: usize, end: usize, replacement: &str) -> (String, InputEdit) {
    let edit = InputEdit::new(text.as_bytes(), start, end, replacement.as_bytes());
    let mut new_text = String::with_capacity(text.len() + replacement.len());
    new_text.push_str(&text[..start]);
    new_text.push_str(replacement);
    new_text.push_str(&text[end..]);
    (new_text, edit)
}

/// Edit `tree`, reparse incrementally, and check the result against a parse
/// from scratch.
pub fn reparse_and_compare(
    parser: &mut Parser,
    tree: &Tree,
    text: &str,
    start: usize,
    end: usize,
    replacement: &str,
) -> (String, Tree) {
    let (new_text, edit) = splice(text, start, end, replacement);
    let edited = tree.edit(&edit);
    let incremental = parser.parse(&new_text, Some(&edited)).expect("incremental parse");
    let fresh = parser.parse(&new_text, None).expect("fresh parse");
    assert!(
        incremental.structurally_eq(&fresh),
        "incremental parse of {new_text:?} differs:\n{}\n{}",
        incremental.root_node().to_sexp(),
        fresh.root_node().to_sexp(),
    );
    (new_text, incremental)
}

/// Every visible node below `node`, in document order.
pub fn descendants(node: Node<'_>) -> Vec<Node<'_>> {
    let mut nodes = Vec::new();
    let mut iter = node.descendants();
    while let Some(node) = iter.next() {
        nodes.push(*node);
    }
    nodes
}

pub fn kinds<'tree>(nodes: impl IntoIterator<Item = Node<'tree>>) -> Vec<&'tree str> {
    nodes.into_iter().map(|node| node.kind()).collect()
}
