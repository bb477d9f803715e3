mod helpers;

use pretty_assertions::assert_eq;
use rstest::rstest;
use sitter_runtime::{ParseError, ParseOptions, Parser, Tokens, BUILTIN_SYM_END};

use helpers::{calc_language, descendants, kinds, sum_language};

#[test]
fn parses_a_simple_sum() {
    let language = sum_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse("a+b", None).unwrap();
    let root = tree.root_node();

    assert_eq!(root.kind(), "expr");
    assert_eq!(root.byte_range(), 0..3);
    assert_eq!(kinds(root.children()), vec!["num", "+", "num"]);
    assert!(!root.has_error());
}

#[test]
fn missing_operand_becomes_a_missing_node() {
    let language = sum_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse("a+", None).unwrap();
    let root = tree.root_node();

    assert_eq!(root.byte_range(), 0..2);
    assert_eq!(root.to_sexp(), "(expr (num) (MISSING num))");
    let missing: Vec<_> = descendants(root)
        .into_iter()
        .filter(|node| node.is_missing())
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].byte_range(), 2..2);
}

#[rstest]
#[case("x = 1;", "(program (statement name: (identifier) value: (number)))")]
#[case(
    "x = 1 + 2;",
    "(program (statement name: (identifier) value: (binary left: (number) right: (number))))"
)]
#[case(
    "a = b + c + 1;",
    "(program (statement name: (identifier) value: (binary left: (binary left: (identifier) right: (identifier)) right: (number))))"
)]
#[case("", "(program)")]
fn parses_statements(#[case] source: &str, #[case] expected: &str) {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse(source, None).unwrap();
    assert_eq!(tree.root_node().to_sexp(), expected);
    assert!(!tree.root_node().has_error());
}

#[test]
fn root_spans_the_whole_text() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let source = "\n  x = 1;  \n";
    let tree = parser.parse(source, None).unwrap();
    let root = tree.root_node();
    assert_eq!(root.byte_range(), 0..source.len());
    assert_eq!(root.child(0).unwrap().byte_range(), 3..9);
    assert_eq!(tree.source_length(), source.len());
}

#[test]
fn comments_attach_where_they_appear() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse("x = 1; # one\n", None).unwrap();
    let root = tree.root_node();
    assert_eq!(kinds(root.children()), vec!["statement", "comment"]);
    assert!(root.child(1).unwrap().is_extra());
    assert_eq!(root.named_child_count(), 2);
}

#[test]
fn missing_token_is_inserted() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse("x = 1 +;", None).unwrap();
    let root = tree.root_node();

    assert!(root.has_error());
    assert_eq!(
        root.to_sexp(),
        "(program (statement name: (identifier) value: (binary left: (number) right: (MISSING number))))"
    );
    let missing: Vec<_> = descendants(root)
        .into_iter()
        .filter(|node| node.is_missing())
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].byte_range(), 7..7);
}

#[test]
fn unexpected_token_prefers_the_repair_that_parses_furthest() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse("x = 1 2;", None).unwrap();
    let missing: Vec<_> = descendants(tree.root_node())
        .into_iter()
        .filter(|node| node.is_missing())
        .collect();
    assert_eq!(kinds(missing.iter().copied()), vec!["+"]);
    assert!(!missing[0].is_named());
}

#[test]
fn unrecognized_text_becomes_an_error_node() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse("x = 1 @;", None).unwrap();
    let root = tree.root_node();

    assert!(root.has_error());
    assert_eq!(root.child(0).unwrap().kind(), "statement");
    let errors: Vec<_> = descendants(root)
        .into_iter()
        .filter(|node| node.is_error())
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].byte_range(), 6..7);
    assert!(errors[0].is_extra());
}

#[test]
fn truncated_input_is_completed_with_missing_tokens() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse("x = ", None).unwrap();
    let root = tree.root_node();

    assert_eq!(root.kind(), "program");
    assert!(root.has_error());
    let missing = descendants(root)
        .into_iter()
        .filter(|node| node.is_missing())
        .count();
    assert_eq!(missing, 2);
}

#[test]
fn hopeless_input_yields_an_error_root() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    parser.set_options(ParseOptions::default().with_recovery_window(1));
    let tree = parser.parse("x = ", None).unwrap();
    let root = tree.root_node();

    assert_eq!(root.kind(), "ERROR");
    assert!(root.is_error());
    assert_eq!(root.byte_range(), 0..4);
}

#[rstest]
#[case("x = 1 +;")]
#[case("x = = 1;; y")]
#[case("((( = 2")]
#[case("x = 1 @@ 2;")]
fn parsing_is_deterministic(#[case] source: &str) {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let first = parser.parse(source, None).unwrap();
    let second = parser.parse(source, None).unwrap();
    assert!(first.structurally_eq(&second));
    assert_eq!(first.root_node().to_sexp(), second.root_node().to_sexp());
    assert!(first.root_node().has_error());
    assert_eq!(first.root_node().byte_range(), 0..source.len());
}

#[test]
fn deep_nesting_parses() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let depth = 2000;
    let source = format!("x = {}1{};", "(".repeat(depth), ")".repeat(depth));
    let tree = parser.parse(&source, None).unwrap();
    let root = tree.root_node();

    assert!(!root.has_error());
    // program, statement, identifier, `=`, the parentheses, number, `;`
    assert_eq!(root.descendant_count(), 2 * depth + 6);
}

#[test]
fn stack_limit_is_enforced() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    parser.set_options(ParseOptions::default().with_max_stack_depth(8));
    let result = parser.parse("x = ((((((((((1))))))))));", None);
    assert_eq!(result.unwrap_err(), ParseError::ResourceExhausted { limit: 8 });
}

#[test]
fn parser_without_language_fails() {
    let mut parser = Parser::new();
    assert_eq!(parser.parse("x", None).unwrap_err(), ParseError::NoLanguage);
    assert!(parser.language().is_none());
}

#[test]
fn language_can_be_replaced() {
    let mut parser = Parser::with_language(&sum_language()).unwrap();
    let calc = calc_language();
    assert!(parser.set_language(&calc).is_ok());
    let tree = parser.parse("x = 1;", None).unwrap();
    assert_eq!(tree.language().name(), "calc");
}

#[test]
fn lexer_always_makes_progress() {
    let language = calc_language();
    let source = "x @@ = 1";
    let tokens: Vec<_> = Tokens::new(&language, source.as_bytes()).collect();

    let names: Vec<_> = tokens
        .iter()
        .map(|token| language.node_kind_for_id(token.symbol()).unwrap())
        .collect();
    assert_eq!(names, vec!["identifier", "ERROR", "=", "number", "end"]);
    assert_eq!(tokens[1].byte_range(), 2..4);
    for token in &tokens[..tokens.len() - 1] {
        assert!(token.byte_range().end > token.byte_range().start);
    }
    let last = tokens.last().unwrap();
    assert_eq!(last.symbol(), BUILTIN_SYM_END);
    assert_eq!(last.byte_range(), 8..8);
}

#[test]
fn logger_sees_recovery() {
    use std::sync::{Arc, Mutex};

    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    parser.set_logger(Some(Box::new(move |_, message: &str| {
        sink.lock().unwrap().push(message.to_string());
    })));
    parser.parse("x = 1 +;", None).unwrap();

    let lines = lines.lock().unwrap();
    assert!(lines.iter().any(|line| line.starts_with("detect_error")));
    assert!(lines.iter().any(|line| line == "recover_with_missing symbol:number"));
}
