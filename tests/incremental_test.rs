mod helpers;

use pretty_assertions::assert_eq;
use rstest::rstest;
use sitter_runtime::{
    GrammarBuilder, InputEdit, InvalidEditReason, Language, ParseError, ParseOptions, Parser,
};

use helpers::{calc_language, reparse_and_compare, splice, sum_language};

#[test]
fn untouched_tokens_are_shared() {
    let language = sum_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let old_text = "a+b";
    let tree = parser.parse(old_text, None).unwrap();

    let (new_text, edit) = splice(old_text, 0, 1, "1");
    let edited = tree.edit(&edit);
    let new_tree = parser.parse(&new_text, Some(&edited)).unwrap();

    let old_root = tree.root_node();
    let new_root = new_tree.root_node();
    assert_ne!(old_root.child(0).unwrap().id(), new_root.child(0).unwrap().id());
    assert_eq!(old_root.child(1).unwrap().id(), new_root.child(1).unwrap().id());
    assert_eq!(old_root.child(2).unwrap().id(), new_root.child(2).unwrap().id());
    assert_eq!(new_root.to_sexp(), "(expr (num) (num))");
}

#[test]
fn disabling_reuse_builds_fresh_nodes() {
    let language = sum_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let old_text = "a+b";
    let tree = parser.parse(old_text, None).unwrap();
    let (new_text, edit) = splice(old_text, 0, 1, "1");
    let edited = tree.edit(&edit);

    parser.set_options(ParseOptions::default().with_reuse_nodes(false));
    let new_tree = parser.parse(&new_text, Some(&edited)).unwrap();
    assert_ne!(
        tree.root_node().child(2).unwrap().id(),
        new_tree.root_node().child(2).unwrap().id()
    );
}

#[test]
fn editing_leaves_the_old_tree_alone() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let text = "x = 1;";
    let tree = parser.parse(text, None).unwrap();
    let before = tree.root_node().to_sexp();

    let (_, edit) = splice(text, 4, 5, "abc");
    let edited = tree.edit(&edit);

    assert_eq!(tree.root_node().to_sexp(), before);
    assert!(!tree.root_node().has_changes());
    assert!(edited.root_node().has_changes());
    assert_eq!(edited.root_node().byte_range(), 0..8);
    assert_eq!(tree.root_node().byte_range(), 0..6);
}

#[rstest]
#[case::change_a_value(15, 16, "25")]
#[case::extend_a_sum(16, 16, " + 3")]
#[case::delete_first_statement(0, 7, "")]
#[case::insert_statement_at_start(0, 0, "z = 9;\n")]
#[case::insert_comment(6, 6, " # note")]
#[case::break_syntax(4, 5, "")]
#[case::replace_everything(0, 18, "q = (1 + 2);")]
fn incremental_parse_matches_fresh_parse(
    #[case] start: usize,
    #[case] end: usize,
    #[case] replacement: &str,
) {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let text = "a = 1;\nb = a + 2;\n";
    let tree = parser.parse(text, None).unwrap();
    reparse_and_compare(&mut parser, &tree, text, start, end, replacement);
}

#[rstest]
#[case::fill_a_missing_value("a = ;\nb = 2;\n", 4, 4, "1")]
#[case::remove_a_semicolon("a = 1;\nb = 2;\n", 5, 6, "")]
#[case::repair_an_error("a = 1 2;\nb = 3;\n", 5, 6, " +")]
#[case::break_inside_parens("x = (1 + 2);", 9, 11, "")]
#[case::edit_after_an_error("a = = 1;\nb = 2;\n", 13, 14, "7")]
fn edits_around_recovered_errors(
    #[case] text: &str,
    #[case] start: usize,
    #[case] end: usize,
    #[case] replacement: &str,
) {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse(text, None).unwrap();
    reparse_and_compare(&mut parser, &tree, text, start, end, replacement);
}

#[rstest]
#[case::indent_first_statement("  a = 1;\nb = 2;", 0, 0, "\n\n")]
#[case::change_after_indent("  a = 1;\nb = 2;", 6, 7, "42")]
#[case::remove_indent("  a = 1;\nb = 2;", 0, 2, "")]
#[case::comment_before_first_statement("\n  a = 1;", 0, 0, "# top")]
fn edits_near_leading_whitespace(
    #[case] text: &str,
    #[case] start: usize,
    #[case] end: usize,
    #[case] replacement: &str,
) {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse(text, None).unwrap();
    let (new_text, new_tree) =
        reparse_and_compare(&mut parser, &tree, text, start, end, replacement);
    let first = new_tree.root_node().named_child(0).unwrap();
    assert_eq!(first.start_byte(), new_text.len() - new_text.trim_start().len());
}

#[rstest]
#[case::extend_comment_over_newline("a = 1; # note\nb = 2;", 13, 14, " ")]
#[case::end_comment_early("a = 1; # note b = 2;", 13, 14, "\n")]
#[case::join_identifiers("ab = c d;", 6, 7, "")]
#[case::grow_number_at_end("a = 1", 5, 5, "2;")]
fn edits_that_change_token_boundaries(
    #[case] text: &str,
    #[case] start: usize,
    #[case] end: usize,
    #[case] replacement: &str,
) {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse(text, None).unwrap();
    reparse_and_compare(&mut parser, &tree, text, start, end, replacement);
}

/// `s := item ';' 'z'` where `item := 'a' | 'a' 'b'`.
fn optional_suffix_language() -> Language {
    GrammarBuilder::new("suffix")
        .rule("s", ["item ';' 'z'"])
        .rule("item", ["'a'", "'a' 'b'"])
        .build_language()
        .unwrap()
}

#[test]
fn nodes_reduced_for_a_missing_token_cover_the_text_that_chose_it() {
    let language = optional_suffix_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let text = "a   z";
    let tree = parser.parse(text, None).unwrap();
    assert!(tree.root_node().has_error());

    let (_, new_tree) = reparse_and_compare(&mut parser, &tree, text, 4, 5, "b;z");
    assert!(!new_tree.root_node().has_error());
    assert_eq!(new_tree.root_node().to_sexp(), "(s (item))");
}

#[test]
fn tokens_cover_text_read_by_longer_patterns() {
    let language = GrammarBuilder::new("tags")
        .token("word", "[a-z]+")
        .token("tag", "[a-z]+ [a-z]+!")
        .rule("program", ["item*"])
        .rule("item", ["word", "tag"])
        .build_language()
        .unwrap();
    let mut parser = Parser::with_language(&language).unwrap();
    let text = "ab cd e";
    let tree = parser.parse(text, None).unwrap();
    assert_eq!(
        tree.root_node().to_sexp(),
        "(program (item (word)) (item (word)) (item (word)))"
    );

    let (_, new_tree) = reparse_and_compare(&mut parser, &tree, text, 5, 5, "!");
    assert_eq!(
        new_tree.root_node().to_sexp(),
        "(program (item (tag)) (item (word)))"
    );
}

#[rstest]
#[case::statements("a = 1;\nb = a + 2;\n")]
#[case::indented_parens("  x = (1 + y);")]
#[case::comment_and_error("a = ; # c\nb = 2")]
fn every_single_byte_edit_matches_a_fresh_parse(#[case] text: &str) {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse(text, None).unwrap();

    for position in 0..=text.len() {
        for inserted in ["a", "1", " ", "\n", ";", "+", "=", "(", "#"] {
            reparse_and_compare(&mut parser, &tree, text, position, position, inserted);
        }
        if position < text.len() {
            reparse_and_compare(&mut parser, &tree, text, position, position + 1, "");
        }
    }
}

#[test]
fn a_sequence_of_edits_stays_consistent() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let mut text = String::from("a = 1;\n");
    let mut tree = parser.parse(&text, None).unwrap();

    let edits: [(usize, usize, &str); 6] = [
        (7, 7, "b = a;\n"),
        (11, 12, "a + 1"),
        (4, 5, "(2 + 3)"),
        (0, 0, "# header\n"),
        (13, 14, ""),
        (0, 9, ""),
    ];
    for (start, end, replacement) in edits {
        let (new_text, new_tree) =
            reparse_and_compare(&mut parser, &tree, &text, start, end, replacement);
        text = new_text;
        tree = new_tree;
    }
    assert_eq!(tree.source_length(), text.len());
}

#[test]
fn reparse_applies_edits_in_order() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let text = "a = 1;\nb = 2;";
    let tree = parser.parse(text, None).unwrap();

    let (middle, first) = splice(text, 4, 5, "10");
    let (final_text, second) = splice(&middle, 12, 13, "3");
    assert_eq!(final_text, "a = 10;\nb = 3;");

    let reparsed = parser.reparse(&tree, &[first, second], &final_text).unwrap();
    let fresh = parser.parse(&final_text, None).unwrap();
    assert!(reparsed.structurally_eq(&fresh));
    // The original tree is unaffected.
    assert_eq!(tree.source_length(), text.len());
}

#[test]
fn reparse_without_edits_matches_a_fresh_parse() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let text = "a = 1;\nb = a + 2; # sum\n";
    let tree = parser.parse(text, None).unwrap();

    let again = parser.reparse(&tree, &[], text).unwrap();
    assert!(again.structurally_eq(&tree));
    assert_eq!(
        again.root_node().child(0).unwrap().id(),
        tree.root_node().child(0).unwrap().id()
    );
}

#[test]
fn reparse_rejects_bad_edit_lists() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let text = "a = 1;\nb = 2;";
    let tree = parser.parse(text, None).unwrap();

    let late = InputEdit::new(text.as_bytes(), 11, 12, b"3");
    let early = InputEdit::new(text.as_bytes(), 4, 5, b"4");
    assert_eq!(
        parser.reparse(&tree, &[late, early], text).unwrap_err(),
        ParseError::InvalidEdit {
            index: 1,
            reason: InvalidEditReason::OutOfOrder,
        }
    );

    let insertion = InputEdit::new(text.as_bytes(), 0, 0, b"x");
    assert!(matches!(
        parser.reparse(&tree, &[insertion], text),
        Err(ParseError::InvalidEdit {
            reason: InvalidEditReason::LengthMismatch { .. },
            ..
        })
    ));
}

#[test]
fn changed_ranges_cover_the_edit() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let text = "a = 1;\nb = 2;";
    let tree = parser.parse(text, None).unwrap();

    let (new_text, edit) = splice(text, 4, 5, "c");
    let edited = tree.edit(&edit);
    let new_tree = parser.parse(&new_text, Some(&edited)).unwrap();

    let ranges = edited.changed_ranges(&new_tree);
    assert_eq!(ranges.len(), 1);
    assert!(ranges[0].start_byte <= 4);
    assert!(ranges[0].end_byte >= 5);
    assert!(ranges[0].end_byte <= 6);
}

#[test]
fn unchanged_reparse_reports_no_ranges() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let text = "a = 1;\nb = 2;";
    let tree = parser.parse(text, None).unwrap();
    let again = parser.parse(text, Some(&tree)).unwrap();
    assert!(tree.changed_ranges(&again).is_empty());
}

#[test]
fn trees_from_other_languages_are_ignored() {
    let sum = sum_language();
    let calc = calc_language();
    let mut parser = Parser::with_language(&sum).unwrap();
    let foreign = parser.parse("a+b", None).unwrap();

    parser.set_language(&calc).unwrap();
    let tree = parser.parse("a = 1;", Some(&foreign)).unwrap();
    assert!(!tree.root_node().has_error());
    assert_eq!(tree.language().name(), "calc");
}
