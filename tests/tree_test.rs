mod helpers;

use std::thread;

use pretty_assertions::assert_eq;
use sitter_runtime::{Language, Node, Parser, Point, Tree, TreeCursor};

use helpers::{calc_language, descendants, kinds};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn trees_and_languages_are_thread_safe() {
    assert_send_sync::<Tree>();
    assert_send_sync::<Language>();
    assert_send_sync::<Node<'static>>();
    assert_send_sync::<TreeCursor<'static>>();
}

#[test]
fn one_tree_can_be_read_from_many_threads() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let source = "a = 1;\nb = a + 2; # two\nc = (b + a) + 3;\n";
    let tree = parser.parse(source, None).unwrap();
    let expected = kinds(descendants(tree.root_node()));

    let results: Vec<Vec<&str>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| kinds(descendants(tree.root_node()))))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });
    for result in results {
        assert_eq!(result, expected);
    }

    // A clone shares the same nodes and can move to another thread.
    let clone = tree.clone();
    let id = tree.root_node().child(0).unwrap().id();
    let cloned_id = thread::spawn(move || clone.root_node().child(0).unwrap().id())
        .join()
        .unwrap();
    assert_eq!(id, cloned_id);
}

#[test]
fn cursor_reports_fields_and_depth() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse("x = y + 1;", None).unwrap();
    let mut cursor = tree.walk();

    assert!(cursor.goto_first_child());
    assert_eq!(cursor.node().kind(), "statement");
    assert_eq!(cursor.field_name(), None);

    assert!(cursor.goto_first_child());
    assert_eq!(cursor.node().kind(), "identifier");
    assert_eq!(cursor.field_name(), Some("name"));
    assert_eq!(cursor.depth(), 2);

    assert!(cursor.goto_next_sibling());
    assert_eq!(cursor.node().kind(), "=");
    assert_eq!(cursor.field_name(), None);

    assert!(cursor.goto_next_sibling());
    assert_eq!(cursor.node().kind(), "binary");
    assert_eq!(cursor.field_name(), Some("value"));

    assert!(cursor.goto_first_child());
    assert_eq!(cursor.field_name(), Some("left"));
    assert!(cursor.goto_next_sibling());
    assert!(cursor.goto_next_sibling());
    assert_eq!(cursor.node().kind(), "number");
    assert_eq!(cursor.field_name(), Some("right"));

    assert!(cursor.goto_parent());
    assert!(cursor.goto_parent());
    assert_eq!(cursor.node().kind(), "statement");

    let statement = cursor.node();
    cursor.reset(statement.child(0).unwrap());
    assert_eq!(cursor.node().kind(), "identifier");
    assert!(!cursor.goto_parent());
}

#[test]
fn nodes_expose_text_and_positions() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let source = "a = 1;\nbb = a + 22;";
    let tree = parser.parse(source, None).unwrap();
    let root = tree.root_node();

    let second = root.named_child(1).unwrap();
    assert_eq!(second.start_position(), Point::new(1, 0));
    assert_eq!(second.end_position(), Point::new(1, 12));
    let value = second.child_by_field_name("value").unwrap();
    assert_eq!(value.kind(), "binary");
    assert_eq!(value.utf8_text(source.as_bytes()).unwrap(), "a + 22");
    let right = value.child_by_field_name("right").unwrap();
    assert_eq!(right.utf8_text(source.as_bytes()).unwrap(), "22");
    assert_eq!(right.parent(), Some(value));

    let field_id = language.field_id_for_name("value").unwrap();
    assert_eq!(second.child_by_field_id(field_id), Some(value));
    assert_eq!(
        kinds(second.children_by_field_id(field_id)),
        vec!["binary"]
    );
}

#[test]
fn dot_graph_lists_every_node() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse("a = 1;", None).unwrap();
    let mut out = Vec::new();
    tree.print_dot_graph(&mut out).unwrap();
    let graph = String::from_utf8(out).unwrap();

    assert!(graph.starts_with("digraph tree {"));
    assert!(graph.trim_end().ends_with('}'));
    assert!(graph.contains("label=\"statement\""));
    // Hidden nodes are drawn too.
    assert!(graph.contains("label=\"_expression\""));
}

#[test]
fn debug_output_names_the_root() {
    let language = calc_language();
    let mut parser = Parser::with_language(&language).unwrap();
    let tree = parser.parse("a = 1;", None).unwrap();
    assert_eq!(
        format!("{:?}", tree.root_node()),
        "{Node program (0, 0) - (0, 6)}"
    );
}
