//! Read-only views of the visible nodes of a [`Tree`].
//!
//! A [`Node`] pairs a subtree with its absolute position. Hidden subtrees are
//! never returned: navigation looks through them, so their visible children
//! appear as children of the nearest visible ancestor.

use std::fmt;
use std::str::Utf8Error;

use streaming_iterator::StreamingIterator;

use crate::language::{FieldId, Symbol};
use crate::length::Length;
use crate::point::Point;
use crate::subtree::Subtree;
use crate::tree::{Range, Tree};
use crate::tree_cursor::TreeCursor;

/// A single visible node within a syntax tree.
#[derive(Clone, Copy)]
pub struct Node<'tree> {
    tree: &'tree Tree,
    subtree: &'tree Subtree,
    /// Start of the node, after its padding.
    position: Length,
}

struct NodeChildIterator<'tree> {
    tree: &'tree Tree,
    parent: Option<&'tree Subtree>,
    /// End of the previous child, where the next child's padding begins.
    position: Length,
    child_index: usize,
    structural_child_index: usize,
}

impl<'tree> Iterator for NodeChildIterator<'tree> {
    type Item = Node<'tree>;

    fn next(&mut self) -> Option<Node<'tree>> {
        let parent = self.parent?;
        let child = parent.children().get(self.child_index)?;
        if !child.is_extra() {
            self.structural_child_index += 1;
        }
        let start = self.position.add(child.padding());
        let node = Node::new(self.tree, child, start);
        self.position = start.add(child.size());
        self.child_index += 1;
        Some(node)
    }
}

impl<'tree> Node<'tree> {
    pub(crate) fn new(tree: &'tree Tree, subtree: &'tree Subtree, position: Length) -> Self {
        Self {
            tree,
            subtree,
            position,
        }
    }

    /// A numeric id, unique among the nodes of one tree and stable across
    /// trees that share this node.
    pub fn id(&self) -> usize {
        self.subtree.id()
    }

    pub fn kind_id(&self) -> Symbol {
        self.subtree.symbol()
    }

    pub fn kind(&self) -> &'tree str {
        self.tree
            .language()
            .node_kind_for_id(self.kind_id())
            .unwrap_or("")
    }

    pub fn language(&self) -> &'tree crate::language::Language {
        self.tree.language()
    }

    /// Named nodes correspond to named rules in the grammar; anonymous
    /// nodes correspond to string literals.
    pub fn is_named(&self) -> bool {
        self.subtree.is_named()
    }

    /// Whether the parser inserted this zero-width node to recover from an
    /// error.
    pub fn is_missing(&self) -> bool {
        self.subtree.is_missing()
    }

    /// Whether this node is an extra, such as a comment, that may appear
    /// anywhere.
    pub fn is_extra(&self) -> bool {
        self.subtree.is_extra()
    }

    pub fn is_error(&self) -> bool {
        self.subtree.is_error()
    }

    /// Whether this node or any descendant is an error or missing node.
    pub fn has_error(&self) -> bool {
        self.subtree.error_cost() > 0
    }

    /// Whether this node was edited since it was parsed.
    pub fn has_changes(&self) -> bool {
        self.subtree.has_changes()
    }

    /// The parse state the node was created in.
    pub fn parse_state(&self) -> u16 {
        self.subtree.parse_state()
    }

    pub fn start_byte(&self) -> usize {
        self.position.bytes as usize
    }

    pub fn end_byte(&self) -> usize {
        self.end().bytes as usize
    }

    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.start_byte()..self.end_byte()
    }

    /// The byte range including the whitespace skipped before the node.
    pub fn total_byte_range(&self) -> std::ops::Range<usize> {
        let padding = self.subtree.padding().bytes;
        (self.position.bytes - padding) as usize..self.end_byte()
    }

    pub fn start_position(&self) -> Point {
        self.position.extent
    }

    pub fn end_position(&self) -> Point {
        self.end().extent
    }

    pub fn range(&self) -> Range {
        Range::from_lengths(self.position, self.end())
    }

    pub fn utf8_text<'a>(&self, source: &'a [u8]) -> Result<&'a str, Utf8Error> {
        std::str::from_utf8(&source[self.start_byte()..self.end_byte()])
    }

    /// Number of visible nodes in this subtree, this node included.
    pub fn descendant_count(&self) -> usize {
        self.subtree.visible_descendant_count() as usize + 1
    }

    // -----------------------------------------------------------------------
    // Children
    // -----------------------------------------------------------------------

    pub fn child_count(&self) -> usize {
        self.relevant_child_count(true)
    }

    pub fn named_child_count(&self) -> usize {
        self.relevant_child_count(false)
    }

    pub fn child(&self, index: usize) -> Option<Node<'tree>> {
        self.relevant_child(index, true)
    }

    pub fn named_child(&self, index: usize) -> Option<Node<'tree>> {
        self.relevant_child(index, false)
    }

    pub fn children(&self) -> impl Iterator<Item = Node<'tree>> + 'tree {
        let node = *self;
        (0..self.child_count()).filter_map(move |index| node.child(index))
    }

    pub fn named_children(&self) -> impl Iterator<Item = Node<'tree>> + 'tree {
        let node = *self;
        (0..self.named_child_count()).filter_map(move |index| node.named_child(index))
    }

    /// The first child holding the field `field_name`.
    pub fn child_by_field_name(&self, field_name: impl AsRef<[u8]>) -> Option<Node<'tree>> {
        let field_name = std::str::from_utf8(field_name.as_ref()).ok()?;
        let field_id = self.tree.language().field_id_for_name(field_name)?;
        self.child_by_field_id(field_id)
    }

    pub fn child_by_field_id(&self, field_id: FieldId) -> Option<Node<'tree>> {
        let mut cursor = self.walk();
        if !cursor.goto_first_child() {
            return None;
        }
        loop {
            if cursor.field_id() == Some(field_id) {
                return Some(cursor.node());
            }
            if !cursor.goto_next_sibling() {
                return None;
            }
        }
    }

    /// All children holding the field `field_id`, in order.
    pub fn children_by_field_id(&self, field_id: FieldId) -> impl Iterator<Item = Node<'tree>> {
        let mut cursor = self.walk();
        let mut done = !cursor.goto_first_child();
        std::iter::from_fn(move || {
            while !done {
                let node = cursor.node();
                let matches = cursor.field_id() == Some(field_id);
                done = !cursor.goto_next_sibling();
                if matches {
                    return Some(node);
                }
            }
            None
        })
    }

    /// The field name of the child at `child_index`, if any.
    pub fn field_name_for_child(&self, child_index: usize) -> Option<&'tree str> {
        let mut cursor = self.walk();
        if !cursor.goto_first_child() {
            return None;
        }
        for _ in 0..child_index {
            if !cursor.goto_next_sibling() {
                return None;
            }
        }
        cursor.field_name()
    }

    /// The first child that extends past `byte`.
    pub fn first_child_for_byte(&self, byte: usize) -> Option<Node<'tree>> {
        self.children().find(|child| child.end_byte() > byte)
    }

    /// The smallest node that spans the byte range `start..end`.
    pub fn descendant_for_byte_range(&self, start: usize, end: usize) -> Option<Node<'tree>> {
        self.descendant_for_range(start, end, true)
    }

    /// The smallest named node that spans the byte range `start..end`.
    pub fn named_descendant_for_byte_range(&self, start: usize, end: usize) -> Option<Node<'tree>> {
        self.descendant_for_range(start, end, false)
    }

    // -----------------------------------------------------------------------
    // Family
    // -----------------------------------------------------------------------

    pub fn parent(&self) -> Option<Node<'tree>> {
        let mut node = self.tree.root_node();
        if node == *self {
            return None;
        }
        loop {
            let next = node.child_with_descendant(self)?;
            if next == *self {
                return Some(node);
            }
            node = next;
        }
    }

    pub fn next_sibling(&self) -> Option<Node<'tree>> {
        self.sibling(true, true)
    }

    pub fn next_named_sibling(&self) -> Option<Node<'tree>> {
        self.sibling(true, false)
    }

    pub fn prev_sibling(&self) -> Option<Node<'tree>> {
        self.sibling(false, true)
    }

    pub fn prev_named_sibling(&self) -> Option<Node<'tree>> {
        self.sibling(false, false)
    }

    /// Create a cursor starting at this node.
    pub fn walk(&self) -> TreeCursor<'tree> {
        TreeCursor::new(self.tree, self.subtree, self.position)
    }

    /// Visit this node and its visible descendants in document order.
    pub fn descendants(&self) -> Descendants<'tree> {
        Descendants {
            cursor: self.walk(),
            current: None,
            started: false,
        }
    }

    /// Render this node and its named descendants as an S-expression.
    pub fn to_sexp(&self) -> String {
        self.subtree.to_sexp(self.tree.language())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn end(&self) -> Length {
        self.position.add(self.subtree.size())
    }

    fn iterate_children(&self) -> NodeChildIterator<'tree> {
        NodeChildIterator {
            tree: self.tree,
            parent: (self.subtree.child_count() > 0).then_some(self.subtree),
            // A root has no padding of its own even when its first child does.
            position: self.position.retreat(self.subtree.padding()),
            child_index: 0,
            structural_child_index: 0,
        }
    }

    fn is_relevant(&self, include_anonymous: bool) -> bool {
        if include_anonymous {
            self.subtree.is_visible()
        } else {
            self.subtree.is_visible() && self.subtree.is_named()
        }
    }

    fn relevant_child_count(&self, include_anonymous: bool) -> usize {
        if self.subtree.child_count() == 0 {
            return 0;
        }
        if include_anonymous {
            self.subtree.visible_child_count() as usize
        } else {
            self.subtree.named_child_count() as usize
        }
    }

    fn relevant_child(&self, mut child_index: usize, include_anonymous: bool) -> Option<Node<'tree>> {
        let mut result = *self;
        let mut did_descend = true;
        while did_descend {
            did_descend = false;
            let mut index = 0;
            for child in result.iterate_children() {
                if child.is_relevant(include_anonymous) {
                    if index == child_index {
                        return Some(child);
                    }
                    index += 1;
                } else {
                    let grandchild_index = child_index - index;
                    let grandchild_count = child.relevant_child_count(include_anonymous);
                    if grandchild_index < grandchild_count {
                        did_descend = true;
                        result = child;
                        child_index = grandchild_index;
                        break;
                    }
                    index += grandchild_count;
                }
            }
        }
        None
    }

    /// The child of `self` (visible, or reached through hidden nodes) that
    /// contains `descendant`.
    fn child_with_descendant(&self, descendant: &Node<'tree>) -> Option<Node<'tree>> {
        let start_byte = descendant.start_byte();
        let end_byte = descendant.end_byte();
        let is_empty = start_byte == end_byte;

        let mut node = *self;
        loop {
            let mut iterator = node.iterate_children();
            loop {
                let child = iterator.next()?;
                if child.start_byte() > start_byte {
                    return None;
                }
                node = child;
                if node == *descendant {
                    return Some(node);
                }

                // An empty descendant may sit at the end of this child or at
                // the start of the next one.
                if is_empty && iterator.position.bytes as usize >= end_byte && node.child_count() > 0 {
                    if let Some(inner) = node.child_with_descendant(descendant) {
                        return Some(if node.is_relevant(true) { node } else { inner });
                    }
                }

                let ends_before = if is_empty {
                    (iterator.position.bytes as usize) <= end_byte
                } else {
                    (iterator.position.bytes as usize) < end_byte
                };
                if !ends_before && node.child_count() > 0 {
                    break;
                }
            }
            if node.is_relevant(true) {
                return Some(node);
            }
        }
    }

    fn sibling(&self, forward: bool, include_anonymous: bool) -> Option<Node<'tree>> {
        let parent = self.parent()?;
        let mut siblings = parent.children().filter(|node| node.is_relevant(include_anonymous) || *node == *self);
        if forward {
            siblings.by_ref().find(|node| node == self)?;
            siblings.find(|node| node != self)
        } else {
            let mut previous = None;
            for node in siblings {
                if node == *self {
                    return previous;
                }
                previous = Some(node);
            }
            None
        }
    }

    fn descendant_for_range(&self, start: usize, end: usize, include_anonymous: bool) -> Option<Node<'tree>> {
        if start > end {
            return None;
        }
        let mut node = *self;
        let mut last_visible = *self;
        let mut did_descend = true;
        while did_descend {
            did_descend = false;
            let mut iterator = node.iterate_children();
            while let Some(child) = iterator.next() {
                let child_end = iterator.position.bytes as usize;
                if child_end < end {
                    continue;
                }
                let is_empty = child.start_byte() == child_end;
                if if is_empty { child_end < start } else { child_end <= start } {
                    continue;
                }
                if start < child.start_byte() {
                    break;
                }
                node = child;
                if node.is_relevant(include_anonymous) {
                    last_visible = node;
                }
                did_descend = true;
                break;
            }
        }
        Some(last_visible)
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree)
            && Subtree::ptr_eq(self.subtree, other.subtree)
            && self.position == other.position
    }
}

impl Eq for Node<'_> {}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Node {} {} - {}}}",
            self.kind(),
            self.start_position(),
            self.end_position()
        )
    }
}

/// Pre-order traversal of the visible nodes below a starting node.
pub struct Descendants<'tree> {
    cursor: TreeCursor<'tree>,
    current: Option<Node<'tree>>,
    started: bool,
}

impl<'tree> StreamingIterator for Descendants<'tree> {
    type Item = Node<'tree>;

    fn advance(&mut self) {
        if !self.started {
            self.started = true;
            self.current = Some(self.cursor.node());
            return;
        }
        if self.current.is_none() {
            return;
        }
        if self.cursor.goto_first_child() || self.cursor.goto_next_sibling() {
            self.current = Some(self.cursor.node());
            return;
        }
        loop {
            if !self.cursor.goto_parent() {
                self.current = None;
                return;
            }
            if self.cursor.goto_next_sibling() {
                self.current = Some(self.cursor.node());
                return;
            }
        }
    }

    fn get(&self) -> Option<&Node<'tree>> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use streaming_iterator::StreamingIterator;

    use crate::grammar::GrammarBuilder;
    use crate::language::Language;
    use crate::parser::Parser;
    use crate::point::Point;

    fn assignment_language() -> Language {
        GrammarBuilder::new("assign")
            .token("identifier", "[a-z]+")
            .token("number", "[0-9]+")
            .extra("comment", "#[^\n]*")
            .rule("program", ["_statement*"])
            .rule("_statement", ["assignment"])
            .rule("assignment", ["left:identifier '=' right:_value ';'"])
            .rule("_value", ["number", "identifier"])
            .build_language()
            .unwrap()
    }

    #[test]
    fn children_skip_hidden_nodes() {
        let language = assignment_language();
        let mut parser = Parser::with_language(&language).unwrap();
        let source = "a = 1;\nb = a;";
        let tree = parser.parse(source, None).unwrap();
        let root = tree.root_node();

        assert_eq!(root.kind(), "program");
        assert_eq!(root.child_count(), 2);
        let first = root.child(0).unwrap();
        assert_eq!(first.kind(), "assignment");
        assert_eq!(first.byte_range(), 0..6);
        let second = root.named_child(1).unwrap();
        assert_eq!(second.start_position(), Point::new(1, 0));
        assert_eq!(second.end_position(), Point::new(1, 6));
        assert_eq!(second.child_count(), 4);
        assert_eq!(second.named_child_count(), 2);
        assert_eq!(second.child(1).unwrap().kind(), "=");
        assert!(!second.child(1).unwrap().is_named());
    }

    #[test]
    fn fields_through_hidden_children() {
        let language = assignment_language();
        let mut parser = Parser::with_language(&language).unwrap();
        let source = "abc = 42;";
        let tree = parser.parse(source, None).unwrap();
        let assignment = tree.root_node().child(0).unwrap();

        let left = assignment.child_by_field_name("left").unwrap();
        assert_eq!(left.utf8_text(source.as_bytes()).unwrap(), "abc");
        let right = assignment.child_by_field_name("right").unwrap();
        assert_eq!(right.kind(), "number");
        assert_eq!(assignment.field_name_for_child(0), Some("left"));
        assert_eq!(assignment.field_name_for_child(1), None);
        assert_eq!(assignment.field_name_for_child(2), Some("right"));
        assert!(assignment.child_by_field_name("missing").is_none());
    }

    #[test]
    fn parent_and_siblings() {
        let language = assignment_language();
        let mut parser = Parser::with_language(&language).unwrap();
        let tree = parser.parse("a = 1; # note\nb = 2;", None).unwrap();
        let root = tree.root_node();
        assert_eq!(root.child_count(), 3);

        let comment = root.child(1).unwrap();
        assert_eq!(comment.kind(), "comment");
        assert!(comment.is_extra());
        assert_eq!(comment.parent(), Some(root));
        assert_eq!(comment.prev_sibling(), root.child(0));
        assert_eq!(comment.next_sibling(), root.child(2));

        let number = root.child(0).unwrap().child(2).unwrap();
        assert_eq!(number.parent(), root.child(0));
        assert_eq!(number.prev_named_sibling().unwrap().kind(), "identifier");
        assert_eq!(number.next_sibling().unwrap().kind(), ";");
        assert!(number.next_named_sibling().is_none());
        assert!(root.parent().is_none());
    }

    #[test]
    fn descendant_lookup_and_traversal() {
        let language = assignment_language();
        let mut parser = Parser::with_language(&language).unwrap();
        let tree = parser.parse("ab = 12;", None).unwrap();
        let root = tree.root_node();

        let number = root.descendant_for_byte_range(5, 6).unwrap();
        assert_eq!(number.kind(), "number");
        let named = root.named_descendant_for_byte_range(3, 3).unwrap();
        assert_eq!(named.kind(), "assignment");
        assert_eq!(root.first_child_for_byte(1).unwrap().kind(), "assignment");

        let mut kinds = Vec::new();
        let mut descendants = root.descendants();
        while let Some(node) = descendants.next() {
            kinds.push(node.kind());
        }
        assert_eq!(
            kinds,
            vec!["program", "assignment", "identifier", "=", "number", ";"]
        );
        assert_eq!(root.descendant_count(), kinds.len());
    }

    #[test]
    fn leading_whitespace_is_outside_the_first_child() {
        let language = assignment_language();
        let mut parser = Parser::with_language(&language).unwrap();
        let source = "\n\n  ab = 1;\nc = 2;";
        let tree = parser.parse(source, None).unwrap();
        let root = tree.root_node();
        assert_eq!(root.byte_range(), 0..source.len());

        let first = root.child(0).unwrap();
        assert_eq!(first.byte_range(), 4..11);
        assert_eq!(first.start_position(), Point::new(2, 2));
        assert_eq!(first.utf8_text(source.as_bytes()).unwrap(), "ab = 1;");
        let left = first.child_by_field_name("left").unwrap();
        assert_eq!(left.byte_range(), 4..6);
        let second = root.child(1).unwrap();
        assert_eq!(second.byte_range(), 12..18);
        assert_eq!(second.start_position(), Point::new(3, 0));
        assert_eq!(root.first_child_for_byte(5), Some(first));
        assert_eq!(root.descendant_for_byte_range(4, 6), Some(left));

        let mut cursor = tree.walk();
        assert!(cursor.goto_first_child());
        assert_eq!(cursor.node(), first);
        assert!(cursor.goto_first_child());
        assert_eq!(cursor.node(), left);
        assert!(cursor.goto_parent());
        assert!(cursor.goto_next_sibling());
        assert_eq!(cursor.node(), second);
    }

    #[test]
    fn columns_after_same_line_padding() {
        let language = assignment_language();
        let mut parser = Parser::with_language(&language).unwrap();
        let tree = parser.parse("a = 1;\nb = 2; c = 3;", None).unwrap();
        let third = tree.root_node().child(2).unwrap();
        assert_eq!(third.start_position(), Point::new(1, 7));

        let left = third.child(0).unwrap();
        assert_eq!(left.start_position(), Point::new(1, 7));
        assert_eq!(left.end_position(), Point::new(1, 8));
        assert_eq!(third.child(2).unwrap().start_position(), Point::new(1, 11));

        let mut cursor = third.walk();
        assert!(cursor.goto_first_child());
        assert_eq!(cursor.node().start_position(), Point::new(1, 7));
        assert!(cursor.goto_next_sibling());
        assert_eq!(cursor.node().start_position(), Point::new(1, 9));
    }
}
