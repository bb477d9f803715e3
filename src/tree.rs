//! Parsed trees and the edits applied to them.

use std::fmt;
use std::io;

use crate::get_changed_ranges::changed_ranges;
use crate::language::Language;
use crate::length::Length;
use crate::node::Node;
use crate::point::Point;
use crate::subtree::Subtree;
use crate::tree_cursor::TreeCursor;

/// A change to the source text, in byte offsets and row/column positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputEdit {
    pub start_byte: usize,
    pub old_end_byte: usize,
    pub new_end_byte: usize,
    pub start_position: Point,
    pub old_end_position: Point,
    pub new_end_position: Point,
}

impl InputEdit {
    /// Describe replacing `old_text[start_byte..old_end_byte]` with
    /// `new_text`, computing the positions from `old_text`.
    ///
    /// Offsets are clamped: `old_end_byte` to the length of `old_text`, and
    /// `start_byte` to `old_end_byte`.
    pub fn new(old_text: &[u8], start_byte: usize, old_end_byte: usize, new_text: &[u8]) -> Self {
        let old_end_byte = old_end_byte.min(old_text.len());
        let start_byte = start_byte.min(old_end_byte);
        let start_position = Length::of(&old_text[..start_byte]).extent;
        let old_end_position = start_position.advance(&old_text[start_byte..old_end_byte]);
        let new_end_position = start_position.advance(new_text);
        Self {
            start_byte,
            old_end_byte,
            new_end_byte: start_byte + new_text.len(),
            start_position,
            old_end_position,
            new_end_position,
        }
    }
}

/// A range of positions in a text document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Range {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_point: Point,
    pub end_point: Point,
}

impl Range {
    pub(crate) fn from_lengths(start: Length, end: Length) -> Self {
        Self {
            start_byte: start.bytes as usize,
            end_byte: end.bytes as usize,
            start_point: start.extent,
            end_point: end.extent,
        }
    }
}

/// An immutable syntax tree.
///
/// Cloning is cheap and shares every node. Editing returns a new tree that
/// shares all nodes the edit does not touch, so older versions stay valid.
#[derive(Clone)]
pub struct Tree {
    root: Subtree,
    language: Language,
}

impl Tree {
    pub(crate) fn new(root: Subtree, language: Language) -> Self {
        Self { root, language }
    }

    pub(crate) fn root(&self) -> &Subtree {
        &self.root
    }

    pub fn root_node(&self) -> Node<'_> {
        Node::new(self, &self.root, Length::default())
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Length of the text this tree describes, in bytes.
    pub fn source_length(&self) -> usize {
        self.root.total_bytes() as usize
    }

    pub fn walk(&self) -> TreeCursor<'_> {
        self.root_node().walk()
    }

    /// Return a copy of this tree with `edit` applied.
    ///
    /// Nodes whose text or lookahead touch the edit are copied and flagged as
    /// changed; everything else is shared with `self`. Pass the result to
    /// [`Parser::parse`](crate::Parser::parse) together with the new text.
    #[must_use]
    pub fn edit(&self, edit: &InputEdit) -> Tree {
        Tree {
            root: self.root.edit(edit).into_root(),
            language: self.language.clone(),
        }
    }

    /// Ranges whose syntactic structure differs between `self` and `other`.
    ///
    /// `self` should be the edited old tree and `other` the tree produced
    /// by reparsing it, so that both use the same coordinates.
    pub fn changed_ranges(&self, other: &Tree) -> Vec<Range> {
        changed_ranges(&self.root, &other.root)
    }

    /// Whether both trees have the same kinds, shape, and geometry,
    /// regardless of which nodes are shared.
    pub fn structurally_eq(&self, other: &Tree) -> bool {
        Subtree::structurally_eq(&self.root, &other.root)
    }

    /// Write a Graphviz representation of every node, hidden ones included.
    pub fn print_dot_graph(&self, out: &mut impl io::Write) -> io::Result<()> {
        self.root.print_dot_graph(&self.language, out)
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{Tree {:?}}}", self.root_node())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_edit_computes_positions() {
        let edit = InputEdit::new(b"ab\ncd", 1, 4, b"x\ny\nz");
        assert_eq!(edit.start_position, Point::new(0, 1));
        assert_eq!(edit.old_end_position, Point::new(1, 1));
        assert_eq!(edit.new_end_byte, 6);
        assert_eq!(edit.new_end_position, Point::new(2, 1));
    }

    #[test]
    fn input_edit_clamps_out_of_range_offsets() {
        let edit = InputEdit::new(b"ab\ncd", 3, 10, b"x");
        assert_eq!(edit.start_byte, 3);
        assert_eq!(edit.old_end_byte, 5);
        assert_eq!(edit.old_end_position, Point::new(1, 2));
        assert_eq!(edit.new_end_byte, 4);

        let inverted = InputEdit::new(b"abc", 2, 1, b"");
        assert_eq!(inverted.start_byte, 1);
        assert_eq!(inverted.old_end_byte, 1);
        assert_eq!(inverted.start_position, Point::new(0, 1));
    }
}
