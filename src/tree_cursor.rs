//! A stateful cursor for walking a tree efficiently.
//!
//! The cursor keeps the whole path from its starting node down to the current
//! one, hidden nodes included. Moving to a child, sibling, or parent is then a
//! matter of pushing or popping entries, and field names can be read off the
//! parent's production without searching.

use crate::length::Length;
use crate::node::Node;
use crate::subtree::Subtree;
use crate::tree::Tree;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
struct TreeCursorEntry<'tree> {
    subtree: &'tree Subtree,
    /// Start of the subtree, after its padding.
    position: Length,
    child_index: u32,
    structural_child_index: u32,
}

/// Result of one internal navigation step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TreeCursorStep {
    None,
    Hidden,
    Visible,
}

struct CursorChildIterator<'tree> {
    parent: Option<&'tree Subtree>,
    position: Length,
    child_index: u32,
    structural_child_index: u32,
}

impl<'tree> Iterator for CursorChildIterator<'tree> {
    /// The child's entry and whether it is visible.
    type Item = (TreeCursorEntry<'tree>, bool);

    fn next(&mut self) -> Option<Self::Item> {
        let parent = self.parent?;
        let children = parent.children();
        let child = children.get(self.child_index as usize)?;
        let position = self.position.add(child.padding());
        let entry = TreeCursorEntry {
            subtree: child,
            position,
            child_index: self.child_index,
            structural_child_index: self.structural_child_index,
        };
        if !child.is_extra() {
            self.structural_child_index += 1;
        }
        self.position = position.add(child.size());
        self.child_index += 1;
        Some((entry, child.is_visible()))
    }
}

/// Walks the visible nodes below (and including) the node it was created at.
#[derive(Clone, Debug)]
pub struct TreeCursor<'tree> {
    tree: &'tree Tree,
    stack: Vec<TreeCursorEntry<'tree>>,
}

impl<'tree> TreeCursor<'tree> {
    pub(crate) fn new(tree: &'tree Tree, subtree: &'tree Subtree, position: Length) -> Self {
        Self {
            tree,
            stack: vec![TreeCursorEntry {
                subtree,
                position,
                child_index: 0,
                structural_child_index: 0,
            }],
        }
    }

    /// Move back to `node`, forgetting the current path.
    pub fn reset(&mut self, node: Node<'tree>) {
        *self = node.walk();
    }

    pub fn node(&self) -> Node<'tree> {
        let entry = self.last_entry();
        Node::new(self.tree, entry.subtree, entry.position)
    }

    /// Number of visible ancestors between the starting node and the current one.
    pub fn depth(&self) -> u32 {
        (1..self.stack.len())
            .filter(|&index| self.is_entry_visible(index))
            .count() as u32
    }

    /// Move to the first visible child. Returns `false` if there is none.
    pub fn goto_first_child(&mut self) -> bool {
        loop {
            match self.goto_first_child_internal() {
                TreeCursorStep::Hidden => continue,
                TreeCursorStep::Visible => return true,
                TreeCursorStep::None => return false,
            }
        }
    }

    /// Move to the next visible sibling. On failure the cursor does not move.
    pub fn goto_next_sibling(&mut self) -> bool {
        match self.goto_next_sibling_internal() {
            TreeCursorStep::Hidden => {
                self.goto_first_child();
                true
            }
            TreeCursorStep::Visible => true,
            TreeCursorStep::None => false,
        }
    }

    /// Move to the nearest visible ancestor. Returns `false` at the starting node.
    pub fn goto_parent(&mut self) -> bool {
        for index in (0..self.stack.len().saturating_sub(1)).rev() {
            if self.is_entry_visible(index) {
                self.stack.truncate(index + 1);
                return true;
            }
        }
        false
    }

    /// Move to the first visible child that extends past `byte`, returning its index.
    pub fn goto_first_child_for_byte(&mut self, byte: usize) -> Option<usize> {
        if !self.goto_first_child() {
            return None;
        }
        let mut index = 0;
        loop {
            if self.node().end_byte() > byte {
                return Some(index);
            }
            if !self.goto_next_sibling() {
                self.goto_parent();
                return None;
            }
            index += 1;
        }
    }

    pub fn field_id(&self) -> Option<u16> {
        // Walk up through the current node and its hidden ancestors.
        for index in (1..self.stack.len()).rev() {
            let entry = &self.stack[index];
            let parent = &self.stack[index - 1];
            if index != self.stack.len() - 1 && self.is_entry_visible(index) {
                break;
            }
            if entry.subtree.is_extra() {
                break;
            }
            let field_map = self
                .tree
                .language()
                .table()
                .field_map(parent.subtree.production_id());
            if let Some(field) = field_map
                .iter()
                .find(|field| u32::from(field.child_index) == entry.structural_child_index)
            {
                return Some(field.field_id);
            }
        }
        None
    }

    /// Name of the field the current node fills in its parent, if any.
    pub fn field_name(&self) -> Option<&'tree str> {
        let field_id = self.field_id()?;
        self.tree.language().field_name_for_id(field_id)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn last_entry(&self) -> &TreeCursorEntry<'tree> {
        // The stack always holds the starting node.
        &self.stack[self.stack.len() - 1]
    }

    fn is_entry_visible(&self, index: usize) -> bool {
        index == 0 || self.stack[index].subtree.is_visible()
    }

    fn iterate_children(&self) -> CursorChildIterator<'tree> {
        let entry = self.last_entry();
        CursorChildIterator {
            parent: (entry.subtree.child_count() > 0).then_some(entry.subtree),
            position: entry.position.retreat(entry.subtree.padding()),
            child_index: 0,
            structural_child_index: 0,
        }
    }

    fn goto_first_child_internal(&mut self) -> TreeCursorStep {
        for (entry, visible) in self.iterate_children() {
            if visible {
                self.stack.push(entry);
                return TreeCursorStep::Visible;
            }
            if entry.subtree.visible_child_count() > 0 {
                self.stack.push(entry);
                return TreeCursorStep::Hidden;
            }
        }
        TreeCursorStep::None
    }

    fn goto_next_sibling_internal(&mut self) -> TreeCursorStep {
        let saved = self.stack.clone();
        let initial_size = self.stack.len();

        while self.stack.len() > 1 {
            let Some(entry) = self.stack.pop() else {
                break;
            };
            let mut iterator = self.iterate_children();
            iterator.child_index = entry.child_index;
            iterator.structural_child_index = entry.structural_child_index;
            iterator.position = entry.position.retreat(entry.subtree.padding());

            // Step over the node we are leaving.
            let visible = iterator.next().is_some_and(|(_, visible)| visible);
            if visible && self.stack.len() + 1 < initial_size {
                break;
            }

            for (entry, visible) in iterator {
                if visible {
                    self.stack.push(entry);
                    return TreeCursorStep::Visible;
                }
                if entry.subtree.visible_child_count() > 0 {
                    self.stack.push(entry);
                    return TreeCursorStep::Hidden;
                }
            }
        }

        self.stack = saved;
        TreeCursorStep::None
    }
}

#[cfg(test)]
mod tests {
    use crate::grammar::GrammarBuilder;
    use crate::parser::Parser;

    #[test]
    fn walks_through_hidden_nodes() {
        let language = GrammarBuilder::new("list")
            .token("item", "[a-z]+")
            .rule("list", ["_items"])
            .rule("_items", ["_items item", "item"])
            .build_language()
            .unwrap();
        let mut parser = Parser::with_language(&language).unwrap();
        let tree = parser.parse("a b c", None).unwrap();

        let mut cursor = tree.walk();
        assert_eq!(cursor.node().kind(), "list");
        assert!(cursor.goto_first_child());
        let mut seen = vec![cursor.node().start_byte()];
        while cursor.goto_next_sibling() {
            seen.push(cursor.node().start_byte());
        }
        assert_eq!(seen, vec![0, 2, 4]);
        assert_eq!(cursor.depth(), 1);
        assert!(!cursor.goto_next_sibling());
        assert_eq!(cursor.node().start_byte(), 4);
        assert!(cursor.goto_parent());
        assert_eq!(cursor.node().kind(), "list");
        assert!(!cursor.goto_parent());
    }

    #[test]
    fn first_child_for_byte() {
        let language = GrammarBuilder::new("list")
            .token("item", "[a-z]+")
            .rule("list", ["item item item"])
            .build_language()
            .unwrap();
        let mut parser = Parser::with_language(&language).unwrap();
        let tree = parser.parse("aa bb cc", None).unwrap();
        let mut cursor = tree.walk();
        assert_eq!(cursor.goto_first_child_for_byte(4), Some(1));
        assert_eq!(cursor.node().start_byte(), 3);
    }
}
