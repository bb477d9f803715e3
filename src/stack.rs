//! The LR parse stack.
//!
//! A single version: each entry pairs a parse state with the subtree that was
//! pushed to reach it and the absolute position just after that subtree.
//! Extra subtrees (comments, skipped errors) sit on the stack like any other
//! entry but are never counted when a reduction pops its children.

use crate::error::ParseError;
use crate::language::StateId;
use crate::length::{Length, LENGTH_ZERO};
use crate::subtree::Subtree;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub(crate) struct StackEntry {
    pub state: StateId,
    /// `None` only for the base entry.
    pub subtree: Option<Subtree>,
    pub position: Length,
}

#[derive(Debug)]
pub(crate) struct Stack {
    entries: Vec<StackEntry>,
    max_depth: usize,
}

impl Stack {
    pub fn new(state: StateId, max_depth: usize) -> Self {
        Self {
            entries: vec![StackEntry {
                state,
                subtree: None,
                position: LENGTH_ZERO,
            }],
            max_depth,
        }
    }

    #[inline]
    pub fn state(&self) -> StateId {
        self.entries.last().map_or(0, |entry| entry.state)
    }

    #[inline]
    pub fn position(&self) -> Length {
        self.entries.last().map_or(LENGTH_ZERO, |entry| entry.position)
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn top_subtree(&self) -> Option<&Subtree> {
        self.entries.last().and_then(|entry| entry.subtree.as_ref())
    }

    pub fn push(&mut self, state: StateId, subtree: Subtree) -> Result<(), ParseError> {
        if self.entries.len() >= self.max_depth {
            return Err(ParseError::ResourceExhausted {
                limit: self.max_depth,
            });
        }
        let position = self.position().add(subtree.total_size());
        self.entries.push(StackEntry {
            state,
            subtree: Some(subtree),
            position,
        });
        Ok(())
    }

    /// Pop the top entry. The base entry is never popped.
    pub fn pop(&mut self) -> Option<StackEntry> {
        if self.entries.len() > 1 {
            self.entries.pop()
        } else {
            None
        }
    }

    /// Pop entries until `count` non-extra subtrees have been removed.
    ///
    /// Extras interleaved with those subtrees come along; extras below the
    /// deepest counted subtree stay. The result is in document order.
    pub fn pop_count(&mut self, count: usize) -> Vec<Subtree> {
        let mut subtrees = Vec::with_capacity(count);
        let mut remaining = count;
        while remaining > 0 {
            let Some(entry) = self.pop() else {
                break;
            };
            if let Some(subtree) = entry.subtree {
                if !subtree.is_extra() {
                    remaining -= 1;
                }
                subtrees.push(subtree);
            }
        }
        subtrees.reverse();
        subtrees
    }

    /// Pop everything above the base entry, in document order.
    pub fn pop_all(&mut self) -> Vec<Subtree> {
        let mut subtrees: Vec<Subtree> = self
            .entries
            .drain(1..)
            .filter_map(|entry| entry.subtree)
            .collect();
        subtrees.shrink_to_fit();
        subtrees
    }

    /// States of the base entry and of every non-extra entry, bottom first.
    /// This is all a simulated parse needs.
    pub fn states(&self) -> Vec<StateId> {
        self.entries
            .iter()
            .filter(|entry| entry.subtree.as_ref().map_or(true, |tree| !tree.is_extra()))
            .map(|entry| entry.state)
            .collect()
    }

    pub fn error_cost(&self) -> u32 {
        self.entries
            .iter()
            .filter_map(|entry| entry.subtree.as_ref())
            .map(Subtree::error_cost)
            .sum()
    }
}

/// Split trailing extras off a freshly popped child list.
///
/// They are pushed back above the new node instead of becoming its last
/// children, so a node never ends with a comment.
pub(crate) fn remove_trailing_extras(children: &mut Vec<Subtree>) -> Vec<Subtree> {
    let keep = children
        .iter()
        .rposition(|child| !child.is_extra())
        .map_or(0, |index| index + 1);
    children.split_off(keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarBuilder;
    use crate::language::Language;

    fn language() -> Language {
        GrammarBuilder::new("list")
            .token("item", "[a-z]+")
            .extra("comment", "#[^\n]*")
            .rule("list", ["item item"])
            .build_language()
            .unwrap()
    }

    fn leaf(language: &Language, kind: &str, extra: bool) -> Subtree {
        let symbol = language.id_for_node_kind(kind, true);
        Subtree::new_missing_leaf(symbol, 1, language).with_extra(extra)
    }

    #[test]
    fn pop_count_keeps_interleaved_extras() {
        let language = language();
        let mut stack = Stack::new(1, 64);
        stack.push(2, leaf(&language, "comment", true)).unwrap();
        stack.push(3, leaf(&language, "item", false)).unwrap();
        stack.push(3, leaf(&language, "comment", true)).unwrap();
        stack.push(4, leaf(&language, "item", false)).unwrap();

        let popped = stack.pop_count(2);
        assert_eq!(popped.len(), 3);
        assert!(popped[1].is_extra());
        // The leading comment stays below.
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.state(), 2);
    }

    #[test]
    fn push_enforces_depth_limit() {
        let language = language();
        let mut stack = Stack::new(1, 2);
        stack.push(2, leaf(&language, "item", false)).unwrap();
        assert_eq!(
            stack.push(3, leaf(&language, "item", false)),
            Err(ParseError::ResourceExhausted { limit: 2 })
        );
    }

    #[test]
    fn trailing_extras_are_split_off() {
        let language = language();
        let mut children = vec![
            leaf(&language, "item", false),
            leaf(&language, "comment", true),
            leaf(&language, "comment", true),
        ];
        let trailing = remove_trailing_extras(&mut children);
        assert_eq!(children.len(), 1);
        assert_eq!(trailing.len(), 2);
    }

    #[test]
    fn states_skip_extras() {
        let language = language();
        let mut stack = Stack::new(1, 64);
        stack.push(5, leaf(&language, "item", false)).unwrap();
        stack.push(5, leaf(&language, "comment", true)).unwrap();
        assert_eq!(stack.states(), vec![1, 5]);
    }
}
