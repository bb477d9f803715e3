//! Structural diff between an edited tree and its reparsed successor.
//!
//! Two iterators walk the old and new trees side by side. Subtrees that are
//! provably identical are stepped over whole; ones that may differ are
//! descended into until the difference is isolated to a visible node.

use crate::error_costs::ERROR_STATE;
use crate::length::{Length, LENGTH_ZERO};
use crate::subtree::Subtree;
use crate::tree::Range;

#[derive(Clone, Copy)]
struct Entry<'a> {
    subtree: &'a Subtree,
    /// Start of the subtree, before its padding.
    position: Length,
    child_index: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Differs,
    MayDiffer,
    Matches,
}

struct DiffIterator<'a> {
    stack: Vec<Entry<'a>>,
    visible_depth: u32,
    in_padding: bool,
    prev_external_token: Option<&'a Subtree>,
}

/// Append `start..end`, merging with the previous range when they touch.
fn add_range(ranges: &mut Vec<Range>, start: Length, end: Length) {
    if let Some(last) = ranges.last_mut() {
        if start.bytes as usize <= last.end_byte {
            last.end_byte = end.bytes as usize;
            last.end_point = end.extent;
            return;
        }
    }
    if start.bytes < end.bytes {
        ranges.push(Range::from_lengths(start, end));
    }
}

impl<'a> DiffIterator<'a> {
    fn new(tree: &'a Subtree) -> Self {
        Self {
            stack: vec![Entry {
                subtree: tree,
                position: LENGTH_ZERO,
                child_index: 0,
            }],
            visible_depth: 1,
            in_padding: false,
            prev_external_token: None,
        }
    }

    fn done(&self) -> bool {
        self.stack.is_empty()
    }

    fn top(&self) -> Option<&Entry<'a>> {
        self.stack.last()
    }

    fn start_position(&self) -> Length {
        let Some(entry) = self.top() else {
            return LENGTH_ZERO;
        };
        if self.in_padding {
            entry.position
        } else {
            entry.position.add(entry.subtree.padding())
        }
    }

    fn end_position(&self) -> Length {
        let Some(entry) = self.top() else {
            return LENGTH_ZERO;
        };
        let result = entry.position.add(entry.subtree.padding());
        if self.in_padding {
            result
        } else {
            result.add(entry.subtree.size())
        }
    }

    fn tree_is_visible(&self) -> bool {
        self.top().is_some_and(|entry| entry.subtree.is_visible())
    }

    /// The innermost visible subtree at the current position and its start.
    fn visible_state(&self) -> Option<(&'a Subtree, u32)> {
        let mut end = self.stack.len();
        if self.in_padding {
            end = end.checked_sub(1)?;
        }
        self.stack[..end]
            .iter()
            .rev()
            .find(|entry| entry.subtree.is_visible())
            .map(|entry| (entry.subtree, entry.position.bytes))
    }

    fn note_external_token(&mut self, subtree: &'a Subtree) {
        if let Some(token) = subtree.last_external_token() {
            self.prev_external_token = Some(token);
        }
    }

    fn ascend(&mut self) {
        if self.done() {
            return;
        }
        if self.tree_is_visible() && !self.in_padding {
            self.visible_depth -= 1;
        }
        if self.top().is_some_and(|entry| entry.child_index > 0) {
            self.in_padding = false;
        }
        self.stack.pop();
    }

    /// Descend to the first child ending after `goal_position`, stopping at
    /// the first visible one. Returns `false` if no visible child was reached.
    fn descend(&mut self, goal_position: u32) -> bool {
        if self.in_padding {
            return false;
        }
        loop {
            let Some(&entry) = self.top() else {
                return false;
            };
            let mut position = entry.position;
            let mut did_descend = false;
            for (child_index, child) in entry.subtree.children().iter().enumerate() {
                let child_left = position.add(child.padding());
                let child_right = child_left.add(child.size());

                if child_right.bytes > goal_position {
                    self.stack.push(Entry {
                        subtree: child,
                        position,
                        child_index,
                    });
                    if child.is_visible() {
                        if child_left.bytes > goal_position {
                            self.in_padding = true;
                        } else {
                            self.visible_depth += 1;
                        }
                        return true;
                    }
                    did_descend = true;
                    break;
                }

                position = child_right;
                self.note_external_token(child);
            }
            if !did_descend {
                return false;
            }
        }
    }

    fn advance(&mut self) {
        if self.in_padding {
            self.in_padding = false;
            if self.tree_is_visible() {
                self.visible_depth += 1;
            } else {
                self.descend(0);
            }
            return;
        }

        loop {
            if self.tree_is_visible() {
                self.visible_depth -= 1;
            }
            let Some(entry) = self.stack.pop() else {
                return;
            };
            let Some(&parent) = self.top() else {
                return;
            };
            self.note_external_token(entry.subtree);

            let child_index = entry.child_index + 1;
            if let Some(next_child) = parent.subtree.children().get(child_index) {
                let position = entry.position.add(entry.subtree.total_size());
                self.stack.push(Entry {
                    subtree: next_child,
                    position,
                    child_index,
                });
                if next_child.is_visible() {
                    if next_child.padding().bytes > 0 {
                        self.in_padding = true;
                    } else {
                        self.visible_depth += 1;
                    }
                } else {
                    self.descend(0);
                }
                return;
            }
        }
    }
}

fn compare(old: &DiffIterator<'_>, new: &DiffIterator<'_>) -> Comparison {
    let (old_tree, new_tree) = match (old.visible_state(), new.visible_state()) {
        (None, None) => return Comparison::Matches,
        (Some(old_tree), Some(new_tree)) => (old_tree, new_tree),
        _ => return Comparison::Differs,
    };
    let ((old_tree, old_start), (new_tree, new_start)) = (old_tree, new_tree);

    if old_tree.symbol() != new_tree.symbol() {
        return Comparison::Differs;
    }
    if old_start == new_start && Subtree::ptr_eq(old_tree, new_tree) && !old_tree.has_changes() {
        return Comparison::Matches;
    }

    let old_state = old_tree.parse_state();
    let new_state = new_tree.parse_state();
    let external_state_differs = || {
        let state = |token: Option<&Subtree>| token.and_then(Subtree::external_scanner_state).cloned();
        state(old.prev_external_token) != state(new.prev_external_token)
    };
    if old_start != new_start
        || old_tree.is_error()
        || old_tree.size().bytes != new_tree.size().bytes
        || (old_state == ERROR_STATE) != (new_state == ERROR_STATE)
        || old_tree.error_cost() != new_tree.error_cost()
        || old_tree.has_external_tokens() != new_tree.has_external_tokens()
        || old_tree.has_changes()
        || (old_tree.has_external_tokens() && external_state_differs())
    {
        return Comparison::MayDiffer;
    }
    Comparison::Matches
}

/// Byte ranges whose visible structure differs between `old` and `new`.
///
/// The result is sorted, non-overlapping, and never contains empty ranges.
pub(crate) fn changed_ranges(old: &Subtree, new: &Subtree) -> Vec<Range> {
    let mut results = Vec::new();
    let mut old_iter = DiffIterator::new(old);
    let mut new_iter = DiffIterator::new(new);

    let mut position = old_iter.start_position();
    let mut next_position = new_iter.start_position();
    if position.bytes < next_position.bytes {
        add_range(&mut results, position, next_position);
        position = next_position;
    } else if position.bytes > next_position.bytes {
        add_range(&mut results, next_position, position);
    }

    loop {
        let mut is_changed = false;
        match compare(&old_iter, &new_iter) {
            Comparison::Matches => {
                next_position = old_iter.end_position();
            }
            Comparison::MayDiffer => {
                if old_iter.descend(position.bytes) {
                    if !new_iter.descend(position.bytes) {
                        is_changed = true;
                        next_position = old_iter.end_position();
                    }
                } else if new_iter.descend(position.bytes) {
                    is_changed = true;
                    next_position = new_iter.end_position();
                } else {
                    next_position = old_iter.end_position().min(new_iter.end_position());
                }
            }
            Comparison::Differs => {
                is_changed = true;
                next_position = old_iter.end_position().min(new_iter.end_position());
            }
        }

        while !old_iter.done() && old_iter.end_position().bytes <= next_position.bytes {
            old_iter.advance();
        }
        while !new_iter.done() && new_iter.end_position().bytes <= next_position.bytes {
            new_iter.advance();
        }

        while old_iter.visible_depth > new_iter.visible_depth {
            old_iter.ascend();
        }
        while new_iter.visible_depth > old_iter.visible_depth {
            new_iter.ascend();
        }

        if is_changed {
            add_range(&mut results, position, next_position);
        }
        position = next_position;

        if old_iter.done() || new_iter.done() {
            break;
        }
    }

    let old_size = old.total_size();
    let new_size = new.total_size();
    if old_size.bytes < new_size.bytes {
        add_range(&mut results, old_size, new_size);
    } else if new_size.bytes < old_size.bytes {
        add_range(&mut results, new_size, old_size);
    }
    results
}
