use crate::lexer::ExternalScannerState;
use crate::subtree::Subtree;

// A cursor over an old tree that yields candidate subtrees for reuse in
// document order, each tagged with its absolute byte offset.

#[derive(Clone, Debug)]
struct StackEntry {
    tree: Subtree,
    child_index: usize,
    byte_offset: u32,
}

#[derive(Debug, Default)]
pub(crate) struct ReusableNode {
    stack: Vec<StackEntry>,
    /// The last externally scanned token before the current position.
    last_external_token: Option<Subtree>,
}

impl ReusableNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self, tree: &Subtree) {
        self.stack.clear();
        self.stack.push(StackEntry {
            tree: tree.clone(),
            child_index: 0,
            byte_offset: 0,
        });
        self.last_external_token = None;
    }

    pub fn tree(&self) -> Option<&Subtree> {
        self.stack.last().map(|entry| &entry.tree)
    }

    pub fn byte_offset(&self) -> u32 {
        self.stack.last().map_or(u32::MAX, |entry| entry.byte_offset)
    }

    /// Scanner state in effect before the current node.
    pub fn external_scanner_state(&self) -> ExternalScannerState {
        self.last_external_token
            .as_ref()
            .and_then(Subtree::external_scanner_state)
            .cloned()
            .unwrap_or_default()
    }

    /// Move past the current node to the next node in document order.
    pub fn advance(&mut self) {
        let Some(last_entry) = self.stack.last() else {
            return;
        };
        let byte_offset = last_entry.byte_offset + last_entry.tree.total_bytes();
        if last_entry.tree.has_external_tokens() {
            self.last_external_token = last_entry.tree.last_external_token().cloned();
        }

        let (tree, next_index) = loop {
            let Some(popped) = self.stack.pop() else {
                return;
            };
            let Some(parent) = self.stack.last() else {
                return;
            };
            let next_index = popped.child_index + 1;
            if next_index < parent.tree.child_count() {
                break (parent.tree.children()[next_index].clone(), next_index);
            }
        };

        self.stack.push(StackEntry {
            tree,
            child_index: next_index,
            byte_offset,
        });
    }

    /// Move to the first child of the current node. Returns `false` for leaves.
    pub fn descend(&mut self) -> bool {
        let Some(last_entry) = self.stack.last() else {
            return false;
        };
        let Some(child) = last_entry.tree.children().first().cloned() else {
            return false;
        };
        let byte_offset = last_entry.byte_offset;
        self.stack.push(StackEntry {
            tree: child,
            child_index: 0,
            byte_offset,
        });
        true
    }

    /// Descend to the leftmost leaf and then move past it.
    pub fn advance_past_leaf(&mut self) {
        while self.descend() {}
        self.advance();
    }
}
