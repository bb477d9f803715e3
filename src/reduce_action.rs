use crate::language::Symbol;

// Reduce actions collected for one (state, lookahead) cell while building a table.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ReduceAction {
    pub count: u16,
    pub symbol: Symbol,
    pub production_id: u16,
    /// Index of the production, for conflict messages.
    pub production: usize,
}

#[derive(Default)]
pub(crate) struct ReduceActionSet {
    pub actions: Vec<ReduceAction>,
}

impl ReduceActionSet {
    /// Add `new_action` unless a reduction of the same production is already present.
    pub fn add(&mut self, new_action: ReduceAction) {
        for action in &self.actions {
            if action.production == new_action.production {
                return;
            }
        }
        self.actions.push(new_action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
