//! Immutable, reference-counted syntax tree nodes.
//!
//! A [`Subtree`] stores only *relative* geometry: its padding (skipped text
//! before it) and its size, both measured from the end of the previous
//! sibling. Nothing about a subtree depends on where it sits in the document,
//! so an unchanged subtree can be shared verbatim by every tree derived from
//! the one that created it. Editing copies only the nodes on the path to the
//! edit and leaves everything else shared.

use std::fmt::Write as _;
use std::io;
use std::sync::Arc;

use crate::error_costs::{
    ERROR_COST_PER_MISSING_TREE, ERROR_COST_PER_RECOVERY, ERROR_COST_PER_SKIPPED_CHAR,
    ERROR_COST_PER_SKIPPED_LINE, ERROR_COST_PER_SKIPPED_TREE,
};
use crate::language::{Language, LexMode, StateId, Symbol, BUILTIN_SYM_END, BUILTIN_SYM_ERROR};
use crate::length::{saturating_u32, Length, LENGTH_ZERO};
use crate::lexer::{ExternalScannerState, Token};
use crate::tree::InputEdit;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How the leftmost leaf of a subtree was lexed.
///
/// A subtree can only be reused where its first token would be lexed the
/// same way again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FirstLeaf {
    pub symbol: Symbol,
    pub lex_mode: LexMode,
    pub parse_state: StateId,
}

#[derive(Clone, Debug)]
pub(crate) struct SubtreeData {
    symbol: Symbol,
    padding: Length,
    size: Length,
    lookahead_bytes: u32,
    parse_state: StateId,
    error_cost: u32,
    production_id: u16,
    visible: bool,
    named: bool,
    extra: bool,
    is_missing: bool,
    has_changes: bool,
    has_external_tokens: bool,
    depends_on_column: bool,
    first_leaf: Option<FirstLeaf>,
    visible_child_count: u32,
    named_child_count: u32,
    visible_descendant_count: u32,
    external_scanner_state: Option<ExternalScannerState>,
    children: Vec<Subtree>,
}

/// A shared handle to an immutable syntax node.
#[derive(Clone, Debug)]
pub(crate) struct Subtree(Arc<SubtreeData>);

// Deep trees must not recurse on drop.
impl Drop for SubtreeData {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(Subtree(tree)) = stack.pop() {
            if let Some(mut data) = Arc::into_inner(tree) {
                stack.append(&mut data.children);
            }
        }
    }
}

/// An edit expressed relative to the start of a subtree's padding.
#[derive(Clone, Copy, Debug)]
struct Edit {
    start: Length,
    old_end: Length,
    new_end: Length,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl SubtreeData {
    fn leaf(symbol: Symbol, padding: Length, size: Length, language: &Language) -> Self {
        let metadata = language.symbol_metadata(symbol);
        Self {
            symbol,
            padding,
            size,
            lookahead_bytes: 0,
            parse_state: 0,
            error_cost: 0,
            production_id: 0,
            visible: metadata.visible,
            named: metadata.named,
            extra: false,
            is_missing: false,
            has_changes: false,
            has_external_tokens: false,
            depends_on_column: false,
            first_leaf: None,
            visible_child_count: 0,
            named_child_count: 0,
            visible_descendant_count: 0,
            external_scanner_state: None,
            children: Vec::new(),
        }
    }
}

impl Subtree {
    /// A leaf for a token produced by the lexer in `parse_state`.
    pub(crate) fn new_leaf(token: &Token, parse_state: StateId, language: &Language) -> Subtree {
        let padding = token.padding();
        let size = token.size();
        let mut data = SubtreeData::leaf(token.symbol, padding, size, language);
        data.lookahead_bytes = token.lookahead_bytes();
        data.parse_state = parse_state;
        data.depends_on_column = token.depends_on_column;
        data.first_leaf = Some(FirstLeaf {
            symbol: token.symbol,
            lex_mode: token.lex_mode,
            parse_state,
        });
        if let Some(state) = &token.external_scanner_state {
            data.has_external_tokens = true;
            data.external_scanner_state = Some(state.clone());
        }
        if token.symbol == BUILTIN_SYM_ERROR {
            data.error_cost = ERROR_COST_PER_RECOVERY
                + ERROR_COST_PER_SKIPPED_CHAR * size.bytes
                + ERROR_COST_PER_SKIPPED_LINE * size.extent.row;
        }
        Subtree(Arc::new(data))
    }

    /// A zero-width placeholder for a token the parser had to assume.
    pub(crate) fn new_missing_leaf(
        symbol: Symbol,
        parse_state: StateId,
        language: &Language,
    ) -> Subtree {
        let mut data = SubtreeData::leaf(symbol, LENGTH_ZERO, LENGTH_ZERO, language);
        data.parse_state = parse_state;
        data.is_missing = true;
        data.error_cost = ERROR_COST_PER_MISSING_TREE + ERROR_COST_PER_RECOVERY;
        Subtree(Arc::new(data))
    }

    /// An internal node whose geometry and summary come from `children`.
    pub(crate) fn new_node(
        symbol: Symbol,
        children: Vec<Subtree>,
        production_id: u16,
        parse_state: StateId,
        language: &Language,
    ) -> Subtree {
        let mut data = SubtreeData::leaf(symbol, LENGTH_ZERO, LENGTH_ZERO, language);
        data.production_id = production_id;
        data.parse_state = parse_state;
        data.children = children;
        data.summarize();
        Subtree(Arc::new(data))
    }

    /// An `ERROR` node wrapping skipped or unparseable subtrees.
    pub(crate) fn new_error_node(
        children: Vec<Subtree>,
        extra: bool,
        parse_state: StateId,
        language: &Language,
    ) -> Subtree {
        let mut data = SubtreeData::leaf(BUILTIN_SYM_ERROR, LENGTH_ZERO, LENGTH_ZERO, language);
        data.parse_state = parse_state;
        data.extra = extra;
        data.children = children;
        data.summarize();
        Subtree(Arc::new(data))
    }

    /// The root of a finished parse. It always spans `[0, total)`, so leading
    /// and trailing whitespace fall inside it rather than in its padding.
    pub(crate) fn new_root(
        symbol: Symbol,
        production_id: u16,
        children: Vec<Subtree>,
        total: Length,
        language: &Language,
    ) -> Subtree {
        let mut data = SubtreeData::leaf(symbol, LENGTH_ZERO, LENGTH_ZERO, language);
        data.production_id = production_id;
        data.children = children;
        data.summarize();
        data.visible = true;
        data.padding = LENGTH_ZERO;
        data.size = total;
        data.lookahead_bytes = 1;
        Subtree(Arc::new(data))
    }

    /// This subtree with its `extra` flag set to `extra`, sharing when possible.
    pub(crate) fn with_extra(self, extra: bool) -> Subtree {
        if self.0.extra == extra {
            return self;
        }
        let mut tree = self;
        Arc::make_mut(&mut tree.0).extra = extra;
        tree
    }

    /// Fold any padding into the size so that a root keeps starting at zero
    /// after an insertion at the very beginning of the text.
    pub(crate) fn into_root(self) -> Subtree {
        if self.0.padding.is_zero() {
            return self;
        }
        let mut tree = self;
        let data = Arc::make_mut(&mut tree.0);
        data.size = data.padding.add(data.size);
        data.padding = LENGTH_ZERO;
        tree
    }

    /// Extend the examined extent so that it reaches `end_byte`, measured
    /// from the start of this subtree's padding.
    pub(crate) fn extend_lookahead(&mut self, end_byte: u32) {
        let total = self.total_bytes();
        if end_byte > total + self.0.lookahead_bytes {
            Arc::make_mut(&mut self.0).lookahead_bytes = end_byte - total;
        }
    }
}

impl SubtreeData {
    /// Recompute geometry and summary fields from the children.
    fn summarize(&mut self) {
        self.visible_child_count = 0;
        self.named_child_count = 0;
        self.visible_descendant_count = 0;
        self.error_cost = 0;
        self.has_external_tokens = false;
        self.depends_on_column = false;
        self.first_leaf = self.children.first().and_then(|child| child.0.first_leaf);

        let is_error = self.symbol == BUILTIN_SYM_ERROR;
        let mut total = LENGTH_ZERO;
        let mut lookahead_end_byte = 0;

        for child in &self.children {
            let child_end = total.bytes + child.total_bytes() + child.0.lookahead_bytes;
            lookahead_end_byte = lookahead_end_byte.max(child_end);
            total = total.add(child.total_size());

            self.error_cost += child.0.error_cost;
            if is_error && !child.0.extra {
                if child.0.visible {
                    self.error_cost += ERROR_COST_PER_SKIPPED_TREE;
                } else {
                    self.error_cost += ERROR_COST_PER_SKIPPED_TREE * child.0.visible_child_count;
                }
            }

            if child.0.visible {
                self.visible_child_count += 1;
                self.visible_descendant_count += 1;
                if child.0.named {
                    self.named_child_count += 1;
                }
            } else {
                self.visible_child_count += child.0.visible_child_count;
                self.named_child_count += child.0.named_child_count;
            }
            self.visible_descendant_count += child.0.visible_descendant_count;
            self.has_external_tokens |= child.0.has_external_tokens;
            self.depends_on_column |= child.0.depends_on_column;
        }

        match self.children.first() {
            Some(first) => {
                self.padding = first.0.padding;
                self.size = total.sub(first.0.padding);
            }
            None => {
                self.padding = LENGTH_ZERO;
                self.size = LENGTH_ZERO;
            }
        }
        self.lookahead_bytes = lookahead_end_byte.saturating_sub(total.bytes);

        if is_error {
            self.error_cost += ERROR_COST_PER_RECOVERY
                + ERROR_COST_PER_SKIPPED_CHAR * self.size.bytes
                + ERROR_COST_PER_SKIPPED_LINE * self.size.extent.row;
        }
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl Subtree {
    #[inline]
    pub(crate) fn ptr_eq(a: &Subtree, b: &Subtree) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    #[inline]
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    #[inline]
    pub(crate) fn symbol(&self) -> Symbol {
        self.0.symbol
    }

    /// The symbol of the leftmost leaf, which is what the parse table sees
    /// when this subtree is the lookahead.
    #[inline]
    pub(crate) fn leaf_symbol(&self) -> Symbol {
        self.0.first_leaf.map_or(self.0.symbol, |leaf| leaf.symbol)
    }

    #[inline]
    pub(crate) fn padding(&self) -> Length {
        self.0.padding
    }

    #[inline]
    pub(crate) fn size(&self) -> Length {
        self.0.size
    }

    #[inline]
    pub(crate) fn total_size(&self) -> Length {
        self.0.padding.add(self.0.size)
    }

    #[inline]
    pub(crate) fn total_bytes(&self) -> u32 {
        self.0.padding.bytes + self.0.size.bytes
    }

    #[inline]
    pub(crate) fn lookahead_bytes(&self) -> u32 {
        self.0.lookahead_bytes
    }

    #[inline]
    pub(crate) fn parse_state(&self) -> StateId {
        self.0.parse_state
    }

    #[inline]
    pub(crate) fn error_cost(&self) -> u32 {
        self.0.error_cost
    }

    #[inline]
    pub(crate) fn production_id(&self) -> u16 {
        self.0.production_id
    }

    #[inline]
    pub(crate) fn is_error(&self) -> bool {
        self.0.symbol == BUILTIN_SYM_ERROR
    }

    #[inline]
    pub(crate) fn is_eof(&self) -> bool {
        self.0.symbol == BUILTIN_SYM_END
    }

    #[inline]
    pub(crate) fn is_missing(&self) -> bool {
        self.0.is_missing
    }

    #[inline]
    pub(crate) fn is_extra(&self) -> bool {
        self.0.extra
    }

    #[inline]
    pub(crate) fn is_visible(&self) -> bool {
        self.0.visible
    }

    #[inline]
    pub(crate) fn is_named(&self) -> bool {
        self.0.named
    }

    #[inline]
    pub(crate) fn has_changes(&self) -> bool {
        self.0.has_changes
    }

    #[inline]
    pub(crate) fn has_external_tokens(&self) -> bool {
        self.0.has_external_tokens
    }

    #[inline]
    pub(crate) fn depends_on_column(&self) -> bool {
        self.0.depends_on_column
    }

    #[inline]
    pub(crate) fn first_leaf(&self) -> Option<FirstLeaf> {
        self.0.first_leaf
    }

    #[inline]
    pub(crate) fn children(&self) -> &[Subtree] {
        &self.0.children
    }

    #[inline]
    pub(crate) fn child_count(&self) -> usize {
        self.0.children.len()
    }

    #[inline]
    pub(crate) fn visible_child_count(&self) -> u32 {
        self.0.visible_child_count
    }

    #[inline]
    pub(crate) fn named_child_count(&self) -> u32 {
        self.0.named_child_count
    }

    #[inline]
    pub(crate) fn visible_descendant_count(&self) -> u32 {
        self.0.visible_descendant_count
    }

    /// Bytes from the start of this subtree's padding to the end of what was
    /// examined to lex its leftmost leaf.
    pub(crate) fn first_leaf_end(&self) -> u32 {
        let mut tree = self;
        while let Some(first) = tree.0.children.first() {
            tree = first;
        }
        tree.total_bytes() + tree.0.lookahead_bytes
    }

    /// The rightmost externally scanned leaf in this subtree.
    pub(crate) fn last_external_token(&self) -> Option<&Subtree> {
        if !self.0.has_external_tokens {
            return None;
        }
        let mut tree = self;
        while let Some(child) = tree
            .0
            .children
            .iter()
            .rev()
            .find(|child| child.0.has_external_tokens)
        {
            tree = child;
        }
        Some(tree)
    }

    pub(crate) fn external_scanner_state(&self) -> Option<&ExternalScannerState> {
        self.0.external_scanner_state.as_ref()
    }

    /// Whether two subtrees have the same shape, kinds, and geometry.
    pub(crate) fn structurally_eq(a: &Subtree, b: &Subtree) -> bool {
        let mut stack = vec![(a, b)];
        while let Some((a, b)) = stack.pop() {
            if Subtree::ptr_eq(a, b) {
                continue;
            }
            let (x, y) = (&a.0, &b.0);
            if x.symbol != y.symbol
                || x.padding != y.padding
                || x.size != y.size
                || x.extra != y.extra
                || x.is_missing != y.is_missing
                || x.production_id != y.production_id
                || x.children.len() != y.children.len()
            {
                return false;
            }
            stack.extend(x.children.iter().zip(&y.children));
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

impl Subtree {
    /// Apply `edit` to this subtree, copying every node whose extent or
    /// examined text touches it and marking those nodes as changed.
    pub(crate) fn edit(&self, edit: &InputEdit) -> Subtree {
        self.edit_relative(Edit {
            start: Length::new(saturating_u32(edit.start_byte), edit.start_position),
            old_end: Length::new(saturating_u32(edit.old_end_byte), edit.old_end_position),
            new_end: Length::new(saturating_u32(edit.new_end_byte), edit.new_end_position),
        })
    }

    fn edit_relative(&self, edit: Edit) -> Subtree {
        let is_noop = edit.old_end.bytes == edit.start.bytes && edit.start.bytes == edit.new_end.bytes;
        let is_pure_insertion = edit.old_end.bytes == edit.start.bytes;

        let mut padding = self.0.padding;
        let mut size = self.0.size;
        let total_size = padding.add(size);
        let end_byte = total_size.bytes + self.0.lookahead_bytes;
        if edit.start.bytes > end_byte || (is_noop && edit.start.bytes == end_byte) {
            return self.clone();
        }

        // The edit is entirely within the space before this subtree.
        if edit.old_end.bytes <= padding.bytes {
            padding = edit.new_end.add(padding.sub(edit.old_end));
        }
        // The edit starts in the space before this subtree and extends into it.
        else if edit.start.bytes < padding.bytes {
            size = size.saturating_sub(edit.old_end.sub(padding));
            padding = edit.new_end;
        }
        // The edit is within this subtree, or it extends this subtree.
        else if edit.start.bytes < total_size.bytes
            || (edit.start.bytes == total_size.bytes && is_pure_insertion)
        {
            size = edit
                .new_end
                .sub(padding)
                .add(size.saturating_sub(edit.old_end.sub(padding)));
        }

        let mut data = (*self.0).clone();
        data.padding = padding;
        data.size = size;
        data.has_changes = true;

        let invalidate_first_row = data.depends_on_column;
        let mut edit = edit;
        let mut child_right = LENGTH_ZERO;
        for (i, child) in data.children.iter_mut().enumerate() {
            let child_size = child.total_size();
            let child_left = child_right;
            child_right = child_left.add(child_size);

            // Children that end before the edit are untouched.
            if child_right.bytes + child.0.lookahead_bytes < edit.start.bytes {
                continue;
            }

            // Stop at the first child past the edit, unless column-dependent
            // tokens on the first row still need to be invalidated.
            if (child_left.bytes > edit.old_end.bytes
                || (child_left.bytes == edit.old_end.bytes && child_size.bytes > 0 && i > 0))
                && (!invalidate_first_row || child_left.extent.row > padding.extent.row)
            {
                break;
            }

            let mut child_edit = Edit {
                start: edit.start.saturating_sub(child_left),
                old_end: edit.old_end.saturating_sub(child_left),
                new_end: edit.new_end.saturating_sub(child_left),
            };

            // Inserted text goes to the first child that touches the edit; the
            // rest only shrink.
            if child_right.bytes > edit.start.bytes
                || (child_right.bytes == edit.start.bytes && is_pure_insertion)
            {
                edit.new_end = edit.start;
            } else {
                child_edit.old_end = child_edit.start;
                child_edit.new_end = child_edit.start;
            }

            *child = child.edit_relative(child_edit);
        }

        Subtree(Arc::new(data))
    }
}

// ---------------------------------------------------------------------------
// Printing
// ---------------------------------------------------------------------------

impl Subtree {
    /// Render as an S-expression of named nodes, with field labels.
    pub(crate) fn to_sexp(&self, language: &Language) -> String {
        let mut out = String::new();
        self.write_sexp(language, &mut out, None, true);
        out
    }

    fn write_sexp(
        &self,
        language: &Language,
        out: &mut String,
        field_name: Option<&str>,
        is_root: bool,
    ) {
        let is_visible = is_root || self.0.is_missing || (self.0.visible && self.0.named);
        if is_visible {
            if !out.is_empty() {
                out.push(' ');
            }
            if let Some(field_name) = field_name {
                let _ = write!(out, "{field_name}: ");
            }
            let name = language.symbol_name(self.0.symbol);
            if self.0.is_missing {
                if self.0.named {
                    let _ = write!(out, "(MISSING {name}");
                } else {
                    let _ = write!(out, "(MISSING \"{}\"", name.escape_default());
                }
            } else {
                let _ = write!(out, "({name}");
            }
        }

        let field_map = language.table().field_map(self.0.production_id);
        let mut structural_index = 0;
        for child in &self.0.children {
            let mut child_field = if is_visible { None } else { field_name };
            if !child.0.extra {
                if let Some(entry) = field_map
                    .iter()
                    .find(|entry| usize::from(entry.child_index) == structural_index)
                {
                    child_field = language.field_name_for_id(entry.field_id);
                }
                structural_index += 1;
            }
            child.write_sexp(language, out, child_field, false);
        }

        if is_visible {
            out.push(')');
        }
    }

    /// Write every subtree, hidden ones included, as a Graphviz digraph.
    pub(crate) fn print_dot_graph(
        &self,
        language: &Language,
        out: &mut impl io::Write,
    ) -> io::Result<()> {
        writeln!(out, "digraph tree {{")?;
        writeln!(out, "edge [arrowhead=none]")?;
        let mut stack = vec![(self, LENGTH_ZERO)];
        while let Some((tree, start)) = stack.pop() {
            let data = &tree.0;
            let name = language.symbol_name(data.symbol).escape_default().to_string();
            write!(out, "tree_{} [label=\"{name}\"", tree.id())?;
            if data.children.is_empty() {
                write!(out, ", shape=plaintext")?;
            }
            if data.extra {
                write!(out, ", fontcolor=gray")?;
            }
            if data.has_changes {
                write!(out, ", color=green, penwidth=2")?;
            }
            writeln!(
                out,
                ", tooltip=\"range: {} - {}\\nstate: {}\\nerror-cost: {}\\nhas-changes: {}\\nlookahead-bytes: {}\"]",
                start.bytes + data.padding.bytes,
                start.bytes + data.padding.bytes + data.size.bytes,
                data.parse_state,
                data.error_cost,
                data.has_changes,
                data.lookahead_bytes,
            )?;
            let mut child_start = start;
            let mut pending = Vec::with_capacity(data.children.len());
            for child in &data.children {
                writeln!(out, "tree_{} -> tree_{} [tooltip={}]", tree.id(), child.id(), pending.len())?;
                pending.push((child, child_start));
                child_start = child_start.add(child.total_size());
            }
            stack.extend(pending.into_iter().rev());
        }
        writeln!(out, "}}")
    }
}
