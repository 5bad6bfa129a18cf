//! Programmatic construction of document trees.
//!
//! Readers build trees from packages; this builder covers callers that
//! assemble a tree by hand (tests, benchmarks, adapters for other sources).

use super::{
    Block, Cell, DocumentKind, DocumentTree, IdAllocator, NodeId, Node, Row, Run, Section, Table,
};

/// Builder for a [`DocumentTree`].
///
/// # Example
///
/// ```
/// use solvex::model::{DocumentKind, TreeBuilder};
///
/// let tree = TreeBuilder::new(DocumentKind::Flow)
///     .heading(1, "Cédula de observaciones")
///     .table(|t| {
///         t.row(&["Observación", "Faltan pólizas"]);
///         t.row(&["Propuesta de solventación", "Integrar expediente"]);
///     })
///     .build();
/// assert_eq!(tree.tables().count(), 1);
/// ```
pub struct TreeBuilder {
    tree: DocumentTree,
    ids: IdAllocator,
}

impl TreeBuilder {
    /// Start a tree with one unnamed section.
    pub fn new(kind: DocumentKind) -> Self {
        let mut tree = DocumentTree::new(kind);
        tree.add_section(Section::new(None));
        Self {
            tree,
            ids: IdAllocator::new(),
        }
    }

    /// Start a new named section (a sheet, for grid documents).
    ///
    /// The initial unnamed section is replaced if it is still empty.
    pub fn section(mut self, name: impl Into<String>) -> Self {
        let name = Some(name.into());
        match self.tree.sections.last_mut() {
            Some(last) if last.name.is_none() && last.nodes.is_empty() => last.name = name,
            _ => self.tree.add_section(Section::new(name)),
        }
        self
    }

    /// Append a body paragraph of plain text.
    pub fn paragraph(self, text: &str) -> Self {
        self.runs(vec![Run::plain(text)])
    }

    /// Append a body paragraph made of runs.
    pub fn runs(mut self, runs: Vec<Run>) -> Self {
        let id = self.ids.next_id();
        self.push(Node::Block(Block::paragraph(id, runs)));
        self
    }

    /// Append a heading.
    pub fn heading(mut self, level: u8, text: &str) -> Self {
        let id = self.ids.next_id();
        self.push(Node::Block(Block::heading(id, level, vec![Run::plain(text)])));
        self
    }

    /// Append a table built by `f`.
    pub fn table(mut self, f: impl FnOnce(&mut TableBuilder<'_>)) -> Self {
        let table = TableBuilder::build_with(&mut self.ids, f);
        self.push(Node::Table(table));
        self
    }

    /// Allocate an id without adding a node.
    pub fn next_id(&mut self) -> NodeId {
        self.ids.next_id()
    }

    /// Finish the tree.
    pub fn build(self) -> DocumentTree {
        self.tree
    }

    fn push(&mut self, node: Node) {
        if let Some(section) = self.tree.sections.last_mut() {
            section.nodes.push(node);
        }
    }
}

/// Builder for one table; columns are assigned left to right, skipping
/// positions still covered by row spans from earlier rows.
pub struct TableBuilder<'a> {
    ids: &'a mut IdAllocator,
    table: Table,
}

impl<'a> TableBuilder<'a> {
    fn build_with(ids: &'a mut IdAllocator, f: impl FnOnce(&mut TableBuilder<'_>)) -> Table {
        let id = ids.next_id();
        let mut builder = TableBuilder {
            ids,
            table: Table::new(id),
        };
        f(&mut builder);
        builder.table
    }

    /// Id of the table being built.
    pub fn id(&self) -> NodeId {
        self.table.id
    }

    /// Add a row of single-span text cells. Empty strings become empty cells.
    pub fn row<S: AsRef<str>>(&mut self, texts: &[S]) -> &mut Self {
        let cells = texts.iter().map(|t| self.text_cell(t.as_ref())).collect();
        self.cells(cells)
    }

    /// Add a row holding one cell merged across `col_span` columns.
    pub fn merged_row(&mut self, text: &str, col_span: u32) -> &mut Self {
        let cell = self.text_cell(text).with_span(1, col_span);
        self.cells(vec![cell])
    }

    /// Add a row of prepared cells; their coordinates are assigned here.
    pub fn cells(&mut self, cells: Vec<Cell>) -> &mut Self {
        let row_index = self.table.rows.len() as u32;
        let mut col = 0;
        let mut placed = Vec::with_capacity(cells.len());
        for mut cell in cells {
            while self.covered_from_above(row_index, col) {
                col += 1;
            }
            cell.row = row_index;
            cell.col = col;
            col += cell.col_span;
            placed.push(cell);
        }
        self.table.add_row(Row::new(row_index, placed));
        self
    }

    /// Create a text cell (coordinates are set when the row is added).
    pub fn text_cell(&mut self, text: &str) -> Cell {
        let blocks = if text.is_empty() {
            Vec::new()
        } else {
            text.split('\n')
                .map(|line| Block::paragraph(self.ids.next_id(), vec![Run::plain(line)]))
                .collect()
        };
        Cell::new(0, 0).with_blocks(blocks)
    }

    /// Create a cell of styled runs.
    pub fn run_cell(&mut self, runs: Vec<Run>) -> Cell {
        Cell::new(0, 0).with_blocks(vec![Block::paragraph(self.ids.next_id(), runs)])
    }

    /// Build a table to nest inside a cell.
    pub fn nested(&mut self, f: impl FnOnce(&mut TableBuilder<'_>)) -> Table {
        TableBuilder::build_with(self.ids, f)
    }

    fn covered_from_above(&self, row: u32, col: u32) -> bool {
        self.table
            .cells()
            .any(|c| c.row < row && c.covers(row, col))
    }
}
