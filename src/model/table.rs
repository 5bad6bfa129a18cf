//! Table types.

use super::{Block, NodeId};
use serde::{Deserialize, Serialize};

/// A table, either a word-processor table or a whole spreadsheet grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Node id
    pub id: NodeId,

    /// Rows in document order
    pub rows: Vec<Row>,
}

impl Table {
    /// Create a new empty table.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            rows: Vec::new(),
        }
    }

    /// Add a row to the table.
    pub fn add_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Get the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Plain text: cells joined by tabs, rows by newlines.
    pub fn plain_text(&self) -> String {
        self.rows
            .iter()
            .map(|row| row.plain_text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Check if the table has merged cells.
    pub fn has_merged_cells(&self) -> bool {
        self.cells().any(|c| c.is_merged())
    }

    /// All cells of the table, row by row.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.rows.iter().flat_map(|r| &r.cells)
    }

    /// Tables nested anywhere below this one, depth first.
    pub fn nested_tables(&self) -> Vec<&Table> {
        let mut out = Vec::new();
        for cell in self.cells() {
            for nested in &cell.nested_tables {
                out.push(nested);
                out.extend(nested.nested_tables());
            }
        }
        out
    }

    /// Find the cell whose extent covers `(row, col)`.
    pub fn cell_covering(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells().find(|c| c.covers(row, col))
    }

    /// Pairs of cells that claim a common coordinate.
    ///
    /// A well-formed table returns an empty list.
    pub fn overlapping_cells(&self) -> Vec<((u32, u32), (u32, u32))> {
        let cells: Vec<&Cell> = self.cells().collect();
        let mut overlaps = Vec::new();
        for (i, a) in cells.iter().enumerate() {
            for b in &cells[i + 1..] {
                if a.overlaps(b) {
                    overlaps.push(((a.row, a.col), (b.row, b.col)));
                }
            }
        }
        overlaps
    }
}

/// A table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Grid row coordinate (0-based)
    pub index: u32,

    /// Cells in column order; covered positions of merged cells are absent
    pub cells: Vec<Cell>,
}

impl Row {
    /// Create a row.
    pub fn new(index: u32, cells: Vec<Cell>) -> Self {
        Self { index, cells }
    }

    /// Get plain text representation.
    pub fn plain_text(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.plain_text())
            .collect::<Vec<_>>()
            .join("\t")
    }

    /// Check if every cell is empty.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.is_empty())
    }
}

/// A table cell at its anchor coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Anchor row (0-based)
    pub row: u32,

    /// Anchor column (0-based)
    pub col: u32,

    /// Number of rows occupied
    pub row_span: u32,

    /// Number of columns occupied
    pub col_span: u32,

    /// Paragraphs of the cell
    pub blocks: Vec<Block>,

    /// Tables nested inside the cell
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_tables: Vec<Table>,

    /// Background fill as `#RRGGBB`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,

    /// Cell borders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub borders: Option<Borders>,

    /// Formula text for spreadsheet cells
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    /// Last computed value for formula cells
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_value: Option<String>,
}

impl Cell {
    /// Create an empty cell at an anchor coordinate.
    pub fn new(row: u32, col: u32) -> Self {
        Self {
            row,
            col,
            row_span: 1,
            col_span: 1,
            blocks: Vec::new(),
            nested_tables: Vec::new(),
            fill_color: None,
            borders: None,
            formula: None,
            cached_value: None,
        }
    }

    /// Set spans and return self. Zero spans are treated as 1.
    pub fn with_span(mut self, row_span: u32, col_span: u32) -> Self {
        self.row_span = row_span.max(1);
        self.col_span = col_span.max(1);
        self
    }

    /// Set content and return self.
    pub fn with_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.blocks = blocks;
        self
    }

    /// Text of the cell's own paragraphs, without nested tables.
    pub fn own_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.plain_text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text of the cell including nested tables.
    pub fn plain_text(&self) -> String {
        let mut parts = vec![self.own_text()];
        parts.extend(self.nested_tables.iter().map(|t| t.plain_text()));
        parts.retain(|p| !p.is_empty());
        parts.join("\n")
    }

    /// Check if the cell has no text and no nested content.
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.is_empty())
            && self.nested_tables.iter().all(|t| t.cells().all(|c| c.is_empty()))
    }

    /// Check if this cell spans multiple rows or columns.
    pub fn is_merged(&self) -> bool {
        self.row_span > 1 || self.col_span > 1
    }

    /// Whether `(row, col)` lies inside this cell's extent.
    pub fn covers(&self, row: u32, col: u32) -> bool {
        row >= self.row
            && row < self.row + self.row_span
            && col >= self.col
            && col < self.col + self.col_span
    }

    fn overlaps(&self, other: &Cell) -> bool {
        self.row < other.row + other.row_span
            && other.row < self.row + self.row_span
            && self.col < other.col + other.col_span
            && other.col < self.col + self.col_span
    }
}

/// Cell border set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borders {
    /// Top edge
    pub top: Option<BorderLine>,
    /// Bottom edge
    pub bottom: Option<BorderLine>,
    /// Left edge
    pub left: Option<BorderLine>,
    /// Right edge
    pub right: Option<BorderLine>,
}

impl Borders {
    /// Whether no edge is set.
    pub fn is_empty(&self) -> bool {
        self.top.is_none() && self.bottom.is_none() && self.left.is_none() && self.right.is_none()
    }
}

/// One border edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderLine {
    /// Line style (e.g. "single", "thin")
    pub style: String,
    /// Line color as `#RRGGBB`
    pub color: Option<String>,
}
