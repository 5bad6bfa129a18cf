//! Document statistics.

use crate::model::{Block, DocumentTree, Node, Table};
use serde::{Deserialize, Serialize};

/// Statistics collected from a normalized document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Number of sections (sheets, for grid documents)
    pub section_count: u32,

    /// Number of body paragraphs, including those inside cells
    pub paragraph_count: u32,

    /// Paragraphs with visible text
    pub non_empty_paragraph_count: u32,

    /// Number of headings
    pub heading_count: u32,

    /// Number of tables, nested ones included
    pub table_count: u32,

    /// Number of table cells
    pub cell_count: u32,

    /// Number of images found
    pub image_count: u32,

    /// Runs carrying any formatting
    pub formatted_run_count: u32,

    /// Approximate word count (whitespace-separated tokens)
    pub word_count: u32,

    /// Character count (excluding whitespace)
    pub char_count: u32,
}

impl DocumentStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect statistics from a tree.
    pub fn from_tree(tree: &DocumentTree) -> Self {
        let mut stats = Self::new();
        for section in &tree.sections {
            stats.section_count += 1;
            for node in &section.nodes {
                match node {
                    Node::Block(block) => stats.add_block(block),
                    Node::Table(table) => stats.add_table(table),
                }
            }
        }
        for _ in &tree.images {
            stats.add_image();
        }
        stats.count_text(&tree.plain_text());
        stats
    }

    /// Count a paragraph or heading and its formatted runs.
    pub fn add_block(&mut self, block: &Block) {
        if block.is_heading() {
            self.heading_count += 1;
        } else {
            self.paragraph_count += 1;
            if !block.is_empty() {
                self.non_empty_paragraph_count += 1;
            }
        }
        self.formatted_run_count += block
            .runs
            .iter()
            .filter(|r| !r.style().is_plain())
            .count() as u32;
    }

    /// Count a table, its cells and their content.
    pub fn add_table(&mut self, table: &Table) {
        self.table_count += 1;
        for cell in table.cells() {
            self.cell_count += 1;
            for block in &cell.blocks {
                self.add_block(block);
            }
            for nested in &cell.nested_tables {
                self.add_table(nested);
            }
        }
    }

    /// Increment image count.
    pub fn add_image(&mut self) {
        self.image_count += 1;
    }

    /// Add word and character counts from text.
    pub fn count_text(&mut self, text: &str) {
        self.word_count += text.split_whitespace().count() as u32;
        self.char_count += text.chars().filter(|c| !c.is_whitespace()).count() as u32;
    }

    /// Merge another stats instance into this one.
    pub fn merge(&mut self, other: &DocumentStats) {
        self.section_count += other.section_count;
        self.paragraph_count += other.paragraph_count;
        self.non_empty_paragraph_count += other.non_empty_paragraph_count;
        self.heading_count += other.heading_count;
        self.table_count += other.table_count;
        self.cell_count += other.cell_count;
        self.image_count += other.image_count;
        self.formatted_run_count += other.formatted_run_count;
        self.word_count += other.word_count;
        self.char_count += other.char_count;
    }
}
