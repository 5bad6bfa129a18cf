//! Document-level types.

use super::{Block, Image, NodeId, Table};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Word-processor document (DOCX): flowing paragraphs and tables
    Flow,
    /// Spreadsheet workbook (XLSX): one grid per sheet
    Grid,
}

impl DocumentKind {
    /// Map a file extension to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "docx" | "docm" => Some(DocumentKind::Flow),
            "xlsx" | "xlsm" => Some(DocumentKind::Grid),
            _ => None,
        }
    }

    /// Canonical extension.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Flow => "docx",
            DocumentKind::Grid => "xlsx",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.extension().to_ascii_uppercase())
    }
}

/// A normalized document.
///
/// Owned by the extraction call that built it. Images can be copied out
/// before the tree is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTree {
    /// Source kind
    pub kind: DocumentKind,

    /// Package metadata
    pub metadata: Metadata,

    /// Sections: one for flow documents, one per sheet for grids
    pub sections: Vec<Section>,

    /// Images bound to blocks or cells
    pub images: Vec<Image>,

    /// Regions that could not be parsed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub damaged: Vec<DamagedRegion>,
}

impl DocumentTree {
    /// Create an empty tree.
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            kind,
            metadata: Metadata::default(),
            sections: Vec::new(),
            images: Vec::new(),
            damaged: Vec::new(),
        }
    }

    /// Add a section.
    pub fn add_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    /// Every top-level table with its section index.
    pub fn tables(&self) -> impl Iterator<Item = (usize, &Table)> {
        self.sections.iter().enumerate().flat_map(|(i, s)| {
            s.nodes.iter().filter_map(move |n| match n {
                Node::Table(t) => Some((i, t)),
                Node::Block(_) => None,
            })
        })
    }

    /// Every top-level block with its section index.
    pub fn blocks(&self) -> impl Iterator<Item = (usize, &Block)> {
        self.sections.iter().enumerate().flat_map(|(i, s)| {
            s.nodes.iter().filter_map(move |n| match n {
                Node::Block(b) => Some((i, b)),
                Node::Table(_) => None,
            })
        })
    }

    /// Find a table by id, searching nested tables too.
    pub fn find_table(&self, id: NodeId) -> Option<&Table> {
        self.tables().find_map(|(_, t)| {
            if t.id == id {
                Some(t)
            } else {
                t.nested_tables().into_iter().find(|n| n.id == id)
            }
        })
    }

    /// Non-empty headings in document order.
    pub fn headings(&self) -> Vec<Heading> {
        self.blocks()
            .filter(|(_, b)| b.is_heading() && !b.is_empty())
            .map(|(_, b)| Heading {
                level: b.level,
                text: b.plain_text().trim().to_string(),
            })
            .collect()
    }

    /// Plain text of the whole document, sections separated by blank lines.
    pub fn plain_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.plain_text())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Name of a section, if it has one.
    pub fn section_name(&self, index: usize) -> Option<&str> {
        self.sections.get(index).and_then(|s| s.name.as_deref())
    }

    /// Whether part of the document could not be parsed.
    pub fn is_damaged(&self) -> bool {
        !self.damaged.is_empty()
    }
}

/// A section of a document. Grid documents have one per sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Sheet name; `None` for the body of a flow document
    pub name: Option<String>,

    /// Top-level nodes in document order
    pub nodes: Vec<Node>,
}

impl Section {
    /// Create an empty section.
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            nodes: Vec::new(),
        }
    }

    /// Plain text of the section.
    pub fn plain_text(&self) -> String {
        self.nodes
            .iter()
            .map(|n| match n {
                Node::Block(b) => b.plain_text(),
                Node::Table(t) => t.plain_text(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A top-level node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Paragraph or heading
    Block(Block),
    /// Table
    Table(Table),
}

impl Node {
    /// Id of the node.
    pub fn id(&self) -> NodeId {
        match self {
            Node::Block(b) => b.id,
            Node::Table(t) => t.id,
        }
    }
}

/// Part of a package that failed to parse, with whatever text could be
/// salvaged from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamagedRegion {
    /// Part or sheet name
    pub name: String,
    /// Why it failed
    pub reason: String,
    /// Salvaged text, tags stripped
    #[serde(skip_serializing)]
    pub raw_text: String,
}

/// A heading entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Heading level
    pub level: u8,
    /// Heading text
    pub text: String,
}

/// Package metadata from OOXML core properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Document title
    pub title: Option<String>,
    /// Author (`dc:creator`)
    pub author: Option<String>,
    /// Subject
    pub subject: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Keywords
    pub keywords: Option<String>,
    /// Category
    pub category: Option<String>,
    /// Last modified by
    pub last_modified_by: Option<String>,
    /// Revision number
    pub revision: Option<u32>,
    /// Creation date
    pub created: Option<DateTime<Utc>>,
    /// Modification date
    pub modified: Option<DateTime<Utc>>,
    /// Sheet names, for grid documents
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sheets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cell, Row, Run};

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(DocumentKind::from_extension("DOCX"), Some(DocumentKind::Flow));
        assert_eq!(DocumentKind::from_extension("xlsx"), Some(DocumentKind::Grid));
        assert_eq!(DocumentKind::from_extension("pdf"), None);
        assert_eq!(DocumentKind::Grid.to_string(), "XLSX");
    }

    #[test]
    fn test_tree_queries() {
        let mut tree = DocumentTree::new(DocumentKind::Flow);
        let mut section = Section::new(None);
        section.nodes.push(Node::Block(Block::heading(NodeId(0), 2, vec![Run::plain("Resumen")])));
        let mut table = Table::new(NodeId(1));
        let mut nested = Table::new(NodeId(3));
        nested.add_row(Row::new(0, vec![Cell::new(0, 0)]));
        let mut cell = Cell::new(0, 0);
        cell.nested_tables.push(nested);
        table.add_row(Row::new(0, vec![cell]));
        section.nodes.push(Node::Table(table));
        section.nodes.push(Node::Block(Block::paragraph(NodeId(4), vec![Run::plain("fin")])));
        tree.add_section(section);

        assert_eq!(tree.tables().count(), 1);
        assert_eq!(tree.blocks().count(), 2);
        assert!(tree.find_table(NodeId(3)).is_some());
        assert_eq!(
            tree.headings(),
            vec![Heading {
                level: 2,
                text: "Resumen".into()
            }]
        );
        assert_eq!(tree.plain_text(), "Resumen\n\nfin");
    }
}
