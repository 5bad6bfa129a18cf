//! Paragraph-level types: blocks and formatted runs.

use serde::{Deserialize, Serialize};

/// Identifier of a node inside one document tree.
///
/// Ids are allocated in document order, so comparing two ids of top-level
/// nodes tells which one comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Sequential id source used while building a tree.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    /// Create an allocator starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next id.
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// Block kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Heading paragraph
    Heading,
    /// Body paragraph
    #[default]
    Paragraph,
}

/// Paragraph alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    /// Left-aligned (default)
    #[default]
    Left,
    /// Centered
    Center,
    /// Right-aligned
    Right,
    /// Justified
    Justify,
}

impl Alignment {
    /// CSS `text-align` value.
    pub fn as_css(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "justify",
        }
    }

    /// Parse an OOXML `jc`/`horizontal` value.
    pub fn from_ooxml(value: &str) -> Option<Self> {
        match value {
            "left" | "start" | "general" => Some(Alignment::Left),
            "center" | "centerContinuous" => Some(Alignment::Center),
            "right" | "end" => Some(Alignment::Right),
            "both" | "justify" | "distribute" => Some(Alignment::Justify),
            _ => None,
        }
    }
}

/// A paragraph or heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Node id
    pub id: NodeId,

    /// Heading or body paragraph
    pub kind: BlockKind,

    /// Heading level, 0 for body paragraphs
    pub level: u8,

    /// Paragraph alignment
    pub alignment: Alignment,

    /// Formatted text runs
    pub runs: Vec<Run>,
}

impl Block {
    /// Create a body paragraph.
    pub fn paragraph(id: NodeId, runs: Vec<Run>) -> Self {
        Self {
            id,
            kind: BlockKind::Paragraph,
            level: 0,
            alignment: Alignment::Left,
            runs,
        }
    }

    /// Create a heading. Level 0 is bumped to 1.
    pub fn heading(id: NodeId, level: u8, runs: Vec<Run>) -> Self {
        Self {
            id,
            kind: BlockKind::Heading,
            level: level.max(1),
            alignment: Alignment::Left,
            runs,
        }
    }

    /// Set alignment and return self.
    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Concatenated run text.
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text()).collect()
    }

    /// Whether the block has no visible text.
    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|r| r.text().trim().is_empty())
    }

    /// Check if this is a heading.
    pub fn is_heading(&self) -> bool {
        self.kind == BlockKind::Heading
    }

    /// Copy of this block with the first `chars` characters removed.
    pub fn tail(&self, chars: usize) -> Block {
        let mut skip = chars;
        let mut runs = Vec::new();
        for run in &self.runs {
            let len = run.text().chars().count();
            if skip >= len {
                skip -= len;
                continue;
            }
            let text: String = run.text().chars().skip(skip).collect();
            skip = 0;
            runs.push(Run::new(text, run.style().clone()));
        }
        Block { runs, ..self.clone() }
    }
}

/// A run of text with one consistent style. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    text: String,
    style: RunStyle,
}

impl Run {
    /// Create a styled run.
    pub fn new(text: impl Into<String>, style: RunStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    /// Create an unstyled run.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, RunStyle::default())
    }

    /// Run text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Run style.
    pub fn style(&self) -> &RunStyle {
        &self.style
    }
}

/// Character formatting of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStyle {
    /// Bold
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    /// Italic
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    /// Underline
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    /// Strikethrough
    #[serde(default, skip_serializing_if = "is_false")]
    pub strike: bool,
    /// Superscript
    #[serde(default, skip_serializing_if = "is_false")]
    pub superscript: bool,
    /// Subscript
    #[serde(default, skip_serializing_if = "is_false")]
    pub subscript: bool,
    /// Text color as `#RRGGBB`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Font family
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    /// Font size in points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f32>,
    /// Highlight or background color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl RunStyle {
    /// Bold style.
    pub fn bold() -> Self {
        Self {
            bold: true,
            ..Default::default()
        }
    }

    /// Italic style.
    pub fn italic() -> Self {
        Self {
            italic: true,
            ..Default::default()
        }
    }

    /// Set color and return self.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Set font and return self.
    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = Some(font.into());
        self
    }

    /// Set size and return self.
    pub fn with_size(mut self, size: f32) -> Self {
        self.size = Some(size);
        self
    }

    /// Whether no formatting is applied.
    pub fn is_plain(&self) -> bool {
        *self == RunStyle::default()
    }
}
