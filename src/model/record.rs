//! Extracted proposal records.

use super::NodeId;
use crate::text::{collapse_whitespace, escape_html, fold_accents, strip_tags};
use serde::{Deserialize, Serialize};

/// Formatted content with its plain-text projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedText {
    /// Inline HTML markup
    pub markup: String,
    /// Text without markup
    pub plain_text: String,
}

impl FormattedText {
    /// Create from already-rendered parts.
    pub fn new(markup: impl Into<String>, plain_text: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            plain_text: plain_text.into(),
        }
    }

    /// Empty content.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from markup received from outside, deriving the plain text.
    pub fn from_markup(markup: impl Into<String>) -> Self {
        let markup = markup.into();
        let plain_text = strip_tags(&markup);
        Self { markup, plain_text }
    }

    /// Build from text returned by a model: markup is kept as is, bare text
    /// becomes one escaped paragraph per line.
    pub fn from_model_text(text: &str) -> Self {
        let text = text.trim();
        if is_placeholder(text) {
            return Self::empty();
        }
        if text.contains('<') && text.contains('>') {
            return Self::from_markup(text);
        }
        let markup = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| format!("<p>{}</p>", escape_html(l.trim())))
            .collect::<String>();
        Self::new(markup, text)
    }

    /// Whether there is no visible text.
    pub fn is_empty(&self) -> bool {
        self.plain_text.trim().is_empty()
    }

    /// Append another piece; plain texts are joined by a newline.
    pub fn push(&mut self, other: FormattedText) {
        if other.is_empty() && other.markup.is_empty() {
            return;
        }
        self.markup.push_str(&other.markup);
        if !other.plain_text.is_empty() {
            if !self.plain_text.is_empty() {
                self.plain_text.push('\n');
            }
            self.plain_text.push_str(&other.plain_text);
        }
    }
}

/// Marker phrases meaning "no content" in source documents and model output.
fn is_placeholder(text: &str) -> bool {
    matches!(
        collapse_whitespace(&fold_accents(text)).trim_end_matches('.'),
        "" | "SIN OBSERVACION" | "SIN PROPUESTA" | "N/A" | "NINGUNA"
    )
}

/// How a record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Anchor-pattern matching over the document tree
    Structured,
    /// Generative-model fallback
    Fallback,
}

impl ExtractionMethod {
    /// Stable label used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Structured => "structured",
            ExtractionMethod::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record came from. Opaque to consumers; kept for auditing and for
/// image location queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceLocation {
    /// Rows of a top-level table
    Table {
        /// Section index
        section: usize,
        /// Table id
        table: NodeId,
        /// First grid row touched by the record
        first_row: u32,
        /// Last grid row touched by the record
        last_row: u32,
    },
    /// A range of top-level nodes
    Blocks {
        /// Section index
        section: usize,
        /// First node id of the range
        first: NodeId,
        /// Last node id of the range
        last: NodeId,
    },
    /// Produced by the fallback from a serialized region
    Fallback {
        /// Description of the serialized region
        region: String,
    },
}

/// Additional facts harvested from the record text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDetails {
    /// Date mentions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<String>,
    /// Responsible-party mentions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responsible: Vec<String>,
    /// Numeric references ("Ref. 12/2024")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    /// Status keywords
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl RecordDetails {
    /// Whether nothing was found.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
            && self.responsible.is_empty()
            && self.references.is_empty()
            && self.keywords.is_empty()
    }
}

/// One observation/proposal pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRecord {
    /// 1-based, dense, in discovery order
    pub number: u32,

    /// Observation content
    pub observation: FormattedText,

    /// Proposal content
    pub proposal: FormattedText,

    /// Sheet or section name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_or_section: Option<String>,

    /// Structured or fallback
    pub extraction_method: ExtractionMethod,

    /// Where the record came from
    pub source_location: SourceLocation,

    /// Leading reference number of the record's row ("1.2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Leading classification code of the record's row ("AF-01")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,

    /// Facts found in the record text
    #[serde(default, skip_serializing_if = "RecordDetails::is_empty")]
    pub details: RecordDetails,
}

impl ProposalRecord {
    /// Create a record with no reference, classification or details.
    pub fn new(
        number: u32,
        observation: FormattedText,
        proposal: FormattedText,
        extraction_method: ExtractionMethod,
        source_location: SourceLocation,
    ) -> Self {
        Self {
            number,
            observation,
            proposal,
            sheet_or_section: None,
            extraction_method,
            source_location,
            reference: None,
            classification: None,
            details: RecordDetails::default(),
        }
    }

    /// Set the sheet or section name and return self.
    pub fn with_section(mut self, name: Option<String>) -> Self {
        self.sheet_or_section = name;
        self
    }

    /// Check if this record came from the structured matcher.
    pub fn is_structured(&self) -> bool {
        self.extraction_method == ExtractionMethod::Structured
    }
}
