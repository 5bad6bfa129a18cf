//! Per-document extraction report.

mod stats;

pub use stats::DocumentStats;

use crate::dedup::renumber;
use crate::error::Result;
use crate::extract::FallbackDecision;
use crate::model::{DocumentKind, ExtractionMethod, Heading, ImageRef, Metadata, ProposalRecord};
use crate::render::{to_json, JsonFormat};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Final state of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOutcome {
    /// Records were extracted and nothing was left undecided
    Succeeded,
    /// Records were extracted but part of the document stayed undecided
    Partial,
    /// The document could not be read or yielded no records
    Failed,
    /// The document was never started
    Skipped,
}

impl DocumentOutcome {
    /// Stable label used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentOutcome::Succeeded => "succeeded",
            DocumentOutcome::Partial => "partial",
            DocumentOutcome::Failed => "failed",
            DocumentOutcome::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for DocumentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record counts per extraction method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSummary {
    /// Records from the structured matcher
    pub structured_count: usize,
    /// Records from the fallback
    pub fallback_count: usize,
}

impl MethodSummary {
    /// Count the methods of a record set.
    pub fn from_records(records: &[ProposalRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.extraction_method {
                ExtractionMethod::Structured => summary.structured_count += 1,
                ExtractionMethod::Fallback => summary.fallback_count += 1,
            }
        }
        summary
    }
}

/// Images linked to one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordImages {
    /// Record number
    pub record: u32,
    /// Images anchored within the record's source range
    pub inside: Vec<String>,
    /// Images in the same table but outside the record's rows
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambiguous: Vec<String>,
}

/// Everything extracted from one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    /// Source file name
    pub file_name: String,

    /// Detected kind; `None` when detection failed
    pub kind: Option<DocumentKind>,

    /// When processing finished
    pub processed_at: DateTime<Utc>,

    /// Package metadata
    pub metadata: Metadata,

    /// Document statistics
    pub statistics: DocumentStats,

    /// Heading outline
    pub headings: Vec<Heading>,

    /// Final records, numbered from 1
    pub records: Vec<ProposalRecord>,

    /// Number of records
    pub total_records: usize,

    /// Record counts per method
    pub extraction_method_summary: MethodSummary,

    /// Images of the document, without payloads
    pub images: Vec<ImageRef>,

    /// Images linked to each record
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub record_images: Vec<RecordImages>,

    /// Fallback decision taken for the document
    pub decision: FallbackDecision,

    /// Final state
    pub outcome: DocumentOutcome,

    /// Why the document is not a full success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Records dropped as duplicates
    pub duplicates_dropped: usize,

    /// Plain text of the document, for metadata analysis
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plain_text: String,
}

impl DocumentReport {
    /// Create an empty report; the pipeline fills it in.
    pub fn new(file_name: impl Into<String>, kind: Option<DocumentKind>) -> Self {
        Self {
            file_name: file_name.into(),
            kind,
            processed_at: Utc::now(),
            metadata: Metadata::default(),
            statistics: DocumentStats::default(),
            headings: Vec::new(),
            records: Vec::new(),
            total_records: 0,
            extraction_method_summary: MethodSummary::default(),
            images: Vec::new(),
            record_images: Vec::new(),
            decision: FallbackDecision::not_triggered(),
            outcome: DocumentOutcome::Failed,
            reason: None,
            duplicates_dropped: 0,
            plain_text: String::new(),
        }
    }

    /// Report for a document that could not be processed.
    pub fn failed(
        file_name: impl Into<String>,
        kind: Option<DocumentKind>,
        reason: impl Into<String>,
    ) -> Self {
        let mut report = Self::new(file_name, kind);
        report.outcome = DocumentOutcome::Failed;
        report.reason = Some(reason.into());
        report
    }

    /// Report for a document that was never started.
    pub fn skipped(file_name: impl Into<String>, kind: Option<DocumentKind>) -> Self {
        let mut report = Self::new(file_name, kind);
        report.outcome = DocumentOutcome::Skipped;
        report.reason = Some("batch cancelled before the document started".to_string());
        report
    }

    /// Replace the records, updating the totals.
    pub fn set_records(&mut self, records: Vec<ProposalRecord>) {
        self.total_records = records.len();
        self.extraction_method_summary = MethodSummary::from_records(&records);
        self.records = records;
    }

    /// Renumber the records 1..=n in their current order, keeping image
    /// links pointed at the same records.
    pub fn renumber_records(&mut self) {
        let mapping: HashMap<u32, u32> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.number, i as u32 + 1))
            .collect();
        self.record_images.retain_mut(|links| match mapping.get(&links.record) {
            Some(&number) => {
                links.record = number;
                true
            }
            None => false,
        });
        let mut records = std::mem::take(&mut self.records);
        renumber(&mut records);
        self.set_records(records);
    }

    /// Whether every record was settled.
    pub fn is_success(&self) -> bool {
        self.outcome == DocumentOutcome::Succeeded
    }

    /// Serialize to JSON.
    pub fn to_json(&self, format: JsonFormat) -> Result<String> {
        to_json(self, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FormattedText, SourceLocation};

    fn record(number: u32, method: ExtractionMethod) -> ProposalRecord {
        ProposalRecord::new(
            number,
            FormattedText::new("<p>Falta acta</p>", "Falta acta"),
            FormattedText::new("<p>Integrar acta</p>", "Integrar acta"),
            method,
            SourceLocation::Fallback {
                region: "document".to_string(),
            },
        )
    }

    #[test]
    fn test_set_records_updates_summary() {
        let mut report = DocumentReport::new("cedula.docx", Some(DocumentKind::Flow));
        report.set_records(vec![
            record(1, ExtractionMethod::Structured),
            record(2, ExtractionMethod::Fallback),
            record(3, ExtractionMethod::Structured),
        ]);
        assert_eq!(report.total_records, 3);
        assert_eq!(report.extraction_method_summary.structured_count, 2);
        assert_eq!(report.extraction_method_summary.fallback_count, 1);
    }

    #[test]
    fn test_skipped_and_failed() {
        let report = DocumentReport::skipped("a.xlsx", None);
        assert_eq!(report.outcome, DocumentOutcome::Skipped);
        assert!(report.reason.is_some());

        let report = DocumentReport::failed("b.docx", None, "Unsupported format: PDF");
        assert_eq!(report.outcome, DocumentOutcome::Failed);
        assert!(!report.is_success());
    }

    #[test]
    fn test_json_shape() {
        let mut report = DocumentReport::new("cedula.docx", Some(DocumentKind::Flow));
        report.outcome = DocumentOutcome::Succeeded;
        report.set_records(vec![record(1, ExtractionMethod::Structured)]);

        let json = report.to_json(JsonFormat::Compact).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["kind"], "flow");
        assert_eq!(value["outcome"], "succeeded");
        assert_eq!(value["total_records"], 1);
        assert_eq!(value["records"][0]["extraction_method"], "structured");
        assert_eq!(value["extraction_method_summary"]["structured_count"], 1);
        assert!(value.get("reason").is_none());
        assert!(value.get("plain_text").is_none());
    }
}
