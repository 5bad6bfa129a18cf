//! # solvex
//!
//! Extraction of "solventación" records from audit documents.
//!
//! DOCX and XLSX files are normalized into one document tree. A matcher
//! pairs observation and proposal anchors in tables and paragraphs,
//! keeping inline formatting as markup. When structured matching cannot
//! settle a document, an injected generative-model capability handles the
//! undecided region. Records are deduplicated by content fingerprint,
//! within a document and across a batch.
//!
//! ## Quick Start
//!
//! ```no_run
//! use solvex::{extract_file, JsonFormat};
//!
//! fn main() -> solvex::Result<()> {
//!     let report = extract_file("cedula.docx")?;
//!     for record in &report.records {
//!         println!("{}: {}", record.number, record.proposal.plain_text);
//!     }
//!     println!("{}", report.to_json(JsonFormat::Pretty)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Two source shapes**: flowing paragraphs (DOCX) and sheet grids (XLSX)
//! - **Table layouts**: inline labels, key/value rows, banners, column headers
//! - **Formatting**: bold, italic, colors and fonts kept as inline HTML
//! - **Images**: anchored to blocks or cells, queryable by record
//! - **Fallback**: pluggable model capability behind a pure decision
//! - **Batches**: parallel processing with cross-document deduplication

pub mod batch;
pub mod dedup;
pub mod detect;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod images;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod text;

// Re-export commonly used types
pub use batch::{BatchInput, BatchOptions, BatchProcessor, BatchReport, BatchSummary, CancellationToken};
pub use dedup::{deduplicate, fingerprint, DedupOutcome, FingerprintSet};
pub use detect::{detect_kind, detect_kind_from_path};
pub use error::{Error, ExternalServiceError, Result};
pub use extract::{AnchorSet, FallbackDecision, FallbackReason, MatchOutcome, ProposalMatcher};
pub use fallback::{
    FallbackConfig, FallbackOrchestrator, ModelConfig, ProposalExtractor, ProposalPair,
};
pub use images::{ImageIndex, Placement, Scope};
pub use model::{
    DocumentKind, DocumentTree, ExtractionMethod, FormattedText, ProposalRecord, SourceLocation,
};
pub use normalize::{normalize, NormalizeOptions};
pub use pipeline::Extractor;
pub use render::JsonFormat;
pub use report::{DocumentOutcome, DocumentReport, DocumentStats};

use std::path::Path;

/// Extract records from a DOCX or XLSX file with the default pipeline.
///
/// # Example
///
/// ```no_run
/// let report = solvex::extract_file("observaciones.xlsx").unwrap();
/// println!("{} records", report.total_records);
/// ```
pub fn extract_file<P: AsRef<Path>>(path: P) -> Result<DocumentReport> {
    Extractor::new().extract_file(path)
}

/// Extract records from document bytes with the default pipeline.
///
/// The kind is sniffed from the package when `kind` is `None`.
pub fn extract_bytes(
    file_name: &str,
    bytes: &[u8],
    kind: Option<DocumentKind>,
) -> Result<DocumentReport> {
    Extractor::new().extract_bytes(file_name, bytes, kind)
}
