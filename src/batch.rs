//! Parallel processing of many documents with optional cross-document
//! deduplication.
//!
//! Documents run on a rayon pool bounded by [`BatchOptions::concurrency`].
//! The only state shared between workers is the batch's
//! [`FingerprintSet`], cleared at the start of every run.

use crate::dedup::FingerprintSet;
use crate::error::{Error, Result};
use crate::model::DocumentKind;
use crate::pipeline::Extractor;
use crate::report::{DocumentOutcome, DocumentReport};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Options for a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Worker threads; 0 uses one per CPU
    pub concurrency: usize,

    /// Drop records repeated across documents
    pub cross_document_dedup: bool,
}

impl BatchOptions {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    /// Enable or disable cross-document deduplication.
    pub fn with_cross_document_dedup(mut self, enabled: bool) -> Self {
        self.cross_document_dedup = enabled;
        self
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 0,
            cross_document_dedup: true,
        }
    }
}

/// One document of a batch.
#[derive(Debug, Clone)]
pub struct BatchInput {
    /// File name used in the report
    pub name: String,
    /// Raw bytes
    pub bytes: Vec<u8>,
    /// Declared kind; sniffed when `None`
    pub kind: Option<DocumentKind>,
}

impl BatchInput {
    /// Create an input of unknown kind.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            kind: None,
        }
    }

    /// Declare the kind.
    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Read a file; the kind comes from its extension when recognized.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let kind = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(DocumentKind::from_extension);
        Ok(Self { name, bytes, kind })
    }
}

/// Stops a batch from starting new documents. In-flight documents finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counts over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Documents in the batch
    pub total: usize,
    /// Documents fully settled
    pub succeeded: usize,
    /// Documents with undecided parts
    pub partial: usize,
    /// Documents that failed or yielded nothing
    pub failed: usize,
    /// Documents never started
    pub skipped: usize,
    /// Records across all documents
    pub total_records: usize,
    /// Duplicates dropped, within and across documents
    pub duplicates_dropped: usize,
    /// Of those, duplicates of records in other documents
    pub cross_document_duplicates: usize,
}

impl BatchSummary {
    /// Count the outcomes of a set of reports.
    pub fn from_reports(reports: &[DocumentReport], cross_document_duplicates: usize) -> Self {
        let mut summary = Self {
            total: reports.len(),
            cross_document_duplicates,
            ..Self::default()
        };
        for report in reports {
            match report.outcome {
                DocumentOutcome::Succeeded => summary.succeeded += 1,
                DocumentOutcome::Partial => summary.partial += 1,
                DocumentOutcome::Failed => summary.failed += 1,
                DocumentOutcome::Skipped => summary.skipped += 1,
            }
            summary.total_records += report.total_records;
            summary.duplicates_dropped += report.duplicates_dropped;
        }
        summary
    }
}

/// Result of a batch run: one report per input, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Per-document reports
    pub documents: Vec<DocumentReport>,
    /// Aggregated counts
    pub summary: BatchSummary,
}

/// Runs an [`Extractor`] over many documents.
pub struct BatchProcessor {
    extractor: Extractor,
    options: BatchOptions,
    fingerprints: FingerprintSet,
    cancel: CancellationToken,
}

impl BatchProcessor {
    /// Create a processor.
    pub fn new(extractor: Extractor, options: BatchOptions) -> Self {
        Self {
            extractor,
            options,
            fingerprints: FingerprintSet::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels runs of this processor.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process every input. Per-document failures are reported, never
    /// returned; only a failure to start the worker pool is an error.
    pub fn run(&self, inputs: &[BatchInput]) -> Result<BatchReport> {
        self.fingerprints.clear();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.concurrency)
            .build()
            .map_err(|e| Error::Other(format!("cannot start worker pool: {}", e)))?;

        let cross = self.options.cross_document_dedup;
        let mut documents: Vec<DocumentReport> = pool.install(|| {
            inputs
                .par_iter()
                .enumerate()
                .map(|(i, input)| {
                    if self.cancel.is_cancelled() {
                        return DocumentReport::skipped(&input.name, input.kind);
                    }
                    let report = self.extractor.process(&input.name, &input.bytes, input.kind);
                    if cross {
                        self.fingerprints.claim(i, &report.records);
                    }
                    report
                })
                .collect()
        });

        let mut cross_dropped = 0;
        if cross {
            for (i, report) in documents.iter_mut().enumerate() {
                let dropped = self.fingerprints.retain_claimed(i, &mut report.records);
                if dropped == 0 {
                    continue;
                }
                log::debug!("{}: {} records repeat other documents", report.file_name, dropped);
                cross_dropped += dropped;
                report.duplicates_dropped += dropped;
                report.renumber_records();
                if report.records.is_empty() {
                    report.outcome = DocumentOutcome::Failed;
                    report.reason =
                        Some("no proposals left, all repeat other documents".to_string());
                }
            }
        }

        let summary = BatchSummary::from_reports(&documents, cross_dropped);
        log::info!(
            "Batch of {}: {} succeeded, {} partial, {} failed, {} skipped",
            summary.total,
            summary.succeeded,
            summary.partial,
            summary.failed,
            summary.skipped
        );
        Ok(BatchReport { documents, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = BatchOptions::new()
            .with_concurrency(4)
            .with_cross_document_dedup(false);
        assert_eq!(options.concurrency, 4);
        assert!(!options.cross_document_dedup);
        assert!(BatchOptions::default().cross_document_dedup);
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancelled_batch_skips_everything() {
        let processor = BatchProcessor::new(Extractor::new(), BatchOptions::new().with_concurrency(2));
        processor.cancellation_token().cancel();

        let inputs = vec![
            BatchInput::new("a.docx", b"PK".to_vec()),
            BatchInput::new("b.xlsx", Vec::new()).with_kind(DocumentKind::Grid),
        ];
        let report = processor.run(&inputs).unwrap();
        assert_eq!(report.summary.skipped, 2);
        assert_eq!(report.documents[1].kind, Some(DocumentKind::Grid));
    }

    #[test]
    fn test_unreadable_documents_fail_alone() {
        let processor = BatchProcessor::new(Extractor::new(), BatchOptions::default());
        let inputs = vec![
            BatchInput::new("a.pdf", b"%PDF-1.7".to_vec()),
            BatchInput::new("b.docx", b"PK\x03\x04broken".to_vec()),
        ];
        let report = processor.run(&inputs).unwrap();
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.documents[0].file_name, "a.pdf");
    }

    #[test]
    fn test_summary_counts() {
        let mut ok = DocumentReport::new("ok.docx", Some(DocumentKind::Flow));
        ok.outcome = DocumentOutcome::Succeeded;
        ok.duplicates_dropped = 2;
        let failed = DocumentReport::failed("bad.docx", None, "broken");

        let summary = BatchSummary::from_reports(&[ok, failed], 1);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.duplicates_dropped, 2);
        assert_eq!(summary.cross_document_duplicates, 1);
    }
}
