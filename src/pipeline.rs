//! The per-document pipeline: normalize, match, fall back, deduplicate,
//! report.

use crate::dedup::deduplicate;
use crate::detect::detect_kind;
use crate::error::Result;
use crate::extract::{AnchorSet, FallbackDecision, ProposalMatcher};
use crate::fallback::{FallbackConfig, FallbackOrchestrator, FallbackResolution, ProposalExtractor};
use crate::images::{associate, ImageIndex, Placement};
use crate::model::{DocumentKind, DocumentTree, ProposalRecord};
use crate::normalize::{NormalizeOptions, ReaderRegistry};
use crate::report::{DocumentOutcome, DocumentReport, DocumentStats, RecordImages};
use std::path::Path;
use std::sync::Arc;

/// Configured extraction pipeline.
///
/// # Example
///
/// ```no_run
/// use solvex::Extractor;
///
/// fn main() -> solvex::Result<()> {
///     let extractor = Extractor::new().strict();
///     let report = extractor.extract_file("cedula.docx")?;
///     println!("{} records, {}", report.total_records, report.outcome);
///     Ok(())
/// }
/// ```
pub struct Extractor {
    registry: ReaderRegistry,
    normalize_options: NormalizeOptions,
    matcher: ProposalMatcher,
    fallback: FallbackOrchestrator,
    plain_text: bool,
}

impl Extractor {
    /// Create a pipeline with the default anchors and no fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom anchor set.
    pub fn with_anchors(mut self, anchors: AnchorSet) -> Self {
        self.matcher = ProposalMatcher::new(anchors);
        self
    }

    /// Attach a fallback capability.
    pub fn with_fallback(mut self, extractor: Arc<dyn ProposalExtractor>) -> Self {
        self.fallback = self.fallback.with_extractor(extractor);
        self
    }

    /// Set the fallback configuration.
    pub fn with_fallback_config(mut self, config: FallbackConfig) -> Self {
        self.fallback = self.fallback.with_config(config);
        self
    }

    /// Set the normalization options.
    pub fn with_normalize_options(mut self, options: NormalizeOptions) -> Self {
        self.normalize_options = options;
        self
    }

    /// Fail documents on any damaged part.
    pub fn strict(mut self) -> Self {
        self.normalize_options = self.normalize_options.strict();
        self
    }

    /// Include the document plain text in reports.
    pub fn with_plain_text(mut self, include: bool) -> Self {
        self.plain_text = include;
        self
    }

    /// The fallback orchestrator in use.
    pub fn fallback(&self) -> &FallbackOrchestrator {
        &self.fallback
    }

    /// Normalize bytes without extracting.
    pub fn normalize(&self, bytes: &[u8], kind: Option<DocumentKind>) -> Result<DocumentTree> {
        self.registry.normalize(bytes, kind, &self.normalize_options)
    }

    /// Extract records from document bytes of a declared or sniffed kind.
    pub fn extract_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
        kind: Option<DocumentKind>,
    ) -> Result<DocumentReport> {
        let tree = self.normalize(bytes, kind)?;
        Ok(self.extract_tree(file_name, &tree))
    }

    /// Read and extract a file.
    pub fn extract_file(&self, path: impl AsRef<Path>) -> Result<DocumentReport> {
        let path = path.as_ref();
        let tree = self.registry.normalize_file(path, &self.normalize_options)?;
        Ok(self.extract_tree(&file_name_of(path), &tree))
    }

    /// Extract records from an already normalized tree.
    pub fn extract_tree(&self, file_name: &str, tree: &DocumentTree) -> DocumentReport {
        let outcome = self.matcher.extract(tree);
        let decision = FallbackDecision::evaluate(&outcome.stats, tree.damaged.len());
        if let Some(reason) = decision.reason {
            log::debug!("{}: fallback triggered, {}", file_name, reason);
        }
        let resolution = self.fallback.resolve(tree, &outcome, &decision);

        let mut merged = outcome.records;
        merged.extend(resolution.records.iter().cloned());
        let deduped = deduplicate(merged);

        let mut report = DocumentReport::new(file_name, Some(tree.kind));
        report.metadata = tree.metadata.clone();
        report.statistics = DocumentStats::from_tree(tree);
        report.headings = tree.headings();
        report.images = associate(tree);
        report.record_images = link_images(tree, &deduped.records);
        report.decision = decision;
        report.duplicates_dropped = deduped.dropped;
        if self.plain_text {
            report.plain_text = tree.plain_text();
        }

        let (state, reason) = settle(&deduped.records, &decision, &resolution);
        report.outcome = state;
        report.reason = reason;
        report.set_records(deduped.records);

        log::info!(
            "{}: {} records ({} structured, {} fallback), {}",
            file_name,
            report.total_records,
            report.extraction_method_summary.structured_count,
            report.extraction_method_summary.fallback_count,
            report.outcome
        );
        report
    }

    /// Extract without failing: read errors become a failed report.
    pub fn process(&self, file_name: &str, bytes: &[u8], kind: Option<DocumentKind>) -> DocumentReport {
        match self.extract_bytes(file_name, bytes, kind) {
            Ok(report) => report,
            Err(err) => {
                log::warn!("{}: {}", file_name, err);
                let kind = kind.or_else(|| detect_kind(bytes).ok());
                DocumentReport::failed(file_name, kind, err.to_string())
            }
        }
    }

    /// Read and extract a file without failing.
    pub fn process_file(&self, path: impl AsRef<Path>) -> DocumentReport {
        let path = path.as_ref();
        match self.extract_file(path) {
            Ok(report) => report,
            Err(err) => {
                log::warn!("{}: {}", path.display(), err);
                let kind = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(DocumentKind::from_extension);
                DocumentReport::failed(file_name_of(path), kind, err.to_string())
            }
        }
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            registry: ReaderRegistry::with_defaults(),
            normalize_options: NormalizeOptions::default(),
            matcher: ProposalMatcher::default(),
            fallback: FallbackOrchestrator::default(),
            plain_text: true,
        }
    }
}

/// Decide the final state of a document.
fn settle(
    records: &[ProposalRecord],
    decision: &FallbackDecision,
    resolution: &FallbackResolution,
) -> (DocumentOutcome, Option<String>) {
    if records.is_empty() {
        let why = resolution
            .reason
            .clone()
            .or_else(|| decision.reason.map(|r| r.describe().to_string()))
            .unwrap_or_else(|| "no anchor phrases found".to_string());
        return (DocumentOutcome::Failed, Some(format!("no proposals found, {}", why)));
    }
    let fallback_only = records.iter().all(|r| !r.is_structured());
    if fallback_only {
        let parts: Vec<String> = decision
            .reason
            .map(|r| r.describe().to_string())
            .into_iter()
            .chain(Some("records from fallback only".to_string()))
            .collect();
        return (DocumentOutcome::Partial, Some(parts.join("; ")));
    }
    if !decision.triggered || resolution.succeeded() {
        return (DocumentOutcome::Succeeded, None);
    }
    let parts: Vec<String> = decision
        .reason
        .map(|r| r.describe().to_string())
        .into_iter()
        .chain(resolution.reason.clone())
        .collect();
    (DocumentOutcome::Partial, Some(parts.join("; ")))
}

fn link_images(tree: &DocumentTree, records: &[ProposalRecord]) -> Vec<RecordImages> {
    if tree.images.is_empty() {
        return Vec::new();
    }
    let index = ImageIndex::build(tree);
    records
        .iter()
        .filter_map(|record| {
            let mut links = RecordImages {
                record: record.number,
                ..RecordImages::default()
            };
            for hit in index.images_for_location(&record.source_location) {
                match hit.placement {
                    Placement::Inside => links.inside.push(hit.image.id.clone()),
                    Placement::Ambiguous => links.ambiguous.push(hit.image.id.clone()),
                }
            }
            (!links.inside.is_empty() || !links.ambiguous.is_empty()).then_some(links)
        })
        .collect()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
