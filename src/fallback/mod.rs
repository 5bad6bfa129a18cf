//! Fallback extraction through an injected generative-model capability.
//!
//! The orchestrator runs only when the [`FallbackDecision`] is triggered. It
//! serializes the region the matcher could not decide, hands it to a
//! [`ProposalExtractor`], and turns the answer into fallback records. Every
//! capability failure is contained to the document being processed.

mod capability;

pub use capability::{
    build_prompt, parse_model_response, CompletionClient, MockExtractor, ProposalExtractor,
    ProposalPair, TextCompletionExtractor,
};

use crate::error::ExternalServiceError;
use crate::extract::{harvest, FallbackDecision, MatchOutcome};
use crate::model::{
    DocumentTree, ExtractionMethod, FormattedText, ProposalRecord, SourceLocation,
};
use crate::render::render_tree;
use crate::text::{escape_html, truncate_markup};
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

/// Model settings passed to the capability.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Model identifier
    pub model: String,
    /// Upper bound on answer tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl ModelConfig {
    /// Set the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the answer token bound.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            temperature: 0.1,
        }
    }
}

/// Fallback settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackConfig {
    /// Model settings
    pub model: ModelConfig,
    /// Serialized input is truncated to this many characters
    pub max_input_chars: usize,
    /// Bound on the wait for one capability call
    pub call_timeout: Option<Duration>,
    /// Credential for transports that need one
    pub api_key: Option<String>,
}

impl FallbackConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from the environment.
    ///
    /// `OPENAI_API_KEY`, `SOLVEX_FALLBACK_MODEL`, `SOLVEX_FALLBACK_MAX_TOKENS`
    /// and `SOLVEX_FALLBACK_TEMPERATURE` are honoured; unparsable numbers keep
    /// their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        config.api_key = non_empty("OPENAI_API_KEY");
        if let Some(model) = non_empty("SOLVEX_FALLBACK_MODEL") {
            config.model.model = model.trim().to_string();
        }
        if let Some(raw) = non_empty("SOLVEX_FALLBACK_MAX_TOKENS") {
            match raw.trim().parse() {
                Ok(tokens) => config.model.max_tokens = tokens,
                Err(_) => log::warn!("Ignoring SOLVEX_FALLBACK_MAX_TOKENS={raw:?}"),
            }
        }
        if let Some(raw) = non_empty("SOLVEX_FALLBACK_TEMPERATURE") {
            match raw.trim().parse() {
                Ok(temperature) => config.model.temperature = temperature,
                Err(_) => log::warn!("Ignoring SOLVEX_FALLBACK_TEMPERATURE={raw:?}"),
            }
        }
        config
    }

    /// Set the model settings.
    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    /// Set the input character limit.
    pub fn with_max_input_chars(mut self, chars: usize) -> Self {
        self.max_input_chars = chars;
        self
    }

    /// Bound the wait for each call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Set the credential.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Whether a credential is present.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            max_input_chars: 12_000,
            call_timeout: None,
            api_key: None,
        }
    }
}

/// What the fallback produced for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FallbackResolution {
    /// Fallback records, numbered after the structured ones
    pub records: Vec<ProposalRecord>,
    /// Whether the capability was called
    pub attempted: bool,
    /// Capability failure, if any
    pub error: Option<ExternalServiceError>,
    /// Why no call was made or why it produced nothing
    pub reason: Option<String>,
}

impl FallbackResolution {
    fn skipped(reason: Option<&str>) -> Self {
        Self {
            reason: reason.map(str::to_string),
            ..Self::default()
        }
    }

    /// Whether the capability was called and answered.
    pub fn succeeded(&self) -> bool {
        self.attempted && self.error.is_none()
    }
}

/// Reason reported when the fallback is needed but cannot run.
pub const NOT_CONFIGURED: &str = "fallback not configured";

/// Runs the fallback capability for documents the matcher could not settle.
#[derive(Clone, Default)]
pub struct FallbackOrchestrator {
    extractor: Option<Arc<dyn ProposalExtractor>>,
    config: FallbackConfig,
}

impl FallbackOrchestrator {
    /// Create an orchestrator without a capability.
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            extractor: None,
            config,
        }
    }

    /// Attach a capability.
    pub fn with_extractor(mut self, extractor: Arc<dyn ProposalExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Replace the configuration, keeping the capability.
    pub fn with_config(mut self, config: FallbackConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Whether a configured capability is attached.
    pub fn is_configured(&self) -> bool {
        self.extractor.as_ref().is_some_and(|e| e.is_configured())
    }

    /// Resolve the fallback for one document.
    pub fn resolve(
        &self,
        tree: &DocumentTree,
        outcome: &MatchOutcome,
        decision: &FallbackDecision,
    ) -> FallbackResolution {
        if !decision.triggered {
            return FallbackResolution::skipped(None);
        }
        let Some(extractor) = self.extractor.as_ref().filter(|e| e.is_configured()) else {
            log::debug!("Fallback needed but no capability is configured");
            return FallbackResolution::skipped(Some(NOT_CONFIGURED));
        };

        let (region, description) = undecided_region(tree, outcome);
        if region.is_empty() {
            return FallbackResolution::skipped(Some("no content left for the fallback"));
        }
        let markup = truncate_markup(&region.markup, self.config.max_input_chars).to_string();
        log::debug!(
            "Calling fallback on {} ({} chars)",
            description,
            markup.chars().count()
        );

        match self.call(extractor, markup) {
            Ok(pairs) => {
                let records = to_records(pairs, outcome.max_number(), &description);
                let reason = records
                    .is_empty()
                    .then(|| "fallback returned no proposals".to_string());
                FallbackResolution {
                    records,
                    attempted: true,
                    error: None,
                    reason,
                }
            }
            Err(err) => {
                log::warn!("Fallback failed: {}", err);
                FallbackResolution {
                    records: Vec::new(),
                    attempted: true,
                    reason: Some(format!("fallback failed: {}", err)),
                    error: Some(err),
                }
            }
        }
    }

    fn call(
        &self,
        extractor: &Arc<dyn ProposalExtractor>,
        markup: String,
    ) -> Result<Vec<ProposalPair>, ExternalServiceError> {
        let Some(timeout) = self.config.call_timeout else {
            return extractor.extract_proposals(&markup, &self.config.model);
        };

        let (tx, rx) = crossbeam_channel::bounded(1);
        let worker = Arc::clone(extractor);
        let model = self.config.model.clone();
        std::thread::spawn(move || {
            // the receiver may be gone after a timeout
            let _ = tx.send(worker.extract_proposals(&markup, &model));
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ExternalServiceError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ExternalServiceError::Request(
                "capability call ended without an answer".to_string(),
            )),
        }
    }
}

/// Whole document when nothing was extracted, otherwise the unattributed
/// regions; damaged regions contribute their salvaged text in both cases.
fn undecided_region(tree: &DocumentTree, outcome: &MatchOutcome) -> (FormattedText, String) {
    let (mut region, description) = if outcome.records.is_empty() {
        (render_tree(tree), "document".to_string())
    } else {
        (outcome.unattributed_content(), "unattributed regions".to_string())
    };
    for damaged in &tree.damaged {
        let salvaged = damaged.raw_text.trim();
        if !salvaged.is_empty() {
            region.push(FormattedText::new(
                format!("<pre>{}</pre>", escape_html(salvaged)),
                salvaged,
            ));
        }
    }
    (region, description)
}

fn to_records(pairs: Vec<ProposalPair>, last_number: u32, region: &str) -> Vec<ProposalRecord> {
    let mut number = last_number;
    pairs
        .into_iter()
        .filter_map(|pair| {
            let observation = FormattedText::from_model_text(&pair.observation_markup);
            let proposal = FormattedText::from_model_text(&pair.proposal_markup);
            if observation.is_empty() && proposal.is_empty() {
                return None;
            }
            number += 1;
            let details = harvest(&format!("{}\n{}", observation.plain_text, proposal.plain_text));
            let mut record = ProposalRecord::new(
                number,
                observation,
                proposal,
                ExtractionMethod::Fallback,
                SourceLocation::Fallback {
                    region: region.to_string(),
                },
            );
            record.details = details;
            Some(record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FallbackReason, ProposalMatcher};
    use crate::model::{DamagedRegion, DocumentKind, TreeBuilder};
    use std::collections::HashMap;

    fn no_anchor_tree() -> DocumentTree {
        TreeBuilder::new(DocumentKind::Flow)
            .paragraph("Informe de seguimiento sin cédula")
            .build()
    }

    fn run(orchestrator: &FallbackOrchestrator, tree: &DocumentTree) -> FallbackResolution {
        let outcome = ProposalMatcher::default().extract(tree);
        let decision = FallbackDecision::evaluate(&outcome.stats, tree.damaged.len());
        orchestrator.resolve(tree, &outcome, &decision)
    }

    #[test]
    fn test_not_triggered_skips_call() {
        let mock = Arc::new(MockExtractor::returning(vec![ProposalPair::new("a", "b")]));
        let orchestrator = FallbackOrchestrator::default().with_extractor(mock.clone());
        let tree = no_anchor_tree();
        let outcome = ProposalMatcher::default().extract(&tree);

        let resolution = orchestrator.resolve(&tree, &outcome, &FallbackDecision::not_triggered());
        assert!(!resolution.attempted);
        assert!(resolution.reason.is_none());
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn test_unconfigured_short_circuits() {
        let mock = Arc::new(MockExtractor::unconfigured());
        let orchestrator = FallbackOrchestrator::default().with_extractor(mock.clone());

        let resolution = run(&orchestrator, &no_anchor_tree());
        assert!(!resolution.attempted);
        assert_eq!(resolution.reason.as_deref(), Some(NOT_CONFIGURED));
        assert_eq!(mock.calls(), 0);
        assert!(!FallbackOrchestrator::default().is_configured());
    }

    #[test]
    fn test_pairs_become_fallback_records() {
        let mock = Arc::new(MockExtractor::returning(vec![
            ProposalPair::new("Sin observación", "Integrar expediente"),
            ProposalPair::new("", "  "),
            ProposalPair::new("Faltan pólizas", "<p>Presentar <b>pólizas</b></p>"),
        ]));
        let orchestrator = FallbackOrchestrator::default().with_extractor(mock);

        let resolution = run(&orchestrator, &no_anchor_tree());
        assert!(resolution.succeeded());
        assert_eq!(resolution.records.len(), 2);

        let first = &resolution.records[0];
        assert_eq!(first.number, 1);
        assert!(first.observation.is_empty());
        assert_eq!(first.extraction_method, ExtractionMethod::Fallback);
        assert_eq!(
            first.source_location,
            SourceLocation::Fallback {
                region: "document".to_string()
            }
        );

        let second = &resolution.records[1];
        assert_eq!(second.number, 2);
        assert_eq!(second.proposal.plain_text, "Presentar pólizas");
    }

    #[test]
    fn test_failure_is_contained() {
        let mock = Arc::new(MockExtractor::failing(ExternalServiceError::Auth(
            "invalid key".to_string(),
        )));
        let orchestrator = FallbackOrchestrator::default().with_extractor(mock);

        let resolution = run(&orchestrator, &no_anchor_tree());
        assert!(resolution.attempted);
        assert!(resolution.records.is_empty());
        assert!(matches!(resolution.error, Some(ExternalServiceError::Auth(_))));
        assert!(resolution.reason.unwrap().starts_with("fallback failed"));
    }

    #[test]
    fn test_call_timeout() {
        let mock = Arc::new(
            MockExtractor::returning(vec![ProposalPair::new("a", "b")])
                .with_delay(Duration::from_millis(500)),
        );
        let config = FallbackConfig::default().with_call_timeout(Duration::from_millis(20));
        let orchestrator = FallbackOrchestrator::new(config).with_extractor(mock);

        let resolution = run(&orchestrator, &no_anchor_tree());
        assert_eq!(
            resolution.error,
            Some(ExternalServiceError::Timeout(Duration::from_millis(20)))
        );
        assert!(resolution.records.is_empty());
    }

    #[test]
    fn test_numbering_continues_after_structured() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .table(|t| {
                t.row(&["Observación: Falta acta", "Propuesta de solventación: Integrar acta"]);
            })
            .paragraph("Observación: pendiente de revisar")
            .build();
        let outcome = ProposalMatcher::default().extract(&tree);
        let decision = FallbackDecision::evaluate(&outcome.stats, 0);
        assert_eq!(decision.reason, Some(FallbackReason::StructuralAmbiguity));

        let mock = Arc::new(MockExtractor::returning(vec![ProposalPair::new(
            "Pendiente de revisar",
            "Revisar el expediente",
        )]));
        let orchestrator = FallbackOrchestrator::default().with_extractor(mock);
        let resolution = orchestrator.resolve(&tree, &outcome, &decision);

        assert_eq!(resolution.records.len(), 1);
        assert_eq!(resolution.records[0].number, outcome.max_number() + 1);
        assert_eq!(
            resolution.records[0].source_location,
            SourceLocation::Fallback {
                region: "unattributed regions".to_string()
            }
        );
    }

    #[test]
    fn test_damaged_text_is_salvaged() {
        let mut tree = no_anchor_tree();
        tree.damaged.push(DamagedRegion {
            name: "Hoja2".to_string(),
            reason: "malformed XML".to_string(),
            raw_text: "Observación rota & texto".to_string(),
        });
        let outcome = ProposalMatcher::default().extract(&tree);
        let (region, _) = undecided_region(&tree, &outcome);
        assert!(region.markup.contains("<pre>Observación rota &amp; texto</pre>"));
        assert!(region.plain_text.contains("Informe de seguimiento"));
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("SOLVEX_FALLBACK_MODEL", "gpt-4o"),
            ("SOLVEX_FALLBACK_MAX_TOKENS", "lots"),
            ("SOLVEX_FALLBACK_TEMPERATURE", "0.3"),
        ]
        .into_iter()
        .collect();
        let config = FallbackConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert!(config.has_api_key());
        assert_eq!(config.model.model, "gpt-4o");
        assert_eq!(config.model.max_tokens, 2000);
        assert!((config.model.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.max_input_chars, 12_000);

        let empty = FallbackConfig::from_lookup(|_| None);
        assert_eq!(empty, FallbackConfig::default());
    }
}
