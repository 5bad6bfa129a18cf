//! The fallback capability seam and a text-completion adapter for it.
//!
//! Two implementations ship with the crate:
//! - `TextCompletionExtractor`: builds the extraction prompt and parses the
//!   model's text answer; the transport is any [`CompletionClient`]
//! - `MockExtractor`: returns a preconfigured answer (testing)

use super::ModelConfig;
use crate::error::ExternalServiceError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One observation/proposal pair returned by the capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalPair {
    /// Observation as markup or bare text
    pub observation_markup: String,
    /// Proposal as markup or bare text
    pub proposal_markup: String,
}

impl ProposalPair {
    /// Create a pair.
    pub fn new(observation: impl Into<String>, proposal: impl Into<String>) -> Self {
        Self {
            observation_markup: observation.into(),
            proposal_markup: proposal.into(),
        }
    }
}

/// Capability that extracts proposal pairs from serialized document markup.
///
/// Abstracts over how the model is reached so the orchestrator does not
/// depend on any transport.
pub trait ProposalExtractor: Send + Sync {
    /// Extract pairs from markup.
    fn extract_proposals(
        &self,
        markup: &str,
        config: &ModelConfig,
    ) -> Result<Vec<ProposalPair>, ExternalServiceError>;

    /// Whether a credential is present. Unconfigured capabilities are never
    /// called.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Transport for a text-completion model.
pub trait CompletionClient: Send + Sync {
    /// Send a system and a user prompt, return the model's text.
    fn complete(
        &self,
        system: &str,
        prompt: &str,
        config: &ModelConfig,
    ) -> Result<String, ExternalServiceError>;

    /// Whether a credential is present.
    fn is_configured(&self) -> bool {
        true
    }
}

const SYSTEM_PROMPT: &str =
    "Eres un experto en análisis de documentos. Respondes solo en JSON válido.";

/// Build the extraction prompt for a document region.
pub fn build_prompt(markup: &str) -> String {
    format!(
        r#"Eres un experto en análisis de documentos de auditoría y solventación.

Analiza el siguiente documento (en formato HTML) y extrae TODAS las propuestas de solventación que encuentres.

Una propuesta típicamente tiene:
1. Una OBSERVACIÓN (opcional)
2. Una PROPUESTA DE SOLVENTACIÓN

DOCUMENTO:
{markup}

Devuelve un JSON con este formato:
{{
    "propuestas": [
        {{
            "numero": 1,
            "observacion": "texto de la observación o 'Sin observación'",
            "propuesta": "texto completo de la propuesta"
        }}
    ]
}}

IMPORTANTE: Solo devuelve el JSON, sin texto adicional."#
    )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelPayload {
    Wrapped {
        #[serde(alias = "proposals")]
        propuestas: Vec<ModelPair>,
    },
    Bare(Vec<ModelPair>),
}

#[derive(Deserialize)]
struct ModelPair {
    #[serde(default, alias = "observation", alias = "observation_markup")]
    observacion: Option<String>,
    #[serde(default, alias = "proposal", alias = "proposal_markup")]
    propuesta: Option<String>,
}

/// Parse a model answer: optional code fences, an optional `json` tag,
/// then `{"propuestas": [...]}` or a bare array. Prose around the JSON
/// object is tolerated.
pub fn parse_model_response(text: &str) -> Result<Vec<ProposalPair>, ExternalServiceError> {
    let body = strip_fences(text.trim());

    let payload = serde_json::from_str::<ModelPayload>(body).or_else(|first_err| {
        let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) else {
            return Err(first_err);
        };
        if end <= start {
            return Err(first_err);
        }
        serde_json::from_str::<ModelPayload>(&body[start..=end])
    });
    let pairs = match payload {
        Ok(ModelPayload::Wrapped { propuestas }) => propuestas,
        Ok(ModelPayload::Bare(pairs)) => pairs,
        Err(e) => return Err(ExternalServiceError::MalformedResponse(e.to_string())),
    };

    Ok(pairs
        .into_iter()
        .map(|p| {
            ProposalPair::new(
                p.observacion.unwrap_or_default(),
                p.propuesta.unwrap_or_default(),
            )
        })
        .collect())
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let inner = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    let inner = inner.trim_start();
    let inner = match inner.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &inner[4..],
        _ => inner,
    };
    inner.trim()
}

/// [`ProposalExtractor`] over a text-completion transport.
pub struct TextCompletionExtractor<C> {
    client: C,
}

impl<C: CompletionClient> TextCompletionExtractor<C> {
    /// Wrap a transport.
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: CompletionClient> ProposalExtractor for TextCompletionExtractor<C> {
    fn extract_proposals(
        &self,
        markup: &str,
        config: &ModelConfig,
    ) -> Result<Vec<ProposalPair>, ExternalServiceError> {
        let prompt = build_prompt(markup);
        let answer = self.client.complete(SYSTEM_PROMPT, &prompt, config)?;
        let pairs = parse_model_response(&answer)?;
        log::debug!("Model answer parsed into {} pairs", pairs.len());
        Ok(pairs)
    }

    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }
}

/// Mock capability for testing: returns a preconfigured answer.
pub struct MockExtractor {
    configured: bool,
    answer: Result<Vec<ProposalPair>, ExternalServiceError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockExtractor {
    /// A configured capability that answers with `pairs`.
    pub fn returning(pairs: Vec<ProposalPair>) -> Self {
        Self {
            configured: true,
            answer: Ok(pairs),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A configured capability that fails with `error`.
    pub fn failing(error: ExternalServiceError) -> Self {
        Self {
            answer: Err(error),
            ..Self::returning(Vec::new())
        }
    }

    /// A capability without a credential.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::returning(Vec::new())
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProposalExtractor for MockExtractor {
    fn extract_proposals(
        &self,
        _markup: &str,
        _config: &ModelConfig,
    ) -> Result<Vec<ProposalPair>, ExternalServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.answer.clone()
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedClient(String);

    impl CompletionClient for CannedClient {
        fn complete(
            &self,
            _system: &str,
            prompt: &str,
            config: &ModelConfig,
        ) -> Result<String, ExternalServiceError> {
            assert!(prompt.contains("<p>documento</p>"));
            assert_eq!(config.model, "gpt-4o-mini");
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_parse_wrapped_payload_in_fences() {
        let answer = "```json\n{\"propuestas\": [{\"numero\": 1, \"observacion\": \"Faltan pólizas\", \"propuesta\": \"Integrar pólizas\"}]}\n```";
        let pairs = parse_model_response(answer).unwrap();
        assert_eq!(pairs, vec![ProposalPair::new("Faltan pólizas", "Integrar pólizas")]);
    }

    #[test]
    fn test_parse_bare_array_and_aliases() {
        let answer = r#"[{"observation": "A", "proposal": "B"}, {"propuesta": "C"}]"#;
        let pairs = parse_model_response(answer).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].observation_markup, "");
        assert_eq!(pairs[1].proposal_markup, "C");
    }

    #[test]
    fn test_parse_with_surrounding_prose() {
        let answer = "Claro, aquí está: {\"propuestas\": []} Saludos.";
        assert!(parse_model_response(answer).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        let result = parse_model_response("no hay propuestas");
        assert!(matches!(result, Err(ExternalServiceError::MalformedResponse(_))));
    }

    #[test]
    fn test_text_completion_extractor() {
        let client = CannedClient(r#"{"propuestas": [{"observacion": "X", "propuesta": "Y"}]}"#.to_string());
        let extractor = TextCompletionExtractor::new(client);
        let pairs = extractor
            .extract_proposals("<p>documento</p>", &ModelConfig::default())
            .unwrap();
        assert_eq!(pairs, vec![ProposalPair::new("X", "Y")]);
        assert!(extractor.is_configured());
    }

    #[test]
    fn test_mock_extractor_counts_calls() {
        let mock = MockExtractor::failing(ExternalServiceError::Auth("bad key".to_string()));
        assert!(mock.extract_proposals("", &ModelConfig::default()).is_err());
        assert_eq!(mock.calls(), 1);
        assert!(!MockExtractor::unconfigured().is_configured());
    }
}
