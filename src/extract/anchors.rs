//! Anchor phrases: the labels that open observation and proposal sections.

use crate::error::Result;
use crate::text::fold;
use regex::{Regex, RegexBuilder};

/// Default observation patterns, matched against accent-folded upper-case
/// text.
pub const DEFAULT_OBSERVATION_PATTERNS: &[&str] = &[r"\bOBSERVACION(ES)?\b"];

/// Default proposal patterns ("Propuesta de solventación", "Propuestas de
/// la solventación", ...).
pub const DEFAULT_PROPOSAL_PATTERNS: &[&str] = &[r"\bPROPUESTAS?\b[^\n]{0,40}?\bSOLVENTACION(ES)?\b"];

/// Which section an anchor opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorClass {
    /// Opens the observation section
    Observation,
    /// Opens the proposal section
    Proposal,
}

/// A unit of text recognized as an anchor label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorHit {
    /// Anchor class
    pub class: AnchorClass,
    /// Char index in the source text where the content after the label
    /// (and its separators) starts
    pub remainder_start: usize,
    /// Whether nothing but the label is present
    pub bare: bool,
    /// Whether the phrase opens the unit (no letters before it)
    pub leading: bool,
}

/// The configured anchor phrases.
///
/// Patterns are case-insensitive and run against the accent-folded text of
/// one block or cell, so they should be written without accents.
///
/// # Example
///
/// ```
/// use solvex::extract::{AnchorClass, AnchorSet};
///
/// let anchors = AnchorSet::default();
/// let hit = anchors.classify("Observación: faltan pólizas").unwrap();
/// assert_eq!(hit.class, AnchorClass::Observation);
/// assert!(anchors.classify("Propuesta de Solventación").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct AnchorSet {
    observation: Vec<Regex>,
    proposal: Vec<Regex>,
    max_label_chars: usize,
    max_lead_chars: usize,
}

impl AnchorSet {
    /// Build an anchor set from custom patterns.
    pub fn new<S: AsRef<str>>(observation: &[S], proposal: &[S]) -> Result<Self> {
        Ok(Self {
            observation: compile(observation)?,
            proposal: compile(proposal)?,
            max_label_chars: 40,
            max_lead_chars: 4,
        })
    }

    /// Units up to this many characters count as labels wherever the
    /// phrase sits in them.
    pub fn with_max_label_chars(mut self, chars: usize) -> Self {
        self.max_label_chars = chars;
        self
    }

    /// Letters allowed before the phrase in longer units ("No. 3
    /// Observación").
    pub fn with_max_lead_chars(mut self, chars: usize) -> Self {
        self.max_lead_chars = chars;
        self
    }

    /// Label length limit.
    pub fn max_label_chars(&self) -> usize {
        self.max_label_chars
    }

    /// Classify one unit of text. A unit matching both classes is a
    /// proposal anchor.
    pub fn classify(&self, text: &str) -> Option<AnchorHit> {
        let folded = fold(text);
        if folded.text.trim().is_empty() {
            return None;
        }
        let unit_chars = text.trim().chars().count();

        let hit = |patterns: &[Regex], class| {
            let m = patterns
                .iter()
                .filter_map(|re| re.find(&folded.text))
                .min_by_key(|m| m.start())?;
            let lead_letters = folded.text[..m.start()]
                .chars()
                .filter(|c| c.is_alphabetic())
                .count();
            if lead_letters > self.max_lead_chars && unit_chars > self.max_label_chars {
                return None;
            }
            let remainder_start = skip_separators(text, folded.source_char_index(m.end()));
            let bare = text.chars().skip(remainder_start).all(char::is_whitespace);
            Some(AnchorHit {
                class,
                remainder_start,
                bare,
                leading: lead_letters == 0,
            })
        };

        hit(&self.proposal, AnchorClass::Proposal)
            .or_else(|| hit(&self.observation, AnchorClass::Observation))
    }

    /// Whether a unit is an anchor of either class.
    pub fn is_anchor(&self, text: &str) -> bool {
        self.classify(text).is_some()
    }
}

impl Default for AnchorSet {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVATION_PATTERNS, DEFAULT_PROPOSAL_PATTERNS)
            .expect("default anchor patterns are valid")
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p.as_ref())
                .case_insensitive(true)
                .build()
                .map_err(Into::into)
        })
        .collect()
}

/// Skip label punctuation and whitespace after an anchor phrase.
fn skip_separators(text: &str, from: usize) -> usize {
    from + text
        .chars()
        .skip(from)
        .take_while(|c| c.is_whitespace() || matches!(c, ':' | '.' | '-' | '–' | '—' | ')'))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_accent_and_case_insensitive() {
        let anchors = AnchorSet::default();
        assert_eq!(
            anchors.classify("OBSERVACION").unwrap().class,
            AnchorClass::Observation
        );
        assert_eq!(
            anchors.classify("observaciones").unwrap().class,
            AnchorClass::Observation
        );
        assert_eq!(
            anchors.classify("PROPUESTA DE SOLVENTACIÓN").unwrap().class,
            AnchorClass::Proposal
        );
        assert_eq!(
            anchors
                .classify("Propuesta de la solventación de la observación")
                .unwrap()
                .class,
            AnchorClass::Proposal
        );
        assert!(anchors.classify("Faltan pólizas de seguro").is_none());
        assert!(anchors.classify("   ").is_none());
    }

    #[test]
    fn test_remainder_after_label() {
        let anchors = AnchorSet::default();
        let text = "1. Observación: faltan pólizas";
        let hit = anchors.classify(text).unwrap();
        let rest: String = text.chars().skip(hit.remainder_start).collect();
        assert_eq!(rest, "faltan pólizas");
        assert!(!hit.bare);

        let hit = anchors.classify("Observación:  ").unwrap();
        assert!(hit.bare);
        assert!(hit.leading);
    }

    #[test]
    fn test_short_mentions_are_not_leading() {
        let anchors = AnchorSet::default();
        let hit = anchors.classify("Se solventa la observación").unwrap();
        assert_eq!(hit.class, AnchorClass::Observation);
        assert!(!hit.bare);
        assert!(!hit.leading);
        assert!(!anchors.classify("Sin observación").unwrap().leading);
    }

    #[test]
    fn test_mentions_in_long_text_are_not_labels() {
        let anchors = AnchorSet::default();
        let sentence = "Se integrará al expediente la documentación que atiende la observación señalada por el auditor";
        assert!(anchors.classify(sentence).is_none());

        let labelled = "No. 4 Observación: se integrará al expediente la documentación señalada por el auditor";
        assert_eq!(
            anchors.classify(labelled).unwrap().class,
            AnchorClass::Observation
        );
    }

    #[test]
    fn test_custom_patterns() {
        let anchors = AnchorSet::new(&[r"\bHALLAZGO\b"], &[r"\bACCION CORRECTIVA\b"]).unwrap();
        assert_eq!(
            anchors.classify("Hallazgo 2").unwrap().class,
            AnchorClass::Observation
        );
        assert_eq!(
            anchors.classify("Acción correctiva").unwrap().class,
            AnchorClass::Proposal
        );
        assert!(anchors.classify("Observación").is_none());

        assert!(AnchorSet::new(&["("], &["x"]).is_err());
    }
}
