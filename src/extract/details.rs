//! Facts harvested from record text: dates, responsible parties, numeric
//! references, status keywords, and the leading code of a spreadsheet row.

use crate::model::RecordDetails;
use regex::Regex;
use std::sync::OnceLock;

const RESPONSIBLE_MARKERS: &[&str] = &[
    "responsable:",
    "encargado:",
    "titular:",
    "director:",
    "coordinador:",
    "jefe:",
];

const STATUS_KEYWORDS: &[&str] = &[
    "cumplimiento",
    "incumplimiento",
    "pendiente",
    "realizado",
    "en proceso",
    "evidencia",
    "documentación",
    "plazo",
    "vencimiento",
    "urgente",
    "prioritario",
];

const RESPONSIBLE_FRAGMENT_CHARS: usize = 100;

fn date_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",
            r"\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b",
            r"(?i)\b(?:enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|octubre|noviembre|diciembre)\s+(?:de\s+)?\d{4}\b",
            r"(?i)\b(?:ene|feb|mar|abr|may|jun|jul|ago|sep|oct|nov|dic)[a-z]*\.?\s+\d{4}\b",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:ref|referencia|no|número|num)\.?\s*:?\s*(\d+(?:[/-]\d+)*)\b").unwrap()
    })
}

fn reference_code() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+(\.\d+)*$").unwrap())
}

fn classification_code() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z\d\-_/]+$").unwrap())
}

/// Harvest details from the text of a record.
pub fn harvest(text: &str) -> RecordDetails {
    let mut details = RecordDetails::default();

    for pattern in date_patterns() {
        for m in pattern.find_iter(text) {
            push_unique(&mut details.dates, m.as_str());
        }
    }

    let lower = text.to_lowercase();
    for marker in RESPONSIBLE_MARKERS {
        if let Some(start) = lower.find(marker) {
            // lower-casing can shift byte offsets, so map through chars
            let char_start = lower[..start].chars().count();
            let fragment: String = text
                .chars()
                .skip(char_start)
                .take(RESPONSIBLE_FRAGMENT_CHARS)
                .collect();
            push_unique(&mut details.responsible, fragment.trim());
        }
    }

    for caps in reference_pattern().captures_iter(text) {
        if let Some(number) = caps.get(1) {
            push_unique(&mut details.references, number.as_str());
        }
    }

    for keyword in STATUS_KEYWORDS {
        if lower.contains(keyword) {
            details.keywords.push(keyword.to_string());
        }
    }

    details
}

/// Leading code found in the first cell of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadingCode {
    /// Dotted number such as "1.2"
    Reference(String),
    /// Upper-case code such as "AF-01"
    Classification(String),
}

/// Recognize a reference number or classification code.
pub fn leading_code(text: &str) -> Option<LeadingCode> {
    let value = text.trim();
    if value.is_empty() {
        return None;
    }
    if reference_code().is_match(value) {
        Some(LeadingCode::Reference(value.to_string()))
    } else if classification_code().is_match(value) {
        Some(LeadingCode::Classification(value.to_string()))
    } else {
        None
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harvest_dates_and_references() {
        let details = harvest(
            "Ref. 12/2024 del 15/03/2024; plazo al 2024-06-30 y entrega en marzo de 2025",
        );
        assert_eq!(details.dates, vec!["15/03/2024", "2024-06-30", "marzo de 2025"]);
        assert_eq!(details.references, vec!["12/2024"]);
        assert_eq!(details.keywords, vec!["plazo"]);
    }

    #[test]
    fn test_harvest_responsible_fragment() {
        let details = harvest("Atender. Responsable: Lic. Ana Pérez, Tesorería");
        assert_eq!(details.responsible, vec!["Responsable: Lic. Ana Pérez, Tesorería"]);
    }

    #[test]
    fn test_harvest_nothing() {
        assert!(harvest("Integrar el expediente completo").is_empty());
    }

    #[test]
    fn test_leading_code() {
        assert_eq!(leading_code("1.2"), Some(LeadingCode::Reference("1.2".to_string())));
        assert_eq!(
            leading_code(" AF-01 "),
            Some(LeadingCode::Classification("AF-01".to_string()))
        );
        assert_eq!(leading_code("Observación"), None);
        assert_eq!(leading_code(""), None);
    }
}
