//! The pure decision of whether the fallback path is needed.

use super::MatchStats;
use serde::{Deserialize, Serialize};

/// Why structured extraction was judged insufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No anchors and no records
    NoMatchFound,
    /// Anchors were seen but no record completed
    MatchCountZero,
    /// Observation anchors and completed records disagree
    StructuralAmbiguity,
    /// Part of the document could not be parsed
    CorruptRegion,
}

impl FallbackReason {
    /// Human-readable description.
    pub fn describe(&self) -> &'static str {
        match self {
            FallbackReason::NoMatchFound => "no anchor phrases found",
            FallbackReason::MatchCountZero => "anchor phrases found but no record completed",
            FallbackReason::StructuralAmbiguity => {
                "observation anchors do not match completed records"
            }
            FallbackReason::CorruptRegion => "part of the document could not be parsed",
        }
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// Outcome of [`FallbackDecision::evaluate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackDecision {
    /// Whether the fallback should run
    pub triggered: bool,
    /// Why, when triggered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FallbackReason>,
}

impl FallbackDecision {
    /// Decide from match counts and the number of damaged regions.
    ///
    /// The first applicable rule wins: no records and no anchors, no
    /// records despite anchors, an opened-but-unclosed or unbalanced
    /// record, a damaged region.
    pub fn evaluate(stats: &MatchStats, damaged_regions: usize) -> Self {
        let anchors = stats.observation_anchors + stats.proposal_anchors;
        let reason = if stats.completed == 0 && anchors == 0 {
            Some(FallbackReason::NoMatchFound)
        } else if stats.completed == 0 {
            Some(FallbackReason::MatchCountZero)
        } else if stats.observation_anchors != stats.completed || stats.unclosed > 0 {
            Some(FallbackReason::StructuralAmbiguity)
        } else if damaged_regions > 0 {
            Some(FallbackReason::CorruptRegion)
        } else {
            None
        };
        Self {
            triggered: reason.is_some(),
            reason,
        }
    }

    /// A decision that does not trigger the fallback.
    pub fn not_triggered() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(observation: usize, proposal: usize, completed: usize, unclosed: usize) -> MatchStats {
        MatchStats {
            observation_anchors: observation,
            proposal_anchors: proposal,
            completed,
            unclosed,
        }
    }

    #[test]
    fn test_no_match_found() {
        let decision = FallbackDecision::evaluate(&stats(0, 0, 0, 0), 0);
        assert!(decision.triggered);
        assert_eq!(decision.reason, Some(FallbackReason::NoMatchFound));
    }

    #[test]
    fn test_match_count_zero() {
        let decision = FallbackDecision::evaluate(&stats(1, 0, 0, 1), 0);
        assert_eq!(decision.reason, Some(FallbackReason::MatchCountZero));
    }

    #[test]
    fn test_unclosed_record_is_ambiguous() {
        let decision = FallbackDecision::evaluate(&stats(3, 2, 2, 1), 0);
        assert_eq!(decision.reason, Some(FallbackReason::StructuralAmbiguity));

        let proposal_only = FallbackDecision::evaluate(&stats(1, 2, 2, 0), 0);
        assert_eq!(proposal_only.reason, Some(FallbackReason::StructuralAmbiguity));
    }

    #[test]
    fn test_damaged_region_triggers() {
        let decision = FallbackDecision::evaluate(&stats(2, 2, 2, 0), 1);
        assert_eq!(decision.reason, Some(FallbackReason::CorruptRegion));
    }

    #[test]
    fn test_balanced_not_triggered() {
        let decision = FallbackDecision::evaluate(&stats(2, 2, 2, 0), 0);
        assert!(!decision.triggered);
        assert_eq!(decision, FallbackDecision::not_triggered());
    }
}
