//! Structured extraction: anchor phrases, the table/block matcher, record
//! details and the fallback decision.
//!
//! # Example
//!
//! ```
//! use solvex::extract::{FallbackDecision, ProposalMatcher};
//! use solvex::model::{DocumentKind, TreeBuilder};
//!
//! let tree = TreeBuilder::new(DocumentKind::Flow)
//!     .paragraph("Informe sin cédula")
//!     .build();
//!
//! let outcome = ProposalMatcher::default().extract(&tree);
//! let decision = FallbackDecision::evaluate(&outcome.stats, tree.damaged.len());
//! assert!(decision.triggered);
//! ```

mod anchors;
mod decision;
mod details;
mod matcher;

pub use anchors::{
    AnchorClass, AnchorHit, AnchorSet, DEFAULT_OBSERVATION_PATTERNS, DEFAULT_PROPOSAL_PATTERNS,
};
pub use decision::{FallbackDecision, FallbackReason};
pub use details::{harvest, leading_code, LeadingCode};
pub use matcher::{MatchOutcome, MatchStats, ProposalMatcher, UnattributedRegion};

use crate::model::DocumentTree;

/// Run the default matcher and decide on the fallback.
pub fn extract(tree: &DocumentTree) -> (MatchOutcome, FallbackDecision) {
    let outcome = ProposalMatcher::default().extract(tree);
    let decision = FallbackDecision::evaluate(&outcome.stats, tree.damaged.len());
    (outcome, decision)
}
