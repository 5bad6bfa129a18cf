//! Duplicate detection by content fingerprint, within one document and
//! across the documents of a batch.

use crate::model::{ExtractionMethod, ProposalRecord};
use crate::text::collapse_whitespace;
use sha2::{Digest, Sha256};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Fingerprint of an observation/proposal pair: SHA-256 over both plain
/// texts after whitespace collapse and lower-casing.
pub fn fingerprint(observation: &str, proposal: &str) -> String {
    let normalized = format!(
        "{}||{}",
        collapse_whitespace(observation).to_lowercase(),
        collapse_whitespace(proposal).to_lowercase()
    );
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Fingerprint of a record.
pub fn record_fingerprint(record: &ProposalRecord) -> String {
    fingerprint(&record.observation.plain_text, &record.proposal.plain_text)
}

/// Records kept after deduplication and the number dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupOutcome {
    /// Surviving records, renumbered from 1
    pub records: Vec<ProposalRecord>,
    /// How many records were dropped
    pub dropped: usize,
}

/// Deduplicate the records of one document.
///
/// Per fingerprint the first structured record wins, otherwise the first
/// record. Survivors keep their relative order and are renumbered densely.
pub fn deduplicate(records: Vec<ProposalRecord>) -> DedupOutcome {
    let prints: Vec<String> = records.iter().map(record_fingerprint).collect();

    let mut winner: HashMap<&str, usize> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        match winner.entry(prints[i].as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(i);
            }
            Entry::Occupied(mut slot) => {
                if record.is_structured() && !records[*slot.get()].is_structured() {
                    slot.insert(i);
                }
            }
        }
    }
    let keep: HashSet<usize> = winner.into_values().collect();

    let total = records.len();
    let mut kept: Vec<ProposalRecord> = records
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, r)| r)
        .collect();
    renumber(&mut kept);

    let dropped = total - kept.len();
    if dropped > 0 {
        log::debug!("Dropped {} duplicate records", dropped);
    }
    DedupOutcome {
        records: kept,
        dropped,
    }
}

/// Renumber records 1..=n in their current order.
pub fn renumber(records: &mut [ProposalRecord]) {
    for (i, record) in records.iter_mut().enumerate() {
        record.number = i as u32 + 1;
    }
}

/// Claim on a fingerprint: structured beats fallback, then batch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Claim {
    fallback: bool,
    document: usize,
    position: usize,
}

/// Fingerprints seen across the documents of one batch run.
///
/// Workers claim concurrently; the winner of each fingerprint depends only
/// on batch order, never on which worker finished first. Call
/// [`FingerprintSet::retain_claimed`] once every claim is in.
#[derive(Debug, Default)]
pub struct FingerprintSet {
    claims: Mutex<HashMap<String, Claim>>,
}

impl FingerprintSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every claim.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of distinct fingerprints claimed.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if no fingerprint was claimed.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Register the records of document `document` (its batch index).
    pub fn claim(&self, document: usize, records: &[ProposalRecord]) {
        let mut claims = self.lock();
        for (position, record) in records.iter().enumerate() {
            let claim = Claim {
                fallback: record.extraction_method == ExtractionMethod::Fallback,
                document,
                position,
            };
            claims
                .entry(record_fingerprint(record))
                .and_modify(|held| *held = (*held).min(claim))
                .or_insert(claim);
        }
    }

    /// Keep only the records whose claim document `document` holds.
    /// Numbers are left as they were; returns the number dropped.
    pub fn retain_claimed(&self, document: usize, records: &mut Vec<ProposalRecord>) -> usize {
        let claims = self.lock();
        let before = records.len();
        let mut position = 0;
        records.retain(|record| {
            let keep = claims
                .get(&record_fingerprint(record))
                .map_or(true, |held| held.document == document && held.position == position);
            position += 1;
            keep
        });
        before - records.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Claim>> {
        // a poisoned set still holds valid claims
        self.claims.lock().unwrap_or_else(|e| e.into_inner())
    }
}
