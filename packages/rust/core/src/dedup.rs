//! Title-based deduplication of freshly parsed grants.
//!
//! Two grants are the same opportunity iff their lower-cased program titles
//! are equal. No fuzzy matching: distinct programs sharing a title collide,
//! and near-identical wordings stay separate.

use std::collections::HashSet;

use grantscout_shared::Grant;

/// Result of filtering a batch against known titles.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Grants not seen before, in input order.
    pub unique: Vec<Grant>,
    /// How many candidates were dropped.
    pub filtered_count: usize,
}

/// Keep only candidates whose dedup key is absent from `existing`.
///
/// `existing` must already hold lower-cased titles. A title repeated within
/// `candidates` keeps its first occurrence; later ones count as filtered.
pub fn filter_new(candidates: Vec<Grant>, existing: &HashSet<String>) -> DedupOutcome {
    let mut seen: HashSet<String> = HashSet::new();
    let mut outcome = DedupOutcome::default();

    for grant in candidates {
        let key = grant.dedup_key();
        if existing.contains(&key) || !seen.insert(key) {
            outcome.filtered_count += 1;
        } else {
            outcome.unique.push(grant);
        }
    }

    outcome
}
