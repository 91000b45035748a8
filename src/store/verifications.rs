//! Verification result store: append-only audit records plus the
//! human-review gate for critical-tier facts.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fact::FactId;
use crate::investigation::InvestigationId;
use crate::verify::VerificationResult;

#[derive(Default)]
struct VerificationStoreInner {
    /// Every attempt for a fact, in order. Kept indefinitely for audit.
    by_fact: HashMap<FactId, Vec<VerificationResult>>,
    by_investigation: HashMap<InvestigationId, Vec<FactId>>,
}

/// In-memory verification store.
#[derive(Default)]
pub struct VerificationStore {
    inner: RwLock<VerificationStoreInner>,
}

#[derive(Serialize, Deserialize)]
struct VerificationSnapshot {
    investigations: Vec<InvestigationVerifications>,
}

#[derive(Serialize, Deserialize)]
struct InvestigationVerifications {
    investigation_id: InvestigationId,
    results: Vec<VerificationResult>,
}

impl VerificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a verification result.
    pub fn record(&self, result: VerificationResult) {
        let mut inner = self.inner.write().expect("verification store lock poisoned");
        let fact_id = result.fact_id;
        let investigation_id = result.investigation_id;

        if !inner.by_fact.contains_key(&fact_id) {
            inner
                .by_investigation
                .entry(investigation_id)
                .or_default()
                .push(fact_id);
        }
        inner.by_fact.entry(fact_id).or_default().push(result);
    }

    /// Most recent result for a fact.
    pub fn latest(&self, fact_id: FactId) -> Option<VerificationResult> {
        let inner = self.inner.read().expect("verification store lock poisoned");
        inner.by_fact.get(&fact_id).and_then(|v| v.last().cloned())
    }

    /// Full audit trail for a fact.
    pub fn history(&self, fact_id: FactId) -> Vec<VerificationResult> {
        let inner = self.inner.read().expect("verification store lock poisoned");
        inner.by_fact.get(&fact_id).cloned().unwrap_or_default()
    }

    /// Facts whose latest result awaits human review.
    pub fn requiring_review(&self, investigation_id: InvestigationId) -> Vec<FactId> {
        let inner = self.inner.read().expect("verification store lock poisoned");
        inner
            .by_investigation
            .get(&investigation_id)
            .map(|ids| {
                ids.iter()
                    .filter(|id| {
                        inner
                            .by_fact
                            .get(id)
                            .and_then(|v| v.last())
                            .map(|r| r.requires_human_review && !r.human_review_completed)
                            .unwrap_or(false)
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Satisfy the human-review gate on a fact's latest result.
    pub fn complete_review(&self, fact_id: FactId) -> Result<VerificationResult> {
        let mut inner = self.inner.write().expect("verification store lock poisoned");
        let results = inner
            .by_fact
            .get_mut(&fact_id)
            .ok_or_else(|| Error::validation(format!("no verification results for {fact_id}")))?;
        let latest = results
            .last_mut()
            .ok_or_else(|| Error::validation(format!("no verification results for {fact_id}")))?;
        latest.human_review_completed = true;
        Ok(latest.clone())
    }

    pub fn count(&self, investigation_id: InvestigationId) -> usize {
        let inner = self.inner.read().expect("verification store lock poisoned");
        inner
            .by_investigation
            .get(&investigation_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Snapshot to a JSON file, deterministically ordered.
    pub fn snapshot_to(&self, path: &Path) -> Result<()> {
        let inner = self.inner.read().expect("verification store lock poisoned");
        let mut ids: Vec<InvestigationId> = inner.by_investigation.keys().copied().collect();
        ids.sort();

        let snapshot = VerificationSnapshot {
            investigations: ids
                .into_iter()
                .map(|inv_id| InvestigationVerifications {
                    investigation_id: inv_id,
                    results: inner.by_investigation[&inv_id]
                        .iter()
                        .flat_map(|id| inner.by_fact.get(id).cloned().unwrap_or_default())
                        .collect(),
                })
                .collect(),
        };
        super::write_snapshot(path, &snapshot)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let snapshot: VerificationSnapshot = super::read_snapshot(path)?;
        let store = Self::new();
        for inv in snapshot.investigations {
            for result in inv.results {
                store.record(result);
            }
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::VerificationStatus;

    fn result(fact_id: FactId, inv: InvestigationId, review: bool) -> VerificationResult {
        let mut r = VerificationResult::new(
            fact_id,
            inv,
            VerificationStatus::Confirmed,
            0.5,
            0.25,
        );
        r.requires_human_review = review;
        r
    }

    #[test]
    fn records_accumulate_per_fact() {
        let store = VerificationStore::new();
        let inv = InvestigationId::new();
        let fact = FactId::new();

        store.record(result(fact, inv, false));
        store.record(result(fact, inv, false));

        assert_eq!(store.history(fact).len(), 2);
        assert_eq!(store.count(inv), 1);
        assert!(store.latest(fact).is_some());
    }

    #[test]
    fn review_gate_lifecycle() {
        let store = VerificationStore::new();
        let inv = InvestigationId::new();
        let fact = FactId::new();
        store.record(result(fact, inv, true));

        assert_eq!(store.requiring_review(inv), vec![fact]);
        let completed = store.complete_review(fact).unwrap();
        assert!(completed.human_review_completed);
        assert!(store.requiring_review(inv).is_empty());
    }

    #[test]
    fn completing_review_on_unknown_fact_fails() {
        let store = VerificationStore::new();
        assert!(store.complete_review(FactId::new()).is_err());
    }
}
