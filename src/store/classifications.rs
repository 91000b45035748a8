//! Classification store: flag/tier indexes and the verification priority
//! queue.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::classify::{DubiousFlag, FactClassification, ImpactTier, VerificationStatus};
use crate::error::{Error, Result};
use crate::fact::FactId;
use crate::investigation::InvestigationId;

#[derive(Default)]
struct ClassificationStoreInner {
    by_fact: HashMap<FactId, FactClassification>,
    /// Fact ids per investigation, in insertion order.
    by_investigation: HashMap<InvestigationId, Vec<FactId>>,
    flag_index: HashMap<(InvestigationId, DubiousFlag), BTreeSet<FactId>>,
    tier_index: HashMap<(InvestigationId, ImpactTier), BTreeSet<FactId>>,
}

/// Aggregated counts consumed by the orchestrator's evaluation node.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub total: usize,
    pub critical: usize,
    pub dubious: usize,
    pub noise_only: usize,
    pub confirmed: usize,
    pub refuted: usize,
    pub superseded: usize,
    pub unverifiable: usize,
    pub pending: usize,
}

/// In-memory classification store.
#[derive(Default)]
pub struct ClassificationStore {
    inner: RwLock<ClassificationStoreInner>,
}

#[derive(Serialize, Deserialize)]
struct ClassificationSnapshot {
    investigations: Vec<InvestigationClassifications>,
}

#[derive(Serialize, Deserialize)]
struct InvestigationClassifications {
    investigation_id: InvestigationId,
    classifications: Vec<FactClassification>,
}

impl ClassificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(inner: &mut ClassificationStoreInner, classification: &FactClassification) {
        let inv = classification.investigation_id;
        for flag in &classification.dubious_flags {
            inner
                .flag_index
                .entry((inv, *flag))
                .or_default()
                .insert(classification.fact_id);
        }
        inner
            .tier_index
            .entry((inv, classification.impact_tier))
            .or_default()
            .insert(classification.fact_id);
    }

    fn unindex(inner: &mut ClassificationStoreInner, classification: &FactClassification) {
        let inv = classification.investigation_id;
        for flag in [
            DubiousFlag::Phantom,
            DubiousFlag::Fog,
            DubiousFlag::Anomaly,
            DubiousFlag::Noise,
        ] {
            if let Some(set) = inner.flag_index.get_mut(&(inv, flag)) {
                set.remove(&classification.fact_id);
            }
        }
        for tier in [ImpactTier::Critical, ImpactTier::LessCritical] {
            if let Some(set) = inner.tier_index.get_mut(&(inv, tier)) {
                set.remove(&classification.fact_id);
            }
        }
    }

    /// Insert or replace a classification. One classification per fact per
    /// investigation.
    pub fn upsert(&self, classification: FactClassification) {
        let mut inner = self.inner.write().expect("classification store lock poisoned");
        if let Some(previous) = inner.by_fact.get(&classification.fact_id).cloned() {
            Self::unindex(&mut inner, &previous);
        } else {
            inner
                .by_investigation
                .entry(classification.investigation_id)
                .or_default()
                .push(classification.fact_id);
        }
        Self::index(&mut inner, &classification);
        inner.by_fact.insert(classification.fact_id, classification);
    }

    pub fn get(&self, fact_id: FactId) -> Option<FactClassification> {
        let inner = self.inner.read().expect("classification store lock poisoned");
        inner.by_fact.get(&fact_id).cloned()
    }

    /// Mutate a classification under the store lock. A history entry with
    /// the pre-mutation state and the given trigger is appended first, and
    /// indexes are kept consistent.
    pub fn apply<F>(&self, fact_id: FactId, trigger: &str, f: F) -> Result<FactClassification>
    where
        F: FnOnce(&mut FactClassification),
    {
        let mut inner = self.inner.write().expect("classification store lock poisoned");
        let mut classification = inner
            .by_fact
            .get(&fact_id)
            .cloned()
            .ok_or_else(|| Error::validation(format!("no classification for fact {fact_id}")))?;

        Self::unindex(&mut inner, &classification);
        classification.record_transition(trigger);
        f(&mut classification);
        Self::index(&mut inner, &classification);
        inner.by_fact.insert(fact_id, classification.clone());
        Ok(classification)
    }

    /// Verification queue: verifiable facts ordered by descending priority.
    /// NOISE-only facts never appear.
    pub fn get_priority_queue(&self, investigation_id: InvestigationId) -> Vec<FactClassification> {
        let inner = self.inner.read().expect("classification store lock poisoned");
        let mut queue: Vec<FactClassification> = inner
            .by_investigation
            .get(&investigation_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.by_fact.get(id))
                    .filter(|c| c.is_verifiable())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        queue.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.fact_id.cmp(&b.fact_id))
        });
        queue
    }

    pub fn get_by_flag(
        &self,
        investigation_id: InvestigationId,
        flag: DubiousFlag,
    ) -> Vec<FactClassification> {
        let inner = self.inner.read().expect("classification store lock poisoned");
        inner
            .flag_index
            .get(&(investigation_id, flag))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.by_fact.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Critical-tier facts carrying any dubious flag.
    pub fn get_critical_dubious(&self, investigation_id: InvestigationId) -> Vec<FactClassification> {
        let inner = self.inner.read().expect("classification store lock poisoned");
        inner
            .tier_index
            .get(&(investigation_id, ImpactTier::Critical))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.by_fact.get(id))
                    .filter(|c| !c.dubious_flags.is_empty())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Facts whose verification reached a terminal state but are gated on
    /// the human-review bit.
    pub fn get_pending_review(&self, investigation_id: InvestigationId) -> Vec<FactClassification> {
        let inner = self.inner.read().expect("classification store lock poisoned");
        inner
            .by_investigation
            .get(&investigation_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.by_fact.get(id))
                    .filter(|c| {
                        c.requires_human_review
                            && !c.human_review_completed
                            && c.verification_status.is_terminal()
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn counts(&self, investigation_id: InvestigationId) -> ClassificationCounts {
        let inner = self.inner.read().expect("classification store lock poisoned");
        let mut counts = ClassificationCounts::default();
        if let Some(ids) = inner.by_investigation.get(&investigation_id) {
            for c in ids.iter().filter_map(|id| inner.by_fact.get(id)) {
                counts.total += 1;
                if c.impact_tier == ImpactTier::Critical {
                    counts.critical += 1;
                }
                if !c.dubious_flags.is_empty() {
                    counts.dubious += 1;
                }
                if c.is_noise_only() {
                    counts.noise_only += 1;
                }
                match c.verification_status {
                    VerificationStatus::Confirmed => counts.confirmed += 1,
                    VerificationStatus::Refuted => counts.refuted += 1,
                    VerificationStatus::Superseded => counts.superseded += 1,
                    VerificationStatus::Unverifiable => counts.unverifiable += 1,
                    VerificationStatus::Pending | VerificationStatus::InProgress => {
                        counts.pending += 1
                    }
                }
            }
        }
        counts
    }

    /// Snapshot to a JSON file, deterministically ordered.
    pub fn snapshot_to(&self, path: &Path) -> Result<()> {
        let inner = self.inner.read().expect("classification store lock poisoned");
        let mut ids: Vec<InvestigationId> = inner.by_investigation.keys().copied().collect();
        ids.sort();

        let snapshot = ClassificationSnapshot {
            investigations: ids
                .into_iter()
                .map(|inv_id| InvestigationClassifications {
                    investigation_id: inv_id,
                    classifications: inner.by_investigation[&inv_id]
                        .iter()
                        .filter_map(|id| inner.by_fact.get(id).cloned())
                        .collect(),
                })
                .collect(),
        };
        super::write_snapshot(path, &snapshot)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let snapshot: ClassificationSnapshot = super::read_snapshot(path)?;
        let store = Self::new();
        for inv in snapshot.investigations {
            for classification in inv.classifications {
                store.upsert(classification);
            }
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::CredibilityBreakdown;
    use chrono::Utc;

    fn classification(
        inv: InvestigationId,
        flags: &[DubiousFlag],
        tier: ImpactTier,
        priority: f64,
    ) -> FactClassification {
        FactClassification {
            fact_id: FactId::new(),
            investigation_id: inv,
            impact_tier: tier,
            impact_score: 0.5,
            dubious_flags: flags.iter().copied().collect(),
            origin_dubious_flags: BTreeSet::new(),
            priority_score: priority,
            credibility_score: 0.5,
            credibility_breakdown: CredibilityBreakdown {
                per_source: Vec::new(),
                root_score: 0.5,
                echo_sum: 0.0,
                echo_bonus: 0.0,
                total: 0.5,
                unique_roots: 1,
                circular_warning: false,
            },
            classification_reasoning: Vec::new(),
            contradictions: Vec::new(),
            history: Vec::new(),
            verification_status: VerificationStatus::Pending,
            requires_human_review: false,
            human_review_completed: false,
            classified_at: Utc::now(),
        }
    }

    #[test]
    fn priority_queue_excludes_noise_only_and_sorts() {
        let store = ClassificationStore::new();
        let inv = InvestigationId::new();

        let fog = classification(inv, &[DubiousFlag::Fog], ImpactTier::Critical, 0.9);
        let phantom = classification(inv, &[DubiousFlag::Phantom], ImpactTier::LessCritical, 0.3);
        let noise = classification(inv, &[DubiousFlag::Noise], ImpactTier::Critical, 0.1);
        let clean = classification(inv, &[], ImpactTier::LessCritical, 0.0);

        for c in [fog.clone(), phantom.clone(), noise, clean] {
            store.upsert(c);
        }

        let queue = store.get_priority_queue(inv);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].fact_id, fog.fact_id);
        assert_eq!(queue[1].fact_id, phantom.fact_id);
        assert!(queue.iter().all(|c| !c.is_noise_only()));
    }

    #[test]
    fn apply_updates_indexes_and_history() {
        let store = ClassificationStore::new();
        let inv = InvestigationId::new();
        let c = classification(inv, &[DubiousFlag::Phantom], ImpactTier::Critical, 0.6);
        let id = c.fact_id;
        store.upsert(c);

        store
            .apply(id, "verification_confirmed", |c| {
                c.origin_dubious_flags = c.dubious_flags.clone();
                c.dubious_flags.clear();
                c.verification_status = VerificationStatus::Confirmed;
            })
            .unwrap();

        let updated = store.get(id).unwrap();
        assert!(updated.dubious_flags.is_empty());
        assert_eq!(updated.origin_dubious_flags.len(), 1);
        assert_eq!(updated.history.len(), 1);
        // Flag index no longer lists the fact.
        assert!(store.get_by_flag(inv, DubiousFlag::Phantom).is_empty());
    }

    #[test]
    fn critical_dubious_and_pending_review_views() {
        let store = ClassificationStore::new();
        let inv = InvestigationId::new();

        let mut gated = classification(inv, &[], ImpactTier::Critical, 0.0);
        gated.requires_human_review = true;
        gated.verification_status = VerificationStatus::Confirmed;
        let gated_id = gated.fact_id;

        let critical_dubious = classification(inv, &[DubiousFlag::Anomaly], ImpactTier::Critical, 0.8);
        store.upsert(gated);
        store.upsert(critical_dubious.clone());

        assert_eq!(store.get_critical_dubious(inv).len(), 1);
        let pending = store.get_pending_review(inv);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fact_id, gated_id);

        store
            .apply(gated_id, "human_review_completed", |c| {
                c.human_review_completed = true;
            })
            .unwrap();
        assert!(store.get_pending_review(inv).is_empty());
    }

    #[test]
    fn counts_aggregate() {
        let store = ClassificationStore::new();
        let inv = InvestigationId::new();
        store.upsert(classification(inv, &[DubiousFlag::Noise], ImpactTier::LessCritical, 0.05));
        store.upsert(classification(inv, &[DubiousFlag::Fog], ImpactTier::Critical, 0.9));

        let counts = store.counts(inv);
        assert_eq!(counts.total, 2);
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.dubious, 2);
        assert_eq!(counts.noise_only, 1);
        assert_eq!(counts.pending, 2);
    }
}
