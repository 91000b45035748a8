//! Fact store: O(1) indexed storage with bidirectional variant linking.
//!
//! Three indices are maintained: fact id -> fact, content hash -> fact ids
//! (the dup probe used by consolidation), and source id -> fact ids (the
//! provenance query). Variant links are written both directions atomically
//! under the store lock; an asymmetric link found later is a fatal
//! invariant violation, not something to repair silently.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fact::{check_schema_version, ExtractedFact, FactId};
use crate::investigation::InvestigationId;

/// A canonical fact together with its linked variants.
#[derive(Debug, Clone)]
pub struct FactWithVariants {
    pub fact: ExtractedFact,
    pub variants: Vec<ExtractedFact>,
}

#[derive(Default)]
struct FactStoreInner {
    facts: HashMap<FactId, (InvestigationId, ExtractedFact)>,
    /// Fact ids per investigation, in insertion order.
    by_investigation: HashMap<InvestigationId, Vec<FactId>>,
    hash_index: HashMap<(InvestigationId, String), Vec<FactId>>,
    source_index: HashMap<String, Vec<FactId>>,
}

/// In-memory fact store.
#[derive(Default)]
pub struct FactStore {
    inner: RwLock<FactStoreInner>,
}

#[derive(Serialize, Deserialize)]
struct FactSnapshot {
    investigations: Vec<InvestigationFacts>,
}

#[derive(Serialize, Deserialize)]
struct InvestigationFacts {
    investigation_id: InvestigationId,
    facts: Vec<ExtractedFact>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fact. Validates invariants first; re-inserting an existing
    /// fact id is a no-op so consolidation stays idempotent.
    pub fn insert(&self, investigation_id: InvestigationId, fact: ExtractedFact) -> Result<()> {
        fact.validate()?;
        let mut inner = self.inner.write().expect("fact store lock poisoned");
        if inner.facts.contains_key(&fact.fact_id) {
            return Ok(());
        }

        let id = fact.fact_id;
        inner
            .by_investigation
            .entry(investigation_id)
            .or_default()
            .push(id);
        inner
            .hash_index
            .entry((investigation_id, fact.content_hash.clone()))
            .or_default()
            .push(id);
        inner
            .source_index
            .entry(fact.provenance.source_id.clone())
            .or_default()
            .push(id);
        inner.facts.insert(id, (investigation_id, fact));
        Ok(())
    }

    /// O(1) dup probe: the canonical fact holding this content hash, if
    /// one exists.
    pub fn canonical_for_hash(
        &self,
        investigation_id: InvestigationId,
        content_hash: &str,
    ) -> Option<FactId> {
        let inner = self.inner.read().expect("fact store lock poisoned");
        inner
            .hash_index
            .get(&(investigation_id, content_hash.to_string()))
            .and_then(|ids| ids.first())
            .copied()
    }

    /// Link a variant to its canonical fact: both `variants[]` directions
    /// plus the canonical's `additional_sources` are written under one
    /// lock acquisition.
    pub fn link_variant(&self, canonical_id: FactId, variant_id: FactId) -> Result<()> {
        if canonical_id == variant_id {
            return Err(Error::validation("cannot link a fact as its own variant"));
        }
        let mut inner = self.inner.write().expect("fact store lock poisoned");

        let variant_attribution = {
            let (_, variant) = inner
                .facts
                .get(&variant_id)
                .ok_or_else(|| Error::validation(format!("unknown variant fact {variant_id}")))?;
            variant.provenance.primary_attribution()
        };

        {
            let (_, canonical) = inner
                .facts
                .get_mut(&canonical_id)
                .ok_or_else(|| Error::validation(format!("unknown canonical fact {canonical_id}")))?;
            if !canonical.variants.contains(&variant_id) {
                canonical.variants.push(variant_id);
                canonical.provenance.additional_sources.push(variant_attribution);
            }
        }
        {
            let (_, variant) = inner
                .facts
                .get_mut(&variant_id)
                .expect("variant existence checked above");
            if !variant.variants.contains(&canonical_id) {
                variant.variants.push(canonical_id);
            }
        }
        Ok(())
    }

    pub fn get(&self, fact_id: FactId) -> Option<ExtractedFact> {
        let inner = self.inner.read().expect("fact store lock poisoned");
        inner.facts.get(&fact_id).map(|(_, f)| f.clone())
    }

    pub fn investigation_of(&self, fact_id: FactId) -> Option<InvestigationId> {
        let inner = self.inner.read().expect("fact store lock poisoned");
        inner.facts.get(&fact_id).map(|(inv, _)| *inv)
    }

    /// Fetch a fact plus its linked variants.
    pub fn get_with_variants(&self, fact_id: FactId) -> Option<FactWithVariants> {
        let inner = self.inner.read().expect("fact store lock poisoned");
        let (_, fact) = inner.facts.get(&fact_id)?;
        let variants = fact
            .variants
            .iter()
            .filter_map(|id| inner.facts.get(id).map(|(_, f)| f.clone()))
            .collect();
        Some(FactWithVariants {
            fact: fact.clone(),
            variants,
        })
    }

    /// All facts for an investigation, in insertion order.
    pub fn facts_for(&self, investigation_id: InvestigationId) -> Vec<ExtractedFact> {
        let inner = self.inner.read().expect("fact store lock poisoned");
        inner
            .by_investigation
            .get(&investigation_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.facts.get(id).map(|(_, f)| f.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// O(1) provenance query.
    pub fn by_source(&self, source_id: &str) -> Vec<FactId> {
        let inner = self.inner.read().expect("fact store lock poisoned");
        inner.source_index.get(source_id).cloned().unwrap_or_default()
    }

    pub fn count(&self, investigation_id: InvestigationId) -> usize {
        let inner = self.inner.read().expect("fact store lock poisoned");
        inner
            .by_investigation
            .get(&investigation_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Check the variant-link symmetry invariant. An asymmetric link is a
    /// fatal error: the investigation aborts rather than repairing.
    pub fn verify_integrity(&self) -> Result<()> {
        let inner = self.inner.read().expect("fact store lock poisoned");
        for (id, (_, fact)) in &inner.facts {
            for variant_id in &fact.variants {
                let (_, variant) = inner.facts.get(variant_id).ok_or_else(|| {
                    Error::fatal(format!("fact {id} links missing variant {variant_id}"))
                })?;
                if !variant.variants.contains(id) {
                    return Err(Error::fatal(format!(
                        "asymmetric variant link between {id} and {variant_id}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Snapshot to a JSON file, deterministically ordered.
    pub fn snapshot_to(&self, path: &Path) -> Result<()> {
        let inner = self.inner.read().expect("fact store lock poisoned");
        let mut ids: Vec<InvestigationId> = inner.by_investigation.keys().copied().collect();
        ids.sort();

        let snapshot = FactSnapshot {
            investigations: ids
                .into_iter()
                .map(|inv_id| InvestigationFacts {
                    investigation_id: inv_id,
                    facts: inner.by_investigation[&inv_id]
                        .iter()
                        .filter_map(|id| inner.facts.get(id).map(|(_, f)| f.clone()))
                        .collect(),
                })
                .collect(),
        };
        super::write_snapshot(path, &snapshot)
    }

    /// Load a snapshot, refusing unknown major schema versions and
    /// rebuilding all indices deterministically.
    pub fn load_from(path: &Path) -> Result<Self> {
        let snapshot: FactSnapshot = super::read_snapshot(path)?;
        let store = Self::new();
        for inv in snapshot.investigations {
            for fact in inv.facts {
                check_schema_version(&fact.schema_version)?;
                store.insert(inv.investigation_id, fact)?;
            }
        }
        store.verify_integrity()?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{AssertionType, Claim, ClaimType, Provenance};
    use pretty_assertions::assert_eq;

    fn fact(text: &str, source: &str) -> ExtractedFact {
        ExtractedFact::new(
            Claim {
                text: text.to_string(),
                assertion_type: AssertionType::Statement,
                claim_type: ClaimType::Event,
                asserter: None,
            },
            Provenance::new(source, "rss"),
            "test-model",
        )
    }

    #[test]
    fn indices_answer_in_o1() {
        let store = FactStore::new();
        let inv = InvestigationId::new();
        let f = fact("troops massed at the border", "reuters-1");
        let id = f.fact_id;
        let hash = f.content_hash.clone();
        store.insert(inv, f).unwrap();

        assert_eq!(store.canonical_for_hash(inv, &hash), Some(id));
        assert_eq!(store.by_source("reuters-1"), vec![id]);
        assert!(store.get(id).is_some());
        // Hash index is investigation-scoped.
        assert_eq!(store.canonical_for_hash(InvestigationId::new(), &hash), None);
    }

    #[test]
    fn variant_links_are_bidirectional_and_accumulate_sources() {
        let store = FactStore::new();
        let inv = InvestigationId::new();
        let canonical = fact("ceasefire announced", "reuters-1");
        let variant = fact("ceasefire announced", "ap-1");
        let (c_id, v_id) = (canonical.fact_id, variant.fact_id);

        store.insert(inv, canonical).unwrap();
        store.insert(inv, variant).unwrap();
        store.link_variant(c_id, v_id).unwrap();

        let c = store.get(c_id).unwrap();
        let v = store.get(v_id).unwrap();
        assert_eq!(c.variants, vec![v_id]);
        assert_eq!(v.variants, vec![c_id]);
        assert_eq!(c.provenance.additional_sources.len(), 1);
        assert_eq!(c.provenance.additional_sources[0].source_id, "ap-1");

        // Linking again is a no-op.
        store.link_variant(c_id, v_id).unwrap();
        assert_eq!(store.get(c_id).unwrap().variants.len(), 1);

        store.verify_integrity().unwrap();

        let with_variants = store.get_with_variants(c_id).unwrap();
        assert_eq!(with_variants.variants.len(), 1);
        assert_eq!(with_variants.variants[0].fact_id, v_id);
    }

    #[test]
    fn reinsert_is_idempotent() {
        let store = FactStore::new();
        let inv = InvestigationId::new();
        let f = fact("a claim", "reuters-1");
        store.insert(inv, f.clone()).unwrap();
        store.insert(inv, f).unwrap();
        assert_eq!(store.count(inv), 1);
    }

    #[test]
    fn snapshot_round_trip_is_byte_identical() {
        let store = FactStore::new();
        let inv = InvestigationId::new();
        let a = fact("claim one", "reuters-1");
        let b = fact("claim one", "ap-1");
        let (a_id, b_id) = (a.fact_id, b.fact_id);
        store.insert(inv, a).unwrap();
        store.insert(inv, b).unwrap();
        store.link_variant(a_id, b_id).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let first_path = dir.path().join("facts.json");
        let second_path = dir.path().join("facts2.json");

        store.snapshot_to(&first_path).unwrap();
        let reloaded = FactStore::load_from(&first_path).unwrap();
        reloaded.snapshot_to(&second_path).unwrap();

        assert_eq!(
            std::fs::read_to_string(&first_path).unwrap(),
            std::fs::read_to_string(&second_path).unwrap()
        );
        assert_eq!(reloaded.canonical_for_hash(inv, &reloaded.get(a_id).unwrap().content_hash), Some(a_id));
    }
}
