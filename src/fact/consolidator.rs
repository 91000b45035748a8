//! Fact consolidation: layered dedup with variant linking.
//!
//! Layers run in ascending cost order: in-article identity, exact content
//! hash, then optional semantic similarity. Hash duplicates become
//! variants of the first fact seen for that hash, with both directions
//! linked and the canonical accumulating the variant's provenance, so
//! three wire services reporting one claim stay visible as three sources
//! behind one canonical fact. Consolidation is idempotent under
//! reordering and re-runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::Result;
use crate::investigation::InvestigationId;
use crate::llm::CompletionClient;
use crate::store::FactStore;

use super::types::{ExtractedFact, FactId};

/// Outcome of one consolidation pass.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    /// Canonical fact ids after dedup, in first-seen order.
    pub canonical: Vec<FactId>,
    pub variants_linked: usize,
    pub in_article_duplicates: usize,
    pub semantic_links: usize,
}

/// Three-layer consolidator writing through the fact store.
pub struct FactConsolidator {
    store: Arc<FactStore>,
    embedder: Option<Arc<dyn CompletionClient>>,
    semantic_threshold: f64,
    embedding_cache: Mutex<HashMap<FactId, Vec<f32>>>,
    embedding_warned: AtomicBool,
}

impl FactConsolidator {
    pub fn new(store: Arc<FactStore>, semantic_threshold: f64) -> Self {
        Self {
            store,
            embedder: None,
            semantic_threshold,
            embedding_cache: Mutex::new(HashMap::new()),
            embedding_warned: AtomicBool::new(false),
        }
    }

    /// Enable the optional semantic layer.
    pub fn with_embedder(mut self, embedder: Arc<dyn CompletionClient>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Consolidate a batch of extracted facts into the store.
    pub async fn consolidate(
        &self,
        investigation_id: InvestigationId,
        facts: Vec<ExtractedFact>,
    ) -> Result<ConsolidationReport> {
        let mut report = ConsolidationReport::default();

        // Layer 1: drop exact duplicates from the same source within the
        // batch (one article asserting the same thing twice).
        let mut seen_in_batch: HashSet<(String, String)> = HashSet::new();
        let mut deduped = Vec::new();
        for fact in facts {
            let key = (fact.provenance.source_id.clone(), fact.content_hash.clone());
            if seen_in_batch.insert(key) {
                deduped.push(fact);
            } else {
                report.in_article_duplicates += 1;
            }
        }

        // Layer 2: content-hash probe against the store.
        let mut canonical_order: Vec<FactId> = Vec::new();
        let mut new_canonicals: Vec<FactId> = Vec::new();
        for fact in deduped {
            let fact_id = fact.fact_id;
            let hash = fact.content_hash.clone();

            if self.store.get(fact_id).is_some() {
                // Re-consolidation of an already-placed fact: idempotent.
                let canonical = self
                    .store
                    .canonical_for_hash(investigation_id, &hash)
                    .unwrap_or(fact_id);
                if !canonical_order.contains(&canonical) {
                    canonical_order.push(canonical);
                }
                continue;
            }

            match self.store.canonical_for_hash(investigation_id, &hash) {
                Some(canonical_id) => {
                    self.store.insert(investigation_id, fact)?;
                    self.store.link_variant(canonical_id, fact_id)?;
                    report.variants_linked += 1;
                    if !canonical_order.contains(&canonical_id) {
                        canonical_order.push(canonical_id);
                    }
                }
                None => {
                    self.store.insert(investigation_id, fact)?;
                    canonical_order.push(fact_id);
                    new_canonicals.push(fact_id);
                }
            }
        }

        // Layer 3: semantic similarity over the new canonicals. Skipped
        // gracefully when no embedding capability exists.
        if !new_canonicals.is_empty() {
            report.semantic_links = self
                .semantic_pass(investigation_id, &new_canonicals)
                .await;
        }

        report.canonical = canonical_order;
        Ok(report)
    }

    async fn semantic_pass(
        &self,
        investigation_id: InvestigationId,
        new_canonicals: &[FactId],
    ) -> usize {
        let Some(embedder) = &self.embedder else {
            return 0;
        };

        // Candidate set: established canonicals (facts that are first for
        // their hash) other than the ones just inserted.
        let new_set: HashSet<FactId> = new_canonicals.iter().copied().collect();
        let established: Vec<ExtractedFact> = self
            .store
            .facts_for(investigation_id)
            .into_iter()
            .filter(|f| {
                !new_set.contains(&f.fact_id)
                    && self.store.canonical_for_hash(investigation_id, &f.content_hash)
                        == Some(f.fact_id)
            })
            .collect();
        if established.is_empty() {
            return 0;
        }

        let mut linked = 0;
        for fact_id in new_canonicals {
            let Some(fact) = self.store.get(*fact_id) else {
                continue;
            };
            let candidate_embedding = match self.embedding_for(embedder, &fact).await {
                Some(e) => e,
                None => return linked,
            };

            let mut best: Option<(FactId, f64)> = None;
            for other in &established {
                let Some(other_embedding) = self.embedding_for(embedder, other).await else {
                    return linked;
                };
                let distance = cosine_distance(&candidate_embedding, &other_embedding);
                if distance < self.semantic_threshold
                    && best.map(|(_, d)| distance < d).unwrap_or(true)
                {
                    best = Some((other.fact_id, distance));
                }
            }

            if let Some((canonical_id, distance)) = best {
                debug!(
                    fact = %fact_id,
                    canonical = %canonical_id,
                    distance,
                    "semantic duplicate linked as variant"
                );
                if self.store.link_variant(canonical_id, *fact_id).is_ok() {
                    linked += 1;
                }
            }
        }
        linked
    }

    async fn embedding_for(
        &self,
        embedder: &Arc<dyn CompletionClient>,
        fact: &ExtractedFact,
    ) -> Option<Vec<f32>> {
        if let Some(cached) = self
            .embedding_cache
            .lock()
            .expect("embedding cache lock poisoned")
            .get(&fact.fact_id)
            .cloned()
        {
            return Some(cached);
        }

        match embedder.embed(&[fact.plain_claim_text()]).await {
            Ok(mut vectors) if !vectors.is_empty() => {
                let embedding = vectors.remove(0);
                self.embedding_cache
                    .lock()
                    .expect("embedding cache lock poisoned")
                    .insert(fact.fact_id, embedding.clone());
                Some(embedding)
            }
            Ok(_) => None,
            Err(e) => {
                if !self.embedding_warned.swap(true, Ordering::SeqCst) {
                    warn!(error = %e, "no embedding capability, semantic dedup layer skipped");
                }
                None
            }
        }
    }
}

/// Cosine distance in [0, 2]; 0 means identical direction.
fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}
