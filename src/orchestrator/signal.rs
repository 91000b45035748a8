//! Signal strength, coverage, and novelty metrics for the evaluation
//! node.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::CoverageTargets;
use crate::fact::EntityType;
use crate::investigation::InvestigationId;
use crate::store::{ArticleStore, ClassificationStore, FactStore};
use crate::web::host_of;

/// Aggregated view of what an investigation has gathered so far. The
/// orchestrator owns no records; this is read from store aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingSnapshot {
    pub article_count: usize,
    pub fact_count: usize,
    pub source_domains: HashSet<String>,
    pub entities: HashSet<String>,
    pub geographic_entities: HashSet<String>,
    pub dates: HashSet<String>,
    pub content_tokens: HashSet<String>,
    pub avg_source_credibility: f64,
}

impl FindingSnapshot {
    /// Fold another snapshot into the accumulated set.
    pub fn merge(&mut self, other: &FindingSnapshot) {
        self.article_count = self.article_count.max(other.article_count);
        self.fact_count = self.fact_count.max(other.fact_count);
        self.source_domains.extend(other.source_domains.iter().cloned());
        self.entities.extend(other.entities.iter().cloned());
        self.geographic_entities
            .extend(other.geographic_entities.iter().cloned());
        self.dates.extend(other.dates.iter().cloned());
        self.content_tokens.extend(other.content_tokens.iter().cloned());
        if other.avg_source_credibility > 0.0 {
            self.avg_source_credibility = other.avg_source_credibility;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.article_count == 0 && self.fact_count == 0
    }
}

/// Build a snapshot from the investigation's stores.
pub fn gather_findings(
    articles: &Arc<ArticleStore>,
    facts: &Arc<FactStore>,
    classifications: &Arc<ClassificationStore>,
    investigation_id: InvestigationId,
) -> FindingSnapshot {
    let mut snapshot = FindingSnapshot::default();

    let article_set = articles.retrieve_by_investigation(investigation_id);
    snapshot.article_count = article_set.total_articles;
    for article in &article_set.articles {
        if let Some(domain) = host_of(&article.url) {
            snapshot.source_domains.insert(domain);
        }
        if let Some(date) = article.published_date {
            snapshot.dates.insert(date.format("%Y-%m").to_string());
        }
    }

    let investigation_facts = facts.facts_for(investigation_id);
    snapshot.fact_count = investigation_facts.len();
    for fact in &investigation_facts {
        for entity in &fact.entities {
            let name = entity
                .canonical
                .clone()
                .unwrap_or_else(|| entity.text.clone())
                .to_lowercase();
            if entity.entity_type == EntityType::Location {
                snapshot.geographic_entities.insert(name.clone());
            }
            snapshot.entities.insert(name);
        }
        if let Some(temporal) = &fact.temporal {
            snapshot.dates.insert(temporal.value.clone());
        }
        snapshot.content_tokens.extend(
            fact.plain_claim_text()
                .split(|c: char| !c.is_alphanumeric())
                .map(str::to_lowercase)
                .filter(|t| t.len() > 3),
        );
    }

    let counts = classifications.counts(investigation_id);
    if counts.total > 0 {
        let sum: f64 = investigation_facts
            .iter()
            .filter_map(|f| classifications.get(f.fact_id))
            .map(|c| c.credibility_score)
            .sum();
        snapshot.avg_source_credibility = sum / counts.total as f64;
    }

    snapshot
}

/// Weighted signal strength in [0, 1]: keyword match (0.3), entity
/// density (0.2), source credibility (0.3), information density (0.2).
pub fn signal_strength(snapshot: &FindingSnapshot, objective: &str) -> f64 {
    if snapshot.is_empty() {
        return 0.0;
    }

    let keywords: Vec<String> = objective_keywords(objective);
    let keyword_match = if keywords.is_empty() {
        0.0
    } else {
        keywords
            .iter()
            .filter(|k| snapshot.content_tokens.contains(*k))
            .count() as f64
            / keywords.len() as f64
    };

    let entity_density = (snapshot.entities.len() as f64 / 10.0).min(1.0);
    let info_density = if snapshot.article_count == 0 {
        0.0
    } else {
        (snapshot.fact_count as f64 / snapshot.article_count as f64 / 5.0).min(1.0)
    };

    0.3 * keyword_match
        + 0.2 * entity_density
        + 0.3 * snapshot.avg_source_credibility
        + 0.2 * info_density
}

/// Four orthogonal coverage dimensions, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    pub source_diversity: f64,
    pub geographic: f64,
    pub temporal: f64,
    pub topic: f64,
}

impl CoverageSnapshot {
    /// Whether every dimension meets its target.
    pub fn meets(&self, targets: &CoverageTargets) -> bool {
        self.source_diversity >= targets.source_diversity
            && self.geographic >= targets.geographic
            && self.temporal >= targets.temporal
            && self.topic >= targets.topic
    }
}

/// Compute coverage from a snapshot.
pub fn coverage(snapshot: &FindingSnapshot, objective: &str) -> CoverageSnapshot {
    let keywords = objective_keywords(objective);
    let topic = if keywords.is_empty() {
        0.0
    } else {
        keywords
            .iter()
            .filter(|k| snapshot.content_tokens.contains(*k))
            .count() as f64
            / keywords.len() as f64
    };

    CoverageSnapshot {
        source_diversity: (snapshot.source_domains.len() as f64 / 5.0).min(1.0),
        geographic: (snapshot.geographic_entities.len() as f64 / 3.0).min(1.0),
        temporal: (snapshot.dates.len() as f64 / 3.0).min(1.0),
        topic,
    }
}

/// Novelty of a new snapshot against the accumulated finding set:
/// source novelty (0.3), entity novelty (0.4), content novelty (0.3).
pub fn novelty(new: &FindingSnapshot, accumulated: &FindingSnapshot) -> f64 {
    if accumulated.is_empty() {
        // Everything is new on the first iteration.
        return 1.0;
    }

    fn fraction_new(new: &HashSet<String>, seen: &HashSet<String>) -> f64 {
        if new.is_empty() {
            return 0.0;
        }
        new.difference(seen).count() as f64 / new.len() as f64
    }

    0.3 * fraction_new(&new.source_domains, &accumulated.source_domains)
        + 0.4 * fraction_new(&new.entities, &accumulated.entities)
        + 0.3 * fraction_new(&new.content_tokens, &accumulated.content_tokens)
}

pub(crate) fn objective_keywords(objective: &str) -> Vec<String> {
    objective
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(domains: &[&str], entities: &[&str], tokens: &[&str]) -> FindingSnapshot {
        FindingSnapshot {
            article_count: 4,
            fact_count: 8,
            source_domains: domains.iter().map(|s| s.to_string()).collect(),
            entities: entities.iter().map(|s| s.to_string()).collect(),
            geographic_entities: HashSet::new(),
            dates: HashSet::new(),
            content_tokens: tokens.iter().map(|s| s.to_string()).collect(),
            avg_source_credibility: 0.6,
        }
    }

    #[test]
    fn signal_blends_components() {
        let s = snapshot(
            &["reuters.com"],
            &["army", "border"],
            &["troops", "border", "crossing"],
        );
        let strong = signal_strength(&s, "troops border");
        let weak = signal_strength(&s, "election fraud");
        assert!(strong > weak);
        assert!(strong <= 1.0);
        assert_eq!(signal_strength(&FindingSnapshot::default(), "x"), 0.0);
    }

    #[test]
    fn coverage_meets_targets() {
        let s = FindingSnapshot {
            article_count: 10,
            fact_count: 20,
            source_domains: (0..5).map(|n| format!("s{n}.com")).collect(),
            entities: HashSet::new(),
            geographic_entities: (0..3).map(|n| format!("city{n}")).collect(),
            dates: (0..3).map(|n| format!("2024-0{n}")).collect(),
            content_tokens: ["troops", "border"].iter().map(|s| s.to_string()).collect(),
            avg_source_credibility: 0.5,
        };
        let c = coverage(&s, "troops border");
        assert_eq!(c.source_diversity, 1.0);
        assert_eq!(c.geographic, 1.0);
        assert_eq!(c.temporal, 1.0);
        assert_eq!(c.topic, 1.0);
        assert!(c.meets(&CoverageTargets::default()));

        let sparse = coverage(&snapshot(&["one.com"], &[], &[]), "troops border");
        assert!(!sparse.meets(&CoverageTargets::default()));
    }

    #[test]
    fn novelty_decays_as_findings_repeat() {
        let first = snapshot(&["a.com"], &["x", "y"], &["alpha", "beta"]);
        let mut accumulated = FindingSnapshot::default();
        assert_eq!(novelty(&first, &accumulated), 1.0);

        accumulated.merge(&first);
        // Identical round: nothing new.
        assert!(novelty(&first, &accumulated) < 1e-9);

        let half_new = snapshot(&["a.com", "b.com"], &["x", "z"], &["alpha", "gamma"]);
        let n = novelty(&half_new, &accumulated);
        assert!(n > 0.0 && n < 1.0);
    }
}
