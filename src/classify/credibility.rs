//! The credibility formula.
//!
//! Per attribution: `SourceCred(source) * decay^hop_count * Precision(fact)`.
//! Multi-source facts get logarithmic echo dampening: sources are
//! clustered by attribution-chain root, the strongest cluster is the root
//! signal, and the other clusters contribute `alpha * log10(1 + sum)`.
//! Repetition within one cluster adds nothing; four or more sources all
//! tracing to a single non-primary root raise the circular-reporting
//! warning.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::config::ScoringConfig;
use crate::fact::{ExtractedFact, SourceClassification, TemporalSourcing};
use crate::web::AuthorityScorer;

use super::types::{CredibilityBreakdown, PerSourceScore};

/// Credibility scoring model.
pub struct CredibilityModel {
    scorer: Arc<AuthorityScorer>,
    proximity_decay: f64,
    echo_alpha: f64,
}

impl CredibilityModel {
    pub fn new(scorer: Arc<AuthorityScorer>, config: &ScoringConfig) -> Self {
        Self {
            scorer,
            proximity_decay: config.proximity_decay,
            echo_alpha: config.echo_alpha,
        }
    }

    /// Proximity factor: `decay^hop_count`. Hop 0 is an eyewitness.
    pub fn proximity(&self, hop_count: u32) -> f64 {
        self.proximity_decay.powi(hop_count as i32)
    }

    /// Baseline credibility of a source id like `rss:reuters` or
    /// `web:example.com`.
    pub fn source_cred(&self, source_id: &str) -> f64 {
        let tail = source_id.rsplit(':').next().unwrap_or(source_id);
        if source_id.starts_with("reddit:") || tail.starts_with("r/") {
            return self.scorer.score("reddit.com");
        }
        if tail.contains('.') {
            self.scorer.score(tail)
        } else {
            self.scorer.score(&format!("{tail}.com"))
        }
    }

    /// Fact-level precision in [0, 1]: entity count with diminishing
    /// returns (30%), temporal precision (30%), quote presence (20%),
    /// document citation (20%).
    pub fn precision(&self, fact: &ExtractedFact) -> f64 {
        let entity_component = 1.0 - 0.7f64.powi(fact.entities.len() as i32);
        let temporal_component = match fact.temporal.as_ref().map(|t| t.temporal_precision) {
            Some(TemporalSourcing::Explicit) => 1.0,
            Some(TemporalSourcing::Inferred) => 0.6,
            Some(TemporalSourcing::Unknown) => 0.2,
            None => 0.0,
        };
        let quote_component = if fact.provenance.quote.is_some() { 1.0 } else { 0.0 };
        let citation_component = match fact.provenance.source_classification {
            SourceClassification::Primary => 1.0,
            SourceClassification::Secondary => 0.5,
            SourceClassification::Tertiary => 0.25,
        };

        0.3 * entity_component
            + 0.3 * temporal_component
            + 0.2 * quote_component
            + 0.2 * citation_component
    }

    /// Score a fact across all of its attributions.
    pub fn assess(&self, fact: &ExtractedFact) -> CredibilityBreakdown {
        let precision = self.precision(fact);
        let attributions = fact.provenance.attributions();

        let per_source: Vec<PerSourceScore> = attributions
            .iter()
            .map(|attribution| {
                let source_cred = self.source_cred(&attribution.source_id);
                let proximity = self.proximity(attribution.hop_count);
                PerSourceScore {
                    source_id: attribution.source_id.clone(),
                    root: attribution.root().to_string(),
                    source_cred,
                    proximity,
                    precision,
                    score: source_cred * proximity * precision,
                }
            })
            .collect();

        // Cluster by root; a cluster's signal is its best member.
        let mut clusters: HashMap<&str, f64> = HashMap::new();
        for source in &per_source {
            let entry = clusters.entry(source.root.as_str()).or_insert(0.0);
            *entry = entry.max(source.score);
        }

        let root_score = clusters.values().copied().fold(0.0, f64::max);
        let echo_sum: f64 = clusters.values().copied().sum::<f64>() - root_score;
        let echo_bonus = self.echo_alpha * (1.0 + echo_sum).log10();
        let total = (root_score + echo_bonus).clamp(0.0, 1.0);

        let circular_warning = per_source.len() >= 4
            && clusters.len() == 1
            && !fact.provenance.has_primary_source();
        if circular_warning {
            warn!(
                fact = %fact.fact_id,
                sources = per_source.len(),
                root = per_source.first().map(|s| s.root.as_str()).unwrap_or(""),
                "circular reporting: all sources trace to one non-primary root"
            );
        }

        CredibilityBreakdown {
            unique_roots: clusters.len(),
            per_source,
            root_score,
            echo_sum,
            echo_bonus,
            total,
            circular_warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{AssertionType, Claim, ClaimType, Provenance, SourceAttribution};

    fn model() -> CredibilityModel {
        CredibilityModel::new(Arc::new(AuthorityScorer::new()), &ScoringConfig::default())
    }

    fn fact_from(provenance: Provenance) -> ExtractedFact {
        ExtractedFact::new(
            Claim {
                text: "troops moved to the border".to_string(),
                assertion_type: AssertionType::Statement,
                claim_type: ClaimType::Event,
                asserter: None,
            },
            provenance,
            "test-model",
        )
    }

    fn attribution(source_id: &str, root: &str) -> SourceAttribution {
        SourceAttribution {
            source_id: source_id.to_string(),
            source_type: "rss".to_string(),
            source_classification: crate::fact::SourceClassification::Secondary,
            attribution_chain: vec![root.to_string()],
            hop_count: 1,
            quote: None,
        }
    }

    #[test]
    fn proximity_decays_per_hop() {
        let model = model();
        assert!((model.proximity(0) - 1.0).abs() < 1e-9);
        assert!((model.proximity(1) - 0.7).abs() < 1e-9);
        assert!((model.proximity(2) - 0.49).abs() < 1e-9);
        assert!((model.proximity(10) - 0.0282475249).abs() < 1e-6);
    }

    #[test]
    fn source_cred_resolves_ids() {
        let model = model();
        assert_eq!(model.source_cred("rss:reuters"), 0.9);
        assert_eq!(model.source_cred("reddit:r/geopolitics"), 0.3);
        assert_eq!(model.source_cred("web:state.gov"), 0.85);
        assert_eq!(model.source_cred("api:somewire"), 0.5);
    }

    #[test]
    fn precision_rewards_specificity() {
        let model = model();
        let vague = fact_from(Provenance::new("rss:reuters", "rss"));
        let specific = {
            let mut f = fact_from(
                Provenance::new("rss:reuters", "rss")
                    .with_classification(crate::fact::SourceClassification::Primary)
                    .with_quote("exact words"),
            );
            f.entities = vec![
                crate::fact::EntityMention {
                    id: "E1".to_string(),
                    text: "Army".to_string(),
                    entity_type: crate::fact::EntityType::Organization,
                    canonical: None,
                    cluster_id: None,
                },
                crate::fact::EntityMention {
                    id: "E2".to_string(),
                    text: "Border".to_string(),
                    entity_type: crate::fact::EntityType::Location,
                    canonical: None,
                    cluster_id: None,
                },
            ];
            f.temporal = Some(crate::fact::TemporalRef {
                id: "T1".to_string(),
                value: "2024-05-16".to_string(),
                precision: crate::fact::DatePrecision::Day,
                temporal_precision: TemporalSourcing::Explicit,
            });
            f
        };
        assert!(model.precision(&specific) > model.precision(&vague));
        assert!(model.precision(&specific) <= 1.0);
    }

    #[test]
    fn echo_bonus_is_zero_for_zero_score_echoes() {
        // One root at 0.9 and echoes summing to zero: total == 0.9 exactly.
        let alpha = 0.2;
        let total = 0.9 + alpha * (1.0f64 + 0.0).log10();
        assert!((total - 0.9).abs() < 1e-12);
    }

    #[test]
    fn corroboration_raises_credibility() {
        let model = model();
        let single = fact_from(Provenance::new("rss:reuters", "rss"));
        let single_score = model.assess(&single).total;

        let mut corroborated_provenance = Provenance::new("rss:reuters", "rss");
        corroborated_provenance.additional_sources = vec![
            attribution("rss:ap", "apnews.com"),
            attribution("api:tass", "tass.com"),
        ];
        let corroborated = fact_from(corroborated_provenance);
        let breakdown = model.assess(&corroborated);

        assert!(breakdown.unique_roots >= 2);
        assert!(breakdown.echo_sum > 0.0);
        assert!(breakdown.total > single_score);
        assert!(breakdown.total <= 1.0);
    }

    #[test]
    fn circular_reporting_warning_fires() {
        let model = model();
        let mut provenance = Provenance::new("rss:outlet-a", "rss")
            .with_chain(vec!["shadowy-blog.net".to_string(), "rss:outlet-a".to_string()]);
        provenance.additional_sources = (0..3)
            .map(|n| SourceAttribution {
                source_id: format!("rss:outlet-{n}"),
                source_type: "rss".to_string(),
                source_classification: crate::fact::SourceClassification::Secondary,
                attribution_chain: vec!["shadowy-blog.net".to_string()],
                hop_count: 1,
                quote: None,
            })
            .collect();

        let breakdown = model.assess(&fact_from(provenance));
        assert_eq!(breakdown.unique_roots, 1);
        assert!(breakdown.circular_warning);
    }

    #[test]
    fn formula_decomposition_is_consistent() {
        let model = model();
        let fact = fact_from(Provenance::new("rss:reuters", "rss"));
        let breakdown = model.assess(&fact);
        let expected =
            (breakdown.root_score + 0.2 * (1.0 + breakdown.echo_sum).log10()).clamp(0.0, 1.0);
        assert!((breakdown.total - expected).abs() < 1e-9);
        for source in &breakdown.per_source {
            assert!(
                (source.score - source.source_cred * source.proximity * source.precision).abs()
                    < 1e-9
            );
        }
    }
}
