//! Impact tier assessment.
//!
//! `impact = 0.5 * entity_significance + 0.5 * event_significance +
//! context_boost`, with the boost in [0, 0.2] rewarding alignment with
//! the investigation objective. Scores at or above 0.6 are critical tier.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fact::ExtractedFact;

use super::types::ImpactTier;

/// Threshold separating critical from less-critical facts.
pub const CRITICAL_THRESHOLD: f64 = 0.6;

fn world_leader_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(president|prime minister|chancellor|king|queen|pope|premier|supreme leader|head of state)\b")
            .expect("static regex")
    })
}

fn senior_official_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(minister|senator|general|admiral|ambassador|secretary|governor|spokesman|spokeswoman|spokesperson)\b")
            .expect("static regex")
    })
}

fn major_org_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(united nations|nato|european union|government|ministry|army|kremlin|white house|pentagon|parliament|central bank)\b")
            .expect("static regex")
    })
}

fn event_class_regexes() -> &'static [(f64, Regex)] {
    static CLASSES: OnceLock<Vec<(f64, Regex)>> = OnceLock::new();
    CLASSES.get_or_init(|| {
        vec![
            (1.0, Regex::new(r"(?i)\b(nuclear|missile|troops?|military|invasion|airstrike|attack|offensive|mobilization|war)\b").expect("static regex")),
            (0.9, Regex::new(r"(?i)\b(treaty|sanctions?|embargo|accord|ceasefire)\b").expect("static regex")),
            (0.8, Regex::new(r"(?i)\b(election|coup|referendum|impeachment|uprising)\b").expect("static regex")),
            (0.7, Regex::new(r"(?i)\b(summit|talks|negotiations?|diplomatic|state visit|envoy)\b").expect("static regex")),
        ]
    })
}

/// Full impact assessment for one fact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImpactAssessment {
    pub entity_significance: f64,
    pub event_significance: f64,
    pub context_boost: f64,
    pub score: f64,
    pub tier: ImpactTier,
}

/// Entity/event significance tables plus objective alignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImpactModel;

impl ImpactModel {
    pub fn new() -> Self {
        Self
    }

    /// Best entity significance across the fact's entities, with the claim
    /// text supplying title context ("President X met ...").
    fn entity_significance(&self, fact: &ExtractedFact) -> f64 {
        let claim_text = fact.plain_claim_text();
        let mut best: f64 = 0.3;
        for entity in &fact.entities {
            let surface = entity.canonical.as_deref().unwrap_or(&entity.text);
            let haystack = format!("{surface} {claim_text}");
            let significance = if world_leader_regex().is_match(&haystack) {
                1.0
            } else if senior_official_regex().is_match(&haystack) {
                0.8
            } else if major_org_regex().is_match(surface) {
                0.6
            } else {
                0.3
            };
            best = best.max(significance);
        }
        best
    }

    fn event_significance(&self, fact: &ExtractedFact) -> f64 {
        let text = fact.plain_claim_text();
        event_class_regexes()
            .iter()
            .find(|(_, re)| re.is_match(&text))
            .map(|(score, _)| *score)
            .unwrap_or(0.2)
    }

    /// Keyword alignment with the investigation objective, scaled into
    /// [0, 0.2].
    fn context_boost(&self, fact: &ExtractedFact, objective: &str) -> f64 {
        let keywords: Vec<String> = objective
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 3)
            .collect();
        if keywords.is_empty() {
            return 0.0;
        }
        let text = fact.plain_claim_text().to_lowercase();
        let hits = keywords.iter().filter(|k| text.contains(k.as_str())).count();
        0.2 * (hits as f64 / keywords.len() as f64)
    }

    pub fn assess(&self, fact: &ExtractedFact, objective: &str) -> ImpactAssessment {
        let entity_significance = self.entity_significance(fact);
        let event_significance = self.event_significance(fact);
        let context_boost = self.context_boost(fact, objective);
        let score = 0.5 * entity_significance + 0.5 * event_significance + context_boost;
        ImpactAssessment {
            entity_significance,
            event_significance,
            context_boost,
            score,
            tier: if score >= CRITICAL_THRESHOLD {
                ImpactTier::Critical
            } else {
                ImpactTier::LessCritical
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{
        AssertionType, Claim, ClaimType, EntityMention, EntityType, ExtractedFact, Provenance,
    };

    fn fact(text: &str, entities: &[(&str, EntityType)]) -> ExtractedFact {
        ExtractedFact::new(
            Claim {
                text: text.to_string(),
                assertion_type: AssertionType::Statement,
                claim_type: ClaimType::Event,
                asserter: None,
            },
            Provenance::new("rss:reuters", "rss"),
            "test-model",
        )
        .with_entities(
            entities
                .iter()
                .enumerate()
                .map(|(n, (text, entity_type))| EntityMention {
                    id: format!("E{}", n + 1),
                    text: text.to_string(),
                    entity_type: *entity_type,
                    canonical: None,
                    cluster_id: None,
                })
                .collect(),
        )
    }

    #[test]
    fn military_claim_by_leader_is_critical() {
        let model = ImpactModel::new();
        let f = ExtractedFact::new(
            Claim {
                text: "President [E1:Novak] ordered troops to the border".to_string(),
                assertion_type: AssertionType::Statement,
                claim_type: ClaimType::Event,
                asserter: None,
            },
            Provenance::new("rss:reuters", "rss"),
            "test-model",
        )
        .with_entities(vec![EntityMention {
            id: "E1".to_string(),
            text: "Novak".to_string(),
            entity_type: EntityType::Person,
            canonical: None,
            cluster_id: None,
        }]);

        let assessment = model.assess(&f, "border troop movements");
        assert_eq!(assessment.entity_significance, 1.0);
        assert_eq!(assessment.event_significance, 1.0);
        assert_eq!(assessment.tier, ImpactTier::Critical);
    }

    #[test]
    fn routine_claim_is_less_critical() {
        let model = ImpactModel::new();
        let f = fact(
            "the museum reopened after renovation",
            &[("museum", EntityType::Organization)],
        );
        let assessment = model.assess(&f, "arms shipments");
        assert_eq!(assessment.event_significance, 0.2);
        assert_eq!(assessment.tier, ImpactTier::LessCritical);
        assert_eq!(assessment.context_boost, 0.0);
    }

    #[test]
    fn objective_alignment_boosts() {
        let model = ImpactModel::new();
        let f = fact(
            "sanctions imposed over the pipeline dispute",
            &[("ministry", EntityType::Organization)],
        );
        let aligned = model.assess(&f, "pipeline sanctions dispute");
        let unrelated = model.assess(&f, "election fraud claims");
        assert!(aligned.context_boost > unrelated.context_boost);
        assert!(aligned.context_boost <= 0.2);
        assert!(aligned.score > unrelated.score);
    }

    #[test]
    fn no_entities_defaults_to_generic() {
        let model = ImpactModel::new();
        let f = fact("it rained in the capital", &[]);
        assert_eq!(model.assess(&f, "").entity_significance, 0.3);
    }
}
