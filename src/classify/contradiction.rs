//! Contradiction detection across an investigation's facts.
//!
//! Two passes: the first digests every fact (content tokens, entities,
//! numbers, explicit dates), the second compares pairs. Four types are
//! distinguished, checked in priority order so a pair gets exactly one
//! label: temporal, attribution, numeric, negation. Temporal wins because
//! its resolution differs downstream (superseded, not refuted).

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::fact::{AssertionType, ExtractedFact, TemporalSourcing};

use super::types::{Contradiction, ContradictionType};

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "from", "into", "over", "near", "have", "has",
    "had", "was", "were", "are", "been", "will", "would", "could", "their", "there", "about",
    "after", "before", "between", "during", "its", "his", "her", "they", "them", "than", "then",
    "when", "where", "which", "while", "who", "whom", "whose", "also", "only", "some", "such",
];

fn negation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(not|no|never|denies|denied|refuted|rejects|rejected|without|didn't|wasn't|isn't)\b")
            .expect("static regex")
    })
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("static regex"))
}

/// Relative tolerance within which two numbers are the same figure.
const NUMERIC_TOLERANCE: f64 = 0.05;

struct FactDigest<'a> {
    fact: &'a ExtractedFact,
    tokens: HashSet<String>,
    entities: HashSet<String>,
    numbers: Vec<f64>,
    explicit_date: Option<(&'a str, crate::fact::DatePrecision)>,
    has_negation: bool,
}

impl<'a> FactDigest<'a> {
    fn new(fact: &'a ExtractedFact) -> Self {
        let text = fact.plain_claim_text();
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|t| t.len() > 2 && !STOPWORDS.contains(&t.as_str()))
            .collect();
        let entities = fact
            .entities
            .iter()
            .map(|e| e.canonical.as_deref().unwrap_or(&e.text).to_lowercase())
            .collect();
        let numbers = number_regex()
            .find_iter(&text)
            .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
            .collect();
        let explicit_date = fact
            .temporal
            .as_ref()
            .filter(|t| t.temporal_precision == TemporalSourcing::Explicit)
            .map(|t| (t.value.as_str(), t.precision));

        Self {
            has_negation: negation_regex().is_match(&text),
            fact,
            tokens,
            entities,
            numbers,
            explicit_date,
        }
    }
}

fn shared_count(a: &HashSet<String>, b: &HashSet<String>) -> usize {
    a.intersection(b).count()
}

/// Two number sets are disjoint when no pair falls within tolerance.
fn numbers_disjoint(a: &[f64], b: &[f64]) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.iter().all(|x| {
        b.iter()
            .all(|y| (x - y).abs() > NUMERIC_TOLERANCE * x.abs().max(y.abs()))
    })
}

/// Pairwise contradiction detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContradictionDetector;

impl ContradictionDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect contradictions among an investigation's canonical facts.
    pub fn detect(&self, facts: &[ExtractedFact]) -> Vec<Contradiction> {
        let digests: Vec<FactDigest<'_>> = facts.iter().map(FactDigest::new).collect();

        let mut found = Vec::new();
        for i in 0..digests.len() {
            for j in (i + 1)..digests.len() {
                if let Some(contradiction) = compare(&digests[i], &digests[j]) {
                    found.push(contradiction);
                }
            }
        }
        found
    }
}

fn compare(a: &FactDigest<'_>, b: &FactDigest<'_>) -> Option<Contradiction> {
    let shared_entities = shared_count(&a.entities, &b.entities);
    let shared_tokens = shared_count(&a.tokens, &b.tokens);

    // Temporal: different explicit dates at the same precision.
    if let (Some((date_a, prec_a)), Some((date_b, prec_b))) = (a.explicit_date, b.explicit_date) {
        if prec_a == prec_b && date_a != date_b && shared_entities >= 1 && shared_tokens >= 2 {
            return Some(contradiction(
                a,
                b,
                ContradictionType::Temporal,
                0.8,
                format!("explicit dates differ: {date_a} vs {date_b}"),
            ));
        }
    }

    // Attribution: a statement against a denial sharing an entity.
    let types = (a.fact.claim.assertion_type, b.fact.claim.assertion_type);
    if matches!(
        types,
        (AssertionType::Statement, AssertionType::Denial)
            | (AssertionType::Denial, AssertionType::Statement)
    ) && shared_entities >= 1
        && shared_tokens >= 1
    {
        return Some(contradiction(
            a,
            b,
            ContradictionType::Attribution,
            0.7,
            "statement contradicted by denial".to_string(),
        ));
    }

    // Numeric: disjoint figures about the same entity.
    if shared_entities >= 1 && shared_tokens >= 2 && numbers_disjoint(&a.numbers, &b.numbers) {
        return Some(contradiction(
            a,
            b,
            ContradictionType::Numeric,
            0.7,
            format!("disjoint figures: {:?} vs {:?}", a.numbers, b.numbers),
        ));
    }

    // Negation: one side negated, enough token overlap.
    if a.has_negation != b.has_negation && shared_tokens >= 2 {
        let confidence = (0.4 + 0.1 * shared_tokens as f64).min(0.9);
        return Some(contradiction(
            a,
            b,
            ContradictionType::Negation,
            confidence,
            format!("negation mismatch with {shared_tokens} shared tokens"),
        ));
    }

    None
}

fn contradiction(
    a: &FactDigest<'_>,
    b: &FactDigest<'_>,
    contradiction_type: ContradictionType,
    confidence: f64,
    detail: String,
) -> Contradiction {
    Contradiction {
        fact_a: a.fact.fact_id,
        fact_b: b.fact.fact_id,
        contradiction_type,
        confidence,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{
        Claim, ClaimType, DatePrecision, EntityMention, EntityType, Provenance, TemporalRef,
    };

    fn fact(text: &str, assertion: AssertionType, entities: &[&str]) -> ExtractedFact {
        ExtractedFact::new(
            Claim {
                text: text.to_string(),
                assertion_type: assertion,
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
                .map(|(n, text)| EntityMention {
                    id: format!("E{}", n + 1),
                    text: text.to_string(),
                    entity_type: EntityType::Organization,
                    canonical: None,
                    cluster_id: None,
                })
                .collect(),
        )
    }

    fn with_date(mut f: ExtractedFact, value: &str) -> ExtractedFact {
        f.temporal = Some(TemporalRef {
            id: "T1".to_string(),
            value: value.to_string(),
            precision: DatePrecision::Month,
            temporal_precision: TemporalSourcing::Explicit,
        });
        f
    }

    #[test]
    fn negation_contradiction() {
        let detector = ContradictionDetector::new();
        let a = fact("the convoy reached the city", AssertionType::Statement, &[]);
        let b = fact("the convoy never reached the city", AssertionType::Statement, &[]);
        let found = detector.detect(&[a, b]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].contradiction_type, ContradictionType::Negation);
        assert!(found[0].confidence > 0.4);
    }

    #[test]
    fn attribution_contradiction() {
        let detector = ContradictionDetector::new();
        let statement = fact(
            "Army shelled the village",
            AssertionType::Statement,
            &["Army"],
        );
        let denial = fact(
            "Army shelled the village",
            AssertionType::Denial,
            &["Army"],
        );
        let found = detector.detect(&[statement, denial]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].contradiction_type, ContradictionType::Attribution);
    }

    #[test]
    fn numeric_contradiction_needs_disjoint_figures() {
        let detector = ContradictionDetector::new();
        let a = fact("100,000 troops on border", AssertionType::Statement, &["troops"]);
        let b = fact("102,000 troops on border", AssertionType::Statement, &["troops"]);
        // Within 5% tolerance: same figure, no contradiction.
        assert!(detector.detect(&[a.clone(), b]).is_empty());

        let c = fact("150,000 troops on border", AssertionType::Statement, &["troops"]);
        let found = detector.detect(&[a, c]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].contradiction_type, ContradictionType::Numeric);
    }

    #[test]
    fn temporal_wins_over_numeric() {
        let detector = ContradictionDetector::new();
        let a = with_date(
            fact("100,000 troops on border", AssertionType::Statement, &["troops"]),
            "2024-01",
        );
        let b = with_date(
            fact("150,000 troops on border", AssertionType::Statement, &["troops"]),
            "2024-02",
        );
        let found = detector.detect(&[a, b]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].contradiction_type, ContradictionType::Temporal);
    }

    #[test]
    fn unrelated_facts_do_not_collide() {
        let detector = ContradictionDetector::new();
        let a = fact("harvest finished early", AssertionType::Statement, &["farm"]);
        let b = fact("no rain fell in the capital", AssertionType::Statement, &["capital"]);
        assert!(detector.detect(&[a, b]).is_empty());
    }
}
