//! Evidence aggregation: graduated confidence boosts and the
//! confirmation/refutation rules.
//!
//! Confirmation needs one source with authority >= 0.85 or two
//! independent sources (different domains) with authority >= 0.7.
//! Refutation needs authority >= 0.7 and relevance >= 0.7. Boosts are
//! cumulative per supporting source class and cap at 1.0 downstream.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::fact::ExtractedFact;
use crate::web::{AuthorityScorer, SourceClass};

use super::search::EvidenceCandidate;
use super::types::EvidenceItem;

/// Authority confirming on its own.
const SINGLE_SOURCE_AUTHORITY: f64 = 0.85;
/// Authority counting toward two-source confirmation and refutation.
const CORROBORATING_AUTHORITY: f64 = 0.7;
/// Relevance floor for refuting evidence.
const REFUTATION_RELEVANCE: f64 = 0.7;

/// Graduated confidence boost per source class.
pub fn boost_for(class: SourceClass) -> f64 {
    match class {
        SourceClass::Wire => 0.30,
        SourceClass::Official => 0.25,
        SourceClass::News | SourceClass::Organization => 0.20,
        SourceClass::Social | SourceClass::Unknown => 0.10,
    }
}

fn negation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(not|no|never|denie[ds]|false|refuted|debunked|incorrect|untrue|didn't|wasn't)\b")
            .expect("static regex")
    })
}

/// Aggregated view of all evidence gathered for a fact.
#[derive(Debug, Clone, Default)]
pub struct EvidenceAssessment {
    pub supporting: Vec<EvidenceItem>,
    pub refuting: Vec<EvidenceItem>,
    /// Sum of supporting-class boosts (uncapped; callers cap the final
    /// confidence at 1.0).
    pub confidence_boost: f64,
    pub confirms: bool,
    pub refutes: bool,
}

/// Applies the graduated-confidence rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceAggregator;

impl EvidenceAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Stance heuristic: a snippet that negates while overlapping the
    /// claim's tokens refutes; anything else relevant supports.
    fn supports_claim(fact: &ExtractedFact, snippet: &str) -> bool {
        if !negation_regex().is_match(snippet) {
            return true;
        }
        let claim = fact.plain_claim_text().to_lowercase();
        let claim_tokens: HashSet<&str> = claim
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 3)
            .collect();
        let snippet_lower = snippet.to_lowercase();
        let overlap = claim_tokens
            .iter()
            .filter(|t| snippet_lower.contains(*t))
            .count();
        // Negating language about this very claim reads as refutation.
        overlap < 2
    }

    /// Assess the accumulated candidates for one fact.
    pub fn assess(
        &self,
        fact: &ExtractedFact,
        scorer: &AuthorityScorer,
        candidates: Vec<EvidenceCandidate>,
    ) -> EvidenceAssessment {
        let mut assessment = EvidenceAssessment::default();

        for candidate in candidates {
            let supports = Self::supports_claim(fact, &candidate.snippet);
            let item = candidate.into_item(scorer, supports);
            if supports {
                assessment.confidence_boost += boost_for(item.source_class);
                assessment.supporting.push(item);
            } else {
                assessment.refuting.push(item);
            }
        }

        let strong_single = assessment
            .supporting
            .iter()
            .any(|e| e.authority >= SINGLE_SOURCE_AUTHORITY);
        let independent_domains: HashSet<&str> = assessment
            .supporting
            .iter()
            .filter(|e| e.authority >= CORROBORATING_AUTHORITY)
            .map(|e| e.domain.as_str())
            .collect();
        assessment.confirms = strong_single || independent_domains.len() >= 2;

        assessment.refutes = assessment
            .refuting
            .iter()
            .any(|e| e.authority >= CORROBORATING_AUTHORITY && e.relevance >= REFUTATION_RELEVANCE);

        assessment
    }
}
