//! Species-specialized verification query generation.
//!
//! At most three queries per fact across all of its flags (NOISE is
//! skipped). PHANTOM gets source-chain queries, FOG gets clarity-seeking
//! queries, and ANOMALY gets a compound bundle probing all three
//! dimensions simultaneously, never sequentially.

use std::sync::OnceLock;

use regex::Regex;

use crate::classify::{DubiousFlag, FactClassification};
use crate::fact::ExtractedFact;

/// Total query budget per fact.
pub const MAX_QUERIES_PER_FACT: usize = 3;

fn vague_quantity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(dozens|scores|many|several|numerous|hundreds of|thousands of|a number of)\b")
            .expect("static regex")
    })
}

fn vague_temporal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(recently|soon|in recent days|earlier|lately|in the past)\b")
            .expect("static regex")
    })
}

/// One attempt: the queries issued together in a single search round.
/// ANOMALY bundles are one attempt with three queries.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAttempt {
    pub species: DubiousFlag,
    pub queries: Vec<String>,
}

/// The full verification plan for one fact.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    pub attempts: Vec<QueryAttempt>,
}

impl QueryPlan {
    pub fn total_queries(&self) -> usize {
        self.attempts.iter().map(|a| a.queries.len()).sum()
    }
}

/// Species-specialized query generator.
#[derive(Debug, Clone, Copy)]
pub struct QueryGenerator {
    max_queries: usize,
}

impl Default for QueryGenerator {
    fn default() -> Self {
        Self {
            max_queries: MAX_QUERIES_PER_FACT,
        }
    }
}

impl QueryGenerator {
    pub fn new(max_queries: usize) -> Self {
        Self {
            max_queries: max_queries.max(1),
        }
    }

    /// Core search terms for a fact: entity surface forms plus the most
    /// content-bearing claim words.
    fn key_terms(fact: &ExtractedFact) -> String {
        let mut terms: Vec<String> = fact
            .entities
            .iter()
            .map(|e| e.canonical.clone().unwrap_or_else(|| e.text.clone()))
            .collect();
        let text = fact.plain_claim_text();
        terms.extend(
            text.split_whitespace()
                .filter(|w| w.len() > 4)
                .take(6)
                .map(str::to_string),
        );
        terms.dedup();
        terms.join(" ")
    }

    fn phantom_attempts(fact: &ExtractedFact) -> Vec<QueryAttempt> {
        let terms = Self::key_terms(fact);
        let claim = fact.plain_claim_text();
        let exact: String = claim.chars().take(90).collect();
        vec![
            QueryAttempt {
                species: DubiousFlag::Phantom,
                queries: vec![format!("{terms} \"press release\" OR spokesperson")],
            },
            QueryAttempt {
                species: DubiousFlag::Phantom,
                queries: vec![format!("\"{exact}\"")],
            },
            QueryAttempt {
                species: DubiousFlag::Phantom,
                queries: vec![format!(
                    "{terms} official statement site:reuters.com OR site:apnews.com"
                )],
            },
        ]
    }

    fn fog_attempts(fact: &ExtractedFact) -> Vec<QueryAttempt> {
        let terms = Self::key_terms(fact);
        let text = fact.plain_claim_text();
        let mut attempts = Vec::new();

        if vague_quantity_regex().is_match(&text) {
            attempts.push(QueryAttempt {
                species: DubiousFlag::Fog,
                queries: vec![format!("{terms} exact number figure official count")],
            });
        }
        if vague_temporal_regex().is_match(&text) {
            attempts.push(QueryAttempt {
                species: DubiousFlag::Fog,
                queries: vec![format!("{terms} specific date when timeline")],
            });
        }
        if attempts.is_empty() {
            attempts.push(QueryAttempt {
                species: DubiousFlag::Fog,
                queries: vec![format!("{terms} details specifics named source")],
            });
        }
        // Fallback: wire-service restricted search for a clearer account.
        attempts.push(QueryAttempt {
            species: DubiousFlag::Fog,
            queries: vec![format!("{terms} site:reuters.com OR site:apnews.com")],
        });
        attempts
    }

    /// Compound bundle: temporal context, authority arbitration, and
    /// clarity enhancement issued together so resolution can consider all
    /// three dimensions at once.
    fn anomaly_bundle(fact: &ExtractedFact) -> QueryAttempt {
        let terms = Self::key_terms(fact);
        QueryAttempt {
            species: DubiousFlag::Anomaly,
            queries: vec![
                format!("{terms} timeline when latest update"),
                format!("{terms} site:.gov OR site:reuters.com official"),
                format!("{terms} exact details confirmed report"),
            ],
        }
    }

    /// Build the plan for a fact given its classification. Queries are
    /// budgeted across flags in fixability order; the ANOMALY bundle is
    /// only included whole, degrading to a single arbitration query when
    /// the budget cannot fit it.
    pub fn plan(&self, fact: &ExtractedFact, classification: &FactClassification) -> QueryPlan {
        let mut plan = QueryPlan::default();
        let mut budget = self.max_queries;

        // Fixability order; NOISE never generates queries.
        let mut species: Vec<DubiousFlag> = classification
            .dubious_flags
            .iter()
            .copied()
            .filter(|f| *f != DubiousFlag::Noise)
            .collect();
        species.sort_by_key(|f| match f {
            DubiousFlag::Fog => 0,
            DubiousFlag::Anomaly => 1,
            DubiousFlag::Phantom => 2,
            DubiousFlag::Noise => 3,
        });

        for flag in species {
            if budget == 0 {
                break;
            }
            match flag {
                DubiousFlag::Fog => {
                    for attempt in Self::fog_attempts(fact) {
                        if budget == 0 {
                            break;
                        }
                        budget -= attempt.queries.len().min(budget);
                        plan.attempts.push(attempt);
                    }
                }
                DubiousFlag::Anomaly => {
                    let bundle = Self::anomaly_bundle(fact);
                    if bundle.queries.len() <= budget {
                        budget -= bundle.queries.len();
                        plan.attempts.push(bundle);
                    } else {
                        // Budget cannot fit the bundle: single arbitration
                        // query instead of a partial bundle.
                        let terms = Self::key_terms(fact);
                        budget -= 1;
                        plan.attempts.push(QueryAttempt {
                            species: DubiousFlag::Anomaly,
                            queries: vec![format!("{terms} site:.gov OR site:reuters.com official")],
                        });
                    }
                }
                DubiousFlag::Phantom => {
                    for attempt in Self::phantom_attempts(fact) {
                        if budget == 0 {
                            break;
                        }
                        budget -= 1;
                        plan.attempts.push(attempt);
                    }
                }
                DubiousFlag::Noise => {}
            }
        }
        plan
    }
}
