//! Verification: species-specialized queries, search-backed evidence
//! aggregation, and re-classification of dubious facts.

mod engine;
mod evidence;
mod queries;
mod reclassify;
pub(crate) mod search;
mod types;

pub use engine::{loser_status_for, VerificationEngine, VerificationRunReport};
pub use evidence::{boost_for, EvidenceAggregator, EvidenceAssessment};
pub use queries::{QueryAttempt, QueryGenerator, QueryPlan, MAX_QUERIES_PER_FACT};
pub use reclassify::Reclassifier;
pub use search::{
    relevance_score, EvidenceCandidate, HttpSearchClient, MockSearchClient, SearchClient,
    SearchExecutor, SearchHit,
};
pub use types::{EvidenceItem, VerificationResult};
