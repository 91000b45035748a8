//! Verification result records and evidence items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{ContradictionType, VerificationStatus};
use crate::fact::FactId;
use crate::investigation::InvestigationId;
use crate::web::SourceClass;

/// One piece of search-backed evidence for or against a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub url: String,
    pub domain: String,
    pub source_class: SourceClass,
    pub authority: f64,
    pub snippet: String,
    /// True = supports the claim, false = refutes it.
    pub supports: bool,
    /// Keyword overlap between the query and the snippet, in [0, 1].
    pub relevance: f64,
    pub retrieved_at: DateTime<Utc>,
}

/// Record of one verification attempt reaching a terminal classification
/// change. Stored indefinitely for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub fact_id: FactId,
    pub investigation_id: InvestigationId,
    pub status: VerificationStatus,
    pub original_confidence: f64,
    pub confidence_boost: f64,
    /// `original + boost`, capped at 1.0. Auto-computed.
    pub final_confidence: f64,
    pub supporting_evidence: Vec<EvidenceItem>,
    pub refuting_evidence: Vec<EvidenceItem>,
    pub query_attempts: u32,
    pub queries_used: Vec<String>,
    /// The other fact in an ANOMALY resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_fact_id: Option<FactId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contradiction_type: Option<ContradictionType>,
    pub requires_human_review: bool,
    pub human_review_completed: bool,
    pub verified_at: DateTime<Utc>,
}

impl VerificationResult {
    pub fn new(
        fact_id: FactId,
        investigation_id: InvestigationId,
        status: VerificationStatus,
        original_confidence: f64,
        confidence_boost: f64,
    ) -> Self {
        Self {
            fact_id,
            investigation_id,
            status,
            original_confidence,
            confidence_boost,
            final_confidence: (original_confidence + confidence_boost).min(1.0),
            supporting_evidence: Vec::new(),
            refuting_evidence: Vec::new(),
            query_attempts: 0,
            queries_used: Vec::new(),
            related_fact_id: None,
            contradiction_type: None,
            requires_human_review: false,
            human_review_completed: false,
            verified_at: Utc::now(),
        }
    }

    pub fn with_evidence(
        mut self,
        supporting: Vec<EvidenceItem>,
        refuting: Vec<EvidenceItem>,
    ) -> Self {
        self.supporting_evidence = supporting;
        self.refuting_evidence = refuting;
        self
    }

    pub fn with_queries(mut self, attempts: u32, queries: Vec<String>) -> Self {
        self.query_attempts = attempts;
        self.queries_used = queries;
        self
    }

    pub fn with_related(mut self, other: FactId, contradiction_type: ContradictionType) -> Self {
        self.related_fact_id = Some(other);
        self.contradiction_type = Some(contradiction_type);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_confidence_caps_at_one() {
        let result = VerificationResult::new(
            FactId::new(),
            InvestigationId::new(),
            VerificationStatus::Confirmed,
            0.9,
            0.55,
        );
        assert_eq!(result.final_confidence, 1.0);

        let modest = VerificationResult::new(
            FactId::new(),
            InvestigationId::new(),
            VerificationStatus::Confirmed,
            0.4,
            0.25,
        );
        assert!((modest.final_confidence - 0.65).abs() < 1e-9);
    }
}
