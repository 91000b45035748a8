//! The reclassifier: verification outcomes applied back onto
//! classifications.
//!
//! PENDING -> IN_PROGRESS -> {CONFIRMED, REFUTED, UNVERIFIABLE,
//! SUPERSEDED}. Terminal transitions copy `dubious_flags` into
//! `origin_dubious_flags` before clearing them, re-assess the impact tier
//! with the new evidence, and append history. Critical-tier facts always
//! raise the human-review gate; their reclassification is not final until
//! the review bit is satisfied.

use std::sync::Arc;

use tracing::info;

use crate::classify::{
    ContradictionType, FactClassification, ImpactModel, ImpactTier, VerificationStatus,
};
use crate::fact::{ExtractedFact, FactId};
use crate::store::{ClassificationStore, FactStore, VerificationStore};

use crate::error::Result;

use super::evidence::EvidenceAssessment;
use super::types::VerificationResult;

/// Evidence-driven score bump applied when re-assessing impact after
/// confirmation with high-authority support.
const EVIDENCE_IMPACT_BUMP: f64 = 0.1;

/// Applies verification outcomes to the classification and verification
/// stores.
pub struct Reclassifier {
    classifications: Arc<ClassificationStore>,
    verifications: Arc<VerificationStore>,
    facts: Arc<FactStore>,
    impact: ImpactModel,
    human_review_for_critical: bool,
}

impl Reclassifier {
    pub fn new(
        classifications: Arc<ClassificationStore>,
        verifications: Arc<VerificationStore>,
        facts: Arc<FactStore>,
        human_review_for_critical: bool,
    ) -> Self {
        Self {
            classifications,
            verifications,
            facts,
            impact: ImpactModel::new(),
            human_review_for_critical,
        }
    }

    /// PENDING -> IN_PROGRESS.
    pub fn start(&self, fact_id: FactId) -> Result<FactClassification> {
        self.classifications
            .apply(fact_id, "verification_started", |c| {
                c.verification_status = VerificationStatus::InProgress;
            })
    }

    /// Cancellation: IN_PROGRESS -> PENDING so the fact can resume later.
    pub fn revert_to_pending(&self, fact_id: FactId) -> Result<FactClassification> {
        self.classifications
            .apply(fact_id, "verification_cancelled", |c| {
                c.verification_status = VerificationStatus::Pending;
            })
    }

    fn finalize(
        &self,
        fact_id: FactId,
        status: VerificationStatus,
        trigger: &str,
        objective: &str,
        assessment: Option<&EvidenceAssessment>,
    ) -> Result<FactClassification> {
        let reassessed_tier = match (status, assessment, self.facts.get(fact_id)) {
            (VerificationStatus::Confirmed, Some(assessment), Some(fact)) => {
                Some(self.reassess_impact(&fact, objective, assessment))
            }
            _ => None,
        };

        let human_review_for_critical = self.human_review_for_critical;
        let updated = self.classifications.apply(fact_id, trigger, move |c| {
            c.origin_dubious_flags = c.dubious_flags.clone();
            c.dubious_flags.clear();
            c.verification_status = status;
            if let Some(tier) = reassessed_tier {
                c.impact_tier = tier;
            }
            if human_review_for_critical && c.impact_tier == ImpactTier::Critical {
                c.requires_human_review = true;
            }
        })?;

        info!(fact = %fact_id, status = ?status, "fact reclassified");
        Ok(updated)
    }

    /// Re-assess the impact tier in light of confirming evidence.
    fn reassess_impact(
        &self,
        fact: &ExtractedFact,
        objective: &str,
        assessment: &EvidenceAssessment,
    ) -> ImpactTier {
        let mut assessment_score = self.impact.assess(fact, objective).score;
        let high_authority_support = assessment
            .supporting
            .iter()
            .any(|e| e.authority >= 0.85);
        if high_authority_support {
            assessment_score += EVIDENCE_IMPACT_BUMP;
        }
        if assessment_score >= crate::classify::CRITICAL_THRESHOLD {
            ImpactTier::Critical
        } else {
            ImpactTier::LessCritical
        }
    }

    /// Record a terminal result and apply its classification transition.
    fn record(&self, mut result: VerificationResult) -> Result<VerificationResult> {
        let classification = self.classifications.get(result.fact_id);
        if let Some(c) = &classification {
            if self.human_review_for_critical && c.impact_tier == ImpactTier::Critical {
                result.requires_human_review = true;
            }
        }
        self.verifications.record(result.clone());
        Ok(result)
    }

    /// Evidence confirms the claim.
    pub fn confirm(
        &self,
        fact_id: FactId,
        objective: &str,
        assessment: &EvidenceAssessment,
        attempts: u32,
        queries: Vec<String>,
    ) -> Result<VerificationResult> {
        let original = self
            .classifications
            .get(fact_id)
            .map(|c| c.credibility_score)
            .unwrap_or(0.0);
        self.finalize(
            fact_id,
            VerificationStatus::Confirmed,
            "verification_confirmed",
            objective,
            Some(assessment),
        )?;

        let investigation_id = self
            .facts
            .investigation_of(fact_id)
            .unwrap_or_default();
        let result = VerificationResult::new(
            fact_id,
            investigation_id,
            VerificationStatus::Confirmed,
            original,
            assessment.confidence_boost,
        )
        .with_evidence(assessment.supporting.clone(), assessment.refuting.clone())
        .with_queries(attempts, queries);
        self.record(result)
    }

    /// Evidence refutes the claim.
    pub fn refute(
        &self,
        fact_id: FactId,
        objective: &str,
        assessment: &EvidenceAssessment,
        attempts: u32,
        queries: Vec<String>,
    ) -> Result<VerificationResult> {
        let original = self
            .classifications
            .get(fact_id)
            .map(|c| c.credibility_score)
            .unwrap_or(0.0);
        self.finalize(
            fact_id,
            VerificationStatus::Refuted,
            "verification_refuted",
            objective,
            None,
        )?;

        let investigation_id = self.facts.investigation_of(fact_id).unwrap_or_default();
        let result = VerificationResult::new(
            fact_id,
            investigation_id,
            VerificationStatus::Refuted,
            original,
            0.0,
        )
        .with_evidence(assessment.supporting.clone(), assessment.refuting.clone())
        .with_queries(attempts, queries);
        self.record(result)
    }

    /// Attempts exhausted without resolution. The dubious flags stay live
    /// (nothing was cleared, so nothing moves to the origin set).
    pub fn unverifiable(
        &self,
        fact_id: FactId,
        attempts: u32,
        queries: Vec<String>,
    ) -> Result<VerificationResult> {
        let original = self
            .classifications
            .get(fact_id)
            .map(|c| c.credibility_score)
            .unwrap_or(0.0);
        self.classifications
            .apply(fact_id, "verification_unverifiable", |c| {
                c.verification_status = VerificationStatus::Unverifiable;
            })?;

        let investigation_id = self.facts.investigation_of(fact_id).unwrap_or_default();
        let result = VerificationResult::new(
            fact_id,
            investigation_id,
            VerificationStatus::Unverifiable,
            original,
            0.0,
        )
        .with_queries(attempts, queries);
        self.record(result)
    }

    /// ANOMALY resolution: the confirmed winner settles the loser's fate.
    /// Temporal contradictions supersede (was true, no longer current);
    /// all other types refute. Winner and loser results are linked both
    /// ways.
    pub fn resolve_anomaly(
        &self,
        winner: FactId,
        loser: FactId,
        contradiction_type: ContradictionType,
        objective: &str,
        assessment: &EvidenceAssessment,
        attempts: u32,
        queries: Vec<String>,
    ) -> Result<VerificationResult> {
        let mut winner_result =
            self.confirm(winner, objective, assessment, attempts, queries)?;
        winner_result.related_fact_id = Some(loser);
        winner_result.contradiction_type = Some(contradiction_type);
        self.verifications.record(winner_result.clone());

        // A loser that was independently confirmed stays confirmed; the
        // unresolved conflict is left for synthesis.
        let loser_confirmed = self
            .classifications
            .get(loser)
            .map(|c| c.verification_status == VerificationStatus::Confirmed)
            .unwrap_or(false);
        if !loser_confirmed {
            let loser_status = match contradiction_type {
                ContradictionType::Temporal => VerificationStatus::Superseded,
                _ => VerificationStatus::Refuted,
            };
            let trigger = match loser_status {
                VerificationStatus::Superseded => "superseded_by_later_fact",
                _ => "refuted_by_anomaly_resolution",
            };
            self.finalize(loser, loser_status, trigger, objective, None)?;

            let investigation_id = self.facts.investigation_of(loser).unwrap_or_default();
            let loser_result = VerificationResult::new(
                loser,
                investigation_id,
                loser_status,
                self.classifications
                    .get(loser)
                    .map(|c| c.credibility_score)
                    .unwrap_or(0.0),
                0.0,
            )
            .with_related(winner, contradiction_type);
            self.record(loser_result)?;
        }

        Ok(winner_result)
    }
}
