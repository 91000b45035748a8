//! Classification engine: credibility, impact tier, Boolean dubious
//! gates, contradiction wiring, and priority computation.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde_json::json;
use tracing::info;

use crate::bus::{topics, MessageBus};
use crate::fact::ExtractedFact;
use crate::investigation::InvestigationId;
use crate::store::{ClassificationStore, FactStore};

use super::contradiction::ContradictionDetector;
use super::credibility::CredibilityModel;
use super::impact::ImpactModel;
use super::types::{
    Contradiction, ContradictionRef, DubiousFlag, FactClassification, FlagReasoning, ImpactTier,
    VerificationStatus,
};

/// PHANTOM gate: echoes deeper than this with no primary source.
const PHANTOM_HOP_THRESHOLD: u32 = 2;
/// FOG gate: clarity below this.
const FOG_CLARITY_THRESHOLD: f64 = 0.5;
/// NOISE gate: credibility below this.
const NOISE_CREDIBILITY_THRESHOLD: f64 = 0.3;

fn vague_attribution_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(allegedly|reportedly|sources say|sources familiar|officials familiar with|it is believed|rumou?red|according to reports)\b",
        )
        .expect("static regex")
    })
}

/// Fixability of a flag set: how likely verification is to resolve it.
pub fn fixability(flags: &BTreeSet<DubiousFlag>) -> f64 {
    if flags.is_empty() {
        return 0.0;
    }
    let best = flags
        .iter()
        .filter_map(|flag| match flag {
            DubiousFlag::Fog => Some(0.9),
            DubiousFlag::Anomaly => Some(0.8),
            DubiousFlag::Phantom => Some(0.6),
            DubiousFlag::Noise => None,
        })
        .fold(f64::NAN, f64::max);
    if best.is_nan() {
        // NOISE-only.
        0.1
    } else {
        best
    }
}

/// Outcome summary for one classification run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationReport {
    pub classified: usize,
    pub dubious: usize,
    pub critical: usize,
    pub contradictions: usize,
}

impl std::fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Classification: {} facts, {} dubious, {} critical, {} contradictions",
            self.classified, self.dubious, self.critical, self.contradictions,
        )
    }
}

/// The classification engine.
pub struct ClassificationEngine {
    credibility: CredibilityModel,
    impact: ImpactModel,
    detector: ContradictionDetector,
    facts: Arc<FactStore>,
    classifications: Arc<ClassificationStore>,
    bus: MessageBus,
}

impl ClassificationEngine {
    pub fn new(
        credibility: CredibilityModel,
        facts: Arc<FactStore>,
        classifications: Arc<ClassificationStore>,
        bus: MessageBus,
    ) -> Self {
        Self {
            credibility,
            impact: ImpactModel::new(),
            detector: ContradictionDetector::new(),
            facts,
            classifications,
            bus,
        }
    }

    /// Classify every canonical fact in an investigation and publish
    /// `classification.complete`.
    pub fn classify_investigation(
        &self,
        investigation_id: InvestigationId,
        objective: &str,
    ) -> ClassificationReport {
        // Variants are represented by their canonical fact.
        let canonical: Vec<ExtractedFact> = self
            .facts
            .facts_for(investigation_id)
            .into_iter()
            .filter(|f| {
                self.facts
                    .canonical_for_hash(investigation_id, &f.content_hash)
                    == Some(f.fact_id)
            })
            .collect();

        let contradictions = self.detector.detect(&canonical);
        let mut report = ClassificationReport {
            contradictions: contradictions.len(),
            ..Default::default()
        };

        for fact in &canonical {
            let classification =
                self.classify_fact(investigation_id, fact, objective, &contradictions);
            report.classified += 1;
            if !classification.dubious_flags.is_empty() {
                report.dubious += 1;
            }
            if classification.impact_tier == ImpactTier::Critical {
                report.critical += 1;
            }
            self.classifications.upsert(classification);
        }

        info!(investigation = %investigation_id, "{report}");
        self.bus.publish(
            topics::CLASSIFICATION_COMPLETE,
            json!({
                "investigation_id": investigation_id.to_string(),
                "classified": report.classified,
                "dubious": report.dubious,
                "critical": report.critical,
                "contradictions": report.contradictions,
            }),
        );
        report
    }

    fn classify_fact(
        &self,
        investigation_id: InvestigationId,
        fact: &ExtractedFact,
        objective: &str,
        contradictions: &[Contradiction],
    ) -> FactClassification {
        let breakdown = self.credibility.assess(fact);
        let impact = self.impact.assess(fact, objective);

        let fact_contradictions: Vec<ContradictionRef> = contradictions
            .iter()
            .filter_map(|c| {
                if c.fact_a == fact.fact_id {
                    Some(ContradictionRef {
                        other_fact: c.fact_b,
                        contradiction_type: c.contradiction_type,
                        confidence: c.confidence,
                    })
                } else if c.fact_b == fact.fact_id {
                    Some(ContradictionRef {
                        other_fact: c.fact_a,
                        contradiction_type: c.contradiction_type,
                        confidence: c.confidence,
                    })
                } else {
                    None
                }
            })
            .collect();

        let mut flags = BTreeSet::new();
        let mut reasoning = Vec::new();

        // PHANTOM: echo without root.
        let has_primary = fact.provenance.has_primary_source();
        if fact.provenance.hop_count > PHANTOM_HOP_THRESHOLD && !has_primary {
            flags.insert(DubiousFlag::Phantom);
            reasoning.push(FlagReasoning {
                flag: DubiousFlag::Phantom,
                trigger_values: json!({
                    "hop_count": fact.provenance.hop_count,
                    "primary_source": serde_json::Value::Null,
                }),
                explanation: format!(
                    "claim is {} hops from origin with no primary source in the chain",
                    fact.provenance.hop_count
                ),
            });
        }

        // FOG: speaker mumbling.
        let plain_text = fact.plain_claim_text();
        let vague_match = vague_attribution_regex()
            .find(&plain_text)
            .map(|m| m.as_str().to_string());
        if fact.quality.claim_clarity < FOG_CLARITY_THRESHOLD || vague_match.is_some() {
            flags.insert(DubiousFlag::Fog);
            reasoning.push(FlagReasoning {
                flag: DubiousFlag::Fog,
                trigger_values: json!({
                    "claim_clarity": fact.quality.claim_clarity,
                    "vague_attribution": vague_match,
                }),
                explanation: "claim is vague or vaguely attributed".to_string(),
            });
        }

        // ANOMALY: trusted systems disagree.
        if !fact_contradictions.is_empty() {
            flags.insert(DubiousFlag::Anomaly);
            reasoning.push(FlagReasoning {
                flag: DubiousFlag::Anomaly,
                trigger_values: json!({
                    "contradiction_count": fact_contradictions.len(),
                    "types": fact_contradictions
                        .iter()
                        .map(|c| c.contradiction_type)
                        .collect::<Vec<_>>(),
                }),
                explanation: format!(
                    "contradicted by {} other fact(s)",
                    fact_contradictions.len()
                ),
            });
        }

        // NOISE: known unreliable.
        if breakdown.total < NOISE_CREDIBILITY_THRESHOLD {
            flags.insert(DubiousFlag::Noise);
            reasoning.push(FlagReasoning {
                flag: DubiousFlag::Noise,
                trigger_values: json!({ "source_credibility": breakdown.total }),
                explanation: "source credibility below trust floor".to_string(),
            });
        }

        let impact_factor = match impact.tier {
            ImpactTier::Critical => 1.0,
            ImpactTier::LessCritical => 0.5,
        };
        let priority_score = impact_factor * fixability(&flags);

        FactClassification {
            fact_id: fact.fact_id,
            investigation_id,
            impact_tier: impact.tier,
            impact_score: impact.score,
            dubious_flags: flags,
            origin_dubious_flags: BTreeSet::new(),
            priority_score,
            credibility_score: breakdown.total,
            credibility_breakdown: breakdown,
            classification_reasoning: reasoning,
            contradictions: fact_contradictions,
            history: Vec::new(),
            verification_status: VerificationStatus::Pending,
            requires_human_review: false,
            human_review_completed: false,
            classified_at: Utc::now(),
        }
    }
}
