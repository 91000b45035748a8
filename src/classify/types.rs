//! Classification records: impact tier, dubious flags, credibility
//! breakdown, and the mutable verification lifecycle attached to each fact.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fact::FactId;
use crate::investigation::InvestigationId;

/// Impact tier; critical facts gate on human review after verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactTier {
    Critical,
    LessCritical,
}

/// The dubious taxonomy. Gates are Boolean; multiple flags may hold at
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DubiousFlag {
    /// Echo without a root: high hop count, no primary source.
    Phantom,
    /// Vague claim or vague attribution.
    Fog,
    /// Contradicted by another fact in the investigation.
    Anomaly,
    /// Source credibility below the trust floor. Batch handling only.
    Noise,
}

impl std::fmt::Display for DubiousFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Phantom => write!(f, "phantom"),
            Self::Fog => write!(f, "fog"),
            Self::Anomaly => write!(f, "anomaly"),
            Self::Noise => write!(f, "noise"),
        }
    }
}

/// Verification lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    InProgress,
    Confirmed,
    Refuted,
    Unverifiable,
    /// Was true; overtaken by a later, verified update.
    Superseded,
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Refuted | Self::Unverifiable | Self::Superseded
        )
    }
}

/// The four contradiction types the detector distinguishes. Temporal
/// contradictions resolve to SUPERSEDED rather than REFUTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionType {
    Negation,
    Attribution,
    Numeric,
    Temporal,
}

/// A detected contradiction between two facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub fact_a: FactId,
    pub fact_b: FactId,
    pub contradiction_type: ContradictionType,
    pub confidence: f64,
    pub detail: String,
}

/// A contradiction as seen from one of its two facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionRef {
    pub other_fact: FactId,
    pub contradiction_type: ContradictionType,
    pub confidence: f64,
}

/// One source's contribution to the credibility total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerSourceScore {
    pub source_id: String,
    /// Attribution-chain root this source traces to.
    pub root: String,
    pub source_cred: f64,
    pub proximity: f64,
    pub precision: f64,
    /// `source_cred * proximity * precision`.
    pub score: f64,
}

/// Full decomposition of the credibility formula for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredibilityBreakdown {
    pub per_source: Vec<PerSourceScore>,
    /// Best root-cluster score.
    pub root_score: f64,
    /// Sum of echo-cluster scores.
    pub echo_sum: f64,
    /// `alpha * log10(1 + echo_sum)`.
    pub echo_bonus: f64,
    /// Final score, clamped to [0, 1].
    pub total: f64,
    pub unique_roots: usize,
    /// N >= 4 sources all tracing to one non-primary root.
    pub circular_warning: bool,
}

/// Why a dubious flag fired: the gate's trigger values plus a
/// human-readable explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagReasoning {
    pub flag: DubiousFlag,
    pub trigger_values: Value,
    pub explanation: String,
}

/// Append-only audit entry for every classification transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub previous_state: String,
    pub trigger: String,
}

/// The classification attached to a fact. One per fact per investigation;
/// created by the classifier, mutated by the verifier, with every
/// transition captured in `history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactClassification {
    pub fact_id: FactId,
    pub investigation_id: InvestigationId,
    pub impact_tier: ImpactTier,
    pub impact_score: f64,
    pub dubious_flags: BTreeSet<DubiousFlag>,
    /// Flags the fact entered verification with; preserved after
    /// verification clears `dubious_flags`.
    pub origin_dubious_flags: BTreeSet<DubiousFlag>,
    /// `impact_factor * fixability`; drives the verification queue.
    pub priority_score: f64,
    pub credibility_score: f64,
    pub credibility_breakdown: CredibilityBreakdown,
    pub classification_reasoning: Vec<FlagReasoning>,
    pub contradictions: Vec<ContradictionRef>,
    pub history: Vec<HistoryEntry>,
    pub verification_status: VerificationStatus,
    pub requires_human_review: bool,
    pub human_review_completed: bool,
    pub classified_at: DateTime<Utc>,
}

impl FactClassification {
    /// Whether the only dubious flag is NOISE. Such facts never enter the
    /// verification queue.
    pub fn is_noise_only(&self) -> bool {
        self.dubious_flags.len() == 1 && self.dubious_flags.contains(&DubiousFlag::Noise)
    }

    /// Whether the fact qualifies for the verification priority queue.
    pub fn is_verifiable(&self) -> bool {
        !self.dubious_flags.is_empty()
            && !self.is_noise_only()
            && self.verification_status == VerificationStatus::Pending
    }

    /// Append a history entry recording the state being left behind.
    pub fn record_transition(&mut self, trigger: impl Into<String>) {
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            previous_state: format!(
                "{:?}/{:?}",
                self.verification_status, self.dubious_flags
            ),
            trigger: trigger.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(flags: &[DubiousFlag]) -> FactClassification {
        FactClassification {
            fact_id: FactId::new(),
            investigation_id: InvestigationId::new(),
            impact_tier: ImpactTier::LessCritical,
            impact_score: 0.4,
            dubious_flags: flags.iter().copied().collect(),
            origin_dubious_flags: BTreeSet::new(),
            priority_score: 0.0,
            credibility_score: 0.5,
            credibility_breakdown: CredibilityBreakdown {
                per_source: Vec::new(),
                root_score: 0.5,
                echo_sum: 0.0,
                echo_bonus: 0.0,
                total: 0.5,
                unique_roots: 1,
                circular_warning: false,
            },
            classification_reasoning: Vec::new(),
            contradictions: Vec::new(),
            history: Vec::new(),
            verification_status: VerificationStatus::Pending,
            requires_human_review: false,
            human_review_completed: false,
            classified_at: Utc::now(),
        }
    }

    #[test]
    fn noise_only_is_excluded_from_queue() {
        assert!(classification(&[DubiousFlag::Noise]).is_noise_only());
        assert!(!classification(&[DubiousFlag::Noise]).is_verifiable());
        // NOISE plus anything else does qualify.
        let mixed = classification(&[DubiousFlag::Noise, DubiousFlag::Fog]);
        assert!(!mixed.is_noise_only());
        assert!(mixed.is_verifiable());
        assert!(!classification(&[]).is_verifiable());
    }

    #[test]
    fn history_captures_previous_state() {
        let mut c = classification(&[DubiousFlag::Phantom]);
        c.record_transition("verification_started");
        assert_eq!(c.history.len(), 1);
        assert!(c.history[0].previous_state.contains("Pending"));
        assert_eq!(c.history[0].trigger, "verification_started");
    }

    #[test]
    fn terminal_states() {
        assert!(VerificationStatus::Confirmed.is_terminal());
        assert!(VerificationStatus::Superseded.is_terminal());
        assert!(!VerificationStatus::InProgress.is_terminal());
        assert!(!VerificationStatus::Pending.is_terminal());
    }
}
