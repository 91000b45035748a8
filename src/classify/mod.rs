//! Classification: credibility scoring with echo dampening, impact
//! tiers, the dubious taxonomy, and contradiction detection.

mod contradiction;
mod credibility;
mod engine;
mod impact;
mod types;

pub use contradiction::ContradictionDetector;
pub use credibility::CredibilityModel;
pub use engine::{fixability, ClassificationEngine, ClassificationReport};
pub use impact::{ImpactAssessment, ImpactModel, CRITICAL_THRESHOLD};
pub use types::{
    Contradiction, ContradictionRef, ContradictionType, CredibilityBreakdown, DubiousFlag,
    FactClassification, FlagReasoning, HistoryEntry, ImpactTier, PerSourceScore,
    VerificationStatus,
};
