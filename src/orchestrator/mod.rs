//! The planning orchestrator: an adaptive state machine that decomposes
//! an objective, dispatches crawl work over the bus, drives extraction,
//! classification and verification, and decides to refine, explore, or
//! synthesize.

mod decompose;
mod machine;
mod signal;
mod state;

pub use decompose::{decompose, keyword_decompose, subtask_priority};
pub use machine::{
    decide_next, EvaluationDecision, InvestigationOutcome, OrchestratorDeps,
    PlanningOrchestrator, Synthesis, SIGNAL_STRONG, SIGNAL_WEAK,
};
pub use signal::{
    coverage, gather_findings, novelty, signal_strength, CoverageSnapshot, FindingSnapshot,
};
pub use state::{Checkpoint, InvestigationState, OrchestratorPhase, Subtask};
