//! Orchestrator state: phases, subtasks, checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::Contradiction;
use crate::crawler::SourceType;
use crate::investigation::InvestigationId;

use super::signal::{CoverageSnapshot, FindingSnapshot};

/// Nodes of the planning state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorPhase {
    AnalyzeObjective,
    AssignAgents,
    CoordinateExecution,
    EvaluateFindings,
    RefineApproach,
    SynthesizeResults,
    End,
}

/// One decomposed unit of crawl work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub description: String,
    pub source_type: SourceType,
    pub keywords: Vec<String>,
    pub priority: f64,
    pub retries: u32,
}

impl Subtask {
    pub fn query(&self) -> String {
        self.keywords.join(" ")
    }
}

/// A checkpoint taken after each node so mid-run cancellation does not
/// corrupt the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub phase: OrchestratorPhase,
    pub iteration: u32,
    pub refinement_count: u32,
    pub at: DateTime<Utc>,
}

/// Mutable state of one orchestrator run.
#[derive(Debug, Clone)]
pub struct InvestigationState {
    pub investigation_id: InvestigationId,
    pub objective: String,
    pub phase: OrchestratorPhase,
    /// Completed plan-execute-evaluate iterations.
    pub iteration: u32,
    pub refinement_count: u32,
    pub subtasks: Vec<Subtask>,
    /// Findings accumulated across iterations, for novelty comparison.
    pub accumulated: FindingSnapshot,
    pub signal_strength: f64,
    pub coverage: CoverageSnapshot,
    /// Contradictions surfaced during evaluation; forwarded untouched to
    /// synthesis, never resolved here.
    pub conflicts: Vec<Contradiction>,
    pub checkpoints: Vec<Checkpoint>,
}

impl InvestigationState {
    pub fn new(investigation_id: InvestigationId, objective: impl Into<String>) -> Self {
        Self {
            investigation_id,
            objective: objective.into(),
            phase: OrchestratorPhase::AnalyzeObjective,
            iteration: 0,
            refinement_count: 0,
            subtasks: Vec::new(),
            accumulated: FindingSnapshot::default(),
            signal_strength: 0.0,
            coverage: CoverageSnapshot::default(),
            conflicts: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    /// Record a checkpoint for the phase just completed.
    pub fn checkpoint(&mut self) {
        self.checkpoints.push(Checkpoint {
            phase: self.phase,
            iteration: self.iteration,
            refinement_count: self.refinement_count,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoints_capture_progress() {
        let mut state = InvestigationState::new(InvestigationId::new(), "objective");
        state.checkpoint();
        state.phase = OrchestratorPhase::AssignAgents;
        state.iteration = 1;
        state.checkpoint();

        assert_eq!(state.checkpoints.len(), 2);
        assert_eq!(state.checkpoints[0].phase, OrchestratorPhase::AnalyzeObjective);
        assert_eq!(state.checkpoints[1].phase, OrchestratorPhase::AssignAgents);
        assert_eq!(state.checkpoints[1].iteration, 1);
    }
}
