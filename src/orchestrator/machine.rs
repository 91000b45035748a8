//! The planning state machine.
//!
//! `analyze_objective -> assign_agents -> coordinate_execution ->
//! evaluate_findings -> {refine_approach | synthesize_results | end}`.
//! The evaluation node's conditional transition is a pure function
//! ([`decide_next`]) so termination is checkable in isolation: the run
//! always reaches synthesis within the refinement budget and cannot hang.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bus::{topics, MessageBus};
use crate::cancel::CancelToken;
use crate::classify::{ClassificationEngine, Contradiction};
use crate::config::{CoverageTargets, OrchestratorConfig, SiftConfig};
use crate::crawler::{crawl_topic, CrawlRequest, SourceType};
use crate::error::{Error, Result};
use crate::fact::{ExtractionPipeline, FactId};
use crate::investigation::{Investigation, InvestigationId};
use crate::llm::CompletionClient;
use crate::registry::{AgentId, AgentRegistry};
use crate::store::{
    ArticleStore, ClassificationCounts, ClassificationStore, FactStore, VerificationStore,
};
use crate::verify::VerificationEngine;

use super::decompose::decompose;
use super::signal::{coverage, gather_findings, novelty, signal_strength, CoverageSnapshot};
use super::state::{InvestigationState, OrchestratorPhase, Subtask};

/// Signal at or above this counts as strong.
pub const SIGNAL_STRONG: f64 = 0.5;
/// Signal below this counts as weak.
pub const SIGNAL_WEAK: f64 = 0.3;
/// Exploration (new assignment) is only tried in the first iterations.
const MAX_EXPLORE_ITERATIONS: u32 = 3;
/// Iterations past this always synthesize.
const MAX_ITERATIONS: u32 = 5;
/// Same-type subtask count that triggers a sub-orchestrator.
const DELEGATION_THRESHOLD: usize = 3;
/// Hierarchical delegation depth cap.
const MAX_DELEGATION_DEPTH: u32 = 2;

/// What the evaluation node decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationDecision {
    Synthesize,
    Refine,
    Explore,
}

/// The evaluation node's conditional transition, checked in order.
pub fn decide_next(
    refinement_count: u32,
    max_refinements: u32,
    novelty_score: f64,
    novelty_threshold: f64,
    iteration: u32,
    signal: f64,
    coverage_met: bool,
) -> EvaluationDecision {
    // Hard stop: the refinement budget is never exceeded.
    if refinement_count >= max_refinements {
        return EvaluationDecision::Synthesize;
    }
    if novelty_score < novelty_threshold || iteration > MAX_ITERATIONS {
        return EvaluationDecision::Synthesize;
    }
    if signal >= SIGNAL_STRONG && !coverage_met {
        return EvaluationDecision::Refine;
    }
    if coverage_met {
        return EvaluationDecision::Synthesize;
    }
    if signal < SIGNAL_WEAK && iteration < MAX_EXPLORE_ITERATIONS {
        return EvaluationDecision::Explore;
    }
    EvaluationDecision::Synthesize
}

/// Everything the orchestrator drives, injected explicitly.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub bus: MessageBus,
    pub registry: Arc<AgentRegistry>,
    pub articles: Arc<ArticleStore>,
    pub facts: Arc<FactStore>,
    pub classifications: Arc<ClassificationStore>,
    pub verifications: Arc<VerificationStore>,
    pub extraction: Arc<ExtractionPipeline>,
    pub classifier: Arc<ClassificationEngine>,
    pub verifier: Arc<VerificationEngine>,
    /// Completion capability for decomposition; the keyword fallback runs
    /// without it.
    pub llm: Option<Arc<dyn CompletionClient>>,
}

/// Synthesis output: aggregated results plus conflicts forwarded
/// untouched.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub confirmed_facts: Vec<FactId>,
    pub conflicts: Vec<Contradiction>,
    pub counts: ClassificationCounts,
    pub coverage: CoverageSnapshot,
    pub signal_strength: f64,
}

/// Result of a full orchestrator run.
#[derive(Debug, Clone)]
pub struct InvestigationOutcome {
    pub investigation: Investigation,
    pub state: InvestigationState,
    pub synthesis: Synthesis,
}

/// The planning orchestrator.
pub struct PlanningOrchestrator {
    deps: OrchestratorDeps,
    config: OrchestratorConfig,
    targets: CoverageTargets,
    dispatch_timeout: Duration,
    depth: u32,
    /// A sub-orchestrator is scoped to one source class.
    scope: Option<SourceType>,
}

impl PlanningOrchestrator {
    pub fn new(deps: OrchestratorDeps, config: &SiftConfig) -> Self {
        Self {
            deps,
            config: config.orchestrator.clone(),
            targets: config.coverage.clone(),
            dispatch_timeout: Duration::from_secs(30),
            depth: 0,
            scope: None,
        }
    }

    /// Shorten the crawl-completion wait (tests).
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// A sub-orchestrator scoped to one source class. Exposes the same
    /// interface; the parent treats it as an ordinary worker.
    fn sub_orchestrator(&self, scope: SourceType) -> Self {
        Self {
            deps: self.deps.clone(),
            config: self.config.clone(),
            targets: self.targets.clone(),
            dispatch_timeout: self.dispatch_timeout,
            depth: self.depth + 1,
            scope: Some(scope),
        }
    }

    /// Run a full investigation.
    pub async fn run(&self, objective: &str, cancel: &CancelToken) -> Result<InvestigationOutcome> {
        if objective.trim().is_empty() {
            return Err(Error::validation("investigation objective is empty"));
        }

        let investigation = Investigation::new(objective);
        let mut state = InvestigationState::new(investigation.id, objective);
        self.deps.bus.publish(
            topics::INVESTIGATION_START,
            json!({
                "investigation_id": investigation.id.to_string(),
                "objective": objective,
            }),
        );

        // The loop is bounded even if the decision table regresses.
        let max_steps = (self.config.max_refinements + MAX_ITERATIONS + 4) * 6;
        let mut synthesis = None;

        for _step in 0..max_steps {
            cancel.check()?;
            match state.phase {
                OrchestratorPhase::AnalyzeObjective => {
                    state.subtasks =
                        decompose(self.deps.llm.as_ref(), objective, &[]).await;
                    state.checkpoint();
                    state.phase = OrchestratorPhase::AssignAgents;
                }
                OrchestratorPhase::AssignAgents => {
                    state.subtasks.sort_by(|a, b| {
                        b.priority
                            .partial_cmp(&a.priority)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    if let Some(scope) = self.scope {
                        let scope_topic = crawl_topic(scope);
                        state
                            .subtasks
                            .retain(|s| crawl_topic(s.source_type) == scope_topic);
                    }
                    state.checkpoint();
                    state.phase = OrchestratorPhase::CoordinateExecution;
                }
                OrchestratorPhase::CoordinateExecution => {
                    self.coordinate(&mut state, cancel).await?;
                    state.iteration += 1;
                    state.checkpoint();
                    state.phase = OrchestratorPhase::EvaluateFindings;
                }
                OrchestratorPhase::EvaluateFindings => {
                    let decision = self.evaluate(&mut state);
                    state.checkpoint();
                    state.phase = match decision {
                        EvaluationDecision::Synthesize => OrchestratorPhase::SynthesizeResults,
                        EvaluationDecision::Refine => OrchestratorPhase::RefineApproach,
                        EvaluationDecision::Explore => {
                            let entities: Vec<String> =
                                state.accumulated.entities.iter().take(4).cloned().collect();
                            state.subtasks =
                                decompose(self.deps.llm.as_ref(), objective, &entities).await;
                            OrchestratorPhase::AssignAgents
                        }
                    };
                }
                OrchestratorPhase::RefineApproach => {
                    state.refinement_count += 1;
                    let entities: Vec<String> =
                        state.accumulated.entities.iter().take(4).cloned().collect();
                    state.subtasks =
                        decompose(self.deps.llm.as_ref(), objective, &entities).await;
                    for subtask in &mut state.subtasks {
                        subtask.retries = state.refinement_count;
                    }
                    info!(
                        investigation = %state.investigation_id,
                        refinement = state.refinement_count,
                        "refining approach"
                    );
                    state.checkpoint();
                    state.phase = OrchestratorPhase::AssignAgents;
                }
                OrchestratorPhase::SynthesizeResults => {
                    synthesis = Some(self.synthesize(&state));
                    state.checkpoint();
                    state.phase = OrchestratorPhase::End;
                }
                OrchestratorPhase::End => break,
            }
        }

        let synthesis = synthesis.unwrap_or_else(|| self.synthesize(&state));
        state.phase = OrchestratorPhase::End;
        info!(
            investigation = %state.investigation_id,
            iterations = state.iteration,
            refinements = state.refinement_count,
            confirmed = synthesis.confirmed_facts.len(),
            conflicts = synthesis.conflicts.len(),
            "investigation complete"
        );
        Ok(InvestigationOutcome {
            investigation,
            state,
            synthesis,
        })
    }

    /// Dispatch crawls (delegating large same-type groups), then drive
    /// extraction, classification, and verification.
    async fn coordinate(&self, state: &mut InvestigationState, cancel: &CancelToken) -> Result<()> {
        let investigation_id = state.investigation_id;

        let mut groups: HashMap<&'static str, Vec<Subtask>> = HashMap::new();
        for subtask in &state.subtasks {
            groups
                .entry(crawl_topic(subtask.source_type))
                .or_default()
                .push(subtask.clone());
        }

        for (_, group) in groups {
            cancel.check()?;
            if group.len() >= DELEGATION_THRESHOLD && self.depth < MAX_DELEGATION_DEPTH {
                let scope = group[0].source_type;
                let sub = self.sub_orchestrator(scope);
                self.deps.registry.register(
                    AgentId::new(format!("sub-orchestrator-{scope}-{}", self.depth + 1)),
                    format!("{scope} sub-orchestrator"),
                    vec!["orchestrate".to_string(), format!("fetch.{scope}")],
                );
                sub.dispatch_and_wait(investigation_id, &group, cancel).await?;
            } else {
                self.dispatch_and_wait(investigation_id, &group, cancel).await?;
            }
        }

        self.deps.extraction.run(investigation_id, cancel).await?;
        self.deps
            .classifier
            .classify_investigation(investigation_id, &state.objective);
        self.deps
            .verifier
            .run(investigation_id, &state.objective, cancel)
            .await?;
        Ok(())
    }

    /// Publish crawl requests and wait for completion/failure events from
    /// the cohort, bounded by the dispatch timeout.
    async fn dispatch_and_wait(
        &self,
        investigation_id: InvestigationId,
        subtasks: &[Subtask],
        cancel: &CancelToken,
    ) -> Result<usize> {
        // Subscribe before publishing so no completion is missed.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = self.deps.bus.subscribe_fn("crawler.*", move |msg| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg);
                Ok(())
            }
        });

        let mut expected = 0usize;
        for subtask in subtasks {
            let request = CrawlRequest::new(investigation_id, subtask.query());
            let delivered = self.deps.bus.publish(
                crawl_topic(subtask.source_type),
                serde_json::to_value(&request)?,
            );
            if delivered == 0 {
                warn!(
                    source_type = %subtask.source_type,
                    "no crawler subscribed for subtask, skipping"
                );
            }
            expected += delivered;
        }

        let deadline = tokio::time::Instant::now() + self.dispatch_timeout;
        let mut completed = 0usize;
        while completed < expected && !cancel.is_cancelled() {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(msg)) if msg.investigation_id() == Some(investigation_id) => {
                    completed += 1;
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }

        self.deps.bus.unsubscribe(subscription);
        Ok(completed)
    }

    /// The evaluation node: metrics, conflict accumulation, decision.
    fn evaluate(&self, state: &mut InvestigationState) -> EvaluationDecision {
        let snapshot = gather_findings(
            &self.deps.articles,
            &self.deps.facts,
            &self.deps.classifications,
            state.investigation_id,
        );
        let signal = signal_strength(&snapshot, &state.objective);
        let cov = coverage(&snapshot, &state.objective);
        let novelty_score = novelty(&snapshot, &state.accumulated);

        state.signal_strength = signal;
        state.coverage = cov;
        state.accumulated.merge(&snapshot);
        self.collect_conflicts(state);

        let decision = decide_next(
            state.refinement_count,
            self.config.max_refinements,
            novelty_score,
            self.config.diminishing_returns_threshold,
            state.iteration,
            signal,
            cov.meets(&self.targets),
        );
        info!(
            investigation = %state.investigation_id,
            signal,
            novelty = novelty_score,
            iteration = state.iteration,
            decision = ?decision,
            "findings evaluated"
        );
        decision
    }

    /// Accumulate contradictions surfaced by classification. No premature
    /// resolution: they are forwarded untouched to synthesis.
    fn collect_conflicts(&self, state: &mut InvestigationState) {
        let mut seen: std::collections::HashSet<(FactId, FactId)> = state
            .conflicts
            .iter()
            .map(|c| ordered_pair(c.fact_a, c.fact_b))
            .collect();

        for fact in self.deps.facts.facts_for(state.investigation_id) {
            let Some(classification) = self.deps.classifications.get(fact.fact_id) else {
                continue;
            };
            for reference in &classification.contradictions {
                let pair = ordered_pair(fact.fact_id, reference.other_fact);
                if seen.insert(pair) {
                    state.conflicts.push(Contradiction {
                        fact_a: fact.fact_id,
                        fact_b: reference.other_fact,
                        contradiction_type: reference.contradiction_type,
                        confidence: reference.confidence,
                        detail: String::new(),
                    });
                }
            }
        }
    }

    fn synthesize(&self, state: &InvestigationState) -> Synthesis {
        let counts = self.deps.classifications.counts(state.investigation_id);
        let confirmed_facts = self
            .deps
            .facts
            .facts_for(state.investigation_id)
            .into_iter()
            .filter(|f| {
                self.deps
                    .classifications
                    .get(f.fact_id)
                    .map(|c| {
                        c.verification_status == crate::classify::VerificationStatus::Confirmed
                    })
                    .unwrap_or(false)
            })
            .map(|f| f.fact_id)
            .collect();

        Synthesis {
            confirmed_facts,
            conflicts: state.conflicts.clone(),
            counts,
            coverage: state.coverage,
            signal_strength: state.signal_strength,
        }
    }
}

fn ordered_pair(a: FactId, b: FactId) -> (FactId, FactId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::CredibilityModel;
    use crate::config::ScoringConfig;
    use crate::fact::{FactConsolidator, FactExtractionAgent};
    use crate::limiter::HostRateLimiter;
    use crate::llm::MockCompletionClient;
    use crate::verify::{MockSearchClient, QueryGenerator, Reclassifier, SearchExecutor};
    use crate::web::{AuthorityScorer, ContextCoordinator};

    fn deps(llm: Option<Arc<dyn CompletionClient>>) -> OrchestratorDeps {
        let bus = MessageBus::new();
        let registry = Arc::new(AgentRegistry::new());
        let articles = Arc::new(ArticleStore::new());
        let facts = Arc::new(FactStore::new());
        let classifications = Arc::new(ClassificationStore::new());
        let verifications = Arc::new(VerificationStore::new());
        let scorer = Arc::new(AuthorityScorer::new());

        let extraction_client: Arc<dyn CompletionClient> = llm
            .clone()
            .unwrap_or_else(|| Arc::new(MockCompletionClient::new()));
        let agent = Arc::new(FactExtractionAgent::new(extraction_client, "mock-1", 12_000, 40));
        let consolidator = Arc::new(FactConsolidator::new(Arc::clone(&facts), 0.3));
        let context = Arc::new(ContextCoordinator::new(bus.clone()));
        let extraction = Arc::new(ExtractionPipeline::new(
            agent,
            Arc::clone(&articles),
            Arc::clone(&facts),
            consolidator,
            context,
            4,
        ));

        let classifier = Arc::new(ClassificationEngine::new(
            CredibilityModel::new(Arc::clone(&scorer), &ScoringConfig::default()),
            Arc::clone(&facts),
            Arc::clone(&classifications),
            bus.clone(),
        ));

        let reclassifier = Arc::new(Reclassifier::new(
            Arc::clone(&classifications),
            Arc::clone(&verifications),
            Arc::clone(&facts),
            true,
        ));
        let verifier = Arc::new(VerificationEngine::new(
            QueryGenerator::default(),
            SearchExecutor::new(
                Arc::new(MockSearchClient::offline()),
                Arc::clone(&scorer),
                Arc::new(HostRateLimiter::new(100.0, HashMap::new())),
            ),
            reclassifier,
            Arc::clone(&classifications),
            Arc::clone(&facts),
            bus.clone(),
            5,
            3,
        ));

        OrchestratorDeps {
            bus,
            registry,
            articles,
            facts,
            classifications,
            verifications,
            extraction,
            classifier,
            verifier,
            llm,
        }
    }

    #[test]
    fn decision_table_order() {
        // Hard stop wins over everything.
        assert_eq!(
            decide_next(3, 3, 1.0, 0.2, 1, 0.9, false),
            EvaluationDecision::Synthesize
        );
        // Diminishing returns synthesize.
        assert_eq!(
            decide_next(0, 7, 0.1, 0.2, 1, 0.9, false),
            EvaluationDecision::Synthesize
        );
        // Too many iterations synthesize.
        assert_eq!(
            decide_next(0, 7, 1.0, 0.2, 6, 0.9, false),
            EvaluationDecision::Synthesize
        );
        // Strong signal, incomplete coverage: refine.
        assert_eq!(
            decide_next(0, 7, 1.0, 0.2, 1, 0.9, false),
            EvaluationDecision::Refine
        );
        // Coverage met: synthesize.
        assert_eq!(
            decide_next(0, 7, 1.0, 0.2, 1, 0.9, true),
            EvaluationDecision::Synthesize
        );
        // Weak signal early: explore.
        assert_eq!(
            decide_next(0, 7, 1.0, 0.2, 1, 0.1, false),
            EvaluationDecision::Explore
        );
        // Default: synthesize.
        assert_eq!(
            decide_next(0, 7, 1.0, 0.2, 4, 0.4, false),
            EvaluationDecision::Synthesize
        );
    }

    #[test]
    fn adversarial_refinement_terminates_within_budget() {
        // Forced strong signal and unmet coverage: refine every round
        // until the budget stops it.
        let max_refinements = 3;
        let mut refinement_count = 0;
        let mut iteration = 1;
        loop {
            match decide_next(refinement_count, max_refinements, 1.0, 0.2, iteration, 0.9, false) {
                EvaluationDecision::Refine => {
                    refinement_count += 1;
                    iteration += 1;
                    assert!(iteration < 50, "refinement loop did not terminate");
                }
                EvaluationDecision::Synthesize => break,
                EvaluationDecision::Explore => unreachable!("strong signal never explores"),
            }
        }
        assert!(refinement_count <= max_refinements);
    }

    #[tokio::test]
    async fn empty_objective_is_a_well_formed_error() {
        let orchestrator = PlanningOrchestrator::new(deps(None), &SiftConfig::default());
        let result = orchestrator.run("   ", &CancelToken::new()).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn run_terminates_with_no_crawlers_and_no_llm() {
        let orchestrator = PlanningOrchestrator::new(deps(None), &SiftConfig::default())
            .with_dispatch_timeout(Duration::from_millis(50));
        let outcome = orchestrator
            .run("uranium shipment through the strait", &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.state.phase, OrchestratorPhase::End);
        assert!(outcome.state.refinement_count <= 7);
        assert!(!outcome.state.checkpoints.is_empty());
        assert!(outcome.synthesis.confirmed_facts.is_empty());
        // The checkpoint trail shows the full phase walk.
        assert_eq!(
            outcome.state.checkpoints[0].phase,
            OrchestratorPhase::AnalyzeObjective
        );
        assert!(outcome
            .state
            .checkpoints
            .iter()
            .any(|c| c.phase == OrchestratorPhase::SynthesizeResults));
    }

    #[tokio::test]
    async fn cancellation_surfaces_cleanly() {
        let orchestrator = PlanningOrchestrator::new(deps(None), &SiftConfig::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            orchestrator.run("objective here", &cancel).await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn full_pipeline_through_the_bus() {
        use crate::crawler::{
            Article, ArticleMetadata, ArticleSource, CrawlOutcome, CrawlStats, Crawler,
            CrawlerHost,
        };
        use crate::web::UrlManager;
        use async_trait::async_trait;
        use chrono::Utc;

        struct OneShotCrawler;

        #[async_trait]
        impl Crawler for OneShotCrawler {
            fn name(&self) -> &str {
                "oneshot"
            }
            fn source_type(&self) -> SourceType {
                SourceType::Rss
            }
            fn capability(&self) -> &'static str {
                "fetch.news"
            }
            async fn fetch(&self, _request: &CrawlRequest) -> Result<CrawlOutcome> {
                Ok(CrawlOutcome {
                    articles: vec![Article {
                        url: "https://reuters.com/uranium-strait".to_string(),
                        title: "Shipment tracked".to_string(),
                        content: "A uranium shipment moved through the strait overnight. "
                            .repeat(4),
                        published_date: Some(Utc::now()),
                        authors: vec!["desk".to_string()],
                        source: ArticleSource {
                            id: "rss:reuters".to_string(),
                            name: "Reuters".to_string(),
                            source_type: SourceType::Rss,
                        },
                        metadata: ArticleMetadata {
                            source_type: SourceType::Rss,
                            authority_level: 5,
                            topic_specialization: None,
                            retrieved_at: Utc::now(),
                        },
                    }],
                    stats: CrawlStats::default(),
                    errors: Vec::new(),
                })
            }
        }

        let extraction_json = r#"[{
            "claim": {"text": "[E1:Shipment] moved through the strait", "assertion_type": "statement"},
            "entities": [{"id": "E1", "text": "Shipment", "type": "ORG"}]
        }]"#;
        let llm: Arc<dyn CompletionClient> = Arc::new(
            MockCompletionClient::new().with_default_response(extraction_json),
        );
        let deps = deps(Some(llm));

        let host = Arc::new(CrawlerHost::new(
            deps.bus.clone(),
            Arc::clone(&deps.registry),
            Arc::clone(&deps.articles),
            Arc::new(UrlManager::new()),
            Arc::new(AuthorityScorer::new()),
            Arc::new(ContextCoordinator::new(deps.bus.clone())),
            vec![Arc::new(OneShotCrawler)],
        ));
        let _subs = host.start();

        let orchestrator = PlanningOrchestrator::new(deps.clone(), &SiftConfig::default())
            .with_dispatch_timeout(Duration::from_secs(2));
        let outcome = orchestrator
            .run("uranium shipment strait", &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.state.phase, OrchestratorPhase::End);
        let inv = outcome.state.investigation_id;
        assert!(deps.articles.count(inv) >= 1);
        assert!(deps.facts.count(inv) >= 1);
        assert!(outcome.synthesis.counts.total >= 1);
        deps.bus.teardown();
    }
}
