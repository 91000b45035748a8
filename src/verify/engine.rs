//! Verification batch processor.
//!
//! Drains the priority queue under a bounded concurrency group. Each fact
//! runs its query plan attempt by attempt, accumulating evidence until it
//! confirms, refutes, or exhausts the attempt budget. Every outbound
//! search goes through the rate limiter; cancellation marks in-flight
//! facts PENDING so they can resume; a per-fact progress event fires on
//! each completion and a batch-complete event on the flush.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::bus::{topics, MessageBus};
use crate::cancel::CancelToken;
use crate::classify::{ContradictionType, DubiousFlag, FactClassification, VerificationStatus};
use crate::error::{Error, Result};
use crate::fact::FactId;
use crate::investigation::InvestigationId;
use crate::store::{ClassificationStore, FactStore};

use super::evidence::EvidenceAggregator;
use super::queries::QueryGenerator;
use super::reclassify::Reclassifier;
use super::search::{EvidenceCandidate, SearchExecutor};

/// Outcome of one verification run.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationRunReport {
    pub processed: usize,
    pub confirmed: usize,
    pub refuted: usize,
    pub superseded: usize,
    pub unverifiable: usize,
    pub cancelled: usize,
}

impl std::fmt::Display for VerificationRunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Verification: {} processed, {} confirmed, {} refuted, {} superseded, {} unverifiable, {} cancelled",
            self.processed,
            self.confirmed,
            self.refuted,
            self.superseded,
            self.unverifiable,
            self.cancelled,
        )
    }
}

/// The verification engine.
pub struct VerificationEngine {
    generator: QueryGenerator,
    executor: SearchExecutor,
    aggregator: EvidenceAggregator,
    reclassifier: Arc<Reclassifier>,
    classifications: Arc<ClassificationStore>,
    facts: Arc<FactStore>,
    bus: MessageBus,
    batch_size: usize,
    max_query_attempts: u32,
}

impl VerificationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        generator: QueryGenerator,
        executor: SearchExecutor,
        reclassifier: Arc<Reclassifier>,
        classifications: Arc<ClassificationStore>,
        facts: Arc<FactStore>,
        bus: MessageBus,
        batch_size: usize,
        max_query_attempts: u32,
    ) -> Self {
        Self {
            generator,
            executor,
            aggregator: EvidenceAggregator::new(),
            reclassifier,
            classifications,
            facts,
            bus,
            batch_size: batch_size.max(1),
            max_query_attempts: max_query_attempts.max(1),
        }
    }

    /// Verify every fact in the investigation's priority queue.
    pub async fn run(
        &self,
        investigation_id: InvestigationId,
        objective: &str,
        cancel: &CancelToken,
    ) -> Result<VerificationRunReport> {
        cancel.check()?;
        let queue = self.classifications.get_priority_queue(investigation_id);
        let mut report = VerificationRunReport::default();

        let semaphore = Arc::new(Semaphore::new(self.batch_size));
        let tasks = queue.into_iter().map(|classification| {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                self.verify_fact(classification, objective, &cancel).await
            }
        });

        for outcome in join_all(tasks).await {
            report.processed += 1;
            match outcome {
                Ok(VerificationStatus::Confirmed) => report.confirmed += 1,
                Ok(VerificationStatus::Refuted) => report.refuted += 1,
                Ok(VerificationStatus::Superseded) => report.superseded += 1,
                Ok(VerificationStatus::Unverifiable) => report.unverifiable += 1,
                Ok(_) => report.cancelled += 1,
                Err(e) => {
                    warn!(error = %e, "verification task failed");
                    report.unverifiable += 1;
                }
            }
        }

        info!(investigation = %investigation_id, "{report}");
        self.bus.publish(
            topics::VERIFICATION_BATCH_COMPLETE,
            json!({
                "investigation_id": investigation_id.to_string(),
                "processed": report.processed,
                "confirmed": report.confirmed,
                "refuted": report.refuted,
                "superseded": report.superseded,
                "unverifiable": report.unverifiable,
            }),
        );
        Ok(report)
    }

    /// Verify one fact through its query plan.
    async fn verify_fact(
        &self,
        classification: FactClassification,
        objective: &str,
        cancel: &CancelToken,
    ) -> Result<VerificationStatus> {
        let fact_id = classification.fact_id;
        let investigation_id = classification.investigation_id;
        let Some(fact) = self.facts.get(fact_id) else {
            return Err(Error::fatal(format!(
                "classification references missing fact {fact_id}"
            )));
        };

        if cancel.is_cancelled() {
            return Ok(VerificationStatus::Pending);
        }
        // An earlier fact's anomaly resolution may have already settled
        // this one.
        if let Some(current) = self.classifications.get(fact_id) {
            if current.verification_status.is_terminal() {
                return Ok(current.verification_status);
            }
        }
        self.reclassifier.start(fact_id)?;

        // No search backend: unverifiable without spending attempts.
        if !self.executor.is_live() {
            let result = self.reclassifier.unverifiable(fact_id, 0, Vec::new())?;
            self.publish_progress(investigation_id, fact_id, result.status);
            return Ok(result.status);
        }

        let plan = self.generator.plan(&fact, &classification);
        let anomaly_target = classification
            .dubious_flags
            .contains(&DubiousFlag::Anomaly)
            .then(|| {
                classification
                    .contradictions
                    .iter()
                    .max_by(|a, b| {
                        a.confidence
                            .partial_cmp(&b.confidence)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|c| (c.other_fact, c.contradiction_type))
            })
            .flatten();

        let mut attempts: u32 = 0;
        let mut queries_used: Vec<String> = Vec::new();
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut evidence: Vec<EvidenceCandidate> = Vec::new();

        for attempt in plan.attempts.iter().take(self.max_query_attempts as usize) {
            if cancel.is_cancelled() {
                self.reclassifier.revert_to_pending(fact_id)?;
                return Ok(VerificationStatus::Pending);
            }

            attempts += 1;
            queries_used.extend(attempt.queries.iter().cloned());
            match self.executor.execute(&attempt.queries, &mut seen_urls).await {
                Ok(candidates) => evidence.extend(candidates),
                Err(e) => {
                    warn!(fact = %fact_id, error = %e, "search attempt failed");
                    continue;
                }
            }

            let assessment =
                self.aggregator
                    .assess(&fact, self.executor.scorer(), evidence.clone());

            if assessment.confirms {
                let status = match anomaly_target {
                    Some((loser, contradiction_type)) => {
                        self.reclassifier.resolve_anomaly(
                            fact_id,
                            loser,
                            contradiction_type,
                            objective,
                            &assessment,
                            attempts,
                            queries_used.clone(),
                        )?;
                        VerificationStatus::Confirmed
                    }
                    None => {
                        self.reclassifier
                            .confirm(fact_id, objective, &assessment, attempts, queries_used.clone())?
                            .status
                    }
                };
                self.publish_progress(investigation_id, fact_id, status);
                return Ok(status);
            }
            if assessment.refutes {
                let result = self.reclassifier.refute(
                    fact_id,
                    objective,
                    &assessment,
                    attempts,
                    queries_used.clone(),
                )?;
                self.publish_progress(investigation_id, fact_id, result.status);
                return Ok(result.status);
            }
            // Evidence insufficient: stay in progress, next variant.
        }

        let result = self
            .reclassifier
            .unverifiable(fact_id, attempts, queries_used)?;
        self.publish_progress(investigation_id, fact_id, result.status);
        Ok(result.status)
    }

    fn publish_progress(
        &self,
        investigation_id: InvestigationId,
        fact_id: FactId,
        status: VerificationStatus,
    ) {
        self.bus.publish(
            topics::VERIFICATION_FACT_VERIFIED,
            json!({
                "investigation_id": investigation_id.to_string(),
                "fact_id": fact_id.to_string(),
                "status": status,
            }),
        );
    }
}

/// Resolution type for the anomaly loser, re-exported for callers
/// inspecting verification results.
pub fn loser_status_for(contradiction_type: ContradictionType) -> VerificationStatus {
    match contradiction_type {
        ContradictionType::Temporal => VerificationStatus::Superseded,
        _ => VerificationStatus::Refuted,
    }
}
