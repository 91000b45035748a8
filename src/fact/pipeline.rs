//! Extraction pipeline: batch-concurrent extraction over an
//! investigation's articles, followed by consolidation.
//!
//! Articles are processed under a bounded concurrency group; one
//! article's failure never aborts the batch, and a consolidation failure
//! passes the original facts through untouched.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::investigation::InvestigationId;
use crate::store::{ArticleStore, FactStore};
use crate::web::ContextCoordinator;

use super::consolidator::FactConsolidator;
use super::extractor::FactExtractionAgent;
use super::types::{ExtractedFact, FactId};

/// A single article's extraction failure, recorded and survived.
#[derive(Debug, Clone)]
pub struct ExtractionFailure {
    pub url: String,
    pub message: String,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub articles_processed: usize,
    pub facts_extracted: usize,
    pub canonical_facts: Vec<FactId>,
    pub variants_linked: usize,
    pub errors: Vec<ExtractionFailure>,
}

impl std::fmt::Display for ExtractionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Extraction: {} articles, {} facts, {} canonical, {} variants, {} errors",
            self.articles_processed,
            self.facts_extracted,
            self.canonical_facts.len(),
            self.variants_linked,
            self.errors.len(),
        )
    }
}

/// Batch-concurrent extraction pipeline.
pub struct ExtractionPipeline {
    agent: Arc<FactExtractionAgent>,
    articles: Arc<ArticleStore>,
    facts: Arc<FactStore>,
    consolidator: Arc<FactConsolidator>,
    context: Arc<ContextCoordinator>,
    batch_size: usize,
}

impl ExtractionPipeline {
    pub fn new(
        agent: Arc<FactExtractionAgent>,
        articles: Arc<ArticleStore>,
        facts: Arc<FactStore>,
        consolidator: Arc<FactConsolidator>,
        context: Arc<ContextCoordinator>,
        batch_size: usize,
    ) -> Self {
        Self {
            agent,
            articles,
            facts,
            consolidator,
            context,
            batch_size: batch_size.max(1),
        }
    }

    /// Extract and consolidate all facts for an investigation.
    pub async fn run(
        &self,
        investigation_id: InvestigationId,
        cancel: &CancelToken,
    ) -> Result<ExtractionReport> {
        cancel.check()?;
        let article_set = self.articles.retrieve_by_investigation(investigation_id);
        let mut report = ExtractionReport::default();

        let semaphore = Arc::new(Semaphore::new(self.batch_size));
        let tasks = article_set.articles.iter().map(|article| {
            let agent = Arc::clone(&self.agent);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                if cancel.is_cancelled() {
                    return (article.url.clone(), Err(Error::Cancelled));
                }
                (article.url.clone(), agent.extract_from_article(article).await)
            }
        });

        // Return-exceptions semantics: one task's failure never cancels
        // its siblings.
        let results = join_all(tasks).await;
        cancel.check()?;

        let mut all_facts: Vec<ExtractedFact> = Vec::new();
        for (url, result) in results {
            report.articles_processed += 1;
            match result {
                Ok(facts) => {
                    report.facts_extracted += facts.len();
                    all_facts.extend(facts);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(url = %url, error = %e, "article extraction failed, batch continues");
                    report.errors.push(ExtractionFailure {
                        url,
                        message: e.to_string(),
                    });
                }
            }
        }

        // Share discovered entities with the crawler cohort.
        let entity_pairs: Vec<(String, String)> = all_facts
            .iter()
            .flat_map(|f| f.entities.iter())
            .map(|e| (e.text.clone(), format!("{:?}", e.entity_type)))
            .collect();
        if !entity_pairs.is_empty() {
            self.context.note_entities(investigation_id, &entity_pairs);
        }

        match self
            .consolidator
            .consolidate(investigation_id, all_facts.clone())
            .await
        {
            Ok(consolidation) => {
                report.canonical_facts = consolidation.canonical;
                report.variants_linked = consolidation.variants_linked;
            }
            Err(e) => {
                // Pass originals through untouched.
                warn!(error = %e, "consolidation failed, storing facts unconsolidated");
                for fact in all_facts {
                    let id = fact.fact_id;
                    if self.facts.insert(investigation_id, fact).is_ok() {
                        report.canonical_facts.push(id);
                    }
                }
            }
        }

        info!(investigation = %investigation_id, "{report}");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::crawler::{Article, ArticleMetadata, ArticleSource, SourceType};
    use crate::llm::MockCompletionClient;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn article(url: &str, content: &str) -> Article {
        Article {
            url: url.to_string(),
            title: "Title".to_string(),
            content: content.to_string(),
            published_date: None,
            authors: vec![],
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
        }
    }

    fn pipeline(mock: MockCompletionClient) -> (ExtractionPipeline, Arc<ArticleStore>, Arc<FactStore>) {
        let client = Arc::new(mock);
        let articles = Arc::new(ArticleStore::new());
        let facts = Arc::new(FactStore::new());
        let agent = Arc::new(FactExtractionAgent::new(
            Arc::clone(&client) as Arc<dyn crate::llm::CompletionClient>,
            "mock-1",
            12_000,
            40,
        ));
        let consolidator = Arc::new(FactConsolidator::new(Arc::clone(&facts), 0.3));
        let context = Arc::new(ContextCoordinator::new(MessageBus::new()));
        let p = ExtractionPipeline::new(
            agent,
            Arc::clone(&articles),
            Arc::clone(&facts),
            consolidator,
            context,
            4,
        );
        (p, articles, facts)
    }

    const FACT_JSON: &str = r#"[{
        "claim": {"text": "[E1:Army] crossed the river", "assertion_type": "statement"},
        "entities": [{"id": "E1", "text": "Army", "type": "ORG"}]
    }]"#;

    #[tokio::test]
    async fn extracts_and_consolidates_across_articles() {
        let mock = MockCompletionClient::new().with_default_response(FACT_JSON);
        let (pipeline, articles, facts) = pipeline(mock);
        let inv = InvestigationId::new();
        articles.save_articles(
            inv,
            vec![
                article("https://a/1", &"context one ".repeat(10)),
                article("https://a/2", &"context two ".repeat(10)),
            ],
        );

        let report = pipeline.run(inv, &CancelToken::new()).await.unwrap();

        assert_eq!(report.articles_processed, 2);
        assert_eq!(report.facts_extracted, 2);
        // Same claim from two articles: one canonical plus a variant.
        assert_eq!(report.canonical_facts.len(), 1);
        assert_eq!(report.variants_linked, 1);
        assert_eq!(facts.count(inv), 2);
    }

    #[tokio::test]
    async fn empty_investigation_is_fine() {
        let mock = MockCompletionClient::new();
        let (pipeline, _, _) = pipeline(mock);
        let report = pipeline
            .run(InvestigationId::new(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.articles_processed, 0);
        assert!(report.canonical_facts.is_empty());
    }

    #[tokio::test]
    async fn cancellation_is_observed() {
        let mock = MockCompletionClient::new().with_default_response(FACT_JSON);
        let (pipeline, articles, _) = pipeline(mock);
        let inv = InvestigationId::new();
        articles.save_articles(inv, vec![article("https://a/1", &"x ".repeat(40))]);

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            pipeline.run(inv, &cancel).await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn malformed_output_is_recorded_not_fatal() {
        let mock = MockCompletionClient::new().with_default_response("not json at all");
        let (pipeline, articles, facts) = pipeline(mock);
        let inv = InvestigationId::new();
        articles.save_articles(inv, vec![article("https://a/1", &"x ".repeat(40))]);

        let report = pipeline.run(inv, &CancelToken::new()).await.unwrap();
        // Unparseable output discards the chunk; the run itself succeeds.
        assert_eq!(report.articles_processed, 1);
        assert_eq!(report.facts_extracted, 0);
        assert_eq!(facts.count(inv), 0);
    }
}
