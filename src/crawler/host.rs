//! Crawler coordination: bus-driven dispatch, URL dedup, authority
//! attachment, and article persistence.
//!
//! The host subscribes each crawler to its crawl topic, registers it in
//! the agent directory, and on every request runs the full pipeline:
//! fetch, canonicalize/dedup URLs, re-score authority from the final
//! domain, cross-reference entity context, save, and publish
//! `crawler.complete` or `crawler.failed`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::bus::{topics, MessageBus, SubscriptionId};
use crate::error::Error;
use crate::registry::{AgentId, AgentRegistry};
use crate::store::ArticleStore;
use crate::web::{host_of, AuthorityScorer, AuthoritySignals, ContextCoordinator, UrlManager};

use super::types::{Article, CrawlOutcome, CrawlRequest, Crawler, SourceType};

/// Crawl topic for a crawler's source type.
pub fn crawl_topic(source_type: SourceType) -> &'static str {
    match source_type {
        SourceType::Rss | SourceType::Api => topics::NEWS_CRAWL,
        SourceType::Reddit => topics::REDDIT_CRAWL,
        SourceType::Document => topics::DOCUMENT_CRAWL,
        SourceType::Web => topics::WEB_CRAWL,
    }
}

/// Summary of one handled crawl request.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlSummary {
    pub fetched: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub source_errors: usize,
}

/// Shared services the cohort runs against.
pub struct CrawlerHost {
    bus: MessageBus,
    registry: Arc<AgentRegistry>,
    articles: Arc<ArticleStore>,
    urls: Arc<UrlManager>,
    authority: Arc<AuthorityScorer>,
    context: Arc<ContextCoordinator>,
    crawlers: Vec<Arc<dyn Crawler>>,
}

impl CrawlerHost {
    pub fn new(
        bus: MessageBus,
        registry: Arc<AgentRegistry>,
        articles: Arc<ArticleStore>,
        urls: Arc<UrlManager>,
        authority: Arc<AuthorityScorer>,
        context: Arc<ContextCoordinator>,
        crawlers: Vec<Arc<dyn Crawler>>,
    ) -> Self {
        Self {
            bus,
            registry,
            articles,
            urls,
            authority,
            context,
            crawlers,
        }
    }

    /// Registered crawler for a source type, if any.
    pub fn crawler_for(&self, source_type: SourceType) -> Option<Arc<dyn Crawler>> {
        self.crawlers
            .iter()
            .find(|c| crawl_topic(c.source_type()) == crawl_topic(source_type))
            .cloned()
    }

    /// Subscribe every crawler to its topic and register it with the
    /// directory. Returns the subscription handles for teardown.
    pub fn start(self: &Arc<Self>) -> Vec<SubscriptionId> {
        let mut subscriptions = Vec::new();
        for crawler in &self.crawlers {
            self.registry.register(
                AgentId::new(crawler.name()),
                crawler.name(),
                vec!["fetch".to_string(), crawler.capability().to_string()],
            );

            let host = Arc::clone(self);
            let crawler = Arc::clone(crawler);
            let topic = crawl_topic(crawler.source_type());
            subscriptions.push(self.bus.subscribe_fn(topic, move |msg| {
                let host = Arc::clone(&host);
                let crawler = Arc::clone(&crawler);
                async move {
                    let request: CrawlRequest = serde_json::from_value(msg.payload)
                        .map_err(|e| Error::validation(format!("bad crawl request: {e}")))?;
                    host.handle(crawler, request).await;
                    Ok(())
                }
            }));
        }
        subscriptions
    }

    /// Run one crawl request through a crawler and publish the outcome.
    pub async fn handle(&self, crawler: Arc<dyn Crawler>, request: CrawlRequest) {
        let investigation_id = request.investigation_id;
        self.registry.heartbeat(&AgentId::new(crawler.name()));

        match crawler.fetch(&request).await {
            Ok(outcome) => {
                let summary = self.ingest(&request, outcome);
                info!(
                    investigation = %investigation_id,
                    crawler = crawler.name(),
                    saved = summary.saved,
                    duplicates = summary.duplicates,
                    "crawl complete"
                );
                self.bus.publish(
                    topics::CRAWLER_COMPLETE,
                    json!({
                        "investigation_id": investigation_id.to_string(),
                        "crawler": crawler.name(),
                        "fetched": summary.fetched,
                        "saved": summary.saved,
                        "duplicates": summary.duplicates,
                        "source_errors": summary.source_errors,
                    }),
                );
            }
            Err(e) => {
                warn!(
                    investigation = %investigation_id,
                    crawler = crawler.name(),
                    error = %e,
                    "crawl failed"
                );
                self.bus.publish(
                    topics::CRAWLER_FAILED,
                    json!({
                        "investigation_id": investigation_id.to_string(),
                        "crawler": crawler.name(),
                        "error": e.to_string(),
                    }),
                );
            }
        }
    }

    /// Dedup, authority-score and persist a crawl outcome.
    fn ingest(&self, request: &CrawlRequest, outcome: CrawlOutcome) -> CrawlSummary {
        let investigation_id = request.investigation_id;
        let mut summary = CrawlSummary {
            fetched: outcome.articles.len(),
            source_errors: outcome.errors.len(),
            ..Default::default()
        };

        let mut to_save: Vec<Article> = Vec::new();
        for mut article in outcome.articles {
            let canonical = match self.urls.claim(investigation_id, &article.url) {
                Ok(Some(canonical)) => canonical,
                Ok(None) => {
                    summary.duplicates += 1;
                    continue;
                }
                Err(e) => {
                    warn!(url = %article.url, error = %e, "unusable article URL, discarded");
                    continue;
                }
            };
            article.url = canonical;

            if let Some(domain) = host_of(&article.url) {
                let signals = AuthoritySignals {
                    verified_author: !article.authors.is_empty(),
                    recent_publication: article
                        .published_date
                        .map(|d| (Utc::now() - d).num_days() <= 7)
                        .unwrap_or(false),
                    high_engagement: false,
                };
                let score = self.authority.score_with_signals(&domain, signals);
                article.metadata.authority_level = self.authority.authority_level(score);
            }

            let known = self
                .context
                .cross_reference(investigation_id, &article.content);
            if !known.is_empty() {
                info!(
                    url = %article.url,
                    entities = known.len(),
                    "article mentions known investigation entities"
                );
            }
            to_save.push(article);
        }

        let report = self.articles.save_articles(investigation_id, to_save);
        summary.saved = report.saved;
        summary.duplicates += report.duplicates;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::types::{ArticleMetadata, ArticleSource, CrawlStats};
    use crate::error::Result;
    use crate::investigation::InvestigationId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedCrawler {
        articles: Vec<Article>,
        fail: bool,
    }

    #[async_trait]
    impl Crawler for FixedCrawler {
        fn name(&self) -> &str {
            "fixed-crawler"
        }
        fn source_type(&self) -> SourceType {
            SourceType::Rss
        }
        fn capability(&self) -> &'static str {
            "fetch.news"
        }
        async fn fetch(&self, _request: &CrawlRequest) -> Result<CrawlOutcome> {
            if self.fail {
                return Err(Error::operational("backend down"));
            }
            Ok(CrawlOutcome {
                articles: self.articles.clone(),
                stats: CrawlStats::default(),
                errors: Vec::new(),
            })
        }
    }

    fn article(url: &str) -> Article {
        Article {
            url: url.to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            published_date: Some(Utc::now()),
            authors: vec!["reporter".to_string()],
            source: ArticleSource {
                id: "rss:test".to_string(),
                name: "test".to_string(),
                source_type: SourceType::Rss,
            },
            metadata: ArticleMetadata {
                source_type: SourceType::Rss,
                authority_level: 1,
                topic_specialization: None,
                retrieved_at: Utc::now(),
            },
        }
    }

    fn host(crawlers: Vec<Arc<dyn Crawler>>) -> (Arc<CrawlerHost>, MessageBus, Arc<ArticleStore>) {
        let bus = MessageBus::new();
        let articles = Arc::new(ArticleStore::new());
        let host = Arc::new(CrawlerHost::new(
            bus.clone(),
            Arc::new(AgentRegistry::new()),
            Arc::clone(&articles),
            Arc::new(UrlManager::new()),
            Arc::new(AuthorityScorer::new()),
            Arc::new(ContextCoordinator::new(bus.clone())),
            crawlers,
        ));
        (host, bus, articles)
    }

    #[tokio::test]
    async fn bus_request_flows_to_store_and_completion_event() {
        let crawler = Arc::new(FixedCrawler {
            articles: vec![
                article("https://reuters.com/a?utm_source=x"),
                article("https://REUTERS.com/a"),
            ],
            fail: false,
        });
        let (host, bus, articles) = host(vec![crawler]);
        let _subs = host.start();

        let completions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completions);
        bus.subscribe_fn(topics::CRAWLER_COMPLETE, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let inv = InvestigationId::new();
        let request = CrawlRequest::new(inv, "query");
        bus.publish(topics::NEWS_CRAWL, serde_json::to_value(&request).unwrap());

        tokio::time::sleep(Duration::from_millis(100)).await;
        // The two surface forms dedup to one canonical article.
        assert_eq!(articles.count(inv), 1);
        let saved = articles.retrieve_by_investigation(inv);
        assert_eq!(saved.articles[0].url, "https://reuters.com/a");
        // Wire domain with fresh publication: top authority level.
        assert_eq!(saved.articles[0].metadata.authority_level, 5);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        bus.teardown();
    }

    #[tokio::test]
    async fn crawler_failure_publishes_failed_event() {
        let crawler = Arc::new(FixedCrawler {
            articles: vec![],
            fail: true,
        });
        let (host, bus, articles) = host(vec![crawler]);
        let _subs = host.start();

        let failures = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&failures);
        bus.subscribe_fn(topics::CRAWLER_FAILED, move |msg| {
            let counter = Arc::clone(&counter);
            async move {
                assert!(msg.investigation_id().is_some());
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let inv = InvestigationId::new();
        bus.publish(
            topics::NEWS_CRAWL,
            serde_json::to_value(CrawlRequest::new(inv, "q")).unwrap(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(articles.count(inv), 0);
        bus.teardown();
    }
}
