//! News-feed crawler: RSS-first with an optional quota-bound news-search
//! API supplement.
//!
//! Feeds are fetched concurrently in a randomly rotated order so the
//! outbound pattern never looks sequential. Parsing is lenient across
//! RSS/Atom variants; one feed's failure never aborts the others.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::FeedSource;
use crate::error::{Error, Result};
use crate::limiter::HostRateLimiter;
use crate::web::host_of;

use super::types::{
    Article, ArticleMetadata, ArticleSource, CrawlError, CrawlOutcome, CrawlRequest, CrawlStats,
    Crawler, SourceType,
};

/// Sliding-hour request budget for the news-search API (free tier).
struct ApiQuota {
    window_start: Instant,
    used: u32,
    hourly_limit: u32,
}

impl ApiQuota {
    fn new(hourly_limit: u32) -> Self {
        Self {
            window_start: Instant::now(),
            used: 0,
            hourly_limit,
        }
    }

    fn try_acquire(&mut self) -> bool {
        if self.window_start.elapsed() >= Duration::from_secs(3600) {
            self.window_start = Instant::now();
            self.used = 0;
        }
        if self.used < self.hourly_limit {
            self.used += 1;
            true
        } else {
            false
        }
    }
}

struct NewsApi {
    key: String,
    endpoint: String,
    quota: Mutex<ApiQuota>,
}

/// RSS/Atom crawler with news-API supplement.
pub struct NewsFeedCrawler {
    http: Client,
    feeds: Vec<FeedSource>,
    limiter: Arc<HostRateLimiter>,
    news_api: Option<NewsApi>,
}

impl NewsFeedCrawler {
    pub const DEFAULT_API_ENDPOINT: &'static str = "https://newsapi.org/v2/everything";

    pub fn new(http: Client, feeds: Vec<FeedSource>, limiter: Arc<HostRateLimiter>) -> Self {
        Self {
            http,
            feeds,
            limiter,
            news_api: None,
        }
    }

    /// Enable the news-search supplement with an hourly request budget.
    pub fn with_news_api(mut self, key: impl Into<String>, hourly_quota: u32) -> Self {
        self.news_api = Some(NewsApi {
            key: key.into(),
            endpoint: Self::DEFAULT_API_ENDPOINT.to_string(),
            quota: Mutex::new(ApiQuota::new(hourly_quota)),
        });
        self
    }

    pub fn with_api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        if let Some(api) = self.news_api.as_mut() {
            api.endpoint = endpoint.into();
        }
        self
    }

    async fn fetch_feed(
        &self,
        feed: &FeedSource,
        request: &CrawlRequest,
    ) -> Result<Vec<Article>> {
        if let Some(host) = host_of(&feed.url) {
            self.limiter.acquire(&host).await;
        }

        let response = self
            .http
            .get(&feed.url)
            .send()
            .await
            .map_err(|e| Error::transient(format!("feed {} fetch failed: {e}", feed.name)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::transient(format!("feed {} read failed: {e}", feed.name)))?;

        let parsed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| Error::validation(format!("feed {} unparseable: {e}", feed.name)))?;

        let keywords = request.keywords();
        let mut articles = Vec::new();
        for entry in parsed.entries {
            let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
                continue;
            };
            let title = entry.title.as_ref().map(|t| t.content.clone()).unwrap_or_default();
            let content = entry
                .content
                .as_ref()
                .and_then(|c| c.body.clone())
                .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
                .unwrap_or_default();
            // Lenient date handling: published, then updated, else none.
            let published = entry.published.or(entry.updated);

            if !keywords.is_empty() {
                let haystack = format!("{title}\n{content}").to_lowercase();
                if !keywords.iter().any(|k| haystack.contains(k)) {
                    continue;
                }
            }

            articles.push(Article {
                url: link,
                title,
                content,
                published_date: published,
                authors: entry.authors.iter().map(|p| p.name.clone()).collect(),
                source: ArticleSource {
                    id: format!("rss:{}", feed.name),
                    name: feed.name.clone(),
                    source_type: SourceType::Rss,
                },
                metadata: ArticleMetadata {
                    source_type: SourceType::Rss,
                    authority_level: 3,
                    topic_specialization: feed.specialization.clone(),
                    retrieved_at: Utc::now(),
                },
            });
        }
        Ok(articles)
    }

    async fn fetch_api(&self, request: &CrawlRequest) -> Result<Vec<Article>> {
        let Some(api) = &self.news_api else {
            return Ok(Vec::new());
        };
        {
            let mut quota = api.quota.lock().expect("quota lock poisoned");
            if !quota.try_acquire() {
                debug!("news API hourly quota exhausted, skipping supplement");
                return Ok(Vec::new());
            }
        }
        if let Some(host) = host_of(&api.endpoint) {
            self.limiter.acquire(&host).await;
        }

        let response = self
            .http
            .get(&api.endpoint)
            .query(&[
                ("q", request.query.as_str()),
                ("pageSize", "20"),
                ("sortBy", "publishedAt"),
            ])
            .header("X-Api-Key", &api.key)
            .send()
            .await
            .map_err(|e| Error::transient(format!("news API request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::transient(format!(
                "news API returned {}",
                response.status()
            )));
        }

        let body: NewsApiResponse = response
            .json()
            .await
            .map_err(|e| Error::validation(format!("news API response unparseable: {e}")))?;

        Ok(body
            .articles
            .into_iter()
            .filter_map(|item| {
                let url = item.url?;
                Some(Article {
                    url,
                    title: item.title.unwrap_or_default(),
                    content: item
                        .content
                        .or(item.description)
                        .unwrap_or_default(),
                    published_date: item
                        .published_at
                        .and_then(|d| d.parse().ok()),
                    authors: item.author.into_iter().collect(),
                    source: ArticleSource {
                        id: format!("api:{}", item.source.name.to_lowercase().replace(' ', "-")),
                        name: item.source.name,
                        source_type: SourceType::Api,
                    },
                    metadata: ArticleMetadata {
                        source_type: SourceType::Api,
                        authority_level: 3,
                        topic_specialization: None,
                        retrieved_at: Utc::now(),
                    },
                })
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    source: NewsApiSourceRef,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSourceRef {
    #[serde(default)]
    name: String,
}

#[async_trait::async_trait]
impl Crawler for NewsFeedCrawler {
    fn name(&self) -> &str {
        "news-feed-crawler"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Rss
    }

    fn capability(&self) -> &'static str {
        "fetch.news"
    }

    async fn fetch(&self, request: &CrawlRequest) -> Result<CrawlOutcome> {
        let mut stats = CrawlStats::default();
        let mut errors = Vec::new();
        let mut articles = Vec::new();

        // Random rotation: never hit sources in a fixed order.
        let mut order: Vec<&FeedSource> = self.feeds.iter().collect();
        order.shuffle(&mut rand::thread_rng());

        let results =
            futures::future::join_all(order.iter().map(|feed| self.fetch_feed(feed, request)))
                .await;

        for (feed, result) in order.iter().zip(results) {
            stats.sources_attempted += 1;
            match result {
                Ok(batch) => {
                    stats.items_fetched += batch.len() as u32;
                    articles.extend(batch);
                }
                Err(e) => {
                    stats.sources_failed += 1;
                    warn!(feed = %feed.name, error = %e, "feed failed, continuing");
                    errors.push(CrawlError {
                        source: feed.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if self.news_api.is_some() {
            stats.sources_attempted += 1;
            match self.fetch_api(request).await {
                Ok(batch) => {
                    stats.items_fetched += batch.len() as u32;
                    articles.extend(batch);
                }
                Err(e) => {
                    stats.sources_failed += 1;
                    errors.push(CrawlError {
                        source: "news-api".to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        articles.truncate(request.constraints.max_items);
        stats.items_kept = articles.len() as u32;

        Ok(CrawlOutcome {
            articles,
            stats,
            errors,
        })
    }
}
