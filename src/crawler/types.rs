//! Article schema and the common crawler interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::investigation::InvestigationId;

/// Where an article came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Rss,
    Api,
    Reddit,
    Document,
    Web,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rss => write!(f, "rss"),
            Self::Api => write!(f, "api"),
            Self::Reddit => write!(f, "reddit"),
            Self::Document => write!(f, "document"),
            Self::Web => write!(f, "web"),
        }
    }
}

/// Identity of the concrete source that produced an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSource {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
}

/// Retrieval metadata attached by the crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    pub source_type: SourceType,
    /// 1 (lowest) to 5 (highest), derived from the authority score.
    pub authority_level: u8,
    pub topic_specialization: Option<String>,
    pub retrieved_at: DateTime<Utc>,
}

/// A normalized article record. Immutable after save; never deleted during
/// a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Canonical URL (the investigation-scoped dedup key).
    pub url: String,
    pub title: String,
    /// Plain text content.
    pub content: String,
    pub published_date: Option<DateTime<Utc>>,
    pub authors: Vec<String>,
    pub source: ArticleSource,
    pub metadata: ArticleMetadata,
}

/// Constraints on a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConstraints {
    pub max_items: usize,
    /// Restrict results to the most recent N days, where supported.
    pub time_window_days: Option<u32>,
    /// Seed URLs for the document and web crawlers.
    pub seed_urls: Vec<String>,
}

impl Default for CrawlConstraints {
    fn default() -> Self {
        Self {
            max_items: 25,
            time_window_days: Some(7),
            seed_urls: Vec::new(),
        }
    }
}

/// A unit of crawl work, published on the per-source crawl topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub investigation_id: InvestigationId,
    pub query: String,
    #[serde(default)]
    pub constraints: CrawlConstraints,
}

impl CrawlRequest {
    pub fn new(investigation_id: InvestigationId, query: impl Into<String>) -> Self {
        Self {
            investigation_id,
            query: query.into(),
            constraints: CrawlConstraints::default(),
        }
    }

    /// Lowercased query keywords for relevance filtering.
    pub fn keywords(&self) -> Vec<String> {
        self.query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 2)
            .collect()
    }
}

/// Counters for one crawl run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    pub sources_attempted: u32,
    pub sources_failed: u32,
    pub items_fetched: u32,
    pub items_kept: u32,
}

impl std::fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Crawl: {}/{} sources ok, {} items fetched, {} kept",
            self.sources_attempted - self.sources_failed,
            self.sources_attempted,
            self.items_fetched,
            self.items_kept,
        )
    }
}

/// A source-level failure that was survived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlError {
    pub source: String,
    pub message: String,
}

/// Result of one crawl: the subset gathered successfully plus the errors
/// survived along the way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlOutcome {
    pub articles: Vec<Article>,
    pub stats: CrawlStats,
    pub errors: Vec<CrawlError>,
}

/// Common crawler interface. Crawlers produce articles and do not retain
/// them; a failed source is recorded in the outcome, not raised.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Stable worker name, also the registry agent id.
    fn name(&self) -> &str;

    fn source_type(&self) -> SourceType;

    /// Capability string the registry indexes this crawler under.
    fn capability(&self) -> &'static str;

    /// Gather articles for a request.
    async fn fetch(&self, request: &CrawlRequest) -> Result<CrawlOutcome>;
}
