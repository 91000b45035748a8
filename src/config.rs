//! Runtime configuration.
//!
//! Options are grouped by the component they affect; every field has a
//! default matching the documented behavior, so `SiftConfig::default()` is a
//! complete, runnable configuration (in mock mode). Credentials are never
//! part of the config file: they come from the environment via
//! [`SiftConfig::from_env`], and [`SiftConfig::validate`] refuses to start a
//! component whose credential is missing unless the matching mock flag is
//! enabled.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Environment variable holding the completion API key.
pub const ENV_LLM_API_KEY: &str = "ANTHROPIC_API_KEY";
/// Environment variable holding the verification search API key.
pub const ENV_SEARCH_API_KEY: &str = "SEARCH_API_KEY";
/// Environment variable holding the optional news-search API key.
pub const ENV_NEWS_API_KEY: &str = "NEWS_API_KEY";

/// Top-level configuration for a sift-core process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    pub llm: LlmConfig,
    pub extraction: ExtractionConfig,
    pub dedup: DedupConfig,
    pub scoring: ScoringConfig,
    pub verification: VerificationConfig,
    pub orchestrator: OrchestratorConfig,
    pub coverage: CoverageTargets,
    pub crawler: CrawlerConfig,
}

impl SiftConfig {
    /// Default configuration with credentials overlaid from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.llm.api_key = std::env::var(ENV_LLM_API_KEY).ok();
        config.verification.search_api_key = std::env::var(ENV_SEARCH_API_KEY).ok();
        config.crawler.news_api_key = std::env::var(ENV_NEWS_API_KEY).ok();
        config
    }

    /// Refuse to start when a required credential is absent and the caller
    /// has not enabled the corresponding mock mode. The news API key is
    /// optional: the news crawler degrades to RSS-only without it.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_key.is_none() && !self.llm.mock_mode {
            return Err(Error::config(format!(
                "missing {ENV_LLM_API_KEY} and llm.mock_mode is disabled"
            )));
        }
        if self.verification.search_api_key.is_none() && !self.verification.mock_search {
            return Err(Error::config(format!(
                "missing {ENV_SEARCH_API_KEY} and verification.mock_search is disabled"
            )));
        }
        if self.extraction.batch_size == 0 {
            return Err(Error::config("extraction.batch_size must be at least 1"));
        }
        if self.verification.batch_size == 0 {
            return Err(Error::config("verification.batch_size must be at least 1"));
        }
        Ok(())
    }
}

/// Completion-capability options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Completion model identifier.
    pub model: String,
    /// Requests-per-minute bucket cap.
    pub rpm: u32,
    /// Tokens-per-minute bucket cap.
    pub tpm: u64,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Run against the scripted mock client instead of the vendor API.
    pub mock_mode: bool,
    /// API key (environment-sourced; never serialized).
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            rpm: 50,
            tpm: 80_000,
            timeout_secs: 60,
            mock_mode: false,
            api_key: None,
        }
    }
}

/// Extraction pipeline options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Concurrent article tasks per batch.
    pub batch_size: usize,
    /// Inputs shorter than this yield no facts (and no error).
    pub min_content_chars: usize,
    /// Documents longer than this are chunked on paragraph, then sentence,
    /// boundaries.
    pub chunk_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            min_content_chars: 80,
            chunk_chars: 12_000,
        }
    }
}

/// Consolidation dedup options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Cosine-distance threshold below which two claims are semantic
    /// duplicates. Layer 3 is skipped when no embedding capability exists.
    pub semantic_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            semantic_threshold: 0.3,
        }
    }
}

/// Credibility-formula constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Echo-dampening coefficient (alpha in `root + alpha*log10(1+sum)`).
    pub echo_alpha: f64,
    /// Per-hop proximity decay base.
    pub proximity_decay: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            echo_alpha: 0.2,
            proximity_decay: 0.7,
        }
    }
}

/// Verification engine options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Concurrent fact verifications.
    pub batch_size: usize,
    /// Maximum query attempts per fact.
    pub max_query_attempts: u32,
    /// Critical-tier facts always require the human-review bit.
    pub human_review_for_critical: bool,
    /// Run against the mock search client (empty evidence, never throws).
    pub mock_search: bool,
    /// Search API key (environment-sourced; never serialized).
    #[serde(skip)]
    pub search_api_key: Option<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_query_attempts: 3,
            human_review_for_critical: true,
            mock_search: false,
            search_api_key: None,
        }
    }
}

/// Planning orchestrator options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Hard stop on refinement iterations.
    pub max_refinements: u32,
    /// Novelty below this is diminishing returns.
    pub diminishing_returns_threshold: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_refinements: 7,
            diminishing_returns_threshold: 0.2,
        }
    }
}

/// Coverage targets gating refinement termination, each in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageTargets {
    pub source_diversity: f64,
    pub geographic: f64,
    pub temporal: f64,
    pub topic: f64,
}

impl Default for CoverageTargets {
    fn default() -> Self {
        Self {
            source_diversity: 0.7,
            geographic: 0.6,
            temporal: 0.5,
            topic: 0.6,
        }
    }
}

/// Crawler cohort options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Default outbound requests per second per host.
    pub default_rate_per_second: f64,
    /// Per-source rate overrides, keyed by host.
    pub rate_per_second: HashMap<String, f64>,
    /// HTTP fast-path timeout in seconds.
    pub http_timeout_secs: u64,
    /// Headless-browser path timeout in seconds.
    pub headless_timeout_secs: u64,
    /// Headless content-service endpoint; unset degrades to HTTP-only.
    pub headless_endpoint: Option<String>,
    /// Rotating user-agent pool for the hybrid web crawler.
    pub user_agents: Vec<String>,
    /// RSS/Atom feeds for the news crawler.
    pub feeds: Vec<FeedSource>,
    /// Subreddits for the social crawler.
    pub subreddits: Vec<String>,
    /// News-search API requests allowed per hour (free tier).
    pub news_api_hourly_quota: u32,
    /// Minimum extracted document length in characters.
    pub min_document_chars: usize,
    /// News-search API key (environment-sourced; never serialized).
    #[serde(skip)]
    pub news_api_key: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            default_rate_per_second: 1.0,
            rate_per_second: HashMap::new(),
            http_timeout_secs: 30,
            headless_timeout_secs: 60,
            headless_endpoint: None,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/128.0".to_string(),
            ],
            feeds: Vec::new(),
            subreddits: Vec::new(),
            news_api_hourly_quota: 4,
            min_document_chars: 500,
            news_api_key: None,
        }
    }
}

/// A configured RSS/Atom feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    pub name: String,
    /// Topic the feed specializes in, if any.
    pub specialization: Option<String>,
}
