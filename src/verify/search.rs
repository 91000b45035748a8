//! Search execution for verification.
//!
//! The external search API sits behind [`SearchClient`]; with no API key
//! the mock client returns empty result sets without failing. The
//! executor scores every hit for authority and relevance and dedups by
//! URL across all queries issued for one fact.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::limiter::HostRateLimiter;
use crate::web::{host_of, normalize, AuthorityScorer};

use super::types::EvidenceItem;

/// One raw search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// External search capability.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// Whether a real backend is configured. Mock mode reports false and
    /// verification short-circuits to UNVERIFIABLE without spending
    /// attempts.
    fn is_live(&self) -> bool {
        true
    }
}

/// HTTP search API client (Tavily-style JSON POST).
pub struct HttpSearchClient {
    http: Client,
    api_key: String,
    endpoint: String,
}

impl HttpSearchClient {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.tavily.com/search";

    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SearchApiResponse {
    #[serde(default)]
    results: Vec<SearchApiResult>,
}

#[derive(Debug, Deserialize)]
struct SearchApiResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": max_results,
            }))
            .send()
            .await
            .map_err(|e| Error::Search(format!("search request failed: {e}")))?;

        if response.status().as_u16() == 429 || response.status().is_server_error() {
            return Err(Error::transient(format!(
                "search API returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(Error::Search(format!(
                "search API returned {}",
                response.status()
            )));
        }

        let body: SearchApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Search(format!("search response unparseable: {e}")))?;

        Ok(body
            .results
            .into_iter()
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: r.content,
            })
            .collect())
    }
}

/// Scripted search client for tests and mock mode.
pub struct MockSearchClient {
    /// Hits returned for queries containing the key substring.
    scripted: Mutex<HashMap<String, Vec<SearchHit>>>,
    live: bool,
}

impl MockSearchClient {
    /// A mock with a live backend (scripted hits).
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
            live: true,
        }
    }

    /// Mock mode for a missing API key: empty results, never fails.
    pub fn offline() -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
            live: false,
        }
    }

    /// Script hits for queries containing `query_substring`.
    pub fn with_hits_for(self, query_substring: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        self.scripted
            .lock()
            .expect("mock search lock poisoned")
            .insert(query_substring.into(), hits);
        self
    }
}

impl Default for MockSearchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchClient for MockSearchClient {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        let scripted = self.scripted.lock().expect("mock search lock poisoned");
        Ok(scripted
            .iter()
            .filter(|(key, _)| query.contains(key.as_str()))
            .flat_map(|(_, hits)| hits.clone())
            .collect())
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

/// A scored, deduplicated search hit awaiting evidence assessment.
#[derive(Debug, Clone)]
pub struct EvidenceCandidate {
    pub url: String,
    pub domain: String,
    pub snippet: String,
    pub authority: f64,
    pub relevance: f64,
}

impl EvidenceCandidate {
    /// Convert into an evidence item with a stance.
    pub fn into_item(self, scorer: &AuthorityScorer, supports: bool) -> EvidenceItem {
        EvidenceItem {
            source_class: scorer.classify(&self.domain),
            url: self.url,
            domain: self.domain,
            authority: self.authority,
            snippet: self.snippet,
            supports,
            relevance: self.relevance,
            retrieved_at: Utc::now(),
        }
    }
}

/// Keyword overlap between a query and a snippet, in [0, 1].
pub fn relevance_score(query: &str, snippet: &str) -> f64 {
    let query_tokens: HashSet<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.len() > 2)
        .collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let snippet_lower = snippet.to_lowercase();
    let hits = query_tokens
        .iter()
        .filter(|t| snippet_lower.contains(t.as_str()))
        .count();
    hits as f64 / query_tokens.len() as f64
}

/// Rate-limited, scoring search executor.
pub struct SearchExecutor {
    client: Arc<dyn SearchClient>,
    scorer: Arc<AuthorityScorer>,
    hosts: Arc<HostRateLimiter>,
    max_results_per_query: usize,
}

impl SearchExecutor {
    pub fn new(
        client: Arc<dyn SearchClient>,
        scorer: Arc<AuthorityScorer>,
        hosts: Arc<HostRateLimiter>,
    ) -> Self {
        Self {
            client,
            scorer,
            hosts,
            max_results_per_query: 8,
        }
    }

    pub fn is_live(&self) -> bool {
        self.client.is_live()
    }

    pub fn scorer(&self) -> &AuthorityScorer {
        &self.scorer
    }

    /// Run one attempt's queries, scoring hits and dedupping by canonical
    /// URL against everything already seen for this fact.
    pub async fn execute(
        &self,
        queries: &[String],
        seen_urls: &mut HashSet<String>,
    ) -> Result<Vec<EvidenceCandidate>> {
        let mut candidates = Vec::new();
        for query in queries {
            self.hosts.acquire("search-api").await;
            let hits = self.client.search(query, self.max_results_per_query).await?;
            for hit in hits {
                let canonical = normalize(&hit.url).unwrap_or_else(|_| hit.url.clone());
                if !seen_urls.insert(canonical.clone()) {
                    continue;
                }
                let Some(domain) = host_of(&canonical) else {
                    continue;
                };
                candidates.push(EvidenceCandidate {
                    authority: self.scorer.score(&domain),
                    relevance: relevance_score(query, &format!("{} {}", hit.title, hit.snippet)),
                    url: canonical,
                    domain,
                    snippet: hit.snippet,
                });
            }
        }
        Ok(candidates)
    }
}
