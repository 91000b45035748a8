//! Hybrid web crawler: HTTP fast path with a headless-browser fallback
//! for JavaScript-heavy pages.
//!
//! JS-heavy rendering is detected by framework markers or a thin visible
//! body; the fallback goes through a headless content service (an HTTP
//! endpoint rendering the page and returning HTML). A small user-agent
//! pool is rotated per request.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::limiter::HostRateLimiter;
use crate::web::host_of;

use super::document::extract_web_document;
use super::types::{
    Article, ArticleMetadata, ArticleSource, CrawlError, CrawlOutcome, CrawlRequest, CrawlStats,
    Crawler, SourceType,
};

/// Markers indicating a client-side-rendered shell.
const FRAMEWORK_MARKERS: &[&str] = &[
    "__NEXT_DATA__",
    "data-reactroot",
    "ng-version",
    "id=\"root\"",
    "id=\"app\"",
];

/// Visible text below this length suggests an unrendered shell.
const THIN_BODY_CHARS: usize = 200;

/// HTTP-first web crawler with headless fallback.
pub struct HybridWebCrawler {
    http: Client,
    headless: Option<HeadlessService>,
    user_agents: Vec<String>,
    limiter: Arc<HostRateLimiter>,
    min_content_chars: usize,
}

struct HeadlessService {
    endpoint: String,
    http: Client,
}

impl HybridWebCrawler {
    pub fn new(
        http: Client,
        user_agents: Vec<String>,
        limiter: Arc<HostRateLimiter>,
        min_content_chars: usize,
    ) -> Self {
        Self {
            http,
            headless: None,
            user_agents,
            limiter,
            min_content_chars,
        }
    }

    /// Enable the headless content-service fallback.
    pub fn with_headless_endpoint(
        mut self,
        endpoint: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        self.headless = Some(HeadlessService {
            endpoint: endpoint.into(),
            http: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
        });
        self
    }

    fn pick_user_agent(&self) -> Option<&str> {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    async fn fetch_page(&self, url: &str) -> Result<(String, String)> {
        if let Some(host) = host_of(url) {
            self.limiter.acquire(&host).await;
        }

        let mut request = self.http.get(url);
        if let Some(ua) = self.pick_user_agent() {
            request = request.header("User-Agent", ua);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::transient(format!("page fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::transient(format!(
                "page fetch returned {}",
                response.status()
            )));
        }
        let html = response
            .text()
            .await
            .map_err(|e| Error::transient(format!("page read failed: {e}")))?;

        let (title, content) = extract_web_document(&html);
        if is_js_heavy(&html, &content) {
            debug!(url = %url, "JS-heavy page detected, trying headless path");
            if let Some(rendered) = self.fetch_headless(url).await? {
                return Ok(extract_web_document(&rendered));
            }
        }
        Ok((title, content))
    }

    /// Render through the headless service. Returns `Ok(None)` when no
    /// service is configured; the caller keeps the fast-path content.
    async fn fetch_headless(&self, url: &str) -> Result<Option<String>> {
        let Some(service) = &self.headless else {
            debug!("no headless endpoint configured, keeping fast-path content");
            return Ok(None);
        };

        let response = service
            .http
            .post(format!("{}/content", service.endpoint))
            .json(&json!({ "url": url }))
            .send()
            .await
            .map_err(|e| Error::transient(format!("headless fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::transient(format!(
                "headless service returned {}",
                response.status()
            )));
        }
        let html = response
            .text()
            .await
            .map_err(|e| Error::transient(format!("headless read failed: {e}")))?;
        Ok(Some(html))
    }
}

/// Framework markers or a thin visible body mark a page as JS-heavy.
fn is_js_heavy(html: &str, visible_text: &str) -> bool {
    let has_marker = FRAMEWORK_MARKERS.iter().any(|m| html.contains(m));
    has_marker || visible_text.len() < THIN_BODY_CHARS
}

#[async_trait::async_trait]
impl Crawler for HybridWebCrawler {
    fn name(&self) -> &str {
        "hybrid-web-crawler"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Web
    }

    fn capability(&self) -> &'static str {
        "fetch.web"
    }

    async fn fetch(&self, request: &CrawlRequest) -> Result<CrawlOutcome> {
        let mut stats = CrawlStats::default();
        let mut errors = Vec::new();
        let mut articles = Vec::new();

        for url in &request.constraints.seed_urls {
            stats.sources_attempted += 1;
            match self.fetch_page(url).await {
                Ok((title, content)) => {
                    stats.items_fetched += 1;
                    if content.len() < self.min_content_chars {
                        debug!(url = %url, "page content below floor, discarded");
                        continue;
                    }
                    articles.push(Article {
                        url: url.clone(),
                        title,
                        content,
                        published_date: None,
                        authors: Vec::new(),
                        source: ArticleSource {
                            id: format!(
                                "web:{}",
                                host_of(url).unwrap_or_else(|| "unknown".to_string())
                            ),
                            name: host_of(url).unwrap_or_else(|| "web".to_string()),
                            source_type: SourceType::Web,
                        },
                        metadata: ArticleMetadata {
                            source_type: SourceType::Web,
                            authority_level: 3,
                            topic_specialization: None,
                            retrieved_at: Utc::now(),
                        },
                    });
                }
                Err(e) => {
                    stats.sources_failed += 1;
                    warn!(url = %url, error = %e, "page failed, continuing");
                    errors.push(CrawlError {
                        source: url.clone(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_markers_trigger_detection() {
        let shell = r#"<html><body><div id="root"></div><script>window.__NEXT_DATA__={}</script></body></html>"#;
        assert!(is_js_heavy(shell, ""));
    }

    #[test]
    fn thin_body_triggers_detection() {
        let html = "<html><body><p>tiny</p></body></html>";
        assert!(is_js_heavy(html, "tiny"));
    }

    #[test]
    fn rich_static_page_is_not_js_heavy() {
        let text = "static content ".repeat(30);
        let html = format!("<html><body><p>{text}</p></body></html>");
        assert!(!is_js_heavy(&html, &text));
    }

    #[test]
    fn user_agent_pool_rotation() {
        let crawler = HybridWebCrawler::new(
            Client::new(),
            vec!["ua-a".to_string(), "ua-b".to_string()],
            Arc::new(HostRateLimiter::new(10.0, Default::default())),
            100,
        );
        let ua = crawler.pick_user_agent().unwrap();
        assert!(ua == "ua-a" || ua == "ua-b");
    }
}
