//! Document crawler: PDFs and long-form web documents.
//!
//! PDF text goes through the primary extractor with a salvage fallback;
//! web documents go structured-content -> readability heuristic -> raw DOM.
//! Anything shorter than the configured minimum is discarded as
//! low-quality.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::limiter::HostRateLimiter;
use crate::web::host_of;

use super::types::{
    Article, ArticleMetadata, ArticleSource, CrawlError, CrawlOutcome, CrawlRequest, CrawlStats,
    Crawler, SourceType,
};

/// PDF/web document crawler over seed URLs.
pub struct DocumentCrawler {
    http: Client,
    limiter: Arc<HostRateLimiter>,
    min_content_chars: usize,
}

impl DocumentCrawler {
    pub fn new(http: Client, limiter: Arc<HostRateLimiter>, min_content_chars: usize) -> Self {
        Self {
            http,
            limiter,
            min_content_chars,
        }
    }

    async fn fetch_document(&self, url: &str) -> Result<(String, String)> {
        if let Some(host) = host_of(url) {
            self.limiter.acquire(&host).await;
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transient(format!("document fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::transient(format!(
                "document fetch returned {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let is_pdf = content_type.contains("application/pdf") || url.to_lowercase().ends_with(".pdf");

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::transient(format!("document read failed: {e}")))?;

        if is_pdf {
            let text = extract_pdf_text(&bytes)?;
            Ok((String::new(), text))
        } else {
            let html = String::from_utf8_lossy(&bytes).into_owned();
            Ok(extract_web_document(&html))
        }
    }
}

/// Primary PDF extraction with a whitespace-salvage fallback for documents
/// the layout pass chokes on.
fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => Ok(text),
        Err(primary_err) => {
            debug!(error = %primary_err, "primary PDF extractor failed, salvaging");
            let salvaged: String = bytes
                .split(|b| !b.is_ascii_graphic() && *b != b' ')
                .filter(|run| run.len() > 3)
                .filter_map(|run| std::str::from_utf8(run).ok())
                .collect::<Vec<_>>()
                .join(" ");
            if salvaged.len() > 100 {
                Ok(salvaged)
            } else {
                Err(Error::validation(format!(
                    "PDF unextractable: {primary_err}"
                )))
            }
        }
    }
}

/// Title and body text from an HTML document via the three-stage chain.
pub(crate) fn extract_web_document(html: &str) -> (String, String) {
    let document = Html::parse_document(html);
    let title = select_text(&document, "title").unwrap_or_default();

    let body = extract_structured(&document)
        .or_else(|| extract_readable(&document))
        .unwrap_or_else(|| extract_raw_text(&document));

    (title, body)
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn select_text(document: &Html, css: &str) -> Option<String> {
    document
        .select(&selector(css))
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Stage 1: structured-content containers.
fn extract_structured(document: &Html) -> Option<String> {
    let containers = selector("article, main, [role=\"main\"]");
    document
        .select(&containers)
        .map(|el| {
            el.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .max_by_key(String::len)
        .filter(|text| text.len() > 200)
}

/// Stage 2: readability heuristic over paragraph density.
fn extract_readable(document: &Html) -> Option<String> {
    let paragraphs = selector("p");
    let text: Vec<String> = document
        .select(&paragraphs)
        .map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string())
        .filter(|t| t.len() > 60)
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.join("\n\n"))
    }
}

/// Stage 3: raw DOM text from content-bearing elements.
fn extract_raw_text(document: &Html) -> String {
    let content = selector("p, h1, h2, h3, h4, h5, h6, li, td, blockquote");
    document
        .select(&content)
        .map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait::async_trait]
impl Crawler for DocumentCrawler {
    fn name(&self) -> &str {
        "document-crawler"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Document
    }

    fn capability(&self) -> &'static str {
        "fetch.document"
    }

    async fn fetch(&self, request: &CrawlRequest) -> Result<CrawlOutcome> {
        let mut stats = CrawlStats::default();
        let mut errors = Vec::new();
        let mut articles = Vec::new();

        for url in &request.constraints.seed_urls {
            stats.sources_attempted += 1;
            match self.fetch_document(url).await {
                Ok((title, content)) => {
                    stats.items_fetched += 1;
                    if content.len() < self.min_content_chars {
                        debug!(url = %url, chars = content.len(), "document below quality floor, discarded");
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
                                "document:{}",
                                host_of(url).unwrap_or_else(|| "unknown".to_string())
                            ),
                            name: host_of(url).unwrap_or_else(|| "document".to_string()),
                            source_type: SourceType::Document,
                        },
                        metadata: ArticleMetadata {
                            source_type: SourceType::Document,
                            authority_level: 3,
                            topic_specialization: None,
                            retrieved_at: Utc::now(),
                        },
                    });
                }
                Err(e) => {
                    stats.sources_failed += 1;
                    warn!(url = %url, error = %e, "document failed, continuing");
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
