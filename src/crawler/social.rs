//! Social crawler: Reddit JSON API search over configured subreddits.
//!
//! Authority gates keep posts with score > 10, more than 5 comments and a
//! live author; posts scoring over 100 also get their top comment chain
//! pulled into the article body.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::limiter::HostRateLimiter;

use super::types::{
    Article, ArticleMetadata, ArticleSource, CrawlError, CrawlOutcome, CrawlRequest, CrawlStats,
    Crawler, SourceType,
};

const REDDIT_HOST: &str = "www.reddit.com";
const USER_AGENT: &str = "sift-core/0.1 (investigation crawler)";

/// Minimum score to keep a post.
const MIN_SCORE: i64 = 10;
/// Minimum comment count to keep a post.
const MIN_COMMENTS: i64 = 5;
/// Score above which the comment chain is pulled.
const COMMENT_PULL_SCORE: i64 = 100;

/// Reddit-style social crawler.
pub struct SocialCrawler {
    http: Client,
    subreddits: Vec<String>,
    limiter: Arc<HostRateLimiter>,
    base_url: String,
}

impl SocialCrawler {
    pub fn new(http: Client, subreddits: Vec<String>, limiter: Arc<HostRateLimiter>) -> Self {
        Self {
            http,
            subreddits,
            limiter,
            base_url: format!("https://{REDDIT_HOST}"),
        }
    }

    /// Override the API base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn search_subreddit(
        &self,
        subreddit: &str,
        request: &CrawlRequest,
    ) -> Result<Vec<Article>> {
        self.limiter.acquire(REDDIT_HOST).await;

        let window = match request.constraints.time_window_days {
            Some(d) if d <= 1 => "day",
            Some(d) if d <= 7 => "week",
            Some(d) if d <= 31 => "month",
            _ => "year",
        };
        let url = format!("{}/r/{}/search.json", self.base_url, subreddit);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("q", request.query.as_str()),
                ("restrict_sr", "on"),
                ("sort", "new"),
                ("t", window),
                ("limit", "25"),
            ])
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| Error::transient(format!("r/{subreddit} search failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::transient(format!(
                "r/{subreddit} search returned {}",
                response.status()
            )));
        }

        let listing: RedditResponse = response
            .json()
            .await
            .map_err(|e| Error::validation(format!("r/{subreddit} response unparseable: {e}")))?;

        let mut articles = Vec::new();
        for child in listing.data.children {
            let post = child.data;
            if !post.passes_gates() {
                continue;
            }

            let mut content = post.selftext.clone().unwrap_or_default();
            if post.score > COMMENT_PULL_SCORE {
                match self.fetch_comments(&post.permalink).await {
                    Ok(comments) if !comments.is_empty() => {
                        content.push_str("\n\nTop comments:\n");
                        content.push_str(&comments.join("\n"));
                    }
                    Ok(_) => {}
                    Err(e) => warn!(permalink = %post.permalink, error = %e, "comment pull failed"),
                }
            }

            articles.push(Article {
                url: format!("{}{}", self.base_url, post.permalink),
                title: post.title.clone(),
                content,
                published_date: Utc.timestamp_opt(post.created_utc as i64, 0).single(),
                authors: vec![post.author.clone()],
                source: ArticleSource {
                    id: format!("reddit:r/{subreddit}"),
                    name: format!("r/{subreddit}"),
                    source_type: SourceType::Reddit,
                },
                metadata: ArticleMetadata {
                    source_type: SourceType::Reddit,
                    authority_level: 2,
                    topic_specialization: Some(subreddit.to_string()),
                    retrieved_at: Utc::now(),
                },
            });
        }
        Ok(articles)
    }

    async fn fetch_comments(&self, permalink: &str) -> Result<Vec<String>> {
        self.limiter.acquire(REDDIT_HOST).await;
        let url = format!("{}{}.json", self.base_url, permalink.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[("limit", "20")])
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| Error::transient(format!("comment fetch failed: {e}")))?;

        // The comments endpoint returns [post_listing, comment_listing].
        let listings: Vec<RedditResponse> = response
            .json()
            .await
            .map_err(|e| Error::validation(format!("comment response unparseable: {e}")))?;

        Ok(listings
            .into_iter()
            .nth(1)
            .map(|listing| {
                listing
                    .data
                    .children
                    .into_iter()
                    .filter_map(|c| c.data.body)
                    .take(10)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct RedditResponse {
    data: RedditListing,
}

#[derive(Debug, Deserialize)]
struct RedditListing {
    #[serde(default)]
    children: Vec<RedditChild>,
}

#[derive(Debug, Deserialize)]
struct RedditChild {
    data: RedditPost,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RedditPost {
    title: String,
    selftext: Option<String>,
    author: String,
    score: i64,
    num_comments: i64,
    permalink: String,
    created_utc: f64,
    /// Comment body, present on t1 children of the comments endpoint.
    body: Option<String>,
}

impl RedditPost {
    fn passes_gates(&self) -> bool {
        self.score > MIN_SCORE
            && self.num_comments > MIN_COMMENTS
            && self.author != "[deleted]"
            && !self.author.is_empty()
    }
}

#[async_trait::async_trait]
impl Crawler for SocialCrawler {
    fn name(&self) -> &str {
        "social-crawler"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Reddit
    }

    fn capability(&self) -> &'static str {
        "fetch.social"
    }

    async fn fetch(&self, request: &CrawlRequest) -> Result<CrawlOutcome> {
        let mut stats = CrawlStats::default();
        let mut errors = Vec::new();
        let mut articles = Vec::new();

        for subreddit in &self.subreddits {
            stats.sources_attempted += 1;
            match self.search_subreddit(subreddit, request).await {
                Ok(batch) => {
                    stats.items_fetched += batch.len() as u32;
                    articles.extend(batch);
                }
                Err(e) => {
                    stats.sources_failed += 1;
                    warn!(subreddit = %subreddit, error = %e, "subreddit failed, continuing");
                    errors.push(CrawlError {
                        source: format!("r/{subreddit}"),
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

    fn post(score: i64, comments: i64, author: &str) -> RedditPost {
        RedditPost {
            title: "t".to_string(),
            author: author.to_string(),
            score,
            num_comments: comments,
            ..Default::default()
        }
    }

    #[test]
    fn authority_gates() {
        assert!(post(11, 6, "someone").passes_gates());
        assert!(!post(10, 6, "someone").passes_gates());
        assert!(!post(11, 5, "someone").passes_gates());
        assert!(!post(11, 6, "[deleted]").passes_gates());
        assert!(!post(500, 300, "").passes_gates());
    }

    #[test]
    fn listing_deserializes() {
        let json = r#"{
            "data": {
                "children": [
                    {"data": {"title": "Troops spotted", "selftext": "details",
                     "author": "watcher", "score": 120, "num_comments": 44,
                     "permalink": "/r/geopolitics/comments/abc/troops_spotted/",
                     "created_utc": 1715680000.0}}
                ]
            }
        }"#;
        let listing: RedditResponse = serde_json::from_str(json).unwrap();
        assert_eq!(listing.data.children.len(), 1);
        let p = &listing.data.children[0].data;
        assert!(p.passes_gates());
        assert!(p.score > COMMENT_PULL_SCORE);
    }
}
