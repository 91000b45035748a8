//! The crawler cohort: news-feed, social, document, and hybrid-web
//! fetchers behind a uniform capability interface, coordinated over the
//! message bus.

mod document;
mod host;
mod news;
mod social;
mod types;
mod web;

pub use document::DocumentCrawler;
pub use host::{crawl_topic, CrawlSummary, CrawlerHost};
pub use news::NewsFeedCrawler;
pub use social::SocialCrawler;
pub use types::{
    Article, ArticleMetadata, ArticleSource, CrawlConstraints, CrawlError, CrawlOutcome,
    CrawlRequest, CrawlStats, Crawler, SourceType,
};
pub use web::HybridWebCrawler;
