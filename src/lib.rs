//! # sift-core
//!
//! A multi-agent OSINT investigation library: given a natural-language
//! objective, coordinated workers fetch text from heterogeneous sources,
//! extract discrete factual claims, classify them by impact and
//! trustworthiness, and verify the dubious ones with targeted follow-up
//! searches.
//!
//! ## Core Components
//!
//! - **Bus / Registry / Limiter**: the coordination substrate shared by
//!   every worker
//! - **Crawlers**: news-feed, social, document, and hybrid-web fetchers
//! - **Facts**: LLM-driven extraction plus hash-based consolidation with
//!   variant linking
//! - **Classification**: credibility scoring, impact tiers, and the
//!   dubious taxonomy (phantom, fog, anomaly, noise)
//! - **Verification**: species-specialized searches that confirm, refute,
//!   or supersede dubious facts
//! - **Orchestrator**: the adaptive plan-execute-evaluate loop on top
//!
//! ## Example
//!
//! ```rust,ignore
//! use sift_core::{
//!     CancelToken, CoreServices, PlanningOrchestrator, SiftConfig,
//! };
//!
//! let config = SiftConfig::from_env();
//! config.validate()?;
//! let services = CoreServices::init(&config);
//!
//! let outcome = orchestrator
//!     .run("uranium shipments through the strait", &CancelToken::new())
//!     .await?;
//! println!("{} confirmed facts", outcome.synthesis.confirmed_facts.len());
//! ```

pub mod bus;
pub mod cancel;
pub mod classify;
pub mod config;
pub mod crawler;
pub mod error;
pub mod fact;
pub mod investigation;
pub mod limiter;
pub mod llm;
pub mod orchestrator;
pub mod registry;
pub mod services;
pub mod store;
pub mod verify;
pub mod web;

// Re-exports for convenience
pub use bus::{topics, BusMessage, MessageBus, SubscriptionId};
pub use cancel::CancelToken;
pub use classify::{
    ClassificationEngine, Contradiction, ContradictionType, CredibilityBreakdown,
    CredibilityModel, DubiousFlag, FactClassification, ImpactModel, ImpactTier,
    VerificationStatus,
};
pub use config::{CoverageTargets, SiftConfig};
pub use crawler::{
    Article, CrawlOutcome, CrawlRequest, Crawler, CrawlerHost, DocumentCrawler, HybridWebCrawler,
    NewsFeedCrawler, SocialCrawler, SourceType,
};
pub use error::{Error, Result};
pub use fact::{
    content_hash, ExtractedFact, ExtractionPipeline, FactConsolidator, FactExtractionAgent,
    FactId, Provenance,
};
pub use investigation::{Investigation, InvestigationId};
pub use limiter::{HostRateLimiter, LlmRateLimiter, RetryPolicy};
pub use llm::{
    AnthropicClient, ClientConfig, CompletionClient, CompletionRequest, CompletionResponse,
    MockCompletionClient, RateLimitedClient,
};
pub use orchestrator::{
    InvestigationOutcome, OrchestratorDeps, PlanningOrchestrator, Synthesis,
};
pub use registry::{AgentId, AgentRegistry, AgentStatus};
pub use services::CoreServices;
pub use store::{ArticleStore, ClassificationStore, FactStore, VerificationStore};
pub use verify::{
    EvidenceAggregator, MockSearchClient, QueryGenerator, Reclassifier, SearchClient,
    VerificationEngine, VerificationResult,
};
pub use web::{normalize, AuthorityScorer, ContextCoordinator, UrlManager};
