//! Domain authority scoring.
//!
//! Baseline scores come from a tier table keyed on the source domain;
//! per-outlet overrides take precedence, and metadata signals nudge the
//! result. The same scorer backs crawler authority levels, the credibility
//! formula's `SourceCred`, and verification evidence weighting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Wire services: the highest-authority tier.
const WIRE_SERVICES: &[&str] = &[
    "reuters.com",
    "apnews.com",
    "afp.com",
    "bloomberg.com",
    "upi.com",
];

/// Major news outlets, used for evidence-class grading.
const NEWS_OUTLETS: &[&str] = &[
    "bbc.com",
    "bbc.co.uk",
    "nytimes.com",
    "washingtonpost.com",
    "theguardian.com",
    "aljazeera.com",
    "cnn.com",
    "ft.com",
    "economist.com",
    "dw.com",
];

/// Social platforms: the lowest-authority tier.
const SOCIAL_PLATFORMS: &[&str] = &[
    "reddit.com",
    "twitter.com",
    "x.com",
    "facebook.com",
    "t.me",
    "tiktok.com",
    "youtube.com",
];

/// Coarse source class, used by the evidence aggregator's graduated
/// confidence rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    Wire,
    Official,
    Organization,
    News,
    Social,
    Unknown,
}

/// Metadata signals adjusting a baseline score.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthoritySignals {
    pub verified_author: bool,
    pub recent_publication: bool,
    pub high_engagement: bool,
}

/// Tier-table scorer with per-outlet overrides.
pub struct AuthorityScorer {
    overrides: HashMap<String, f64>,
}

impl Default for AuthorityScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorityScorer {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// Add explicit per-outlet overrides (domain -> score).
    pub fn with_overrides(mut self, overrides: HashMap<String, f64>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Classify a domain into its source class.
    pub fn classify(&self, domain: &str) -> SourceClass {
        let domain = domain.to_ascii_lowercase();
        if domain_in(&domain, WIRE_SERVICES) {
            SourceClass::Wire
        } else if domain.ends_with(".gov")
            || domain.contains(".gov.")
            || domain.ends_with(".edu")
            || domain.ends_with(".mil")
        {
            SourceClass::Official
        } else if domain_in(&domain, SOCIAL_PLATFORMS) {
            SourceClass::Social
        } else if domain_in(&domain, NEWS_OUTLETS) {
            SourceClass::News
        } else if domain.ends_with(".org") {
            SourceClass::Organization
        } else {
            SourceClass::Unknown
        }
    }

    /// Baseline authority for a domain.
    pub fn score(&self, domain: &str) -> f64 {
        let domain = domain.to_ascii_lowercase();
        if let Some(&score) = self.overrides.get(&domain) {
            return score.clamp(0.0, 1.0);
        }
        match self.classify(&domain) {
            SourceClass::Wire => 0.9,
            SourceClass::Official => 0.85,
            SourceClass::News => 0.75,
            SourceClass::Organization => 0.7,
            SourceClass::Social => 0.3,
            SourceClass::Unknown => 0.5,
        }
    }

    /// Baseline adjusted by metadata signals, clamped to [0, 1].
    pub fn score_with_signals(&self, domain: &str, signals: AuthoritySignals) -> f64 {
        let mut score = self.score(domain);
        if signals.verified_author {
            score += 0.05;
        }
        if signals.recent_publication {
            score += 0.03;
        }
        if signals.high_engagement {
            score += 0.02;
        }
        score.clamp(0.0, 1.0)
    }

    /// Map a score into the 1..=5 authority level carried on articles.
    pub fn authority_level(&self, score: f64) -> u8 {
        if score >= 0.85 {
            5
        } else if score >= 0.7 {
            4
        } else if score >= 0.5 {
            3
        } else if score >= 0.3 {
            2
        } else {
            1
        }
    }
}

/// Suffix match with a label boundary: `news.reuters.com` matches
/// `reuters.com` but `notreuters.com` does not.
fn domain_in(domain: &str, table: &[&str]) -> bool {
    table
        .iter()
        .any(|entry| domain == *entry || domain.ends_with(&format!(".{entry}")))
}
