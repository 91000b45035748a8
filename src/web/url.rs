//! Canonical URL normalization and investigation-scoped dedup.
//!
//! Normalization is the compatibility-critical dedup key: lowercase scheme
//! and IDNA-normalized host, default port and fragment removed, tracking
//! params stripped, remaining params sorted by name (multi-value order
//! preserved), dot segments resolved, trailing slash dropped unless the
//! path is `/`. The operation is idempotent.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use url::Url;

use crate::error::{Error, Result};
use crate::investigation::InvestigationId;

/// Query params dropped during normalization.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
];

fn is_tracking_param(name: &str) -> bool {
    TRACKING_PARAMS.contains(&name)
}

/// Normalize a URL to its canonical dedup form.
pub fn normalize(input: &str) -> Result<String> {
    let mut url = Url::parse(input.trim())
        .map_err(|e| Error::validation(format!("invalid URL {input:?}: {e}")))?;
    if url.host_str().is_none() {
        return Err(Error::validation(format!("URL {input:?} has no host")));
    }

    url.set_fragment(None);

    let kept: Vec<(String, String)> = {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .filter(|(k, _)| !is_tracking_param(k))
            .collect();
        // Stable sort: multi-value order within a name is preserved.
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    };
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        url.set_query(Some(&query));
    }

    let path = url.path().to_string();
    let trimmed = path.trim_end_matches('/');
    url.set_path(if trimmed.is_empty() { "/" } else { trimmed });

    Ok(url.to_string())
}

/// Host portion of a URL, for rate limiting and authority scoring.
pub fn host_of(input: &str) -> Option<String> {
    Url::parse(input)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Investigation-scoped URL dedup. The same URL in a different
/// investigation is a distinct entry.
pub struct UrlManager {
    seen: Mutex<HashMap<InvestigationId, HashSet<String>>>,
}

impl Default for UrlManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlManager {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Claim a URL for an investigation. Returns the canonical form when
    /// the URL is new, `None` when it is a duplicate.
    pub fn claim(&self, investigation_id: InvestigationId, raw: &str) -> Result<Option<String>> {
        let canonical = normalize(raw)?;
        let mut seen = self.seen.lock().expect("url manager lock poisoned");
        let set = seen.entry(investigation_id).or_default();
        if set.insert(canonical.clone()) {
            Ok(Some(canonical))
        } else {
            Ok(None)
        }
    }

    pub fn is_known(&self, investigation_id: InvestigationId, raw: &str) -> bool {
        match normalize(raw) {
            Ok(canonical) => self
                .seen
                .lock()
                .expect("url manager lock poisoned")
                .get(&investigation_id)
                .map(|set| set.contains(&canonical))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    pub fn known_count(&self, investigation_id: InvestigationId) -> usize {
        self.seen
            .lock()
            .expect("url manager lock poisoned")
            .get(&investigation_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }
}
