//! Article store: investigation-keyed, URL-deduplicated, O(1) save and
//! retrieve.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::crawler::Article;
use crate::error::Result;
use crate::investigation::InvestigationId;

/// Wrapper returned by retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleSet {
    pub articles: Vec<Article>,
    pub total_articles: usize,
}

/// Outcome of a save call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: usize,
    pub duplicates: usize,
}

#[derive(Default)]
struct InvestigationArticles {
    by_url: HashMap<String, Article>,
    /// URLs in first-save order.
    order: Vec<String>,
}

#[derive(Default)]
struct ArticleStoreInner {
    investigations: HashMap<InvestigationId, InvestigationArticles>,
    /// Global URL -> investigations that hold it.
    url_index: HashMap<String, Vec<InvestigationId>>,
}

/// In-memory article store. Articles are immutable after save and never
/// deleted during a run.
#[derive(Default)]
pub struct ArticleStore {
    inner: RwLock<ArticleStoreInner>,
}

/// Deterministic snapshot layout: investigations sorted by id, articles in
/// first-save order.
#[derive(Serialize, Deserialize)]
struct ArticleSnapshot {
    investigations: Vec<InvestigationSnapshot>,
}

#[derive(Serialize, Deserialize)]
struct InvestigationSnapshot {
    investigation_id: InvestigationId,
    articles: Vec<Article>,
}

impl ArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save articles, skipping URLs already present in the investigation.
    /// Idempotent per URL.
    pub fn save_articles(
        &self,
        investigation_id: InvestigationId,
        articles: Vec<Article>,
    ) -> SaveReport {
        let mut inner = self.inner.write().expect("article store lock poisoned");
        let inner = &mut *inner;
        let mut report = SaveReport::default();

        for article in articles {
            let entry = inner.investigations.entry(investigation_id).or_default();
            let url = article.url.clone();
            if entry.by_url.contains_key(&url) {
                report.duplicates += 1;
                continue;
            }
            entry.order.push(url.clone());
            entry.by_url.insert(url.clone(), article);
            inner.url_index.entry(url).or_default().push(investigation_id);
            report.saved += 1;
        }
        report
    }

    /// All articles for an investigation, in first-save order.
    pub fn retrieve_by_investigation(&self, investigation_id: InvestigationId) -> ArticleSet {
        let inner = self.inner.read().expect("article store lock poisoned");
        let articles = inner
            .investigations
            .get(&investigation_id)
            .map(|inv| {
                inv.order
                    .iter()
                    .filter_map(|url| inv.by_url.get(url))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        ArticleSet {
            total_articles: articles.len(),
            articles,
        }
    }

    /// O(1) duplicate probe.
    pub fn contains(&self, investigation_id: InvestigationId, url: &str) -> bool {
        let inner = self.inner.read().expect("article store lock poisoned");
        inner
            .investigations
            .get(&investigation_id)
            .map(|inv| inv.by_url.contains_key(url))
            .unwrap_or(false)
    }

    /// Which investigations hold a URL.
    pub fn investigations_for_url(&self, url: &str) -> Vec<InvestigationId> {
        let inner = self.inner.read().expect("article store lock poisoned");
        inner.url_index.get(url).cloned().unwrap_or_default()
    }

    pub fn count(&self, investigation_id: InvestigationId) -> usize {
        let inner = self.inner.read().expect("article store lock poisoned");
        inner
            .investigations
            .get(&investigation_id)
            .map(|inv| inv.order.len())
            .unwrap_or(0)
    }

    /// Snapshot to a JSON file. Deterministic: re-snapshotting a reloaded
    /// store produces an identical file.
    pub fn snapshot_to(&self, path: &Path) -> Result<()> {
        let inner = self.inner.read().expect("article store lock poisoned");
        let mut ids: Vec<InvestigationId> = inner.investigations.keys().copied().collect();
        ids.sort();

        let snapshot = ArticleSnapshot {
            investigations: ids
                .into_iter()
                .map(|id| {
                    let inv = &inner.investigations[&id];
                    InvestigationSnapshot {
                        investigation_id: id,
                        articles: inv
                            .order
                            .iter()
                            .filter_map(|url| inv.by_url.get(url))
                            .cloned()
                            .collect(),
                    }
                })
                .collect(),
        };
        super::write_snapshot(path, &snapshot)
    }

    /// Load a snapshot, rebuilding indices deterministically.
    pub fn load_from(path: &Path) -> Result<Self> {
        let snapshot: ArticleSnapshot = super::read_snapshot(path)?;
        let store = Self::new();
        for inv in snapshot.investigations {
            store.save_articles(inv.investigation_id, inv.articles);
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{ArticleMetadata, ArticleSource, SourceType};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn article(url: &str) -> Article {
        Article {
            url: url.to_string(),
            title: format!("title for {url}"),
            content: "body".to_string(),
            published_date: None,
            authors: vec![],
            source: ArticleSource {
                id: "reuters-world".to_string(),
                name: "Reuters World".to_string(),
                source_type: SourceType::Rss,
            },
            metadata: ArticleMetadata {
                source_type: SourceType::Rss,
                authority_level: 5,
                topic_specialization: None,
                retrieved_at: Utc::now(),
            },
        }
    }

    #[test]
    fn save_is_idempotent_per_url() {
        let store = ArticleStore::new();
        let inv = InvestigationId::new();

        let first = store.save_articles(inv, vec![article("https://a/1"), article("https://a/2")]);
        assert_eq!(first, SaveReport { saved: 2, duplicates: 0 });

        let second = store.save_articles(inv, vec![article("https://a/1")]);
        assert_eq!(second, SaveReport { saved: 0, duplicates: 1 });
        assert_eq!(store.count(inv), 2);
    }

    #[test]
    fn retrieve_round_trips_saved_set() {
        let store = ArticleStore::new();
        let inv = InvestigationId::new();
        let saved = vec![article("https://a/1"), article("https://a/2"), article("https://a/3")];
        store.save_articles(inv, saved.clone());

        let set = store.retrieve_by_investigation(inv);
        assert_eq!(set.total_articles, 3);
        let urls: Vec<&str> = set.articles.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a/1", "https://a/2", "https://a/3"]);
    }

    #[test]
    fn same_url_across_investigations_is_distinct() {
        let store = ArticleStore::new();
        let inv_a = InvestigationId::new();
        let inv_b = InvestigationId::new();
        store.save_articles(inv_a, vec![article("https://a/1")]);
        store.save_articles(inv_b, vec![article("https://a/1")]);

        assert_eq!(store.count(inv_a), 1);
        assert_eq!(store.count(inv_b), 1);
        assert_eq!(store.investigations_for_url("https://a/1").len(), 2);
    }

    #[test]
    fn snapshot_round_trip_is_deterministic() {
        let store = ArticleStore::new();
        let inv = InvestigationId::new();
        store.save_articles(inv, vec![article("https://a/1"), article("https://a/2")]);

        let dir = tempfile::tempdir().unwrap();
        let first_path = dir.path().join("articles.json");
        let second_path = dir.path().join("articles2.json");

        store.snapshot_to(&first_path).unwrap();
        let reloaded = ArticleStore::load_from(&first_path).unwrap();
        reloaded.snapshot_to(&second_path).unwrap();

        let first = std::fs::read_to_string(&first_path).unwrap();
        let second = std::fs::read_to_string(&second_path).unwrap();
        assert_eq!(first, second);
        assert_eq!(reloaded.count(inv), 2);
    }
}
