//! Objective decomposition into subtasks.
//!
//! The primary path asks the completion capability for a subtask list;
//! the deterministic keyword fallback is mandatory so the orchestrator
//! functions with no LLM available at all.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::crawler::SourceType;
use crate::llm::{lenient_json, CompletionClient, CompletionRequest};

use super::signal::objective_keywords;
use super::state::Subtask;

const DECOMPOSE_SYSTEM: &str = "\
Decompose the investigation objective into 2-6 crawl subtasks. Output a \
JSON array of {\"description\", \"source_type\" (one of news, reddit, \
document, web), \"keywords\" (array of search terms)}. Cover diverse \
source types.";

#[derive(Debug, Deserialize)]
struct RawSubtask {
    description: String,
    source_type: String,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Subtask priority: `keyword_relevance*0.4 + recency*0.2 +
/// (1 - retry_penalty)*0.2 + diversity_bonus*0.2`.
pub fn subtask_priority(
    keyword_relevance: f64,
    recency: f64,
    retries: u32,
    diversity_bonus: f64,
) -> f64 {
    let retry_penalty = (retries as f64 * 0.25).min(1.0);
    keyword_relevance.clamp(0.0, 1.0) * 0.4
        + recency.clamp(0.0, 1.0) * 0.2
        + (1.0 - retry_penalty) * 0.2
        + diversity_bonus.clamp(0.0, 1.0) * 0.2
}

/// Decompose an objective, optionally biased by entities discovered in
/// earlier iterations.
pub async fn decompose(
    client: Option<&Arc<dyn CompletionClient>>,
    objective: &str,
    known_entities: &[String],
) -> Vec<Subtask> {
    if let Some(client) = client {
        match decompose_with_llm(client, objective).await {
            Some(subtasks) if !subtasks.is_empty() => return subtasks,
            _ => debug!("LLM decomposition unavailable, using keyword fallback"),
        }
    }
    keyword_decompose(objective, known_entities)
}

async fn decompose_with_llm(
    client: &Arc<dyn CompletionClient>,
    objective: &str,
) -> Option<Vec<Subtask>> {
    let request = CompletionRequest::new(objective)
        .with_system(DECOMPOSE_SYSTEM)
        .with_max_tokens(1024)
        .with_temperature(0.2);
    let response = client.complete(request).await.ok()?;
    let value = lenient_json(&response.content).ok()?;
    let raw: Vec<RawSubtask> = serde_json::from_value(value).ok()?;

    let mut used_types = HashSet::new();
    let subtasks: Vec<Subtask> = raw
        .into_iter()
        .filter_map(|r| {
            let source_type = parse_source_type(&r.source_type)?;
            let keywords = if r.keywords.is_empty() {
                objective_keywords(&r.description)
            } else {
                r.keywords
            };
            let relevance = (keywords.len() as f64 / 6.0).min(1.0);
            let diversity = if used_types.insert(source_type) { 1.0 } else { 0.4 };
            Some(Subtask {
                description: r.description,
                source_type,
                keywords,
                priority: subtask_priority(relevance, 1.0, 0, diversity),
                retries: 0,
            })
        })
        .collect();
    Some(subtasks)
}

fn parse_source_type(raw: &str) -> Option<SourceType> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "news" | "rss" => Some(SourceType::Rss),
        "api" => Some(SourceType::Api),
        "reddit" | "social" => Some(SourceType::Reddit),
        "document" | "pdf" | "docs" => Some(SourceType::Document),
        "web" => Some(SourceType::Web),
        _ => None,
    }
}

/// Deterministic fallback: one subtask per source class over the
/// objective's keywords plus any known entities.
pub fn keyword_decompose(objective: &str, known_entities: &[String]) -> Vec<Subtask> {
    let mut keywords = objective_keywords(objective);
    for entity in known_entities.iter().take(4) {
        let lowered = entity.to_lowercase();
        if !keywords.contains(&lowered) {
            keywords.push(lowered);
        }
    }
    if keywords.is_empty() {
        keywords.push(objective.trim().to_lowercase());
    }
    let relevance = (keywords.len() as f64 / 6.0).min(1.0);

    [
        (SourceType::Rss, "search news feeds", 1.0),
        (SourceType::Reddit, "search social discussion", 0.8),
        (SourceType::Web, "crawl open web coverage", 0.6),
        (SourceType::Document, "collect primary documents", 0.4),
    ]
    .into_iter()
    .map(|(source_type, action, diversity)| Subtask {
        description: format!("{action}: {objective}"),
        source_type,
        keywords: keywords.clone(),
        priority: subtask_priority(relevance, 1.0, 0, diversity),
        retries: 0,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockCompletionClient;

    #[tokio::test]
    async fn llm_decomposition_parses_and_prioritizes() {
        let mock: Arc<dyn CompletionClient> = Arc::new(
            MockCompletionClient::new().with_default_response(
                r#"[
                    {"description": "search wire coverage", "source_type": "news",
                     "keywords": ["troops", "border"]},
                    {"description": "scan forums", "source_type": "reddit",
                     "keywords": ["troops"]},
                    {"description": "bogus", "source_type": "carrier-pigeon"}
                ]"#,
            ),
        );
        let subtasks = decompose(Some(&mock), "troop buildup at the border", &[]).await;

        // Unknown source type discarded.
        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[0].source_type, SourceType::Rss);
        assert_eq!(subtasks[1].source_type, SourceType::Reddit);
        assert!(subtasks.iter().all(|s| s.priority > 0.0 && s.priority <= 1.0));
    }

    #[tokio::test]
    async fn fallback_works_without_llm() {
        let subtasks = decompose(None, "uranium shipment through the strait", &[]).await;
        assert_eq!(subtasks.len(), 4);
        let types: Vec<SourceType> = subtasks.iter().map(|s| s.source_type).collect();
        assert!(types.contains(&SourceType::Rss));
        assert!(types.contains(&SourceType::Reddit));
        assert!(types.contains(&SourceType::Web));
        assert!(types.contains(&SourceType::Document));
        assert!(subtasks[0].keywords.contains(&"uranium".to_string()));
    }

    #[tokio::test]
    async fn unparseable_llm_output_falls_back() {
        let mock: Arc<dyn CompletionClient> =
            Arc::new(MockCompletionClient::new().with_default_response("not json"));
        let subtasks = decompose(Some(&mock), "pipeline sabotage", &[]).await;
        assert_eq!(subtasks.len(), 4);
    }

    #[test]
    fn known_entities_enrich_keywords() {
        let subtasks = keyword_decompose("border buildup", &["Kharkiv Oblast".to_string()]);
        assert!(subtasks[0].keywords.contains(&"kharkiv oblast".to_string()));
    }

    #[test]
    fn priority_formula_components() {
        // Fresh, relevant, diverse: near the top of the range.
        let high = subtask_priority(1.0, 1.0, 0, 1.0);
        assert!((high - 1.0).abs() < 1e-9);
        // Retries eat the retry component.
        let retried = subtask_priority(1.0, 1.0, 4, 1.0);
        assert!((retried - 0.8).abs() < 1e-9);
        assert!(subtask_priority(0.0, 0.0, 0, 0.0) > 0.0);
    }
}
