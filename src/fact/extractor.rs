//! LLM-driven fact extraction.
//!
//! The agent enforces the extraction contracts through its system prompt
//! and then re-validates everything the model returns: entity-type
//! synonyms are normalized, hedged claims get their clarity capped, and
//! schema-invalid outputs are logged and discarded rather than propagated.
//!
//! Long documents are chunked on paragraph, then sentence, boundaries;
//! entity marker ids stay continuous across chunks so downstream
//! clustering keeps working.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::crawler::Article;
use crate::error::Result;
use crate::llm::{lenient_json, CompletionClient, CompletionRequest};

use super::types::{
    AssertionType, Claim, ClaimType, DatePrecision, EntityMention, EntityType, ExtractedFact,
    ExtractionType, Provenance, Quality, SourceClassification, TemporalRef, TemporalSourcing,
};

/// Hedges reduce claim clarity, never extraction confidence.
const HEDGED_CLARITY_CAP: f64 = 0.45;

fn hedge_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(allegedly|reportedly|sources say|sources familiar|officials familiar with|it is believed|rumored|may|might|appears? to|possibly)\b",
        )
        .expect("static regex")
    })
}

const SYSTEM_PROMPT: &str = "\
You extract discrete factual claims from source text into JSON. Output a \
JSON array; each element follows the fact schema below. Rules:

- One fact per single assertion. Do NOT atomize: entity + predicate + \
object is one fact.
- Mark entities inline: '[E1:Putin] visited [E2:Beijing]', with a matching \
entities array (id, text, type of PERSON | ORGANIZATION | LOCATION | \
ANONYMOUS_SOURCE).
- Denials: 'Russia denied X' becomes the fact 'X' with assertion_type \
'denial' and asserter 'Russia'. Never emit a negation flag.
- Quoted speech: emit two linked facts, the statement event AND the \
underlying claim marked reported.
- Implicit content: extract unambiguous inferences ('the late President X' \
implies 'X is deceased') with extraction_type 'inferred'.
- Temporal: always include precision (day | month | year) and whether it \
was explicit, inferred, or unknown.
- Numeric claims: preserve the original form and a normalized range; \
record precision.
- Geographic names: normalize to the canonical name in 'canonical'.
- Hedges ('allegedly', 'reportedly', 'sources say') lower claim_clarity \
only; extraction_confidence reflects extraction fidelity alone.

Schema per element: {\"claim\": {\"text\", \"assertion_type\", \
\"claim_type\", \"asserter\"?}, \"entities\": [{\"id\", \"text\", \
\"type\", \"canonical\"?}], \"temporal\"?: {\"id\", \"value\", \
\"precision\", \"temporal_precision\"}, \"hop_count\"?, \
\"attribution_chain\"?, \"source_classification\"?, \"quote\"?, \
\"quality\"?: {\"extraction_confidence\", \"claim_clarity\"}, \
\"extraction_type\"?}";

/// LLM-backed extraction agent.
pub struct FactExtractionAgent {
    client: Arc<dyn CompletionClient>,
    model_version: String,
    chunk_chars: usize,
    min_content_chars: usize,
}

impl FactExtractionAgent {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model_version: impl Into<String>,
        chunk_chars: usize,
        min_content_chars: usize,
    ) -> Self {
        Self {
            client,
            model_version: model_version.into(),
            chunk_chars,
            min_content_chars,
        }
    }

    /// Extract facts from one article. Inputs below the minimum length
    /// yield an empty set, not an error.
    pub async fn extract_from_article(&self, article: &Article) -> Result<Vec<ExtractedFact>> {
        let input = format!("{}\n\n{}", article.title, article.content);
        if input.trim().len() < self.min_content_chars {
            return Ok(Vec::new());
        }

        let mut facts = Vec::new();
        let mut entity_offset = 0usize;
        for chunk in chunk_text(&input, self.chunk_chars) {
            let request = CompletionRequest::new(chunk)
                .with_system(SYSTEM_PROMPT)
                .with_max_tokens(4096)
                .with_temperature(0.0);
            let response = self.client.complete(request).await?;

            let value = match lenient_json(&response.content) {
                Ok(value) => value,
                Err(e) => {
                    warn!(url = %article.url, error = %e, "extraction output unparseable, discarded");
                    continue;
                }
            };
            let raw_facts: Vec<RawFact> = match serde_json::from_value(value) {
                Ok(facts) => facts,
                Err(e) => {
                    warn!(url = %article.url, error = %e, "extraction output schema-invalid, discarded");
                    continue;
                }
            };

            let mut chunk_entities = 0usize;
            for raw in raw_facts {
                chunk_entities = chunk_entities.max(raw.max_entity_index());
                match raw.into_fact(article, &self.model_version, entity_offset) {
                    Ok(fact) => match fact.validate() {
                        Ok(()) => facts.push(fact),
                        Err(e) => {
                            debug!(url = %article.url, error = %e, "invalid extracted fact discarded")
                        }
                    },
                    Err(e) => {
                        debug!(url = %article.url, error = %e, "raw fact rejected")
                    }
                }
            }
            entity_offset += chunk_entities;
        }
        Ok(facts)
    }
}

/// Split text on paragraph, then sentence, boundaries into chunks of at
/// most `max_chars`.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for paragraph in text.split("\n\n") {
        let pieces: Vec<&str> = if paragraph.len() > max_chars {
            paragraph.split_inclusive(". ").collect()
        } else {
            vec![paragraph]
        };

        for piece in pieces {
            if !current.is_empty() && current.len() + piece.len() + 2 > max_chars {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(piece);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// --- Raw LLM output types ---

#[derive(Debug, Deserialize)]
struct RawFact {
    claim: RawClaim,
    #[serde(default)]
    entities: Vec<RawEntity>,
    temporal: Option<RawTemporal>,
    hop_count: Option<u32>,
    #[serde(default)]
    attribution_chain: Vec<String>,
    source_classification: Option<String>,
    quote: Option<String>,
    quality: Option<RawQuality>,
    extraction_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    text: String,
    assertion_type: Option<String>,
    claim_type: Option<String>,
    asserter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    id: String,
    text: String,
    #[serde(rename = "type")]
    entity_type: String,
    canonical: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTemporal {
    #[serde(default = "default_temporal_id")]
    id: String,
    value: String,
    precision: Option<String>,
    temporal_precision: Option<String>,
}

fn default_temporal_id() -> String {
    "T1".to_string()
}

#[derive(Debug, Deserialize)]
struct RawQuality {
    extraction_confidence: Option<f64>,
    claim_clarity: Option<f64>,
}

impl RawFact {
    /// Highest entity marker index used, for cross-chunk continuity.
    fn max_entity_index(&self) -> usize {
        self.entities
            .iter()
            .filter_map(|e| e.id.trim_start_matches('E').parse::<usize>().ok())
            .max()
            .unwrap_or(0)
    }

    fn into_fact(
        self,
        article: &Article,
        model_version: &str,
        entity_offset: usize,
    ) -> Result<ExtractedFact> {
        let assertion_type = match self.claim.assertion_type.as_deref() {
            Some("denial") => AssertionType::Denial,
            Some("prediction") => AssertionType::Prediction,
            Some("planned") => AssertionType::Planned,
            _ => AssertionType::Statement,
        };
        let claim_type = match self.claim.claim_type.as_deref() {
            Some("state") => ClaimType::State,
            Some("prediction") => ClaimType::Prediction,
            Some("relationship") => ClaimType::Relationship,
            Some("quantity") => ClaimType::Quantity,
            Some("event") => ClaimType::Event,
            Some(_) => ClaimType::Other,
            None => ClaimType::Event,
        };
        let source_classification = match self.source_classification.as_deref() {
            Some("primary") => SourceClassification::Primary,
            Some("tertiary") => SourceClassification::Tertiary,
            _ => SourceClassification::Secondary,
        };
        let extraction_type = match self.extraction_type.as_deref() {
            Some("inferred") => ExtractionType::Inferred,
            _ => ExtractionType::Explicit,
        };

        let claim_text = offset_entity_markers(&self.claim.text, entity_offset);

        let mut entities = Vec::new();
        for raw in self.entities {
            let Some(entity_type) = EntityType::parse_lenient(&raw.entity_type) else {
                return Err(crate::error::Error::validation(format!(
                    "unknown entity type {:?}",
                    raw.entity_type
                )));
            };
            entities.push(EntityMention {
                id: offset_entity_id(&raw.id, entity_offset),
                text: raw.text,
                entity_type,
                canonical: raw.canonical,
                cluster_id: None,
            });
        }

        let mut provenance = Provenance::new(article.source.id.clone(), article.source.source_type.to_string())
            .with_classification(source_classification);
        if !self.attribution_chain.is_empty() {
            provenance = provenance.with_chain(self.attribution_chain);
        }
        if let Some(hops) = self.hop_count {
            provenance = provenance.with_hop_count(hops);
        }
        if let Some(quote) = self.quote {
            provenance = provenance.with_quote(quote);
        }

        let mut quality = Quality {
            extraction_confidence: self
                .quality
                .as_ref()
                .and_then(|q| q.extraction_confidence)
                .unwrap_or(0.8)
                .clamp(0.0, 1.0),
            claim_clarity: self
                .quality
                .as_ref()
                .and_then(|q| q.claim_clarity)
                .unwrap_or(0.8)
                .clamp(0.0, 1.0),
            extraction_trace: format!("article:{}", article.url),
        };
        if hedge_regex().is_match(&claim_text) {
            quality.claim_clarity = quality.claim_clarity.min(HEDGED_CLARITY_CAP);
        }

        let mut fact = ExtractedFact::new(
            Claim {
                text: claim_text,
                assertion_type,
                claim_type,
                asserter: self.claim.asserter,
            },
            provenance,
            model_version,
        )
        .with_entities(entities)
        .with_quality(quality)
        .with_extraction_type(extraction_type);

        if let Some(raw) = self.temporal {
            fact = fact.with_temporal(TemporalRef {
                id: raw.id,
                value: raw.value,
                precision: match raw.precision.as_deref() {
                    Some("month") => DatePrecision::Month,
                    Some("year") => DatePrecision::Year,
                    _ => DatePrecision::Day,
                },
                temporal_precision: match raw.temporal_precision.as_deref() {
                    Some("explicit") => TemporalSourcing::Explicit,
                    Some("inferred") => TemporalSourcing::Inferred,
                    _ => TemporalSourcing::Unknown,
                },
            });
        }
        Ok(fact)
    }
}

/// Shift `[En:...]` markers in claim text by an offset.
fn offset_entity_markers(text: &str, offset: usize) -> String {
    if offset == 0 {
        return text.to_string();
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\[E(\d+):").expect("static regex"));
    re.replace_all(text, |caps: &regex::Captures<'_>| {
        let n: usize = caps[1].parse().unwrap_or(0);
        format!("[E{}:", n + offset)
    })
    .into_owned()
}

/// Shift an entity id (`E3` -> `E7` for offset 4).
fn offset_entity_id(id: &str, offset: usize) -> String {
    if offset == 0 {
        return id.to_string();
    }
    id.trim_start_matches('E')
        .parse::<usize>()
        .map(|n| format!("E{}", n + offset))
        .unwrap_or_else(|_| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{ArticleMetadata, ArticleSource, SourceType};
    use crate::llm::MockCompletionClient;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn article(content: &str) -> Article {
        Article {
            url: "https://example.com/story".to_string(),
            title: "Border update".to_string(),
            content: content.to_string(),
            published_date: None,
            authors: vec![],
            source: ArticleSource {
                id: "rss:reuters".to_string(),
                name: "Reuters".to_string(),
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

    fn agent_with(response: &str) -> FactExtractionAgent {
        let mock = MockCompletionClient::new().with_default_response(response);
        FactExtractionAgent::new(Arc::new(mock), "mock-1", 12_000, 40)
    }

    #[tokio::test]
    async fn denial_round_trip() {
        let agent = agent_with(
            r#"[{
                "claim": {
                    "text": "[E1:Russia] involvement in the Sarajevo incident",
                    "assertion_type": "denial",
                    "claim_type": "event",
                    "asserter": "Russia"
                },
                "entities": [{"id": "E1", "text": "Russia", "type": "ORG"}]
            }]"#,
        );
        let facts = agent
            .extract_from_article(&article(
                "Russia denied involvement in the Sarajevo incident.",
            ))
            .await
            .unwrap();

        assert_eq!(facts.len(), 1);
        let fact = &facts[0];
        assert_eq!(fact.claim.assertion_type, AssertionType::Denial);
        assert_eq!(fact.claim.asserter.as_deref(), Some("Russia"));
        assert!(fact.claim.text.contains("involvement in the Sarajevo incident"));
        // ORG synonym normalized.
        assert_eq!(fact.entities[0].entity_type, EntityType::Organization);
    }

    #[tokio::test]
    async fn short_input_yields_empty_not_error() {
        let agent = agent_with("[]");
        let facts = agent.extract_from_article(&article("tiny")).await.unwrap();
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn invalid_outputs_are_discarded() {
        // Marker E2 has no entities entry: discarded by validation.
        let agent = agent_with(
            r#"[{
                "claim": {"text": "[E1:A] met [E2:B]", "assertion_type": "statement"},
                "entities": [{"id": "E1", "text": "A", "type": "PERSON"}]
            },
            {
                "claim": {"text": "[E1:A] spoke in [E2:Paris]", "assertion_type": "statement"},
                "entities": [
                    {"id": "E1", "text": "A", "type": "PERSON"},
                    {"id": "E2", "text": "Paris", "type": "GPE"}
                ]
            }]"#,
        );
        let facts = agent
            .extract_from_article(&article(&"context ".repeat(20)))
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].entities[1].entity_type, EntityType::Location);
    }

    #[tokio::test]
    async fn hedges_cap_clarity_not_confidence() {
        let agent = agent_with(
            r#"[{
                "claim": {"text": "[E1:Army] reportedly moved west", "assertion_type": "statement"},
                "entities": [{"id": "E1", "text": "Army", "type": "ORG"}],
                "quality": {"extraction_confidence": 0.95, "claim_clarity": 0.9}
            }]"#,
        );
        let facts = agent
            .extract_from_article(&article(&"context ".repeat(20)))
            .await
            .unwrap();
        assert_eq!(facts[0].quality.extraction_confidence, 0.95);
        assert!(facts[0].quality.claim_clarity <= HEDGED_CLARITY_CAP);
    }

    #[test]
    fn chunking_respects_boundaries() {
        let text = format!("{}\n\n{}", "alpha ".repeat(30), "beta ".repeat(30));
        let chunks = chunk_text(&text, 200);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.len() <= 220));
        // Nothing lost.
        let rejoined: String = chunks.join("\n\n");
        assert!(rejoined.contains("alpha"));
        assert!(rejoined.contains("beta"));
    }

    #[test]
    fn entity_ids_stay_continuous_across_chunks() {
        assert_eq!(offset_entity_markers("[E1:A] met [E2:B]", 4), "[E5:A] met [E6:B]");
        assert_eq!(offset_entity_id("E2", 4), "E6");
        assert_eq!(offset_entity_markers("[E1:A]", 0), "[E1:A]");
    }
}
