//! The extracted-fact schema.
//!
//! A fact is a single subject-predicate-object assertion with full
//! provenance. Identity is a UUID plus a SHA-256 content hash of the claim
//! text; facts sharing a hash are variants of one canonical fact, which is
//! how multi-source corroboration survives dedup. Facts are immutable once
//! consolidation has placed them.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Current fact schema version. Readers refuse unknown major versions;
/// minor bumps are additive.
pub const SCHEMA_VERSION: &str = "1.0";

/// Unique identifier for a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactId(pub Uuid);

impl FactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FactId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 of the claim text, lowercase hex. Reproducible from the claim
/// text alone.
pub fn content_hash(claim_text: &str) -> String {
    let digest = Sha256::digest(claim_text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Refuse to read facts from an unknown major schema version.
pub fn check_schema_version(version: &str) -> Result<()> {
    let major = version.split('.').next().unwrap_or("");
    let supported = SCHEMA_VERSION.split('.').next().unwrap_or("");
    if major != supported {
        return Err(Error::validation(format!(
            "unsupported fact schema version {version} (reader supports {SCHEMA_VERSION})"
        )));
    }
    Ok(())
}

/// What kind of speech act the claim is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionType {
    Statement,
    /// The claim content was denied by the asserter; never a negation flag.
    Denial,
    Prediction,
    Planned,
}

/// What the claim describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Event,
    State,
    Prediction,
    Relationship,
    Quantity,
    Other,
}

/// The assertion itself. Text carries inline `[E#:name]` and `[T#:date]`
/// markers resolved by `entities` / `temporal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub assertion_type: AssertionType,
    pub claim_type: ClaimType,
    /// Who made the assertion, for denials and reported speech.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asserter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    AnonymousSource,
}

impl EntityType {
    /// Normalize common tag synonyms emitted by extraction models.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PERSON" | "PER" => Some(Self::Person),
            "ORGANIZATION" | "ORG" => Some(Self::Organization),
            "LOCATION" | "LOC" | "GPE" => Some(Self::Location),
            "ANONYMOUS_SOURCE" | "ANON" => Some(Self::AnonymousSource),
            _ => None,
        }
    }
}

/// An entity mentioned by the claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    /// Marker id, `E1`, `E2`, ... Continuous across chunks of a document.
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
}

/// Calendar precision of a temporal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    Day,
    Month,
    Year,
}

/// How the temporal value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalSourcing {
    Explicit,
    Inferred,
    Unknown,
}

/// A temporal reference attached to the claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalRef {
    /// Marker id, `T1`, `T2`, ...
    pub id: String,
    /// ISO-8601 date or date prefix matching `precision`.
    pub value: String,
    pub precision: DatePrecision,
    pub temporal_precision: TemporalSourcing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClassification {
    Primary,
    Secondary,
    Tertiary,
}

/// One attribution: a source that carried the claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub source_id: String,
    pub source_type: String,
    pub source_classification: SourceClassification,
    /// Attribution hops from the original source outward; index 0 is the
    /// root.
    pub attribution_chain: Vec<String>,
    pub hop_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

impl SourceAttribution {
    /// Root of the attribution chain, falling back to the source itself.
    pub fn root(&self) -> &str {
        self.attribution_chain
            .first()
            .map(String::as_str)
            .unwrap_or(&self.source_id)
    }
}

/// Where the fact came from, including every corroborating source folded
/// in by consolidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_id: String,
    pub source_type: String,
    pub source_classification: SourceClassification,
    pub attribution_chain: Vec<String>,
    pub hop_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    /// Character offsets of the claim in the source text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offsets: Option<(usize, usize)>,
    /// Provenance of variants consolidated into this canonical fact.
    #[serde(default)]
    pub additional_sources: Vec<SourceAttribution>,
}

impl Provenance {
    pub fn new(source_id: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source_type: source_type.into(),
            source_classification: SourceClassification::Secondary,
            attribution_chain: Vec::new(),
            hop_count: 0,
            quote: None,
            offsets: None,
            additional_sources: Vec::new(),
        }
    }

    pub fn with_classification(mut self, classification: SourceClassification) -> Self {
        self.source_classification = classification;
        self
    }

    pub fn with_chain(mut self, chain: Vec<String>) -> Self {
        self.hop_count = chain.len().saturating_sub(1) as u32;
        self.attribution_chain = chain;
        self
    }

    pub fn with_hop_count(mut self, hop_count: u32) -> Self {
        self.hop_count = hop_count;
        self
    }

    pub fn with_quote(mut self, quote: impl Into<String>) -> Self {
        self.quote = Some(quote.into());
        self
    }

    /// The primary attribution in `SourceAttribution` form.
    pub fn primary_attribution(&self) -> SourceAttribution {
        SourceAttribution {
            source_id: self.source_id.clone(),
            source_type: self.source_type.clone(),
            source_classification: self.source_classification,
            attribution_chain: self.attribution_chain.clone(),
            hop_count: self.hop_count,
            quote: self.quote.clone(),
        }
    }

    /// All attributions: the primary one plus the accumulated variants'.
    pub fn attributions(&self) -> Vec<SourceAttribution> {
        let mut all = vec![self.primary_attribution()];
        all.extend(self.additional_sources.iter().cloned());
        all
    }

    /// Whether any attribution reaches a primary source.
    pub fn has_primary_source(&self) -> bool {
        self.attributions()
            .iter()
            .any(|a| a.source_classification == SourceClassification::Primary)
    }
}

/// Extraction quality. Confidence (was the extraction faithful) and
/// clarity (is the claim specific) are orthogonal and never combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quality {
    pub extraction_confidence: f64,
    pub claim_clarity: f64,
    #[serde(default)]
    pub extraction_trace: String,
}

impl Default for Quality {
    fn default() -> Self {
        Self {
            extraction_confidence: 0.8,
            claim_clarity: 0.8,
            extraction_trace: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionType {
    Explicit,
    Inferred,
}

/// How and when the fact was extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMeta {
    pub extracted_at: DateTime<Utc>,
    pub model_version: String,
    pub extraction_type: ExtractionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Supports,
    Contradicts,
    TemporalSequence,
}

/// A typed link to another fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRelationship {
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub target_fact_id: FactId,
    pub confidence: f64,
}

/// An extracted fact. See the module docs for identity and lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub schema_version: String,
    pub fact_id: FactId,
    /// SHA-256 of `claim.text`; auto-computed, never set by callers.
    pub content_hash: String,
    pub claim: Claim,
    pub entities: Vec<EntityMention>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalRef>,
    pub provenance: Provenance,
    pub quality: Quality,
    pub extraction: ExtractionMeta,
    #[serde(default)]
    pub relationships: Vec<FactRelationship>,
    /// Fact ids sharing this fact's content hash (bidirectional).
    #[serde(default)]
    pub variants: Vec<FactId>,
}

impl ExtractedFact {
    pub fn new(claim: Claim, provenance: Provenance, model_version: impl Into<String>) -> Self {
        let hash = content_hash(&claim.text);
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            fact_id: FactId::new(),
            content_hash: hash,
            claim,
            entities: Vec::new(),
            temporal: None,
            provenance,
            quality: Quality::default(),
            extraction: ExtractionMeta {
                extracted_at: Utc::now(),
                model_version: model_version.into(),
                extraction_type: ExtractionType::Explicit,
            },
            relationships: Vec::new(),
            variants: Vec::new(),
        }
    }

    pub fn with_entities(mut self, entities: Vec<EntityMention>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_temporal(mut self, temporal: TemporalRef) -> Self {
        self.temporal = Some(temporal);
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_extraction_type(mut self, extraction_type: ExtractionType) -> Self {
        self.extraction.extraction_type = extraction_type;
        self
    }

    /// Entity marker ids appearing inline in the claim text.
    pub fn claim_entity_markers(&self) -> Vec<String> {
        entity_marker_regex()
            .captures_iter(&self.claim.text)
            .map(|c| format!("E{}", &c[1]))
            .collect()
    }

    /// Validate the record's internal invariants: reproducible content
    /// hash, resolvable entity markers, supported schema version.
    pub fn validate(&self) -> Result<()> {
        check_schema_version(&self.schema_version)?;

        if self.content_hash != content_hash(&self.claim.text) {
            return Err(Error::validation(format!(
                "fact {}: content_hash does not match claim text",
                self.fact_id
            )));
        }

        for marker in self.claim_entity_markers() {
            if !self.entities.iter().any(|e| e.id == marker) {
                return Err(Error::validation(format!(
                    "fact {}: claim marker [{marker}] has no entry in entities",
                    self.fact_id
                )));
            }
        }
        Ok(())
    }

    /// Claim text with entity/temporal markers reduced to their surface
    /// forms, for display and token comparison.
    pub fn plain_claim_text(&self) -> String {
        let without_entities = entity_marker_regex().replace_all(&self.claim.text, "$2");
        temporal_marker_regex()
            .replace_all(&without_entities, "$2")
            .into_owned()
    }
}

fn entity_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[E(\d+):([^\]]+)\]").expect("static regex"))
}

fn temporal_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[T(\d+):([^\]]+)\]").expect("static regex"))
}
