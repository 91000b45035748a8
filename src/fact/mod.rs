//! Fact extraction and consolidation: schema, LLM extraction agent,
//! batch pipeline, and layered dedup.

mod consolidator;
mod extractor;
mod pipeline;
mod proptest;
pub(crate) mod types;

pub use consolidator::{ConsolidationReport, FactConsolidator};
pub use extractor::{chunk_text, FactExtractionAgent};
pub use pipeline::{ExtractionFailure, ExtractionPipeline, ExtractionReport};
pub use types::{
    check_schema_version, content_hash, AssertionType, Claim, ClaimType, DatePrecision,
    EntityMention, EntityType, ExtractedFact, ExtractionMeta, ExtractionType, FactId,
    FactRelationship, Provenance, Quality, RelationType, SourceAttribution, SourceClassification,
    TemporalRef, TemporalSourcing, SCHEMA_VERSION,
};
