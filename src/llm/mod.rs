//! Completion capability: the LLM abstracted as structured-JSON completions.

mod client;
mod types;

pub use client::{
    AnthropicClient, ClientConfig, CompletionClient, MockCompletionClient, RateLimitedClient,
};
pub use types::{CompletionRequest, CompletionResponse, Provider, TokenUsage};

use crate::error::{Error, Result};

/// Parse JSON out of a completion, tolerating the usual model quirks:
/// Markdown code fences, leading prose before the payload, and stringified
/// JSON (a JSON string whose content is itself JSON).
pub fn lenient_json(content: &str) -> Result<serde_json::Value> {
    let trimmed = content.trim();

    // Prefer the body of a code fence when one is present.
    let candidate = match trimmed.find("```") {
        Some(start) => {
            let after = &trimmed[start + 3..];
            let after = after.strip_prefix("json").unwrap_or(after);
            match after.find("```") {
                Some(end) => after[..end].trim(),
                None => after.trim(),
            }
        }
        None => trimmed,
    };

    // Whole-candidate parse first (also the stringified-JSON case), then
    // retry from the first bracket to skip leading prose. Stream parsing
    // tolerates trailing prose after the value.
    let value = parse_first_value(candidate)
        .or_else(|| {
            candidate
                .find(['{', '['])
                .and_then(|start| parse_first_value(&candidate[start..]))
        })
        .ok_or_else(|| Error::validation("no parseable JSON in completion"))?;

    // Unwrap one level of stringified JSON.
    if let serde_json::Value::String(s) = &value {
        if let Ok(nested) = serde_json::from_str::<serde_json::Value>(s) {
            return Ok(nested);
        }
    }
    Ok(value)
}

fn parse_first_value(input: &str) -> Option<serde_json::Value> {
    serde_json::Deserializer::from_str(input)
        .into_iter::<serde_json::Value>()
        .next()
        .and_then(|r| r.ok())
}
