//! Helpers for parsing model output as JSON.

/// Strip markdown code fences and surrounding whitespace from a model
/// response.
///
/// Models in JSON mode occasionally still wrap output in ```json fences;
/// callers should always clean before `serde_json::from_str`.
pub fn clean_json_payload(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence, if any.
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}
