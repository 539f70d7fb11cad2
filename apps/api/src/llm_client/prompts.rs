// Shared prompt constants and prompt-building utilities.
// Each stage defines its own prompt templates in stages/prompts.rs.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Common instruction appended to every analysis prompt.
pub const EVIDENCE_INSTRUCTION: &str = "\
    CRITICAL: Base every field strictly on the text provided. \
    Do NOT infer, interpolate, or invent skills, employers, dates or degrees. \
    If the text does not support a value, leave the list empty or the field null.";

/// Joins a list for inclusion in a prompt, rendering an empty list as `None`.
pub fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_or_none_empty() {
        assert_eq!(join_or_none(&[]), "None");
    }

    #[test]
    fn test_join_or_none_joins_with_comma() {
        let items = vec!["Rust".to_string(), "SQL".to_string()];
        assert_eq!(join_or_none(&items), "Rust, SQL");
    }
}
