//! Tolerant parsing of structured generator output.
//!
//! The generator is asked for bare JSON but often wraps it in a code fence or
//! a sentence. Parsers here accept those wrappings and return `None` for
//! anything else, leaving the fallback decision to the caller.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::types::Verdict;

/// Parse the planner's table list.
///
/// Returns trimmed, de-duplicated names in first-seen order. `None` when the
/// payload is not a JSON array of strings.
pub fn parse_table_plan(raw: &str) -> Option<Vec<String>> {
    let value: Value = parse_embedded(raw, '[', ']')?;
    let items = value.as_array()?;
    let mut tables: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let name = item.as_str()?.trim();
        if !name.is_empty() && !tables.iter().any(|seen| seen == name) {
            tables.push(name.to_string());
        }
    }
    Some(tables)
}

/// Parse the combined validation verdict.
pub fn parse_verdict(raw: &str) -> Option<Verdict> {
    parse_embedded(raw, '{', '}')
}

fn parse_embedded<T: DeserializeOwned>(raw: &str, open: char, close: char) -> Option<T> {
    let body = strip_code_fence(raw);
    if let Ok(value) = serde_json::from_str(body) {
        return Some(value);
    }
    let start = body.find(open)?;
    let end = body.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&body[start..=end]).ok()
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .find('\n')
        .map(|idx| &rest[idx + 1..])
        .unwrap_or(rest);
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_accepts_bare_array() {
        assert_eq!(
            parse_table_plan(r#"["orders", "products"]"#),
            Some(vec!["orders".to_string(), "products".to_string()])
        );
    }

    #[test]
    fn plan_accepts_fenced_and_prefixed_array() {
        let raw = "```json\n[\"products\", \"aisles\"]\n```";
        assert_eq!(
            parse_table_plan(raw),
            Some(vec!["products".to_string(), "aisles".to_string()])
        );
        let raw = "Tables needed: [\"products\"]";
        assert_eq!(parse_table_plan(raw), Some(vec!["products".to_string()]));
    }

    #[test]
    fn plan_dedupes_in_order() {
        assert_eq!(
            parse_table_plan(r#"["products", " orders ", "products", ""]"#),
            Some(vec!["products".to_string(), "orders".to_string()])
        );
    }

    #[test]
    fn plan_rejects_non_arrays_and_non_strings() {
        assert_eq!(parse_table_plan(r#"{"tables": ["orders"]}"#), None);
        assert_eq!(parse_table_plan(r#"["orders", 3]"#), None);
        assert_eq!(parse_table_plan("orders, products"), None);
    }

    #[test]
    fn verdict_parses_fenced_object() {
        let raw = "```json\n{\"valid\": true, \"reason\": \"ok\", \"natural_language_response\": \"Bananas.\"}\n```";
        let verdict = parse_verdict(raw).expect("verdict");
        assert!(verdict.valid);
        assert_eq!(verdict.natural_language_response, "Bananas.");
    }

    #[test]
    fn verdict_rejects_wrongly_typed_valid() {
        assert_eq!(parse_verdict(r#"{"valid": "yes"}"#), None);
        assert_eq!(parse_verdict("looks good to me"), None);
    }
}
