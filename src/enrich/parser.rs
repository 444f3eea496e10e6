//! Two-stage parsing of model responses into path → prefix maps.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap();
}

/// Parse a model response into prefixes for the expected chunk paths.
///
/// Strict stage: strip an optional fenced code block, parse as JSON,
/// accept either a bare map or `{"prefixes": {...}}`, normalize bracketed
/// keys, keep only expected paths. When JSON parsing fails entirely, fall
/// back to per-path regex extraction over the raw text.
pub fn parse_prefix_response(response: &str, expected_paths: &[String]) -> HashMap<String, String> {
    let mut json_str = response.trim();
    if let Some(caps) = FENCED_BLOCK.captures(json_str) {
        if let Some(inner) = caps.get(1) {
            json_str = inner.as_str().trim();
        }
    }

    match serde_json::from_str::<serde_json::Value>(json_str) {
        Ok(parsed) => {
            let prefixes = match parsed.get("prefixes") {
                Some(obj) if obj.is_object() => obj,
                _ => &parsed,
            };
            let Some(map) = prefixes.as_object() else {
                return HashMap::new();
            };

            // The model sometimes returns bracketed keys like "[kap1.§1]".
            let normalized: HashMap<&str, &serde_json::Value> = map
                .iter()
                .map(|(k, v)| {
                    let k = k.strip_prefix('[').unwrap_or(k);
                    let k = k.strip_suffix(']').unwrap_or(k);
                    (k, v)
                })
                .collect();

            let mut result = HashMap::new();
            for path in expected_paths {
                if let Some(value) = normalized.get(path.as_str()).and_then(|v| v.as_str()) {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        result.insert(path.clone(), trimmed.to_string());
                    }
                }
            }
            result
        }
        Err(_) => {
            warn!("malformed prefix JSON, attempting per-path extraction");
            extract_by_pattern(response, expected_paths)
        }
    }
}

/// Best-effort recovery: find `"path": "value"` pairs in the raw text.
fn extract_by_pattern(response: &str, expected_paths: &[String]) -> HashMap<String, String> {
    let mut result = HashMap::new();
    for path in expected_paths {
        let pattern = format!(r#""{}"\s*:\s*"([^"]+)""#, regex::escape(path));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        if let Some(caps) = re.captures(response) {
            result.insert(path.clone(), caps[1].trim().to_string());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_prefixes_envelope() {
        let response = r#"{"prefixes": {"kap1.§1": "Inledande bestämmelse i Skollagen (2010:800)."}}"#;
        let result = parse_prefix_response(response, &paths(&["kap1.§1"]));
        assert_eq!(
            result.get("kap1.§1").map(String::as_str),
            Some("Inledande bestämmelse i Skollagen (2010:800).")
        );
    }

    #[test]
    fn parses_bare_map() {
        let response = r#"{"kap1.§1": "Kontext."}"#;
        let result = parse_prefix_response(response, &paths(&["kap1.§1"]));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn strips_fenced_code_block() {
        let response = "Here you go:\n```json\n{\"prefixes\": {\"kap1.§1\": \"Kontext.\"}}\n```";
        let result = parse_prefix_response(response, &paths(&["kap1.§1"]));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn normalizes_bracketed_keys() {
        let response = r#"{"prefixes": {"[kap1.§1]": "Kontext."}}"#;
        let result = parse_prefix_response(response, &paths(&["kap1.§1"]));
        assert_eq!(result.get("kap1.§1").map(String::as_str), Some("Kontext."));
    }

    #[test]
    fn unknown_paths_dropped() {
        let response = r#"{"prefixes": {"kap1.§1": "Kontext.", "kap9.§9": "Okänd."}}"#;
        let result = parse_prefix_response(response, &paths(&["kap1.§1"]));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn empty_values_dropped() {
        let response = r#"{"prefixes": {"kap1.§1": "   "}}"#;
        let result = parse_prefix_response(response, &paths(&["kap1.§1"]));
        assert!(result.is_empty());
    }

    #[test]
    fn falls_back_to_pattern_extraction() {
        let response = r#"Visst! "kap1.§1": "Kontext för paragrafen." och lite mer text"#;
        let result = parse_prefix_response(response, &paths(&["kap1.§1"]));
        assert_eq!(
            result.get("kap1.§1").map(String::as_str),
            Some("Kontext för paragrafen.")
        );
    }

    #[test]
    fn garbage_yields_empty_map() {
        let result = parse_prefix_response("no json anywhere", &paths(&["kap1.§1"]));
        assert!(result.is_empty());
    }
}
