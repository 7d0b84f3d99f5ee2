//! Helpers for pulling structured fields out of free-form model replies.
//!
//! Both judgment and prediction parsing follow the same pipeline: a strict
//! JSON parse of the first object found in the reply, then a lenient
//! keyword/regex scan for each required field, then an explicit unusable
//! outcome carrying the reason.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use dyad_types::error::ParseError;

static CODE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("CODE_BLOCK_RE is a compile-time constant")
});

static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("JSON_OBJECT_RE is a compile-time constant"));

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)""#).expect("QUOTED_RE is a compile-time constant"));

/// Find and decode the first JSON object in `text`.
///
/// Tries the whole text, then fenced code blocks, then the widest
/// brace-delimited span.
pub fn extract_json_object(text: &str) -> Result<serde_json::Map<String, Value>, ParseError> {
    let trimmed = text.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(map);
    }

    for cap in CODE_BLOCK_RE.captures_iter(text) {
        let Some(m) = cap.get(1) else { continue };
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(m.as_str().trim()) {
            return Ok(map);
        }
    }

    match JSON_OBJECT_RE.find(text) {
        Some(m) => match serde_json::from_str::<Value>(m.as_str()) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ParseError::Malformed("top-level value is not an object".into())),
            Err(e) => Err(ParseError::Malformed(e.to_string())),
        },
        None => Err(ParseError::NoJson),
    }
}

/// Build a pattern matching `key: value` for any of `keys`, in JSON or prose.
///
/// `value` is a regex fragment with one capture group. An opening quote
/// before the value is skipped.
pub fn field_pattern(keys: &[&str], value: &str) -> Result<Regex, regex::Error> {
    let alternatives = keys.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r#"(?:{alternatives})["'\s]*[:：=]\s*"?{value}"#))
}

/// Text value of a field, stopping at quotes, commas and line breaks.
pub fn lenient_text(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_matches('"').trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Integer value of a field.
pub fn lenient_int(re: &Regex, text: &str) -> Option<i64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().trim().parse().ok())
}

/// List value of a field written as `[...]`: quoted items, or comma-separated.
pub fn lenient_list(re: &Regex, text: &str) -> Vec<String> {
    let Some(body) = re.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    let quoted: Vec<String> = QUOTED_RE
        .captures_iter(body.as_str())
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect();
    if !quoted.is_empty() {
        return quoted;
    }
    body.as_str()
        .split([',', '，'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// String field of a JSON object.
pub fn json_str(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integer field of a JSON object; accepts numbers and numeric strings.
pub fn json_int(map: &serde_json::Map<String, Value>, key: &str) -> Option<i64> {
    match map.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String-list field of a JSON object.
pub fn json_list(map: &serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
