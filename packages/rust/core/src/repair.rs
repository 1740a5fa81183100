//! Repair pipeline for near-JSON generator replies.
//!
//! Each pass is a function `&str -> String` applied in sequence; the result
//! must parse to a JSON object. A reply that still fails is reported as
//! [`MalformedResponse`], which callers always recover from locally.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// A generator reply that could not be turned into a JSON object.
#[derive(Debug, Clone)]
pub(crate) struct MalformedResponse {
    pub reason: String,
}

/// Parse `raw` as a JSON object, repairing common malformations first if needed.
pub(crate) fn parse_generated(raw: &str) -> Result<Map<String, Value>, MalformedResponse> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(map);
    }

    let repaired = run_pipeline(raw);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(MalformedResponse {
            reason: format!("expected a JSON object, got {}", value_kind(&other)),
        }),
        Err(e) => Err(MalformedResponse {
            reason: e.to_string(),
        }),
    }
}

fn run_pipeline(raw: &str) -> String {
    let mut result = strip_code_fences(raw);
    result = cut_to_object(&result);
    result = drop_control_chars(&result);
    result = escape_breaks_in_strings(&result);
    result = remove_trailing_commas(&result);
    result
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Pass 1: Markdown code fences
// ---------------------------------------------------------------------------

fn strip_code_fences(text: &str) -> String {
    static FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("valid regex"));

    match FENCE_RE.captures(text) {
        Some(caps) => caps[1].to_string(),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pass 2: Outermost object
// ---------------------------------------------------------------------------

/// Drop prose before the first `{` and after the last `}`.
fn cut_to_object(text: &str) -> String {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => text[start..=end].to_string(),
        _ => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pass 3: Control characters
// ---------------------------------------------------------------------------

fn drop_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

// ---------------------------------------------------------------------------
// Pass 4: Raw line breaks inside string literals
// ---------------------------------------------------------------------------

fn escape_breaks_in_strings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Pass 5: Trailing commas
// ---------------------------------------------------------------------------

/// Remove commas directly before `}` or `]`, outside string literals.
fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_json_passes_untouched() {
        let map = parse_generated(r#"{"title": "A, B", "year": 2024}"#).unwrap();
        assert_eq!(map["title"], "A, B");
    }

    #[test]
    fn fenced_reply_with_prose() {
        let raw = "Sure! Here it is:\n```json\n{\"title\": \"T\"}\n```\nHope this helps.";
        let map = parse_generated(raw).unwrap();
        assert_eq!(map["title"], "T");
    }

    #[test]
    fn raw_newlines_and_control_chars_are_repaired() {
        let raw = "{\"abstract\": \"line one\nline two\tend\u{0007}\"}";
        let map = parse_generated(raw).unwrap();
        assert_eq!(map["abstract"], "line one\nline two\tend");
    }

    #[test]
    fn trailing_commas_removed_outside_strings() {
        let raw = r#"{"highlights": ["a", "b",], "title": "x,]",}"#;
        let map = parse_generated(raw).unwrap();
        assert_eq!(map["highlights"], serde_json::json!(["a", "b"]));
        assert_eq!(map["title"], "x,]");
    }

    #[test]
    fn escaped_quotes_do_not_confuse_string_tracking() {
        let raw = "{\"title\": \"say \\\"hi\\\"\nnow\",}";
        let map = parse_generated(raw).unwrap();
        assert_eq!(map["title"], "say \"hi\"\nnow");
    }

    #[test]
    fn unrecoverable_reply_is_malformed() {
        assert!(parse_generated("I cannot help with that.").is_err());
        assert!(parse_generated("{\"title\": ").is_err());
        let err = parse_generated("[1, 2]").unwrap_err();
        assert!(err.reason.contains("array"));
    }
}
