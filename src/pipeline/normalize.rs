//! Tolerant JSON extraction from model replies.
//!
//! Models asked for "JSON only" still wrap it in ` ```json ` fences or add a
//! sentence before or after it. Parsing is two-tier:
//!
//! 1. strip every fence marker, trim, parse the whole text;
//! 2. otherwise parse the outermost `{ … }` span (first `{` to last `}`).
//!
//! If both fail the reply is malformed. There is no further recovery.

use crate::error::DraftError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A fence line (` ```json `) or a closing fence at the end of a line.
static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_-]*[ \t]*$|```[ \t]*$").unwrap());

/// Remove markdown fence markers (` ``` `, ` ```json `, ` ```html `, …) and trim.
///
/// Backticks inside a line are content and stay.
pub fn strip_fences(text: &str) -> String {
    RE_FENCE.replace_all(text, "").trim().to_string()
}

/// Parse a JSON object out of a model reply.
pub fn normalize_json(text: &str) -> Result<Value, DraftError> {
    normalize_with(text, '{', '}')
}

/// Parse a JSON array out of a model reply; the fallback span is `[ … ]`.
pub fn normalize_json_array(text: &str) -> Result<Value, DraftError> {
    normalize_with(text, '[', ']')
}

/// Parse and deserialise a JSON object reply into `T`.
pub fn parse_reply<T: DeserializeOwned>(text: &str) -> Result<T, DraftError> {
    let value = normalize_json(text)?;
    serde_json::from_value(value).map_err(|e| DraftError::MalformedResponse {
        detail: format!("unexpected shape: {e}"),
    })
}

fn normalize_with(text: &str, open: char, close: char) -> Result<Value, DraftError> {
    let cleaned = strip_fences(text);
    let direct_err = match serde_json::from_str::<Value>(&cleaned) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
        if end > start {
            return serde_json::from_str::<Value>(&text[start..=end]).map_err(|e| {
                DraftError::MalformedResponse {
                    detail: format!("embedded JSON did not parse: {e}"),
                }
            });
        }
    }

    Err(DraftError::MalformedResponse {
        detail: format!("no JSON found in reply: {direct_err}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_json_parses() {
        let v = normalize_json("```json\n{\"a\":1}\n```").unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn bare_fence_without_language() {
        let v = normalize_json("```\n{\"a\":1}\n```").unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn backticks_inside_a_line_are_kept() {
        assert_eq!(strip_fences("<p>See ```The clause</p>"), "<p>See ```The clause</p>");
        assert_eq!(
            strip_fences("```html\n<p>Use ```bash here</p>\n```"),
            "<p>Use ```bash here</p>"
        );
    }

    #[test]
    fn closing_fence_glued_to_content_is_removed() {
        assert_eq!(strip_fences("```html\n<p>x</p>```"), "<p>x</p>");
    }

    #[test]
    fn prose_wrapped_json_uses_fallback() {
        let v = normalize_json("Sure! {\"a\":1} done.").unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn fallback_spans_outermost_braces() {
        let v = normalize_json("Result: {\"a\":{\"b\":2}} hope that helps").unwrap();
        assert_eq!(v, json!({"a": {"b": 2}}));
    }

    #[test]
    fn no_json_is_malformed() {
        let err = normalize_json("no json here").unwrap_err();
        assert!(matches!(err, DraftError::MalformedResponse { .. }));
    }

    #[test]
    fn broken_embedded_json_is_malformed() {
        let err = normalize_json("ok {\"a\": } bye").unwrap_err();
        assert!(matches!(err, DraftError::MalformedResponse { .. }));
    }

    #[test]
    fn array_fallback_uses_brackets() {
        let v = normalize_json_array("Here you go:\n[\"q1\", \"q2\"]\nThanks").unwrap();
        assert_eq!(v, json!(["q1", "q2"]));
    }

    #[test]
    fn strip_fences_handles_html_language() {
        assert_eq!(strip_fences("```html\n<p>x</p>\n```"), "<p>x</p>");
        assert_eq!(strip_fences("  <p>x</p>  "), "<p>x</p>");
    }

    #[test]
    fn parse_reply_reports_shape_mismatch() {
        #[derive(serde::Deserialize, Debug)]
        struct Shape {
            #[allow(dead_code)]
            html: String,
        }
        let err = parse_reply::<Shape>("{\"title\": \"x\"}").unwrap_err();
        assert!(err.to_string().contains("unexpected shape"));
    }
}
