//! Turns raw model text into a JSON value.
//!
//! Stage 1 strips Markdown fences and parses directly. Stage 2 escapes raw
//! line breaks and tabs inside string literals and parses once more. Nothing
//! beyond that: an output that fails both stages is terminal.

use serde_json::Value;
use thiserror::Error;

/// Model outputs beyond this size are rejected without parsing.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnparsableResponse {
    #[error("model returned empty output")]
    Empty,

    #[error("model output is {len} bytes (max {MAX_RESPONSE_BYTES})")]
    TooLarge { len: usize },

    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}

pub fn parse_model_json(raw: &str) -> Result<Value, UnparsableResponse> {
    if raw.len() > MAX_RESPONSE_BYTES {
        return Err(UnparsableResponse::TooLarge { len: raw.len() });
    }

    let text = strip_json_fences(raw);
    if text.is_empty() {
        return Err(UnparsableResponse::Empty);
    }

    let first_error = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let repaired = escape_breaks_in_strings(text);
    serde_json::from_str::<Value>(&repaired)
        .map_err(|_| UnparsableResponse::InvalidJson(first_error.to_string()))
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output, including
/// fences preceded by a line of prose.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(open) = text.find("```") else {
        return text;
    };

    let after_open = &text[open + 3..];
    // Skip the info string (`json`, `JSON`, ...) up to the end of the fence line.
    let body = match after_open.find('\n') {
        Some(nl) if after_open[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &after_open[nl + 1..]
        }
        _ => after_open
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim_start(),
    };

    match body.rfind("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Escapes literal `\n`, `\r` and `\t` that appear inside JSON string literals.
/// Structural whitespace between tokens is left alone.
fn escape_breaks_in_strings(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if !in_string {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(ch);
            continue;
        }

        match ch {
            '\\' => {
                escaped = true;
                out.push(ch);
            }
            '"' => {
                in_string = false;
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "  {\"key\": \"value\"}  ";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_after_prose() {
        let input = "Here is the report:\n```JSON\n{\"a\": 1}\n```\n";
        assert_eq!(strip_json_fences(input), "{\"a\": 1}");
    }

    #[test]
    fn test_parses_pretty_printed_json_directly() {
        let value = parse_model_json("{\n  \"a\": [1, 2],\n  \"b\": null\n}").unwrap();
        assert_eq!(value, json!({"a": [1, 2], "b": null}));
    }

    #[test]
    fn test_repairs_literal_newlines_inside_strings() {
        let raw = "```json\n{\"improvedCv\": \"Line one\nLine two\tend\", \"n\": 3}\n```";
        let value = parse_model_json(raw).unwrap();
        assert_eq!(value["improvedCv"], "Line one\nLine two\tend");
        assert_eq!(value["n"], 3);
    }

    #[test]
    fn test_repair_respects_escaped_quotes() {
        let raw = "{\"quote\": \"she said \\\"hi\\\"\nthen left\"}";
        let value = parse_model_json(raw).unwrap();
        assert_eq!(value["quote"], "she said \"hi\"\nthen left");
    }

    #[test]
    fn test_unrepairable_text_is_invalid_json() {
        let err = parse_model_json("Sorry, I cannot help with that.").unwrap_err();
        assert!(matches!(err, UnparsableResponse::InvalidJson(_)));
    }

    #[test]
    fn test_empty_and_fence_only_are_empty() {
        assert_eq!(parse_model_json("   "), Err(UnparsableResponse::Empty));
        assert_eq!(parse_model_json("```json\n```"), Err(UnparsableResponse::Empty));
    }

    #[test]
    fn test_oversized_output_is_rejected() {
        let raw = format!("\"{}\"", "a".repeat(MAX_RESPONSE_BYTES));
        assert!(matches!(
            parse_model_json(&raw),
            Err(UnparsableResponse::TooLarge { .. })
        ));
    }

    #[test]
    fn test_deep_nesting_is_unparsable_not_a_panic() {
        let raw = format!("{}{}", "[".repeat(10_000), "]".repeat(10_000));
        assert!(matches!(
            parse_model_json(&raw),
            Err(UnparsableResponse::InvalidJson(_))
        ));
    }

    #[test]
    fn test_reparsing_serialized_output_is_idempotent() {
        let raw = "```json\n{\"summary\": \"Two\nlines\", \"scores\": {\"current\": 55}}\n```";
        let first = parse_model_json(raw).unwrap();
        let second = parse_model_json(&serde_json::to_string(&first).unwrap()).unwrap();
        let third = parse_model_json(&serde_json::to_string_pretty(&second).unwrap()).unwrap();
        assert_eq!(first, second);
        assert_eq!(second, third);
    }
}
