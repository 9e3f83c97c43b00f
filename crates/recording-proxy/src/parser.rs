//! Token-usage parser: a pure, non-async extraction of token counts from the
//! JSON and SSE bodies of the Anthropic Messages API. Never panics, never
//! throws on malformed input — every failure degrades to `None`.

use serde_json::Value;

/// Extracted token usage for a single LLM call. At most one per Exchange.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedUsage {
    pub model: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_creation_tokens: i64,
}

/// `POST .../v1/messages` or `POST .../messages`, suffix ending at a segment
/// boundary. Query strings are stripped before matching.
pub fn is_anthropic_messages_call(method: &str, path: &str) -> bool {
    if !method.eq_ignore_ascii_case("POST") {
        return false;
    }
    let path_only = path.split('?').next().unwrap_or(path);
    path_only.to_ascii_lowercase().ends_with("/messages")
}

/// True iff the recorded `Content-Type` header value contains
/// `text/event-stream`, case-insensitively.
pub fn is_streaming_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/event-stream")
}

/// Extract token usage from a response body. `is_streaming` selects SSE vs.
/// plain-JSON parsing. Null/whitespace-only input returns `None`.
pub fn parse(body: &str, is_streaming: bool) -> Option<ParsedUsage> {
    if body.trim().is_empty() {
        return None;
    }
    if is_streaming {
        parse_streaming(body)
    } else {
        parse_non_streaming(body)
    }
}

fn parse_non_streaming(body: &str) -> Option<ParsedUsage> {
    let root: Value = serde_json::from_str(body).ok()?;
    let usage = root.get("usage")?;
    Some(ParsedUsage {
        model: root.get("model").and_then(|v| v.as_str()).map(String::from),
        ..usage_counts(usage)
    })
}

fn usage_counts(usage: &Value) -> ParsedUsage {
    ParsedUsage {
        model: None,
        input_tokens: usage.get("input_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
        output_tokens: usage.get("output_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
        cache_read_tokens: usage
            .get("cache_read_input_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
        cache_creation_tokens: usage
            .get("cache_creation_input_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
    }
}

fn parse_streaming(body: &str) -> Option<ParsedUsage> {
    let mut model: Option<String> = None;
    let mut start_usage: Option<ParsedUsage> = None;
    let mut delta_usage: Option<ParsedUsage> = None;

    for raw_line in body.split('\n') {
        let line = raw_line.trim();
        let Some(rest) = line.strip_prefix("data:") else {
            continue;
        };
        let rest = rest.trim();
        if rest.is_empty() || rest == "[DONE]" {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(rest) else {
            continue;
        };

        match event.get("type").and_then(|v| v.as_str()) {
            Some("message_start") => {
                if let Some(message) = event.get("message") {
                    if let Some(m) = message.get("model").and_then(|v| v.as_str()) {
                        model = Some(m.to_string());
                    }
                    if let Some(usage) = message.get("usage") {
                        start_usage = Some(usage_counts(usage));
                    }
                }
            }
            Some("message_delta") => {
                if let Some(usage) = event.get("usage") {
                    delta_usage = Some(usage_counts(usage));
                }
            }
            _ => {}
        }
    }

    if let Some(mut usage) = delta_usage {
        usage.model = model;
        Some(usage)
    } else if let Some(mut usage) = start_usage {
        usage.model = model;
        Some(usage)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_messages_calls() {
        assert!(is_anthropic_messages_call("POST", "/v1/messages"));
        assert!(is_anthropic_messages_call("post", "/v1/messages?stream=true"));
        assert!(is_anthropic_messages_call("POST", "/prefix/v1/messages"));
        assert!(!is_anthropic_messages_call("GET", "/v1/messages"));
        assert!(!is_anthropic_messages_call("POST", "/v1/messages-extended"));
    }

    #[test]
    fn non_streaming_parses_usage() {
        let body = r#"{"type":"message","model":"claude-sonnet-4-6","usage":{"input_tokens":10,"output_tokens":25,"cache_read_input_tokens":100,"cache_creation_input_tokens":50}}"#;
        let usage = parse(body, false).expect("usage present");
        assert_eq!(usage.model.as_deref(), Some("claude-sonnet-4-6"));
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 25);
        assert_eq!(usage.cache_read_tokens, 100);
        assert_eq!(usage.cache_creation_tokens, 50);
    }

    #[test]
    fn non_streaming_is_idempotent() {
        let body = r#"{"model":"m","usage":{"input_tokens":1,"output_tokens":2}}"#;
        assert_eq!(parse(body, false), parse(body, false));
    }

    #[test]
    fn non_streaming_without_usage_is_none() {
        let body = r#"{"model":"m"}"#;
        assert_eq!(parse(body, false), None);
    }

    #[test]
    fn non_streaming_malformed_json_is_none() {
        assert_eq!(parse("not json", false), None);
    }

    #[test]
    fn whitespace_only_body_is_none() {
        assert_eq!(parse("   \n  ", true), None);
        assert_eq!(parse("", false), None);
    }

    fn sse_fixture() -> String {
        [
            r#"event: message_start"#,
            r#"data: {"type":"message_start","message":{"model":"claude-sonnet-4-6","usage":{"input_tokens":3,"output_tokens":0,"cache_creation_input_tokens":1886,"cache_read_input_tokens":18685}}}"#,
            "",
            r#"event: content_block_delta"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
            "",
            r#"event: message_delta"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"input_tokens":3,"output_tokens":176,"cache_creation_input_tokens":1886,"cache_read_input_tokens":18685}}"#,
            "",
            r#"event: message_stop"#,
            r#"data: {"type":"message_stop"}"#,
            "",
        ]
        .join("\n")
    }

    #[test]
    fn streaming_prefers_message_delta_with_model_override() {
        let usage = parse(&sse_fixture(), true).expect("usage present");
        assert_eq!(usage.model.as_deref(), Some("claude-sonnet-4-6"));
        assert_eq!(usage.input_tokens, 3);
        assert_eq!(usage.output_tokens, 176);
        assert_eq!(usage.cache_read_tokens, 18685);
        assert_eq!(usage.cache_creation_tokens, 1886);
    }

    #[test]
    fn streaming_falls_back_to_message_start_when_no_delta_usage() {
        let body = [
            r#"data: {"type":"message_start","message":{"model":"m","usage":{"input_tokens":7}}}"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#,
        ]
        .join("\n");
        let usage = parse(&body, true).expect("usage present");
        assert_eq!(usage.model.as_deref(), Some("m"));
        assert_eq!(usage.input_tokens, 7);
    }

    #[test]
    fn streaming_ignores_malformed_data_lines() {
        let base = sse_fixture();
        let with_noise = format!("{base}data: not json\n\n");
        assert_eq!(parse(&base, true), parse(&with_noise, true));
    }

    #[test]
    fn streaming_ignores_done_marker() {
        let body = "data: [DONE]\n";
        assert_eq!(parse(body, true), None);
    }

    #[test]
    fn streaming_with_neither_event_is_none() {
        let body = "data: {\"type\":\"content_block_delta\"}\n";
        assert_eq!(parse(body, true), None);
    }

    #[test]
    fn content_type_matching_is_case_insensitive_and_ignores_params() {
        assert!(is_streaming_content_type("text/event-stream; charset=utf-8"));
        assert!(is_streaming_content_type("TEXT/EVENT-STREAM"));
        assert!(!is_streaming_content_type("application/json"));
    }
}
