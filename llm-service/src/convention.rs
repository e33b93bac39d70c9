//! The two supported request/response conventions, as tagged adapters.
//!
//! Endpoint shape is chosen by configuration (the candidate path), never by
//! sniffing response bodies:
//! - `…/responses` — instruction-array input, `text.format = json_object`,
//!   output read from `output_text` and/or `output[].content[].text`.
//! - anything else — chat-completions message array,
//!   `response_format = json_object`, output read from
//!   `choices[0].message.content` (string or fragment list).

use serde::Serialize;
use serde_json::{Value, json};

/// Tagged request/response convention for one candidate endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiConvention {
    Responses,
    ChatCompletions,
}

/// Minimal chat-completions request body (non-streaming, JSON-object output).
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    response_format: Value,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl ApiConvention {
    /// Selects the convention for a candidate endpoint path.
    pub fn for_endpoint(endpoint: &str) -> Self {
        if endpoint.trim_end_matches('/').ends_with("/responses") {
            ApiConvention::Responses
        } else {
            ApiConvention::ChatCompletions
        }
    }

    /// Builds the request body for this convention.
    pub fn encode(&self, model: &str, temperature: f32, system: &str, user: &str) -> Value {
        match self {
            ApiConvention::Responses => json!({
                "model": model,
                "temperature": temperature,
                "text": { "format": { "type": "json_object" } },
                "input": [
                    { "role": "system", "content": [{ "type": "input_text", "text": system }] },
                    { "role": "user", "content": [{ "type": "input_text", "text": user }] },
                ],
            }),
            ApiConvention::ChatCompletions => serde_json::to_value(ChatCompletionRequest {
                model,
                temperature,
                response_format: json!({ "type": "json_object" }),
                messages: vec![
                    ChatMessage { role: "system", content: system },
                    ChatMessage { role: "user", content: user },
                ],
            })
            .unwrap_or_else(|_| json!({})),
        }
    }

    /// Extracts the text payload from a decoded response body.
    ///
    /// Returns an empty string when no text can be found; the caller treats
    /// that as "advance to the next candidate".
    pub fn extract_text(&self, output: &Value) -> String {
        match self {
            ApiConvention::ChatCompletions => {
                let content = output
                    .pointer("/choices/0/message/content")
                    .or_else(|| output.pointer("/choices/0/text"));
                match content {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Array(parts)) => parts
                        .iter()
                        .filter_map(|p| {
                            p.get("text")
                                .or_else(|| p.get("content"))
                                .and_then(Value::as_str)
                        })
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                        .join("\n"),
                    _ => String::new(),
                }
            }
            ApiConvention::Responses => {
                let mut chunks: Vec<String> = Vec::new();
                if let Some(text) = output.get("output_text").and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        chunks.push(text.to_string());
                    }
                }

                let blocks = output
                    .get("output")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();

                // Prefer message blocks; fall back to any text fragment.
                for message_only in [true, false] {
                    if !message_only && !chunks.is_empty() {
                        break;
                    }
                    for block in &blocks {
                        if message_only
                            && block.get("type").and_then(Value::as_str) != Some("message")
                        {
                            continue;
                        }
                        let contents = block
                            .get("content")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default();
                        for piece in contents {
                            if let Some(text) = piece.get("text").and_then(Value::as_str) {
                                if !text.trim().is_empty() {
                                    chunks.push(text.to_string());
                                }
                            }
                        }
                    }
                    if message_only && !chunks.is_empty() {
                        break;
                    }
                }

                chunks.join("\n").trim().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convention_selected_by_path() {
        assert_eq!(
            ApiConvention::for_endpoint("https://x/v1/responses"),
            ApiConvention::Responses
        );
        assert_eq!(
            ApiConvention::for_endpoint("https://x/v1/chat/completions"),
            ApiConvention::ChatCompletions
        );
    }

    #[test]
    fn chat_body_has_message_array_and_json_format() {
        let body = ApiConvention::ChatCompletions.encode("m", 0.1, "sys", "usr");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
    }

    #[test]
    fn responses_body_has_input_array_and_json_format() {
        let body = ApiConvention::Responses.encode("m", 0.0, "sys", "usr");
        assert_eq!(body["text"]["format"]["type"], "json_object");
        assert_eq!(body["input"][1]["content"][0]["text"], "usr");
    }

    #[test]
    fn extracts_chat_string_and_fragment_content() {
        let out = serde_json::json!({"choices":[{"message":{"content":"hello"}}]});
        assert_eq!(ApiConvention::ChatCompletions.extract_text(&out), "hello");

        let out = serde_json::json!({"choices":[{"message":{"content":[
            {"text":"a"}, {"content":"b"}
        ]}}]});
        assert_eq!(ApiConvention::ChatCompletions.extract_text(&out), "a\nb");
    }

    #[test]
    fn extracts_responses_output_blocks() {
        let out = serde_json::json!({
            "output": [
                {"type": "reasoning", "content": [{"text": "ignored"}]},
                {"type": "message", "content": [{"text": "{\"a\":1}"}]}
            ]
        });
        assert_eq!(ApiConvention::Responses.extract_text(&out), "{\"a\":1}");
    }

    #[test]
    fn responses_fall_back_to_any_fragment_when_no_message_block() {
        let out = serde_json::json!({
            "output": [{"type": "reasoning", "content": [{"text": "only"}]}]
        });
        assert_eq!(ApiConvention::Responses.extract_text(&out), "only");
    }
}
