//! Review orchestrator: one structured-generation call per review, with
//! endpoint fallback, a single repair pass, and a heuristic last resort.
//!
//! The call itself is globally serialized: the pipeline submits
//! [`generate_review`] through the process-wide [`llm_service::SerialQueue`],
//! so at most one generation request is in flight regardless of how many
//! protocols are being reviewed concurrently.

pub mod fallback;
pub mod parse;
pub mod prompt;

use serde_json::Value;
use tracing::{debug, warn};

use llm_service::{ApiConvention, LlmClient, LlmError};

pub use prompt::ReviewInput;

const MAIN_TEMPERATURE: f32 = 0.1;
const REPAIR_TEMPERATURE: f32 = 0.0;

/// Provider error text that means "wrong endpoint/method, try the next
/// candidate" rather than a fatal failure.
fn is_wrong_endpoint_error(body: &Value) -> bool {
    let message = body
        .pointer("/error/message")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("");
    message.to_lowercase().contains("unexpected endpoint or method")
}

/// Runs the candidate-endpoint loop and returns a raw (un-normalized)
/// review object.
///
/// Stages per candidate: direct review object in the body → text
/// extraction + strict/truncation parsing → one repair request → raw text
/// kept as heuristic material. Only exhaustion of every candidate without
/// any output at any stage raises.
pub async fn generate_review(client: &LlmClient, input: &ReviewInput) -> Result<Value, LlmError> {
    let system = prompt::system_prompt();
    let user = prompt::user_prompt(input);
    let endpoints = client.config().candidate_endpoints();

    let mut last_error = String::from("unknown generation error");
    let mut fallback_text = String::new();

    for endpoint in &endpoints {
        let convention = ApiConvention::for_endpoint(endpoint);
        let body = convention.encode(&client.config().model, MAIN_TEMPERATURE, &system, &user);

        let raw = match client.post_json(endpoint, &body).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(%endpoint, error = %e, "candidate endpoint failed");
                last_error = e.to_string();
                continue;
            }
        };

        if is_wrong_endpoint_error(&raw.body) {
            last_error = format!("wrong endpoint convention at {endpoint}");
            continue;
        }

        // 1) The body may already be (or wrap) a review object.
        if let Some(review) = parse::find_review_object(&raw.body) {
            debug!(%endpoint, "accepted direct review object");
            return Ok(review);
        }

        // 2) Extract a text payload per convention.
        let content = convention.extract_text(&raw.body);
        if content.trim().is_empty() {
            last_error = format!("empty response content from {endpoint}");
            continue;
        }

        // 3/4) Strict parse with fence stripping + truncation repair.
        if let Some(review) = parse::parse_review_text(&content) {
            debug!(%endpoint, "parsed review from text payload");
            return Ok(review);
        }

        // 5) Exactly one repair request over the same candidate list.
        if let Some(review) = repair_via_llm(client, &endpoints, &content).await {
            debug!(%endpoint, "review recovered by repair pass");
            return Ok(review);
        }

        if fallback_text.is_empty() {
            fallback_text = content;
        }
    }

    // 6) Heuristic last resort from whatever text we saw.
    if !fallback_text.is_empty() {
        warn!("structured output unobtainable, deriving heuristic review");
        return Ok(fallback::heuristic_review_from_text(&fallback_text));
    }

    Err(LlmError::Exhausted(last_error))
}

/// One reformat-into-schema request, tried across the candidate list.
async fn repair_via_llm(
    client: &LlmClient,
    endpoints: &[String],
    raw_text: &str,
) -> Option<Value> {
    let trimmed = raw_text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let system = prompt::repair_system_prompt();
    let user = prompt::repair_user_prompt(trimmed);

    for endpoint in endpoints {
        let convention = ApiConvention::for_endpoint(endpoint);
        let body = convention.encode(&client.config().model, REPAIR_TEMPERATURE, &system, &user);

        let Ok(raw) = client.post_json(endpoint, &body).await else {
            continue;
        };
        if is_wrong_endpoint_error(&raw.body) {
            continue;
        }
        let content = convention.extract_text(&raw.body);
        if let Some(review) = parse::parse_review_text(&content) {
            return Some(review);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use llm_service::LlmConfig;

    #[tokio::test]
    async fn wrong_endpoint_candidate_falls_through_to_the_next() {
        use axum::{Json, Router, routing::post};

        // First candidate answers 200 with the provider's wrong-endpoint
        // error; the second answers a valid chat completion.
        let app = Router::new()
            .route(
                "/responses",
                post(|| async {
                    Json(json!({
                        "error": {"message": "Unexpected endpoint or method. (POST /responses)"}
                    }))
                }),
            )
            .route(
                "/chat/completions",
                post(|| async {
                    Json(json!({
                        "choices": [{"message": {
                            "content": "{\"overview\":\"ok\",\"verdict\":\"safe\"}"
                        }}]
                    }))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = LlmClient::new(LlmConfig {
            base_url: format!("http://{addr}"),
            api_key: "test-key".into(),
            model: "test-model".into(),
            endpoint_path: None,
            timeout_secs: 5,
        })
        .unwrap();

        let input = ReviewInput {
            protocol: "ethereum".into(),
            repo_url: "https://github.com/acme/node.git".into(),
            rss_title: "v1.2.0".into(),
            base_sha: "a".repeat(40),
            head_sha: "b".repeat(40),
            diff: crate::diff::DiffContext::default(),
        };

        let review = generate_review(&client, &input).await.unwrap();
        assert_eq!(review["overview"], "ok");
        assert_eq!(review["verdict"], "safe");
    }

    #[test]
    fn wrong_endpoint_errors_are_recognized_in_both_shapes() {
        let a = json!({"error": {"message": "Unexpected endpoint or method. (POST /responses)"}});
        let b = json!({"message": "unexpected endpoint or method"});
        let c = json!({"error": {"message": "rate limited"}});
        assert!(is_wrong_endpoint_error(&a));
        assert!(is_wrong_endpoint_error(&b));
        assert!(!is_wrong_endpoint_error(&c));
        assert!(!is_wrong_endpoint_error(&json!({})));
    }
}
