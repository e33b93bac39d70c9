//! Thin HTTP client for structured-generation endpoints.

use std::time::{Duration, Instant};

use reqwest::header;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::errors::{LlmError, make_snippet};

/// Outcome of one candidate-endpoint attempt, before any review-schema
/// interpretation happens.
#[derive(Debug)]
pub struct RawResponse {
    /// Decoded JSON body.
    pub body: Value,
}

/// Preconfigured `reqwest` client with bearer auth and timeout.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    cfg: LlmConfig,
}

impl LlmClient {
    /// Builds the client. Validates that base URL, key and model are set.
    pub fn new(cfg: LlmConfig) -> Result<Self, LlmError> {
        cfg.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", cfg.api_key))
                .map_err(|e| LlmError::Config(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(LlmClient { http, cfg })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.cfg
    }

    /// POSTs `body` to one candidate endpoint and decodes the JSON response.
    ///
    /// # Errors
    /// - [`LlmError::HttpStatus`] for non-2xx responses
    /// - [`LlmError::Transport`] for network failures
    /// - [`LlmError::InvalidResponse`] when the body is not JSON
    pub async fn post_json(&self, endpoint: &str, body: &Value) -> Result<RawResponse, LlmError> {
        let started = Instant::now();
        debug!(model = %self.cfg.model, %endpoint, "POST structured generation");

        let resp = self.http.post(endpoint).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                %endpoint,
                latency_ms = started.elapsed().as_millis(),
                "candidate endpoint returned non-success status"
            );
            return Err(LlmError::HttpStatus {
                status: status.as_u16(),
                snippet: make_snippet(&text),
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(|_| {
            LlmError::InvalidResponse(format!("non-JSON body: {}", make_snippet(&text)))
        })?;

        debug!(
            %endpoint,
            latency_ms = started.elapsed().as_millis(),
            "structured generation responded"
        );
        Ok(RawResponse { body })
    }
}
