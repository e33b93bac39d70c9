//! Env-driven LLM configuration and candidate-endpoint derivation.

use crate::errors::LlmError;

/// Configuration for the structured-generation endpoint.
///
/// All fields come from the environment:
/// - `LLM_BASE_URL` — provider base URL (required)
/// - `LLM_API_KEY` — bearer token (required)
/// - `LLM_MODEL` — model name (required)
/// - `LLM_ENDPOINT_PATH` — optional preferred endpoint path
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub endpoint_path: Option<String>,
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        LlmConfig {
            base_url: std::env::var("LLM_BASE_URL").unwrap_or_default(),
            api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            model: std::env::var("LLM_MODEL").unwrap_or_default(),
            endpoint_path: std::env::var("LLM_ENDPOINT_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            timeout_secs: std::env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        }
    }

    /// Fails when any of base URL / API key / model is missing.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.base_url.trim().is_empty()
            || self.api_key.trim().is_empty()
            || self.model.trim().is_empty()
        {
            return Err(LlmError::Config(
                "LLM_BASE_URL, LLM_API_KEY and LLM_MODEL must be set".into(),
            ));
        }
        Ok(())
    }

    /// Ordered, deduplicated candidate endpoints.
    ///
    /// The configured path (if any) comes first, then the two generic
    /// conventions: `{base}/responses` and `{base}/chat/completions`.
    pub fn candidate_endpoints(&self) -> Vec<String> {
        let root = self.base_url.trim_end_matches('/').to_string();
        let mut out = Vec::with_capacity(3);
        if let Some(path) = &self.endpoint_path {
            let sep = if path.starts_with('/') { "" } else { "/" };
            out.push(format!("{root}{sep}{path}"));
        }
        for generic in [format!("{root}/responses"), format!("{root}/chat/completions")] {
            if !out.contains(&generic) {
                out.push(generic);
            }
        }
        out
    }
}
