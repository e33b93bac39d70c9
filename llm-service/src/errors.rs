//! Unified error type for LLM calls.
//!
//! Goals (same as the rest of the workspace):
//! - Single enum for all public functions in this crate.
//! - Ergonomic `?` via `From` impls.
//! - Response snippets are truncated before they enter error messages so a
//!   misbehaving provider cannot flood the logs.

use thiserror::Error;

/// Maximum number of characters of a provider body kept in error messages.
const SNIPPET_MAX: usize = 300;

/// Root error type for LLM plumbing.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Required configuration is missing (base URL, API key or model).
    #[error("llm configuration incomplete: {0}")]
    Config(String),

    /// Transport-level failure (DNS/connect/timeout/reset).
    #[error("llm transport error: {0}")]
    Transport(String),

    /// Non-2xx HTTP status from a candidate endpoint.
    #[error("llm request failed: {status} {snippet}")]
    HttpStatus { status: u16, snippet: String },

    /// The response body could not be interpreted at all.
    #[error("llm response not usable: {0}")]
    InvalidResponse(String),

    /// The serialized call queue has shut down.
    #[error("llm call queue closed")]
    QueueClosed,

    /// All candidate endpoints were exhausted without usable output.
    #[error("all llm endpoints exhausted: {0}")]
    Exhausted(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Transport(e.to_string())
    }
}

/// Truncates a provider body for inclusion in errors/logs.
pub fn make_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= SNIPPET_MAX {
        return trimmed.to_string();
    }
    trimmed.chars().take(SNIPPET_MAX).collect()
}
