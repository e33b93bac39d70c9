use std::path::PathBuf;

use llm_service::{LlmClient, LlmConfig};
use release_reviewer::ReviewEngine;
use release_reviewer::store::ReportStore;

use crate::error_handler::AppResult;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The review pipeline (LLM client, serialized queue, report store).
    pub engine: ReviewEngine,
    /// Protocol catalog file (markdown with an embedded csv block).
    pub catalog_path: PathBuf,
}

impl AppState {
    /// Load shared state from environment variables.
    pub fn from_env() -> AppResult<Self> {
        let llm = LlmClient::new(LlmConfig::from_env())?;
        let engine = ReviewEngine::new(llm, ReportStore::from_env());
        let catalog_path =
            std::env::var("PROTOCOLS_FILE").unwrap_or_else(|_| "list.md".to_string());
        Ok(Self {
            engine,
            catalog_path: PathBuf::from(catalog_path),
        })
    }
}
