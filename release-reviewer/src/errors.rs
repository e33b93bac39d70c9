//! Crate-wide error hierarchy for release-reviewer.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - One variant per failure class in the pipeline taxonomy: feed, repo
//!   sync, generation, store, validation.
//! - No dynamic dispatch; ergonomic `?` via `From` impls.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type ReviewResult<T> = Result<T, Error>;

/// Root error type for the release-reviewer crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Release feed fetch/parse failure. Terminates the attempt for that
    /// protocol; no partial review is produced.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Clone/fetch/checkout failure. Terminates the attempt; the local
    /// clone is still released.
    #[error(transparent)]
    RepoSync(#[from] RepoSyncError),

    /// LLM plumbing failure that escaped every absorption layer.
    #[error(transparent)]
    Generation(#[from] llm_service::LlmError),

    /// Report store (file I/O / JSON) failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Input validation errors (unknown protocol, bad repository ref).
    #[error("validation error: {0}")]
    Validation(String),
}

/// Release feed errors (FeedUnavailable in the taxonomy).
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed fetch failed: status {0}")]
    HttpStatus(u16),

    #[error("feed network error: {0}")]
    Network(String),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("no release entries in feed")]
    NoEntries,
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return FeedError::HttpStatus(status.as_u16());
        }
        FeedError::Network(e.to_string())
    }
}

/// Repository synchronization errors.
#[derive(Debug, Error)]
pub enum RepoSyncError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid repository reference: {0}")]
    InvalidRepoRef(String),

    #[error("git task aborted: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for RepoSyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        RepoSyncError::Task(e.to_string())
    }
}

/// Report store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
