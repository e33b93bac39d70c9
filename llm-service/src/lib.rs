//! Shared LLM plumbing for the release-review pipeline.
//!
//! This crate deliberately knows nothing about review schemas. It provides:
//! - [`LlmConfig`] — env-driven endpoint/model configuration and the ordered
//!   candidate-endpoint list used for fallback.
//! - [`ApiConvention`] — the two supported request/response conventions
//!   (Responses-style input arrays vs chat-completions message arrays) as
//!   tagged adapters with `encode` / `extract_text`.
//! - [`LlmClient`] — a thin `reqwest` wrapper posting JSON with bearer auth.
//! - [`SerialQueue`] — a bounded single-worker task queue guaranteeing at most
//!   one structured-generation call in flight process-wide.
//!
//! Errors are normalized via [`LlmError`].

pub mod client;
pub mod config;
pub mod convention;
pub mod errors;
pub mod queue;

pub use client::LlmClient;
pub use config::LlmConfig;
pub use convention::ApiConvention;
pub use errors::LlmError;
pub use queue::SerialQueue;
