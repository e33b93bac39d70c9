use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use release_reviewer::errors::Error as ReviewError;

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot / config ---
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error(transparent)]
    Config(#[from] llm_service::LlmError),

    // --- IO / network / server ---
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("server error: {0}")]
    Server(#[source] std::io::Error),

    // --- Request / routing ---
    #[error("Missing protocol query parameter")]
    MissingProtocol,

    #[error("Protocol not found in list.md")]
    ProtocolNotFound,

    #[error("catalog read failed: {0}")]
    Catalog(#[from] std::io::Error),

    /// Pipeline failure surfaced to the caller as a 500.
    #[error("{0}")]
    Review(#[from] ReviewError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingProtocol => StatusCode::BAD_REQUEST,
            AppError::ProtocolNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape for every error response: `{"error": "..."}`.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;
