//! GET /api/client-review — run (or replay) a release review.
//!
//! Query parameters:
//! - `protocol` (required): catalog protocol name.
//! - `backfill` (optional, 1..=10): create reports for recent releases
//!   missing from the history before the regular review.
//! - `mode=step` (optional, with `backfill`): create at most one backfill
//!   report and return without running the regular review.
//!
//! # Example
//! ```bash
//! curl 'http://127.0.0.1:8080/api/client-review?protocol=ethereum&backfill=5&mode=step'
//! ```

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use release_reviewer::{
    BackfillSummary, ReviewOutcome, ReviewStatus,
    errors::Error as ReviewError,
    report::ReviewReport,
    store::{RecentReport, recent_reports},
};

use crate::{catalog, core::app_state::AppState, error_handler::{AppError, AppResult}};

#[derive(Debug, Deserialize)]
pub struct ClientReviewQuery {
    protocol: Option<String>,
    backfill: Option<String>,
    mode: Option<String>,
}

#[derive(Serialize)]
struct ClientReviewResponse {
    #[serde(flatten)]
    outcome: ReviewOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    backfill: Option<BackfillSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BackfillStepResponse {
    status: ReviewStatus,
    message: String,
    protocol: String,
    report: Option<ReviewReport>,
    backfill: BackfillSummary,
    recent_reports: Vec<RecentReport>,
}

pub async fn client_review(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ClientReviewQuery>,
) -> AppResult<Response> {
    let protocol = q.protocol.as_deref().unwrap_or("").trim().to_string();
    if protocol.is_empty() {
        return Err(AppError::MissingProtocol);
    }

    let entry = catalog::find_protocol(&state.catalog_path, &protocol)?
        .ok_or(AppError::ProtocolNotFound)?;
    let repo_ref = entry.repo_ref().ok_or_else(|| {
        AppError::Review(ReviewError::Validation(format!(
            "invalid repository reference: {}",
            entry.github_repo
        )))
    })?;

    let backfill_count = parse_backfill(q.backfill.as_deref());
    let step = q
        .mode
        .as_deref()
        .is_some_and(|m| m.trim().eq_ignore_ascii_case("step"));
    debug!(%protocol, backfill_count, step, "client review requested");

    if backfill_count > 0 {
        let summary = state
            .engine
            .backfill(&protocol, &repo_ref, backfill_count, step)
            .await?;
        if step {
            return Ok(step_response(&state, &protocol, summary)?.into_response());
        }
        let outcome = state.engine.run_review(&protocol, &repo_ref).await?;
        return Ok(Json(ClientReviewResponse {
            outcome,
            backfill: Some(summary),
        })
        .into_response());
    }

    let outcome = state.engine.run_review(&protocol, &repo_ref).await?;
    Ok(Json(ClientReviewResponse {
        outcome,
        backfill: None,
    })
    .into_response())
}

fn step_response(
    state: &AppState,
    protocol: &str,
    summary: BackfillSummary,
) -> AppResult<Json<BackfillStepResponse>> {
    let history = state.engine.store().load(protocol).map_err(ReviewError::from)?;
    let (status, message) = if summary.created > 0 {
        (
            ReviewStatus::BackfillStepCreated,
            "Created one backfill report.".to_string(),
        )
    } else {
        (
            ReviewStatus::BackfillStepIdle,
            "Nothing new to create.".to_string(),
        )
    };
    Ok(Json(BackfillStepResponse {
        status,
        message,
        protocol: protocol.to_string(),
        report: history.latest_report().cloned(),
        backfill: summary,
        recent_reports: recent_reports(&history),
    }))
}

/// Mirrors lenient numeric parsing: absent or unparsable values mean "no
/// backfill".
fn parse_backfill(raw: Option<&str>) -> usize {
    raw.and_then(|v| v.trim().parse::<usize>().ok()).unwrap_or(0)
}
