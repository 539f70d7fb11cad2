use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::history::HistoryError;
use crate::models::report::ExcludedCandidate;
use crate::screening::orchestrator::ScreeningError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("All candidates failed processing")]
    AllCandidatesFailed(Vec<ExcludedCandidate>),

    #[error("Stage error: {0}")]
    Stage(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("History error: {0}")]
    History(HistoryError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ScreeningError> for AppError {
    fn from(e: ScreeningError) -> Self {
        match e {
            ScreeningError::Validation(v) => AppError::Validation(v.0),
            ScreeningError::JdAnalysis(failure) => AppError::Stage(failure.to_string()),
            ScreeningError::JdExtraction(e) => AppError::Validation(e.to_string()),
            ScreeningError::AllCandidatesFailed { excluded } => {
                AppError::AllCandidatesFailed(excluded)
            }
            ScreeningError::Cancelled => AppError::Cancelled,
            ScreeningError::History(e) => AppError::History(e),
        }
    }
}

impl From<HistoryError> for AppError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::NotFound(id) => AppError::NotFound(format!("Screening {id} not found")),
            HistoryError::InvalidPage(msg) => AppError::Validation(msg),
            other => AppError::History(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details: Option<Value> = None;
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::AllCandidatesFailed(excluded) => {
                details = Some(json!({ "excluded_candidates": excluded }));
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "ALL_CANDIDATES_FAILED",
                    format!("All {} candidate(s) failed processing", excluded.len()),
                )
            }
            AppError::Stage(msg) => {
                tracing::error!("Stage error: {msg}");
                (StatusCode::BAD_GATEWAY, "STAGE_ERROR", msg.clone())
            }
            AppError::Cancelled => (
                StatusCode::REQUEST_TIMEOUT,
                "CANCELLED",
                "The screening request was cancelled or timed out".to_string(),
            ),
            AppError::History(e) => {
                tracing::error!("History error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
