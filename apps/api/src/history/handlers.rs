use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::history::Page;
use crate::models::history::{HistoryRecord, HistorySummary};
use crate::state::AppState;

/// GET /api/v1/screenings/history
pub async fn handle_list_history(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<HistorySummary>>, AppError> {
    page.validate()?;
    Ok(Json(state.history.list(page).await?))
}

/// GET /api/v1/screenings/history/:id
pub async fn handle_get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryRecord>, AppError> {
    let record = state
        .history
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Screening {id} not found")))?;
    Ok(Json(record))
}
