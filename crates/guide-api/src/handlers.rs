//! # Guide Handlers
//!
//! One handler per repository operation.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::Value;

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use guide_domain::{Guide, GuideInput, IndexEntry};
use guide_persistence::ReconcileReport;

/// `GET /api/guides`
pub async fn list_guides(State(state): State<AppState>) -> Json<Vec<IndexEntry>> {
    Json(state.repo.list_summaries().await)
}

/// `GET /api/guides/{id}`
pub async fn get_guide(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Guide>> {
    state
        .repo
        .get_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::guide_not_found(id))
}

/// `POST /api/guides`
pub async fn create_guide(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Guide>)> {
    let Json(body) = body?;
    let input = GuideInput::from_json(&body)?;
    let guide = state.repo.create(input).await?;
    Ok((StatusCode::CREATED, Json(guide)))
}

/// `PUT /api/guides/{id}`
pub async fn update_guide(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Guide>> {
    let Json(body) = body?;
    let input = GuideInput::from_json(&body)?;
    state
        .repo
        .update(&id, input)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::guide_not_found(id))
}

/// `DELETE /api/guides/{id}`
pub async fn delete_guide(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.repo.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::guide_not_found(id))
    }
}

/// `POST /api/maintenance/reconcile-index`
pub async fn reconcile_index(State(state): State<AppState>) -> ApiResult<Json<ReconcileReport>> {
    let report = state.repo.reconcile_index().await?;
    Ok(Json(report))
}
