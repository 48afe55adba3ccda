use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::validation::{validate_id, validate_page};
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::services::{Incident, IncidentInput, IncidentPage, IncidentPatch, IncidentQuery};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub q: Option<String>,
    pub status: Option<String>,
    /// Kept as text so a malformed value can be ignored instead of rejected.
    pub category: Option<String>,
    pub page: Option<u64>,
}

/// GET /incidents
pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<IncidentPage>>, ApiError> {
    let page = validate_page(params.page)?;

    let result = state
        .incidents()
        .list(IncidentQuery {
            q: params.q,
            status: params.status,
            category: params.category,
            page,
        })
        .await?;

    Ok(Json(ApiResponse::success(result)))
}

/// GET /incidents/{id}
pub async fn get_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Incident>>, ApiError> {
    let id = validate_id("incident", id)?;
    let incident = state.incidents().get(id).await?;
    Ok(Json(ApiResponse::success(incident)))
}

/// POST /incidents
pub async fn create_incident(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(account)): Extension<CurrentUser>,
    Json(payload): Json<IncidentInput>,
) -> Result<Response, ApiError> {
    let incident = state
        .incidents()
        .create(&account.actor(), payload)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(incident))).into_response())
}

/// PUT /incidents/{id}
pub async fn update_incident(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(account)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<IncidentPatch>,
) -> Result<Json<ApiResponse<Incident>>, ApiError> {
    let id = validate_id("incident", id)?;
    let incident = state
        .incidents()
        .update(&account.actor(), id, payload)
        .await?;

    Ok(Json(ApiResponse::success(incident)))
}

/// DELETE /incidents/{id}, also POST /incidents/{id}/delete
pub async fn delete_incident(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(account)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validate_id("incident", id)?;
    state.incidents().delete(&account.actor(), id).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Incident deleted successfully.",
    ))))
}
