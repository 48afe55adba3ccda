use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::validation::validate_id;
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::services::{Category, CategoryInput, CategoryPatch};

/// GET /categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Category>>>, ApiError> {
    let categories = state.categories().list().await?;
    Ok(Json(ApiResponse::success(categories)))
}

/// GET /categories/{id}
pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Category>>, ApiError> {
    let id = validate_id("category", id)?;
    let category = state.categories().get(id).await?;
    Ok(Json(ApiResponse::success(category)))
}

/// POST /categories
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(account)): Extension<CurrentUser>,
    Json(payload): Json<CategoryInput>,
) -> Result<Response, ApiError> {
    let category = state
        .categories()
        .create(&account.actor(), payload)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(category))).into_response())
}

/// PUT /categories/{id}
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(account)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<CategoryPatch>,
) -> Result<Json<ApiResponse<Category>>, ApiError> {
    let id = validate_id("category", id)?;
    let category = state
        .categories()
        .update(&account.actor(), id, payload)
        .await?;

    Ok(Json(ApiResponse::success(category)))
}

/// DELETE /categories/{id}, also POST /categories/{id}/delete
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(account)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validate_id("category", id)?;
    state.categories().delete(&account.actor(), id).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Category deleted successfully.",
    ))))
}
