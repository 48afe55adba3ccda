use axum::{
    Extension, Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::validation::validate_id;
use super::{ApiError, ApiResponse, AppState, RoleRequest};
use crate::domain::{Account, Role};

/// PUT /users/{id}/role
pub async fn change_role(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(account)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<RoleRequest>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let id = validate_id("user", id)?;
    let role: Role = payload.role.parse()?;

    let updated = state
        .auth()
        .change_role(&account.actor(), id, role)
        .await?;

    Ok(Json(ApiResponse::success(updated)))
}
