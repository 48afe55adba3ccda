use axum::{Extension, Json, extract::State};
use chrono::Utc;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::{ApiError, ApiResponse, AppState};
use crate::services::DashboardData;

/// GET /dashboard/data
pub async fn get_dashboard_data(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(account)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<DashboardData>>, ApiError> {
    let data = state
        .incidents()
        .dashboard(&account.actor(), Utc::now())
        .await?;

    Ok(Json(ApiResponse::success(data)))
}
