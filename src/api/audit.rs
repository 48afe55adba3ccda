use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::validation::validate_limit;
use super::{ApiError, ApiResponse, AppState};
use crate::db::AuditEntry;
use crate::domain::{Action, Resource};
use crate::services::policy;

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub limit: Option<u64>,
}

/// GET /audit-logs
/// Newest first, capped at `audit.listing_limit`.
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(account)): Extension<CurrentUser>,
    Query(params): Query<AuditParams>,
) -> Result<Json<ApiResponse<Vec<AuditEntry>>>, ApiError> {
    if !policy::authorize(&account.actor(), Action::Read, Resource::AuditLog) {
        return Err(ApiError::forbidden());
    }

    let limit = validate_limit(params.limit, state.config().audit.listing_limit)?;
    let entries = state.store().recent_audit_entries(limit).await?;

    Ok(Json(ApiResponse::success(entries)))
}
