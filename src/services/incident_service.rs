//! Domain service for incidents and the admin dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::IncidentRow;
use crate::domain::{Actor, IncidentStatus, ValidationError};

#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("{0}")]
    Validation(String),

    #[error("Incident not found")]
    NotFound(i32),

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for IncidentError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.message)
    }
}

impl From<sea_orm::DbErr> for IncidentError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for IncidentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Incident {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub status: IncidentStatus,
    pub timestamp: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub user_id: i32,
    pub category_id: i32,
    pub category_name: Option<String>,
}

impl From<IncidentRow> for Incident {
    fn from((model, category): IncidentRow) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            status: model.status.parse().unwrap_or_default(),
            timestamp: model.timestamp,
            closed_at: model.closed_at,
            user_id: model.user_id,
            category_id: model.category_id,
            category_name: category.map(|c| c.name),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncidentInput {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub status: Option<String>,
    pub category_id: i32,
}

/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category_id: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct IncidentQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub page: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncidentPage {
    pub items: Vec<Incident>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub pages: u64,
}

/// Chart data for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardData {
    pub statuses: Vec<String>,
    pub status_counts: Vec<i64>,
    pub dates: Vec<String>,
    pub daily_counts: Vec<i64>,
    pub cat_names: Vec<String>,
    pub cat_counts: Vec<i64>,
    pub avg_hours: f64,
}

#[async_trait::async_trait]
pub trait IncidentService: Send + Sync {
    /// Newest first, filtered and paginated.
    async fn list(&self, query: IncidentQuery) -> Result<IncidentPage, IncidentError>;

    async fn get(&self, id: i32) -> Result<Incident, IncidentError>;

    async fn create(&self, actor: &Actor, input: IncidentInput)
    -> Result<Incident, IncidentError>;

    /// Allowed for the incident's creator and for admins.
    async fn update(
        &self,
        actor: &Actor,
        id: i32,
        patch: IncidentPatch,
    ) -> Result<Incident, IncidentError>;

    /// Admin only.
    async fn delete(&self, actor: &Actor, id: i32) -> Result<(), IncidentError>;

    /// Admin only.
    async fn dashboard(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<DashboardData, IncidentError>;
}
