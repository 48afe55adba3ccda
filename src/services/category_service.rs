//! Domain service for incident categories.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Actor, ValidationError};

#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("{0}")]
    Validation(String),

    #[error("Category not found")]
    NotFound(i32),

    #[error("Only administrators can manage categories.")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for CategoryError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.message)
    }
}

impl From<sea_orm::DbErr> for CategoryError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for CategoryError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

impl From<crate::entities::incident_categories::Model> for Category {
    fn from(model: crate::entities::incident_categories::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Absent fields are left unchanged; an empty description clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[async_trait::async_trait]
pub trait CategoryService: Send + Sync {
    /// Ordered by name.
    async fn list(&self) -> Result<Vec<Category>, CategoryError>;

    async fn get(&self, id: i32) -> Result<Category, CategoryError>;

    /// Admin only.
    async fn create(&self, actor: &Actor, input: CategoryInput)
    -> Result<Category, CategoryError>;

    /// Admin only.
    async fn update(
        &self,
        actor: &Actor,
        id: i32,
        patch: CategoryPatch,
    ) -> Result<Category, CategoryError>;

    /// Admin only. A category referenced by incidents cannot be deleted.
    async fn delete(&self, actor: &Actor, id: i32) -> Result<(), CategoryError>;
}
