use anyhow::{Context, Result};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::{incident_categories, incidents, prelude::*};

pub struct CategoryRepository {
    conn: DatabaseConnection,
}

impl CategoryRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list(&self) -> Result<Vec<incident_categories::Model>> {
        IncidentCategories::find()
            .order_by_asc(incident_categories::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to list categories")
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<incident_categories::Model>> {
        IncidentCategories::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query category by ID")
    }

    /// Case-insensitive name lookup, optionally ignoring one row (for renames).
    pub async fn find_by_name(
        &self,
        name: &str,
        exclude_id: Option<i32>,
    ) -> Result<Option<incident_categories::Model>> {
        let mut query = IncidentCategories::find().filter(
            Expr::expr(Func::lower(Expr::col(incident_categories::Column::Name)))
                .eq(name.to_lowercase()),
        );

        if let Some(id) = exclude_id {
            query = query.filter(incident_categories::Column::Id.ne(id));
        }

        query
            .one(&self.conn)
            .await
            .context("Failed to query category by name")
    }

    pub async fn create(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<incident_categories::Model> {
        let active = incident_categories::ActiveModel {
            name: Set(name),
            description: Set(description),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert category")
    }

    pub async fn update(
        &self,
        category: incident_categories::Model,
        name: Option<String>,
        description: Option<Option<String>>,
    ) -> Result<incident_categories::Model> {
        let mut active: incident_categories::ActiveModel = category.into();

        if let Some(name) = name {
            active.name = Set(name);
        }

        if let Some(description) = description {
            active.description = Set(description);
        }

        active
            .update(&self.conn)
            .await
            .context("Failed to update category")
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = IncidentCategories::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete category")?;
        Ok(result.rows_affected > 0)
    }

    pub async fn count_incidents(&self, id: i32) -> Result<u64> {
        Incidents::find()
            .filter(incidents::Column::CategoryId.eq(id))
            .count(&self.conn)
            .await
            .context("Failed to count incidents for category")
    }

    pub async fn count(&self) -> Result<u64> {
        IncidentCategories::find()
            .count(&self.conn)
            .await
            .context("Failed to count categories")
    }
}
