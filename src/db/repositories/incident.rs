use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::domain::IncidentStatus;
use crate::entities::{incident_categories, incidents, prelude::*};

pub type IncidentRow = (incidents::Model, Option<incident_categories::Model>);

/// Listing filters; `None` means "any".
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub query: Option<String>,
    pub status: Option<IncidentStatus>,
    pub category_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewIncident {
    pub title: String,
    pub description: String,
    pub status: IncidentStatus,
    pub category_id: i32,
    pub user_id: i32,
}

/// Field changes for an update; `closed_at` is derived from the status by the caller.
#[derive(Debug, Clone)]
pub struct IncidentChanges {
    pub title: String,
    pub description: String,
    pub status: IncidentStatus,
    pub category_id: i32,
    pub closed_at: Option<DateTime<Utc>>,
}

pub struct IncidentRepository {
    conn: DatabaseConnection,
}

impl IncidentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Newest first. Returns the requested page (1-based), total item count and
    /// total page count.
    pub async fn list(
        &self,
        filter: &IncidentFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<IncidentRow>, u64, u64)> {
        let mut query = Incidents::find()
            .find_also_related(IncidentCategories)
            .order_by_desc(incidents::Column::Timestamp)
            .order_by_desc(incidents::Column::Id);

        if let Some(q) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(incidents::Column::Title.contains(q))
                    .add(incidents::Column::Description.contains(q)),
            );
        }

        if let Some(status) = filter.status {
            query = query.filter(incidents::Column::Status.eq(status.as_str()));
        }

        if let Some(category_id) = filter.category_id {
            query = query.filter(incidents::Column::CategoryId.eq(category_id));
        }

        let paginator = query.paginate(&self.conn, page_size);
        let totals = paginator
            .num_items_and_pages()
            .await
            .context("Failed to count incidents")?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .context("Failed to fetch incident page")?;

        Ok((items, totals.number_of_items, totals.number_of_pages))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<IncidentRow>> {
        Incidents::find_by_id(id)
            .find_also_related(IncidentCategories)
            .one(&self.conn)
            .await
            .context("Failed to query incident by ID")
    }

    pub async fn create(&self, new_incident: NewIncident) -> Result<incidents::Model> {
        let closed_at = new_incident.status.is_closed().then(Utc::now);

        let active = incidents::ActiveModel {
            title: Set(new_incident.title),
            description: Set(new_incident.description),
            status: Set(new_incident.status.as_str().to_string()),
            timestamp: Set(Utc::now()),
            closed_at: Set(closed_at),
            user_id: Set(new_incident.user_id),
            category_id: Set(new_incident.category_id),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert incident")
    }

    pub async fn update(
        &self,
        incident: incidents::Model,
        changes: IncidentChanges,
    ) -> Result<incidents::Model> {
        let mut active: incidents::ActiveModel = incident.into();
        active.title = Set(changes.title);
        active.description = Set(changes.description);
        active.status = Set(changes.status.as_str().to_string());
        active.category_id = Set(changes.category_id);
        active.closed_at = Set(changes.closed_at);

        active
            .update(&self.conn)
            .await
            .context("Failed to update incident")
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = Incidents::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete incident")?;
        Ok(result.rows_affected > 0)
    }

    pub async fn count(&self) -> Result<u64> {
        Incidents::find()
            .count(&self.conn)
            .await
            .context("Failed to count incidents")
    }

    pub async fn count_by_status(&self) -> Result<Vec<(String, i64)>> {
        Incidents::find()
            .select_only()
            .column(incidents::Column::Status)
            .column_as(Expr::col(incidents::Column::Id).count(), "count")
            .group_by(incidents::Column::Status)
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to count incidents by status")
    }

    pub async fn count_by_category(&self) -> Result<Vec<(i32, i64)>> {
        Incidents::find()
            .select_only()
            .column(incidents::Column::CategoryId)
            .column_as(Expr::col(incidents::Column::Id).count(), "count")
            .group_by(incidents::Column::CategoryId)
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to count incidents by category")
    }

    pub async fn timestamps_since(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
        Incidents::find()
            .select_only()
            .column(incidents::Column::Timestamp)
            .filter(incidents::Column::Timestamp.gte(since))
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to load incident timestamps")
    }

    /// `(opened, closed)` pairs for every closed incident.
    pub async fn resolution_spans(&self) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        Incidents::find()
            .select_only()
            .column(incidents::Column::Timestamp)
            .column(incidents::Column::ClosedAt)
            .filter(incidents::Column::ClosedAt.is_not_null())
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to load resolution times")
    }
}
