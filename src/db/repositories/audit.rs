use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect, Set,
};

use crate::domain::{AuditAction, TargetType};
use crate::entities::{audit_logs, prelude::*};

pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn add(
        &self,
        actor_id: Option<i32>,
        action: AuditAction,
        target_type: TargetType,
        target_id: Option<i32>,
    ) -> Result<audit_logs::Model> {
        let active = audit_logs::ActiveModel {
            user_id: Set(actor_id),
            action: Set(action.as_str().to_string()),
            target_type: Set(target_type.as_str().to_string()),
            target_id: Set(target_id),
            timestamp: Set(Utc::now()),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert audit entry")
    }

    /// Newest first.
    pub async fn recent(&self, limit: u64) -> Result<Vec<audit_logs::Model>> {
        AuditLogs::find()
            .order_by_desc(audit_logs::Column::Timestamp)
            .order_by_desc(audit_logs::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list audit entries")
    }

    pub async fn count(&self) -> Result<u64> {
        AuditLogs::find()
            .count(&self.conn)
            .await
            .context("Failed to count audit entries")
    }
}
