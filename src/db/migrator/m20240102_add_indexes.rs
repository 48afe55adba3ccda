use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Incident listing is newest-first with optional status/category filters
        manager
            .create_index(
                Index::create()
                    .name("idx_incidents_timestamp")
                    .table(Incidents::Table)
                    .col(Incidents::Timestamp)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incidents_status")
                    .table(Incidents::Table)
                    .col(Incidents::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incidents_category_id")
                    .table(Incidents::Table)
                    .col(Incidents::CategoryId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_timestamp")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::Timestamp)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Admin notification fan-out
        manager
            .create_index(
                Index::create()
                    .name("idx_users_role")
                    .table(Users::Table)
                    .col(Users::Role)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_users_role").table(Users::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_audit_logs_timestamp")
                    .table(AuditLogs::Table)
                    .to_owned(),
            )
            .await?;
        for name in [
            "idx_incidents_category_id",
            "idx_incidents_status",
            "idx_incidents_timestamp",
        ] {
            manager
                .drop_index(Index::drop().name(name).table(Incidents::Table).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(Iden)]
enum Incidents {
    Table,
    Timestamp,
    Status,
    CategoryId,
}

#[derive(Iden)]
enum AuditLogs {
    Table,
    Timestamp,
}

#[derive(Iden)]
enum Users {
    Table,
    Role,
}
