use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "incidents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub title: String,

    /// Sanitised HTML.
    pub description: String,

    /// `Open`, `In Progress` or `Closed`
    pub status: String,

    pub timestamp: DateTimeUtc,

    pub closed_at: Option<DateTimeUtc>,

    pub user_id: i32,

    pub category_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Users,
    #[sea_orm(
        belongs_to = "super::incident_categories::Entity",
        from = "Column::CategoryId",
        to = "super::incident_categories::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    IncidentCategories,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::incident_categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IncidentCategories.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
