use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "etl_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub task_id: i32,
    pub run_id: String,
    /// running | success | failed | cancelled
    pub status: String,
    pub start_time: DateTime,
    pub end_time: Option<DateTime>,
    pub records_processed: i64,
    pub records_success: i64,
    pub records_failed: i64,
    pub error_message: Option<String>,
    /// JSON text
    pub details: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::etl_task::Entity",
        from = "Column::TaskId",
        to = "super::etl_task::Column::Id",
        on_delete = "Cascade"
    )]
    EtlTask,
}

impl Related<super::etl_task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EtlTask.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
