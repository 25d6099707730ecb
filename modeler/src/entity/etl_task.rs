use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "etl_tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub source_datasource_id: i32,
    pub target_model_id: i32,
    /// inactive | active | running | paused | error
    pub status: String,
    /// Stored and returned as-is; nothing interprets it.
    pub schedule: Option<String>,
    /// JSON text, see `crate::etl::TaskConfig`
    pub config: String,
    pub last_run: Option<DateTime>,
    pub next_run: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::etl_log::Entity")]
    EtlLog,
}

impl Related<super::etl_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EtlLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
