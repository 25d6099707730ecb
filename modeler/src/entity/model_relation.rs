use sea_orm::entity::prelude::*;

/// Directed relation between two models. Graph edges are derived from these rows.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "relations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub source_model_id: i32,
    pub target_model_id: i32,
    pub relation_type: String,
    pub description: Option<String>,
    pub enabled: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::data_model::Entity",
        from = "Column::SourceModelId",
        to = "super::data_model::Column::Id",
        on_delete = "Cascade"
    )]
    SourceModel,
    #[sea_orm(
        belongs_to = "super::data_model::Entity",
        from = "Column::TargetModelId",
        to = "super::data_model::Column::Id",
        on_delete = "Cascade"
    )]
    TargetModel,
}

impl ActiveModelBehavior for ActiveModel {}
