use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "properties")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub model_id: i32,
    pub name: String,
    pub code: String,
    pub prop_type: String,
    pub required: bool,
    pub description: Option<String>,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub default_value: Option<String>,
    /// JSON text: array of constraint strings
    pub constraints: String,
    pub sensitivity_level: Option<String>,
    pub mask_rule: Option<String>,
    pub physical_column: Option<String>,
    pub foreign_key_table: Option<String>,
    pub foreign_key_column: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::data_model::Entity",
        from = "Column::ModelId",
        to = "super::data_model::Column::Id",
        on_delete = "Cascade"
    )]
    DataModel,
}

impl Related<super::data_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DataModel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn constraint_list(&self) -> Vec<String> {
        serde_json::from_str(&self.constraints).unwrap_or_default()
    }

    /// Column name used in physical tables.
    pub fn column_name(&self) -> String {
        match self.physical_column.as_deref() {
            Some(col) if !col.trim().is_empty() => col.trim().to_string(),
            _ => crate::etl::definition::snake_case(&self.name),
        }
    }
}
