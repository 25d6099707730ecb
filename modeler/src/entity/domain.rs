use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "domains")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::data_model::Entity")]
    DataModel,
    #[sea_orm(has_many = "super::shared_attribute::Entity")]
    SharedAttribute,
    #[sea_orm(has_many = "super::indicator::Entity")]
    Indicator,
}

impl Related<super::data_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DataModel.def()
    }
}

impl Related<super::shared_attribute::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SharedAttribute.def()
    }
}

impl Related<super::indicator::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Indicator.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
