use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "datasources")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub ds_type: String,
    /// Connection URL or file path, never containing the password.
    pub url: String,
    pub username: Option<String>,
    /// AES-256-GCM encrypted base64: secret params (password)
    pub secure_config: String,
    pub table_name: Option<String>,
    pub description: Option<String>,
    /// active | inactive
    pub status: String,
    pub model_id: Option<i32>,
    pub domain_id: Option<i32>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::mapping::Entity")]
    Mapping,
    #[sea_orm(has_many = "super::model_table_association::Entity")]
    ModelTableAssociation,
}

impl Related<super::mapping::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Mapping.def()
    }
}

impl Related<super::model_table_association::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ModelTableAssociation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
