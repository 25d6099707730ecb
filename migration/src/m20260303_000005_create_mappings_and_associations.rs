use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // mappings: source field -> target property, per (datasource, model)
        manager
            .create_table(
                Table::create()
                    .table(Mappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Mappings::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Mappings::DatasourceId).integer().not_null())
                    .col(ColumnDef::new(Mappings::ModelId).integer().not_null())
                    .col(ColumnDef::new(Mappings::FieldId).string().not_null())
                    .col(ColumnDef::new(Mappings::PropertyId).integer().not_null())
                    .col(
                        ColumnDef::new(Mappings::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Mappings::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mappings_datasource")
                            .from(Mappings::Table, Mappings::DatasourceId)
                            .to(Datasources::Table, Datasources::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mappings_model")
                            .from(Mappings::Table, Mappings::ModelId)
                            .to(Models::Table, Models::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mappings_property")
                            .from(Mappings::Table, Mappings::PropertyId)
                            .to(Properties::Table, Properties::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_mappings_ds_model_field")
                    .table(Mappings::Table)
                    .col(Mappings::DatasourceId)
                    .col(Mappings::ModelId)
                    .col(Mappings::FieldId)
                    .to_owned(),
            )
            .await?;

        // model_table_associations
        manager
            .create_table(
                Table::create()
                    .table(ModelTableAssociations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ModelTableAssociations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ModelTableAssociations::ModelId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ModelTableAssociations::DatasourceId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ModelTableAssociations::TableName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ModelTableAssociations::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(ModelTableAssociations::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ModelTableAssociations::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mta_model")
                            .from(ModelTableAssociations::Table, ModelTableAssociations::ModelId)
                            .to(Models::Table, Models::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mta_datasource")
                            .from(
                                ModelTableAssociations::Table,
                                ModelTableAssociations::DatasourceId,
                            )
                            .to(Datasources::Table, Datasources::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_mta_model_ds_table")
                    .table(ModelTableAssociations::Table)
                    .col(ModelTableAssociations::ModelId)
                    .col(ModelTableAssociations::DatasourceId)
                    .col(ModelTableAssociations::TableName)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ModelTableAssociations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Mappings::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Mappings {
    Table,
    Id,
    DatasourceId,
    ModelId,
    FieldId,
    PropertyId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ModelTableAssociations {
    Table,
    Id,
    ModelId,
    DatasourceId,
    TableName,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Datasources {
    Table,
    Id,
}

#[derive(Iden)]
enum Models {
    Table,
    Id,
}

#[derive(Iden)]
enum Properties {
    Table,
    Id,
}
