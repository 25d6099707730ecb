use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // properties
        manager
            .create_table(
                Table::create()
                    .table(Properties::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Properties::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Properties::ModelId).integer().not_null())
                    .col(ColumnDef::new(Properties::Name).string().not_null())
                    .col(ColumnDef::new(Properties::Code).string().not_null())
                    .col(ColumnDef::new(Properties::PropType).string().not_null())
                    .col(
                        ColumnDef::new(Properties::Required)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Properties::Description).text().null())
                    .col(
                        ColumnDef::new(Properties::IsPrimaryKey)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Properties::IsForeignKey)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Properties::DefaultValue).string().null())
                    .col(
                        ColumnDef::new(Properties::Constraints)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(Properties::SensitivityLevel).string().null())
                    .col(ColumnDef::new(Properties::MaskRule).string().null())
                    .col(ColumnDef::new(Properties::PhysicalColumn).string().null())
                    .col(ColumnDef::new(Properties::ForeignKeyTable).string().null())
                    .col(ColumnDef::new(Properties::ForeignKeyColumn).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_properties_model")
                            .from(Properties::Table, Properties::ModelId)
                            .to(Models::Table, Models::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_properties_model_code")
                    .table(Properties::Table)
                    .col(Properties::ModelId)
                    .col(Properties::Code)
                    .to_owned(),
            )
            .await?;

        // relations
        manager
            .create_table(
                Table::create()
                    .table(Relations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Relations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Relations::Name).string().not_null())
                    .col(ColumnDef::new(Relations::SourceModelId).integer().not_null())
                    .col(ColumnDef::new(Relations::TargetModelId).integer().not_null())
                    .col(
                        ColumnDef::new(Relations::RelationType)
                            .string()
                            .not_null()
                            .default("one-to-many"),
                    )
                    .col(ColumnDef::new(Relations::Description).text().null())
                    .col(
                        ColumnDef::new(Relations::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_relations_source")
                            .from(Relations::Table, Relations::SourceModelId)
                            .to(Models::Table, Models::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_relations_target")
                            .from(Relations::Table, Relations::TargetModelId)
                            .to(Models::Table, Models::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Relations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Properties::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Properties {
    Table,
    Id,
    ModelId,
    Name,
    Code,
    PropType,
    Required,
    Description,
    IsPrimaryKey,
    IsForeignKey,
    DefaultValue,
    Constraints,
    SensitivityLevel,
    MaskRule,
    PhysicalColumn,
    ForeignKeyTable,
    ForeignKeyColumn,
}

#[derive(Iden)]
enum Relations {
    Table,
    Id,
    Name,
    SourceModelId,
    TargetModelId,
    RelationType,
    Description,
    Enabled,
}

#[derive(Iden)]
enum Models {
    Table,
    Id,
}
