use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Datasources::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Datasources::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Datasources::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Datasources::DsType).string().not_null())
                    .col(ColumnDef::new(Datasources::Url).text().not_null())
                    .col(ColumnDef::new(Datasources::Username).string().null())
                    .col(
                        ColumnDef::new(Datasources::SecureConfig)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Datasources::TableName).string().null())
                    .col(ColumnDef::new(Datasources::Description).text().null())
                    .col(
                        ColumnDef::new(Datasources::Status)
                            .string()
                            .not_null()
                            .default("inactive"),
                    )
                    .col(ColumnDef::new(Datasources::ModelId).integer().null())
                    .col(ColumnDef::new(Datasources::DomainId).integer().null())
                    .col(
                        ColumnDef::new(Datasources::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Datasources::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_datasources_model")
                            .from(Datasources::Table, Datasources::ModelId)
                            .to(Models::Table, Models::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_datasources_domain")
                            .from(Datasources::Table, Datasources::DomainId)
                            .to(Domains::Table, Domains::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Datasources::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Datasources {
    Table,
    Id,
    Name,
    DsType,
    Url,
    Username,
    SecureConfig,
    TableName,
    Description,
    Status,
    ModelId,
    DomainId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Models {
    Table,
    Id,
}

#[derive(Iden)]
enum Domains {
    Table,
    Id,
}
