use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SharedAttributes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SharedAttributes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SharedAttributes::DomainId).integer().not_null())
                    .col(ColumnDef::new(SharedAttributes::Name).string().not_null())
                    .col(ColumnDef::new(SharedAttributes::AttrType).string().not_null())
                    .col(ColumnDef::new(SharedAttributes::Length).string().null())
                    .col(ColumnDef::new(SharedAttributes::Precision).string().null())
                    .col(ColumnDef::new(SharedAttributes::Description).text().null())
                    .col(ColumnDef::new(SharedAttributes::ValueRange).string().null())
                    .col(
                        ColumnDef::new(SharedAttributes::ReferenceCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shared_attributes_domain")
                            .from(SharedAttributes::Table, SharedAttributes::DomainId)
                            .to(Domains::Table, Domains::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Indicators::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Indicators::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Indicators::DomainId).integer().not_null())
                    .col(ColumnDef::new(Indicators::Name).string().not_null())
                    .col(
                        ColumnDef::new(Indicators::Expression)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Indicators::ReturnType)
                            .string()
                            .not_null()
                            .default("number"),
                    )
                    .col(ColumnDef::new(Indicators::Unit).string().null())
                    .col(ColumnDef::new(Indicators::Description).text().null())
                    .col(
                        ColumnDef::new(Indicators::Status)
                            .string()
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(Indicators::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Indicators::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_indicators_domain")
                            .from(Indicators::Table, Indicators::DomainId)
                            .to(Domains::Table, Domains::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Indicators::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SharedAttributes::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SharedAttributes {
    Table,
    Id,
    DomainId,
    Name,
    AttrType,
    Length,
    Precision,
    Description,
    ValueRange,
    ReferenceCount,
}

#[derive(Iden)]
enum Indicators {
    Table,
    Id,
    DomainId,
    Name,
    Expression,
    ReturnType,
    Unit,
    Description,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Domains {
    Table,
    Id,
}
