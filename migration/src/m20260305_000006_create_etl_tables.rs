use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EtlTasks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EtlTasks::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EtlTasks::Name).string().not_null())
                    .col(ColumnDef::new(EtlTasks::Description).text().null())
                    .col(
                        ColumnDef::new(EtlTasks::SourceDatasourceId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EtlTasks::TargetModelId).integer().not_null())
                    .col(
                        ColumnDef::new(EtlTasks::Status)
                            .string()
                            .not_null()
                            .default("inactive"),
                    )
                    .col(ColumnDef::new(EtlTasks::Schedule).string().null())
                    .col(
                        ColumnDef::new(EtlTasks::Config)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(ColumnDef::new(EtlTasks::LastRun).timestamp().null())
                    .col(ColumnDef::new(EtlTasks::NextRun).timestamp().null())
                    .col(
                        ColumnDef::new(EtlTasks::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EtlTasks::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_etl_tasks_datasource")
                            .from(EtlTasks::Table, EtlTasks::SourceDatasourceId)
                            .to(Datasources::Table, Datasources::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_etl_tasks_model")
                            .from(EtlTasks::Table, EtlTasks::TargetModelId)
                            .to(Models::Table, Models::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EtlLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EtlLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EtlLogs::TaskId).integer().not_null())
                    .col(ColumnDef::new(EtlLogs::RunId).string().not_null())
                    .col(ColumnDef::new(EtlLogs::Status).string().not_null())
                    .col(ColumnDef::new(EtlLogs::StartTime).timestamp().not_null())
                    .col(ColumnDef::new(EtlLogs::EndTime).timestamp().null())
                    .col(
                        ColumnDef::new(EtlLogs::RecordsProcessed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EtlLogs::RecordsSuccess)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EtlLogs::RecordsFailed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(EtlLogs::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(EtlLogs::Details)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_etl_logs_task")
                            .from(EtlLogs::Table, EtlLogs::TaskId)
                            .to(EtlTasks::Table, EtlTasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_etl_logs_task")
                    .table(EtlLogs::Table)
                    .col(EtlLogs::TaskId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EtlLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EtlTasks::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum EtlTasks {
    Table,
    Id,
    Name,
    Description,
    SourceDatasourceId,
    TargetModelId,
    Status,
    Schedule,
    Config,
    LastRun,
    NextRun,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum EtlLogs {
    Table,
    Id,
    TaskId,
    RunId,
    Status,
    StartTime,
    EndTime,
    RecordsProcessed,
    RecordsSuccess,
    RecordsFailed,
    ErrorMessage,
    Details,
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
