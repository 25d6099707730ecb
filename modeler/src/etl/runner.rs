use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

use super::definition::{TableDefinition, generate_table_definition};
use super::job::{EtlRun, RunEvent, RunStore, progress};
use super::transform::{FieldBinding, TargetKind, transform_row};
use super::{EtlError, TaskConfig, TaskStatus, check_executable};
use crate::connector::{DatasourceKind, SourceConfig, create_connector};
use crate::entity::{
    data_model, data_source, etl_log, etl_task, mapping, model_table_association, property,
};
use crate::warehouse::{Warehouse, WarehouseError};

/// Coercion errors kept in the log details.
const MAX_SAMPLE_ERRORS: usize = 10;

/// Everything a run needs, independent of HTTP.
#[derive(Clone)]
pub struct EtlContext {
    pub db: DatabaseConnection,
    pub master_key: [u8; 32],
    pub warehouse: Warehouse,
    pub runs: Arc<Mutex<RunStore>>,
    pub batch_size: usize,
}

pub struct StartedRun {
    pub run_id: String,
    pub log_id: i32,
    pub task: etl_task::Model,
    pub tx: broadcast::Sender<RunEvent>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub records_processed: i64,
    pub records_success: i64,
    pub records_failed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    pub skipped_fields: Vec<String>,
    pub errors: Vec<String>,
}

// ---------- start ----------

/// Claim the task for a new run: status → running, a `running` log row is
/// written. Fails with a conflict when the task is paused or already running.
pub async fn start_run(ctx: &EtlContext, task_id: i32) -> Result<StartedRun, EtlError> {
    let task = etl_task::Entity::find_by_id(task_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| EtlError::NotFound(format!("ETL task {task_id} not found")))?;

    check_executable(TaskStatus::parse(&task.status).unwrap_or(TaskStatus::Inactive))?;

    let run = EtlRun::new(task_id);
    let run_id = run.id.clone();
    let tx = run.tx.clone();
    let cancel = run.cancel.clone();
    {
        let mut store = ctx.runs.lock().await;
        store.try_register(run).map_err(|existing_id| {
            EtlError::Conflict(format!("Task is already running (run_id: {existing_id})"))
        })?;
    }

    match claim_task(ctx, &task, &run_id).await {
        Ok((task, log_id)) => {
            tracing::info!(task_id, run_id = %run_id, log_id, "ETL run started");
            Ok(StartedRun {
                run_id,
                log_id,
                task,
                tx,
                cancel,
            })
        }
        Err(e) => {
            ctx.runs.lock().await.fail(&run_id, e.to_string());
            Err(e)
        }
    }
}

/// Flip the task to `running` only if it is still in an executable status, so
/// a second process racing on the same task row gets a conflict.
async fn claim_task(
    ctx: &EtlContext,
    task: &etl_task::Model,
    run_id: &str,
) -> Result<(etl_task::Model, i32), EtlError> {
    let now = Utc::now().naive_utc();
    let claimed = etl_task::Entity::update_many()
        .col_expr(etl_task::Column::Status, Expr::value(TaskStatus::Running.as_str()))
        .col_expr(etl_task::Column::LastRun, Expr::value(now))
        .col_expr(etl_task::Column::UpdatedAt, Expr::value(now))
        .filter(etl_task::Column::Id.eq(task.id))
        .filter(etl_task::Column::Status.is_not_in([
            TaskStatus::Running.as_str(),
            TaskStatus::Paused.as_str(),
        ]))
        .exec(&ctx.db)
        .await?;
    if claimed.rows_affected != 1 {
        return Err(EtlError::Conflict(
            "Task is already running or paused".to_string(),
        ));
    }
    let task = etl_task::Entity::find_by_id(task.id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| EtlError::NotFound(format!("ETL task {} not found", task.id)))?;

    let log = etl_log::ActiveModel {
        task_id: Set(task.id),
        run_id: Set(run_id.to_string()),
        status: Set("running".to_string()),
        start_time: Set(now),
        end_time: Set(None),
        records_processed: Set(0),
        records_success: Set(0),
        records_failed: Set(0),
        error_message: Set(None),
        details: Set("{}".to_string()),
        ..Default::default()
    }
    .insert(&ctx.db)
    .await?;

    Ok((task, log.id))
}

// ---------- run ----------

/// Execute a started run and record its outcome in the log row, the task
/// status, the run store and the event stream.
pub async fn run_etl_job(ctx: &EtlContext, started: StartedRun) {
    let StartedRun {
        run_id,
        log_id,
        task,
        tx,
        cancel,
    } = started;
    let send = |event: RunEvent| {
        let _ = tx.send(event);
    };

    let mut stats = RunStats::default();
    let result = run_inner(ctx, &task, &mut stats, &tx, &cancel).await;

    let (log_status, task_status, error_message) = match &result {
        Ok(()) => ("success", TaskStatus::Active, None),
        Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
            ("cancelled", TaskStatus::Active, Some("cancelled".to_string()))
        }
        Err(e) => ("failed", TaskStatus::Error, Some(e.to_string())),
    };

    if let Err(e) = finish_run(
        ctx,
        &task,
        log_id,
        log_status,
        task_status,
        &stats,
        error_message,
    )
    .await
    {
        tracing::error!(
            task_id = task.id,
            run_id = %run_id,
            error = %e,
            "failed to record ETL run outcome"
        );
    }

    let data = serde_json::json!({
        "runId": run_id,
        "logId": log_id,
        "taskId": task.id,
        "status": log_status,
        "stats": stats,
    });

    match result {
        Ok(()) => {
            tracing::info!(
                task_id = task.id,
                run_id = %run_id,
                processed = stats.records_processed,
                success = stats.records_success,
                failed = stats.records_failed,
                "ETL run succeeded"
            );
            ctx.runs.lock().await.complete(&run_id, data.clone());
            send(RunEvent::Result { data });
            send(RunEvent::Done);
        }
        Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
            tracing::info!(task_id = task.id, run_id = %run_id, "ETL run cancelled");
            ctx.runs.lock().await.mark_cancelled(&run_id);
            send(RunEvent::Cancelled);
            send(RunEvent::Done);
        }
        Err(e) => {
            let msg = e.to_string();
            tracing::warn!(task_id = task.id, run_id = %run_id, error = %msg, "ETL run failed");
            ctx.runs.lock().await.fail(&run_id, msg.clone());
            send(RunEvent::Error { message: msg });
            send(RunEvent::Done);
        }
    }
}

async fn finish_run(
    ctx: &EtlContext,
    task: &etl_task::Model,
    log_id: i32,
    log_status: &str,
    task_status: TaskStatus,
    stats: &RunStats,
    error_message: Option<String>,
) -> Result<(), EtlError> {
    let now = Utc::now().naive_utc();
    // task first: a finished log row implies the task status is final too
    etl_task::ActiveModel {
        id: Set(task.id),
        status: Set(task_status.as_str().to_string()),
        updated_at: Set(now),
        ..Default::default()
    }
    .update(&ctx.db)
    .await?;

    etl_log::ActiveModel {
        id: Set(log_id),
        status: Set(log_status.to_string()),
        end_time: Set(Some(now)),
        records_processed: Set(stats.records_processed),
        records_success: Set(stats.records_success),
        records_failed: Set(stats.records_failed),
        error_message: Set(error_message),
        details: Set(serde_json::to_string(stats)?),
        ..Default::default()
    }
    .update(&ctx.db)
    .await?;

    Ok(())
}

async fn run_inner(
    ctx: &EtlContext,
    task: &etl_task::Model,
    stats: &mut RunStats,
    tx: &broadcast::Sender<RunEvent>,
    cancel: &CancellationToken,
) -> Result<(), EtlError> {
    let send = |event: RunEvent| {
        let _ = tx.send(event);
    };
    let check_cancel = || {
        if cancel.is_cancelled() {
            Err(EtlError::Cancelled)
        } else {
            Ok(())
        }
    };

    let config = TaskConfig::parse(&task.config)?;

    send(progress("resolving", "Resolving model and field mappings…"));
    let model = data_model::Entity::find_by_id(task.target_model_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| {
            EtlError::NotFound(format!("Target model {} not found", task.target_model_id))
        })?;
    let properties = property::Entity::find()
        .filter(property::Column::ModelId.eq(model.id))
        .order_by_asc(property::Column::Id)
        .all(&ctx.db)
        .await?;
    let source_ds = data_source::Entity::find_by_id(task.source_datasource_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| {
            EtlError::NotFound(format!(
                "Source datasource {} not found",
                task.source_datasource_id
            ))
        })?;

    let fields = resolve_fields(ctx, task, &config, &model, &properties).await?;
    let source_table = resolve_source_table(ctx, task, &config, &source_ds).await?;
    stats.source_table = Some(source_table.clone());
    check_cancel()?;

    send(progress("connecting", format!("Connecting to {}…", source_ds.name)));
    let connector = create_connector(SourceConfig::from_model(&source_ds, &ctx.master_key)?)?;
    let actual_columns: Vec<String> = match connector.describe_table(&source_table).await {
        Ok(cols) if !cols.is_empty() => cols.into_iter().map(|c| c.name).collect(),
        result => {
            if config.source.schema.is_empty() {
                return Err(match result {
                    Err(e) => e.into(),
                    Ok(_) => EtlError::NoValidFields {
                        table: source_table,
                    },
                });
            }
            tracing::warn!(
                task_id = task.id,
                table = %source_table,
                "source introspection failed, using configured schema"
            );
            config.source.schema.iter().map(|f| f.name.clone()).collect()
        }
    };

    let mut bindings: Vec<FieldBinding> = Vec::new();
    for (source_column, prop) in fields {
        let Some(actual) = actual_columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(&source_column))
        else {
            stats.skipped_fields.push(source_column);
            continue;
        };
        bindings.push(FieldBinding {
            source_column: actual.clone(),
            target_column: prop.column_name(),
            property_id: prop.id,
            kind: TargetKind::from_prop_type(&prop.prop_type),
            required: prop.required,
        });
    }
    if !stats.skipped_fields.is_empty() {
        tracing::warn!(task_id = task.id, skipped = ?stats.skipped_fields, "fields missing from source table");
    }
    if bindings.is_empty() {
        return Err(EtlError::NoValidFields {
            table: source_table,
        });
    }
    check_cancel()?;

    // the connector returns the full selection; batches pace the transform
    // and release raw source rows as they are converted
    send(progress("reading", format!("Reading {source_table}…")));
    let columns: Vec<String> = bindings.iter().map(|b| b.source_column.clone()).collect();
    let rows = connector.fetch(&source_table, &columns, cancel).await?;
    let total = rows.len();
    tracing::info!(task_id = task.id, rows = total, table = %source_table, "source rows fetched");

    let batch_size = config.batch_size.unwrap_or(ctx.batch_size).max(1);
    let mut staged = Vec::with_capacity(total);
    let mut remaining = rows.into_iter();
    loop {
        let chunk: Vec<_> = remaining.by_ref().take(batch_size).collect();
        if chunk.is_empty() {
            break;
        }
        check_cancel()?;
        for row in chunk {
            stats.records_processed += 1;
            match transform_row(&row, &bindings) {
                Ok(values) => staged.push(values),
                Err(e) => {
                    stats.records_failed += 1;
                    if stats.errors.len() < MAX_SAMPLE_ERRORS {
                        stats.errors.push(format!("row {}: {e}", stats.records_processed));
                    }
                }
            }
        }
        send(progress(
            "transforming",
            format!("{}/{total} rows", stats.records_processed),
        ));
    }

    let mut definition = match &config.table_definition {
        Some(def) => def.clone(),
        None => generate_table_definition(&model, &properties),
    };
    if let Some(name) = config.target.table_name.as_deref().filter(|n| !n.trim().is_empty()) {
        definition.table_name = name.trim().to_string();
    }
    let projected = project_definition(&definition, &bindings)?;
    stats.target_table = Some(definition.table_name.clone());
    check_cancel()?;

    let warehouse = resolve_warehouse(ctx, &config).await?;
    stats.warehouse = Some(warehouse.path().display().to_string());
    send(progress(
        "loading",
        format!("Loading {} rows into {}…", staged.len(), definition.table_name),
    ));
    warehouse.ensure_table(&definition).await?;
    let written = warehouse.append_rows(&projected, staged).await?;
    stats.records_success = written as i64;

    Ok(())
}

// ---------- resolution helpers ----------

/// Source column → target property, from the task config or stored mappings.
async fn resolve_fields(
    ctx: &EtlContext,
    task: &etl_task::Model,
    config: &TaskConfig,
    model: &data_model::Model,
    properties: &[property::Model],
) -> Result<Vec<(String, property::Model)>, EtlError> {
    let mut fields: Vec<(String, property::Model)> = Vec::new();

    if !config.field_mappings.is_empty() {
        for (source_column, target) in &config.field_mappings {
            let prop = properties
                .iter()
                .find(|p| p.name == *target || p.code == *target)
                .ok_or_else(|| {
                    EtlError::Config(format!(
                        "Model {} has no property named {target}",
                        model.name
                    ))
                })?;
            fields.push((source_column.clone(), prop.clone()));
        }
    } else {
        let mappings = mapping::Entity::find()
            .filter(mapping::Column::DatasourceId.eq(task.source_datasource_id))
            .filter(mapping::Column::ModelId.eq(model.id))
            .order_by_asc(mapping::Column::Id)
            .all(&ctx.db)
            .await?;
        for m in mappings {
            let prop = properties
                .iter()
                .find(|p| p.id == m.property_id)
                .ok_or_else(|| {
                    EtlError::Config(format!(
                        "Mapping {} points at property {} outside model {}",
                        m.id, m.property_id, model.name
                    ))
                })?;
            fields.push((m.field_id, prop.clone()));
        }
    }

    if fields.is_empty() {
        return Err(EtlError::Config("No field mappings configured".to_string()));
    }
    for (i, (_, prop)) in fields.iter().enumerate() {
        if fields[..i].iter().any(|(_, p)| p.id == prop.id) {
            return Err(EtlError::Config(format!(
                "Property {} is mapped more than once",
                prop.name
            )));
        }
    }
    Ok(fields)
}

async fn resolve_source_table(
    ctx: &EtlContext,
    task: &etl_task::Model,
    config: &TaskConfig,
    source_ds: &data_source::Model,
) -> Result<String, EtlError> {
    let association = model_table_association::Entity::find()
        .filter(model_table_association::Column::ModelId.eq(task.target_model_id))
        .filter(model_table_association::Column::DatasourceId.eq(task.source_datasource_id))
        .filter(model_table_association::Column::Status.eq("active"))
        .order_by_asc(model_table_association::Column::Id)
        .one(&ctx.db)
        .await?;
    if let Some(a) = association {
        return Ok(a.table_name);
    }

    config
        .source
        .table_name
        .clone()
        .or_else(|| source_ds.table_name.clone())
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| EtlError::Config("No source table configured".to_string()))
}

/// The configured duckdb target datasource, or the default warehouse.
async fn resolve_warehouse(ctx: &EtlContext, config: &TaskConfig) -> Result<Warehouse, EtlError> {
    let Some(ds_id) = config.target.datasource_id else {
        return Ok(ctx.warehouse.clone());
    };
    let ds = data_source::Entity::find_by_id(ds_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| EtlError::NotFound(format!("Target datasource {ds_id} not found")))?;
    if DatasourceKind::parse(&ds.ds_type) != Some(DatasourceKind::DuckDb) {
        return Err(EtlError::Config(format!(
            "Target datasource {} is {}; only duckdb targets are supported",
            ds.name, ds.ds_type
        )));
    }
    let cfg = SourceConfig::from_model(&ds, &ctx.master_key)?;
    if std::path::Path::new(&cfg.path) == ctx.warehouse.path() {
        return Ok(ctx.warehouse.clone());
    }
    tokio::task::spawn_blocking(move || Warehouse::open(&cfg.path))
        .await
        .map_err(|e| WarehouseError::Join(e.to_string()))?
        .map_err(EtlError::from)
}

/// Restrict a definition to the mapped columns, in binding order.
fn project_definition(
    def: &TableDefinition,
    bindings: &[FieldBinding],
) -> Result<TableDefinition, EtlError> {
    let columns = bindings
        .iter()
        .map(|b| {
            def.columns
                .iter()
                .find(|c| c.property_id == Some(b.property_id) || c.name == b.target_column)
                .cloned()
                .ok_or_else(|| {
                    EtlError::Config(format!(
                        "Table {} has no column for {}",
                        def.table_name, b.target_column
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TableDefinition {
        table_name: def.table_name.clone(),
        columns,
    })
}

// ---------- entry points outside HTTP ----------

/// Run a task inline and return its final log row.
pub async fn run_to_completion(ctx: &EtlContext, task_id: i32) -> Result<etl_log::Model, EtlError> {
    let started = start_run(ctx, task_id).await?;
    let log_id = started.log_id;
    run_etl_job(ctx, started).await;
    etl_log::Entity::find_by_id(log_id)
        .one(&ctx.db)
        .await?
        .ok_or_else(|| EtlError::NotFound(format!("ETL log {log_id} not found")))
}

/// Runs do not survive a restart: tasks left `running` become `error` and
/// their `running` log rows become `failed`.
pub async fn recover_interrupted_runs(db: &DatabaseConnection) -> Result<(u64, u64), DbErr> {
    let now = Utc::now().naive_utc();
    let tasks = etl_task::Entity::update_many()
        .col_expr(etl_task::Column::Status, Expr::value(TaskStatus::Error.as_str()))
        .col_expr(etl_task::Column::UpdatedAt, Expr::value(now))
        .filter(etl_task::Column::Status.eq(TaskStatus::Running.as_str()))
        .exec(db)
        .await?;
    let logs = etl_log::Entity::update_many()
        .col_expr(etl_log::Column::Status, Expr::value("failed"))
        .col_expr(etl_log::Column::EndTime, Expr::value(now))
        .col_expr(
            etl_log::Column::ErrorMessage,
            Expr::value("interrupted by restart"),
        )
        .filter(etl_log::Column::Status.eq("running"))
        .exec(db)
        .await?;
    if tasks.rows_affected > 0 || logs.rows_affected > 0 {
        tracing::warn!(
            tasks = tasks.rows_affected,
            logs = logs.rows_affected,
            "marked interrupted ETL runs as failed"
        );
    }
    Ok((tasks.rows_affected, logs.rows_affected))
}
