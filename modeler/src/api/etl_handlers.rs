use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        Json,
        sse::{Event, KeepAlive, Sse},
    },
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::entity::{data_model, data_source, etl_log, etl_task};
use crate::etl::definition::TableDefinition;
use crate::etl::job::RunEvent;
use crate::etl::runner::{self, run_etl_job};
use crate::etl::{TaskAction, TaskConfig, TaskStatus, transition};

use super::{
    ApiErr, ApiState,
    dto::{
        CreateTaskRequest, ExecuteResponse, GenerateTableDefinitionRequest, ListLogsQuery,
        LogResponse, RunStatusResponse, TaskResponse, UpdateTaskRequest,
    },
    model_handlers::{find_model, table_definition_for},
    require,
};

// ---------- helpers ----------

async fn find_task(state: &ApiState, id: i32) -> Result<etl_task::Model, ApiErr> {
    etl_task::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("ETL task not found"))
}

async fn task_response(state: &ApiState, task: etl_task::Model) -> TaskResponse {
    let active = state
        .runs
        .lock()
        .await
        .active_for_task(task.id)
        .map(|r| r.id.clone());
    TaskResponse::new(task, active)
}

/// Validate a config payload and return its stored text.
fn config_text(config: Option<serde_json::Value>) -> Result<String, ApiErr> {
    let text = match config {
        Some(serde_json::Value::Null) | None => "{}".to_string(),
        Some(v) => serde_json::to_string(&v).map_err(ApiErr::internal)?,
    };
    TaskConfig::parse(&text)?;
    Ok(text)
}

async fn check_refs(
    state: &ApiState,
    datasource_id: Option<i32>,
    model_id: Option<i32>,
) -> Result<(), ApiErr> {
    if let Some(id) = datasource_id {
        data_source::Entity::find_by_id(id)
            .one(&state.db)
            .await
            .map_err(ApiErr::internal)?
            .ok_or_else(|| ApiErr::bad_request(format!("Data source {id} does not exist")))?;
    }
    if let Some(id) = model_id {
        data_model::Entity::find_by_id(id)
            .one(&state.db)
            .await
            .map_err(ApiErr::internal)?
            .ok_or_else(|| ApiErr::bad_request(format!("Model {id} does not exist")))?;
    }
    Ok(())
}

fn reject_running(task: &etl_task::Model) -> Result<(), ApiErr> {
    if task.status == TaskStatus::Running.as_str() {
        Err(ApiErr::conflict("Task is running"))
    } else {
        Ok(())
    }
}

async fn apply_action(
    state: &ApiState,
    id: i32,
    action: TaskAction,
) -> Result<Json<TaskResponse>, ApiErr> {
    let task = find_task(state, id).await?;
    let current = TaskStatus::parse(&task.status).unwrap_or(TaskStatus::Inactive);
    let next = transition(current, action)?;

    let mut active: etl_task::ActiveModel = task.into();
    active.status = Set(next.as_str().to_string());
    active.updated_at = Set(Utc::now().naive_utc());
    let updated = active.update(&state.db).await.map_err(ApiErr::internal)?;

    tracing::info!(
        task_id = id,
        from = current.as_str(),
        to = next.as_str(),
        "ETL task status changed"
    );
    Ok(Json(task_response(state, updated).await))
}

// ---------- GET /etl/tasks ----------

pub async fn list_tasks(State(state): State<ApiState>) -> Result<Json<Vec<TaskResponse>>, ApiErr> {
    let tasks = etl_task::Entity::find()
        .order_by_asc(etl_task::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;

    let store = state.runs.lock().await;
    let items = tasks
        .into_iter()
        .map(|t| {
            let active = store.active_for_task(t.id).map(|r| r.id.clone());
            TaskResponse::new(t, active)
        })
        .collect();
    Ok(Json(items))
}

// ---------- POST /etl/tasks ----------

pub async fn create_task(
    State(state): State<ApiState>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiErr> {
    require(&body.name, "name")?;
    let datasource_id = body
        .source_datasource_id
        .ok_or_else(|| ApiErr::bad_request("sourceDatasourceId is required"))?;
    let model_id = body
        .target_model_id
        .ok_or_else(|| ApiErr::bad_request("targetModelId is required"))?;
    check_refs(&state, Some(datasource_id), Some(model_id)).await?;
    let config = config_text(body.config)?;

    let now = Utc::now().naive_utc();
    let task = etl_task::ActiveModel {
        name: Set(body.name.trim().to_string()),
        description: Set(body.description),
        source_datasource_id: Set(datasource_id),
        target_model_id: Set(model_id),
        status: Set(TaskStatus::Inactive.as_str().to_string()),
        schedule: Set(body.schedule),
        config: Set(config),
        last_run: Set(None),
        next_run: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(ApiErr::internal)?;

    tracing::info!(task_id = task.id, name = %task.name, "ETL task created");
    Ok((StatusCode::CREATED, Json(TaskResponse::new(task, None))))
}

// ---------- GET /etl/tasks/{id} ----------

pub async fn get_task(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<TaskResponse>, ApiErr> {
    let task = find_task(&state, id).await?;
    Ok(Json(task_response(&state, task).await))
}

// ---------- PUT /etl/tasks/{id} ----------

pub async fn update_task(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, ApiErr> {
    let task = find_task(&state, id).await?;
    reject_running(&task)?;
    check_refs(&state, body.source_datasource_id, body.target_model_id).await?;

    let mut active: etl_task::ActiveModel = task.into();
    if let Some(name) = body.name {
        require(&name, "name")?;
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = body.description {
        active.description = Set(Some(description));
    }
    if let Some(ds) = body.source_datasource_id {
        active.source_datasource_id = Set(ds);
    }
    if let Some(model_id) = body.target_model_id {
        active.target_model_id = Set(model_id);
    }
    if let Some(schedule) = body.schedule {
        active.schedule = Set(Some(schedule).filter(|s| !s.trim().is_empty()));
    }
    if body.config.is_some() {
        active.config = Set(config_text(body.config)?);
    }
    if body.next_run.is_some() {
        active.next_run = Set(body.next_run);
    }
    active.updated_at = Set(Utc::now().naive_utc());

    let updated = active.update(&state.db).await.map_err(ApiErr::internal)?;
    Ok(Json(TaskResponse::new(updated, None)))
}

// ---------- DELETE /etl/tasks/{id} ----------

pub async fn delete_task(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiErr> {
    let task = find_task(&state, id).await?;
    reject_running(&task)?;

    // logs cascade
    let active: etl_task::ActiveModel = task.into();
    active.delete(&state.db).await.map_err(ApiErr::internal)?;

    tracing::info!(task_id = id, "ETL task deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------- status transitions ----------

pub async fn toggle_task(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<TaskResponse>, ApiErr> {
    apply_action(&state, id, TaskAction::Toggle).await
}

pub async fn activate_task(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<TaskResponse>, ApiErr> {
    apply_action(&state, id, TaskAction::Activate).await
}

pub async fn pause_task(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<TaskResponse>, ApiErr> {
    apply_action(&state, id, TaskAction::Pause).await
}

// ---------- POST /etl/tasks/{id}/execute ----------

pub async fn execute_task(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<(StatusCode, Json<ExecuteResponse>), ApiErr> {
    let ctx = state.etl_context();
    let started = runner::start_run(&ctx, id).await?;
    let response = ExecuteResponse {
        run_id: started.run_id.clone(),
        log_id: started.log_id,
        task_id: id,
    };

    tokio::spawn(async move {
        run_etl_job(&ctx, started).await;
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

// ---------- GET /etl/tasks/{id}/runs/{run_id} (poll status) ----------

/// Live runs are answered from memory; older ones from their log row.
pub async fn run_status(
    State(state): State<ApiState>,
    Path((id, run_id)): Path<(i32, String)>,
) -> Result<Json<RunStatusResponse>, ApiErr> {
    let live = {
        let store = state.runs.lock().await;
        store
            .get(&run_id)
            .filter(|r| r.task_id == id)
            .map(|r| (r.status.as_str().to_string(), r.result.clone(), r.error.clone()))
    };

    let log = etl_log::Entity::find()
        .filter(etl_log::Column::RunId.eq(run_id.as_str()))
        .filter(etl_log::Column::TaskId.eq(id))
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?;

    match (live, log) {
        (Some((status, result, error)), log) => {
            // the log row is finalized before the in-memory run
            let status = match &log {
                Some(l) if l.status != "running" => l.status.clone(),
                _ => status,
            };
            Ok(Json(RunStatusResponse {
                run_id,
                task_id: id,
                status,
                result,
                error,
                log: log.map(LogResponse::from),
            }))
        }
        (None, Some(log)) => Ok(Json(RunStatusResponse {
            run_id,
            task_id: id,
            status: log.status.clone(),
            result: None,
            error: log.error_message.clone(),
            log: Some(log.into()),
        })),
        (None, None) => Err(ApiErr::not_found("Run not found")),
    }
}

// ---------- DELETE /etl/tasks/{id}/runs/{run_id} (cancel) ----------

pub async fn cancel_run(
    State(state): State<ApiState>,
    Path((id, run_id)): Path<(i32, String)>,
) -> Result<StatusCode, ApiErr> {
    let mut store = state.runs.lock().await;
    let owned = store.get(&run_id).is_some_and(|r| r.task_id == id);
    if owned && store.cancel(&run_id) {
        tracing::info!(task_id = id, run_id = %run_id, "ETL run cancellation requested");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiErr::not_found("Run not found or not running"))
    }
}

// ---------- GET /etl/tasks/{id}/runs/{run_id}/events (SSE stream) ----------

pub async fn run_events(
    State(state): State<ApiState>,
    Path((id, run_id)): Path<(i32, String)>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiErr> {
    // subscribe under the lock: a run still running here sends its terminal
    // events only after this receiver exists
    let events: Pin<Box<dyn tokio_stream::Stream<Item = RunEvent> + Send>> = {
        let store = state.runs.lock().await;
        match store.get(&run_id) {
            Some(run) if run.task_id == id => match run.final_events() {
                Some(events) => Box::pin(tokio_stream::iter(events)),
                None => {
                    // lagged receivers skip what they missed
                    let live = BroadcastStream::new(run.tx.subscribe()).filter_map(Result::ok);
                    Box::pin(live)
                }
            },
            _ => return Err(ApiErr::not_found("Run not found")),
        }
    };

    let mut finished = false;
    let stream = events
        .map_while(move |event| {
            if finished {
                return None;
            }
            finished = matches!(event, RunEvent::Done);
            Some(event)
        })
        .filter_map(|event| event.to_sse_event().ok().map(Ok));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

// ---------- GET /etl/logs ----------

pub async fn list_logs(
    State(state): State<ApiState>,
    Query(params): Query<ListLogsQuery>,
) -> Result<Json<Vec<LogResponse>>, ApiErr> {
    let mut query = etl_log::Entity::find();
    if let Some(task_id) = params.task_id {
        query = query.filter(etl_log::Column::TaskId.eq(task_id));
    }
    let logs = query
        .order_by_desc(etl_log::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    Ok(Json(logs.into_iter().map(LogResponse::from).collect()))
}

// ---------- POST /etl/generate-table-definition ----------

pub async fn generate_table_definition(
    State(state): State<ApiState>,
    Json(body): Json<GenerateTableDefinitionRequest>,
) -> Result<Json<TableDefinition>, ApiErr> {
    let model_id = body
        .model_id
        .ok_or_else(|| ApiErr::bad_request("modelId is required"))?;
    let model = find_model(&state, model_id).await?;
    Ok(Json(table_definition_for(&state, &model).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{create, send, state};
    use axum::http::Method;
    use serde_json::json;

    /// A duckdb source with `t_station`, a model with two properties and a
    /// task mapping both columns.
    async fn task_fixture(state: &ApiState, dir: &tempfile::TempDir) -> serde_json::Value {
        let path = dir.path().join("source.duckdb");
        {
            let conn = duckdb::Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE t_station (station_id INTEGER, station_name VARCHAR);
                 INSERT INTO t_station VALUES (1, 'North Gate'), (2, 'South Gate');",
            )
            .unwrap();
        }
        let ds = create(
            state,
            "/api/datasource",
            json!({"name": "stations", "type": "duckdb", "url": path.to_str().unwrap()}),
        )
        .await["id"]
            .clone();
        let model = create(state, "/api/model", json!({"name": "Toll Station", "code": "toll_station"})).await["id"].clone();
        create(
            state,
            "/api/property",
            json!({"modelId": model, "name": "Station ID", "type": "int", "required": true, "isPrimaryKey": true}),
        )
        .await;
        create(state, "/api/property", json!({"modelId": model, "name": "Station Name"})).await;

        create(
            state,
            "/api/etl/tasks",
            json!({
                "name": "load stations",
                "sourceDatasourceId": ds,
                "targetModelId": model,
                "schedule": "0 0 * * *",
                "config": {
                    "source": {"tableName": "t_station"},
                    "fieldMappings": {"station_id": "Station ID", "station_name": "Station Name"}
                }
            }),
        )
        .await
    }

    async fn wait_for_log(state: &ApiState, task_id: &serde_json::Value) -> serde_json::Value {
        for _ in 0..200 {
            let (_, logs) =
                send(state, Method::GET, &format!("/api/etl/logs?taskId={task_id}"), None).await;
            if let Some(log) = logs.as_array().and_then(|l| l.first())
                && log["status"] != "running"
            {
                return log.clone();
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("run did not finish");
    }

    #[tokio::test]
    async fn test_task_state_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let task = task_fixture(&state, &dir).await;
        let id = task["id"].clone();
        assert_eq!(task["status"], "inactive");
        assert_eq!(task["schedule"], "0 0 * * *");
        assert_eq!(task["config"]["source"]["tableName"], "t_station");

        let (status, body) = send(&state, Method::POST, &format!("/api/etl/tasks/{id}/pause"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Cannot pause a task that is inactive");

        let (_, body) = send(&state, Method::PUT, &format!("/api/etl/tasks/{id}/toggle"), None).await;
        assert_eq!(body["status"], "active");
        let (_, body) = send(&state, Method::POST, &format!("/api/etl/tasks/{id}/pause"), None).await;
        assert_eq!(body["status"], "paused");

        let (status, body) =
            send(&state, Method::POST, &format!("/api/etl/tasks/{id}/execute"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Task is paused");

        let (status, _) = send(&state, Method::PUT, &format!("/api/etl/tasks/{id}/toggle"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (_, body) = send(&state, Method::POST, &format!("/api/etl/tasks/{id}/activate"), None).await;
        assert_eq!(body["status"], "active");
    }

    #[tokio::test]
    async fn test_create_task_validation() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/etl/tasks",
            Some(json!({"name": "t", "targetModelId": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "sourceDatasourceId is required");

        let task = task_fixture(&state, &dir).await;
        let (status, body) = send(
            &state,
            Method::PUT,
            &format!("/api/etl/tasks/{}", task["id"]),
            Some(json!({"config": {"batchSize": "lots"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid task configuration"));
    }

    #[tokio::test]
    async fn test_execute_writes_log_and_warehouse() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let task = task_fixture(&state, &dir).await;
        let id = task["id"].clone();

        let (status, body) =
            send(&state, Method::POST, &format!("/api/etl/tasks/{id}/execute"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let run_id = body["runId"].as_str().unwrap().to_string();

        let log = wait_for_log(&state, &id).await;
        assert_eq!(log["status"], "success");
        assert_eq!(log["runId"], run_id.as_str());
        assert_eq!(log["recordsProcessed"], 2);
        assert_eq!(log["recordsSuccess"], 2);
        assert_eq!(log["details"]["targetTable"], "toll_station");

        let (status, body) = send(
            &state,
            Method::GET,
            &format!("/api/etl/tasks/{id}/runs/{run_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["log"]["recordsSuccess"], 2);

        let (_, body) = send(&state, Method::GET, &format!("/api/etl/tasks/{id}"), None).await;
        assert_eq!(body["status"], "active");
        assert!(body["lastRun"].is_string());

        let rows = state.warehouse.preview("toll_station", 10).await.unwrap();
        assert_eq!(rows.len(), 2);

        // finished runs cannot be cancelled
        let (status, _) = send(
            &state,
            Method::DELETE,
            &format!("/api/etl/tasks/{id}/runs/{run_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failed_run_sets_task_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let task = task_fixture(&state, &dir).await;
        let id = task["id"].clone();

        send(
            &state,
            Method::PUT,
            &format!("/api/etl/tasks/{id}"),
            Some(json!({"config": {"source": {"tableName": "t_station"}, "fieldMappings": {"station_id": "Nope"}}})),
        )
        .await;
        let (status, _) =
            send(&state, Method::POST, &format!("/api/etl/tasks/{id}/execute"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let log = wait_for_log(&state, &id).await;
        assert_eq!(log["status"], "failed");
        assert!(log["errorMessage"].as_str().unwrap().contains("Nope"));

        let (_, body) = send(&state, Method::GET, &format!("/api/etl/tasks/{id}"), None).await;
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_events_for_finished_run_end_with_done() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let task = task_fixture(&state, &dir).await;
        let id = task["id"].clone();
        let (_, body) = send(&state, Method::POST, &format!("/api/etl/tasks/{id}/execute"), None).await;
        let run_id = body["runId"].as_str().unwrap().to_string();
        wait_for_log(&state, &id).await;

        let res = crate::api::api_router(state.clone())
            .oneshot(
                Request::builder()
                    .uri(format!("/api/etl/tasks/{id}/runs/{run_id}/events"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = tokio::time::timeout(
            Duration::from_secs(5),
            axum::body::to_bytes(res.into_body(), usize::MAX),
        )
        .await
        .expect("event stream should close after done")
        .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains(r#""type":"result""#), "{text}");
        assert!(text.trim_end().ends_with(r#"data: {"type":"done"}"#), "{text}");
    }

    #[tokio::test]
    async fn test_unknown_runs_and_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let (status, _) = send(&state, Method::POST, "/api/etl/tasks/42/execute", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&state, Method::GET, "/api/etl/tasks/1/runs/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&state, Method::GET, "/api/etl/tasks/1/runs/nope/events", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&state, Method::DELETE, "/api/etl/tasks/1/runs/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_running_task_cannot_be_edited_or_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let task = task_fixture(&state, &dir).await;
        let id = task["id"].as_i64().unwrap() as i32;

        // claim the task without running it
        let started = runner::start_run(&state.etl_context(), id).await.unwrap();

        let (_, body) = send(&state, Method::GET, &format!("/api/etl/tasks/{id}"), None).await;
        assert_eq!(body["status"], "running");
        assert_eq!(body["activeRunId"], started.run_id.as_str());

        let (status, _) = send(&state, Method::DELETE, &format!("/api/etl/tasks/{id}"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = send(
            &state,
            Method::PUT,
            &format!("/api/etl/tasks/{id}"),
            Some(json!({"name": "renamed"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, body) =
            send(&state, Method::POST, &format!("/api/etl/tasks/{id}/execute"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Task is already running");

        let (status, _) = send(
            &state,
            Method::DELETE,
            &format!("/api/etl/tasks/{id}/runs/{}", started.run_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(started.cancel.is_cancelled());

        let ctx = state.etl_context();
        run_etl_job(&ctx, started).await;
        let log = wait_for_log(&state, &json!(id)).await;
        assert_eq!(log["status"], "cancelled");
    }

    #[tokio::test]
    async fn test_generate_table_definition() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let task = task_fixture(&state, &dir).await;

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/etl/generate-table-definition",
            Some(json!({"modelId": task["targetModelId"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tableName"], "toll_station");
        assert_eq!(body["columns"].as_array().unwrap().len(), 2);

        let (status, _) = send(
            &state,
            Method::POST,
            "/api/etl/generate-table-definition",
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
