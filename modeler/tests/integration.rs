//! End-to-end flows through the REST router: modeling metadata, an ETL run
//! from a DuckDB source file and a masked preview of the loaded table.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use migration::{Migrator, MigratorTrait};
use modeler::api::{ApiState, api_router};
use modeler::warehouse::Warehouse;
use sea_orm::Database;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn app(dir: &tempfile::TempDir) -> ApiState {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    let warehouse = Warehouse::open(dir.path().join("warehouse.duckdb")).unwrap();
    ApiState::new(db, [7u8; 32], warehouse, 2)
}

async fn call(state: &ApiState, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("Content-Type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let res = api_router(state.clone())
        .oneshot(req.body(body).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn post(state: &ApiState, uri: &str, body: Value) -> Value {
    let (status, json) = call(state, Method::POST, uri, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "POST {uri}: {json}");
    json
}

/// A source file with five vehicle owners.
fn source_file(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("crm.duckdb");
    let conn = duckdb::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE t_owner (plate VARCHAR, owner_name VARCHAR, phone VARCHAR, axles INTEGER);
         INSERT INTO t_owner VALUES
           ('A0001', 'Li Lei', '13812345678', 2),
           ('A0002', 'Han Meimei', '13987654321', 2),
           ('A0003', 'Wang Wu', '13700001111', 3),
           ('A0004', 'Zhao Liu', '13600002222', 6),
           ('A0005', 'Sun Qi', '13500003333', 2);",
    )
    .unwrap();
    path.to_str().unwrap().to_string()
}

async fn wait_for_finish(state: &ApiState, task_id: &Value, run_id: &str) -> Value {
    for _ in 0..200 {
        let (status, run) = call(
            state,
            Method::GET,
            &format!("/api/etl/tasks/{task_id}/runs/{run_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        if run["status"] != "running" {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("run {run_id} did not finish");
}

#[tokio::test]
async fn test_model_load_and_preview() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(&dir).await;
    let url = source_file(&dir);

    let domain = post(&state, "/api/domain", json!({"name": "Toll Operations"})).await["id"].clone();
    let model = post(
        &state,
        "/api/model",
        json!({"name": "Vehicle Owner", "code": "vehicle_owner", "domainId": domain}),
    )
    .await["id"]
        .clone();
    for prop in [
        json!({"modelId": model, "name": "Plate", "required": true, "isPrimaryKey": true}),
        json!({"modelId": model, "name": "Owner Name"}),
        json!({"modelId": model, "name": "Phone", "sensitivityLevel": "private", "maskRule": "phone"}),
        json!({"modelId": model, "name": "Axles", "type": "int"}),
    ] {
        post(&state, "/api/property", prop).await;
    }

    let (status, def) = call(
        &state,
        Method::GET,
        &format!("/api/model/{model}/table-definition"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(def["tableName"], "vehicle_owner");
    assert_eq!(def["columns"].as_array().unwrap().len(), 4);

    let ds = post(
        &state,
        "/api/datasource",
        json!({"name": "crm", "type": "duckdb", "url": url}),
    )
    .await["id"]
        .clone();
    let (status, tables) = call(&state, Method::GET, &format!("/api/datasource/{ds}/tables"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(tables.to_string().contains("t_owner"));

    post(
        &state,
        "/api/model-table-association",
        json!({"modelId": model, "datasourceId": ds, "tableName": "t_owner"}),
    )
    .await;

    let task = post(
        &state,
        "/api/etl/tasks",
        json!({
            "name": "load owners",
            "sourceDatasourceId": ds,
            "targetModelId": model,
            "config": {
                "source": {"tableName": "t_owner"},
                "fieldMappings": {
                    "plate": "Plate",
                    "owner_name": "Owner Name",
                    "phone": "Phone",
                    "axles": "Axles"
                }
            }
        }),
    )
    .await;
    let task_id = task["id"].clone();

    let (status, started) = call(
        &state,
        Method::POST,
        &format!("/api/etl/tasks/{task_id}/execute"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = started["runId"].as_str().unwrap().to_string();

    let run = wait_for_finish(&state, &task_id, &run_id).await;
    assert_eq!(run["status"], "success", "{run}");

    let (_, logs) = call(&state, Method::GET, &format!("/api/etl/logs?taskId={task_id}"), None).await;
    let log = &logs[0];
    assert_eq!(log["recordsProcessed"], 5);
    assert_eq!(log["recordsSuccess"], 5);
    assert_eq!(log["recordsFailed"], 0);

    let (_, task) = call(&state, Method::GET, &format!("/api/etl/tasks/{task_id}"), None).await;
    assert_ne!(task["status"], "running");
    assert!(!task["lastRun"].is_null());

    let (status, preview) = call(
        &state,
        Method::GET,
        &format!("/api/data?modelId={model}&limit=10"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{preview}");
    let rows = preview["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 5);
    let first = rows.iter().find(|r| r["plate"] == "A0001").unwrap();
    assert_eq!(first["phone"], "138****5678");
    assert_eq!(first["owner_name"], "Li Lei");
    assert_eq!(first["axles"], 2);
    assert_eq!(preview["maskedColumns"], json!(["phone"]));
}

#[tokio::test]
async fn test_rerun_is_idempotent_on_primary_key() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(&dir).await;
    let url = source_file(&dir);

    let model = post(&state, "/api/model", json!({"name": "Owner", "code": "owner"})).await["id"].clone();
    post(
        &state,
        "/api/property",
        json!({"modelId": model, "name": "Plate", "required": true, "isPrimaryKey": true}),
    )
    .await;
    let ds = post(
        &state,
        "/api/datasource",
        json!({"name": "crm", "type": "duckdb", "url": url}),
    )
    .await["id"]
        .clone();
    let task_id = post(
        &state,
        "/api/etl/tasks",
        json!({
            "name": "plates",
            "sourceDatasourceId": ds,
            "targetModelId": model,
            "config": {"source": {"tableName": "t_owner"}, "fieldMappings": {"plate": "Plate"}}
        }),
    )
    .await["id"]
        .clone();

    for _ in 0..2 {
        let (status, started) = call(
            &state,
            Method::POST,
            &format!("/api/etl/tasks/{task_id}/execute"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED, "{started}");
        let run = wait_for_finish(&state, &task_id, started["runId"].as_str().unwrap()).await;
        assert_eq!(run["status"], "success", "{run}");
    }

    let (_, logs) = call(&state, Method::GET, &format!("/api/etl/logs?taskId={task_id}"), None).await;
    assert_eq!(logs.as_array().unwrap().len(), 2);

    let (_, preview) = call(&state, Method::GET, &format!("/api/data?modelId={model}"), None).await;
    assert_eq!(preview["rows"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_domain_graph() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(&dir).await;

    let toll = post(&state, "/api/domain", json!({"name": "Toll"})).await["id"].clone();
    let road = post(&state, "/api/domain", json!({"name": "Road"})).await["id"].clone();
    let vehicle = post(&state, "/api/model", json!({"name": "Vehicle", "code": "vehicle", "domainId": toll})).await["id"].clone();
    let passage = post(&state, "/api/model", json!({"name": "Passage", "code": "passage", "domainId": toll})).await["id"].clone();
    let section = post(&state, "/api/model", json!({"name": "Section", "code": "section", "domainId": road})).await["id"].clone();

    post(
        &state,
        "/api/relation",
        json!({"name": "passes", "sourceModelId": vehicle, "targetModelId": passage}),
    )
    .await;
    post(
        &state,
        "/api/relation",
        json!({"name": "on section", "sourceModelId": passage, "targetModelId": section, "type": "many-to-one"}),
    )
    .await;

    let (status, graph) = call(&state, Method::GET, "/api/domain", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(graph["domains"].as_array().unwrap().len(), 2);
    assert_eq!(
        graph["edges"],
        json!([{"source": toll, "target": road, "relationCount": 1}])
    );

    let (_, models) = call(&state, Method::GET, &format!("/api/model?domainId={toll}"), None).await;
    assert_eq!(models["models"].as_array().unwrap().len(), 2);
    assert_eq!(models["edges"].as_array().unwrap().len(), 1);
}
