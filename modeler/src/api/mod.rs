use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
};
use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::set_header::response::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::etl::EtlError;
use crate::etl::job::RunStore;
use crate::etl::runner::EtlContext;
use crate::warehouse::Warehouse;

pub mod attribute_handlers;
pub mod data_handlers;
pub mod datasource_handlers;
pub mod datasource_types;
pub mod domain_handlers;
pub mod dto;
pub mod etl_handlers;
pub mod indicator_handlers;
pub mod mapping_handlers;
pub mod model_handlers;
pub mod property_handlers;
pub mod relation_handlers;

// ---------- shared state ----------

#[derive(Clone)]
pub struct ApiState {
    pub db: DatabaseConnection,
    pub master_key: [u8; 32],
    /// Default ETL target.
    pub warehouse: Warehouse,
    /// In-memory registry of ETL runs.
    pub runs: Arc<Mutex<RunStore>>,
    pub batch_size: usize,
}

impl ApiState {
    pub fn new(
        db: DatabaseConnection,
        master_key: [u8; 32],
        warehouse: Warehouse,
        batch_size: usize,
    ) -> Self {
        Self {
            db,
            master_key,
            warehouse,
            runs: Arc::new(Mutex::new(RunStore::new())),
            batch_size,
        }
    }

    pub fn etl_context(&self) -> EtlContext {
        EtlContext {
            db: self.db.clone(),
            master_key: self.master_key,
            warehouse: self.warehouse.clone(),
            runs: Arc::clone(&self.runs),
            batch_size: self.batch_size,
        }
    }
}

// ---------- error type ----------

/// A JSON error response: `{"error": "..."}` with an HTTP status.
#[derive(Debug)]
pub struct ApiErr(StatusCode, String);

impl ApiErr {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self(status, msg.into())
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(StatusCode::NOT_FOUND, msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self(StatusCode::CONFLICT, msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, msg.into())
    }

    pub fn status(&self) -> StatusCode {
        self.0
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.1 });
        (self.0, Json(body)).into_response()
    }
}

impl From<EtlError> for ApiErr {
    fn from(e: EtlError) -> Self {
        let status = match &e {
            EtlError::NotFound(_) => StatusCode::NOT_FOUND,
            EtlError::Conflict(_) => StatusCode::CONFLICT,
            EtlError::Config(_) | EtlError::NoValidFields { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, e.to_string())
    }
}

/// Map a write error, turning unique-constraint violations into 409 `msg`.
pub(crate) fn unique_violation(msg: &'static str) -> impl FnOnce(DbErr) -> ApiErr {
    move |e| {
        let text = e.to_string();
        if text.contains("UNIQUE") || text.contains("unique") {
            ApiErr::conflict(msg)
        } else {
            ApiErr::internal(e)
        }
    }
}

/// Reject a missing or blank required string field.
pub(crate) fn require(value: &str, field: &str) -> Result<(), ApiErr> {
    if value.trim().is_empty() {
        Err(ApiErr::bad_request(format!("{field} is required")))
    } else {
        Ok(())
    }
}

// ---------- router ----------

pub fn api_router(state: ApiState) -> Router {
    let allowed_origins: Vec<HeaderValue> = std::env::var("JM_CORS_ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = if allowed_origins.is_empty() {
        CorsLayer::new() // no origins allowed = same-origin only
    } else {
        CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .nest("/api", api_routes())
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<ApiState> {
    Router::new()
        // domains
        .route(
            "/domain",
            get(domain_handlers::list_domains).post(domain_handlers::create_domain),
        )
        .route(
            "/domain/{id}",
            get(domain_handlers::get_domain)
                .put(domain_handlers::update_domain)
                .delete(domain_handlers::delete_domain),
        )
        // models
        .route(
            "/model",
            get(model_handlers::list_models).post(model_handlers::create_model),
        )
        .route(
            "/model/{id}",
            get(model_handlers::get_model)
                .put(model_handlers::update_model)
                .delete(model_handlers::delete_model),
        )
        .route(
            "/model/{id}/table-definition",
            get(model_handlers::model_table_definition),
        )
        // properties
        .route(
            "/property",
            get(property_handlers::list_properties).post(property_handlers::create_property),
        )
        .route(
            "/property/{id}",
            get(property_handlers::get_property)
                .put(property_handlers::update_property)
                .delete(property_handlers::delete_property),
        )
        // relations
        .route(
            "/relation",
            get(relation_handlers::list_relations).post(relation_handlers::create_relation),
        )
        .route(
            "/relation/{id}",
            get(relation_handlers::get_relation)
                .put(relation_handlers::update_relation)
                .delete(relation_handlers::delete_relation),
        )
        .route(
            "/relation/{id}/toggle",
            put(relation_handlers::toggle_relation),
        )
        // shared attributes
        .route(
            "/shared-attribute",
            get(attribute_handlers::list_attributes).post(attribute_handlers::create_attribute),
        )
        .route(
            "/shared-attribute/{id}",
            get(attribute_handlers::get_attribute)
                .put(attribute_handlers::update_attribute)
                .delete(attribute_handlers::delete_attribute),
        )
        // indicators
        .route(
            "/indicator",
            get(indicator_handlers::list_indicators).post(indicator_handlers::create_indicator),
        )
        .route(
            "/indicator/{id}",
            get(indicator_handlers::get_indicator)
                .put(indicator_handlers::update_indicator)
                .delete(indicator_handlers::delete_indicator),
        )
        .route(
            "/indicator/{id}/publish",
            put(indicator_handlers::publish_indicator),
        )
        .route(
            "/indicator/{id}/offline",
            put(indicator_handlers::offline_indicator),
        )
        // data sources
        .route(
            "/datasource-types",
            get(datasource_handlers::list_datasource_types),
        )
        .route(
            "/datasource",
            get(datasource_handlers::list_datasources).post(datasource_handlers::create_datasource),
        )
        .route(
            "/datasource/{id}",
            get(datasource_handlers::get_datasource)
                .put(datasource_handlers::update_datasource)
                .delete(datasource_handlers::delete_datasource),
        )
        .route(
            "/datasource/{id}/toggle",
            put(datasource_handlers::toggle_datasource),
        )
        .route(
            "/datasource/{id}/test",
            post(datasource_handlers::test_datasource),
        )
        .route(
            "/datasource/{id}/tables",
            get(datasource_handlers::list_tables),
        )
        .route(
            "/datasource/{id}/tables/{table}/schema",
            get(datasource_handlers::table_schema),
        )
        .route(
            "/datasource/{id}/mappings",
            get(datasource_handlers::datasource_mappings),
        )
        // mappings
        .route(
            "/mapping",
            get(mapping_handlers::list_mappings).post(mapping_handlers::create_mapping),
        )
        .route(
            "/mapping/{id}",
            put(mapping_handlers::update_mapping).delete(mapping_handlers::delete_mapping),
        )
        // model ↔ table associations
        .route(
            "/model-table-association",
            get(mapping_handlers::list_associations).post(mapping_handlers::create_association),
        )
        .route(
            "/model-table-association/{id}",
            axum::routing::delete(mapping_handlers::delete_association),
        )
        .route(
            "/model-table-association/{id}/activate",
            put(mapping_handlers::activate_association),
        )
        .route(
            "/model-table-association/{id}/deactivate",
            put(mapping_handlers::deactivate_association),
        )
        // ETL tasks and runs
        .route(
            "/etl/tasks",
            get(etl_handlers::list_tasks).post(etl_handlers::create_task),
        )
        .route(
            "/etl/tasks/{id}",
            get(etl_handlers::get_task)
                .put(etl_handlers::update_task)
                .delete(etl_handlers::delete_task),
        )
        .route("/etl/tasks/{id}/toggle", put(etl_handlers::toggle_task))
        .route("/etl/tasks/{id}/activate", post(etl_handlers::activate_task))
        .route("/etl/tasks/{id}/pause", post(etl_handlers::pause_task))
        .route("/etl/tasks/{id}/execute", post(etl_handlers::execute_task))
        .route(
            "/etl/tasks/{id}/runs/{run_id}",
            get(etl_handlers::run_status).delete(etl_handlers::cancel_run),
        )
        .route(
            "/etl/tasks/{id}/runs/{run_id}/events",
            get(etl_handlers::run_events),
        )
        .route("/etl/logs", get(etl_handlers::list_logs))
        .route(
            "/etl/generate-table-definition",
            post(etl_handlers::generate_table_definition),
        )
        // warehouse preview and records
        .route(
            "/data",
            get(data_handlers::preview_data).post(data_handlers::create_record),
        )
        .route(
            "/data/{record_id}",
            get(data_handlers::get_record)
                .put(data_handlers::update_record)
                .delete(data_handlers::delete_record),
        )
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;
    use tower::ServiceExt;

    pub const KEY: [u8; 32] = [42u8; 32];

    /// State over an in-memory metadata store and a warehouse in `dir`.
    pub async fn state(dir: &tempfile::TempDir) -> ApiState {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let warehouse = Warehouse::open(dir.path().join("warehouse.duckdb")).unwrap();
        ApiState::new(db, KEY, warehouse, 100)
    }

    pub async fn send(
        state: &ApiState,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("Content-Type", "application/json");
                Body::from(serde_json::to_string(&v).unwrap())
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
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    pub async fn create(state: &ApiState, uri: &str, body: serde_json::Value) -> serde_json::Value {
        let (status, json) = send(state, Method::POST, uri, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "POST {uri}: {json}");
        json
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let (status, _) = send(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let (status, _) = send(&state, Method::GET, "/api/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_etl_error_status_mapping() {
        assert_eq!(
            ApiErr::from(EtlError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiErr::from(EtlError::Conflict("x".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiErr::from(EtlError::Config("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiErr::from(EtlError::Cancelled).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
