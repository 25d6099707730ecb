use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde_json::Value;

use crate::entity::{data_model, property};
use crate::etl::definition::{generate_table_definition, table_name_for};
use crate::etl::transform::{CellValue, TargetKind, coerce_cell};
use crate::masking::{mask_json, should_mask};
use crate::warehouse::JsonRow;

use super::{
    ApiErr, ApiState,
    dto::{PreviewQuery, PreviewResponse, RecordQuery, RecordResponse},
    model_handlers::find_model,
};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Bookkeeping keys a record body may carry; they never map to columns.
const SYSTEM_FIELDS: &[&str] = &["id", "modelId", "createdAt", "updatedAt"];

// ---------- helpers ----------

async fn model_properties(state: &ApiState, model_id: i32) -> Result<Vec<property::Model>, ApiErr> {
    property::Entity::find()
        .filter(property::Column::ModelId.eq(model_id))
        .order_by_asc(property::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)
}

/// (column, rule) for every property that needs masking.
fn masks_for(properties: &[property::Model]) -> Vec<(String, String)> {
    properties
        .iter()
        .filter(|p| should_mask(p.sensitivity_level.as_deref(), p.mask_rule.as_deref()))
        .filter_map(|p| Some((p.column_name(), p.mask_rule.clone()?)))
        .collect()
}

fn apply_masks(row: &mut JsonRow, masks: &[(String, String)]) {
    for (column, rule) in masks {
        if let Some(value) = row.get_mut(column) {
            *value = mask_json(rule, value);
        }
    }
}

/// JSON value as the text form the cell coercion parses.
fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn body_model_id(body: &JsonRow) -> Option<i32> {
    body.get("modelId")
        .and_then(Value::as_i64)
        .and_then(|id| i32::try_from(id).ok())
}

/// A model's warehouse table, addressed by its single primary-key property.
struct RecordTable {
    model: data_model::Model,
    table: String,
    properties: Vec<property::Model>,
    /// Index of the key property in `properties`.
    key: usize,
}

impl RecordTable {
    async fn load(state: &ApiState, model_id: Option<i32>) -> Result<Self, ApiErr> {
        let model_id = model_id.ok_or_else(|| ApiErr::bad_request("modelId is required"))?;
        let model = find_model(state, model_id).await?;
        let properties = model_properties(state, model.id).await?;

        let mut keys = properties
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_primary_key)
            .map(|(i, _)| i);
        let key = match (keys.next(), keys.next()) {
            (Some(i), None) => i,
            _ => {
                return Err(ApiErr::bad_request(format!(
                    "Model {} needs exactly one primary key property to address records",
                    model.name
                )));
            }
        };
        Ok(Self {
            table: table_name_for(&model),
            model,
            properties,
            key,
        })
    }

    fn key_column(&self) -> String {
        self.properties[self.key].column_name()
    }

    /// A record id from the path, typed like the key property.
    fn parse_key(&self, record_id: &str) -> Result<CellValue, ApiErr> {
        let kind = TargetKind::from_prop_type(&self.properties[self.key].prop_type);
        match coerce_cell(Some(record_id), kind) {
            Some(CellValue::Null) | None => Err(ApiErr::bad_request(format!(
                "Invalid record id {record_id:?}"
            ))),
            Some(key) => Ok(key),
        }
    }

    /// Rekey a request body by column name; keys may name a property by
    /// column or by code.
    fn by_column(&self, body: JsonRow) -> Result<JsonRow, ApiErr> {
        let mut fields = JsonRow::new();
        let mut unknown = Vec::new();
        for (name, value) in body {
            if SYSTEM_FIELDS.contains(&name.as_str()) {
                continue;
            }
            match self
                .properties
                .iter()
                .find(|p| p.column_name() == name || p.code == name)
            {
                Some(p) => {
                    fields.insert(p.column_name(), value);
                }
                None => unknown.push(name),
            }
        }
        if !unknown.is_empty() {
            return Err(ApiErr::bad_request(format!(
                "Unknown fields: {}",
                unknown.join(", ")
            )));
        }
        Ok(fields)
    }

    /// One coerced value per property, in property order. Every type or
    /// required-field problem is reported together.
    fn values(&self, fields: &JsonRow) -> Result<Vec<CellValue>, ApiErr> {
        let mut values = Vec::with_capacity(self.properties.len());
        let mut errors = Vec::new();
        for p in &self.properties {
            let column = p.column_name();
            let raw = fields.get(&column).and_then(json_text);
            match coerce_cell(raw.as_deref(), TargetKind::from_prop_type(&p.prop_type)) {
                Some(CellValue::Null) if p.required || p.is_primary_key => {
                    errors.push(format!("{column} is required"));
                }
                Some(value) => values.push(value),
                None => errors.push(format!("{column} expects {}", p.prop_type)),
            }
        }
        if errors.is_empty() {
            Ok(values)
        } else {
            Err(ApiErr::bad_request(format!(
                "Validation failed: {}",
                errors.join(", ")
            )))
        }
    }

    async fn find(&self, state: &ApiState, key: CellValue) -> Result<Option<JsonRow>, ApiErr> {
        state
            .warehouse
            .get_row(&self.table, &self.key_column(), key)
            .await
            .map_err(ApiErr::internal)
    }

    async fn fetch(&self, state: &ApiState, key: CellValue) -> Result<JsonRow, ApiErr> {
        self.find(state, key)
            .await?
            .ok_or_else(|| ApiErr::not_found("DataRecord not found"))
    }

    /// Upsert one full row; the table is created from the model on first write.
    async fn write(&self, state: &ApiState, values: Vec<CellValue>) -> Result<(), ApiErr> {
        let definition = generate_table_definition(&self.model, &self.properties);
        state
            .warehouse
            .ensure_table(&definition)
            .await
            .map_err(ApiErr::internal)?;
        state
            .warehouse
            .append_rows(&definition, vec![values])
            .await
            .map_err(ApiErr::internal)?;
        Ok(())
    }

    fn response(&self, mut record: JsonRow) -> RecordResponse {
        let masks = masks_for(&self.properties);
        apply_masks(&mut record, &masks);
        RecordResponse {
            model_id: self.model.id,
            table_name: self.table.clone(),
            record,
            masked_columns: masks.into_iter().map(|(column, _)| column).collect(),
        }
    }
}

// ---------- GET /data ----------

pub async fn preview_data(
    State(state): State<ApiState>,
    Query(params): Query<PreviewQuery>,
) -> Result<Json<PreviewResponse>, ApiErr> {
    let model_id = params
        .model_id
        .ok_or_else(|| ApiErr::bad_request("modelId is required"))?;
    let model = find_model(&state, model_id).await?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let table = table_name_for(&model);
    if !state
        .warehouse
        .table_exists(&table)
        .await
        .map_err(ApiErr::internal)?
    {
        return Err(ApiErr::not_found(format!(
            "No warehouse table {table} for model"
        )));
    }

    let masks = masks_for(&model_properties(&state, model.id).await?);
    let mut rows = state
        .warehouse
        .preview(&table, limit)
        .await
        .map_err(ApiErr::internal)?;
    for row in &mut rows {
        apply_masks(row, &masks);
    }

    Ok(Json(PreviewResponse {
        model_id: model.id,
        table_name: table,
        rows,
        masked_columns: masks.into_iter().map(|(column, _)| column).collect(),
    }))
}

// ---------- POST /data ----------

pub async fn create_record(
    State(state): State<ApiState>,
    Query(params): Query<RecordQuery>,
    Json(body): Json<JsonRow>,
) -> Result<(StatusCode, Json<RecordResponse>), ApiErr> {
    let table = RecordTable::load(&state, params.model_id.or_else(|| body_model_id(&body))).await?;
    let fields = table.by_column(body)?;
    let values = table.values(&fields)?;
    let key = values[table.key].clone();

    if table.find(&state, key.clone()).await?.is_some() {
        return Err(ApiErr::conflict("A record with this key already exists"));
    }
    table.write(&state, values).await?;

    tracing::info!(model_id = table.model.id, table = %table.table, "data record created");
    let record = table.fetch(&state, key).await?;
    Ok((StatusCode::CREATED, Json(table.response(record))))
}

// ---------- GET /data/{record_id} ----------

pub async fn get_record(
    State(state): State<ApiState>,
    Path(record_id): Path<String>,
    Query(params): Query<RecordQuery>,
) -> Result<Json<RecordResponse>, ApiErr> {
    let table = RecordTable::load(&state, params.model_id).await?;
    let key = table.parse_key(&record_id)?;
    let record = table.fetch(&state, key).await?;
    Ok(Json(table.response(record)))
}

// ---------- PUT /data/{record_id} ----------

pub async fn update_record(
    State(state): State<ApiState>,
    Path(record_id): Path<String>,
    Query(params): Query<RecordQuery>,
    Json(body): Json<JsonRow>,
) -> Result<Json<RecordResponse>, ApiErr> {
    let table = RecordTable::load(&state, params.model_id.or_else(|| body_model_id(&body))).await?;
    let key = table.parse_key(&record_id)?;
    let changes = table.by_column(body)?;
    if changes.is_empty() {
        return Err(ApiErr::bad_request("No fields to update"));
    }

    // stored values are unmasked; only the named fields change
    let mut merged = table.fetch(&state, key.clone()).await?;
    merged.extend(changes);
    let values = table.values(&merged)?;
    if values[table.key] != key {
        return Err(ApiErr::bad_request("The key of a record cannot be changed"));
    }
    table.write(&state, values).await?;

    tracing::info!(model_id = table.model.id, table = %table.table, record_id = %record_id, "data record updated");
    let record = table.fetch(&state, key).await?;
    Ok(Json(table.response(record)))
}

// ---------- DELETE /data/{record_id} ----------

pub async fn delete_record(
    State(state): State<ApiState>,
    Path(record_id): Path<String>,
    Query(params): Query<RecordQuery>,
) -> Result<StatusCode, ApiErr> {
    let table = RecordTable::load(&state, params.model_id).await?;
    let key = table.parse_key(&record_id)?;
    if !state
        .warehouse
        .table_exists(&table.table)
        .await
        .map_err(ApiErr::internal)?
    {
        return Err(ApiErr::not_found("DataRecord not found"));
    }
    let deleted = state
        .warehouse
        .delete_row(&table.table, &table.key_column(), key)
        .await
        .map_err(ApiErr::internal)?;
    if deleted == 0 {
        return Err(ApiErr::not_found("DataRecord not found"));
    }

    tracing::info!(model_id = table.model.id, table = %table.table, record_id = %record_id, "data record deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{create, send, state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    /// Model `vehicle_owner` with a masked phone column, loaded with `n` rows.
    async fn seeded(state: &ApiState, n: usize) -> serde_json::Value {
        let m = create(
            state,
            "/api/model",
            json!({"name": "Vehicle Owner", "code": "vehicle_owner"}),
        )
        .await;
        let id = m["id"].clone();
        create(
            state,
            "/api/property",
            json!({"modelId": id, "name": "Plate", "type": "string", "isPrimaryKey": true, "required": true}),
        )
        .await;
        create(
            state,
            "/api/property",
            json!({"modelId": id, "name": "Phone", "type": "string",
                   "sensitivityLevel": "private", "maskRule": "phone"}),
        )
        .await;

        let model = find_model(state, id.as_i64().unwrap() as i32).await.unwrap();
        let props = property::Entity::find()
            .filter(property::Column::ModelId.eq(model.id))
            .all(&state.db)
            .await
            .unwrap();
        let def = generate_table_definition(&model, &props);
        state.warehouse.ensure_table(&def).await.unwrap();
        let rows = (0..n)
            .map(|i| {
                vec![
                    CellValue::Text(format!("A{i:04}")),
                    CellValue::Text("13812345678".to_string()),
                ]
            })
            .collect();
        state.warehouse.append_rows(&def, rows).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_preview_masks_sensitive_columns() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let id = seeded(&state, 3).await;

        let (status, body) = send(&state, Method::GET, &format!("/api/data?modelId={id}"), None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["tableName"], "vehicle_owner");
        assert_eq!(body["maskedColumns"], json!(["phone"]));
        let rows = body["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["phone"], "138****5678");
        assert_eq!(rows[0]["plate"], "A0000");
    }

    #[tokio::test]
    async fn test_preview_limit() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let id = seeded(&state, 5).await;

        let (_, body) = send(
            &state,
            Method::GET,
            &format!("/api/data?modelId={id}&limit=2"),
            None,
        )
        .await;
        assert_eq!(body["rows"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_preview_public_property_not_masked() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let id = seeded(&state, 1).await;

        let (_, props) = send(&state, Method::GET, &format!("/api/property?modelId={id}"), None).await;
        let phone = props
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["name"] == "Phone")
            .unwrap()["id"]
            .clone();
        let (status, _) = send(
            &state,
            Method::PUT,
            &format!("/api/property/{phone}"),
            Some(json!({"sensitivityLevel": "public"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&state, Method::GET, &format!("/api/data?modelId={id}"), None).await;
        assert_eq!(body["maskedColumns"], json!([]));
        assert_eq!(body["rows"][0]["phone"], "13812345678");
    }

    #[tokio::test]
    async fn test_preview_errors() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let (status, body) = send(&state, Method::GET, "/api/data", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "modelId is required");

        let (status, _) = send(&state, Method::GET, "/api/data?modelId=99", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let m = create(&state, "/api/model", json!({"name": "Empty", "code": "empty_model"})).await;
        let (status, body) = send(
            &state,
            Method::GET,
            &format!("/api/data?modelId={}", m["id"]),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("empty_model"));
    }

    /// Model `vehicle_owner`: plate key, masked phone, integer axles.
    async fn owner_model(state: &ApiState) -> serde_json::Value {
        let id = create(
            state,
            "/api/model",
            json!({"name": "Vehicle Owner", "code": "vehicle_owner"}),
        )
        .await["id"]
            .clone();
        for prop in [
            json!({"modelId": id, "name": "Plate", "isPrimaryKey": true, "required": true}),
            json!({"modelId": id, "name": "Phone", "sensitivityLevel": "private", "maskRule": "phone"}),
            json!({"modelId": id, "name": "Axles", "type": "int"}),
        ] {
            create(state, "/api/property", prop).await;
        }
        id
    }

    #[tokio::test]
    async fn test_record_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let id = owner_model(&state).await;

        let (status, body) = send(
            &state,
            Method::POST,
            &format!("/api/data?modelId={id}"),
            Some(json!({"plate": "A0001", "phone": "13812345678", "axles": "2"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["tableName"], "vehicle_owner");
        assert_eq!(body["record"]["axles"], 2);
        assert_eq!(body["record"]["phone"], "138****5678");
        assert_eq!(body["maskedColumns"], json!(["phone"]));

        let uri = format!("/api/data/A0001?modelId={id}");
        let (status, body) = send(&state, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"]["plate"], "A0001");

        // partial update keeps the stored phone, not its masked form
        let (status, body) = send(&state, Method::PUT, &uri, Some(json!({"axles": 3}))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["record"]["axles"], 3);
        let row = state
            .warehouse
            .get_row("vehicle_owner", "plate", CellValue::Text("A0001".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["phone"], "13812345678");

        let (_, preview) = send(&state, Method::GET, &format!("/api/data?modelId={id}"), None).await;
        assert_eq!(preview["rows"].as_array().unwrap().len(), 1);

        let (status, _) = send(&state, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&state, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&state, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_record_validation() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let id = owner_model(&state).await;

        let (status, body) = send(&state, Method::POST, "/api/data", Some(json!({"plate": "A1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "modelId is required");

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/data",
            Some(json!({"modelId": id, "phone": "13800000000", "axles": "many"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let msg = body["error"].as_str().unwrap();
        assert!(msg.contains("plate is required"), "{msg}");
        assert!(msg.contains("axles expects int"), "{msg}");

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/data",
            Some(json!({"modelId": id, "plate": "A1", "colour": "red"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown fields: colour");

        // modelId in the body, property addressed by code
        let (status, _) = send(
            &state,
            Method::POST,
            "/api/data",
            Some(json!({"modelId": id, "plate": "A1", "axles": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(
            &state,
            Method::POST,
            &format!("/api/data?modelId={id}"),
            Some(json!({"plate": "A1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let uri = format!("/api/data/A1?modelId={id}");
        let (status, body) = send(&state, Method::PUT, &uri, Some(json!({"plate": "B2"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("cannot be changed"));
        let (status, _) = send(&state, Method::PUT, &uri, Some(json!({"axles": true}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&state, Method::PUT, &uri, Some(json!({"modelId": id}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(
            &state,
            Method::PUT,
            &format!("/api/data/Z9?modelId={id}"),
            Some(json!({"axles": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // records need a single key property
        let keyless = create(&state, "/api/model", json!({"name": "Log", "code": "log_line"})).await;
        let (status, body) = send(
            &state,
            Method::GET,
            &format!("/api/data/1?modelId={}", keyless["id"]),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("primary key"));
    }

    #[tokio::test]
    async fn test_integer_keys_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let id = create(&state, "/api/model", json!({"name": "Lane", "code": "lane"})).await["id"].clone();
        create(
            &state,
            "/api/property",
            json!({"modelId": id, "name": "Lane No", "type": "int", "isPrimaryKey": true}),
        )
        .await;
        create(&state, "/api/property", json!({"modelId": id, "name": "Open", "type": "boolean"})).await;

        let (status, _) = send(
            &state,
            Method::POST,
            &format!("/api/data?modelId={id}"),
            Some(json!({"lane_no": 7, "open": true})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&state, Method::GET, &format!("/api/data/7?modelId={id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"]["lane_no"], 7);
        assert_eq!(body["record"]["open"], true);

        let (status, body) = send(&state, Method::GET, &format!("/api/data/seven?modelId={id}"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid record id"));
    }
}
