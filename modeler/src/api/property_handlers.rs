use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::{data_model, property};
use crate::etl::definition::snake_case;

use super::{
    ApiErr, ApiState,
    dto::{CreatePropertyRequest, ListPropertiesQuery, PropertyResponse, UpdatePropertyRequest},
    require, unique_violation,
};

const CODE_TAKEN: &str = "Property code already exists in this model";

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn find_property(state: &ApiState, id: i32) -> Result<property::Model, ApiErr> {
    property::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("Property not found"))
}

// ---------- GET /property ----------

pub async fn list_properties(
    State(state): State<ApiState>,
    Query(params): Query<ListPropertiesQuery>,
) -> Result<Json<Vec<PropertyResponse>>, ApiErr> {
    let mut query = property::Entity::find();
    if let Some(model_id) = params.model_id {
        query = query.filter(property::Column::ModelId.eq(model_id));
    }
    let items = query
        .order_by_asc(property::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    Ok(Json(items.into_iter().map(PropertyResponse::from).collect()))
}

// ---------- POST /property ----------

pub async fn create_property(
    State(state): State<ApiState>,
    Json(body): Json<CreatePropertyRequest>,
) -> Result<(StatusCode, Json<PropertyResponse>), ApiErr> {
    let model_id = body
        .model_id
        .ok_or_else(|| ApiErr::bad_request("modelId is required"))?;
    require(&body.name, "name")?;
    data_model::Entity::find_by_id(model_id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::bad_request(format!("Model {model_id} does not exist")))?;

    let name = body.name.trim().to_string();
    let code = non_blank(body.code).unwrap_or_else(|| snake_case(&name));
    let physical_column = non_blank(body.physical_column).unwrap_or_else(|| snake_case(&name));
    let constraints = serde_json::to_string(&body.constraints).map_err(ApiErr::internal)?;

    let model = property::ActiveModel {
        model_id: Set(model_id),
        name: Set(name),
        code: Set(code),
        prop_type: Set(non_blank(body.prop_type).unwrap_or_else(|| "string".to_string())),
        required: Set(body.required),
        description: Set(body.description),
        is_primary_key: Set(body.is_primary_key),
        is_foreign_key: Set(body.is_foreign_key),
        default_value: Set(body.default_value),
        constraints: Set(constraints),
        sensitivity_level: Set(non_blank(body.sensitivity_level)),
        mask_rule: Set(non_blank(body.mask_rule)),
        physical_column: Set(Some(physical_column)),
        foreign_key_table: Set(body.foreign_key_table),
        foreign_key_column: Set(body.foreign_key_column),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(unique_violation(CODE_TAKEN))?;

    tracing::debug!(property_id = model.id, model_id, code = %model.code, "property created");
    Ok((StatusCode::CREATED, Json(model.into())))
}

// ---------- GET /property/{id} ----------

pub async fn get_property(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<PropertyResponse>, ApiErr> {
    Ok(Json(find_property(&state, id).await?.into()))
}

// ---------- PUT /property/{id} ----------

pub async fn update_property(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdatePropertyRequest>,
) -> Result<Json<PropertyResponse>, ApiErr> {
    let model = find_property(&state, id).await?;
    let mut active: property::ActiveModel = model.into();

    if let Some(name) = body.name {
        require(&name, "name")?;
        active.name = Set(name.trim().to_string());
    }
    if let Some(code) = body.code {
        require(&code, "code")?;
        active.code = Set(code.trim().to_string());
    }
    if let Some(prop_type) = non_blank(body.prop_type) {
        active.prop_type = Set(prop_type);
    }
    if let Some(required) = body.required {
        active.required = Set(required);
    }
    if let Some(description) = body.description {
        active.description = Set(Some(description));
    }
    if let Some(pk) = body.is_primary_key {
        active.is_primary_key = Set(pk);
    }
    if let Some(fk) = body.is_foreign_key {
        active.is_foreign_key = Set(fk);
    }
    if let Some(default_value) = body.default_value {
        active.default_value = Set(Some(default_value));
    }
    if let Some(constraints) = body.constraints {
        active.constraints = Set(serde_json::to_string(&constraints).map_err(ApiErr::internal)?);
    }
    // empty strings clear the masking settings
    if let Some(level) = body.sensitivity_level {
        active.sensitivity_level = Set(non_blank(Some(level)));
    }
    if let Some(rule) = body.mask_rule {
        active.mask_rule = Set(non_blank(Some(rule)));
    }
    if let Some(column) = non_blank(body.physical_column) {
        active.physical_column = Set(Some(column));
    }
    if let Some(table) = body.foreign_key_table {
        active.foreign_key_table = Set(Some(table));
    }
    if let Some(column) = body.foreign_key_column {
        active.foreign_key_column = Set(Some(column));
    }

    let updated = active
        .update(&state.db)
        .await
        .map_err(unique_violation(CODE_TAKEN))?;
    Ok(Json(updated.into()))
}

// ---------- DELETE /property/{id} ----------

pub async fn delete_property(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiErr> {
    let model = find_property(&state, id).await?;
    let active: property::ActiveModel = model.into();
    active.delete(&state.db).await.map_err(ApiErr::internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{create, send, state};
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_property_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let m = create(&state, "/api/model", json!({"name": "M", "code": "m"})).await["id"].clone();

        let p = create(
            &state,
            "/api/property",
            json!({"modelId": m, "name": "Phone Number", "constraints": ["len<=11"]}),
        )
        .await;
        assert_eq!(p["code"], "phone_number");
        assert_eq!(p["physicalColumn"], "phone_number");
        assert_eq!(p["type"], "string");
        assert_eq!(p["required"], false);
        assert_eq!(p["constraints"], json!(["len<=11"]));
    }

    #[tokio::test]
    async fn test_property_requires_existing_model() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let (status, body) =
            send(&state, Method::POST, "/api/property", Some(json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "modelId is required");

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/property",
            Some(json!({"modelId": 5, "name": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Model 5 does not exist");
    }

    #[tokio::test]
    async fn test_property_code_unique_per_model() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let m1 = create(&state, "/api/model", json!({"name": "M1", "code": "m1"})).await["id"].clone();
        let m2 = create(&state, "/api/model", json!({"name": "M2", "code": "m2"})).await["id"].clone();

        create(&state, "/api/property", json!({"modelId": m1, "name": "Name"})).await;
        create(&state, "/api/property", json!({"modelId": m2, "name": "Name"})).await;
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/property",
            Some(json!({"modelId": m1, "name": "Name"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], CODE_TAKEN);

        let (_, body) = send(&state, Method::GET, &format!("/api/property?modelId={m1}"), None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_property_masking_fields() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let m = create(&state, "/api/model", json!({"name": "M", "code": "m"})).await["id"].clone();
        let p = create(&state, "/api/property", json!({"modelId": m, "name": "Phone"})).await["id"].clone();

        let (status, body) = send(
            &state,
            Method::PUT,
            &format!("/api/property/{p}"),
            Some(json!({"sensitivityLevel": "private", "maskRule": "phone", "required": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sensitivityLevel"], "private");
        assert_eq!(body["maskRule"], "phone");
        assert_eq!(body["required"], true);

        let (_, body) = send(
            &state,
            Method::PUT,
            &format!("/api/property/{p}"),
            Some(json!({"maskRule": ""})),
        )
        .await;
        assert_eq!(body["maskRule"], serde_json::Value::Null);
    }
}
