use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::connector::validate_identifier;
use crate::entity::{data_model, data_source, mapping, model_table_association, property};

use super::{
    ApiErr, ApiState,
    dto::{
        AssociationResponse, CreateAssociationRequest, CreateMappingRequest,
        ListAssociationsQuery, ListMappingsQuery, MappingResponse, UpdateMappingRequest,
    },
    require, unique_violation,
};

async fn require_model(state: &ApiState, model_id: Option<i32>) -> Result<i32, ApiErr> {
    let id = model_id.ok_or_else(|| ApiErr::bad_request("modelId is required"))?;
    data_model::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::bad_request(format!("Model {id} does not exist")))?;
    Ok(id)
}

async fn require_datasource(state: &ApiState, datasource_id: Option<i32>) -> Result<i32, ApiErr> {
    let id = datasource_id.ok_or_else(|| ApiErr::bad_request("datasourceId is required"))?;
    data_source::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::bad_request(format!("Data source {id} does not exist")))?;
    Ok(id)
}

/// The property must exist and belong to `model_id`.
async fn property_of_model(
    state: &ApiState,
    property_id: i32,
    model_id: i32,
) -> Result<property::Model, ApiErr> {
    let prop = property::Entity::find_by_id(property_id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::bad_request(format!("Property {property_id} does not exist")))?;
    if prop.model_id != model_id {
        return Err(ApiErr::bad_request(format!(
            "Property {property_id} does not belong to model {model_id}"
        )));
    }
    Ok(prop)
}

// ---------- mappings ----------

const MAPPING_TAKEN: &str = "A mapping for this field already exists";

pub async fn list_mappings(
    State(state): State<ApiState>,
    Query(params): Query<ListMappingsQuery>,
) -> Result<Json<Vec<MappingResponse>>, ApiErr> {
    let mut query = mapping::Entity::find();
    if let Some(ds) = params.datasource_id {
        query = query.filter(mapping::Column::DatasourceId.eq(ds));
    }
    if let Some(model_id) = params.model_id {
        query = query.filter(mapping::Column::ModelId.eq(model_id));
    }
    let mappings = query
        .order_by_asc(mapping::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;

    let names: HashMap<i32, String> = property::Entity::find()
        .filter(property::Column::Id.is_in(mappings.iter().map(|m| m.property_id)))
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    Ok(Json(
        mappings
            .into_iter()
            .map(|m| {
                let name = names.get(&m.property_id).cloned();
                MappingResponse::new(m, name)
            })
            .collect(),
    ))
}

pub async fn create_mapping(
    State(state): State<ApiState>,
    Json(body): Json<CreateMappingRequest>,
) -> Result<(StatusCode, Json<MappingResponse>), ApiErr> {
    let datasource_id = require_datasource(&state, body.datasource_id).await?;
    let model_id = require_model(&state, body.model_id).await?;
    require(&body.field_id, "fieldId")?;
    let property_id = body
        .property_id
        .ok_or_else(|| ApiErr::bad_request("propertyId is required"))?;
    let prop = property_of_model(&state, property_id, model_id).await?;

    let now = Utc::now().naive_utc();
    let model = mapping::ActiveModel {
        datasource_id: Set(datasource_id),
        model_id: Set(model_id),
        field_id: Set(body.field_id.trim().to_string()),
        property_id: Set(property_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(unique_violation(MAPPING_TAKEN))?;

    tracing::debug!(
        mapping_id = model.id,
        datasource_id,
        model_id,
        field = %model.field_id,
        "mapping created"
    );
    Ok((
        StatusCode::CREATED,
        Json(MappingResponse::new(model, Some(prop.name))),
    ))
}

pub async fn update_mapping(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateMappingRequest>,
) -> Result<Json<MappingResponse>, ApiErr> {
    let model = mapping::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("Mapping not found"))?;

    let property_id = body.property_id.unwrap_or(model.property_id);
    let prop = property_of_model(&state, property_id, model.model_id).await?;

    let mut active: mapping::ActiveModel = model.into();
    if let Some(field_id) = body.field_id {
        require(&field_id, "fieldId")?;
        active.field_id = Set(field_id.trim().to_string());
    }
    active.property_id = Set(property_id);
    active.updated_at = Set(Utc::now().naive_utc());

    let updated = active
        .update(&state.db)
        .await
        .map_err(unique_violation(MAPPING_TAKEN))?;
    Ok(Json(MappingResponse::new(updated, Some(prop.name))))
}

pub async fn delete_mapping(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiErr> {
    let res = mapping::Entity::delete_by_id(id)
        .exec(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    if res.rows_affected == 0 {
        return Err(ApiErr::not_found("Mapping not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------- model ↔ table associations ----------

const ASSOCIATION_TAKEN: &str = "This model is already associated with the table";

async fn set_association_status(
    state: &ApiState,
    id: i32,
    status: &str,
) -> Result<AssociationResponse, ApiErr> {
    let model = model_table_association::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("Association not found"))?;
    let mut active: model_table_association::ActiveModel = model.into();
    active.status = Set(status.to_string());
    active.updated_at = Set(Utc::now().naive_utc());
    let updated = active.update(&state.db).await.map_err(ApiErr::internal)?;
    Ok(updated.into())
}

pub async fn list_associations(
    State(state): State<ApiState>,
    Query(params): Query<ListAssociationsQuery>,
) -> Result<Json<Vec<AssociationResponse>>, ApiErr> {
    let mut query = model_table_association::Entity::find();
    if let Some(model_id) = params.model_id {
        query = query.filter(model_table_association::Column::ModelId.eq(model_id));
    }
    let items = query
        .order_by_asc(model_table_association::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    Ok(Json(items.into_iter().map(AssociationResponse::from).collect()))
}

pub async fn create_association(
    State(state): State<ApiState>,
    Json(body): Json<CreateAssociationRequest>,
) -> Result<(StatusCode, Json<AssociationResponse>), ApiErr> {
    let model_id = require_model(&state, body.model_id).await?;
    let datasource_id = require_datasource(&state, body.datasource_id).await?;
    require(&body.table_name, "tableName")?;
    let table_name = body.table_name.trim().to_string();
    validate_identifier(&table_name).map_err(|e| ApiErr::bad_request(e.to_string()))?;
    let status = body.status.unwrap_or_else(|| "active".to_string());
    if status != "active" && status != "inactive" {
        return Err(ApiErr::bad_request(format!("Invalid status: {status}")));
    }

    let now = Utc::now().naive_utc();
    let model = model_table_association::ActiveModel {
        model_id: Set(model_id),
        datasource_id: Set(datasource_id),
        table_name: Set(table_name),
        status: Set(status),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(unique_violation(ASSOCIATION_TAKEN))?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

pub async fn delete_association(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiErr> {
    let res = model_table_association::Entity::delete_by_id(id)
        .exec(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    if res.rows_affected == 0 {
        return Err(ApiErr::not_found("Association not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate_association(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<AssociationResponse>, ApiErr> {
    Ok(Json(set_association_status(&state, id, "active").await?))
}

pub async fn deactivate_association(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<AssociationResponse>, ApiErr> {
    Ok(Json(set_association_status(&state, id, "inactive").await?))
}
