use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::{data_model, domain, model_relation, property};
use crate::etl::definition::{self, TableDefinition};

use super::{
    ApiErr, ApiState,
    dto::{
        CreateModelRequest, ListModelsQuery, ModelEdge, ModelListResponse, ModelResponse,
        UpdateModelRequest,
    },
    require, unique_violation,
};

const CODE_TAKEN: &str = "Model code already exists";

async fn ensure_domain(state: &ApiState, domain_id: Option<i32>) -> Result<(), ApiErr> {
    if let Some(id) = domain_id {
        domain::Entity::find_by_id(id)
            .one(&state.db)
            .await
            .map_err(ApiErr::internal)?
            .ok_or_else(|| ApiErr::bad_request(format!("Domain {id} does not exist")))?;
    }
    Ok(())
}

pub(crate) async fn find_model(state: &ApiState, id: i32) -> Result<data_model::Model, ApiErr> {
    data_model::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("Model not found"))
}

// ---------- GET /model ----------

pub async fn list_models(
    State(state): State<ApiState>,
    Query(params): Query<ListModelsQuery>,
) -> Result<Json<ModelListResponse>, ApiErr> {
    let mut query = data_model::Entity::find();
    if let Some(domain_id) = params.domain_id {
        query = query.filter(data_model::Column::DomainId.eq(domain_id));
    }
    let models = query
        .order_by_asc(data_model::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;

    let ids: HashSet<i32> = models.iter().map(|m| m.id).collect();
    let relations = model_relation::Entity::find()
        .order_by_asc(model_relation::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;

    // only edges whose two ends are both in the listing
    let edges = relations
        .iter()
        .filter(|r| ids.contains(&r.source_model_id) && ids.contains(&r.target_model_id))
        .map(ModelEdge::from)
        .collect();

    Ok(Json(ModelListResponse {
        models: models.into_iter().map(ModelResponse::from).collect(),
        edges,
    }))
}

// ---------- POST /model ----------

pub async fn create_model(
    State(state): State<ApiState>,
    Json(body): Json<CreateModelRequest>,
) -> Result<(StatusCode, Json<ModelResponse>), ApiErr> {
    require(&body.name, "name")?;
    require(&body.code, "code")?;
    ensure_domain(&state, body.domain_id).await?;

    let now = Utc::now().naive_utc();
    let model = data_model::ActiveModel {
        name: Set(body.name.trim().to_string()),
        code: Set(body.code.trim().to_string()),
        description: Set(body.description),
        creator: Set(body.creator),
        domain_id: Set(body.domain_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(unique_violation(CODE_TAKEN))?;

    tracing::info!(model_id = model.id, code = %model.code, "model created");
    Ok((StatusCode::CREATED, Json(model.into())))
}

// ---------- GET /model/{id} ----------

pub async fn get_model(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<ModelResponse>, ApiErr> {
    Ok(Json(find_model(&state, id).await?.into()))
}

// ---------- PUT /model/{id} ----------

pub async fn update_model(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateModelRequest>,
) -> Result<Json<ModelResponse>, ApiErr> {
    let model = find_model(&state, id).await?;
    ensure_domain(&state, body.domain_id).await?;

    let mut active: data_model::ActiveModel = model.into();
    if let Some(name) = body.name {
        require(&name, "name")?;
        active.name = Set(name.trim().to_string());
    }
    if let Some(code) = body.code {
        require(&code, "code")?;
        active.code = Set(code.trim().to_string());
    }
    if let Some(description) = body.description {
        active.description = Set(Some(description));
    }
    if let Some(creator) = body.creator {
        active.creator = Set(Some(creator));
    }
    if body.domain_id.is_some() {
        active.domain_id = Set(body.domain_id);
    }
    active.updated_at = Set(Utc::now().naive_utc());

    let updated = active
        .update(&state.db)
        .await
        .map_err(unique_violation(CODE_TAKEN))?;
    Ok(Json(updated.into()))
}

// ---------- DELETE /model/{id} ----------

pub async fn delete_model(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiErr> {
    let model = find_model(&state, id).await?;

    // properties, relations, mappings, associations and tasks cascade
    let active: data_model::ActiveModel = model.into();
    active.delete(&state.db).await.map_err(ApiErr::internal)?;

    tracing::info!(model_id = id, "model deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------- GET /model/{id}/table-definition ----------

pub async fn model_table_definition(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<TableDefinition>, ApiErr> {
    let model = find_model(&state, id).await?;
    Ok(Json(table_definition_for(&state, &model).await?))
}

pub(crate) async fn table_definition_for(
    state: &ApiState,
    model: &data_model::Model,
) -> Result<TableDefinition, ApiErr> {
    let properties = property::Entity::find()
        .filter(property::Column::ModelId.eq(model.id))
        .order_by_asc(property::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    Ok(definition::generate_table_definition(model, &properties))
}
