use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::{data_model, model_relation};

use super::{
    ApiErr, ApiState,
    dto::{CreateRelationRequest, ListRelationsQuery, RelationResponse, UpdateRelationRequest},
    require,
};

pub const RELATION_TYPES: [&str; 4] = ["one-to-one", "one-to-many", "many-to-one", "many-to-many"];

fn check_type(relation_type: &str) -> Result<(), ApiErr> {
    if RELATION_TYPES.contains(&relation_type) {
        Ok(())
    } else {
        Err(ApiErr::bad_request(format!(
            "Invalid relation type: {relation_type}"
        )))
    }
}

/// Both ends must exist and differ.
async fn check_ends(state: &ApiState, source: i32, target: i32) -> Result<(), ApiErr> {
    if source == target {
        return Err(ApiErr::bad_request(
            "sourceModelId and targetModelId must differ",
        ));
    }
    for id in [source, target] {
        data_model::Entity::find_by_id(id)
            .one(&state.db)
            .await
            .map_err(ApiErr::internal)?
            .ok_or_else(|| ApiErr::bad_request(format!("Model {id} does not exist")))?;
    }
    Ok(())
}

async fn model_names(state: &ApiState) -> Result<HashMap<i32, String>, ApiErr> {
    Ok(data_model::Entity::find()
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .into_iter()
        .map(|m| (m.id, m.name))
        .collect())
}

async fn respond(state: &ApiState, r: model_relation::Model) -> Result<RelationResponse, ApiErr> {
    let names = model_names(state).await?;
    let (source, target) = (
        names.get(&r.source_model_id).cloned(),
        names.get(&r.target_model_id).cloned(),
    );
    Ok(RelationResponse::new(r, source, target))
}

async fn find_relation(state: &ApiState, id: i32) -> Result<model_relation::Model, ApiErr> {
    model_relation::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("Relation not found"))
}

// ---------- GET /relation ----------

pub async fn list_relations(
    State(state): State<ApiState>,
    Query(params): Query<ListRelationsQuery>,
) -> Result<Json<Vec<RelationResponse>>, ApiErr> {
    let mut query = model_relation::Entity::find();

    if let Some(model_id) = params.model_id {
        query = query.filter(
            Condition::any()
                .add(model_relation::Column::SourceModelId.eq(model_id))
                .add(model_relation::Column::TargetModelId.eq(model_id)),
        );
    }
    if let Some(domain_id) = params.domain_id {
        let in_domain: Vec<i32> = data_model::Entity::find()
            .filter(data_model::Column::DomainId.eq(domain_id))
            .all(&state.db)
            .await
            .map_err(ApiErr::internal)?
            .into_iter()
            .map(|m| m.id)
            .collect();
        query = query.filter(
            Condition::any()
                .add(model_relation::Column::SourceModelId.is_in(in_domain.clone()))
                .add(model_relation::Column::TargetModelId.is_in(in_domain)),
        );
    }

    let relations = query
        .order_by_asc(model_relation::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;

    let names = model_names(&state).await?;
    let items = relations
        .into_iter()
        .map(|r| {
            let source = names.get(&r.source_model_id).cloned();
            let target = names.get(&r.target_model_id).cloned();
            RelationResponse::new(r, source, target)
        })
        .collect();
    Ok(Json(items))
}

// ---------- POST /relation ----------

pub async fn create_relation(
    State(state): State<ApiState>,
    Json(body): Json<CreateRelationRequest>,
) -> Result<(StatusCode, Json<RelationResponse>), ApiErr> {
    require(&body.name, "name")?;
    let source = body
        .source_model_id
        .ok_or_else(|| ApiErr::bad_request("sourceModelId is required"))?;
    let target = body
        .target_model_id
        .ok_or_else(|| ApiErr::bad_request("targetModelId is required"))?;
    let relation_type = body
        .relation_type
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "one-to-many".to_string());
    check_type(&relation_type)?;
    check_ends(&state, source, target).await?;

    let model = model_relation::ActiveModel {
        name: Set(body.name.trim().to_string()),
        source_model_id: Set(source),
        target_model_id: Set(target),
        relation_type: Set(relation_type),
        description: Set(body.description),
        enabled: Set(body.enabled.unwrap_or(true)),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(ApiErr::internal)?;

    tracing::info!(
        relation_id = model.id,
        source_model_id = source,
        target_model_id = target,
        "relation created"
    );
    Ok((StatusCode::CREATED, Json(respond(&state, model).await?)))
}

// ---------- GET /relation/{id} ----------

pub async fn get_relation(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<RelationResponse>, ApiErr> {
    let model = find_relation(&state, id).await?;
    Ok(Json(respond(&state, model).await?))
}

// ---------- PUT /relation/{id} ----------

pub async fn update_relation(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateRelationRequest>,
) -> Result<Json<RelationResponse>, ApiErr> {
    let model = find_relation(&state, id).await?;

    let source = body.source_model_id.unwrap_or(model.source_model_id);
    let target = body.target_model_id.unwrap_or(model.target_model_id);
    if body.source_model_id.is_some() || body.target_model_id.is_some() {
        check_ends(&state, source, target).await?;
    }

    let mut active: model_relation::ActiveModel = model.into();
    if let Some(name) = body.name {
        require(&name, "name")?;
        active.name = Set(name.trim().to_string());
    }
    if let Some(relation_type) = body.relation_type {
        check_type(&relation_type)?;
        active.relation_type = Set(relation_type);
    }
    if let Some(description) = body.description {
        active.description = Set(Some(description));
    }
    if let Some(enabled) = body.enabled {
        active.enabled = Set(enabled);
    }
    active.source_model_id = Set(source);
    active.target_model_id = Set(target);

    let updated = active.update(&state.db).await.map_err(ApiErr::internal)?;
    Ok(Json(respond(&state, updated).await?))
}

// ---------- PUT /relation/{id}/toggle ----------

pub async fn toggle_relation(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<RelationResponse>, ApiErr> {
    let model = find_relation(&state, id).await?;
    let enabled = !model.enabled;
    let mut active: model_relation::ActiveModel = model.into();
    active.enabled = Set(enabled);
    let updated = active.update(&state.db).await.map_err(ApiErr::internal)?;
    Ok(Json(respond(&state, updated).await?))
}

// ---------- DELETE /relation/{id} ----------

pub async fn delete_relation(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiErr> {
    let model = find_relation(&state, id).await?;
    let active: model_relation::ActiveModel = model.into();
    active.delete(&state.db).await.map_err(ApiErr::internal)?;
    Ok(StatusCode::NO_CONTENT)
}
