use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::indicator;

use super::{
    ApiErr, ApiState,
    attribute_handlers::require_domain,
    dto::{CreateIndicatorRequest, DomainScopedQuery, IndicatorResponse, UpdateIndicatorRequest},
    require,
};

const DRAFT: &str = "draft";
const PUBLISHED: &str = "published";
const OFFLINE: &str = "offline";

async fn find_indicator(state: &ApiState, id: i32) -> Result<indicator::Model, ApiErr> {
    indicator::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("Indicator not found"))
}

async fn set_status(
    state: &ApiState,
    model: indicator::Model,
    status: &str,
) -> Result<indicator::Model, ApiErr> {
    let id = model.id;
    let mut active: indicator::ActiveModel = model.into();
    active.status = Set(status.to_string());
    active.updated_at = Set(Utc::now().naive_utc());
    let updated = active.update(&state.db).await.map_err(ApiErr::internal)?;
    tracing::info!(indicator_id = id, status, "indicator status changed");
    Ok(updated)
}

pub async fn list_indicators(
    State(state): State<ApiState>,
    Query(params): Query<DomainScopedQuery>,
) -> Result<Json<Vec<IndicatorResponse>>, ApiErr> {
    let mut query = indicator::Entity::find();
    if let Some(domain_id) = params.domain_id {
        query = query.filter(indicator::Column::DomainId.eq(domain_id));
    }
    let items = query
        .order_by_asc(indicator::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    Ok(Json(items.into_iter().map(IndicatorResponse::from).collect()))
}

pub async fn create_indicator(
    State(state): State<ApiState>,
    Json(body): Json<CreateIndicatorRequest>,
) -> Result<(StatusCode, Json<IndicatorResponse>), ApiErr> {
    require(&body.name, "name")?;
    let domain_id = require_domain(&state, body.domain_id).await?;

    let now = Utc::now().naive_utc();
    let model = indicator::ActiveModel {
        domain_id: Set(domain_id),
        name: Set(body.name.trim().to_string()),
        expression: Set(body.expression),
        return_type: Set(body
            .return_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "number".to_string())),
        unit: Set(body.unit),
        description: Set(body.description),
        status: Set(DRAFT.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(ApiErr::internal)?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

pub async fn get_indicator(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<IndicatorResponse>, ApiErr> {
    Ok(Json(find_indicator(&state, id).await?.into()))
}

pub async fn update_indicator(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateIndicatorRequest>,
) -> Result<Json<IndicatorResponse>, ApiErr> {
    let model = find_indicator(&state, id).await?;
    let mut active: indicator::ActiveModel = model.into();

    if body.domain_id.is_some() {
        active.domain_id = Set(require_domain(&state, body.domain_id).await?);
    }
    if let Some(name) = body.name {
        require(&name, "name")?;
        active.name = Set(name.trim().to_string());
    }
    if let Some(expression) = body.expression {
        active.expression = Set(expression);
    }
    if let Some(return_type) = body.return_type {
        active.return_type = Set(return_type);
    }
    if let Some(unit) = body.unit {
        active.unit = Set(Some(unit));
    }
    if let Some(description) = body.description {
        active.description = Set(Some(description));
    }
    active.updated_at = Set(Utc::now().naive_utc());

    let updated = active.update(&state.db).await.map_err(ApiErr::internal)?;
    Ok(Json(updated.into()))
}

pub async fn delete_indicator(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiErr> {
    let model = find_indicator(&state, id).await?;
    let active: indicator::ActiveModel = model.into();
    active.delete(&state.db).await.map_err(ApiErr::internal)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------- PUT /indicator/{id}/publish ----------

pub async fn publish_indicator(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<IndicatorResponse>, ApiErr> {
    let model = find_indicator(&state, id).await?;
    if model.status == PUBLISHED {
        return Err(ApiErr::conflict("Indicator is already published"));
    }
    Ok(Json(set_status(&state, model, PUBLISHED).await?.into()))
}

// ---------- PUT /indicator/{id}/offline ----------

pub async fn offline_indicator(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<IndicatorResponse>, ApiErr> {
    let model = find_indicator(&state, id).await?;
    if model.status != PUBLISHED {
        return Err(ApiErr::conflict(format!(
            "Only published indicators can be taken offline (status is {})",
            model.status
        )));
    }
    Ok(Json(set_status(&state, model, OFFLINE).await?.into()))
}
