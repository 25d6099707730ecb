use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::{domain, shared_attribute};

use super::{
    ApiErr, ApiState,
    dto::{AttributeResponse, CreateAttributeRequest, DomainScopedQuery, UpdateAttributeRequest},
    require,
};

/// Shared by attributes and indicators: a required, existing domain.
pub(crate) async fn require_domain(state: &ApiState, domain_id: Option<i32>) -> Result<i32, ApiErr> {
    let id = domain_id.ok_or_else(|| ApiErr::bad_request("domainId is required"))?;
    domain::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::bad_request(format!("Domain {id} does not exist")))?;
    Ok(id)
}

async fn find_attribute(state: &ApiState, id: i32) -> Result<shared_attribute::Model, ApiErr> {
    shared_attribute::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("Shared attribute not found"))
}

pub async fn list_attributes(
    State(state): State<ApiState>,
    Query(params): Query<DomainScopedQuery>,
) -> Result<Json<Vec<AttributeResponse>>, ApiErr> {
    let mut query = shared_attribute::Entity::find();
    if let Some(domain_id) = params.domain_id {
        query = query.filter(shared_attribute::Column::DomainId.eq(domain_id));
    }
    let items = query
        .order_by_asc(shared_attribute::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    Ok(Json(items.into_iter().map(AttributeResponse::from).collect()))
}

pub async fn create_attribute(
    State(state): State<ApiState>,
    Json(body): Json<CreateAttributeRequest>,
) -> Result<(StatusCode, Json<AttributeResponse>), ApiErr> {
    require(&body.name, "name")?;
    let domain_id = require_domain(&state, body.domain_id).await?;

    let model = shared_attribute::ActiveModel {
        domain_id: Set(domain_id),
        name: Set(body.name.trim().to_string()),
        attr_type: Set(body
            .attr_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "string".to_string())),
        length: Set(body.length),
        precision: Set(body.precision),
        description: Set(body.description),
        value_range: Set(body.value_range),
        reference_count: Set(0),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(ApiErr::internal)?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

pub async fn get_attribute(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<AttributeResponse>, ApiErr> {
    Ok(Json(find_attribute(&state, id).await?.into()))
}

pub async fn update_attribute(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateAttributeRequest>,
) -> Result<Json<AttributeResponse>, ApiErr> {
    let model = find_attribute(&state, id).await?;
    let mut active: shared_attribute::ActiveModel = model.into();

    if body.domain_id.is_some() {
        active.domain_id = Set(require_domain(&state, body.domain_id).await?);
    }
    if let Some(name) = body.name {
        require(&name, "name")?;
        active.name = Set(name.trim().to_string());
    }
    if let Some(attr_type) = body.attr_type {
        active.attr_type = Set(attr_type);
    }
    if let Some(length) = body.length {
        active.length = Set(Some(length));
    }
    if let Some(precision) = body.precision {
        active.precision = Set(Some(precision));
    }
    if let Some(description) = body.description {
        active.description = Set(Some(description));
    }
    if let Some(value_range) = body.value_range {
        active.value_range = Set(Some(value_range));
    }
    if let Some(count) = body.reference_count {
        if count < 0 {
            return Err(ApiErr::bad_request("referenceCount must not be negative"));
        }
        active.reference_count = Set(count);
    }

    let updated = active.update(&state.db).await.map_err(ApiErr::internal)?;
    Ok(Json(updated.into()))
}

pub async fn delete_attribute(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiErr> {
    let model = find_attribute(&state, id).await?;
    let active: shared_attribute::ActiveModel = model.into();
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
    async fn test_attribute_crud_scoped_by_domain() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let d1 = create(&state, "/api/domain", json!({"name": "D1"})).await["id"].clone();
        let d2 = create(&state, "/api/domain", json!({"name": "D2"})).await["id"].clone();

        let a = create(
            &state,
            "/api/shared-attribute",
            json!({"domainId": d1, "name": "Plate Number", "type": "string", "length": "16"}),
        )
        .await;
        assert_eq!(a["referenceCount"], 0);
        assert_eq!(a["length"], "16");
        create(&state, "/api/shared-attribute", json!({"domainId": d2, "name": "Region"})).await;

        let (_, list) = send(
            &state,
            Method::GET,
            &format!("/api/shared-attribute?domainId={d1}"),
            None,
        )
        .await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, body) = send(
            &state,
            Method::PUT,
            &format!("/api/shared-attribute/{}", a["id"]),
            Some(json!({"referenceCount": 3, "valueRange": "A-Z"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["referenceCount"], 3);
        assert_eq!(body["valueRange"], "A-Z");

        let (status, _) = send(
            &state,
            Method::DELETE,
            &format!("/api/shared-attribute/{}", a["id"]),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_attribute_requires_domain() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/shared-attribute",
            Some(json!({"name": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "domainId is required");

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/shared-attribute",
            Some(json!({"name": "x", "domainId": 7})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Domain 7 does not exist");
    }
}
