use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};

use crate::entity::{data_model, domain, model_relation};

use super::{
    ApiErr, ApiState,
    dto::{CreateDomainRequest, DomainEdge, DomainListResponse, DomainResponse, UpdateDomainRequest},
    require,
};

/// Count relations that cross from one domain into another.
pub(crate) fn domain_edges(
    models: &[data_model::Model],
    relations: &[model_relation::Model],
) -> Vec<DomainEdge> {
    let domain_of: HashMap<i32, i32> = models
        .iter()
        .filter_map(|m| m.domain_id.map(|d| (m.id, d)))
        .collect();

    let mut counts: BTreeMap<(i32, i32), usize> = BTreeMap::new();
    for r in relations {
        let (Some(&src), Some(&tgt)) = (
            domain_of.get(&r.source_model_id),
            domain_of.get(&r.target_model_id),
        ) else {
            continue;
        };
        if src != tgt {
            *counts.entry((src, tgt)).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .map(|((source, target), relation_count)| DomainEdge {
            source,
            target,
            relation_count,
        })
        .collect()
}

// ---------- GET /domain ----------

pub async fn list_domains(
    State(state): State<ApiState>,
) -> Result<Json<DomainListResponse>, ApiErr> {
    let domains = domain::Entity::find()
        .order_by_asc(domain::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    let models = data_model::Entity::find()
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    let relations = model_relation::Entity::find()
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;

    Ok(Json(DomainListResponse {
        edges: domain_edges(&models, &relations),
        domains: domains.into_iter().map(DomainResponse::from).collect(),
    }))
}

// ---------- POST /domain ----------

pub async fn create_domain(
    State(state): State<ApiState>,
    Json(body): Json<CreateDomainRequest>,
) -> Result<(StatusCode, Json<DomainResponse>), ApiErr> {
    require(&body.name, "name")?;

    let now = Utc::now().naive_utc();
    let model = domain::ActiveModel {
        name: Set(body.name.trim().to_string()),
        description: Set(body.description),
        owner: Set(body.owner),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(ApiErr::internal)?;

    tracing::info!(domain_id = model.id, name = %model.name, "domain created");
    Ok((StatusCode::CREATED, Json(model.into())))
}

// ---------- GET /domain/{id} ----------

pub async fn get_domain(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<DomainResponse>, ApiErr> {
    let model = domain::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("Domain not found"))?;

    Ok(Json(model.into()))
}

// ---------- PUT /domain/{id} ----------

pub async fn update_domain(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateDomainRequest>,
) -> Result<Json<DomainResponse>, ApiErr> {
    let model = domain::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("Domain not found"))?;

    let mut active: domain::ActiveModel = model.into();
    if let Some(name) = body.name {
        require(&name, "name")?;
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = body.description {
        active.description = Set(Some(description));
    }
    if let Some(owner) = body.owner {
        active.owner = Set(Some(owner));
    }
    active.updated_at = Set(Utc::now().naive_utc());

    let updated = active.update(&state.db).await.map_err(ApiErr::internal)?;
    Ok(Json(updated.into()))
}

// ---------- DELETE /domain/{id} ----------

pub async fn delete_domain(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiErr> {
    let model = domain::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("Domain not found"))?;

    // models keep existing with domain_id cleared; attributes and indicators go
    let active: domain::ActiveModel = model.into();
    active.delete(&state.db).await.map_err(ApiErr::internal)?;

    tracing::info!(domain_id = id, "domain deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{create, send, state};
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_domain_crud() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let d = create(&state, "/api/domain", json!({"name": "Traffic", "owner": "ops"})).await;
        let id = d["id"].as_i64().unwrap();
        assert_eq!(d["owner"], "ops");

        let (status, body) = send(
            &state,
            Method::PUT,
            &format!("/api/domain/{id}"),
            Some(json!({"description": "Road network"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Traffic");
        assert_eq!(body["description"], "Road network");

        let (status, body) = send(&state, Method::GET, "/api/domain", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["domains"].as_array().unwrap().len(), 1);
        assert_eq!(body["edges"], json!([]));

        let (status, _) = send(&state, Method::DELETE, &format!("/api/domain/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&state, Method::GET, &format!("/api/domain/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Domain not found");
    }

    #[tokio::test]
    async fn test_create_domain_requires_name() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let (status, body) = send(&state, Method::POST, "/api/domain", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "name is required");
    }

    #[tokio::test]
    async fn test_domain_edges_come_from_cross_domain_relations() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let a = create(&state, "/api/domain", json!({"name": "A"})).await["id"].clone();
        let b = create(&state, "/api/domain", json!({"name": "B"})).await["id"].clone();
        let m1 = create(&state, "/api/model", json!({"name": "M1", "code": "m1", "domainId": a})).await["id"].clone();
        let m2 = create(&state, "/api/model", json!({"name": "M2", "code": "m2", "domainId": a})).await["id"].clone();
        let m3 = create(&state, "/api/model", json!({"name": "M3", "code": "m3", "domainId": b})).await["id"].clone();

        for (src, tgt) in [(&m1, &m3), (&m2, &m3), (&m1, &m2)] {
            create(
                &state,
                "/api/relation",
                json!({"name": "r", "sourceModelId": src, "targetModelId": tgt}),
            )
            .await;
        }

        let (_, body) = send(&state, Method::GET, "/api/domain", None).await;
        assert_eq!(
            body["edges"],
            json!([{"source": a, "target": b, "relationCount": 2}])
        );
    }

    #[tokio::test]
    async fn test_delete_domain_detaches_models() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let d = create(&state, "/api/domain", json!({"name": "A"})).await["id"].clone();
        let m = create(&state, "/api/model", json!({"name": "M", "code": "m", "domainId": d})).await;

        send(&state, Method::DELETE, &format!("/api/domain/{d}"), None).await;

        let (status, body) = send(&state, Method::GET, &format!("/api/model/{}", m["id"]), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["domainId"], serde_json::Value::Null);
    }
}
