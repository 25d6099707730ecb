use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::connector::{self, ColumnInfo, ConnectorError, SourceConfig, SourceConnector};
use crate::crypto::SecureConfig;
use crate::entity::{data_model, data_source, domain, mapping, model_table_association, property};

use super::{
    ApiErr, ApiState,
    datasource_types::{self, ConnectionSettings, DatasourceTypeResponse},
    dto::{
        CreateDatasourceRequest, DatasourceMappingsQuery, DatasourceResponse,
        ListDatasourcesQuery, MappingResponse, TestConnectionResponse, UpdateDatasourceRequest,
    },
    require, unique_violation,
};

const NAME_TAKEN: &str = "Data source name already exists";

fn config_err(e: datasource_types::ConfigError) -> ApiErr {
    ApiErr::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
}

/// Upstream failures are reported as 502; bad input as 400/422.
fn connector_err(e: ConnectorError) -> ApiErr {
    let status = match &e {
        ConnectorError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
        ConnectorError::Config(_) | ConnectorError::Unsupported(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::BAD_GATEWAY,
    };
    ApiErr::new(status, e.to_string())
}

fn check_status(status: &str) -> Result<(), ApiErr> {
    match status {
        "active" | "inactive" => Ok(()),
        other => Err(ApiErr::bad_request(format!("Invalid status: {other}"))),
    }
}

async fn check_links(
    state: &ApiState,
    model_id: Option<i32>,
    domain_id: Option<i32>,
) -> Result<(), ApiErr> {
    if let Some(id) = model_id {
        data_model::Entity::find_by_id(id)
            .one(&state.db)
            .await
            .map_err(ApiErr::internal)?
            .ok_or_else(|| ApiErr::bad_request(format!("Model {id} does not exist")))?;
    }
    if let Some(id) = domain_id {
        domain::Entity::find_by_id(id)
            .one(&state.db)
            .await
            .map_err(ApiErr::internal)?
            .ok_or_else(|| ApiErr::bad_request(format!("Domain {id} does not exist")))?;
    }
    Ok(())
}

pub(crate) async fn find_datasource(
    state: &ApiState,
    id: i32,
) -> Result<data_source::Model, ApiErr> {
    data_source::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("Data source not found"))
}

fn open_connector(
    state: &ApiState,
    model: &data_source::Model,
) -> Result<Box<dyn SourceConnector>, ApiErr> {
    let cfg = SourceConfig::from_model(model, &state.master_key).map_err(connector_err)?;
    connector::create_connector(cfg).map_err(connector_err)
}

// ---------- GET /datasource-types ----------

pub async fn list_datasource_types() -> Json<Vec<DatasourceTypeResponse>> {
    let types = datasource_types::get_type_defs()
        .iter()
        .map(DatasourceTypeResponse::from)
        .collect();
    Json(types)
}

// ---------- GET /datasource ----------

pub async fn list_datasources(
    State(state): State<ApiState>,
    Query(params): Query<ListDatasourcesQuery>,
) -> Result<Json<Vec<DatasourceResponse>>, ApiErr> {
    let mut query = data_source::Entity::find();
    if let Some(model_id) = params.model_id {
        query = query.filter(data_source::Column::ModelId.eq(model_id));
    }
    if let Some(domain_id) = params.domain_id {
        query = query.filter(data_source::Column::DomainId.eq(domain_id));
    }
    let items = query
        .order_by_asc(data_source::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    Ok(Json(items.into_iter().map(DatasourceResponse::from).collect()))
}

// ---------- POST /datasource ----------

pub async fn create_datasource(
    State(state): State<ApiState>,
    Json(body): Json<CreateDatasourceRequest>,
) -> Result<(StatusCode, Json<DatasourceResponse>), ApiErr> {
    require(&body.name, "name")?;
    require(&body.ds_type, "type")?;
    require(&body.url, "url")?;
    let status = body.status.unwrap_or_else(|| "active".to_string());
    check_status(&status)?;
    check_links(&state, body.model_id, body.domain_id).await?;

    let settings =
        datasource_types::split_config(&body.ds_type, &body.url, body.username, body.password)
            .map_err(config_err)?;
    let secure_str = settings
        .secure
        .seal(&state.master_key)
        .map_err(ApiErr::internal)?;

    let now = Utc::now().naive_utc();
    let model = data_source::ActiveModel {
        name: Set(body.name.trim().to_string()),
        ds_type: Set(settings.ds_type),
        url: Set(settings.url),
        username: Set(settings.username),
        secure_config: Set(secure_str),
        table_name: Set(body.table_name.filter(|t| !t.trim().is_empty())),
        description: Set(body.description),
        status: Set(status),
        model_id: Set(body.model_id),
        domain_id: Set(body.domain_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(unique_violation(NAME_TAKEN))?;

    tracing::info!(
        datasource_id = model.id,
        ds_type = %model.ds_type,
        url = %connector::redact_url(&model.url),
        "data source created"
    );
    Ok((StatusCode::CREATED, Json(model.into())))
}

// ---------- GET /datasource/{id} ----------

pub async fn get_datasource(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<DatasourceResponse>, ApiErr> {
    Ok(Json(find_datasource(&state, id).await?.into()))
}

// ---------- PUT /datasource/{id} ----------

pub async fn update_datasource(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateDatasourceRequest>,
) -> Result<Json<DatasourceResponse>, ApiErr> {
    let model = find_datasource(&state, id).await?;
    check_links(&state, body.model_id, body.domain_id).await?;

    let mut active: data_source::ActiveModel = model.clone().into();

    if let Some(name) = body.name {
        require(&name, "name")?;
        active.name = Set(name.trim().to_string());
    }
    if let Some(status) = body.status {
        check_status(&status)?;
        active.status = Set(status);
    }
    if let Some(table_name) = body.table_name {
        active.table_name = Set(Some(table_name).filter(|t| !t.trim().is_empty()));
    }
    if let Some(description) = body.description {
        active.description = Set(Some(description));
    }
    if body.model_id.is_some() {
        active.model_id = Set(body.model_id);
    }
    if body.domain_id.is_some() {
        active.domain_id = Set(body.domain_id);
    }

    let touches_connection = body.ds_type.is_some()
        || body.url.is_some()
        || body.username.is_some()
        || body.password.is_some();
    if touches_connection {
        let existing = ConnectionSettings {
            ds_type: model.ds_type.clone(),
            url: model.url.clone(),
            username: model.username.clone(),
            secure: SecureConfig::open(&model.secure_config, &state.master_key)
                .map_err(ApiErr::internal)?,
        };
        let merged = datasource_types::merge_config(
            existing,
            body.ds_type,
            body.url,
            body.username,
            body.password,
        )
        .map_err(config_err)?;

        active.secure_config = Set(merged
            .secure
            .seal(&state.master_key)
            .map_err(ApiErr::internal)?);
        active.ds_type = Set(merged.ds_type);
        active.url = Set(merged.url);
        active.username = Set(merged.username);
    }

    active.updated_at = Set(Utc::now().naive_utc());
    let updated = active
        .update(&state.db)
        .await
        .map_err(unique_violation(NAME_TAKEN))?;
    Ok(Json(updated.into()))
}

// ---------- DELETE /datasource/{id} ----------

pub async fn delete_datasource(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiErr> {
    let model = find_datasource(&state, id).await?;

    // mappings, associations and tasks reading from it cascade
    let active: data_source::ActiveModel = model.into();
    active.delete(&state.db).await.map_err(ApiErr::internal)?;

    tracing::info!(datasource_id = id, "data source deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------- PUT /datasource/{id}/toggle ----------

pub async fn toggle_datasource(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<DatasourceResponse>, ApiErr> {
    let model = find_datasource(&state, id).await?;
    let next = if model.status == "active" {
        "inactive"
    } else {
        "active"
    };
    let mut active: data_source::ActiveModel = model.into();
    active.status = Set(next.to_string());
    active.updated_at = Set(Utc::now().naive_utc());
    let updated = active.update(&state.db).await.map_err(ApiErr::internal)?;
    Ok(Json(updated.into()))
}

// ---------- POST /datasource/{id}/test ----------

pub async fn test_datasource(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<TestConnectionResponse>, ApiErr> {
    let model = find_datasource(&state, id).await?;

    let result = match SourceConfig::from_model(&model, &state.master_key)
        .and_then(connector::create_connector)
    {
        Ok(conn) => conn.test_connection().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Ok(Json(TestConnectionResponse {
            success: true,
            message: None,
        })),
        Err(e) => {
            tracing::error!(
                datasource_id = id,
                ds_type = %model.ds_type,
                url = %connector::redact_url(&model.url),
                error = %e,
                "test connection failed"
            );
            Ok(Json(TestConnectionResponse {
                success: false,
                message: Some(e.to_string()),
            }))
        }
    }
}

// ---------- GET /datasource/{id}/tables ----------

pub async fn list_tables(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<String>>, ApiErr> {
    let model = find_datasource(&state, id).await?;
    let conn = open_connector(&state, &model)?;
    let tables = conn.list_tables().await.map_err(connector_err)?;
    Ok(Json(tables))
}

// ---------- GET /datasource/{id}/tables/{table}/schema ----------

pub async fn table_schema(
    State(state): State<ApiState>,
    Path((id, table)): Path<(i32, String)>,
) -> Result<Json<Vec<ColumnInfo>>, ApiErr> {
    connector::validate_identifier(&table).map_err(connector_err)?;
    let model = find_datasource(&state, id).await?;
    let conn = open_connector(&state, &model)?;
    let columns = conn.describe_table(&table).await.map_err(connector_err)?;
    Ok(Json(columns))
}

// ---------- GET /datasource/{id}/mappings ----------

/// Field mappings stored for this data source. With `tableName`, only
/// models associated with that table are included.
pub async fn datasource_mappings(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Query(params): Query<DatasourceMappingsQuery>,
) -> Result<Json<Vec<MappingResponse>>, ApiErr> {
    find_datasource(&state, id).await?;

    let mut query = mapping::Entity::find().filter(mapping::Column::DatasourceId.eq(id));
    if let Some(table) = params.table_name.filter(|t| !t.is_empty()) {
        let model_ids: HashSet<i32> = model_table_association::Entity::find()
            .filter(model_table_association::Column::DatasourceId.eq(id))
            .filter(model_table_association::Column::TableName.eq(table))
            .all(&state.db)
            .await
            .map_err(ApiErr::internal)?
            .into_iter()
            .map(|a| a.model_id)
            .collect();
        query = query.filter(mapping::Column::ModelId.is_in(model_ids));
    }
    let mappings = query
        .order_by_asc(mapping::Column::Id)
        .all(&state.db)
        .await
        .map_err(ApiErr::internal)?;

    let property_ids: Vec<i32> = mappings.iter().map(|m| m.property_id).collect();
    let names: HashMap<i32, String> = property::Entity::find()
        .filter(property::Column::Id.is_in(property_ids))
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
