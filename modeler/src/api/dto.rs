use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::connector::redact_url;
use crate::entity::{
    data_model, data_source, domain, etl_log, etl_task, indicator, mapping, model_relation,
    model_table_association, property, shared_attribute,
};

// ---------- domains ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDomainRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDomainRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<domain::Model> for DomainResponse {
    fn from(m: domain::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            owner: m.owner,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Domains linked by at least one relation between their models.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DomainEdge {
    pub source: i32,
    pub target: i32,
    pub relation_count: usize,
}

#[derive(Debug, Serialize)]
pub struct DomainListResponse {
    pub domains: Vec<DomainResponse>,
    pub edges: Vec<DomainEdge>,
}

// ---------- models ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateModelRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    pub description: Option<String>,
    pub creator: Option<String>,
    pub domain_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateModelRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub creator: Option<String>,
    pub domain_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListModelsQuery {
    pub domain_id: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub creator: Option<String>,
    pub domain_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<data_model::Model> for ModelResponse {
    fn from(m: data_model::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            code: m.code,
            description: m.description,
            creator: m.creator,
            domain_id: m.domain_id,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// A relation drawn as a graph edge between two models.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEdge {
    pub id: i32,
    pub source: i32,
    pub target: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub enabled: bool,
}

impl From<&model_relation::Model> for ModelEdge {
    fn from(r: &model_relation::Model) -> Self {
        Self {
            id: r.id,
            source: r.source_model_id,
            target: r.target_model_id,
            name: r.name.clone(),
            relation_type: r.relation_type.clone(),
            enabled: r.enabled,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelResponse>,
    pub edges: Vec<ModelEdge>,
}

// ---------- properties ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePropertyRequest {
    pub model_id: Option<i32>,
    #[serde(default)]
    pub name: String,
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub prop_type: Option<String>,
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    pub default_value: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub sensitivity_level: Option<String>,
    pub mask_rule: Option<String>,
    pub physical_column: Option<String>,
    pub foreign_key_table: Option<String>,
    pub foreign_key_column: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePropertyRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub prop_type: Option<String>,
    pub required: Option<bool>,
    pub description: Option<String>,
    pub is_primary_key: Option<bool>,
    pub is_foreign_key: Option<bool>,
    pub default_value: Option<String>,
    pub constraints: Option<Vec<String>>,
    pub sensitivity_level: Option<String>,
    pub mask_rule: Option<String>,
    pub physical_column: Option<String>,
    pub foreign_key_table: Option<String>,
    pub foreign_key_column: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPropertiesQuery {
    pub model_id: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyResponse {
    pub id: i32,
    pub model_id: i32,
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub prop_type: String,
    pub required: bool,
    pub description: Option<String>,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub default_value: Option<String>,
    pub constraints: Vec<String>,
    pub sensitivity_level: Option<String>,
    pub mask_rule: Option<String>,
    pub physical_column: Option<String>,
    pub foreign_key_table: Option<String>,
    pub foreign_key_column: Option<String>,
}

impl From<property::Model> for PropertyResponse {
    fn from(m: property::Model) -> Self {
        let constraints = m.constraint_list();
        Self {
            id: m.id,
            model_id: m.model_id,
            name: m.name,
            code: m.code,
            prop_type: m.prop_type,
            required: m.required,
            description: m.description,
            is_primary_key: m.is_primary_key,
            is_foreign_key: m.is_foreign_key,
            default_value: m.default_value,
            constraints,
            sensitivity_level: m.sensitivity_level,
            mask_rule: m.mask_rule,
            physical_column: m.physical_column,
            foreign_key_table: m.foreign_key_table,
            foreign_key_column: m.foreign_key_column,
        }
    }
}

// ---------- relations ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRelationRequest {
    #[serde(default)]
    pub name: String,
    pub source_model_id: Option<i32>,
    pub target_model_id: Option<i32>,
    #[serde(rename = "type")]
    pub relation_type: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRelationRequest {
    pub name: Option<String>,
    pub source_model_id: Option<i32>,
    pub target_model_id: Option<i32>,
    #[serde(rename = "type")]
    pub relation_type: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRelationsQuery {
    pub model_id: Option<i32>,
    pub domain_id: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationResponse {
    pub id: i32,
    pub name: String,
    pub source_model_id: i32,
    pub target_model_id: i32,
    /// Name of the source model
    pub source_model: Option<String>,
    /// Name of the target model
    pub target_model: Option<String>,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub description: Option<String>,
    pub enabled: bool,
}

impl RelationResponse {
    pub fn new(
        r: model_relation::Model,
        source_model: Option<String>,
        target_model: Option<String>,
    ) -> Self {
        Self {
            id: r.id,
            name: r.name,
            source_model_id: r.source_model_id,
            target_model_id: r.target_model_id,
            source_model,
            target_model,
            relation_type: r.relation_type,
            description: r.description,
            enabled: r.enabled,
        }
    }
}

// ---------- shared attributes ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttributeRequest {
    pub domain_id: Option<i32>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: Option<String>,
    pub length: Option<String>,
    pub precision: Option<String>,
    pub description: Option<String>,
    pub value_range: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAttributeRequest {
    pub domain_id: Option<i32>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub attr_type: Option<String>,
    pub length: Option<String>,
    pub precision: Option<String>,
    pub description: Option<String>,
    pub value_range: Option<String>,
    pub reference_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainScopedQuery {
    pub domain_id: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeResponse {
    pub id: i32,
    pub domain_id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: String,
    pub length: Option<String>,
    pub precision: Option<String>,
    pub description: Option<String>,
    pub value_range: Option<String>,
    pub reference_count: i32,
}

impl From<shared_attribute::Model> for AttributeResponse {
    fn from(m: shared_attribute::Model) -> Self {
        Self {
            id: m.id,
            domain_id: m.domain_id,
            name: m.name,
            attr_type: m.attr_type,
            length: m.length,
            precision: m.precision,
            description: m.description,
            value_range: m.value_range,
            reference_count: m.reference_count,
        }
    }
}

// ---------- indicators ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIndicatorRequest {
    pub domain_id: Option<i32>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub expression: String,
    pub return_type: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIndicatorRequest {
    pub domain_id: Option<i32>,
    pub name: Option<String>,
    pub expression: Option<String>,
    pub return_type: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorResponse {
    pub id: i32,
    pub domain_id: i32,
    pub name: String,
    pub expression: String,
    pub return_type: String,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<indicator::Model> for IndicatorResponse {
    fn from(m: indicator::Model) -> Self {
        Self {
            id: m.id,
            domain_id: m.domain_id,
            name: m.name,
            expression: m.expression,
            return_type: m.return_type,
            unit: m.unit,
            description: m.description,
            status: m.status,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

// ---------- data sources ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatasourceRequest {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub ds_type: String,
    #[serde(default)]
    pub url: String,
    pub username: Option<String>,
    /// Write-only; stored encrypted.
    pub password: Option<String>,
    pub table_name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub model_id: Option<i32>,
    pub domain_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDatasourceRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ds_type: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    /// Empty string keeps the stored password.
    pub password: Option<String>,
    pub table_name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub model_id: Option<i32>,
    pub domain_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDatasourcesQuery {
    pub model_id: Option<i32>,
    pub domain_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceMappingsQuery {
    pub table_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceResponse {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub ds_type: String,
    pub url: String,
    pub username: Option<String>,
    pub has_password: bool,
    pub table_name: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub model_id: Option<i32>,
    pub domain_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<data_source::Model> for DatasourceResponse {
    fn from(m: data_source::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            url: redact_url(&m.url),
            ds_type: m.ds_type,
            username: m.username,
            has_password: !m.secure_config.is_empty(),
            table_name: m.table_name,
            description: m.description,
            status: m.status,
            model_id: m.model_id,
            domain_id: m.domain_id,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ---------- mappings & associations ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMappingRequest {
    pub datasource_id: Option<i32>,
    pub model_id: Option<i32>,
    #[serde(default)]
    pub field_id: String,
    pub property_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMappingRequest {
    pub field_id: Option<String>,
    pub property_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMappingsQuery {
    pub datasource_id: Option<i32>,
    pub model_id: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingResponse {
    pub id: i32,
    pub datasource_id: i32,
    pub model_id: i32,
    pub field_id: String,
    pub property_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl MappingResponse {
    pub fn new(m: mapping::Model, property_name: Option<String>) -> Self {
        Self {
            id: m.id,
            datasource_id: m.datasource_id,
            model_id: m.model_id,
            field_id: m.field_id,
            property_id: m.property_id,
            property_name,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssociationRequest {
    pub model_id: Option<i32>,
    pub datasource_id: Option<i32>,
    #[serde(default)]
    pub table_name: String,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAssociationsQuery {
    pub model_id: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationResponse {
    pub id: i32,
    pub model_id: i32,
    pub datasource_id: i32,
    pub table_name: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<model_table_association::Model> for AssociationResponse {
    fn from(m: model_table_association::Model) -> Self {
        Self {
            id: m.id,
            model_id: m.model_id,
            datasource_id: m.datasource_id,
            table_name: m.table_name,
            status: m.status,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

// ---------- ETL ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub source_datasource_id: Option<i32>,
    pub target_model_id: Option<i32>,
    pub schedule: Option<String>,
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub source_datasource_id: Option<i32>,
    pub target_model_id: Option<i32>,
    pub schedule: Option<String>,
    pub config: Option<serde_json::Value>,
    pub next_run: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub source_datasource_id: i32,
    pub target_model_id: i32,
    pub status: String,
    pub schedule: Option<String>,
    pub config: serde_json::Value,
    pub last_run: Option<NaiveDateTime>,
    pub next_run: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_run_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TaskResponse {
    pub fn new(m: etl_task::Model, active_run_id: Option<String>) -> Self {
        let config = serde_json::from_str(&m.config).unwrap_or(serde_json::Value::Null);
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            source_datasource_id: m.source_datasource_id,
            target_model_id: m.target_model_id,
            status: m.status,
            schedule: m.schedule,
            config,
            last_run: m.last_run,
            next_run: m.next_run,
            active_run_id,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub run_id: String,
    pub log_id: i32,
    pub task_id: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusResponse {
    pub run_id: String,
    pub task_id: i32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLogsQuery {
    pub task_id: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResponse {
    pub id: i32,
    pub task_id: i32,
    pub run_id: String,
    pub status: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub records_processed: i64,
    pub records_success: i64,
    pub records_failed: i64,
    pub error_message: Option<String>,
    pub details: serde_json::Value,
}

impl From<etl_log::Model> for LogResponse {
    fn from(m: etl_log::Model) -> Self {
        let details = serde_json::from_str(&m.details).unwrap_or(serde_json::Value::Null);
        Self {
            id: m.id,
            task_id: m.task_id,
            run_id: m.run_id,
            status: m.status,
            start_time: m.start_time,
            end_time: m.end_time,
            records_processed: m.records_processed,
            records_success: m.records_success,
            records_failed: m.records_failed,
            error_message: m.error_message,
            details,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTableDefinitionRequest {
    pub model_id: Option<i32>,
}

// ---------- warehouse preview ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewQuery {
    pub model_id: Option<i32>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub model_id: i32,
    pub table_name: String,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    /// Columns whose values were masked
    pub masked_columns: Vec<String>,
}

// ---------- data records ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    pub model_id: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub model_id: i32,
    pub table_name: String,
    pub record: serde_json::Map<String, serde_json::Value>,
    pub masked_columns: Vec<String>,
}
