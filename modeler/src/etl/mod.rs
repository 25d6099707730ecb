//! ETL tasks: config model, task state machine, and run execution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::connector::ConnectorError;
use crate::warehouse::WarehouseError;

pub mod definition;
pub mod job;
pub mod runner;
pub mod transform;

use definition::TableDefinition;

// ---------- errors ----------

#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Invalid task configuration: {0}")]
    Config(String),
    #[error("No configured field exists in source table {table}")]
    NoValidFields { table: String },
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cancelled")]
    Cancelled,
}

impl EtlError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            EtlError::Cancelled | EtlError::Connector(ConnectorError::Cancelled)
        )
    }
}

// ---------- task config ----------

/// Parsed form of `etl_tasks.config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    #[serde(default)]
    pub source: SourceSection,
    /// source column → target property name or code
    #[serde(default)]
    pub field_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub target: TargetSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_definition: Option<TableDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    /// Declared source columns, used when introspection fails.
    #[serde(default)]
    pub schema: Vec<SchemaField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSection {
    /// A `duckdb` datasource to load into instead of the default warehouse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
}

impl TaskConfig {
    pub fn parse(raw: &str) -> Result<Self, EtlError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| EtlError::Config(e.to_string()))
    }
}

// ---------- task state machine ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Inactive,
    Active,
    Running,
    Paused,
    Error,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inactive" => Some(Self::Inactive),
            "active" => Some(Self::Active),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Activate,
    Pause,
    Toggle,
}

/// Next status for a user action, or a conflict when the action is not
/// allowed from `current`.
pub fn transition(current: TaskStatus, action: TaskAction) -> Result<TaskStatus, EtlError> {
    use TaskStatus::*;
    match (action, current) {
        (TaskAction::Activate, Inactive | Paused | Error) => Ok(Active),
        (TaskAction::Pause, Active) => Ok(Paused),
        (TaskAction::Toggle, Inactive) => Ok(Active),
        (TaskAction::Toggle, Active) => Ok(Inactive),
        (action, current) => Err(EtlError::Conflict(format!(
            "Cannot {} a task that is {}",
            match action {
                TaskAction::Activate => "activate",
                TaskAction::Pause => "pause",
                TaskAction::Toggle => "toggle",
            },
            current.as_str()
        ))),
    }
}

/// Executions start from inactive, active or error.
pub fn check_executable(current: TaskStatus) -> Result<(), EtlError> {
    match current {
        TaskStatus::Inactive | TaskStatus::Active | TaskStatus::Error => Ok(()),
        TaskStatus::Paused => Err(EtlError::Conflict("Task is paused".to_string())),
        TaskStatus::Running => Err(EtlError::Conflict("Task is already running".to_string())),
    }
}
