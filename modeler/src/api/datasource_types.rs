use serde::Serialize;
use std::sync::OnceLock;

use crate::connector::{DatasourceKind, SourceConfig};
use crate::crypto::SecureConfig;

#[derive(Debug, Clone)]
pub enum FieldType {
    Text,
    Password,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub key: &'static str,
    pub label: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub is_secret: bool,
}

pub struct DatasourceTypeDef {
    pub ds_type: &'static str,
    pub label: &'static str,
    pub url_example: &'static str,
    /// Usable as an ETL source.
    pub can_source: bool,
    /// Usable as an ETL target (warehouse).
    pub can_target: bool,
    pub fields: Vec<FieldDef>,
}

static TYPE_DEFS: OnceLock<Vec<DatasourceTypeDef>> = OnceLock::new();

fn network_fields() -> Vec<FieldDef> {
    vec![
        FieldDef {
            key: "url",
            label: "Connection URL",
            field_type: FieldType::Text,
            required: true,
            is_secret: false,
        },
        FieldDef {
            key: "username",
            label: "Username",
            field_type: FieldType::Text,
            required: false,
            is_secret: false,
        },
        FieldDef {
            key: "password",
            label: "Password",
            field_type: FieldType::Password,
            required: false,
            is_secret: true,
        },
    ]
}

pub fn get_type_defs() -> &'static [DatasourceTypeDef] {
    TYPE_DEFS.get_or_init(|| {
        vec![
            DatasourceTypeDef {
                ds_type: "mysql",
                label: "MySQL",
                url_example: "jdbc:mysql://localhost:3306/dbname",
                can_source: true,
                can_target: false,
                fields: network_fields(),
            },
            DatasourceTypeDef {
                ds_type: "postgresql",
                label: "PostgreSQL",
                url_example: "jdbc:postgresql://localhost:5432/dbname",
                can_source: true,
                can_target: false,
                fields: network_fields(),
            },
            DatasourceTypeDef {
                ds_type: "sqlserver",
                label: "SQL Server",
                url_example: "jdbc:sqlserver://localhost:1433;databaseName=dbname",
                can_source: false,
                can_target: false,
                fields: network_fields(),
            },
            DatasourceTypeDef {
                ds_type: "duckdb",
                label: "DuckDB",
                url_example: "/data/warehouse.duckdb",
                can_source: true,
                can_target: true,
                fields: vec![FieldDef {
                    key: "url",
                    label: "Database file",
                    field_type: FieldType::Text,
                    required: true,
                    is_secret: false,
                }],
            },
        ]
    })
}

pub fn get_type_def(ds_type: &str) -> Option<&'static DatasourceTypeDef> {
    get_type_defs().iter().find(|d| d.ds_type == ds_type)
}

#[derive(Debug)]
pub enum ConfigError {
    UnknownType(String),
    InvalidInput(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::UnknownType(t) => write!(f, "Unknown data source type: {t}"),
            ConfigError::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Connection settings as stored on a datasource row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub ds_type: String,
    pub url: String,
    pub username: Option<String>,
    pub secure: SecureConfig,
}

/// Validate create input and split the password off into the secure half.
/// The URL must parse for the given type.
pub fn split_config(
    ds_type: &str,
    url: &str,
    username: Option<String>,
    password: Option<String>,
) -> Result<ConnectionSettings, ConfigError> {
    let type_def =
        get_type_def(ds_type).ok_or_else(|| ConfigError::UnknownType(ds_type.to_string()))?;
    let kind = DatasourceKind::parse(type_def.ds_type)
        .ok_or_else(|| ConfigError::UnknownType(ds_type.to_string()))?;

    SourceConfig::parse(kind, url, username.as_deref(), password.as_deref())
        .map_err(|e| ConfigError::InvalidInput(e.to_string()))?;

    Ok(ConnectionSettings {
        ds_type: type_def.ds_type.to_string(),
        url: url.trim().to_string(),
        username: username.filter(|u| !u.is_empty()),
        secure: SecureConfig {
            password: password.filter(|p| !p.is_empty()),
        },
    })
}

/// Merge an update into existing settings. Fields left out keep their
/// stored value; an empty password string also keeps the stored one.
pub fn merge_config(
    existing: ConnectionSettings,
    ds_type: Option<String>,
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<ConnectionSettings, ConfigError> {
    let ds_type = ds_type.unwrap_or(existing.ds_type);
    let url = url.unwrap_or(existing.url);
    let username = match username {
        Some(u) => Some(u),
        None => existing.username,
    };
    let password = match password {
        Some(p) if !p.is_empty() => Some(p),
        _ => existing.secure.password,
    };
    split_config(&ds_type, &url, username, password)
}

// ---------- API response types ----------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefResponse {
    pub key: String,
    pub label: String,
    pub field_type: String,
    pub required: bool,
    pub is_secret: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceTypeResponse {
    #[serde(rename = "type")]
    pub ds_type: String,
    pub label: String,
    pub url_example: String,
    pub can_source: bool,
    pub can_target: bool,
    pub fields: Vec<FieldDefResponse>,
}

impl From<&DatasourceTypeDef> for DatasourceTypeResponse {
    fn from(def: &DatasourceTypeDef) -> Self {
        Self {
            ds_type: def.ds_type.to_string(),
            label: def.label.to_string(),
            url_example: def.url_example.to_string(),
            can_source: def.can_source,
            can_target: def.can_target,
            fields: def
                .fields
                .iter()
                .map(|f| FieldDefResponse {
                    key: f.key.to_string(),
                    label: f.label.to_string(),
                    field_type: match &f.field_type {
                        FieldType::Text => "text".to_string(),
                        FieldType::Password => "password".to_string(),
                    },
                    required: f.required,
                    is_secret: f.is_secret,
                })
                .collect(),
        }
    }
}
