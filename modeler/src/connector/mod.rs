use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::crypto::SecureConfig;
use crate::entity::data_source;

pub mod duckdb;
pub mod mysql;
pub mod postgres;

// ---------- DTOs ----------

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    /// Upstream type string as reported by the source (e.g. "varchar", "BIGINT")
    pub data_type: String,
    pub nullable: bool,
}

/// One source row; every cell is read as nullable text.
pub type SourceRow = Vec<Option<String>>;

// ---------- errors ----------

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Connection error: {0}")]
    Connect(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Invalid datasource config: {0}")]
    Config(String),
    #[error("Unsupported datasource type: {0}")]
    Unsupported(String),
    #[error("Cancelled")]
    Cancelled,
}

// ---------- datasource kinds ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasourceKind {
    MySql,
    Postgres,
    SqlServer,
    DuckDb,
}

impl DatasourceKind {
    pub fn parse(ds_type: &str) -> Option<Self> {
        match ds_type.to_ascii_lowercase().as_str() {
            "mysql" => Some(Self::MySql),
            "postgresql" | "postgres" => Some(Self::Postgres),
            "sqlserver" | "mssql" => Some(Self::SqlServer),
            "duckdb" => Some(Self::DuckDb),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgresql",
            Self::SqlServer => "sqlserver",
            Self::DuckDb => "duckdb",
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
            Self::SqlServer => 1433,
            Self::DuckDb => 0,
        }
    }
}

impl fmt::Display for DatasourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------- connection descriptor ----------

/// Typed connection settings resolved from a stored datasource.
#[derive(Clone)]
pub struct SourceConfig {
    pub kind: DatasourceKind,
    /// File path for DuckDB; empty for network sources.
    pub path: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl SourceConfig {
    /// Build from a `datasources` row, decrypting the stored password.
    pub fn from_model(
        model: &data_source::Model,
        master_key: &[u8; 32],
    ) -> Result<Self, ConnectorError> {
        let kind = DatasourceKind::parse(&model.ds_type)
            .ok_or_else(|| ConnectorError::Unsupported(model.ds_type.clone()))?;
        let secure = SecureConfig::open(&model.secure_config, master_key)
            .map_err(|e| ConnectorError::Config(format!("failed to decrypt secrets: {e}")))?;
        Self::parse(
            kind,
            &model.url,
            model.username.as_deref(),
            secure.password.as_deref(),
        )
    }

    /// Parse a connection URL. Accepts an optional `jdbc:` prefix, and for
    /// DuckDB either `duckdb://<path>` or a bare path.
    pub fn parse(
        kind: DatasourceKind,
        url: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, ConnectorError> {
        let url = url.trim();
        let url = url.strip_prefix("jdbc:").unwrap_or(url);

        if kind == DatasourceKind::DuckDb {
            let path = url.strip_prefix("duckdb://").unwrap_or(url);
            if path.is_empty() {
                return Err(ConnectorError::Config("duckdb path is empty".to_string()));
            }
            return Ok(Self {
                kind,
                path: path.to_string(),
                host: String::new(),
                port: 0,
                database: String::new(),
                username: String::new(),
                password: String::new(),
            });
        }

        let (_, rest) = url
            .split_once("://")
            .ok_or_else(|| ConnectorError::Config(format!("malformed url: {url}")))?;
        let rest = rest.split(['?', ';']).next().unwrap_or(rest);
        let (authority, database) = rest.split_once('/').unwrap_or((rest, ""));

        // user:pass@ inside the url is honoured unless explicit fields override it
        let (userinfo, hostport) = match authority.rsplit_once('@') {
            Some((u, h)) => (Some(u), h),
            None => (None, authority),
        };
        let (url_user, url_pass) = match userinfo {
            Some(u) => match u.split_once(':') {
                Some((user, pass)) => (Some(user), Some(pass)),
                None => (Some(u), None),
            },
            None => (None, None),
        };

        let (host, port) = match hostport.rsplit_once(':') {
            Some((h, p)) => (
                h,
                p.parse::<u16>()
                    .map_err(|_| ConnectorError::Config(format!("invalid port: {p}")))?,
            ),
            None => (hostport, kind.default_port()),
        };
        if host.is_empty() {
            return Err(ConnectorError::Config(format!("missing host in url: {url}")));
        }

        Ok(Self {
            kind,
            path: String::new(),
            host: host.to_string(),
            port,
            database: database.to_string(),
            username: username
                .filter(|u| !u.is_empty())
                .or(url_user)
                .unwrap_or_default()
                .to_string(),
            password: password
                .filter(|p| !p.is_empty())
                .or(url_pass)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Strip credentials from a URL before it goes into a log line.
pub fn redact_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let after_scheme = &url[scheme_end + 3..];
        if let Some(at) = after_scheme.find('@') {
            return format!("{}://***@{}", &url[..scheme_end], &after_scheme[at + 1..]);
        }
    }
    url.to_string()
}

// ---------- identifiers ----------

/// Accepts `name` or `schema.name`, each part made of letters, digits or `_`
/// and not starting with a digit.
pub fn validate_identifier(ident: &str) -> Result<(), ConnectorError> {
    let parts: Vec<&str> = ident.split('.').collect();
    let ok = parts.len() <= 2
        && parts.iter().all(|p| {
            let mut chars = p.chars();
            matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
                && chars.all(|c| c.is_alphanumeric() || c == '_')
        });
    if ok {
        Ok(())
    } else {
        Err(ConnectorError::InvalidIdentifier(ident.to_string()))
    }
}

/// Validate then quote an identifier with the given quote character,
/// quoting each dotted part separately.
pub fn quote_identifier(ident: &str, quote: char) -> Result<String, ConnectorError> {
    validate_identifier(ident)?;
    Ok(ident
        .split('.')
        .map(|p| format!("{quote}{p}{quote}"))
        .collect::<Vec<_>>()
        .join("."))
}

/// Split `schema.table` into its parts; a bare name gets `default_schema`.
pub fn split_table_name<'a>(table: &'a str, default_schema: &'a str) -> (&'a str, &'a str) {
    match table.split_once('.') {
        Some((schema, name)) => (schema, name),
        None => (default_schema, table),
    }
}

// ---------- trait ----------

#[async_trait::async_trait]
pub trait SourceConnector: Send + Sync {
    async fn test_connection(&self) -> Result<(), ConnectorError>;

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError>;

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError>;

    /// Read the given columns of every row, in column order, as text.
    async fn fetch(
        &self,
        table: &str,
        columns: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceRow>, ConnectorError>;
}

// ---------- factory ----------

pub fn create_connector(cfg: SourceConfig) -> Result<Box<dyn SourceConnector>, ConnectorError> {
    match cfg.kind {
        DatasourceKind::DuckDb => Ok(Box::new(duckdb::DuckDbConnector::new(cfg))),
        DatasourceKind::Postgres => Ok(Box::new(postgres::PostgresConnector::new(cfg))),
        DatasourceKind::MySql => Ok(Box::new(mysql::MySqlConnector::new(cfg))),
        DatasourceKind::SqlServer => Err(ConnectorError::Unsupported(format!(
            "no connector for data source type: {}",
            cfg.kind
        ))),
    }
}
