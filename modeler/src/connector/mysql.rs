use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{
    ColumnInfo, ConnectorError, SourceConfig, SourceConnector, SourceRow, quote_identifier,
    split_table_name,
};

/// MySQL source over the ORM's sqlx MySQL driver. A short-lived single
/// connection is opened per operation.
pub struct MySqlConnector {
    cfg: SourceConfig,
}

impl MySqlConnector {
    pub fn new(cfg: SourceConfig) -> Self {
        Self { cfg }
    }

    fn url(&self) -> String {
        let auth = if self.cfg.username.is_empty() {
            String::new()
        } else if self.cfg.password.is_empty() {
            format!("{}@", encode_userinfo(&self.cfg.username))
        } else {
            format!(
                "{}:{}@",
                encode_userinfo(&self.cfg.username),
                encode_userinfo(&self.cfg.password)
            )
        };
        format!(
            "mysql://{auth}{}:{}/{}",
            self.cfg.host, self.cfg.port, self.cfg.database
        )
    }

    async fn connect(&self) -> Result<DatabaseConnection, ConnectorError> {
        let mut opts = ConnectOptions::new(self.url());
        opts.max_connections(1)
            .connect_timeout(Duration::from_secs(30))
            .sqlx_logging(false);
        Database::connect(opts)
            .await
            .map_err(|e| ConnectorError::Connect(e.to_string()))
    }

    /// MySQL has no schemas below the database; `db.table` names another database.
    fn schema_for(&self, table: &str) -> (String, String) {
        let (schema, name) = split_table_name(table, &self.cfg.database);
        (schema.to_string(), name.to_string())
    }
}

/// Percent-encode a URL userinfo component.
fn encode_userinfo(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[async_trait::async_trait]
impl SourceConnector for MySqlConnector {
    async fn test_connection(&self) -> Result<(), ConnectorError> {
        let db = self.connect().await?;
        db.execute_unprepared("SELECT 1")
            .await
            .map_err(|e| ConnectorError::Query(e.to_string()))?;
        db.close()
            .await
            .map_err(|e| ConnectorError::Connect(e.to_string()))
    }

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError> {
        let db = self.connect().await?;
        let rows = db
            .query_all(Statement::from_string(
                DbBackend::MySql,
                "SELECT CAST(table_name AS CHAR) AS tname FROM information_schema.tables \
                 WHERE table_schema = DATABASE() ORDER BY table_name",
            ))
            .await
            .map_err(|e| ConnectorError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                row.try_get_by_index::<String>(0)
                    .map_err(|e| ConnectorError::Query(e.to_string()))
            })
            .collect()
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        quote_identifier(table, '`')?;
        let (schema, name) = self.schema_for(table);
        let db = self.connect().await?;
        let rows = db
            .query_all(Statement::from_sql_and_values(
                DbBackend::MySql,
                "SELECT CAST(column_name AS CHAR), CAST(data_type AS CHAR), \
                 CAST(is_nullable AS CHAR) FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
                [schema.clone().into(), name.clone().into()],
            ))
            .await
            .map_err(|e| ConnectorError::Query(e.to_string()))?;

        if rows.is_empty() {
            return Err(ConnectorError::Query(format!("table not found: {schema}.{name}")));
        }

        rows.iter()
            .map(|row| {
                let get = |i| {
                    row.try_get_by_index::<String>(i)
                        .map_err(|e| ConnectorError::Query(e.to_string()))
                };
                Ok(ColumnInfo {
                    name: get(0)?,
                    data_type: get(1)?,
                    nullable: get(2)? == "YES",
                })
            })
            .collect()
    }

    async fn fetch(
        &self,
        table: &str,
        columns: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceRow>, ConnectorError> {
        let select_list = columns
            .iter()
            .map(|c| quote_identifier(c, '`').map(|q| format!("CAST({q} AS CHAR)")))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let sql = format!("SELECT {select_list} FROM {}", quote_identifier(table, '`')?);

        let db = tokio::select! {
            res = self.connect() => res?,
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
        };
        let rows = tokio::select! {
            res = db.query_all(Statement::from_string(DbBackend::MySql, sql)) => {
                res.map_err(|e| ConnectorError::Query(e.to_string()))?
            }
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
        };

        rows.iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| {
                        row.try_get_by_index::<Option<String>>(i)
                            .map_err(|e| ConnectorError::Query(e.to_string()))
                    })
                    .collect::<Result<SourceRow, _>>()
            })
            .collect()
    }
}
